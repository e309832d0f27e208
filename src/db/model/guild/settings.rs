use sea_orm::entity::prelude::*;
use serenity::model::id::{ChannelId, GuildId};
use crate::db::IDType;

/// Comportement d'un changement de panel quand le membre ayant claim perdrait l'accès
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
pub enum SwitchClaimBehaviour {
    /// Refuse le changement
    #[sea_orm(string_value = "block")]
    Block,
    /// Retire le claim
    #[sea_orm(string_value = "unclaim")]
    Unclaim,
    /// Garde le claim et l'accès du membre
    #[sea_orm(string_value = "keep")]
    Keep,
}

/// Paramètres des tickets d'un serveur
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "cdd_guild_settings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub guild_id: IDType,
    /// Catégorie des tickets ouverts sans panel
    pub channel_category_id: Option<IDType>,
    pub overflow_enabled: bool,
    /// Catégorie de débordement. `None` : racine du serveur.
    pub overflow_category_id: Option<IDType>,
    /// Tickets ouverts par utilisateur. `0` : illimité.
    pub ticket_limit: i32,
    /// Nomme les salons `ticket-<pseudo>` au lieu de `ticket-<id>`
    pub username_naming: bool,
    pub naming_scheme: Option<String>,
    pub store_transcripts: bool,
    pub archive_channel_id: Option<IDType>,
    /// Salon où sont postés les messages pour rejoindre les fils
    pub notification_channel_id: Option<IDType>,
    /// Parent des fils pour les tickets ouverts sans panel
    pub thread_parent_id: Option<IDType>,
    /// Ouvre les tickets sans panel en mode fil
    pub use_threads: bool,
    pub close_dm: bool,
    /// Envoie le récapitulatif même quand le staff ferme le ticket
    pub staff_close_dm: bool,
    pub switch_claim_behaviour: SwitchClaimBehaviour,
    pub welcome_message: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel
{}

impl Model {
    pub fn defaults(guild_id: GuildId) -> Self {
        Self {
            guild_id: guild_id.0 as IDType,
            channel_category_id: None,
            overflow_enabled: false,
            overflow_category_id: None,
            ticket_limit: 5,
            username_naming: false,
            naming_scheme: None,
            store_transcripts: true,
            archive_channel_id: None,
            notification_channel_id: None,
            thread_parent_id: None,
            use_threads: false,
            close_dm: true,
            staff_close_dm: true,
            switch_claim_behaviour: SwitchClaimBehaviour::Block,
            welcome_message: None,
        }
    }
    #[inline]
    pub fn channel_category(&self) -> Option<ChannelId> {
        self.channel_category_id.map(|id| ChannelId(id as u64))
    }
    #[inline]
    pub fn overflow_category(&self) -> Option<ChannelId> {
        self.overflow_category_id.map(|id| ChannelId(id as u64))
    }
    #[inline]
    pub fn archive_channel(&self) -> Option<ChannelId> {
        self.archive_channel_id.map(|id| ChannelId(id as u64))
    }
    #[inline]
    pub fn notification_channel(&self) -> Option<ChannelId> {
        self.notification_channel_id.map(|id| ChannelId(id as u64))
    }
    #[inline]
    pub fn thread_parent(&self) -> Option<ChannelId> {
        self.thread_parent_id.map(|id| ChannelId(id as u64))
    }
}
