pub mod access_rule;
pub mod mention;
pub mod support;

pub use Entity as Panel;

use sea_orm::entity::prelude::*;
use serenity::model::id::{ChannelId, GuildId};
use crate::db::IDType;

/// Panel de création de tickets
///
/// Un panel est un point d'entrée configuré : il fixe la catégorie Discord cible, le schéma
/// de nommage, la limite de tickets et l'équipe de support qui y a accès.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "cdd_panel")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub guild_id: IDType,
    pub title: String,
    /// Catégorie Discord où les tickets sont créés. `None` pour la racine du serveur.
    pub category_id: Option<IDType>,
    /// Schéma de nommage, par ex. `support-%id_padded%`
    pub naming_scheme: Option<String>,
    /// Limite de tickets ouverts par utilisateur pour ce panel. `None` ou `0` : limite du serveur.
    pub ticket_limit: Option<i32>,
    /// Donne accès à l'équipe de support par défaut du serveur
    pub with_default_team: bool,
    pub use_threads: bool,
    /// Salon parent des fils en mode fil
    pub thread_parent_id: Option<IDType>,
    pub disabled: bool,
    /// Désactivé par le bot lui-même (dépassement d'offre par exemple)
    pub force_disabled: bool,
    pub mention_opener: bool,
    pub mention_here: bool,
    /// Supprime les mentions juste après leur envoi
    pub delete_mentions: bool,
    pub welcome_message: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel
{}

impl Model {
    #[inline]
    pub fn guild(&self) -> GuildId {
        GuildId(self.guild_id as u64)
    }
    #[inline]
    pub fn category(&self) -> Option<ChannelId> {
        self.category_id.map(|id| ChannelId(id as u64))
    }
    #[inline]
    pub fn thread_parent(&self) -> Option<ChannelId> {
        self.thread_parent_id.map(|id| ChannelId(id as u64))
    }
    /// Limite propre au panel, si elle est définie et strictement positive
    #[inline]
    pub fn own_ticket_limit(&self) -> Option<u64> {
        self.ticket_limit.filter(|limit| *limit > 0).map(|limit| limit as u64)
    }
}
