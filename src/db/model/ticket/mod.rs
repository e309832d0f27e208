pub mod autoclose;
pub mod claim;
pub mod close_reason;
pub mod close_request;
pub mod member;
pub mod participant;
pub mod transcript;
pub mod webhook;

pub use Entity as Ticket;

use sea_orm::entity::prelude::*;
use serenity::model::id::{ChannelId, GuildId, MessageId, UserId};
use crate::db::IDType;

/// Étape du cycle de vie d'un ticket
///
/// `Provisioning` couvre la fenêtre entre l'insertion de la ligne et la création du salon
/// Discord. Un ticket bloqué dans cet état est fermé par le balayage de réconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
pub enum TicketStatus {
    #[sea_orm(string_value = "provisioning")]
    Provisioning,
    #[sea_orm(string_value = "open")]
    Open,
    #[sea_orm(string_value = "pending")]
    Pending,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "cdd_ticket")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub guild_id: IDType,
    /// Identifiant du ticket, attribué séquentiellement par serveur
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i32,
    pub opener_id: IDType,
    /// Salon ou fil du ticket. Renseigné une seule fois, après la création côté Discord.
    pub channel_id: Option<IDType>,
    pub panel_id: Option<i32>,
    /// Fixé à la création, ne change jamais
    pub is_thread: bool,
    pub open: bool,
    pub status: TicketStatus,
    pub open_time: DateTimeUtc,
    pub close_time: Option<DateTimeUtc>,
    pub welcome_message_id: Option<IDType>,
    pub join_message_id: Option<IDType>,
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
    pub fn opener(&self) -> UserId {
        UserId(self.opener_id as u64)
    }
    #[inline]
    pub fn channel(&self) -> Option<ChannelId> {
        self.channel_id.map(|id| ChannelId(id as u64))
    }
    #[inline]
    pub fn welcome_message(&self) -> Option<MessageId> {
        self.welcome_message_id.map(|id| MessageId(id as u64))
    }
    #[inline]
    pub fn join_message(&self) -> Option<MessageId> {
        self.join_message_id.map(|id| MessageId(id as u64))
    }
}
