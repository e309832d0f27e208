use sea_orm::entity::prelude::*;
use crate::db::IDType;

/// Message archivé d'un ticket
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "cdd_transcript_message")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub guild_id: IDType,
    #[sea_orm(primary_key, auto_increment = false)]
    pub ticket_id: i32,
    #[sea_orm(primary_key, auto_increment = false)]
    pub message_id: IDType,
    /// Rang chronologique dans la transcription, le plus ancien à 0
    pub position: i32,
    pub author_id: IDType,
    pub author_name: String,
    pub content: String,
    /// URLs des pièces jointes, séparées par des retours à la ligne
    pub attachments: String,
    pub timestamp: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel
{}
