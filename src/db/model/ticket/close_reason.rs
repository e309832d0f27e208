use sea_orm::entity::prelude::*;
use crate::db::IDType;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "cdd_ticket_close_reason")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub guild_id: IDType,
    #[sea_orm(primary_key, auto_increment = false)]
    pub ticket_id: i32,
    /// `None` pour une fermeture automatique
    pub closed_by: Option<IDType>,
    pub reason: Option<String>,
    /// Message récapitulatif posté dans le salon d'archives
    pub archive_message_id: Option<IDType>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel
{}
