use sea_orm::entity::prelude::*;
use crate::db::IDType;

/// Ticket exclu de la fermeture automatique, le bot n'ayant pas les droits pour agir dessus
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "cdd_autoclose_exclude")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub guild_id: IDType,
    #[sea_orm(primary_key, auto_increment = false)]
    pub ticket_id: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel
{}
