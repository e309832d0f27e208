use sea_orm::entity::prelude::*;
use crate::db::IDType;

/// Ce que le reste du support peut faire sur un ticket claim
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "cdd_claim_settings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub guild_id: IDType,
    pub support_can_view: bool,
    pub support_can_type: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel
{}
