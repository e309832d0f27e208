use sea_orm::entity::prelude::*;
use serenity::model::id::UserId;
use crate::db::IDType;

/// Membre du staff ayant pris en charge un ticket. Absent tant que le ticket n'est pas claim.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "cdd_ticket_claim")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub guild_id: IDType,
    #[sea_orm(primary_key, auto_increment = false)]
    pub ticket_id: i32,
    pub user_id: IDType,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel
{}

impl Model {
    #[inline]
    pub fn claimer(&self) -> UserId {
        UserId(self.user_id as u64)
    }
}
