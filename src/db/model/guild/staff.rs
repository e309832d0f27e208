use sea_orm::entity::prelude::*;
use crate::db::IDType;

/// Membre ou rôle du staff d'un serveur (support ou administrateur des tickets)
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "cdd_guild_staff")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub guild_id: IDType,
    #[sea_orm(primary_key, auto_increment = false)]
    pub target_id: IDType,
    #[sea_orm(primary_key, auto_increment = false)]
    pub admin: bool,
    pub is_role: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel
{}
