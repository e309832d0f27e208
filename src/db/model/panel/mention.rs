use sea_orm::entity::prelude::*;
use crate::db::IDType;

/// Rôle mentionné à l'ouverture d'un ticket du panel
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "cdd_panel_mention")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub panel_id: i32,
    #[sea_orm(primary_key, auto_increment = false)]
    pub role_id: IDType,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel
{}
