use sea_orm::entity::prelude::*;
use crate::db::IDType;

/// Règle d'accès à un panel. Les règles sont évaluées par position croissante,
/// la première qui correspond à un rôle de l'utilisateur l'emporte.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "cdd_panel_access_rule")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub panel_id: i32,
    #[sea_orm(primary_key, auto_increment = false)]
    pub position: i32,
    /// Rôle ciblé. L'identifiant du serveur désigne @everyone.
    pub role_id: IDType,
    pub allow: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel
{}
