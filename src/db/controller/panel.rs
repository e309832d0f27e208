use sea_orm::{entity::*, query::*, DbConn};
use serenity::model::id::{GuildId, RoleId};
use crate::db::{
    guild_to_db, role_to_db, IDType,
    controller::Error,
    model::panel::{self, access_rule, mention, support},
};
use crate::log_info;

/// Panel d'un serveur. Un panel d'un autre serveur est considéré comme absent.
pub async fn get(db: &DbConn, guild_id: GuildId, panel_id: i32) -> Result<Option<panel::Model>, Error> {
    let found = panel::Panel::find_by_id(panel_id).one(db).await.map_err(Error::SeaORM)?;
    Ok(found.filter(|p| p.guild_id == guild_to_db(guild_id)))
}

pub async fn create(db: &DbConn, model: panel::Model) -> Result<panel::Model, Error> {
    let mut active = model.into_active_model();
    active.id = NotSet;
    let created = active.insert(db).await.map_err(Error::SeaORM)?;
    log_info!("Panel {} créé dans le serveur {}", created.id, created.guild_id);
    Ok(created)
}

/// Règles d'accès dans l'ordre d'évaluation
pub async fn access_rules(db: &DbConn, panel_id: i32) -> Result<Vec<access_rule::Model>, Error> {
    access_rule::Entity::find()
        .filter(access_rule::Column::PanelId.eq(panel_id))
        .order_by_asc(access_rule::Column::Position)
        .all(db).await
        .map_err(Error::SeaORM)
}

/// Ajoute une règle après les existantes
pub async fn add_access_rule(db: &DbConn, panel_id: i32, role_id: IDType, allow: bool) -> Result<(), Error> {
    let position = access_rules(db, panel_id).await?.last().map_or(0, |r| r.position + 1);
    access_rule::Entity::insert(access_rule::ActiveModel {
        panel_id: Set(panel_id),
        position: Set(position),
        role_id: Set(role_id),
        allow: Set(allow),
    }).exec(db).await.map_err(Error::SeaORM)?;
    Ok(())
}

pub async fn mention_roles(db: &DbConn, panel_id: i32) -> Result<Vec<RoleId>, Error> {
    let mentions = mention::Entity::find()
        .filter(mention::Column::PanelId.eq(panel_id))
        .all(db).await
        .map_err(Error::SeaORM)?;
    Ok(mentions.into_iter().map(|m| RoleId(m.role_id as u64)).collect())
}

pub async fn add_mention(db: &DbConn, panel_id: i32, role_id: RoleId) -> Result<(), Error> {
    mention::Entity::insert(mention::ActiveModel {
        panel_id: Set(panel_id),
        role_id: Set(role_to_db(role_id)),
    }).exec(db).await.map_err(Error::SeaORM)?;
    Ok(())
}

/// Équipe de support propre au panel
pub async fn support_team(db: &DbConn, panel_id: i32) -> Result<Vec<support::Model>, Error> {
    support::Entity::find()
        .filter(support::Column::PanelId.eq(panel_id))
        .all(db).await
        .map_err(Error::SeaORM)
}

pub async fn add_support(db: &DbConn, panel_id: i32, target_id: IDType, is_role: bool) -> Result<(), Error> {
    support::Entity::insert(support::ActiveModel {
        panel_id: Set(panel_id),
        target_id: Set(target_id),
        is_role: Set(is_role),
    }).exec(db).await.map_err(Error::SeaORM)?;
    Ok(())
}
