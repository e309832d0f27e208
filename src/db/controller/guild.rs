use sea_orm::{entity::*, query::*, DbConn};
use serenity::model::id::{GuildId, RoleId, UserId};
use crate::db::{
    guild_to_db, role_to_db, user_to_db, IDType,
    controller::Error,
    model::guild::{blacklist, claim_settings, settings, staff},
};
use crate::log_warn;

/// Paramètres d'un serveur, ceux par défaut s'il n'a jamais rien configuré
pub async fn settings(db: &DbConn, guild_id: GuildId) -> Result<settings::Model, Error> {
    let found = settings::Entity::find_by_id(guild_to_db(guild_id)).one(db).await.map_err(Error::SeaORM)?;
    Ok(found.unwrap_or_else(|| settings::Model::defaults(guild_id)))
}

pub async fn save_settings(db: &DbConn, model: settings::Model) -> Result<(), Error> {
    settings::Entity::delete_by_id(model.guild_id).exec(db).await.map_err(Error::SeaORM)?;
    settings::Entity::insert(model.into_active_model()).exec(db).await.map_err(Error::SeaORM)?;
    Ok(())
}

/// Désactive le débordement une fois sa catégorie supprimée
pub async fn disable_overflow(db: &DbConn, guild_id: GuildId) -> Result<(), Error> {
    log_warn!("La catégorie de débordement du serveur {} n'existe plus, débordement désactivé", guild_id);
    let mut model = settings(db, guild_id).await?;
    model.overflow_enabled = false;
    model.overflow_category_id = None;
    save_settings(db, model).await
}

/// Par défaut, le support voit les tickets pris en charge et peut y écrire
pub async fn claim_settings(db: &DbConn, guild_id: GuildId) -> Result<claim_settings::Model, Error> {
    let found = claim_settings::Entity::find_by_id(guild_to_db(guild_id)).one(db).await.map_err(Error::SeaORM)?;
    Ok(found.unwrap_or(claim_settings::Model {
        guild_id: guild_to_db(guild_id),
        support_can_view: true,
        support_can_type: true,
    }))
}

pub async fn save_claim_settings(db: &DbConn, guild_id: GuildId, support_can_view: bool, support_can_type: bool) -> Result<(), Error> {
    claim_settings::Entity::delete_by_id(guild_to_db(guild_id)).exec(db).await.map_err(Error::SeaORM)?;
    claim_settings::Entity::insert(claim_settings::ActiveModel {
        guild_id: Set(guild_to_db(guild_id)),
        support_can_view: Set(support_can_view),
        support_can_type: Set(support_can_type),
    }).exec(db).await.map_err(Error::SeaORM)?;
    Ok(())
}

/// Équipe de support par défaut et administrateurs d'un serveur
pub async fn staff(db: &DbConn, guild_id: GuildId) -> Result<Vec<staff::Model>, Error> {
    staff::Entity::find()
        .filter(staff::Column::GuildId.eq(guild_to_db(guild_id)))
        .all(db).await
        .map_err(Error::SeaORM)
}

pub async fn add_staff(db: &DbConn, guild_id: GuildId, target_id: IDType, is_role: bool, admin: bool) -> Result<(), Error> {
    staff::Entity::insert(staff::ActiveModel {
        guild_id: Set(guild_to_db(guild_id)),
        target_id: Set(target_id),
        admin: Set(admin),
        is_role: Set(is_role),
    }).exec(db).await.map_err(Error::SeaORM)?;
    Ok(())
}

/// `true` si le membre, ou l'un de ses rôles, est sur liste noire
pub async fn is_blacklisted(db: &DbConn, guild_id: GuildId, user_id: UserId, roles: &[RoleId]) -> Result<bool, Error> {
    let mut targets = vec![user_to_db(user_id)];
    targets.extend(roles.iter().copied().map(role_to_db));
    let found = blacklist::Entity::find()
        .filter(blacklist::Column::GuildId.eq(guild_to_db(guild_id)))
        .filter(blacklist::Column::TargetId.is_in(targets))
        .one(db).await
        .map_err(Error::SeaORM)?;
    Ok(found.is_some())
}

pub async fn add_blacklist(db: &DbConn, guild_id: GuildId, target_id: IDType, is_role: bool) -> Result<(), Error> {
    blacklist::Entity::insert(blacklist::ActiveModel {
        guild_id: Set(guild_to_db(guild_id)),
        target_id: Set(target_id),
        is_role: Set(is_role),
    }).exec(db).await.map_err(Error::SeaORM)?;
    Ok(())
}
