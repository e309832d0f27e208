use chrono::{DateTime, Utc};
use sea_orm::{entity::*, query::*, sea_query::{Expr, OnConflict}, ConnectionTrait, DbConn, PaginatorTrait};
use serenity::model::id::{ChannelId, GuildId, MessageId, UserId};
use crate::db::{
    channel_to_db, guild_to_db, message_to_db, user_to_db,
    controller::Error,
    model::ticket::{self, autoclose, claim, close_request, member, webhook, TicketStatus},
};
use crate::log_info;

pub struct NewTicket {
    pub guild_id: GuildId,
    pub opener_id: UserId,
    pub panel_id: Option<i32>,
    pub is_thread: bool,
}

/// Insère un ticket à l'état `Provisioning` avec le prochain identifiant du serveur.
///
/// Les identifiants valent `max + 1` : l'appelant doit détenir le verrou de création du serveur.
pub async fn create(db: &DbConn, new: NewTicket, now: DateTime<Utc>) -> Result<ticket::Model, Error> {
    let guild_id = guild_to_db(new.guild_id);
    let last = ticket::Ticket::find()
        .filter(ticket::Column::GuildId.eq(guild_id))
        .order_by_desc(ticket::Column::Id)
        .one(db).await
        .map_err(Error::SeaORM)?;
    let model = ticket::Model {
        guild_id,
        id: last.map_or(1, |t| t.id + 1),
        opener_id: user_to_db(new.opener_id),
        channel_id: None,
        panel_id: new.panel_id,
        is_thread: new.is_thread,
        open: true,
        status: TicketStatus::Provisioning,
        open_time: now,
        close_time: None,
        welcome_message_id: None,
        join_message_id: None,
    };
    ticket::Ticket::insert(model.clone().into_active_model()).exec(db).await.map_err(Error::SeaORM)?;
    log_info!("Ticket {} créé dans le serveur {}", model.id, new.guild_id);
    Ok(model)
}

/// Enregistre le salon du ticket et le passe à `Open`.
///
/// Ne réussit qu'une fois : un ticket qui a déjà un salon, ou qui a été fermé entre-temps, n'est
/// pas modifié et une erreur est renvoyée.
pub async fn set_channel(db: &DbConn, guild_id: GuildId, ticket_id: i32, channel_id: ChannelId) -> Result<(), Error> {
    let res = ticket::Ticket::update_many()
        .col_expr(ticket::Column::ChannelId, Expr::value(channel_to_db(channel_id)))
        .col_expr(ticket::Column::Status, Expr::value(TicketStatus::Open))
        .filter(ticket::Column::GuildId.eq(guild_to_db(guild_id)))
        .filter(ticket::Column::Id.eq(ticket_id))
        .filter(ticket::Column::ChannelId.is_null())
        .filter(ticket::Column::Open.eq(true))
        .exec(db).await
        .map_err(Error::SeaORM)?;
    if res.rows_affected == 0 {
        return Err(Error::Custom(format!("le ticket {} du serveur {} a déjà un salon ou est fermé", ticket_id, guild_id)));
    }
    Ok(())
}

pub async fn get(db: &DbConn, guild_id: GuildId, ticket_id: i32) -> Result<Option<ticket::Model>, Error> {
    ticket::Ticket::find_by_id((guild_to_db(guild_id), ticket_id)).one(db).await.map_err(Error::SeaORM)
}

pub async fn by_channel(db: &DbConn, guild_id: GuildId, channel_id: ChannelId) -> Result<Option<ticket::Model>, Error> {
    ticket::Ticket::find()
        .filter(ticket::Column::GuildId.eq(guild_to_db(guild_id)))
        .filter(ticket::Column::ChannelId.eq(channel_to_db(channel_id)))
        .order_by_desc(ticket::Column::Id)
        .one(db).await
        .map_err(Error::SeaORM)
}

/// Tickets ouverts d'un membre, limités au panel `panel_id` s'il est donné
pub async fn count_open_by_opener(db: &DbConn, guild_id: GuildId, opener_id: UserId, panel_id: Option<i32>) -> Result<u64, Error> {
    let mut query = ticket::Ticket::find()
        .filter(ticket::Column::GuildId.eq(guild_to_db(guild_id)))
        .filter(ticket::Column::OpenerId.eq(user_to_db(opener_id)))
        .filter(ticket::Column::Open.eq(true));
    if let Some(panel_id) = panel_id {
        query = query.filter(ticket::Column::PanelId.eq(panel_id));
    }
    query.count(db).await.map_err(Error::SeaORM)
}

pub async fn list_open(db: &DbConn, guild_id: GuildId) -> Result<Vec<ticket::Model>, Error> {
    ticket::Ticket::find()
        .filter(ticket::Column::GuildId.eq(guild_to_db(guild_id)))
        .filter(ticket::Column::Open.eq(true))
        .filter(ticket::Column::Status.ne(TicketStatus::Provisioning))
        .order_by_asc(ticket::Column::Id)
        .all(db).await
        .map_err(Error::SeaORM)
}

/// Tickets ouverts avant `before` dont le salon n'a jamais été créé
pub async fn stuck_provisioning(db: &DbConn, before: DateTime<Utc>) -> Result<Vec<ticket::Model>, Error> {
    ticket::Ticket::find()
        .filter(ticket::Column::Open.eq(true))
        .filter(ticket::Column::Status.eq(TicketStatus::Provisioning))
        .filter(ticket::Column::OpenTime.lt(before))
        .all(db).await
        .map_err(Error::SeaORM)
}

pub async fn mark_closed(db: &DbConn, guild_id: GuildId, ticket_id: i32, now: DateTime<Utc>) -> Result<(), Error> {
    ticket::Ticket::update_many()
        .col_expr(ticket::Column::Open, Expr::value(false))
        .col_expr(ticket::Column::CloseTime, Expr::value(Some(now)))
        .filter(ticket::Column::GuildId.eq(guild_to_db(guild_id)))
        .filter(ticket::Column::Id.eq(ticket_id))
        .exec(db).await
        .map_err(Error::SeaORM)?;
    log_info!("Ticket {} du serveur {} fermé", ticket_id, guild_id);
    Ok(())
}

pub async fn reopen(db: &DbConn, guild_id: GuildId, ticket_id: i32) -> Result<(), Error> {
    restore_open(db, guild_id, ticket_id, TicketStatus::Open).await
}

/// Annule `mark_closed` : le ticket redevient ouvert avec le statut `status`
pub async fn restore_open(db: &DbConn, guild_id: GuildId, ticket_id: i32, status: TicketStatus) -> Result<(), Error> {
    ticket::Ticket::update_many()
        .col_expr(ticket::Column::Open, Expr::value(true))
        .col_expr(ticket::Column::CloseTime, Expr::value(Option::<DateTime<Utc>>::None))
        .col_expr(ticket::Column::Status, Expr::value(status))
        .filter(ticket::Column::GuildId.eq(guild_to_db(guild_id)))
        .filter(ticket::Column::Id.eq(ticket_id))
        .exec(db).await
        .map_err(Error::SeaORM)?;
    Ok(())
}

pub async fn set_panel(db: &DbConn, guild_id: GuildId, ticket_id: i32, panel_id: i32) -> Result<(), Error> {
    ticket::Ticket::update_many()
        .col_expr(ticket::Column::PanelId, Expr::value(Some(panel_id)))
        .filter(ticket::Column::GuildId.eq(guild_to_db(guild_id)))
        .filter(ticket::Column::Id.eq(ticket_id))
        .exec(db).await
        .map_err(Error::SeaORM)?;
    Ok(())
}

pub async fn set_status(db: &DbConn, guild_id: GuildId, ticket_id: i32, status: TicketStatus) -> Result<(), Error> {
    ticket::Ticket::update_many()
        .col_expr(ticket::Column::Status, Expr::value(status))
        .filter(ticket::Column::GuildId.eq(guild_to_db(guild_id)))
        .filter(ticket::Column::Id.eq(ticket_id))
        .exec(db).await
        .map_err(Error::SeaORM)?;
    Ok(())
}

pub async fn set_welcome_message(db: &DbConn, guild_id: GuildId, ticket_id: i32, message_id: MessageId) -> Result<(), Error> {
    ticket::Ticket::update_many()
        .col_expr(ticket::Column::WelcomeMessageId, Expr::value(Some(message_to_db(message_id))))
        .filter(ticket::Column::GuildId.eq(guild_to_db(guild_id)))
        .filter(ticket::Column::Id.eq(ticket_id))
        .exec(db).await
        .map_err(Error::SeaORM)?;
    Ok(())
}

pub async fn set_join_message(db: &DbConn, guild_id: GuildId, ticket_id: i32, message_id: Option<MessageId>) -> Result<(), Error> {
    ticket::Ticket::update_many()
        .col_expr(ticket::Column::JoinMessageId, Expr::value(message_id.map(message_to_db)))
        .filter(ticket::Column::GuildId.eq(guild_to_db(guild_id)))
        .filter(ticket::Column::Id.eq(ticket_id))
        .exec(db).await
        .map_err(Error::SeaORM)?;
    Ok(())
}

/* Claims */

pub async fn claimer(db: &DbConn, guild_id: GuildId, ticket_id: i32) -> Result<Option<UserId>, Error> {
    let claim = claim::Entity::find_by_id((guild_to_db(guild_id), ticket_id)).one(db).await.map_err(Error::SeaORM)?;
    Ok(claim.map(|c| c.claimer()))
}

/// Enregistre la prise en charge. `false` si le ticket est déjà pris en charge, y compris par
/// une prise en charge concurrente.
pub async fn set_claim(db: &DbConn, guild_id: GuildId, ticket_id: i32, user_id: UserId) -> Result<bool, Error> {
    let insert = claim::Entity::insert(claim::ActiveModel {
        guild_id: Set(guild_to_db(guild_id)),
        ticket_id: Set(ticket_id),
        user_id: Set(user_to_db(user_id)),
    }).on_conflict(
        OnConflict::columns([claim::Column::GuildId, claim::Column::TicketId])
            .do_nothing()
            .to_owned()
    );
    let res = db.execute(insert.build(db.get_database_backend())).await.map_err(Error::SeaORM)?;
    Ok(res.rows_affected() > 0)
}

/// `false` si le ticket n'était pas pris en charge
pub async fn delete_claim(db: &DbConn, guild_id: GuildId, ticket_id: i32) -> Result<bool, Error> {
    let res = claim::Entity::delete_by_id((guild_to_db(guild_id), ticket_id)).exec(db).await.map_err(Error::SeaORM)?;
    Ok(res.rows_affected > 0)
}

/* Extra members */

pub async fn members(db: &DbConn, guild_id: GuildId, ticket_id: i32) -> Result<Vec<UserId>, Error> {
    let members = member::Entity::find()
        .filter(member::Column::GuildId.eq(guild_to_db(guild_id)))
        .filter(member::Column::TicketId.eq(ticket_id))
        .all(db).await
        .map_err(Error::SeaORM)?;
    Ok(members.into_iter().map(|m| UserId(m.user_id as u64)).collect())
}

/// `false` si le membre faisait déjà partie du ticket
pub async fn add_member(db: &DbConn, guild_id: GuildId, ticket_id: i32, user_id: UserId) -> Result<bool, Error> {
    let key = (guild_to_db(guild_id), ticket_id, user_to_db(user_id));
    if member::Entity::find_by_id(key).one(db).await.map_err(Error::SeaORM)?.is_some() {
        return Ok(false);
    }
    member::Entity::insert(member::ActiveModel {
        guild_id: Set(key.0),
        ticket_id: Set(key.1),
        user_id: Set(key.2),
    }).exec(db).await.map_err(Error::SeaORM)?;
    Ok(true)
}

pub async fn remove_member(db: &DbConn, guild_id: GuildId, ticket_id: i32, user_id: UserId) -> Result<bool, Error> {
    let res = member::Entity::delete_by_id((guild_to_db(guild_id), ticket_id, user_to_db(user_id)))
        .exec(db).await
        .map_err(Error::SeaORM)?;
    Ok(res.rows_affected > 0)
}

/* Webhook */

pub async fn set_webhook(db: &DbConn, guild_id: GuildId, ticket_id: i32, webhook_id: u64, token: String) -> Result<(), Error> {
    webhook::Entity::insert(webhook::ActiveModel {
        guild_id: Set(guild_to_db(guild_id)),
        ticket_id: Set(ticket_id),
        webhook_id: Set(webhook_id as i64),
        token: Set(token),
    }).exec(db).await.map_err(Error::SeaORM)?;
    Ok(())
}

/// Supprime et renvoie le webhook enregistré du ticket
pub async fn take_webhook(db: &DbConn, guild_id: GuildId, ticket_id: i32) -> Result<Option<webhook::Model>, Error> {
    let key = (guild_to_db(guild_id), ticket_id);
    let found = webhook::Entity::find_by_id(key).one(db).await.map_err(Error::SeaORM)?;
    if found.is_some() {
        webhook::Entity::delete_by_id(key).exec(db).await.map_err(Error::SeaORM)?;
    }
    Ok(found)
}

/* Close requests */

pub async fn close_request(db: &DbConn, guild_id: GuildId, ticket_id: i32) -> Result<Option<close_request::Model>, Error> {
    close_request::Entity::find_by_id((guild_to_db(guild_id), ticket_id)).one(db).await.map_err(Error::SeaORM)
}

/// Remplace la demande précédente du ticket
pub async fn set_close_request(db: &DbConn, guild_id: GuildId, ticket_id: i32, requested_by: UserId, reason: Option<String>, now: DateTime<Utc>) -> Result<(), Error> {
    delete_close_request(db, guild_id, ticket_id).await?;
    close_request::Entity::insert(close_request::ActiveModel {
        guild_id: Set(guild_to_db(guild_id)),
        ticket_id: Set(ticket_id),
        requested_by: Set(user_to_db(requested_by)),
        reason: Set(reason),
        requested_at: Set(now),
    }).exec(db).await.map_err(Error::SeaORM)?;
    Ok(())
}

pub async fn delete_close_request(db: &DbConn, guild_id: GuildId, ticket_id: i32) -> Result<bool, Error> {
    let res = close_request::Entity::delete_by_id((guild_to_db(guild_id), ticket_id)).exec(db).await.map_err(Error::SeaORM)?;
    Ok(res.rows_affected > 0)
}

/* Auto-close exclusions */

pub async fn exclude_from_autoclose(db: &DbConn, guild_id: GuildId, ticket_id: i32) -> Result<(), Error> {
    if is_autoclose_excluded(db, guild_id, ticket_id).await? {
        return Ok(());
    }
    autoclose::Entity::insert(autoclose::ActiveModel {
        guild_id: Set(guild_to_db(guild_id)),
        ticket_id: Set(ticket_id),
    }).exec(db).await.map_err(Error::SeaORM)?;
    log_info!("Ticket {} du serveur {} exclu de la fermeture automatique", ticket_id, guild_id);
    Ok(())
}

pub async fn is_autoclose_excluded(db: &DbConn, guild_id: GuildId, ticket_id: i32) -> Result<bool, Error> {
    let found = autoclose::Entity::find_by_id((guild_to_db(guild_id), ticket_id)).one(db).await.map_err(Error::SeaORM)?;
    Ok(found.is_some())
}
