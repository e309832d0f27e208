use std::collections::BTreeSet;
use sea_orm::{entity::*, query::*, sea_query::Expr, DbConn, TransactionTrait};
use serenity::model::id::{GuildId, MessageId, UserId};
use crate::db::{
    guild_to_db, message_to_db, user_to_db,
    controller::Error,
    model::ticket::{close_reason, participant, transcript},
};
use crate::platform::HistoryMessage;
use crate::log_info;

/// Lignes par requête d'insertion. SQLite limite le nombre de variables d'une requête.
const INSERT_CHUNK: usize = 100;

/// Enregistre la transcription d'un ticket, du plus ancien message au plus récent, et ajoute
/// leurs auteurs aux participants.
///
/// Tout se fait dans une seule transaction. La transcription précédente du ticket (fermé puis
/// rouvert) est remplacée.
pub async fn save_transcript(db: &DbConn, guild_id: GuildId, ticket_id: i32, messages: &[HistoryMessage]) -> Result<(), Error> {
    let guild = guild_to_db(guild_id);
    let txn = db.begin().await.map_err(Error::SeaORM)?;

    transcript::Entity::delete_many()
        .filter(transcript::Column::GuildId.eq(guild))
        .filter(transcript::Column::TicketId.eq(ticket_id))
        .exec(&txn).await
        .map_err(Error::SeaORM)?;
    let rows = messages.iter().enumerate().map(|(position, msg)| transcript::ActiveModel {
        guild_id: Set(guild),
        ticket_id: Set(ticket_id),
        message_id: Set(message_to_db(msg.id)),
        position: Set(position as i32),
        author_id: Set(user_to_db(msg.author_id)),
        author_name: Set(msg.author_name.clone()),
        content: Set(msg.content.clone()),
        attachments: Set(msg.attachments.join("\n")),
        timestamp: Set(msg.timestamp),
    }).collect::<Vec<_>>();
    for chunk in rows.chunks(INSERT_CHUNK) {
        transcript::Entity::insert_many(chunk.to_vec()).exec(&txn).await.map_err(Error::SeaORM)?;
    }

    let known = participant::Entity::find()
        .filter(participant::Column::GuildId.eq(guild))
        .filter(participant::Column::TicketId.eq(ticket_id))
        .all(&txn).await
        .map_err(Error::SeaORM)?
        .into_iter()
        .map(|p| p.user_id)
        .collect::<BTreeSet<_>>();
    let new_participants = messages.iter()
        .map(|msg| user_to_db(msg.author_id))
        .filter(|id| !known.contains(id))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(|user_id| participant::ActiveModel {
            guild_id: Set(guild),
            ticket_id: Set(ticket_id),
            user_id: Set(user_id),
        })
        .collect::<Vec<_>>();
    for chunk in new_participants.chunks(INSERT_CHUNK) {
        participant::Entity::insert_many(chunk.to_vec()).exec(&txn).await.map_err(Error::SeaORM)?;
    }

    txn.commit().await.map_err(Error::SeaORM)?;
    log_info!("Transcription du ticket {} du serveur {} enregistrée ({} messages)", ticket_id, guild_id, messages.len());
    Ok(())
}

pub async fn transcript(db: &DbConn, guild_id: GuildId, ticket_id: i32) -> Result<Vec<transcript::Model>, Error> {
    transcript::Entity::find()
        .filter(transcript::Column::GuildId.eq(guild_to_db(guild_id)))
        .filter(transcript::Column::TicketId.eq(ticket_id))
        .order_by_asc(transcript::Column::Position)
        .all(db).await
        .map_err(Error::SeaORM)
}

pub async fn participants(db: &DbConn, guild_id: GuildId, ticket_id: i32) -> Result<Vec<UserId>, Error> {
    let found = participant::Entity::find()
        .filter(participant::Column::GuildId.eq(guild_to_db(guild_id)))
        .filter(participant::Column::TicketId.eq(ticket_id))
        .all(db).await
        .map_err(Error::SeaORM)?;
    Ok(found.into_iter().map(|p| UserId(p.user_id as u64)).collect())
}

pub async fn set_close_reason(db: &DbConn, guild_id: GuildId, ticket_id: i32, closed_by: Option<UserId>, reason: Option<String>) -> Result<(), Error> {
    let key = (guild_to_db(guild_id), ticket_id);
    close_reason::Entity::delete_by_id(key).exec(db).await.map_err(Error::SeaORM)?;
    close_reason::Entity::insert(close_reason::ActiveModel {
        guild_id: Set(key.0),
        ticket_id: Set(key.1),
        closed_by: Set(closed_by.map(user_to_db)),
        reason: Set(reason),
        archive_message_id: Set(None),
    }).exec(db).await.map_err(Error::SeaORM)?;
    Ok(())
}

pub async fn close_reason(db: &DbConn, guild_id: GuildId, ticket_id: i32) -> Result<Option<close_reason::Model>, Error> {
    close_reason::Entity::find_by_id((guild_to_db(guild_id), ticket_id)).one(db).await.map_err(Error::SeaORM)
}

pub async fn set_archive_message(db: &DbConn, guild_id: GuildId, ticket_id: i32, message_id: MessageId) -> Result<(), Error> {
    close_reason::Entity::update_many()
        .col_expr(close_reason::Column::ArchiveMessageId, Expr::value(Some(message_to_db(message_id))))
        .filter(close_reason::Column::GuildId.eq(guild_to_db(guild_id)))
        .filter(close_reason::Column::TicketId.eq(ticket_id))
        .exec(db).await
        .map_err(Error::SeaORM)?;
    Ok(())
}
