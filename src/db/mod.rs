pub mod model;
pub mod controller;

use sea_orm::{Database, DbConn, DbErr, Schema, ConnectionTrait, TransactionTrait};
use serenity::model::id::{ChannelId, GuildId, MessageId, RoleId, UserId};

/// Type des identifiants Discord en base. Les snowflakes tiennent sur 63 bits.
pub type IDType = i64;

pub async fn start_db(url: &str) -> Result<DbConn, DbErr> {
    let db = Database::connect(url).await?;
    check_tables(&db).await?;
    Ok(db)
}

async fn check_tables(db: &DbConn) -> Result<(), DbErr> {
    use model::{guild, panel, ticket};
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);
    let transaction = db.begin().await?;

    transaction.execute(builder.build(schema.create_table_from_entity(guild::settings::Entity).if_not_exists())).await?;
    transaction.execute(builder.build(schema.create_table_from_entity(guild::claim_settings::Entity).if_not_exists())).await?;
    transaction.execute(builder.build(schema.create_table_from_entity(guild::staff::Entity).if_not_exists())).await?;
    transaction.execute(builder.build(schema.create_table_from_entity(guild::blacklist::Entity).if_not_exists())).await?;
    transaction.execute(builder.build(schema.create_table_from_entity(panel::Entity).if_not_exists())).await?;
    transaction.execute(builder.build(schema.create_table_from_entity(panel::access_rule::Entity).if_not_exists())).await?;
    transaction.execute(builder.build(schema.create_table_from_entity(panel::mention::Entity).if_not_exists())).await?;
    transaction.execute(builder.build(schema.create_table_from_entity(panel::support::Entity).if_not_exists())).await?;
    transaction.execute(builder.build(schema.create_table_from_entity(ticket::Entity).if_not_exists())).await?;
    transaction.execute(builder.build(schema.create_table_from_entity(ticket::claim::Entity).if_not_exists())).await?;
    transaction.execute(builder.build(schema.create_table_from_entity(ticket::member::Entity).if_not_exists())).await?;
    transaction.execute(builder.build(schema.create_table_from_entity(ticket::participant::Entity).if_not_exists())).await?;
    transaction.execute(builder.build(schema.create_table_from_entity(ticket::transcript::Entity).if_not_exists())).await?;
    transaction.execute(builder.build(schema.create_table_from_entity(ticket::close_reason::Entity).if_not_exists())).await?;
    transaction.execute(builder.build(schema.create_table_from_entity(ticket::close_request::Entity).if_not_exists())).await?;
    transaction.execute(builder.build(schema.create_table_from_entity(ticket::webhook::Entity).if_not_exists())).await?;
    transaction.execute(builder.build(schema.create_table_from_entity(ticket::autoclose::Entity).if_not_exists())).await?;
    transaction.commit().await?;

    Ok(())
}

#[inline]
pub fn guild_to_db(id: GuildId) -> IDType { id.0 as IDType }
#[inline]
pub fn user_to_db(id: UserId) -> IDType { id.0 as IDType }
#[inline]
pub fn role_to_db(id: RoleId) -> IDType { id.0 as IDType }
#[inline]
pub fn channel_to_db(id: ChannelId) -> IDType { id.0 as IDType }
#[inline]
pub fn message_to_db(id: MessageId) -> IDType { id.0 as IDType }

#[cfg(test)]
pub async fn memory_db() -> DbConn {
    start_db("sqlite::memory:").await.expect("base de données en mémoire")
}
