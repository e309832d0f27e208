use std::time::Duration;
use redis::{aio::MultiplexedConnection, AsyncCommands, Script};
use serenity::async_trait;
use super::{CoordinationError, CoordinationStore, Result};

impl From<redis::RedisError> for CoordinationError {
    fn from(e: redis::RedisError) -> Self {
        CoordinationError::Backend(e.to_string())
    }
}

lazy_static::lazy_static! {
    /// Supprime la clé seulement si elle contient encore le jeton de l'appelant
    static ref UNLOCK_SCRIPT: Script = Script::new(r#"
        if redis.call("GET", KEYS[1]) == ARGV[1] then
            return redis.call("DEL", KEYS[1])
        else
            return 0
        end
    "#);

    /// Compteur à fenêtre fixe : la fenêtre démarre au premier jeton pris
    static ref TOKEN_SCRIPT: Script = Script::new(r#"
        local count = redis.call("INCR", KEYS[1])
        if count == 1 then
            redis.call("PEXPIRE", KEYS[1], ARGV[1])
        end
        return count
    "#);
}

/// Stockage de coordination partagé entre shards via redis
pub struct RedisStore {
    connection: MultiplexedConnection,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let connection = client.get_multiplexed_async_connection().await?;
        Ok(Self { connection })
    }
}

#[async_trait]
impl CoordinationStore for RedisStore {
    async fn try_lock(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool> {
        self.set_nx(key, owner, ttl).await
    }
    async fn unlock(&self, key: &str, owner: &str) -> Result<bool> {
        let mut conn = self.connection.clone();
        let deleted: i64 = UNLOCK_SCRIPT.key(key).arg(owner).invoke_async(&mut conn).await?;
        Ok(deleted == 1)
    }
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.connection.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection.clone();
        Ok(conn.get(key).await?)
    }
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.connection.clone();
        match ttl {
            Some(ttl) => {
                let mut cmd = redis::cmd("SET");
                cmd.arg(key).arg(value).arg("PX").arg(ttl.as_millis() as u64);
                cmd.query_async::<_, ()>(&mut conn).await?;
            }
            None => conn.set::<_, _, ()>(key, value).await?,
        }
        Ok(())
    }
    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
    async fn take_token(&self, key: &str, burst: u32, period: Duration) -> Result<bool> {
        let burst = burst.max(1);
        // Même débit moyen que le seau en mémoire : `burst` jetons par `burst` périodes
        let window = period.saturating_mul(burst).as_millis().max(1) as u64;
        let mut conn = self.connection.clone();
        let count: u64 = TOKEN_SCRIPT.key(key).arg(window).invoke_async(&mut conn).await?;
        Ok(count <= burst as u64)
    }
}
