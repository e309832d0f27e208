//! Stockage de coordination partagé.
//!
//! Contient ce sur quoi les invocations concurrentes doivent s'accorder : le verrou de
//! création par serveur, le jeton de rafraîchissement du cache des salons, le débit
//! d'ouverture, les petits caches à expiration et les résultats paginés. [`MemoryStore`] sert
//! un seul processus, `RedisStore` (feature `redis`) sert plusieurs shards.

mod memory;
#[cfg(feature = "redis")]
mod redis_store;
mod ratelimit;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;

use std::{fmt, sync::Arc, time::Duration};
use serenity::{async_trait, model::id::GuildId};
use crate::{log_error, log_warn};

pub type Result<T> = std::result::Result<T, CoordinationError>;

#[derive(Debug)]
pub enum CoordinationError {
    LockTimeout(String),
    Backend(String),
}

impl fmt::Display for CoordinationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinationError::LockTimeout(key) => write!(f, "délai dépassé en attente du verrou {}", key),
            CoordinationError::Backend(msg) => write!(f, "stockage de coordination : {}", msg),
        }
    }
}

impl std::error::Error for CoordinationError {}

#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Prend `key` pour `owner` si personne ne la détient. Le verrou expire après `ttl`.
    async fn try_lock(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool>;
    /// Relâche `key` seulement si `owner` la détient encore
    async fn unlock(&self, key: &str, owner: &str) -> Result<bool>;
    /// Enregistre `value` sauf si `key` existe déjà
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    /// Prend un jeton du débit `key` : `burst` jetons d'un coup, puis un par `period`.
    /// `false` quand le débit est épuisé.
    async fn take_token(&self, key: &str, burst: u32, period: Duration) -> Result<bool>;
}

const LOCK_RETRY: Duration = Duration::from_millis(25);
/// Durée de vie d'un verrou de création : un détenteur planté ne bloque pas le serveur au-delà
const LOCK_TTL: Duration = Duration::from_secs(30);

fn create_lock_key(guild_id: GuildId) -> String {
    format!("tickets:create_lock:{}", guild_id)
}

/// Verrou de création de tickets, un par serveur.
///
/// Relâché une seule fois : explicitement par [`CreateLock::release`], sinon à la destruction
/// du garde depuis une tâche de fond avec son propre délai.
pub struct CreateLock {
    store: Arc<dyn CoordinationStore>,
    key: String,
    owner: String,
    unlock_timeout: Duration,
    released: bool,
}

impl CreateLock {
    /// Tente de prendre le verrou jusqu'à ce qu'il soit libre ou que `timeout` expire
    pub async fn acquire(store: Arc<dyn CoordinationStore>, guild_id: GuildId, timeout: Duration, unlock_timeout: Duration) -> Result<Self> {
        let key = create_lock_key(guild_id);
        let owner = uuid::Uuid::new_v4().to_string();
        let attempt = async {
            loop {
                if store.try_lock(&key, &owner, LOCK_TTL).await? {
                    return Ok::<(), CoordinationError>(());
                }
                tokio::time::sleep(LOCK_RETRY).await;
            }
        };
        let outcome = tokio::time::timeout(timeout, attempt).await;
        match outcome {
            Ok(Ok(())) => Ok(Self { store, key, owner, unlock_timeout, released: false }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CoordinationError::LockTimeout(key)),
        }
    }
    /// Relâche le verrou sous un nouveau délai, indépendant de celui de l'appelant
    pub async fn release(mut self) {
        self.released = true;
        unlock(self.store.clone(), std::mem::take(&mut self.key), std::mem::take(&mut self.owner), self.unlock_timeout).await;
    }
    /// Le verrou est relâché par ailleurs : la destruction ne le relâche pas
    pub fn disarm(mut self) {
        self.released = true;
    }
}

async fn unlock(store: Arc<dyn CoordinationStore>, key: String, owner: String, timeout: Duration) {
    match tokio::time::timeout(timeout, store.unlock(&key, &owner)).await {
        Ok(Ok(true)) => (),
        Ok(Ok(false)) => log_warn!("Le verrou {} n'était plus détenu par {}", key, owner),
        Ok(Err(e)) => log_error!("Impossible de relâcher le verrou {}: {}", key, e),
        Err(_) => log_error!("Délai dépassé en relâchant le verrou {}", key),
    }
}

impl Drop for CreateLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let store = self.store.clone();
        let key = std::mem::take(&mut self.key);
        let owner = std::mem::take(&mut self.owner);
        let timeout = self.unlock_timeout;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(unlock(store, key, owner, timeout));
            }
            Err(_) => log_error!("Verrou {} détruit hors d'un runtime, laissé à expiration", key),
        }
    }
}

/// Autorise un seul rafraîchissement du cache des salons d'un serveur par `ttl`
pub async fn take_refresh_token(store: &dyn CoordinationStore, guild_id: GuildId, ttl: Duration) -> Result<bool> {
    store.set_nx(&format!("tickets:channel_refresh:{}", guild_id), "1", ttl).await
}

/// Débit d'ouverture de tickets d'un serveur, partagé par toutes les instances du stockage
pub async fn take_open_token(store: &dyn CoordinationStore, guild_id: GuildId, burst: u32, period: Duration) -> Result<bool> {
    store.take_token(&format!("tickets:open_rate:{}", guild_id), burst, period).await
}
