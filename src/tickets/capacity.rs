//! Limites de salons imposées par Discord et catégorie de débordement

use std::fmt;
use serenity::{async_trait, model::id::ChannelId};
use crate::{
    coordination::CoordinationError,
    db::controller::Error as DbError,
    platform::{ChannelKind, ChannelSummary, PlatformError},
    log_warn,
};

/// Salons (catégories comprises, fils exclus) par serveur
pub const GUILD_CHANNEL_LIMIT: usize = 500;
/// Salons par catégorie
pub const CATEGORY_CHANNEL_LIMIT: usize = 50;
/// Lectures de la liste des salons : la première, puis une après rafraîchissement du cache
const MAX_ATTEMPTS: usize = 2;

#[derive(Debug)]
pub enum CapacityError {
    GuildLimit,
    CategoryLimit,
    Platform(PlatformError),
    Data(DbError),
    Coordination(CoordinationError),
}

impl fmt::Display for CapacityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapacityError::GuildLimit => write!(f, "Le serveur a atteint la limite de {} salons.", GUILD_CHANNEL_LIMIT),
            CapacityError::CategoryLimit => write!(f, "La catégorie des tickets est pleine ({} salons).", CATEGORY_CHANNEL_LIMIT),
            CapacityError::Platform(e) => write!(f, "{}", e),
            CapacityError::Data(e) => write!(f, "{}", e),
            CapacityError::Coordination(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CapacityError {}

impl From<PlatformError> for CapacityError {
    fn from(e: PlatformError) -> Self {
        CapacityError::Platform(e)
    }
}
impl From<DbError> for CapacityError {
    fn from(e: DbError) -> Self {
        CapacityError::Data(e)
    }
}
impl From<CoordinationError> for CapacityError {
    fn from(e: CoordinationError) -> Self {
        CapacityError::Coordination(e)
    }
}

/// Accès aux salons d'un serveur et à ses paramètres de débordement
#[async_trait]
pub trait CapacityHost: Send + Sync {
    /// Salons du serveur hors fils, éventuellement depuis le cache
    async fn channels(&self) -> Result<Vec<ChannelSummary>, CapacityError>;
    /// Recharge le cache des salons. `Ok(false)` si un autre appel vient déjà de le faire.
    async fn refresh(&self) -> Result<bool, CapacityError>;
    /// Désactive le débordement du serveur
    async fn disable_overflow(&self) -> Result<(), CapacityError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverflowSettings {
    pub enabled: bool,
    /// `None` : racine du serveur
    pub category: Option<ChannelId>,
}

fn children(channels: &[ChannelSummary], category: ChannelId) -> usize {
    channels.iter().filter(|c| !c.is_thread() && c.parent_id == Some(category)).count()
}

fn category_exists(channels: &[ChannelSummary], category: ChannelId) -> bool {
    channels.iter().any(|c| c.id == category && c.kind == ChannelKind::Category)
}

/// La catégorie peut-elle recevoir un salon de plus ?
pub fn category_has_room(channels: &[ChannelSummary], category: ChannelId) -> bool {
    children(channels, category) < CATEGORY_CHANNEL_LIMIT
}

/// Catégorie où créer un salon de ticket.
///
/// `requested` à `None` désigne la racine du serveur, qui n'a pas de limite propre. Une
/// catégorie pleine bascule sur le débordement s'il est actif ; si la catégorie de
/// débordement a été supprimée, le débordement est désactivé.
pub async fn resolve_creation_category(host: &dyn CapacityHost, requested: Option<ChannelId>, overflow: OverflowSettings) -> Result<Option<ChannelId>, CapacityError> {
    let mut attempt = 1;
    let channels = loop {
        let channels = host.channels().await?;
        let count = channels.iter().filter(|c| !c.is_thread()).count();
        if count < GUILD_CHANNEL_LIMIT {
            break channels;
        }
        if attempt >= MAX_ATTEMPTS || !host.refresh().await? {
            return Err(CapacityError::GuildLimit);
        }
        attempt += 1;
    };

    let category = match requested {
        Some(category) if category_exists(&channels, category) => category,
        Some(category) => {
            log_warn!("La catégorie {} n'existe plus, ticket créé à la racine", category);
            return Ok(None);
        }
        None => return Ok(None),
    };
    if children(&channels, category) < CATEGORY_CHANNEL_LIMIT {
        return Ok(Some(category));
    }
    if !overflow.enabled || overflow.category == Some(category) {
        return Err(CapacityError::CategoryLimit);
    }
    match overflow.category {
        None => Ok(None),
        Some(overflow_category) if !category_exists(&channels, overflow_category) => {
            host.disable_overflow().await?;
            Err(CapacityError::CategoryLimit)
        }
        Some(overflow_category) if children(&channels, overflow_category) >= CATEGORY_CHANNEL_LIMIT => Err(CapacityError::CategoryLimit),
        Some(overflow_category) => Ok(Some(overflow_category)),
    }
}
