//! Moteur du cycle de vie des tickets
//!
//! Ouverture, prise en charge, changement de panel, réouverture et fermeture d'un ticket.
//! Chaque opération reçoit une [`Invocation`] (serveur, membre, deadline) et renvoie une
//! [`TicketError`] typée ; la mise en forme des réponses reste à la charge de l'appelant.
//!
//! Le moteur ne parle à Discord qu'à travers [`Platform`] et ne partage d'état entre les
//! invocations que via la base de données et le [`CoordinationStore`].

mod access;
mod archive;
pub mod capacity;
mod claim;
mod close;
mod close_request;
pub mod error;
mod members;
pub mod naming;
mod open;
mod pager;
pub mod permissions;
mod reopen;
mod sweep;
mod switch;

#[cfg(test)]
mod testing;
#[cfg(test)]
mod tests;

pub use access::PermissionLevel;
pub use close::{CloseOptions, CloseOutcome};
pub use error::{ErrorKind, Result, TicketError};
pub use open::OpenedTicket;
pub use pager::PagedResult;

use std::{future::Future, sync::Arc, time::Duration};
use sea_orm::DatabaseConnection;
use serenity::model::{
    id::{ChannelId, GuildId, RoleId, UserId},
    permissions::Permissions,
};
use crate::{
    config::EngineConfig,
    coordination::CoordinationStore,
    db::{controller, model::ticket},
    platform::{MemberProfile, OverwriteTarget, Platform, PremiumLookup},
};
use permissions::{BotGrant, BOT_EXTRA};

/// Durée de vie des identifiants mis en cache dans le store de coordination
const ID_CACHE_TTL: Duration = Duration::from_secs(600);

/// Qui déclenche une opération, où, et combien de temps elle peut durer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invocation {
    pub guild_id: GuildId,
    pub user_id: UserId,
    /// Deadline de l'opération. `None` : celle de la configuration.
    pub deadline: Option<Duration>,
}

impl Invocation {
    pub fn new(guild_id: GuildId, user_id: UserId) -> Self {
        Self { guild_id, user_id, deadline: None }
    }
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Le moteur de tickets
pub struct TicketEngine {
    /// Connexion a la base de données
    database: Arc<DatabaseConnection>,
    platform: Arc<dyn Platform>,
    store: Arc<dyn CoordinationStore>,
    premium: Arc<dyn PremiumLookup>,
    config: EngineConfig,
}

impl TicketEngine {
    pub fn new(database: Arc<DatabaseConnection>, platform: Arc<dyn Platform>, store: Arc<dyn CoordinationStore>, premium: Arc<dyn PremiumLookup>, config: EngineConfig) -> Self {
        Self { database, platform, store, premium, config }
    }
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
    #[inline]
    fn db(&self) -> &DatabaseConnection {
        &self.database
    }

    /// Borne `fut` par la deadline de l'invocation
    async fn bounded<T, F>(&self, inv: &Invocation, fut: F) -> Result<T>
        where F: Future<Output = Result<T>>
    {
        let deadline = inv.deadline.unwrap_or_else(|| self.config.operation_timeout());
        match tokio::time::timeout(deadline, fut).await {
            Ok(res) => res,
            Err(_) => Err(TicketError::Timeout),
        }
    }

    /// Ticket associé à un salon ou à un fil
    pub async fn ticket_by_channel(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<Option<ticket::Model>> {
        Ok(controller::ticket::by_channel(self.db(), guild_id, channel_id).await?)
    }

    async fn load_ticket(&self, guild_id: GuildId, ticket_id: i32) -> Result<ticket::Model> {
        controller::ticket::get(self.db(), guild_id, ticket_id).await?
            .ok_or(TicketError::TicketNotFound)
    }

    /// Profil d'un membre. Un membre parti du serveur est remplacé par un profil minimal.
    async fn profile_or_placeholder(&self, guild_id: GuildId, user_id: UserId) -> Result<MemberProfile> {
        match self.platform.member(guild_id, user_id).await {
            Ok(profile) => Ok(profile),
            Err(e) if e.is_not_found() => Ok(MemberProfile {
                user_id,
                username: user_id.0.to_string(),
                nickname: None,
                roles: vec![],
                permissions: Permissions::empty(),
                is_owner: false,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Permissions que le bot peut accorder dans `scope` (une catégorie), ou au niveau du serveur
    async fn bot_grant(&self, guild_id: GuildId, scope: Option<ChannelId>, target: OverwriteTarget) -> Result<BotGrant> {
        let bot = self.platform.member(guild_id, self.platform.bot_id()).await?;
        let overwrites = match scope {
            Some(scope) => self.platform.channel(scope).await?.map(|c| c.overwrites).unwrap_or_default(),
            None => vec![],
        };
        let extra = permissions::effective_permissions(guild_id, &bot, &overwrites) & BOT_EXTRA;
        Ok(BotGrant { target, extra })
    }

    /// Rôle d'intégration du bot s'il en a un, le bot lui-même sinon
    async fn bot_claim_target(&self, guild_id: GuildId) -> Result<OverwriteTarget> {
        let key = format!("tickets:integration_role:{}", guild_id);
        let role = match self.store.get(&key).await? {
            Some(cached) => cached.parse::<u64>().ok().map(RoleId),
            None => {
                let role = self.platform.integration_role(guild_id).await?;
                let value = role.map_or_else(|| "none".to_string(), |r| r.0.to_string());
                self.store.set(&key, &value, Some(ID_CACHE_TTL)).await?;
                role
            }
        };
        Ok(role.map_or(OverwriteTarget::Member(self.platform.bot_id()), OverwriteTarget::Role))
    }

    /// Salon de messages privés avec `user_id`, mis en cache
    async fn dm_channel(&self, user_id: UserId) -> Result<ChannelId> {
        let key = format!("tickets:dm_channel:{}", user_id);
        if let Some(id) = self.store.get(&key).await?.and_then(|v| v.parse::<u64>().ok()) {
            return Ok(ChannelId(id));
        }
        let channel = self.platform.create_dm_channel(user_id).await?;
        self.store.set(&key, &channel.0.to_string(), Some(ID_CACHE_TTL)).await?;
        Ok(channel)
    }

    /// La fermeture automatique doit-elle ignorer ce ticket ?
    pub async fn is_autoclose_excluded(&self, guild_id: GuildId, ticket_id: i32) -> Result<bool> {
        Ok(controller::ticket::is_autoclose_excluded(self.db(), guild_id, ticket_id).await?)
    }
}
