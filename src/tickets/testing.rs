//! Plateforme simulée pour les tests du moteur

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use serenity::{
    async_trait,
    model::{
        id::{ChannelId, GuildId, MessageId, RoleId, UserId, WebhookId},
        permissions::Permissions,
    },
};
use crate::{
    config::EngineConfig,
    coordination::{CoordinationStore, MemoryStore},
    db::memory_db,
    platform::{
        ChannelEdit, ChannelKind, ChannelSummary, HistoryMessage, MemberProfile, MessagePayload,
        NewChannel, Overwrite, OverwriteTarget, Platform, PlatformError, Responder, Result,
        SelfHosted, WebhookCredentials,
    },
};
use super::{Invocation, TicketEngine};

pub const GUILD: GuildId = GuildId(1);
pub const BOT: UserId = UserId(999);
pub const OPENER: UserId = UserId(100);
pub const SUPPORT: UserId = UserId(200);
pub const OTHER_SUPPORT: UserId = UserId(201);
pub const ADMIN: UserId = UserId(300);
pub const STRANGER: UserId = UserId(400);
pub const SUPPORT_ROLE: RoleId = RoleId(20);

#[derive(Debug, Clone, Copy)]
pub enum Failure {
    Forbidden,
    Server,
}

#[derive(Default)]
struct MockState {
    next_id: u64,
    channels: BTreeMap<ChannelId, ChannelSummary>,
    /// Liste des salons telle que vue par le cache, par serveur
    cache: HashMap<GuildId, Vec<ChannelSummary>>,
    members: HashMap<(GuildId, UserId), MemberProfile>,
    /// Historique des salons, du plus ancien au plus récent
    histories: HashMap<ChannelId, Vec<HistoryMessage>>,
    thread_members: HashMap<ChannelId, HashSet<UserId>>,
    thread_states: HashMap<ChannelId, (bool, bool)>,
    sent: Vec<(ChannelId, MessagePayload)>,
    deleted_webhooks: Vec<WebhookId>,
    fetches: usize,
    refreshes: usize,
    calls: Vec<String>,
    failures: HashMap<&'static str, Failure>,
    delays: HashMap<&'static str, Duration>,
}

pub struct MockPlatform {
    state: Mutex<MockState>,
}

impl MockPlatform {
    pub fn new() -> Self {
        let platform = Self { state: Mutex::new(MockState { next_id: 10_000, ..Default::default() }) };
        platform.add_member(BOT, vec![], Permissions::all() - Permissions::ADMINISTRATOR);
        platform.add_member(OPENER, vec![], Permissions::empty());
        platform.add_member(SUPPORT, vec![SUPPORT_ROLE], Permissions::empty());
        platform.add_member(OTHER_SUPPORT, vec![SUPPORT_ROLE], Permissions::empty());
        platform.add_member(ADMIN, vec![], Permissions::ADMINISTRATOR);
        platform.add_member(STRANGER, vec![], Permissions::empty());
        platform
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_id(state: &mut MockState) -> u64 {
        state.next_id += 1;
        state.next_id
    }

    /// Enregistre l'appel, attend le délai injecté pour `op` et renvoie l'erreur injectée,
    /// s'il y en a
    async fn call(&self, op: &'static str) -> Result<()> {
        let delay = {
            let mut state = self.state();
            state.calls.push(op.to_string());
            state.delays.get(op).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.state().failures.get(op) {
            Some(Failure::Forbidden) => Err(PlatformError::Forbidden(format!("{} refusé", op))),
            Some(Failure::Server) => Err(PlatformError::Http { status: 500, message: format!("{} en échec", op) }),
            None => Ok(()),
        }
    }

    pub fn fail_on(&self, op: &'static str, failure: Failure) {
        self.state().failures.insert(op, failure);
    }

    pub fn delay_on(&self, op: &'static str, delay: Duration) {
        self.state().delays.insert(op, delay);
    }

    pub fn add_member(&self, user_id: UserId, roles: Vec<RoleId>, permissions: Permissions) {
        self.state().members.insert((GUILD, user_id), MemberProfile {
            user_id,
            username: format!("user{}", user_id.0),
            nickname: None,
            roles,
            permissions,
            is_owner: false,
        });
    }

    fn insert_channel(&self, name: &str, kind: ChannelKind, parent_id: Option<ChannelId>) -> ChannelId {
        let mut state = self.state();
        let id = ChannelId(Self::next_id(&mut state));
        let channel = ChannelSummary { id, guild_id: GUILD, name: name.to_string(), kind, parent_id, overwrites: vec![] };
        if kind != ChannelKind::Thread {
            if let Some(cache) = state.cache.get_mut(&GUILD) {
                cache.push(channel.clone());
            }
        }
        state.channels.insert(id, channel);
        id
    }

    pub fn add_category(&self, name: &str) -> ChannelId {
        self.insert_channel(name, ChannelKind::Category, None)
    }

    pub fn add_text_channel(&self, name: &str, parent_id: Option<ChannelId>) -> ChannelId {
        self.insert_channel(name, ChannelKind::Text, parent_id)
    }

    /// Remplit `parent` (ou la racine) avec `count` salons textuels
    pub fn fill(&self, parent_id: Option<ChannelId>, count: usize) {
        for i in 0..count {
            self.add_text_channel(&format!("filler-{}", i), parent_id);
        }
    }

    /// Cache figé sur l'état actuel : les salons supprimés ensuite y restent
    pub fn freeze_cache(&self) {
        let mut state = self.state();
        let snapshot = Self::snapshot(&state);
        state.cache.insert(GUILD, snapshot);
    }

    pub fn remove_channel(&self, channel_id: ChannelId) {
        self.state().channels.remove(&channel_id);
    }

    /// Ajoute `count` messages de `author` à l'historique de `channel_id`
    pub fn push_history(&self, channel_id: ChannelId, author: UserId, count: usize) {
        let mut state = self.state();
        for _ in 0..count {
            let id = MessageId(Self::next_id(&mut state));
            let timestamp = state.histories.get(&channel_id).map_or(0, |h| h.len() as i64);
            state.histories.entry(channel_id).or_default().push(HistoryMessage {
                id,
                author_id: author,
                author_name: format!("user{}", author.0),
                content: format!("message {}", timestamp),
                attachments: vec![],
                timestamp,
            });
        }
    }

    pub fn channel_summary(&self, channel_id: ChannelId) -> Option<ChannelSummary> {
        self.state().channels.get(&channel_id).cloned()
    }

    pub fn overwrite(&self, channel_id: ChannelId, target: OverwriteTarget) -> Option<Overwrite> {
        self.channel_summary(channel_id)?.overwrites.into_iter().find(|ow| ow.target == target)
    }

    pub fn rename(&self, channel_id: ChannelId, name: &str) {
        if let Some(channel) = self.state().channels.get_mut(&channel_id) {
            channel.name = name.to_string();
        }
    }

    pub fn channel_count(&self, kind: ChannelKind) -> usize {
        self.state().channels.values().filter(|c| c.kind == kind).count()
    }

    pub fn thread_members(&self, thread_id: ChannelId) -> HashSet<UserId> {
        self.state().thread_members.get(&thread_id).cloned().unwrap_or_default()
    }

    pub fn thread_state(&self, thread_id: ChannelId) -> Option<(bool, bool)> {
        self.state().thread_states.get(&thread_id).copied()
    }

    pub fn sent_to(&self, channel_id: ChannelId) -> Vec<MessagePayload> {
        self.state().sent.iter().filter(|(id, _)| *id == channel_id).map(|(_, m)| m.clone()).collect()
    }

    pub fn fetches(&self) -> usize {
        self.state().fetches
    }

    pub fn refreshes(&self) -> usize {
        self.state().refreshes
    }

    pub fn calls(&self, op: &str) -> usize {
        self.state().calls.iter().filter(|c| c.as_str() == op).count()
    }

    pub fn deleted_webhooks(&self) -> Vec<WebhookId> {
        self.state().deleted_webhooks.clone()
    }

    fn snapshot(state: &MockState) -> Vec<ChannelSummary> {
        state.channels.values()
            .filter(|c| c.guild_id == GUILD && c.kind != ChannelKind::Thread)
            .cloned()
            .collect()
    }

    fn not_found<T>(what: impl std::fmt::Display) -> Result<T> {
        Err(PlatformError::NotFound(what.to_string()))
    }
}

#[async_trait]
impl Platform for MockPlatform {
    fn bot_id(&self) -> UserId {
        BOT
    }

    async fn guild_channels(&self, guild_id: GuildId) -> Result<Vec<ChannelSummary>> {
        self.call("guild_channels").await?;
        let mut state = self.state();
        if let Some(cached) = state.cache.get(&guild_id) {
            return Ok(cached.clone());
        }
        let snapshot = Self::snapshot(&state);
        state.cache.insert(guild_id, snapshot.clone());
        Ok(snapshot)
    }

    async fn refresh_guild_channels(&self, guild_id: GuildId) -> Result<()> {
        self.call("refresh_guild_channels").await?;
        let mut state = self.state();
        state.refreshes += 1;
        let snapshot = Self::snapshot(&state);
        state.cache.insert(guild_id, snapshot);
        Ok(())
    }

    async fn channel(&self, channel_id: ChannelId) -> Result<Option<ChannelSummary>> {
        self.call("channel").await?;
        Ok(self.channel_summary(channel_id))
    }

    async fn member(&self, guild_id: GuildId, user_id: UserId) -> Result<MemberProfile> {
        self.call("member").await?;
        match self.state().members.get(&(guild_id, user_id)) {
            Some(member) => Ok(member.clone()),
            None => Self::not_found(format!("membre {}", user_id)),
        }
    }

    async fn integration_role(&self, _: GuildId) -> Result<Option<RoleId>> {
        self.call("integration_role").await?;
        Ok(None)
    }

    async fn create_channel(&self, guild_id: GuildId, channel: NewChannel) -> Result<ChannelSummary> {
        self.call("create_channel").await?;
        let id = self.insert_channel(&channel.name, ChannelKind::Text, channel.category);
        let mut state = self.state();
        let created = state.channels.get_mut(&id).map(|c| {
            c.guild_id = guild_id;
            c.overwrites = channel.overwrites;
            c.clone()
        });
        match created {
            Some(created) => Ok(created),
            None => Self::not_found(id),
        }
    }

    async fn create_thread(&self, parent_id: ChannelId, name: String) -> Result<ChannelSummary> {
        self.call("create_thread").await?;
        if self.channel_summary(parent_id).is_none() {
            return Self::not_found(parent_id);
        }
        let id = self.insert_channel(&name, ChannelKind::Thread, Some(parent_id));
        self.state().thread_members.entry(id).or_default().insert(BOT);
        self.channel_summary(id).map_or_else(|| Self::not_found(id), Ok)
    }

    async fn add_thread_member(&self, thread_id: ChannelId, user_id: UserId) -> Result<()> {
        self.call("add_thread_member").await?;
        self.state().thread_members.entry(thread_id).or_default().insert(user_id);
        Ok(())
    }

    async fn remove_thread_member(&self, thread_id: ChannelId, user_id: UserId) -> Result<()> {
        self.call("remove_thread_member").await?;
        self.state().thread_members.entry(thread_id).or_default().remove(&user_id);
        Ok(())
    }

    async fn edit_channel(&self, channel_id: ChannelId, edit: ChannelEdit) -> Result<()> {
        self.call("edit_channel").await?;
        let mut state = self.state();
        let channel = match state.channels.get_mut(&channel_id) {
            Some(channel) => channel,
            None => return Self::not_found(channel_id),
        };
        if let Some(name) = edit.name {
            channel.name = name;
        }
        if let Some(overwrites) = edit.overwrites {
            channel.overwrites = overwrites;
        }
        if let Some(category) = edit.category {
            channel.parent_id = category;
        }
        Ok(())
    }

    async fn create_member_overwrite(&self, channel_id: ChannelId, overwrite: Overwrite) -> Result<()> {
        self.call("create_member_overwrite").await?;
        let mut state = self.state();
        let channel = match state.channels.get_mut(&channel_id) {
            Some(channel) => channel,
            None => return Self::not_found(channel_id),
        };
        channel.overwrites.retain(|ow| ow.target != overwrite.target);
        channel.overwrites.push(overwrite);
        Ok(())
    }

    async fn delete_member_overwrite(&self, channel_id: ChannelId, user_id: UserId) -> Result<()> {
        self.call("delete_member_overwrite").await?;
        let mut state = self.state();
        match state.channels.get_mut(&channel_id) {
            Some(channel) => {
                channel.overwrites.retain(|ow| ow.target != OverwriteTarget::Member(user_id));
                Ok(())
            }
            None => Self::not_found(channel_id),
        }
    }

    async fn set_thread_state(&self, thread_id: ChannelId, archived: bool, locked: bool) -> Result<()> {
        self.call("set_thread_state").await?;
        self.state().thread_states.insert(thread_id, (archived, locked));
        Ok(())
    }

    async fn delete_channel(&self, channel_id: ChannelId) -> Result<()> {
        self.call("delete_channel").await?;
        let mut state = self.state();
        if state.channels.remove(&channel_id).is_none() {
            return Self::not_found(channel_id);
        }
        if let Some(cache) = state.cache.get_mut(&GUILD) {
            cache.retain(|c| c.id != channel_id);
        }
        Ok(())
    }

    async fn send_message(&self, channel_id: ChannelId, message: MessagePayload) -> Result<MessageId> {
        self.call("send_message").await?;
        let mut state = self.state();
        let id = MessageId(Self::next_id(&mut state));
        state.sent.push((channel_id, message));
        Ok(id)
    }

    async fn pin_message(&self, _: ChannelId, _: MessageId) -> Result<()> {
        self.call("pin_message").await
    }

    async fn delete_message(&self, _: ChannelId, _: MessageId) -> Result<()> {
        self.call("delete_message").await
    }

    async fn fetch_messages(&self, channel_id: ChannelId, before: Option<MessageId>, limit: u8) -> Result<Vec<HistoryMessage>> {
        self.call("fetch_messages").await?;
        let mut state = self.state();
        state.fetches += 1;
        let history = state.histories.get(&channel_id).cloned().unwrap_or_default();
        Ok(history.into_iter()
            .filter(|m| before.map_or(true, |before| m.id < before))
            .rev()
            .take(limit as usize)
            .collect())
    }

    async fn create_webhook(&self, _: ChannelId, _: String) -> Result<WebhookCredentials> {
        self.call("create_webhook").await?;
        let mut state = self.state();
        Ok(WebhookCredentials { id: WebhookId(Self::next_id(&mut state)), token: "token".to_string() })
    }

    async fn delete_webhook(&self, webhook: WebhookCredentials) -> Result<()> {
        self.call("delete_webhook").await?;
        self.state().deleted_webhooks.push(webhook.id);
        Ok(())
    }

    async fn create_dm_channel(&self, user_id: UserId) -> Result<ChannelId> {
        self.call("create_dm_channel").await?;
        Ok(ChannelId(1_000_000 + user_id.0))
    }
}

/// Garde les réponses envoyées à l'interaction
#[derive(Default)]
pub struct MockResponder {
    pub replies: Mutex<Vec<MessagePayload>>,
}

#[async_trait]
impl Responder for MockResponder {
    async fn reply(&self, message: MessagePayload) -> Result<()> {
        self.replies.lock().unwrap_or_else(|e| e.into_inner()).push(message);
        Ok(())
    }
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        thread_archive_delay_ms: 0,
        operation_timeout_ms: 10_000,
        ..Default::default()
    }
}

pub async fn engine_with(platform: Arc<MockPlatform>, config: EngineConfig) -> TicketEngine {
    engine_with_store(platform, config, Arc::new(MemoryStore::new())).await
}

/// Moteur branché sur un stockage de coordination donné, partageable entre plusieurs moteurs
pub async fn engine_with_store(platform: Arc<MockPlatform>, config: EngineConfig, store: Arc<dyn CoordinationStore>) -> TicketEngine {
    TicketEngine::new(
        Arc::new(memory_db().await),
        platform,
        store,
        Arc::new(SelfHosted),
        config,
    )
}

pub async fn engine(platform: Arc<MockPlatform>) -> TicketEngine {
    engine_with(platform, test_config()).await
}

pub fn inv(user_id: UserId) -> Invocation {
    Invocation::new(GUILD, user_id)
}
