//! Implémentation serenity de [`Platform`]

use std::{collections::HashMap, sync::Arc};
use serenity::{
    async_trait,
    builder::{CreateComponents, CreateEmbed, CreateMessage, EditInteractionResponse},
    cache::Cache,
    http::{Http, HttpError},
    model::{
        application::component::ButtonStyle as SerenityButtonStyle,
        channel::{Channel, ChannelCategory, ChannelType, GuildChannel, Message, PermissionOverwrite, PermissionOverwriteType},
        id::{ChannelId, GuildId, MessageId, RoleId, UserId},
        permissions::Permissions,
    },
};
use tokio::sync::RwLock;
use crate::log_debug;
use super::*;

impl From<serenity::Error> for PlatformError {
    fn from(e: serenity::Error) -> Self {
        if let serenity::Error::Http(ref http) = e {
            if let HttpError::UnsuccessfulRequest(ref resp) = http.as_ref() {
                let status = resp.status_code.as_u16();
                let message = resp.error.message.clone();
                return match status {
                    403 => PlatformError::Forbidden(message),
                    404 => PlatformError::NotFound(message),
                    _ => PlatformError::Http { status, message },
                };
            }
        }
        PlatformError::Serenity(e)
    }
}

fn channel_kind(kind: ChannelType) -> ChannelKind {
    match kind {
        ChannelType::Text | ChannelType::News => ChannelKind::Text,
        ChannelType::Category => ChannelKind::Category,
        ChannelType::PublicThread | ChannelType::PrivateThread | ChannelType::NewsThread => ChannelKind::Thread,
        ChannelType::Voice | ChannelType::Stage => ChannelKind::Voice,
        _ => ChannelKind::Other,
    }
}

fn overwrites(raw: &[PermissionOverwrite]) -> Vec<Overwrite> {
    raw.iter().filter_map(Overwrite::from_serenity).collect()
}

impl From<&GuildChannel> for ChannelSummary {
    fn from(channel: &GuildChannel) -> Self {
        Self {
            id: channel.id,
            guild_id: channel.guild_id,
            name: channel.name.clone(),
            kind: channel_kind(channel.kind),
            parent_id: channel.parent_id,
            overwrites: overwrites(&channel.permission_overwrites),
        }
    }
}

impl From<&ChannelCategory> for ChannelSummary {
    fn from(category: &ChannelCategory) -> Self {
        Self {
            id: category.id,
            guild_id: category.guild_id,
            name: category.name.clone(),
            kind: ChannelKind::Category,
            parent_id: category.parent_id,
            overwrites: overwrites(&category.permission_overwrites),
        }
    }
}

impl From<&Message> for HistoryMessage {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            author_id: message.author.id,
            author_name: message.author.name.clone(),
            content: message.content.clone(),
            attachments: message.attachments.iter().map(|a| a.url.clone()).collect(),
            timestamp: message.timestamp.unix_timestamp(),
        }
    }
}

fn build_embed(e: &mut CreateEmbed, embed: Embed) -> &mut CreateEmbed {
    if let Some(title) = embed.title {
        e.title(title);
    }
    if let Some(description) = embed.description {
        e.description(description);
    }
    if let Some(color) = embed.color {
        e.color(color);
    }
    for (name, value, inline) in embed.fields {
        e.field(name, value, inline);
    }
    e
}

fn build_buttons(cmps: &mut CreateComponents, buttons: Vec<Button>) -> &mut CreateComponents {
    cmps.create_action_row(|row| {
        for button in buttons {
            row.create_button(|b| {
                b.custom_id(button.custom_id)
                    .label(button.label)
                    .style(match button.style {
                        ButtonStyle::Primary => SerenityButtonStyle::Primary,
                        ButtonStyle::Secondary => SerenityButtonStyle::Secondary,
                        ButtonStyle::Success => SerenityButtonStyle::Success,
                        ButtonStyle::Danger => SerenityButtonStyle::Danger,
                    })
            });
        }
        row
    })
}

fn render<'a, 'b>(m: &'b mut CreateMessage<'a>, message: MessagePayload) -> &'b mut CreateMessage<'a> {
    if let Some(content) = message.content {
        m.content(content);
    }
    if let Some(embed) = message.embed {
        m.embed(|e| build_embed(e, embed));
    }
    if !message.buttons.is_empty() {
        m.components(|cmps| build_buttons(cmps, message.buttons));
    }
    m
}

/// Remplit la réponse différée d'une interaction avec `message`
pub fn render_interaction(r: &mut EditInteractionResponse, message: MessagePayload) -> &mut EditInteractionResponse {
    if let Some(content) = message.content {
        r.content(content);
    }
    if let Some(embed) = message.embed {
        r.embed(|e| build_embed(e, embed));
    }
    r.components(|cmps| {
        if message.buttons.is_empty() {
            cmps
        } else {
            build_buttons(cmps, message.buttons)
        }
    })
}

/// [`Platform`] reposant sur le client HTTP et le cache de la gateway de serenity.
///
/// Les listes de salons des serveurs sont mises en cache ici plutôt que lues dans le cache de
/// la gateway, pour que [`Platform::refresh_guild_channels`] ait un sens précis.
pub struct SerenityPlatform {
    http: Arc<Http>,
    cache: Arc<Cache>,
    channels: RwLock<HashMap<GuildId, Vec<ChannelSummary>>>,
}

impl SerenityPlatform {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>) -> Self {
        Self {
            http,
            cache,
            channels: RwLock::new(HashMap::new()),
        }
    }
    #[inline]
    fn http(&self) -> &Http {
        &self.http
    }
    async fn fetch_guild_channels(&self, guild_id: GuildId) -> Result<Vec<ChannelSummary>> {
        let channels = guild_id.channels(self.http()).await?;
        let summaries = channels.values().map(ChannelSummary::from).collect::<Vec<_>>();
        log_debug!("Serveur {} : {} salons récupérés", guild_id, summaries.len());
        self.channels.write().await.insert(guild_id, summaries.clone());
        Ok(summaries)
    }
    async fn update_cached<F: FnOnce(&mut ChannelSummary)>(&self, channel_id: ChannelId, f: F) {
        let mut channels = self.channels.write().await;
        if let Some(summary) = channels.values_mut().flat_map(|list| list.iter_mut()).find(|c| c.id == channel_id) {
            f(summary);
        }
    }
}

#[async_trait]
impl Platform for SerenityPlatform {
    fn bot_id(&self) -> UserId {
        self.cache.current_user_id()
    }
    async fn guild_channels(&self, guild_id: GuildId) -> Result<Vec<ChannelSummary>> {
        if let Some(channels) = self.channels.read().await.get(&guild_id) {
            return Ok(channels.clone());
        }
        self.fetch_guild_channels(guild_id).await
    }
    async fn refresh_guild_channels(&self, guild_id: GuildId) -> Result<()> {
        self.channels.write().await.remove(&guild_id);
        self.fetch_guild_channels(guild_id).await.map(|_| ())
    }
    async fn channel(&self, channel_id: ChannelId) -> Result<Option<ChannelSummary>> {
        {
            let channels = self.channels.read().await;
            if let Some(summary) = channels.values().flat_map(|list| list.iter()).find(|c| c.id == channel_id) {
                return Ok(Some(summary.clone()));
            }
        }
        match self.http.get_channel(channel_id.0).await {
            Ok(Channel::Guild(channel)) => Ok(Some(ChannelSummary::from(&channel))),
            Ok(Channel::Category(category)) => Ok(Some(ChannelSummary::from(&category))),
            Ok(_) => Ok(None),
            Err(e) => match PlatformError::from(e) {
                PlatformError::NotFound(_) => Ok(None),
                e => Err(e),
            },
        }
    }
    async fn member(&self, guild_id: GuildId, user_id: UserId) -> Result<MemberProfile> {
        let member = match self.cache.member(guild_id, user_id) {
            Some(member) => member,
            None => self.http.get_member(guild_id.0, user_id.0).await?,
        };
        let (permissions, is_owner) = match self.cache.guild(guild_id) {
            Some(guild) => {
                let is_owner = guild.owner_id == user_id;
                let mut permissions = guild.roles.get(&RoleId(guild_id.0))
                    .map(|role| role.permissions)
                    .unwrap_or_else(Permissions::empty);
                for role in &member.roles {
                    if let Some(role) = guild.roles.get(role) {
                        permissions |= role.permissions;
                    }
                }
                if is_owner || permissions.contains(Permissions::ADMINISTRATOR) {
                    permissions = Permissions::all();
                }
                (permissions, is_owner)
            }
            None => (Permissions::empty(), false),
        };
        Ok(MemberProfile {
            user_id,
            username: member.user.name.clone(),
            nickname: member.nick.clone(),
            roles: member.roles.clone(),
            permissions,
            is_owner,
        })
    }
    async fn integration_role(&self, guild_id: GuildId) -> Result<Option<RoleId>> {
        let bot_id = self.bot_id();
        Ok(self.cache.guild(guild_id).and_then(|guild| {
            guild.roles.values()
                .find(|role| role.tags.bot_id == Some(bot_id))
                .map(|role| role.id)
        }))
    }
    async fn create_channel(&self, guild_id: GuildId, channel: NewChannel) -> Result<ChannelSummary> {
        let NewChannel { name, category, overwrites } = channel;
        let permissions = overwrites.into_iter().map(PermissionOverwrite::from).collect::<Vec<_>>();
        let created = guild_id.create_channel(self.http(), |c| {
            c.name(name).kind(ChannelType::Text).permissions(permissions);
            if let Some(category) = category {
                c.category(category);
            }
            c
        }).await?;
        let summary = ChannelSummary::from(&created);
        if let Some(list) = self.channels.write().await.get_mut(&guild_id) {
            list.push(summary.clone());
        }
        Ok(summary)
    }
    async fn create_thread(&self, parent_id: ChannelId, name: String) -> Result<ChannelSummary> {
        let thread = parent_id.create_private_thread(self.http(), |t| {
            t.name(name).kind(ChannelType::PrivateThread)
        }).await?;
        Ok(ChannelSummary::from(&thread))
    }
    async fn add_thread_member(&self, thread_id: ChannelId, user_id: UserId) -> Result<()> {
        Ok(thread_id.add_thread_member(self.http(), user_id).await?)
    }
    async fn remove_thread_member(&self, thread_id: ChannelId, user_id: UserId) -> Result<()> {
        Ok(thread_id.remove_thread_member(self.http(), user_id).await?)
    }
    async fn edit_channel(&self, channel_id: ChannelId, edit: ChannelEdit) -> Result<()> {
        let ChannelEdit { name, overwrites, category } = edit.clone();
        channel_id.edit(self.http(), |c| {
            if let Some(name) = name {
                c.name(name);
            }
            if let Some(overwrites) = overwrites {
                c.permissions(overwrites.into_iter().map(PermissionOverwrite::from));
            }
            if let Some(category) = category {
                c.category(category);
            }
            c
        }).await?;
        self.update_cached(channel_id, move |summary| {
            if let Some(name) = edit.name {
                summary.name = name;
            }
            if let Some(overwrites) = edit.overwrites {
                summary.overwrites = overwrites;
            }
            if let Some(category) = edit.category {
                summary.parent_id = category;
            }
        }).await;
        Ok(())
    }
    async fn create_member_overwrite(&self, channel_id: ChannelId, overwrite: Overwrite) -> Result<()> {
        channel_id.create_permission(self.http(), &PermissionOverwrite::from(overwrite)).await?;
        self.update_cached(channel_id, move |summary| {
            summary.overwrites.retain(|ow| ow.target != overwrite.target);
            summary.overwrites.push(overwrite);
        }).await;
        Ok(())
    }
    async fn delete_member_overwrite(&self, channel_id: ChannelId, user_id: UserId) -> Result<()> {
        channel_id.delete_permission(self.http(), PermissionOverwriteType::Member(user_id)).await?;
        self.update_cached(channel_id, move |summary| {
            summary.overwrites.retain(|ow| ow.target != OverwriteTarget::Member(user_id));
        }).await;
        Ok(())
    }
    async fn set_thread_state(&self, thread_id: ChannelId, archived: bool, locked: bool) -> Result<()> {
        thread_id.edit_thread(self.http(), |t| t.archived(archived).locked(locked)).await?;
        Ok(())
    }
    async fn delete_channel(&self, channel_id: ChannelId) -> Result<()> {
        channel_id.delete(self.http()).await?;
        let mut channels = self.channels.write().await;
        for list in channels.values_mut() {
            list.retain(|c| c.id != channel_id);
        }
        Ok(())
    }
    async fn send_message(&self, channel_id: ChannelId, message: MessagePayload) -> Result<MessageId> {
        let sent = channel_id.send_message(self.http(), |m| render(m, message)).await?;
        Ok(sent.id)
    }
    async fn pin_message(&self, channel_id: ChannelId, message_id: MessageId) -> Result<()> {
        Ok(channel_id.pin(self.http(), message_id).await?)
    }
    async fn delete_message(&self, channel_id: ChannelId, message_id: MessageId) -> Result<()> {
        Ok(channel_id.delete_message(self.http(), message_id).await?)
    }
    async fn fetch_messages(&self, channel_id: ChannelId, before: Option<MessageId>, limit: u8) -> Result<Vec<HistoryMessage>> {
        let messages = channel_id.messages(self.http(), |r| {
            if let Some(before) = before {
                r.before(before);
            }
            r.limit(limit as u64)
        }).await?;
        Ok(messages.iter().map(HistoryMessage::from).collect())
    }
    async fn create_webhook(&self, channel_id: ChannelId, name: String) -> Result<WebhookCredentials> {
        let webhook = channel_id.create_webhook(self.http(), name).await?;
        match webhook.token {
            Some(token) => Ok(WebhookCredentials { id: webhook.id, token }),
            None => Err(PlatformError::Other(format!("webhook {} créé sans jeton", webhook.id))),
        }
    }
    async fn delete_webhook(&self, webhook: WebhookCredentials) -> Result<()> {
        Ok(self.http.delete_webhook_with_token(webhook.id.0, &webhook.token).await?)
    }
    async fn create_dm_channel(&self, user_id: UserId) -> Result<ChannelId> {
        let map = serde_json::json!({ "recipient_id": user_id.0 });
        let channel = self.http.create_private_channel(&map).await?;
        Ok(channel.id)
    }
}
