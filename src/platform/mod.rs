//! Accès à la plateforme de discussion.
//!
//! Le moteur ne parle jamais directement à serenity : il passe par le trait [`Platform`], et
//! chaque appel distant est un point de suspension explicite qu'un test peut simuler. Les
//! identifiants et les permissions sont les types de serenity.
//!
//! [`discord::SerenityPlatform`] est l'implémentation de production.

pub mod discord;

use std::fmt;
use serenity::{
    async_trait,
    model::{
        channel::{PermissionOverwrite, PermissionOverwriteType},
        id::{ChannelId, GuildId, MessageId, RoleId, UserId, WebhookId},
        permissions::Permissions,
    },
};

pub type Result<T> = std::result::Result<T, PlatformError>;

#[derive(Debug)]
pub enum PlatformError {
    /// 403 : il manque une permission au bot
    Forbidden(String),
    /// 404 : salon, message ou membre inconnu
    NotFound(String),
    Http { status: u16, message: String },
    Serenity(serenity::Error),
    Other(String),
}

impl PlatformError {
    #[inline]
    pub fn is_forbidden(&self) -> bool {
        matches!(self, PlatformError::Forbidden(_))
    }
    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, PlatformError::NotFound(_))
    }
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformError::Forbidden(msg) => write!(f, "accès refusé : {}", msg),
            PlatformError::NotFound(msg) => write!(f, "introuvable : {}", msg),
            PlatformError::Http { status, message } => write!(f, "http {}: {}", status, message),
            PlatformError::Serenity(e) => write!(f, "{}", e),
            PlatformError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for PlatformError {}

/// Cible d'une surcharge de permissions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OverwriteTarget {
    Role(RoleId),
    Member(UserId),
}

/// Permissions accordées et refusées à une cible sur un salon.
///
/// Équivalent du [`PermissionOverwrite`] de serenity, mais comparable : deux ensembles de
/// surcharges peuvent être comparés avant de modifier le salon distant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Overwrite {
    pub target: OverwriteTarget,
    pub allow: Permissions,
    pub deny: Permissions,
}

impl Overwrite {
    pub fn member(user: UserId, allow: Permissions, deny: Permissions) -> Self {
        Self { target: OverwriteTarget::Member(user), allow, deny }
    }
    pub fn role(role: RoleId, allow: Permissions, deny: Permissions) -> Self {
        Self { target: OverwriteTarget::Role(role), allow, deny }
    }
}

impl From<Overwrite> for PermissionOverwrite {
    fn from(ow: Overwrite) -> Self {
        PermissionOverwrite {
            allow: ow.allow,
            deny: ow.deny,
            kind: match ow.target {
                OverwriteTarget::Role(id) => PermissionOverwriteType::Role(id),
                OverwriteTarget::Member(id) => PermissionOverwriteType::Member(id),
            },
        }
    }
}

impl Overwrite {
    pub fn from_serenity(ow: &PermissionOverwrite) -> Option<Self> {
        let target = match ow.kind {
            PermissionOverwriteType::Role(id) => OverwriteTarget::Role(id),
            PermissionOverwriteType::Member(id) => OverwriteTarget::Member(id),
            #[allow(unreachable_patterns)]
            _ => return None,
        };
        Some(Self { target, allow: ow.allow, deny: ow.deny })
    }
}

/// Compare deux ensembles de surcharges sans tenir compte de l'ordre
pub fn same_overwrites(a: &[Overwrite], b: &[Overwrite]) -> bool {
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort_by_key(|ow| ow.target);
    b.sort_by_key(|ow| ow.target);
    a == b
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Text,
    Category,
    Thread,
    Voice,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSummary {
    pub id: ChannelId,
    pub guild_id: GuildId,
    pub name: String,
    pub kind: ChannelKind,
    pub parent_id: Option<ChannelId>,
    pub overwrites: Vec<Overwrite>,
}

impl ChannelSummary {
    #[inline]
    pub fn is_thread(&self) -> bool {
        self.kind == ChannelKind::Thread
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberProfile {
    pub user_id: UserId,
    pub username: String,
    pub nickname: Option<String>,
    pub roles: Vec<RoleId>,
    /// Permissions au niveau du serveur, avant toute surcharge de salon
    pub permissions: Permissions,
    pub is_owner: bool,
}

impl MemberProfile {
    pub fn display_name(&self) -> &str {
        self.nickname.as_deref().filter(|n| !n.is_empty()).unwrap_or(&self.username)
    }
}

/// Un message de l'historique d'un salon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    pub id: MessageId,
    pub author_id: UserId,
    pub author_name: String,
    pub content: String,
    pub attachments: Vec<String>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookCredentials {
    pub id: WebhookId,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChannel {
    pub name: String,
    pub category: Option<ChannelId>,
    pub overwrites: Vec<Overwrite>,
}

/// Modification partielle d'un salon. Les champs à `None` ne sont pas modifiés.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelEdit {
    pub name: Option<String>,
    pub overwrites: Option<Vec<Overwrite>>,
    /// `Some(None)` déplace le salon à la racine du serveur
    pub category: Option<Option<ChannelId>>,
}

impl ChannelEdit {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.overwrites.is_none() && self.category.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonStyle {
    Primary,
    Secondary,
    Success,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub custom_id: String,
    pub label: String,
    pub style: ButtonStyle,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Embed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub color: Option<u32>,
    pub fields: Vec<(String, String, bool)>,
}

/// Message produit par le moteur. Le rendu revient à l'implémentation de la plateforme.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePayload {
    pub content: Option<String>,
    pub embed: Option<Embed>,
    pub buttons: Vec<Button>,
    /// Utilisé seulement pour les réponses aux interactions
    pub ephemeral: bool,
}

impl MessagePayload {
    pub fn text<S: Into<String>>(content: S) -> Self {
        Self { content: Some(content.into()), ..Default::default() }
    }
    pub fn embed(embed: Embed) -> Self {
        Self { embed: Some(embed), ..Default::default() }
    }
    pub fn with_button<S: Into<String>, L: Into<String>>(mut self, custom_id: S, label: L, style: ButtonStyle) -> Self {
        self.buttons.push(Button { custom_id: custom_id.into(), label: label.into(), style });
        self
    }
    pub fn ephemeral(mut self) -> Self {
        self.ephemeral = true;
        self
    }
}

pub const COLOR_INFO: u32 = 0x00C9FF;
pub const COLOR_SUCCESS: u32 = 0x1ED760;
pub const COLOR_ERROR: u32 = 0xFF0000;
pub const COLOR_WARN: u32 = 0xFFB800;

/// Embed avec le titre et la couleur habituels
pub fn custom_embed<S1: ToString, S2: ToString>(title: S1, description: S2, color: u32) -> MessagePayload {
    MessagePayload::embed(Embed {
        title: Some(title.to_string()),
        description: Some(description.to_string()),
        color: Some(color),
        fields: vec![],
    })
}
pub fn error<S: ToString>(message: S) -> MessagePayload {
    custom_embed("Erreur", message, COLOR_ERROR)
}
pub fn warn<S: ToString>(message: S) -> MessagePayload {
    custom_embed("Attention", message, COLOR_WARN)
}
pub fn success<S: ToString>(message: S) -> MessagePayload {
    custom_embed("Effectué", message, COLOR_SUCCESS)
}
pub fn info<S: ToString>(message: S) -> MessagePayload {
    custom_embed("Information", message, COLOR_INFO)
}

/// Opérations distantes dont le moteur a besoin sur la plateforme
#[async_trait]
pub trait Platform: Send + Sync {
    fn bot_id(&self) -> UserId;

    /// Salons d'un serveur hors fils, catégories comprises. Peut venir d'un cache.
    async fn guild_channels(&self, guild_id: GuildId) -> Result<Vec<ChannelSummary>>;
    /// Vide la liste des salons en cache d'un serveur et la récupère à nouveau
    async fn refresh_guild_channels(&self, guild_id: GuildId) -> Result<()>;
    /// `Ok(None)` si le salon n'existe plus
    async fn channel(&self, channel_id: ChannelId) -> Result<Option<ChannelSummary>>;
    async fn member(&self, guild_id: GuildId, user_id: UserId) -> Result<MemberProfile>;
    /// Rôle géré du bot sur le serveur, s'il en a un
    async fn integration_role(&self, guild_id: GuildId) -> Result<Option<RoleId>>;

    async fn create_channel(&self, guild_id: GuildId, channel: NewChannel) -> Result<ChannelSummary>;
    async fn create_thread(&self, parent_id: ChannelId, name: String) -> Result<ChannelSummary>;
    async fn add_thread_member(&self, thread_id: ChannelId, user_id: UserId) -> Result<()>;
    async fn remove_thread_member(&self, thread_id: ChannelId, user_id: UserId) -> Result<()>;
    async fn edit_channel(&self, channel_id: ChannelId, edit: ChannelEdit) -> Result<()>;
    async fn create_member_overwrite(&self, channel_id: ChannelId, overwrite: Overwrite) -> Result<()>;
    async fn delete_member_overwrite(&self, channel_id: ChannelId, user_id: UserId) -> Result<()>;
    async fn set_thread_state(&self, thread_id: ChannelId, archived: bool, locked: bool) -> Result<()>;
    async fn delete_channel(&self, channel_id: ChannelId) -> Result<()>;

    async fn send_message(&self, channel_id: ChannelId, message: MessagePayload) -> Result<MessageId>;
    async fn pin_message(&self, channel_id: ChannelId, message_id: MessageId) -> Result<()>;
    async fn delete_message(&self, channel_id: ChannelId, message_id: MessageId) -> Result<()>;
    /// Une page d'historique, du plus récent au plus ancien, strictement avant `before` s'il est donné
    async fn fetch_messages(&self, channel_id: ChannelId, before: Option<MessageId>, limit: u8) -> Result<Vec<HistoryMessage>>;

    async fn create_webhook(&self, channel_id: ChannelId, name: String) -> Result<WebhookCredentials>;
    async fn delete_webhook(&self, webhook: WebhookCredentials) -> Result<()>;
    async fn create_dm_channel(&self, user_id: UserId) -> Result<ChannelId>;
}

/// Canal de réponse à l'interaction d'origine
#[async_trait]
pub trait Responder: Send + Sync {
    async fn reply(&self, message: MessagePayload) -> Result<()>;
}

/// Niveau premium d'un serveur, requis pour le webhook par ticket
#[async_trait]
pub trait PremiumLookup: Send + Sync {
    async fn is_premium(&self, guild_id: GuildId) -> bool;
}

/// Pour les instances auto-hébergées : tous les serveurs sont premium
pub struct SelfHosted;

#[async_trait]
impl PremiumLookup for SelfHosted {
    async fn is_premium(&self, _: GuildId) -> bool {
        true
    }
}
