use chrono::Utc;
use futures::try_join;
use serenity::{async_trait, model::{id::{ChannelId, GuildId, MessageId, UserId}, permissions::Permissions}};
use crate::{
    coordination::{self, CreateLock},
    db::{controller::{self, ticket::NewTicket}, model::ticket},
    platform::{
        ButtonStyle, ChannelKind, ChannelSummary, Embed, MemberProfile, MessagePayload,
        NewChannel, OverwriteTarget, Responder,
    },
    log_error, log_info, log_warn,
};
use super::{
    access::{panel_access_allowed, PermissionLevel, TicketScope},
    capacity::{self, CapacityError, CapacityHost, OverflowSettings},
    naming::{generate_channel_name, NameContext},
    permissions::{build_creation_overwrites, BotGrant},
    Invocation, Result, TicketEngine, TicketError,
};

/// Ticket ouvert avec succès
#[derive(Debug, Clone)]
pub struct OpenedTicket {
    pub ticket: ticket::Model,
    pub channel_id: ChannelId,
}

/// Où créer le ticket
#[derive(Debug, Clone, Copy)]
enum Target {
    /// Salon dans une catégorie, `None` pour la racine
    Channel(Option<ChannelId>),
    /// Fil dans un salon textuel
    Thread(ChannelId),
}

/// Accès aux salons d'un serveur pour le contrôle de capacité
pub(crate) struct GuildChannels<'a> {
    pub engine: &'a TicketEngine,
    pub guild_id: GuildId,
}

#[async_trait]
impl<'a> CapacityHost for GuildChannels<'a> {
    async fn channels(&self) -> std::result::Result<Vec<ChannelSummary>, CapacityError> {
        Ok(self.engine.platform.guild_channels(self.guild_id).await?)
    }
    async fn refresh(&self) -> std::result::Result<bool, CapacityError> {
        let ttl = self.engine.config.refresh_token_ttl();
        if !coordination::take_refresh_token(self.engine.store.as_ref(), self.guild_id, ttl).await? {
            return Ok(false);
        }
        log_info!("Rafraîchissement du cache des salons du serveur {}", self.guild_id);
        self.engine.platform.refresh_guild_channels(self.guild_id).await?;
        Ok(true)
    }
    async fn disable_overflow(&self) -> std::result::Result<(), CapacityError> {
        Ok(controller::guild::disable_overflow(self.engine.db(), self.guild_id).await?)
    }
}

impl TicketEngine {
    /// Ouvre un ticket, avec ou sans panel.
    ///
    /// La création de la ligne du ticket est le seul point sérialisé par serveur : le verrou
    /// de création couvre les contrôles de limites et l'attribution de l'identifiant, puis est
    /// relâché avant la création du salon. Si une étape échoue une fois la ligne créée, le
    /// ticket est fermé et le salon éventuellement créé est supprimé.
    pub async fn open(&self, inv: Invocation, panel_id: Option<i32>, responder: &dyn Responder) -> Result<OpenedTicket> {
        self.bounded(&inv, self.open_ticket(inv, panel_id, responder)).await
    }

    async fn open_ticket(&self, inv: Invocation, panel_id: Option<i32>, responder: &dyn Responder) -> Result<OpenedTicket> {
        let guild_id = inv.guild_id;
        let opener = self.platform.member(guild_id, inv.user_id).await?;
        if controller::guild::is_blacklisted(self.db(), guild_id, opener.user_id, &opener.roles).await? {
            return Err(TicketError::Blacklisted);
        }
        let scope = self.load_scope(guild_id, panel_id, None).await?;
        if let (Some(id), None) = (panel_id, &scope.panel) {
            return Err(TicketError::PanelNotFound(id));
        }

        let lock = CreateLock::acquire(self.store.clone(), guild_id, self.config.lock_timeout(), self.config.unlock_timeout()).await?;

        if scope.level(&opener) == PermissionLevel::Everyone {
            self.check_ticket_limit(guild_id, opener.user_id, &scope).await?;
        }
        if !coordination::take_open_token(self.store.as_ref(), guild_id, self.config.rate_limit_burst, self.config.rate_limit_period()).await? {
            return Err(TicketError::RateLimited);
        }
        if let Some(panel) = &scope.panel {
            if panel.disabled || panel.force_disabled {
                return Err(TicketError::PanelDisabled);
            }
            let rules = controller::panel::access_rules(self.db(), panel.id).await?;
            if !panel_access_allowed(&rules, guild_id, &opener.roles) {
                return Err(TicketError::PanelAccessDenied);
            }
        }
        let target = self.resolve_target(guild_id, &scope).await?;

        let ticket = controller::ticket::create(self.db(), NewTicket {
            guild_id,
            opener_id: opener.user_id,
            panel_id: scope.panel.as_ref().map(|p| p.id),
            is_thread: matches!(target, Target::Thread(_)),
        }, Utc::now()).await?;
        lock.release().await;

        let mut created = None;
        match self.provision(&opener, &scope, &ticket, target, responder, &mut created).await {
            Ok(channel_id) => {
                log_info!("Ticket {} ouvert par {} dans le serveur {}", ticket.id, opener.user_id, guild_id);
                let ticket = self.load_ticket(guild_id, ticket.id).await?;
                Ok(OpenedTicket { ticket, channel_id })
            }
            Err(e) => {
                log_error!("Erreur lors de l'ouverture du ticket {} du serveur {}: {}", ticket.id, guild_id, e);
                self.abort_open(guild_id, ticket.id, created).await;
                Err(e)
            }
        }
    }

    /// Limite de tickets ouverts par membre : celle du panel si elle est définie, sinon celle du serveur
    pub(crate) async fn check_ticket_limit(&self, guild_id: GuildId, opener: UserId, scope: &TicketScope) -> Result<()> {
        let (limit, panel_id) = match scope.panel.as_ref().and_then(|p| p.own_ticket_limit().map(|l| (l, p.id))) {
            Some((limit, panel_id)) => (limit, Some(panel_id)),
            None => (scope.settings.ticket_limit.max(0) as u64, None),
        };
        if limit == 0 {
            return Ok(());
        }
        let open = controller::ticket::count_open_by_opener(self.db(), guild_id, opener, panel_id).await?;
        if open >= limit {
            return Err(TicketError::TicketLimit(limit));
        }
        Ok(())
    }

    async fn resolve_target(&self, guild_id: GuildId, scope: &TicketScope) -> Result<Target> {
        let use_threads = scope.panel.as_ref().map_or(scope.settings.use_threads, |p| p.use_threads);
        if use_threads {
            let parent = scope.panel.as_ref()
                .and_then(|p| p.thread_parent())
                .or_else(|| scope.settings.thread_parent())
                .ok_or(TicketError::InvalidThreadParent)?;
            return match self.platform.channel(parent).await? {
                Some(channel) if channel.kind == ChannelKind::Text => Ok(Target::Thread(parent)),
                _ => Err(TicketError::InvalidThreadParent),
            };
        }
        let requested = match &scope.panel {
            Some(panel) => panel.category(),
            None => scope.settings.channel_category(),
        };
        let overflow = OverflowSettings {
            enabled: scope.settings.overflow_enabled,
            category: scope.settings.overflow_category(),
        };
        let host = GuildChannels { engine: self, guild_id };
        let category = capacity::resolve_creation_category(&host, requested, overflow).await?;
        Ok(Target::Channel(category))
    }

    /// Crée le salon ou le fil du ticket et envoie les messages d'ouverture
    async fn provision(&self, opener: &MemberProfile, scope: &TicketScope, ticket: &ticket::Model, target: Target, responder: &dyn Responder, created: &mut Option<ChannelId>) -> Result<ChannelId> {
        let guild_id = ticket.guild();
        let name = generate_channel_name(&NameContext {
            scheme: scope.naming_scheme(),
            username_naming: scope.settings.username_naming,
            ticket_id: ticket.id,
            opener,
            claimer: None,
            now: ticket.open_time,
        });
        let bot_target = OverwriteTarget::Member(self.platform.bot_id());
        let (channel, grant) = match target {
            Target::Thread(parent) => {
                let thread = self.platform.create_thread(parent, name).await?;
                *created = Some(thread.id);
                self.platform.add_thread_member(thread.id, opener.user_id).await?;
                let grant = self.bot_grant(guild_id, Some(parent), bot_target).await?;
                (thread, grant)
            }
            Target::Channel(category) => {
                let grant = self.bot_grant(guild_id, category, bot_target).await?;
                let overwrites = build_creation_overwrites(&scope.audience(guild_id, opener.user_id, grant));
                let channel = self.platform.create_channel(guild_id, NewChannel { name, category, overwrites }).await?;
                *created = Some(channel.id);
                (channel, grant)
            }
        };
        controller::ticket::set_channel(self.db(), guild_id, ticket.id, channel.id).await?;

        let reply = async {
            let payload = MessagePayload::text(format!("Ticket créé : <#{}>", channel.id.0)).ephemeral();
            Ok::<(), TicketError>(responder.reply(payload).await?)
        };
        let join_message = async {
            if ticket.is_thread {
                self.post_join_message(ticket, channel.id, scope).await;
            }
            Ok::<(), TicketError>(())
        };
        try_join!(
            reply,
            self.send_welcome(ticket, channel.id, scope),
            self.send_mentions(ticket, channel.id, scope),
            self.create_ticket_webhook(ticket, channel.id, grant),
            join_message,
        )?;
        Ok(channel.id)
    }

    async fn send_welcome(&self, ticket: &ticket::Model, channel_id: ChannelId, scope: &TicketScope) -> Result<()> {
        let text = scope.panel.as_ref()
            .and_then(|p| p.welcome_message.clone())
            .or_else(|| scope.settings.welcome_message.clone())
            .unwrap_or_else(|| "Merci d'avoir ouvert un ticket, un membre du staff va vous répondre.\nQuand tout est réglé, appuyez sur \"Fermer le ticket\".".to_string());
        let title = scope.panel.as_ref().map_or_else(|| format!("Ticket #{}", ticket.id), |p| format!("{} #{}", p.title, ticket.id));
        let mut payload = MessagePayload::embed(Embed {
            title: Some(title),
            description: Some(text),
            color: Some(crate::platform::COLOR_INFO),
            fields: vec![],
        });
        payload.content = Some(format!("<@{}>", ticket.opener().0));
        payload = payload.with_button("tickets_close", "Fermer le ticket", ButtonStyle::Danger);
        if !ticket.is_thread {
            payload = payload.with_button("tickets_claim", "Prendre en charge", ButtonStyle::Success);
        }
        let message_id = self.platform.send_message(channel_id, payload).await?;
        if let Err(e) = self.platform.pin_message(channel_id, message_id).await {
            log_warn!("Erreur lors du pin du message de bienvenue du ticket {} (serveur {}): {}", ticket.id, ticket.guild(), e);
        }
        controller::ticket::set_welcome_message(self.db(), ticket.guild(), ticket.id, message_id).await?;
        Ok(())
    }

    /// Mentionne les rôles du panel, l'auteur et @here selon la configuration du panel
    async fn send_mentions(&self, ticket: &ticket::Model, channel_id: ChannelId, scope: &TicketScope) -> Result<()> {
        let panel = match &scope.panel {
            Some(panel) => panel,
            None => return Ok(()),
        };
        let mut mentions = controller::panel::mention_roles(self.db(), panel.id).await?
            .into_iter()
            .map(|role| format!("<@&{}>", role.0))
            .collect::<Vec<_>>();
        if panel.mention_opener {
            mentions.push(format!("<@{}>", ticket.opener().0));
        }
        if panel.mention_here {
            mentions.push("@here".to_string());
        }
        if mentions.is_empty() {
            return Ok(());
        }
        let message_id = self.platform.send_message(channel_id, MessagePayload::text(mentions.join(" "))).await?;
        if panel.delete_mentions {
            if let Err(e) = self.platform.delete_message(channel_id, message_id).await {
                log_warn!("Erreur lors de la suppression des mentions du ticket {} (serveur {}): {}", ticket.id, ticket.guild(), e);
            }
        }
        Ok(())
    }

    /// Webhook du ticket, réservé aux serveurs premium. N'échoue jamais.
    async fn create_ticket_webhook(&self, ticket: &ticket::Model, channel_id: ChannelId, grant: BotGrant) -> Result<()> {
        if ticket.is_thread || !grant.extra.contains(Permissions::MANAGE_WEBHOOKS) {
            return Ok(());
        }
        if !self.premium.is_premium(ticket.guild()).await {
            return Ok(());
        }
        match self.platform.create_webhook(channel_id, "Tickets".to_string()).await {
            Ok(webhook) => {
                if let Err(e) = controller::ticket::set_webhook(self.db(), ticket.guild(), ticket.id, webhook.id.0, webhook.token).await {
                    log_error!("Erreur lors de l'enregistrement du webhook du ticket {} (serveur {}): {}", ticket.id, ticket.guild(), e);
                }
            }
            Err(e) => log_warn!("Erreur lors de la création du webhook du ticket {} (serveur {}): {}", ticket.id, ticket.guild(), e),
        }
        Ok(())
    }

    /// Poste le message pour rejoindre un fil dans le salon de notifications du serveur
    pub(crate) async fn post_join_message(&self, ticket: &ticket::Model, thread_id: ChannelId, scope: &TicketScope) -> Option<MessageId> {
        let channel_id = scope.settings.notification_channel()?;
        let mut embed = Embed {
            title: Some(format!("Ticket #{}", ticket.id)),
            description: Some(format!("<@{}> a ouvert un ticket : <#{}>", ticket.opener().0, thread_id.0)),
            color: Some(crate::platform::COLOR_INFO),
            fields: vec![],
        };
        if let Some(panel) = &scope.panel {
            embed.fields.push(("Panel".to_string(), panel.title.clone(), true));
        }
        let message_id = match self.platform.send_message(channel_id, MessagePayload::embed(embed)).await {
            Ok(id) => id,
            Err(e) => {
                log_warn!("Erreur lors de l'envoi du message de notification du ticket {} (serveur {}): {}", ticket.id, ticket.guild(), e);
                return None;
            }
        };
        if let Err(e) = controller::ticket::set_join_message(self.db(), ticket.guild(), ticket.id, Some(message_id)).await {
            log_error!("Erreur lors de l'enregistrement du message de notification du ticket {}: {}", ticket.id, e);
        }
        Some(message_id)
    }

    /// Ferme un ticket dont l'ouverture a échoué, et supprime son salon s'il a été créé
    async fn abort_open(&self, guild_id: GuildId, ticket_id: i32, created: Option<ChannelId>) {
        if let Err(e) = controller::ticket::mark_closed(self.db(), guild_id, ticket_id, Utc::now()).await {
            log_error!("Impossible de fermer le ticket {} du serveur {} après un échec d'ouverture: {}", ticket_id, guild_id, e);
        }
        if let Some(channel_id) = created {
            if let Err(e) = self.platform.delete_channel(channel_id).await {
                log_warn!("Impossible de supprimer le salon {} du ticket {} (serveur {}): {}", channel_id, ticket_id, guild_id, e);
            }
        }
    }
}
