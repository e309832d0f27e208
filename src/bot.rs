//! Core de l'application.
//! L'initialisation du bot et l'aiguillage des interactions vers le moteur de tickets se font
//! dans ce module.

use std::sync::Arc;
use chrono::Utc;
use serenity::{
    async_trait,
    client::{Context, EventHandler},
    http::Http,
    model::{
        application::interaction::{
            message_component::MessageComponentInteraction, Interaction, InteractionResponseType,
        },
        gateway::Ready,
        id::GuildId,
    },
    prelude::GatewayIntents,
    Client,
};
use tokio::sync::OnceCell;
use cddio_tickets::{
    config::Config,
    coordination::{CoordinationStore, MemoryStore},
    db,
    platform::{self, discord::{render_interaction, SerenityPlatform}, MessagePayload, Responder, SelfHosted},
    tickets::{CloseOptions, ErrorKind, Invocation, TicketEngine, TicketError},
    log_error, log_info, log_warn,
};

type Result<T> = std::result::Result<T, String>;

/// Structure du bot.
///
/// Il s'agit de la classe mère de l'application : elle possède le client Discord et le moteur
/// de tickets, partagé avec le gestionnaire d'événements.
pub struct Bot {
    /// Client discord de serenity
    client: Client,
    engine: Arc<TicketEngine>,
}

/// Réponse à une interaction différée
struct InteractionResponder<'a> {
    http: &'a Http,
    interaction: &'a MessageComponentInteraction,
}

#[async_trait]
impl<'a> Responder for InteractionResponder<'a> {
    async fn reply(&self, message: MessagePayload) -> platform::Result<()> {
        self.interaction.edit_original_interaction_response(self.http, |r| render_interaction(r, message)).await?;
        Ok(())
    }
}

/// Bouton cliqué, décodé depuis son `custom_id`
#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    Open(Option<i32>),
    Close,
    Claim,
    Unclaim,
    Reopen,
    AcceptClose,
    DenyClose,
    Page(String, usize),
}

impl Action {
    fn parse(custom_id: &str) -> Option<Self> {
        let mut parts = custom_id.split(':');
        let action = match parts.next()? {
            "tickets_open" => Action::Open(match parts.next() {
                Some(id) => Some(id.parse().ok()?),
                None => None,
            }),
            "tickets_close" => Action::Close,
            "tickets_claim" => Action::Claim,
            "tickets_unclaim" => Action::Unclaim,
            "tickets_reopen" => Action::Reopen,
            "tickets_close_accept" => Action::AcceptClose,
            "tickets_close_deny" => Action::DenyClose,
            "tickets_page" => {
                let id = parts.next()?.to_string();
                let index = parts.next()?.parse().ok()?;
                Action::Page(id, index)
            }
            _ => return None,
        };
        Some(action)
    }
}

struct Handler {
    engine: Arc<OnceCell<Arc<TicketEngine>>>,
}

impl Handler {
    async fn on_component(&self, ctx: &Context, component: &MessageComponentInteraction) {
        let action = match Action::parse(&component.data.custom_id) {
            Some(action) => action,
            None => return,
        };
        let (engine, guild_id) = match (self.engine.get(), component.guild_id) {
            (Some(engine), Some(guild_id)) => (engine, guild_id),
            _ => return,
        };
        let kind = match action {
            Action::Page(..) => InteractionResponseType::DeferredUpdateMessage,
            _ => InteractionResponseType::DeferredChannelMessageWithSource,
        };
        if let Err(e) = component.create_interaction_response(ctx, |resp| {
            resp.kind(kind).interaction_response_data(|data| data.ephemeral(true))
        }).await {
            log_warn!("Erreur lors de la création de l'interaction: {}", e);
            return;
        }
        let responder = InteractionResponder { http: &ctx.http, interaction: component };
        let inv = Invocation::new(guild_id, component.user.id);
        let result = match action {
            Action::Open(panel_id) => match engine.open(inv, panel_id, &responder).await {
                // L'ouverture répond elle-même à l'interaction
                Ok(_) => return,
                Err(e) => Err(e),
            },
            Action::Page(id, index) => engine.page(guild_id, &id, index).await,
            action => Self::on_ticket_action(engine, inv, guild_id, component, action).await,
        };
        let message = match result {
            Ok(message) => message,
            Err(e) => match e.kind() {
                ErrorKind::Validation | ErrorKind::Capacity | ErrorKind::RateLimit => platform::warn(e),
                _ => {
                    log_error!("Erreur lors du traitement de {}: {}", component.data.custom_id, e);
                    platform::error(e)
                }
            },
        };
        if let Err(e) = responder.reply(message).await {
            log_error!("Erreur lors de la modification de l'interaction: {}", e);
        }
    }

    /// Actions portant sur le ticket du salon où le bouton a été cliqué
    async fn on_ticket_action(engine: &TicketEngine, inv: Invocation, guild_id: GuildId, component: &MessageComponentInteraction, action: Action) -> std::result::Result<MessagePayload, TicketError> {
        let ticket = engine.ticket_by_channel(guild_id, component.channel_id).await?
            .ok_or(TicketError::TicketNotFound)?;
        let message = match action {
            Action::Close => {
                engine.close(inv, ticket.id, CloseOptions::default()).await?;
                "Ticket fermé.".to_string()
            }
            Action::Claim => {
                engine.claim(inv, ticket.id).await?;
                "Vous avez pris en charge ce ticket.".to_string()
            }
            Action::Unclaim => {
                engine.unclaim(inv, ticket.id).await?;
                "Ticket libéré.".to_string()
            }
            Action::Reopen => {
                engine.reopen(inv, ticket.id).await?;
                "Ticket rouvert.".to_string()
            }
            Action::AcceptClose => {
                engine.accept_close_request(inv, ticket.id).await?;
                "Ticket fermé.".to_string()
            }
            Action::DenyClose => {
                engine.deny_close_request(inv, ticket.id).await?;
                return Ok(platform::info("Le ticket reste ouvert."));
            }
            Action::Open(_) | Action::Page(..) => return Err(TicketError::TicketNotFound),
        };
        Ok(platform::success(message))
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _: Context, ready: Ready) {
        log_info!("{} est connecté", ready.user.name);
    }
    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::MessageComponent(component) = interaction {
            self.on_component(&ctx, &component).await;
        }
    }
}

impl Bot {
    /// Crée un nouveau bot et l'initialise.
    pub async fn new(config: &Config) -> Result<Bot> {
        let database = db::start_db(&config.database).await
            .map_err(|e| format!("Impossible d'ouvrir la base de données: {}", e))?;
        let store = Self::coordination_store(config).await?;
        let cell = Arc::new(OnceCell::new());
        let client = Client::builder(&config.token, GatewayIntents::GUILDS | GatewayIntents::GUILD_MEMBERS)
            .event_handler(Handler { engine: cell.clone() })
            .application_id(config.app_id)
            .await
            .map_err(|e| e.to_string())?;
        let platform = Arc::new(SerenityPlatform::new(client.cache_and_http.http.clone(), client.cache_and_http.cache.clone()));
        let engine = Arc::new(TicketEngine::new(Arc::new(database), platform, store, Arc::new(SelfHosted), config.tickets.clone()));
        if cell.set(engine.clone()).is_err() {
            return Err("Moteur de tickets déjà initialisé".to_string());
        }
        Ok(Bot { client, engine })
    }

    #[cfg(feature = "redis")]
    async fn coordination_store(config: &Config) -> Result<Arc<dyn CoordinationStore>> {
        match &config.redis_url {
            Some(url) => {
                let store = cddio_tickets::coordination::RedisStore::connect(url).await
                    .map_err(|e| format!("Impossible de se connecter à redis: {}", e))?;
                Ok(Arc::new(store))
            }
            None => Ok(Arc::new(MemoryStore::new())),
        }
    }

    #[cfg(not(feature = "redis"))]
    async fn coordination_store(config: &Config) -> Result<Arc<dyn CoordinationStore>> {
        if config.redis_url.is_some() {
            log_warn!("redis_url ignoré : le bot est compilé sans la feature redis");
        }
        Ok(Arc::new(MemoryStore::new()))
    }

    /// Lance le bot, ainsi que le balayage des tickets bloqués en provisionnement.
    pub async fn start(&mut self) -> Result<()> {
        let engine = self.engine.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(engine.config().sweep_interval());
            loop {
                interval.tick().await;
                match engine.reconcile_provisioning(Utc::now()).await {
                    Ok(_) => (),
                    Err(e) => log_error!("Erreur lors du balayage des tickets en provisionnement: {}", e),
                }
            }
        });
        self.client.start().await.map_err(|e| e.to_string())
    }
}
