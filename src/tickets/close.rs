use chrono::Utc;
use serenity::model::id::{ChannelId, UserId, WebhookId};
use crate::{
    db::{controller, model::ticket},
    platform::{MessagePayload, WebhookCredentials},
    log_error, log_info, log_warn,
};
use super::{
    access::TicketScope,
    archive::{archive_summary, closure_dm, export_transcript},
    Invocation, Result, TicketEngine, TicketError,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseOptions {
    pub reason: Option<String>,
    /// Fermeture automatique : pas de contrôle de permission, pas d'auteur
    pub automated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseOutcome {
    pub ticket_id: i32,
    /// Messages enregistrés, `None` si la transcription est désactivée
    pub transcript_len: Option<usize>,
}

/// Ticket fermé en base, en attente de ses effets annexes
struct ClosedTicket {
    ticket: ticket::Model,
    scope: TicketScope,
    closed_by: Option<UserId>,
    reason: Option<String>,
    transcript_len: Option<usize>,
    opener_spoke: Option<bool>,
}

impl TicketEngine {
    /// Ferme un ticket.
    ///
    /// L'historique est enregistré si le serveur conserve les transcriptions, le ticket est
    /// marqué fermé, puis le salon est supprimé (ou le fil archivé et verrouillé). Si Discord
    /// refuse, le ticket est rouvert en base ; un refus 403 l'exclut en plus de la fermeture
    /// automatique.
    ///
    /// Les effets annexes (webhook, demande de fermeture, notification, archives, message privé)
    /// s'exécutent après la deadline de l'opération, bornés par leur propre délai : ils ne font
    /// jamais échouer une fermeture déjà faite.
    pub async fn close(&self, inv: Invocation, ticket_id: i32, options: CloseOptions) -> Result<CloseOutcome> {
        let closed = self.bounded(&inv, self.close_ticket(inv, ticket_id, options)).await?;
        if tokio::time::timeout(self.config.follow_up_timeout(), self.after_close(&closed)).await.is_err() {
            log_warn!("Suites de la fermeture du ticket {} (serveur {}) interrompues après {:?}", closed.ticket.id, inv.guild_id, self.config.follow_up_timeout());
        }
        Ok(CloseOutcome { ticket_id: closed.ticket.id, transcript_len: closed.transcript_len })
    }

    async fn close_ticket(&self, inv: Invocation, ticket_id: i32, options: CloseOptions) -> Result<ClosedTicket> {
        let guild_id = inv.guild_id;
        let ticket = self.load_ticket(guild_id, ticket_id).await?;
        if !ticket.open {
            return Err(TicketError::TicketClosed);
        }
        let scope = self.load_scope(guild_id, ticket.panel_id, Some(ticket.id)).await?;
        let closed_by = if options.automated {
            None
        } else {
            let member = self.platform.member(guild_id, inv.user_id).await?;
            if member.user_id != ticket.opener() && !scope.is_ticket_staff(&member) {
                return Err(TicketError::NoTicketAccess);
            }
            Some(member.user_id)
        };
        match self.close_channel(ticket, scope, closed_by, options.reason).await {
            Err(TicketError::Platform(e)) if e.is_forbidden() => {
                log_warn!("Discord refuse la fermeture du ticket {} (serveur {}): {}", ticket_id, guild_id, e);
                if let Err(e) = controller::ticket::exclude_from_autoclose(self.db(), guild_id, ticket_id).await {
                    log_error!("Impossible d'exclure le ticket {} de la fermeture automatique: {}", ticket_id, e);
                }
                Err(TicketError::Platform(e))
            }
            res => res,
        }
    }

    async fn close_channel(&self, ticket: ticket::Model, scope: TicketScope, closed_by: Option<UserId>, reason: Option<String>) -> Result<ClosedTicket> {
        let guild_id = ticket.guild();
        let channel = match ticket.channel() {
            Some(id) => self.platform.channel(id).await?,
            None => None,
        };

        let mut transcript_len = None;
        let mut opener_spoke = None;
        if let (true, Some(channel)) = (scope.settings.store_transcripts, &channel) {
            let messages = self.collect_transcript(channel.id).await?;
            controller::archive::save_transcript(self.db(), guild_id, ticket.id, &messages).await?;
            if let Some(dir) = &self.config.archive_dir {
                export_transcript(dir, &ticket, &channel.name, closed_by, reason.as_deref(), &messages).await;
            }
            opener_spoke = Some(messages.iter().any(|m| m.author_id == ticket.opener()));
            transcript_len = Some(messages.len());
        }

        // La base d'abord : un échec ici laisse le salon intact et le ticket ouvert
        controller::archive::set_close_reason(self.db(), guild_id, ticket.id, closed_by, reason.clone()).await?;
        controller::ticket::mark_closed(self.db(), guild_id, ticket.id, Utc::now()).await?;

        if let Some(channel) = &channel {
            if let Err(e) = self.remove_ticket_channel(&ticket, channel.id, closed_by).await {
                if let Err(e) = controller::ticket::restore_open(self.db(), guild_id, ticket.id, ticket.status).await {
                    log_error!("Impossible de rouvrir le ticket {} (serveur {}) après l'échec de sa fermeture: {}", ticket.id, guild_id, e);
                }
                return Err(e);
            }
        }
        log_info!("Ticket {} du serveur {} fermé", ticket.id, guild_id);
        Ok(ClosedTicket { ticket, scope, closed_by, reason, transcript_len, opener_spoke })
    }

    /// Supprime le salon, ou archive et verrouille le fil après un message de fermeture
    async fn remove_ticket_channel(&self, ticket: &ticket::Model, channel_id: ChannelId, closed_by: Option<UserId>) -> Result<()> {
        if ticket.is_thread {
            let notice = MessagePayload::text(match closed_by {
                Some(user) => format!("Ticket fermé par <@{}>.", user.0),
                None => "Ticket fermé automatiquement.".to_string(),
            });
            if let Err(e) = self.platform.send_message(channel_id, notice).await {
                log_warn!("Erreur lors de l'envoi du message de fermeture du ticket {} (serveur {}): {}", ticket.id, ticket.guild(), e);
            }
            tokio::time::sleep(self.config.thread_archive_delay()).await;
            self.platform.set_thread_state(channel_id, true, true).await?;
        } else {
            match self.platform.delete_channel(channel_id).await {
                Err(e) if e.is_not_found() => (),
                res => res?,
            }
        }
        Ok(())
    }

    async fn after_close(&self, closed: &ClosedTicket) {
        let ClosedTicket { ticket, scope, closed_by, reason, transcript_len, opener_spoke } = closed;
        futures::join!(
            self.delete_ticket_webhook(ticket),
            self.cancel_close_request(ticket),
            self.delete_join_message(ticket, scope),
            self.post_archive_summary(ticket, scope, *closed_by, reason.as_deref(), *transcript_len),
            self.send_closure_dm(ticket, scope, *closed_by, reason.as_deref(), *opener_spoke),
        );
    }

    async fn delete_ticket_webhook(&self, ticket: &ticket::Model) {
        let webhook = match controller::ticket::take_webhook(self.db(), ticket.guild(), ticket.id).await {
            Ok(Some(webhook)) => webhook,
            Ok(None) => return,
            Err(e) => {
                log_error!("Erreur lors de la lecture du webhook du ticket {} (serveur {}): {}", ticket.id, ticket.guild(), e);
                return;
            }
        };
        let credentials = WebhookCredentials { id: WebhookId(webhook.webhook_id as u64), token: webhook.token };
        if let Err(e) = self.platform.delete_webhook(credentials).await {
            log_warn!("Erreur lors de la suppression du webhook du ticket {} (serveur {}): {}", ticket.id, ticket.guild(), e);
        }
    }

    async fn cancel_close_request(&self, ticket: &ticket::Model) {
        if let Err(e) = controller::ticket::delete_close_request(self.db(), ticket.guild(), ticket.id).await {
            log_error!("Erreur lors de l'annulation de la demande de fermeture du ticket {} (serveur {}): {}", ticket.id, ticket.guild(), e);
        }
    }

    async fn delete_join_message(&self, ticket: &ticket::Model, scope: &TicketScope) {
        let (Some(message_id), Some(channel_id)) = (ticket.join_message(), scope.settings.notification_channel()) else {
            return;
        };
        if let Err(e) = self.platform.delete_message(channel_id, message_id).await {
            log_warn!("Erreur lors de la suppression du message de notification du ticket {} (serveur {}): {}", ticket.id, ticket.guild(), e);
        }
        if let Err(e) = controller::ticket::set_join_message(self.db(), ticket.guild(), ticket.id, None).await {
            log_error!("Erreur lors de la mise à jour du ticket {} (serveur {}): {}", ticket.id, ticket.guild(), e);
        }
    }

    async fn post_archive_summary(&self, ticket: &ticket::Model, scope: &TicketScope, closed_by: Option<UserId>, reason: Option<&str>, transcript_len: Option<usize>) {
        let Some(channel_id) = scope.settings.archive_channel() else {
            return;
        };
        let message_id = match self.platform.send_message(channel_id, archive_summary(ticket, closed_by, reason, transcript_len)).await {
            Ok(id) => id,
            Err(e) => {
                log_warn!("Erreur lors de l'envoi du récapitulatif du ticket {} (serveur {}): {}", ticket.id, ticket.guild(), e);
                return;
            }
        };
        if let Err(e) = controller::archive::set_archive_message(self.db(), ticket.guild(), ticket.id, message_id).await {
            log_error!("Erreur lors de l'enregistrement du récapitulatif du ticket {} (serveur {}): {}", ticket.id, ticket.guild(), e);
        }
    }

    /// Message privé à l'auteur, sauf si le serveur le désactive pour les fermetures par le staff
    /// ou si l'auteur n'a jamais écrit dans le ticket
    async fn send_closure_dm(&self, ticket: &ticket::Model, scope: &TicketScope, closed_by: Option<UserId>, reason: Option<&str>, opener_spoke: Option<bool>) {
        let settings = &scope.settings;
        let by_staff = closed_by != Some(ticket.opener());
        if !settings.close_dm || (by_staff && !settings.staff_close_dm) || opener_spoke == Some(false) {
            return;
        }
        let channel_id = match self.dm_channel(ticket.opener()).await {
            Ok(id) => id,
            Err(e) => {
                log_warn!("Impossible d'ouvrir un message privé avec {} (ticket {}): {}", ticket.opener(), ticket.id, e);
                return;
            }
        };
        if let Err(e) = self.platform.send_message(channel_id, closure_dm(ticket, closed_by, reason)).await {
            log_warn!("Erreur lors de l'envoi du message privé de fermeture du ticket {} (serveur {}): {}", ticket.id, ticket.guild(), e);
        }
    }
}
