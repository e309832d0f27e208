use chrono::Utc;
use crate::{
    db::{controller, model::ticket::TicketStatus},
    platform::{custom_embed, ButtonStyle, COLOR_INFO},
    log_info,
};
use super::{CloseOptions, CloseOutcome, Invocation, Result, TicketEngine, TicketError};

impl TicketEngine {
    /// Le staff propose à l'auteur de fermer son ticket.
    ///
    /// Une nouvelle demande remplace la précédente. Le ticket passe en attente jusqu'à la
    /// réponse de l'auteur.
    pub async fn request_close(&self, inv: Invocation, ticket_id: i32, reason: Option<String>) -> Result<()> {
        self.bounded(&inv, self.request_ticket_close(inv, ticket_id, reason)).await
    }

    async fn request_ticket_close(&self, inv: Invocation, ticket_id: i32, reason: Option<String>) -> Result<()> {
        let ticket = self.load_ticket(inv.guild_id, ticket_id).await?;
        if !ticket.open {
            return Err(TicketError::TicketClosed);
        }
        let channel_id = ticket.channel().ok_or(TicketError::ChannelDeleted)?;
        let scope = self.load_scope(inv.guild_id, ticket.panel_id, Some(ticket.id)).await?;
        let member = self.platform.member(inv.guild_id, inv.user_id).await?;
        if !scope.is_ticket_staff(&member) {
            return Err(TicketError::NotStaff);
        }
        controller::ticket::set_close_request(self.db(), inv.guild_id, ticket.id, member.user_id, reason.clone(), Utc::now()).await?;
        controller::ticket::set_status(self.db(), inv.guild_id, ticket.id, TicketStatus::Pending).await?;

        let description = match &reason {
            Some(reason) => format!("<@{}> propose de fermer ce ticket.\n**Raison :** {}", member.user_id.0, reason),
            None => format!("<@{}> propose de fermer ce ticket.", member.user_id.0),
        };
        let mut message = custom_embed("Demande de fermeture", description, COLOR_INFO)
            .with_button("tickets_close_accept", "Fermer", ButtonStyle::Danger)
            .with_button("tickets_close_deny", "Garder ouvert", ButtonStyle::Secondary);
        message.content = Some(format!("<@{}>", ticket.opener().0));
        self.platform.send_message(channel_id, message).await?;
        log_info!("Demande de fermeture du ticket {} (serveur {}) par {}", ticket.id, inv.guild_id, member.user_id);
        Ok(())
    }

    /// L'auteur refuse la demande de fermeture : le ticket redevient ouvert
    pub async fn deny_close_request(&self, inv: Invocation, ticket_id: i32) -> Result<()> {
        self.bounded(&inv, self.deny_ticket_close(inv, ticket_id)).await
    }

    async fn deny_ticket_close(&self, inv: Invocation, ticket_id: i32) -> Result<()> {
        let ticket = self.load_ticket(inv.guild_id, ticket_id).await?;
        if !ticket.open {
            return Err(TicketError::TicketClosed);
        }
        if inv.user_id != ticket.opener() {
            return Err(TicketError::NoTicketAccess);
        }
        if !controller::ticket::delete_close_request(self.db(), inv.guild_id, ticket.id).await? {
            return Err(TicketError::NoCloseRequest);
        }
        controller::ticket::set_status(self.db(), inv.guild_id, ticket.id, TicketStatus::Open).await?;
        log_info!("Demande de fermeture du ticket {} (serveur {}) refusée", ticket.id, inv.guild_id);
        Ok(())
    }

    /// L'auteur accepte la demande : le ticket est fermé avec la raison donnée par le staff
    pub async fn accept_close_request(&self, inv: Invocation, ticket_id: i32) -> Result<CloseOutcome> {
        let ticket = self.load_ticket(inv.guild_id, ticket_id).await?;
        if !ticket.open {
            return Err(TicketError::TicketClosed);
        }
        if inv.user_id != ticket.opener() {
            return Err(TicketError::NoTicketAccess);
        }
        let request = controller::ticket::close_request(self.db(), inv.guild_id, ticket.id).await?
            .ok_or(TicketError::NoCloseRequest)?;
        self.close(inv, ticket.id, CloseOptions { reason: request.reason, automated: false }).await
    }
}
