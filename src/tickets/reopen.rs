use crate::{
    db::controller,
    log_info,
};
use super::{Invocation, Result, TicketEngine, TicketError};

impl TicketEngine {
    /// Rouvre un ticket fermé. Mode fil uniquement : un salon fermé a été supprimé.
    pub async fn reopen(&self, inv: Invocation, ticket_id: i32) -> Result<()> {
        self.bounded(&inv, self.reopen_ticket(inv, ticket_id)).await
    }

    async fn reopen_ticket(&self, inv: Invocation, ticket_id: i32) -> Result<()> {
        let guild_id = inv.guild_id;
        let ticket = self.load_ticket(guild_id, ticket_id).await?;
        if ticket.open {
            return Err(TicketError::TicketAlreadyOpen);
        }
        if !ticket.is_thread {
            return Err(TicketError::NotAThread);
        }
        let thread_id = ticket.channel().ok_or(TicketError::ChannelDeleted)?;
        if self.platform.channel(thread_id).await?.is_none() {
            return Err(TicketError::ChannelDeleted);
        }
        let scope = self.load_scope(guild_id, ticket.panel_id, Some(ticket.id)).await?;
        let member = self.platform.member(guild_id, inv.user_id).await?;
        if !scope.has_ticket_access(&ticket, &member) {
            return Err(TicketError::NoTicketAccess);
        }

        self.check_ticket_limit(guild_id, ticket.opener(), &scope).await?;

        self.platform.set_thread_state(thread_id, false, false).await?;
        controller::ticket::reopen(self.db(), guild_id, ticket.id).await?;
        log_info!("Ticket {} du serveur {} rouvert par {}", ticket.id, guild_id, member.user_id);
        Ok(())
    }
}
