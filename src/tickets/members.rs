use serenity::model::{id::UserId, permissions::Permissions};
use crate::{
    db::{controller, model::ticket},
    platform::Overwrite,
    log_info,
};
use super::{permissions::STANDARD, Invocation, Result, TicketEngine, TicketError};

impl TicketEngine {
    /// Ajoute un membre à un ticket : permission sur le salon, ou membre du fil
    pub async fn add_member(&self, inv: Invocation, ticket_id: i32, user_id: UserId) -> Result<()> {
        self.bounded(&inv, self.add_ticket_member(inv, ticket_id, user_id)).await
    }

    async fn add_ticket_member(&self, inv: Invocation, ticket_id: i32, user_id: UserId) -> Result<()> {
        let ticket = self.editable_ticket(inv, ticket_id).await?;
        if user_id == ticket.opener() {
            return Ok(());
        }
        let channel_id = ticket.channel().ok_or(TicketError::ChannelDeleted)?;
        if !controller::ticket::add_member(self.db(), inv.guild_id, ticket.id, user_id).await? {
            return Ok(());
        }
        let res = if ticket.is_thread {
            self.platform.add_thread_member(channel_id, user_id).await
        } else {
            self.platform.create_member_overwrite(channel_id, Overwrite::member(user_id, STANDARD, Permissions::empty())).await
        };
        if let Err(e) = res {
            controller::ticket::remove_member(self.db(), inv.guild_id, ticket.id, user_id).await?;
            return Err(e.into());
        }
        log_info!("{} ajouté au ticket {} du serveur {} par {}", user_id, ticket.id, inv.guild_id, inv.user_id);
        Ok(())
    }

    /// Retire un membre ajouté à un ticket. L'auteur du ticket ne peut pas être retiré.
    pub async fn remove_member(&self, inv: Invocation, ticket_id: i32, user_id: UserId) -> Result<()> {
        self.bounded(&inv, self.remove_ticket_member(inv, ticket_id, user_id)).await
    }

    async fn remove_ticket_member(&self, inv: Invocation, ticket_id: i32, user_id: UserId) -> Result<()> {
        let ticket = self.editable_ticket(inv, ticket_id).await?;
        if user_id == ticket.opener() {
            return Err(TicketError::CannotRemoveOpener);
        }
        let channel_id = ticket.channel().ok_or(TicketError::ChannelDeleted)?;
        let removed = controller::ticket::remove_member(self.db(), inv.guild_id, ticket.id, user_id).await?;
        let res = if ticket.is_thread {
            self.platform.remove_thread_member(channel_id, user_id).await
        } else {
            self.platform.delete_member_overwrite(channel_id, user_id).await
        };
        match res {
            Err(e) if !e.is_not_found() => return Err(e.into()),
            _ => (),
        }
        if removed {
            log_info!("{} retiré du ticket {} du serveur {} par {}", user_id, ticket.id, inv.guild_id, inv.user_id);
        }
        Ok(())
    }

    /// Ticket ouvert que l'appelant (auteur ou staff) peut modifier
    async fn editable_ticket(&self, inv: Invocation, ticket_id: i32) -> Result<ticket::Model> {
        let ticket = self.load_ticket(inv.guild_id, ticket_id).await?;
        if !ticket.open {
            return Err(TicketError::TicketClosed);
        }
        let scope = self.load_scope(inv.guild_id, ticket.panel_id, Some(ticket.id)).await?;
        let member = self.platform.member(inv.guild_id, inv.user_id).await?;
        if member.user_id != ticket.opener() && !scope.is_ticket_staff(&member) {
            return Err(TicketError::NoTicketAccess);
        }
        Ok(ticket)
    }
}
