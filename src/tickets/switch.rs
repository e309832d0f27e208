use serenity::model::id::{GuildId, UserId};
use crate::{
    db::{controller, model::guild::settings::SwitchClaimBehaviour},
    log_error, log_info, log_warn,
};
use super::{
    capacity::{category_has_room, CapacityError},
    claim::ClaimState,
    Invocation, Result, TicketEngine, TicketError,
};

impl TicketEngine {
    /// Déplace un ticket sur un autre panel.
    ///
    /// Un ticket en mode salon ne peut pas passer sur un panel en mode fil. Si le membre ayant
    /// pris en charge le ticket n'a pas accès au nouveau panel, le serveur choisit : refuser le
    /// changement, libérer le ticket, ou lui laisser son accès.
    pub async fn switch_panel(&self, inv: Invocation, ticket_id: i32, panel_id: i32) -> Result<()> {
        self.bounded(&inv, self.switch_ticket_panel(inv, ticket_id, panel_id)).await
    }

    async fn switch_ticket_panel(&self, inv: Invocation, ticket_id: i32, panel_id: i32) -> Result<()> {
        let guild_id = inv.guild_id;
        let ticket = self.load_ticket(guild_id, ticket_id).await?;
        if !ticket.open {
            return Err(TicketError::TicketClosed);
        }
        let panel = controller::panel::get(self.db(), guild_id, panel_id).await?
            .ok_or(TicketError::PanelNotFound(panel_id))?;
        if !ticket.is_thread && panel.use_threads {
            return Err(TicketError::IncompatiblePanel);
        }
        let previous = self.load_scope(guild_id, ticket.panel_id, Some(ticket.id)).await?;
        let member = self.platform.member(guild_id, inv.user_id).await?;
        if !previous.is_ticket_staff(&member) {
            return Err(TicketError::NotStaff);
        }
        if ticket.panel_id == Some(panel_id) {
            return Ok(());
        }
        let mut next = self.load_scope(guild_id, Some(panel_id), Some(ticket.id)).await?;

        let claimer = match controller::ticket::claimer(self.db(), guild_id, ticket.id).await? {
            Some(id) => Some(self.profile_or_placeholder(guild_id, id).await?),
            None => None,
        };
        let mut unclaim = false;
        let mut keep = None;
        if let Some(claimer) = &claimer {
            if !next.is_ticket_staff(claimer) {
                match previous.settings.switch_claim_behaviour {
                    SwitchClaimBehaviour::Block => return Err(TicketError::ClaimerWouldLoseAccess),
                    SwitchClaimBehaviour::Unclaim => unclaim = true,
                    SwitchClaimBehaviour::Keep => {
                        if !next.members.contains(&claimer.user_id) {
                            next.members.push(claimer.user_id);
                        }
                        keep = Some(claimer.user_id);
                    }
                }
            }
        }

        let category = if ticket.is_thread {
            None
        } else {
            let category = panel.category();
            if let Some(category) = category {
                let channels = self.platform.guild_channels(guild_id).await?;
                let current = ticket.channel()
                    .and_then(|id| channels.iter().find(|c| c.id == id))
                    .and_then(|c| c.parent_id);
                if current != Some(category) && !category_has_room(&channels, category) {
                    return Err(TicketError::Capacity(CapacityError::CategoryLimit));
                }
            }
            Some(category)
        };

        if unclaim {
            controller::ticket::delete_claim(self.db(), guild_id, ticket.id).await?;
        }
        let added = match keep {
            Some(user_id) => controller::ticket::add_member(self.db(), guild_id, ticket.id, user_id).await?,
            None => false,
        };
        let previous_state = ClaimState { scope: &previous, claimer: claimer.as_ref() };
        let next_state = ClaimState { scope: &next, claimer: claimer.as_ref().filter(|_| !unclaim) };
        if let Err(e) = self.sync_channel(&ticket, previous_state, next_state, category).await {
            let restored_claim = claimer.as_ref().map(|c| c.user_id).filter(|_| unclaim);
            self.undo_switch(guild_id, ticket.id, restored_claim, keep.filter(|_| added)).await;
            return Err(e);
        }
        if unclaim {
            log_info!("Ticket {} du serveur {} libéré par le changement de panel", ticket.id, guild_id);
        }

        if ticket.is_thread {
            if let (Some(thread_id), Some(notifications)) = (ticket.channel(), next.settings.notification_channel()) {
                if let Some(old) = ticket.join_message() {
                    if let Err(e) = self.platform.delete_message(notifications, old).await {
                        log_warn!("Erreur lors de la suppression du message de notification du ticket {} (serveur {}): {}", ticket.id, guild_id, e);
                    }
                }
                self.post_join_message(&ticket, thread_id, &next).await;
            }
        }
        controller::ticket::set_panel(self.db(), guild_id, ticket.id, panel_id).await?;
        log_info!("Ticket {} du serveur {} déplacé sur le panel {}", ticket.id, guild_id, panel_id);
        Ok(())
    }

    /// Rétablit la prise en charge et retire le membre ajouté quand Discord refuse le changement
    async fn undo_switch(&self, guild_id: GuildId, ticket_id: i32, claimer: Option<UserId>, added_member: Option<UserId>) {
        if let Some(user_id) = claimer {
            if let Err(e) = controller::ticket::set_claim(self.db(), guild_id, ticket_id, user_id).await {
                log_error!("Impossible de rétablir la prise en charge du ticket {} (serveur {}): {}", ticket_id, guild_id, e);
            }
        }
        if let Some(user_id) = added_member {
            if let Err(e) = controller::ticket::remove_member(self.db(), guild_id, ticket_id, user_id).await {
                log_error!("Impossible de retirer {} du ticket {} (serveur {}): {}", user_id, ticket_id, guild_id, e);
            }
        }
    }
}
