use serenity::model::id::{ChannelId, UserId};
use crate::{
    db::{controller, model::ticket},
    platform::{same_overwrites, ChannelEdit, MemberProfile, Overwrite, OverwriteTarget},
    log_info, log_error,
};
use super::{
    access::{PermissionLevel, TicketScope},
    naming::{generate_channel_name, is_generated_name, NameContext},
    permissions::{build_claimed_overwrites, build_creation_overwrites, BotGrant},
    Invocation, Result, TicketEngine, TicketError,
};

/// État d'un ticket dont dépendent son nom et ses permissions
#[derive(Clone, Copy)]
pub(crate) struct ClaimState<'a> {
    pub scope: &'a TicketScope,
    pub claimer: Option<&'a MemberProfile>,
}

impl TicketEngine {
    /// Prise en charge d'un ticket par un membre du staff. Mode salon uniquement.
    pub async fn claim(&self, inv: Invocation, ticket_id: i32) -> Result<()> {
        self.bounded(&inv, self.claim_ticket(inv, ticket_id)).await
    }

    async fn claim_ticket(&self, inv: Invocation, ticket_id: i32) -> Result<()> {
        let ticket = self.load_ticket(inv.guild_id, ticket_id).await?;
        if !ticket.open {
            return Err(TicketError::TicketClosed);
        }
        if ticket.is_thread {
            return Err(TicketError::ThreadTicket);
        }
        let scope = self.load_scope(inv.guild_id, ticket.panel_id, Some(ticket.id)).await?;
        let member = self.platform.member(inv.guild_id, inv.user_id).await?;
        if !scope.is_ticket_staff(&member) {
            return Err(TicketError::NotStaff);
        }
        if !controller::ticket::set_claim(self.db(), inv.guild_id, ticket.id, member.user_id).await? {
            let claimer = controller::ticket::claimer(self.db(), inv.guild_id, ticket.id).await?;
            return Err(TicketError::AlreadyClaimed(claimer.unwrap_or(member.user_id)));
        }

        let previous = ClaimState { scope: &scope, claimer: None };
        let next = ClaimState { scope: &scope, claimer: Some(&member) };
        if let Err(e) = self.sync_channel(&ticket, previous, next, None).await {
            if let Err(e) = controller::ticket::delete_claim(self.db(), inv.guild_id, ticket.id).await {
                log_error!("Impossible d'annuler la prise en charge du ticket {} (serveur {}): {}", ticket.id, inv.guild_id, e);
            }
            return Err(e);
        }
        log_info!("Ticket {} du serveur {} pris en charge par {}", ticket.id, inv.guild_id, member.user_id);
        Ok(())
    }

    /// Libère un ticket. Réservé au membre l'ayant pris en charge et aux administrateurs.
    pub async fn unclaim(&self, inv: Invocation, ticket_id: i32) -> Result<()> {
        self.bounded(&inv, self.unclaim_ticket(inv, ticket_id)).await
    }

    async fn unclaim_ticket(&self, inv: Invocation, ticket_id: i32) -> Result<()> {
        let ticket = self.load_ticket(inv.guild_id, ticket_id).await?;
        if !ticket.open {
            return Err(TicketError::TicketClosed);
        }
        if ticket.is_thread {
            return Err(TicketError::ThreadTicket);
        }
        let claimer_id = controller::ticket::claimer(self.db(), inv.guild_id, ticket.id).await?
            .ok_or(TicketError::NotClaimed)?;
        let scope = self.load_scope(inv.guild_id, ticket.panel_id, Some(ticket.id)).await?;
        let member = self.platform.member(inv.guild_id, inv.user_id).await?;
        if member.user_id != claimer_id && scope.level(&member) != PermissionLevel::Admin {
            return Err(TicketError::NotClaimer);
        }
        let claimer = self.profile_or_placeholder(inv.guild_id, claimer_id).await?;
        if !controller::ticket::delete_claim(self.db(), inv.guild_id, ticket.id).await? {
            // Libéré entre-temps
            return Ok(());
        }

        let previous = ClaimState { scope: &scope, claimer: Some(&claimer) };
        let next = ClaimState { scope: &scope, claimer: None };
        if let Err(e) = self.sync_channel(&ticket, previous, next, None).await {
            if let Err(e) = controller::ticket::set_claim(self.db(), inv.guild_id, ticket.id, claimer_id).await {
                log_error!("Impossible de rétablir la prise en charge du ticket {} (serveur {}): {}", ticket.id, inv.guild_id, e);
            }
            return Err(e);
        }
        log_info!("Ticket {} du serveur {} libéré par {}", ticket.id, inv.guild_id, member.user_id);
        Ok(())
    }

    /// Permissions d'un ticket en mode salon pour un état de claim donné.
    ///
    /// `category` est la catégorie où se trouve (ou se trouvera) le salon : les permissions
    /// accordées au bot y sont calculées.
    pub(crate) async fn ticket_overwrites(&self, ticket: &ticket::Model, scope: &TicketScope, claimer: Option<UserId>, category: Option<ChannelId>) -> Result<Vec<Overwrite>> {
        let guild_id = ticket.guild();
        let grant = self.bot_grant(guild_id, category, OverwriteTarget::Member(self.platform.bot_id())).await?;
        let creation = |grant: BotGrant| build_creation_overwrites(&scope.audience(guild_id, ticket.opener(), grant));
        let claimer = match claimer {
            Some(claimer) => claimer,
            None => return Ok(creation(grant)),
        };
        let claimed_grant = BotGrant { target: self.bot_claim_target(guild_id).await?, extra: grant.extra };
        Ok(build_claimed_overwrites(&scope.audience(guild_id, ticket.opener(), claimed_grant), scope.policy(), claimer)
            .unwrap_or_else(|| creation(grant)))
    }

    /// Aligne le nom, les permissions et la catégorie du salon sur `next`.
    ///
    /// Le nom n'est changé que si le salon porte encore celui généré pour `previous` : un nom
    /// donné à la main par le staff est conservé. Pour un fil, seul le nom est mis à jour.
    pub(crate) async fn sync_channel(&self, ticket: &ticket::Model, previous: ClaimState<'_>, next: ClaimState<'_>, category: Option<Option<ChannelId>>) -> Result<()> {
        let guild_id = ticket.guild();
        let channel_id = ticket.channel().ok_or(TicketError::ChannelDeleted)?;
        let channel = self.platform.channel(channel_id).await?.ok_or(TicketError::ChannelDeleted)?;
        let opener = self.profile_or_placeholder(guild_id, ticket.opener()).await?;
        let name_for = |state: &ClaimState| generate_channel_name(&NameContext {
            scheme: state.scope.naming_scheme(),
            username_naming: state.scope.settings.username_naming,
            ticket_id: ticket.id,
            opener: &opener,
            claimer: state.claimer,
            now: ticket.open_time,
        });
        let previous_name = name_for(&previous);
        let next_name = name_for(&next);

        let mut edit = ChannelEdit::default();
        if next_name != previous_name {
            if is_generated_name(&channel.name, &previous_name) {
                edit.name = Some(next_name);
            } else {
                log_info!("Le salon {} du ticket {} a été renommé à la main, nom conservé", channel_id, ticket.id);
            }
        }
        if !ticket.is_thread {
            let target_category = category.unwrap_or(channel.parent_id);
            let overwrites = self.ticket_overwrites(ticket, next.scope, next.claimer.map(|c| c.user_id), target_category).await?;
            if !same_overwrites(&channel.overwrites, &overwrites) {
                edit.overwrites = Some(overwrites);
            }
            if target_category != channel.parent_id {
                edit.category = Some(target_category);
            }
        }
        if edit.is_empty() {
            return Ok(());
        }
        self.platform.edit_channel(channel_id, edit).await?;
        Ok(())
    }
}
