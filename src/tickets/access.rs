//! Droits des membres sur les panels et les tickets

use serenity::model::{
    id::{GuildId, RoleId, UserId},
    permissions::Permissions,
};
use crate::{
    db::{
        controller,
        model::{guild::{claim_settings, settings}, panel, ticket},
    },
    platform::MemberProfile,
};
use super::{
    permissions::{BotGrant, Roster, StaffRoster, TicketAudience, VisibilityPolicy},
    Result, TicketEngine,
};

/// Niveau d'un membre vis-à-vis des tickets du serveur
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PermissionLevel {
    Everyone,
    Support,
    Admin,
}

pub fn permission_level(member: &MemberProfile, staff: &StaffRoster) -> PermissionLevel {
    if member.is_owner || member.permissions.contains(Permissions::ADMINISTRATOR) || staff.admins.contains_member(member) {
        PermissionLevel::Admin
    } else if staff.support.contains_member(member) {
        PermissionLevel::Support
    } else {
        PermissionLevel::Everyone
    }
}

/// Évalue les règles d'accès d'un panel.
///
/// Sans règle, tout le monde a accès. Sinon la première règle portant sur un rôle du membre
/// (l'identifiant du serveur valant pour @everyone) décide ; aucune règle ne correspond : refus.
pub fn panel_access_allowed(rules: &[panel::access_rule::Model], guild_id: GuildId, roles: &[RoleId]) -> bool {
    if rules.is_empty() {
        return true;
    }
    rules.iter()
        .find(|rule| {
            let role = RoleId(rule.role_id as u64);
            role.0 == guild_id.0 || roles.contains(&role)
        })
        .map_or(false, |rule| rule.allow)
}

/// Configuration qui entoure un ticket : serveur, staff, panel et membres ajoutés
pub(crate) struct TicketScope {
    pub settings: settings::Model,
    pub claim_settings: claim_settings::Model,
    pub staff: StaffRoster,
    pub panel: Option<panel::Model>,
    pub panel_team: Option<Roster>,
    pub members: Vec<UserId>,
}

impl TicketScope {
    /// L'équipe par défaut du serveur a accès aux tickets sans panel
    pub fn default_team(&self) -> bool {
        self.panel.as_ref().map_or(true, |p| p.with_default_team)
    }
    pub fn naming_scheme(&self) -> Option<&str> {
        self.panel.as_ref()
            .and_then(|p| p.naming_scheme.as_deref())
            .or(self.settings.naming_scheme.as_deref())
    }
    pub fn policy(&self) -> VisibilityPolicy {
        VisibilityPolicy::from(&self.claim_settings)
    }
    pub fn level(&self, member: &MemberProfile) -> PermissionLevel {
        permission_level(member, &self.staff)
    }
    pub fn audience(&self, guild_id: GuildId, opener: UserId, bot: BotGrant) -> TicketAudience<'_> {
        TicketAudience {
            guild_id,
            opener,
            members: &self.members,
            bot,
            staff: &self.staff,
            panel_team: self.panel_team.as_ref(),
            default_team: self.default_team(),
        }
    }
    /// Le membre fait-il partie du staff qui traite ce ticket ?
    pub fn is_ticket_staff(&self, member: &MemberProfile) -> bool {
        match self.level(member) {
            PermissionLevel::Admin => true,
            PermissionLevel::Support if self.default_team() => true,
            _ => self.panel_team.as_ref().map_or(false, |team| team.contains_member(member)),
        }
    }
    pub fn has_ticket_access(&self, ticket: &ticket::Model, member: &MemberProfile) -> bool {
        ticket.opener() == member.user_id
            || self.members.contains(&member.user_id)
            || self.is_ticket_staff(member)
    }
}

impl TicketEngine {
    pub(crate) async fn load_scope(&self, guild_id: GuildId, panel_id: Option<i32>, ticket_id: Option<i32>) -> Result<TicketScope> {
        let db = self.db();
        let settings = controller::guild::settings(db, guild_id).await?;
        let claim_settings = controller::guild::claim_settings(db, guild_id).await?;
        let staff = StaffRoster::from_models(&controller::guild::staff(db, guild_id).await?);
        let panel = match panel_id {
            Some(id) => controller::panel::get(db, guild_id, id).await?,
            None => None,
        };
        let panel_team = match &panel {
            Some(panel) => Some(Roster::from_support(&controller::panel::support_team(db, panel.id).await?)),
            None => None,
        };
        let members = match ticket_id {
            Some(id) => controller::ticket::members(db, guild_id, id).await?,
            None => vec![],
        };
        Ok(TicketScope { settings, claim_settings, staff, panel, panel_team, members })
    }
}
