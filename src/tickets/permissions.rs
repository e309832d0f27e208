//! Calcul des permissions des salons de tickets
//!
//! Fonctions pures : tout ce qui vient de Discord ou de la base est chargé par l'appelant.

use std::collections::{BTreeMap, BTreeSet};
use serenity::model::{
    id::{GuildId, RoleId, UserId},
    permissions::Permissions,
};
use crate::{
    db::model::{guild::{claim_settings, staff}, panel::support},
    platform::{MemberProfile, Overwrite, OverwriteTarget},
};

/// Permissions données à l'auteur, aux membres ajoutés et au staff ayant accès
pub const STANDARD: Permissions = Permissions::from_bits_truncate(
    Permissions::VIEW_CHANNEL.bits()
        | Permissions::SEND_MESSAGES.bits()
        | Permissions::ADD_REACTIONS.bits()
        | Permissions::ATTACH_FILES.bits()
        | Permissions::READ_MESSAGE_HISTORY.bits()
        | Permissions::EMBED_LINKS.bits()
        | Permissions::USE_SLASH_COMMANDS.bits()
);

/// Permissions supplémentaires accordées au bot, s'il les possède lui-même
pub const BOT_EXTRA: Permissions = Permissions::from_bits_truncate(
    Permissions::MANAGE_CHANNELS.bits()
        | Permissions::MANAGE_WEBHOOKS.bits()
        | Permissions::MANAGE_ROLES.bits()
        | Permissions::MANAGE_MESSAGES.bits()
);

const READ_ONLY_ALLOW: Permissions = Permissions::from_bits_truncate(
    Permissions::VIEW_CHANNEL.bits() | Permissions::READ_MESSAGE_HISTORY.bits()
);
const READ_ONLY_DENY: Permissions = Permissions::from_bits_truncate(
    Permissions::SEND_MESSAGES.bits() | Permissions::ADD_REACTIONS.bits()
);

#[inline]
pub fn everyone_role(guild_id: GuildId) -> RoleId {
    RoleId(guild_id.0)
}

/// Ensemble de membres et de rôles
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    pub users: BTreeSet<UserId>,
    pub roles: BTreeSet<RoleId>,
}

impl Roster {
    pub fn from_support(team: &[support::Model]) -> Self {
        let mut roster = Self::default();
        for entry in team {
            roster.insert(entry.target_id as u64, entry.is_role);
        }
        roster
    }
    fn insert(&mut self, id: u64, is_role: bool) {
        if is_role {
            self.roles.insert(RoleId(id));
        } else {
            self.users.insert(UserId(id));
        }
    }
    pub fn contains(&self, user_id: UserId, roles: &[RoleId]) -> bool {
        self.users.contains(&user_id) || roles.iter().any(|role| self.roles.contains(role))
    }
    #[inline]
    pub fn contains_member(&self, member: &MemberProfile) -> bool {
        self.contains(member.user_id, &member.roles)
    }
    fn targets(&self) -> impl Iterator<Item = OverwriteTarget> + '_ {
        self.users.iter().map(|u| OverwriteTarget::Member(*u))
            .chain(self.roles.iter().map(|r| OverwriteTarget::Role(*r)))
    }
}

/// Équipe de support par défaut et administrateurs des tickets d'un serveur
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaffRoster {
    pub support: Roster,
    pub admins: Roster,
}

impl StaffRoster {
    pub fn from_models(staff: &[staff::Model]) -> Self {
        let mut roster = Self::default();
        for entry in staff {
            let target = if entry.admin { &mut roster.admins } else { &mut roster.support };
            target.insert(entry.target_id as u64, entry.is_role);
        }
        roster
    }
}

/// Ce que le reste du support garde sur un ticket claim
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityPolicy {
    /// Aucun changement
    Full,
    /// Le support voit le ticket mais ne peut plus y écrire
    ViewOnly,
    /// Le support ne voit plus le ticket
    Hidden,
}

impl From<&claim_settings::Model> for VisibilityPolicy {
    fn from(settings: &claim_settings::Model) -> Self {
        match (settings.support_can_view, settings.support_can_type) {
            (true, true) => VisibilityPolicy::Full,
            (true, false) => VisibilityPolicy::ViewOnly,
            (false, _) => VisibilityPolicy::Hidden,
        }
    }
}

/// Le bot, tel qu'il apparaît dans les permissions d'un ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BotGrant {
    pub target: OverwriteTarget,
    /// Sous-ensemble de [`BOT_EXTRA`] que le bot possède à l'endroit du ticket
    pub extra: Permissions,
}

/// Tout ce qui détermine les permissions d'un ticket
#[derive(Debug, Clone)]
pub struct TicketAudience<'a> {
    pub guild_id: GuildId,
    pub opener: UserId,
    /// Membres ajoutés au ticket après sa création
    pub members: &'a [UserId],
    pub bot: BotGrant,
    pub staff: &'a StaffRoster,
    /// Équipe de support propre au panel
    pub panel_team: Option<&'a Roster>,
    /// L'équipe par défaut du serveur a accès : le panel le demande, ou il n'y a pas de panel
    pub default_team: bool,
}

#[derive(Default)]
struct OverwriteSet(BTreeMap<OverwriteTarget, Overwrite>);

impl OverwriteSet {
    /// Cumule les permissions si la cible est déjà présente
    fn grant(&mut self, target: OverwriteTarget, allow: Permissions, deny: Permissions) {
        self.0.entry(target)
            .and_modify(|ow| {
                ow.allow |= allow;
                ow.deny |= deny;
                ow.deny &= !ow.allow;
            })
            .or_insert(Overwrite { target, allow, deny });
    }
    /// N'ajoute la cible que si elle n'a encore rien
    fn grant_if_absent(&mut self, target: OverwriteTarget, allow: Permissions, deny: Permissions) {
        self.0.entry(target).or_insert(Overwrite { target, allow, deny });
    }
    fn into_vec(self) -> Vec<Overwrite> {
        self.0.into_values().collect()
    }
}

/// Base commune : @everyone exclu, auteur, membres ajoutés et bot
fn base_overwrites(audience: &TicketAudience) -> OverwriteSet {
    let mut set = OverwriteSet::default();
    set.grant(OverwriteTarget::Role(everyone_role(audience.guild_id)), Permissions::empty(), Permissions::VIEW_CHANNEL);
    set.grant(OverwriteTarget::Member(audience.opener), STANDARD, Permissions::empty());
    for member in audience.members {
        set.grant(OverwriteTarget::Member(*member), STANDARD, Permissions::empty());
    }
    set.grant(audience.bot.target, STANDARD | (audience.bot.extra & BOT_EXTRA), Permissions::empty());
    set
}

/// Permissions d'un ticket non claim
pub fn build_creation_overwrites(audience: &TicketAudience) -> Vec<Overwrite> {
    let mut set = base_overwrites(audience);
    if audience.default_team {
        for target in audience.staff.support.targets().chain(audience.staff.admins.targets()) {
            set.grant(target, STANDARD, Permissions::empty());
        }
    }
    if let Some(team) = audience.panel_team {
        for target in team.targets() {
            set.grant(target, STANDARD, Permissions::empty());
        }
    }
    set.into_vec()
}

/// Permissions d'un ticket claim par `claimer`.
///
/// `None` quand la politique ne change rien aux permissions de création. Les administrateurs,
/// le membre ayant claim et le bot gardent toujours l'accès complet. En [`VisibilityPolicy::ViewOnly`]
/// le reste du support passe en lecture seule ; un administrateur n'y figure jamais.
pub fn build_claimed_overwrites(audience: &TicketAudience, policy: VisibilityPolicy, claimer: UserId) -> Option<Vec<Overwrite>> {
    if policy == VisibilityPolicy::Full {
        return None;
    }
    let mut set = base_overwrites(audience);
    set.grant(OverwriteTarget::Member(claimer), STANDARD, Permissions::empty());
    for target in audience.staff.admins.targets() {
        set.grant(target, STANDARD, Permissions::empty());
    }
    if policy == VisibilityPolicy::ViewOnly {
        let guild_support = audience.default_team.then(|| audience.staff.support.targets());
        let panel_support = audience.panel_team.map(|team| team.targets());
        for target in guild_support.into_iter().flatten().chain(panel_support.into_iter().flatten()) {
            set.grant_if_absent(target, READ_ONLY_ALLOW, READ_ONLY_DENY);
        }
    }
    Some(set.into_vec())
}

/// Permissions effectives d'un membre sur un salon, selon l'algorithme de Discord :
/// permissions du serveur, puis @everyone, puis les rôles, puis le membre.
pub fn effective_permissions(guild_id: GuildId, member: &MemberProfile, overwrites: &[Overwrite]) -> Permissions {
    if member.is_owner || member.permissions.contains(Permissions::ADMINISTRATOR) {
        return Permissions::all();
    }
    let mut perms = member.permissions;
    let everyone = OverwriteTarget::Role(everyone_role(guild_id));
    if let Some(ow) = overwrites.iter().find(|ow| ow.target == everyone) {
        perms &= !ow.deny;
        perms |= ow.allow;
    }
    let (mut allow, mut deny) = (Permissions::empty(), Permissions::empty());
    for ow in overwrites {
        if let OverwriteTarget::Role(role) = ow.target {
            if ow.target != everyone && member.roles.contains(&role) {
                allow |= ow.allow;
                deny |= ow.deny;
            }
        }
    }
    perms &= !deny;
    perms |= allow;
    if let Some(ow) = overwrites.iter().find(|ow| ow.target == OverwriteTarget::Member(member.user_id)) {
        perms &= !ow.deny;
        perms |= ow.allow;
    }
    perms
}
