use chrono::{DateTime, Duration as ChronoDuration, Utc};
use crate::{db::controller, log_info, log_warn};
use super::{Result, TicketEngine};

impl TicketEngine {
    /// Ferme les tickets restés en provisionnement au-delà du délai configuré.
    ///
    /// Un ticket fermé ici ne peut plus recevoir de salon : si son ouverture se termine
    /// malgré tout, elle échoue et supprime le salon créé.
    pub async fn reconcile_provisioning(&self, now: DateTime<Utc>) -> Result<usize> {
        let ttl = ChronoDuration::from_std(self.config.provisioning_ttl()).unwrap_or_else(|_| ChronoDuration::zero());
        let stuck = controller::ticket::stuck_provisioning(self.db(), now - ttl).await?;
        for ticket in &stuck {
            log_warn!("Ticket {} du serveur {} bloqué en provisionnement depuis le {}, fermeture", ticket.id, ticket.guild(), ticket.open_time);
            controller::ticket::mark_closed(self.db(), ticket.guild(), ticket.id, now).await?;
        }
        if !stuck.is_empty() {
            log_info!("{} ticket(s) bloqué(s) en provisionnement fermé(s)", stuck.len());
        }
        Ok(stuck.len())
    }
}
