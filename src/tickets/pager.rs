use serde::{Deserialize, Serialize};
use serenity::model::id::GuildId;
use crate::{
    db::controller,
    platform::{custom_embed, ButtonStyle, MessagePayload, COLOR_INFO},
};
use super::{access::PermissionLevel, Invocation, Result, TicketEngine, TicketError};

const TICKETS_PER_PAGE: usize = 10;

/// Résultats découpés en pages, conservés dans le store de coordination
#[derive(Debug, Clone)]
pub struct PagedResult {
    /// Identifiant opaque à renvoyer dans [`TicketEngine::page`]
    pub id: String,
    pub page_count: usize,
    pub first: MessagePayload,
}

#[derive(Serialize, Deserialize)]
struct StoredPages {
    guild_id: u64,
    title: String,
    pages: Vec<String>,
}

fn pages_key(id: &str) -> String {
    format!("tickets:pages:{}", id)
}

impl StoredPages {
    fn render(&self, id: &str, index: usize) -> MessagePayload {
        let count = self.pages.len();
        let mut message = custom_embed(
            format!("{} ({}/{})", self.title, index + 1, count),
            &self.pages[index],
            COLOR_INFO,
        );
        if index > 0 {
            message = message.with_button(format!("tickets_page:{}:{}", id, index - 1), "Précédent", ButtonStyle::Secondary);
        }
        if index + 1 < count {
            message = message.with_button(format!("tickets_page:{}:{}", id, index + 1), "Suivant", ButtonStyle::Secondary);
        }
        message.ephemeral()
    }
}

impl TicketEngine {
    /// Liste les tickets ouverts du serveur. Réservé au staff.
    pub async fn list_open_tickets(&self, inv: Invocation) -> Result<PagedResult> {
        self.bounded(&inv, self.list_tickets(inv)).await
    }

    async fn list_tickets(&self, inv: Invocation) -> Result<PagedResult> {
        let scope = self.load_scope(inv.guild_id, None, None).await?;
        let member = self.platform.member(inv.guild_id, inv.user_id).await?;
        if scope.level(&member) == PermissionLevel::Everyone {
            return Err(TicketError::NotStaff);
        }
        let tickets = controller::ticket::list_open(self.db(), inv.guild_id).await?;
        let lines = tickets.iter()
            .map(|t| {
                let channel = t.channel().map_or_else(|| "salon inconnu".to_string(), |c| format!("<#{}>", c.0));
                format!("**#{}** {} ouvert par <@{}> le {}", t.id, channel, t.opener().0, t.open_time.format("%d/%m/%Y"))
            })
            .collect::<Vec<_>>();
        let mut pages = lines.chunks(TICKETS_PER_PAGE)
            .map(|chunk| chunk.join("\n"))
            .collect::<Vec<_>>();
        if pages.is_empty() {
            pages.push("Aucun ticket ouvert.".to_string());
        }
        let stored = StoredPages { guild_id: inv.guild_id.0, title: "Tickets ouverts".to_string(), pages };
        let id = uuid::Uuid::new_v4().simple().to_string();
        let value = serde_json::to_string(&stored)
            .map_err(|e| TicketError::Coordination(crate::coordination::CoordinationError::Backend(e.to_string())))?;
        self.store.set(&pages_key(&id), &value, Some(self.config.page_ttl())).await?;
        Ok(PagedResult { first: stored.render(&id, 0), page_count: stored.pages.len(), id })
    }

    /// Une page de résultats. Une page hors limites est ramenée à la dernière.
    pub async fn page(&self, guild_id: GuildId, id: &str, index: usize) -> Result<MessagePayload> {
        let stored = self.store.get(&pages_key(id)).await?
            .and_then(|value| serde_json::from_str::<StoredPages>(&value).ok())
            .filter(|stored| stored.guild_id == guild_id.0 && !stored.pages.is_empty())
            .ok_or(TicketError::PageExpired)?;
        let index = index.min(stored.pages.len() - 1);
        Ok(stored.render(id, index))
    }
}
