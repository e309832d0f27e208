//! Transcription et récapitulatifs de fermeture

use std::{collections::BTreeMap, path::Path};
use serde::Serialize;
use serenity::model::id::{ChannelId, UserId};
use crate::{
    db::model::ticket,
    platform::{Embed, HistoryMessage, MessagePayload, COLOR_INFO},
    log_warn,
};
use super::{Result, TicketEngine};

/// Messages demandés par appel à l'historique d'un salon
pub const PAGE_SIZE: u8 = 100;

#[derive(Serialize)]
struct ArchiveUser {
    id: u64,
    name: String,
}

#[derive(Serialize)]
struct ArchiveMessage<'a> {
    id: u64,
    user_id: u64,
    content: &'a str,
    attachments: &'a [String],
    timestamp: i64,
}

#[derive(Serialize)]
struct ArchiveTicket<'a> {
    guild_id: u64,
    ticket_id: i32,
    channel_name: &'a str,
    opener_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    closed_by: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
    users: Vec<ArchiveUser>,
    messages: Vec<ArchiveMessage<'a>>,
}

impl TicketEngine {
    /// Historique complet d'un salon, du plus ancien au plus récent.
    ///
    /// Discord renvoie les messages du plus récent au plus ancien, par pages : on remonte
    /// jusqu'à une page incomplète.
    pub(crate) async fn collect_transcript(&self, channel_id: ChannelId) -> Result<Vec<HistoryMessage>> {
        let mut messages = Vec::new();
        let mut before = None;
        loop {
            let page = self.platform.fetch_messages(channel_id, before, PAGE_SIZE).await?;
            let last_page = page.len() < PAGE_SIZE as usize;
            before = page.last().map(|m| m.id);
            messages.extend(page);
            if last_page || before.is_none() {
                break;
            }
        }
        messages.reverse();
        Ok(messages)
    }
}

/// Écrit une copie JSON de la transcription dans `dir`. N'échoue jamais.
pub(crate) async fn export_transcript(dir: &Path, ticket: &ticket::Model, channel_name: &str, closed_by: Option<UserId>, reason: Option<&str>, messages: &[HistoryMessage]) {
    let users = messages.iter()
        .map(|m| (m.author_id.0, m.author_name.clone()))
        .collect::<BTreeMap<_, _>>()
        .into_iter()
        .map(|(id, name)| ArchiveUser { id, name })
        .collect();
    let archive = ArchiveTicket {
        guild_id: ticket.guild().0,
        ticket_id: ticket.id,
        channel_name,
        opener_id: ticket.opener().0,
        closed_by: closed_by.map(|u| u.0),
        reason,
        users,
        messages: messages.iter().map(|m| ArchiveMessage {
            id: m.id.0,
            user_id: m.author_id.0,
            content: &m.content,
            attachments: &m.attachments,
            timestamp: m.timestamp,
        }).collect(),
    };
    let json = match serde_json::to_string(&archive) {
        Ok(json) => json,
        Err(e) => {
            log_warn!("Erreur lors de la sérialisation de la transcription du ticket {}: {}", ticket.id, e);
            return;
        }
    };
    let dir = async_std::path::PathBuf::from(dir.to_path_buf());
    if let Err(e) = async_std::fs::create_dir_all(&dir).await {
        log_warn!("Impossible de créer le dossier d'archives {}: {}", dir.display(), e);
        return;
    }
    let path = dir.join(format!("{}-{}.json", ticket.guild_id, ticket.id));
    if let Err(e) = async_std::fs::write(&path, json).await {
        log_warn!("Erreur lors de l'écriture de {}: {}", path.display(), e);
    }
}

fn closed_by_field(closed_by: Option<UserId>) -> String {
    closed_by.map_or_else(|| "Fermeture automatique".to_string(), |u| format!("<@{}>", u.0))
}

/// Récapitulatif posté dans le salon d'archives du serveur
pub(crate) fn archive_summary(ticket: &ticket::Model, closed_by: Option<UserId>, reason: Option<&str>, transcript_len: Option<usize>) -> MessagePayload {
    let mut embed = Embed {
        title: Some(format!("Ticket #{} fermé", ticket.id)),
        description: None,
        color: Some(COLOR_INFO),
        fields: vec![
            ("Ouvert par".to_string(), format!("<@{}>", ticket.opener().0), true),
            ("Fermé par".to_string(), closed_by_field(closed_by), true),
            ("Raison".to_string(), reason.unwrap_or("Aucune raison donnée").to_string(), false),
        ],
    };
    if let Some(len) = transcript_len {
        embed.fields.push(("Messages".to_string(), len.to_string(), true));
    }
    MessagePayload::embed(embed)
}

/// Message privé envoyé à l'auteur du ticket
pub(crate) fn closure_dm(ticket: &ticket::Model, closed_by: Option<UserId>, reason: Option<&str>) -> MessagePayload {
    MessagePayload::embed(Embed {
        title: Some(format!("Votre ticket #{} a été fermé", ticket.id)),
        description: Some(reason.map_or_else(|| "Aucune raison donnée.".to_string(), |r| format!("Raison : {}", r))),
        color: Some(COLOR_INFO),
        fields: vec![("Fermé par".to_string(), closed_by_field(closed_by), true)],
    })
}
