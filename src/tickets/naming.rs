//! Nom des salons de tickets

use chrono::{DateTime, Duration, Utc};
use regex::{Captures, Regex};
use lazy_static::lazy_static;
use crate::platform::MemberProfile;

/// Longueur maximale d'un nom de salon, en unités UTF-16
pub const MAX_NAME_LENGTH: usize = 100;
const UNCLAIMED: &str = "unclaimed";

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"%([a-z_]+)([+-]\d{1,5})?%").expect("placeholder regex");
}

pub struct NameContext<'a> {
    /// Schéma du panel, ou à défaut celui du serveur
    pub scheme: Option<&'a str>,
    /// Nommage par défaut `ticket-<pseudo>` plutôt que `ticket-<id>`
    pub username_naming: bool,
    pub ticket_id: i32,
    pub opener: &'a MemberProfile,
    pub claimer: Option<&'a MemberProfile>,
    pub now: DateTime<Utc>,
}

/// Génère le nom du salon d'un ticket. Le résultat ne dépasse jamais [`MAX_NAME_LENGTH`].
pub fn generate_channel_name(ctx: &NameContext) -> String {
    let name = match ctx.scheme.filter(|s| !s.trim().is_empty()) {
        Some(scheme) => substitute(scheme, ctx),
        None if ctx.username_naming => format!("ticket-{}", or_unclaimed(&ctx.opener.username)),
        None => format!("ticket-{}", ctx.ticket_id),
    };
    truncate(&name, MAX_NAME_LENGTH)
}

fn or_unclaimed(value: &str) -> String {
    if value.trim().is_empty() { UNCLAIMED.to_string() } else { value.to_string() }
}

fn substitute(scheme: &str, ctx: &NameContext) -> String {
    PLACEHOLDER.replace_all(scheme, |caps: &Captures| {
        let offset = caps.get(2)
            .and_then(|m| m.as_str().parse::<i64>().ok())
            .unwrap_or(0);
        let date = ctx.now + Duration::days(offset);
        let value = match &caps[1] {
            "id" => ctx.ticket_id.to_string(),
            "id_padded" => format!("{:04}", ctx.ticket_id),
            "claimed" => ctx.claimer.map(|c| c.username.clone()).unwrap_or_default(),
            "username" => ctx.opener.username.clone(),
            "nickname" => ctx.opener.display_name().to_string(),
            "date" => date.format("%d-%m-%Y").to_string(),
            "date_us" => date.format("%m-%d-%Y").to_string(),
            "date_day" => date.format("%d").to_string(),
            "date_month" => date.format("%m").to_string(),
            "date_year" => date.format("%Y").to_string(),
            _ => return caps[0].to_string(),
        };
        or_unclaimed(&value)
    }).into_owned()
}

/// Coupe `name` pour qu'il tienne en `max` unités UTF-16, sans couper un caractère
pub fn truncate(name: &str, max: usize) -> String {
    let mut units = 0;
    let mut end = 0;
    for (idx, c) in name.char_indices() {
        units += c.len_utf16();
        if units > max {
            break;
        }
        end = idx + c.len_utf8();
    }
    name[..end].to_string()
}

/// Forme sous laquelle Discord enregistre un nom de salon textuel
pub fn normalise(name: &str) -> String {
    name.trim()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

/// `true` si le salon porte encore le nom que le bot lui avait donné
pub fn is_generated_name(current: &str, generated: &str) -> bool {
    normalise(current) == normalise(generated)
}
