//! Scénarios complets du cycle de vie, sur la plateforme simulée

use std::{collections::HashSet, sync::Arc};
use chrono::{Duration, Utc};
use sea_orm::{ConnectionTrait, DbBackend, Statement};
use serenity::model::{id::{ChannelId, RoleId}, permissions::Permissions};
use crate::{
    db::{
        controller::{self, ticket::NewTicket},
        model::{guild::settings, panel, ticket::TicketStatus},
        IDType,
    },
    coordination::{CoordinationStore, MemoryStore},
    platform::{same_overwrites, ChannelKind, OverwriteTarget},
};
use super::{
    capacity::CapacityError,
    permissions::{everyone_role, BOT_EXTRA, STANDARD},
    testing::*,
    CloseOptions, TicketEngine, TicketError,
};

async fn with_support_team(engine: &TicketEngine) {
    controller::guild::add_staff(engine.db(), GUILD, SUPPORT_ROLE.0 as IDType, true, false).await.unwrap();
}

async fn update_settings<F: FnOnce(&mut settings::Model)>(engine: &TicketEngine, f: F) {
    let mut model = controller::guild::settings(engine.db(), GUILD).await.unwrap();
    f(&mut model);
    controller::guild::save_settings(engine.db(), model).await.unwrap();
}

fn panel_model(title: &str) -> panel::Model {
    panel::Model {
        id: 0,
        guild_id: GUILD.0 as IDType,
        title: title.to_string(),
        category_id: None,
        naming_scheme: None,
        ticket_limit: None,
        with_default_team: true,
        use_threads: false,
        thread_parent_id: None,
        disabled: false,
        force_disabled: false,
        mention_opener: false,
        mention_here: false,
        delete_mentions: false,
        welcome_message: None,
    }
}

async fn open(engine: &TicketEngine, user: serenity::model::id::UserId) -> (i32, ChannelId) {
    let responder = MockResponder::default();
    let opened = engine.open(inv(user), None, &responder).await.unwrap();
    (opened.ticket.id, opened.channel_id)
}

/// Serveur configuré pour ouvrir les tickets en mode fil sous `parent`
async fn use_threads(engine: &TicketEngine, platform: &MockPlatform) -> ChannelId {
    let parent = platform.add_text_channel("support", None);
    update_settings(engine, |s| {
        s.use_threads = true;
        s.thread_parent_id = Some(parent.0 as IDType);
    }).await;
    parent
}

#[tokio::test]
async fn open_creates_named_channel_with_overwrites() {
    let platform = Arc::new(MockPlatform::new());
    let engine = engine(platform.clone()).await;
    with_support_team(&engine).await;

    let responder = MockResponder::default();
    let opened = engine.open(inv(OPENER), None, &responder).await.unwrap();
    assert_eq!(opened.ticket.id, 1);
    assert_eq!(opened.ticket.status, TicketStatus::Open);
    assert_eq!(opened.ticket.channel(), Some(opened.channel_id));

    let channel = platform.channel_summary(opened.channel_id).unwrap();
    assert_eq!(channel.name, "ticket-1");
    assert_eq!(channel.parent_id, None);
    let everyone = platform.overwrite(opened.channel_id, OverwriteTarget::Role(everyone_role(GUILD))).unwrap();
    assert_eq!(everyone.deny, Permissions::VIEW_CHANNEL);
    assert_eq!(platform.overwrite(opened.channel_id, OverwriteTarget::Member(OPENER)).unwrap().allow, STANDARD);
    assert_eq!(platform.overwrite(opened.channel_id, OverwriteTarget::Role(SUPPORT_ROLE)).unwrap().allow, STANDARD);
    assert_eq!(platform.overwrite(opened.channel_id, OverwriteTarget::Member(BOT)).unwrap().allow, STANDARD | BOT_EXTRA);
    assert!(platform.overwrite(opened.channel_id, OverwriteTarget::Member(STRANGER)).is_none());

    assert_eq!(responder.replies.lock().unwrap().len(), 1);
    let welcome = platform.sent_to(opened.channel_id);
    assert!(welcome.iter().any(|m| m.buttons.iter().any(|b| b.custom_id == "tickets_close")));
    let ticket = controller::ticket::get(engine.db(), GUILD, 1).await.unwrap().unwrap();
    assert!(ticket.welcome_message_id.is_some());

    let (second, _) = open(&engine, OPENER).await;
    assert_eq!(second, 2);
}

#[tokio::test]
async fn full_guild_is_refused_without_creating_anything() {
    let platform = Arc::new(MockPlatform::new());
    platform.fill(None, 500);
    let engine = engine(platform.clone()).await;

    let responder = MockResponder::default();
    let res = engine.open(inv(OPENER), None, &responder).await;
    assert!(matches!(res, Err(TicketError::Capacity(CapacityError::GuildLimit))));
    assert_eq!(platform.calls("create_channel"), 0);
    assert_eq!(platform.refreshes(), 1);
    assert!(controller::ticket::get(engine.db(), GUILD, 1).await.unwrap().is_none());
}

#[tokio::test]
async fn stale_cache_is_refreshed_once() {
    let platform = Arc::new(MockPlatform::new());
    platform.fill(None, 501);
    let engine = engine(platform.clone()).await;
    // Salons supprimés depuis, encore présents dans le cache
    platform.freeze_cache();
    platform.remove_channel(ChannelId(10_001));
    platform.remove_channel(ChannelId(10_002));

    let (id, _) = open(&engine, OPENER).await;
    assert_eq!(id, 1);
    assert_eq!(platform.refreshes(), 1);
}

#[tokio::test]
async fn full_category_without_overflow() {
    let platform = Arc::new(MockPlatform::new());
    let category = platform.add_category("tickets");
    platform.fill(Some(category), 50);
    let engine = engine(platform.clone()).await;
    update_settings(&engine, |s| s.channel_category_id = Some(category.0 as IDType)).await;

    let responder = MockResponder::default();
    let res = engine.open(inv(OPENER), None, &responder).await;
    assert!(matches!(res, Err(TicketError::Capacity(CapacityError::CategoryLimit))));
    assert_eq!(platform.calls("create_channel"), 0);
}

#[tokio::test]
async fn full_category_spills_into_overflow() {
    let platform = Arc::new(MockPlatform::new());
    let category = platform.add_category("tickets");
    let overflow = platform.add_category("tickets-2");
    platform.fill(Some(category), 50);
    let engine = engine(platform.clone()).await;
    update_settings(&engine, |s| {
        s.channel_category_id = Some(category.0 as IDType);
        s.overflow_enabled = true;
        s.overflow_category_id = Some(overflow.0 as IDType);
    }).await;

    let (_, channel_id) = open(&engine, OPENER).await;
    assert_eq!(platform.channel_summary(channel_id).unwrap().parent_id, Some(overflow));
}

#[tokio::test]
async fn deleted_overflow_category_disables_overflow() {
    let platform = Arc::new(MockPlatform::new());
    let category = platform.add_category("tickets");
    platform.fill(Some(category), 50);
    let engine = engine(platform.clone()).await;
    update_settings(&engine, |s| {
        s.channel_category_id = Some(category.0 as IDType);
        s.overflow_enabled = true;
        s.overflow_category_id = Some(123_456);
    }).await;

    let responder = MockResponder::default();
    let res = engine.open(inv(OPENER), None, &responder).await;
    assert!(matches!(res, Err(TicketError::Capacity(CapacityError::CategoryLimit))));
    let settings = controller::guild::settings(engine.db(), GUILD).await.unwrap();
    assert!(!settings.overflow_enabled);
}

#[tokio::test]
async fn hidden_claim_then_unclaim_restores_overwrites() {
    let platform = Arc::new(MockPlatform::new());
    let engine = engine(platform.clone()).await;
    with_support_team(&engine).await;
    controller::guild::save_claim_settings(engine.db(), GUILD, false, false).await.unwrap();
    let (id, channel_id) = open(&engine, OPENER).await;
    let original = platform.channel_summary(channel_id).unwrap().overwrites;

    engine.claim(inv(SUPPORT), id).await.unwrap();
    assert_eq!(controller::ticket::claimer(engine.db(), GUILD, id).await.unwrap(), Some(SUPPORT));
    assert!(platform.overwrite(channel_id, OverwriteTarget::Role(SUPPORT_ROLE)).is_none());
    assert_eq!(platform.overwrite(channel_id, OverwriteTarget::Member(SUPPORT)).unwrap().allow, STANDARD);
    assert_eq!(platform.overwrite(channel_id, OverwriteTarget::Member(OPENER)).unwrap().allow, STANDARD);

    let res = engine.claim(inv(OTHER_SUPPORT), id).await;
    assert!(matches!(res, Err(TicketError::AlreadyClaimed(user)) if user == SUPPORT));
    let res = engine.unclaim(inv(OTHER_SUPPORT), id).await;
    assert!(matches!(res, Err(TicketError::NotClaimer)));

    engine.unclaim(inv(SUPPORT), id).await.unwrap();
    let restored = platform.channel_summary(channel_id).unwrap().overwrites;
    assert!(same_overwrites(&original, &restored));
    assert_eq!(controller::ticket::claimer(engine.db(), GUILD, id).await.unwrap(), None);
}

#[tokio::test]
async fn concurrent_claims_have_one_winner() {
    let platform = Arc::new(MockPlatform::new());
    let engine = engine(platform.clone()).await;
    with_support_team(&engine).await;
    let (id, _) = open(&engine, OPENER).await;

    let (a, b) = futures::join!(engine.claim(inv(SUPPORT), id), engine.claim(inv(OTHER_SUPPORT), id));
    let winner = match (&a, &b) {
        (Ok(()), Err(TicketError::AlreadyClaimed(user))) => { assert_eq!(*user, SUPPORT); SUPPORT }
        (Err(TicketError::AlreadyClaimed(user)), Ok(())) => { assert_eq!(*user, OTHER_SUPPORT); OTHER_SUPPORT }
        other => panic!("un seul claim doit aboutir: {:?}", other),
    };
    assert_eq!(controller::ticket::claimer(engine.db(), GUILD, id).await.unwrap(), Some(winner));
}

#[tokio::test]
async fn view_only_claim_keeps_support_read_only() {
    let platform = Arc::new(MockPlatform::new());
    let engine = engine(platform.clone()).await;
    with_support_team(&engine).await;
    controller::guild::save_claim_settings(engine.db(), GUILD, true, false).await.unwrap();
    let (id, channel_id) = open(&engine, OPENER).await;

    engine.claim(inv(SUPPORT), id).await.unwrap();
    let support = platform.overwrite(channel_id, OverwriteTarget::Role(SUPPORT_ROLE)).unwrap();
    assert!(support.allow.contains(Permissions::VIEW_CHANNEL));
    assert!(support.deny.contains(Permissions::SEND_MESSAGES));
}

#[tokio::test]
async fn claim_renames_only_generated_names() {
    let platform = Arc::new(MockPlatform::new());
    let engine = engine(platform.clone()).await;
    with_support_team(&engine).await;
    update_settings(&engine, |s| s.naming_scheme = Some("%id%-%claimed%".to_string())).await;
    let (first, first_channel) = open(&engine, OPENER).await;
    let (second, second_channel) = open(&engine, OPENER).await;
    assert_eq!(platform.channel_summary(first_channel).unwrap().name, "1-unclaimed");

    engine.claim(inv(SUPPORT), first).await.unwrap();
    assert_eq!(platform.channel_summary(first_channel).unwrap().name, "1-user200");

    platform.rename(second_channel, "urgent");
    engine.claim(inv(SUPPORT), second).await.unwrap();
    assert_eq!(platform.channel_summary(second_channel).unwrap().name, "urgent");
}

#[tokio::test]
async fn claim_requires_staff() {
    let platform = Arc::new(MockPlatform::new());
    let engine = engine(platform.clone()).await;
    with_support_team(&engine).await;
    let (id, _) = open(&engine, OPENER).await;
    assert!(matches!(engine.claim(inv(OPENER), id).await, Err(TicketError::NotStaff)));
    assert!(matches!(engine.unclaim(inv(SUPPORT), id).await, Err(TicketError::NotClaimed)));
}

#[tokio::test]
async fn channel_ticket_cannot_switch_to_thread_panel() {
    let platform = Arc::new(MockPlatform::new());
    let engine = engine(platform.clone()).await;
    with_support_team(&engine).await;
    let mut threads = panel_model("Fils");
    threads.use_threads = true;
    let threads = controller::panel::create(engine.db(), threads).await.unwrap();
    let (id, _) = open(&engine, OPENER).await;

    let res = engine.switch_panel(inv(SUPPORT), id, threads.id).await;
    assert!(matches!(res, Err(TicketError::IncompatiblePanel)));
}

#[tokio::test]
async fn switch_moves_channel_to_panel_category() {
    let platform = Arc::new(MockPlatform::new());
    let category = platform.add_category("facturation");
    let engine = engine(platform.clone()).await;
    with_support_team(&engine).await;
    let mut billing = panel_model("Facturation");
    billing.category_id = Some(category.0 as IDType);
    let billing = controller::panel::create(engine.db(), billing).await.unwrap();
    let (id, channel_id) = open(&engine, OPENER).await;

    engine.switch_panel(inv(SUPPORT), id, billing.id).await.unwrap();
    assert_eq!(platform.channel_summary(channel_id).unwrap().parent_id, Some(category));
    let ticket = controller::ticket::get(engine.db(), GUILD, id).await.unwrap().unwrap();
    assert_eq!(ticket.panel_id, Some(billing.id));
}

#[tokio::test]
async fn switch_blocked_when_claimer_loses_access() {
    let platform = Arc::new(MockPlatform::new());
    let engine = engine(platform.clone()).await;
    with_support_team(&engine).await;
    let mut private = panel_model("Privé");
    private.with_default_team = false;
    let private = controller::panel::create(engine.db(), private).await.unwrap();
    let (id, _) = open(&engine, OPENER).await;
    engine.claim(inv(SUPPORT), id).await.unwrap();

    let res = engine.switch_panel(inv(SUPPORT), id, private.id).await;
    assert!(matches!(res, Err(TicketError::ClaimerWouldLoseAccess)));

    update_settings(&engine, |s| s.switch_claim_behaviour = settings::SwitchClaimBehaviour::Unclaim).await;
    engine.switch_panel(inv(SUPPORT), id, private.id).await.unwrap();
    assert_eq!(controller::ticket::claimer(engine.db(), GUILD, id).await.unwrap(), None);
}

#[tokio::test]
async fn refused_switch_restores_claim_and_members() {
    let platform = Arc::new(MockPlatform::new());
    let engine = engine(platform.clone()).await;
    with_support_team(&engine).await;
    let mut private = panel_model("Privé");
    private.with_default_team = false;
    let private = controller::panel::create(engine.db(), private).await.unwrap();
    let (id, _) = open(&engine, OPENER).await;
    engine.claim(inv(SUPPORT), id).await.unwrap();
    platform.fail_on("edit_channel", Failure::Forbidden);

    update_settings(&engine, |s| s.switch_claim_behaviour = settings::SwitchClaimBehaviour::Unclaim).await;
    let res = engine.switch_panel(inv(SUPPORT), id, private.id).await;
    assert!(matches!(res, Err(TicketError::Platform(ref e)) if e.is_forbidden()));
    assert_eq!(controller::ticket::claimer(engine.db(), GUILD, id).await.unwrap(), Some(SUPPORT));

    update_settings(&engine, |s| s.switch_claim_behaviour = settings::SwitchClaimBehaviour::Keep).await;
    let res = engine.switch_panel(inv(SUPPORT), id, private.id).await;
    assert!(matches!(res, Err(TicketError::Platform(_))));
    assert!(controller::ticket::members(engine.db(), GUILD, id).await.unwrap().is_empty());
    assert_eq!(controller::ticket::claimer(engine.db(), GUILD, id).await.unwrap(), Some(SUPPORT));

    let ticket = controller::ticket::get(engine.db(), GUILD, id).await.unwrap().unwrap();
    assert_eq!(ticket.panel_id, None);
}

#[tokio::test]
async fn reopen_reports_each_refusal() {
    let platform = Arc::new(MockPlatform::new());
    let engine = engine(platform.clone()).await;
    with_support_team(&engine).await;

    // Ticket encore ouvert
    let (channel_ticket, _) = open(&engine, OPENER).await;
    assert!(matches!(engine.reopen(inv(OPENER), channel_ticket).await, Err(TicketError::TicketAlreadyOpen)));

    // Ticket en mode salon
    engine.close(inv(OPENER), channel_ticket, CloseOptions::default()).await.unwrap();
    assert!(matches!(engine.reopen(inv(OPENER), channel_ticket).await, Err(TicketError::NotAThread)));

    use_threads(&engine, &platform).await;

    // Fil supprimé
    let (deleted, deleted_thread) = open(&engine, OPENER).await;
    engine.close(inv(OPENER), deleted, CloseOptions::default()).await.unwrap();
    platform.remove_channel(deleted_thread);
    assert!(matches!(engine.reopen(inv(OPENER), deleted).await, Err(TicketError::ChannelDeleted)));

    // Membre sans accès
    let (thread_ticket, thread_id) = open(&engine, OPENER).await;
    engine.close(inv(SUPPORT), thread_ticket, CloseOptions::default()).await.unwrap();
    assert_eq!(platform.thread_state(thread_id), Some((true, true)));
    assert!(matches!(engine.reopen(inv(STRANGER), thread_ticket).await, Err(TicketError::NoTicketAccess)));

    engine.reopen(inv(OPENER), thread_ticket).await.unwrap();
    assert_eq!(platform.thread_state(thread_id), Some((false, false)));
    let ticket = controller::ticket::get(engine.db(), GUILD, thread_ticket).await.unwrap().unwrap();
    assert!(ticket.open);
}

#[tokio::test]
async fn thread_ticket_adds_opener_to_thread() {
    let platform = Arc::new(MockPlatform::new());
    let engine = engine(platform.clone()).await;
    let parent = use_threads(&engine, &platform).await;
    let (id, thread_id) = open(&engine, OPENER).await;

    let thread = platform.channel_summary(thread_id).unwrap();
    assert_eq!(thread.kind, ChannelKind::Thread);
    assert_eq!(thread.parent_id, Some(parent));
    assert!(platform.thread_members(thread_id).contains(&OPENER));
    assert!(matches!(engine.claim(inv(ADMIN), id).await, Err(TicketError::ThreadTicket)));
}

#[tokio::test]
async fn reopen_respects_ticket_limit() {
    let platform = Arc::new(MockPlatform::new());
    let engine = engine(platform.clone()).await;
    use_threads(&engine, &platform).await;
    update_settings(&engine, |s| s.ticket_limit = 1).await;
    let (first, first_thread) = open(&engine, OPENER).await;
    engine.close(inv(OPENER), first, CloseOptions::default()).await.unwrap();
    let (second, _) = open(&engine, OPENER).await;

    let res = engine.reopen(inv(OPENER), first).await;
    assert!(matches!(res, Err(TicketError::TicketLimit(1))));
    assert_eq!(platform.thread_state(first_thread), Some((true, true)));
    assert!(!controller::ticket::get(engine.db(), GUILD, first).await.unwrap().unwrap().open);

    engine.close(inv(OPENER), second, CloseOptions::default()).await.unwrap();
    engine.reopen(inv(OPENER), first).await.unwrap();
}

#[tokio::test]
async fn thread_close_archives_and_locks() {
    let platform = Arc::new(MockPlatform::new());
    let engine = engine(platform.clone()).await;
    use_threads(&engine, &platform).await;
    let (id, thread_id) = open(&engine, OPENER).await;
    platform.push_history(thread_id, OPENER, 150);

    let outcome = engine.close(inv(OPENER), id, CloseOptions::default()).await.unwrap();
    assert_eq!(outcome.transcript_len, Some(150));
    assert_eq!(platform.fetches(), 2);
    let transcript = controller::archive::transcript(engine.db(), GUILD, id).await.unwrap();
    assert_eq!(transcript.first().unwrap().content, "message 0");
    assert_eq!(transcript.last().unwrap().content, "message 149");

    // Le fil reste en place, archivé et verrouillé, avec un message de fermeture
    assert!(platform.channel_summary(thread_id).is_some());
    assert_eq!(platform.thread_state(thread_id), Some((true, true)));
    let notice = format!("Ticket fermé par <@{}>.", OPENER.0);
    assert!(platform.sent_to(thread_id).iter().any(|m| m.content.as_deref() == Some(notice.as_str())));
    assert_eq!(platform.calls("delete_channel"), 0);
}

#[tokio::test]
async fn close_saves_very_long_history() {
    let platform = Arc::new(MockPlatform::new());
    let engine = engine(platform.clone()).await;
    let (id, channel_id) = open(&engine, OPENER).await;
    platform.push_history(channel_id, OPENER, 4000);

    let outcome = engine.close(inv(OPENER), id, CloseOptions::default()).await.unwrap();
    assert_eq!(outcome.transcript_len, Some(4000));
    assert_eq!(controller::archive::transcript(engine.db(), GUILD, id).await.unwrap().len(), 4000);
    assert!(!controller::ticket::get(engine.db(), GUILD, id).await.unwrap().unwrap().open);
    assert!(platform.channel_summary(channel_id).is_none());
}

#[tokio::test]
async fn slow_follow_ups_do_not_fail_the_close() {
    let platform = Arc::new(MockPlatform::new());
    let mut config = test_config();
    config.operation_timeout_ms = 400;
    config.follow_up_timeout_ms = 200;
    let engine = engine_with(platform.clone(), config).await;
    let (id, channel_id) = open(&engine, OPENER).await;
    platform.push_history(channel_id, OPENER, 1);
    platform.delay_on("create_dm_channel", std::time::Duration::from_millis(800));

    let outcome = engine.close(inv(OPENER), id, CloseOptions::default()).await.unwrap();
    assert_eq!(outcome.ticket_id, id);
    assert!(!controller::ticket::get(engine.db(), GUILD, id).await.unwrap().unwrap().open);
    assert!(platform.channel_summary(channel_id).is_none());
}

#[tokio::test]
async fn database_failure_leaves_channel_in_place() {
    let platform = Arc::new(MockPlatform::new());
    let engine = engine(platform.clone()).await;
    let (id, channel_id) = open(&engine, OPENER).await;
    engine.db().execute(Statement::from_string(DbBackend::Sqlite, "DROP TABLE cdd_ticket_close_reason".to_string())).await.unwrap();

    let res = engine.close(inv(OPENER), id, CloseOptions::default()).await;
    assert!(matches!(res, Err(TicketError::Data(_))));
    assert!(platform.channel_summary(channel_id).is_some());
    assert_eq!(platform.calls("delete_channel"), 0);
    assert!(controller::ticket::get(engine.db(), GUILD, id).await.unwrap().unwrap().open);
}

#[tokio::test]
async fn failed_channel_deletion_reopens_ticket() {
    let platform = Arc::new(MockPlatform::new());
    let engine = engine(platform.clone()).await;
    let (id, channel_id) = open(&engine, OPENER).await;
    platform.fail_on("delete_channel", Failure::Server);

    let res = engine.close(inv(OPENER), id, CloseOptions::default()).await;
    assert!(matches!(res, Err(TicketError::Platform(_))));
    assert!(platform.channel_summary(channel_id).is_some());
    let ticket = controller::ticket::get(engine.db(), GUILD, id).await.unwrap().unwrap();
    assert!(ticket.open);
    assert_eq!(ticket.status, TicketStatus::Open);
    assert!(ticket.close_time.is_none());
    assert!(!engine.is_autoclose_excluded(GUILD, id).await.unwrap());
}

#[tokio::test]
async fn close_collects_full_history_oldest_first() {
    let platform = Arc::new(MockPlatform::new());
    let engine = engine(platform.clone()).await;
    let (id, channel_id) = open(&engine, OPENER).await;
    platform.push_history(channel_id, OPENER, 250);

    let outcome = engine.close(inv(OPENER), id, CloseOptions { reason: Some("réglé".into()), automated: false }).await.unwrap();
    assert_eq!(outcome.transcript_len, Some(250));
    assert_eq!(platform.fetches(), 3);

    let transcript = controller::archive::transcript(engine.db(), GUILD, id).await.unwrap();
    assert_eq!(transcript.len(), 250);
    assert_eq!(transcript.first().unwrap().content, "message 0");
    assert_eq!(transcript.last().unwrap().content, "message 249");
    assert!(transcript.windows(2).all(|w| w[0].message_id < w[1].message_id));

    assert!(platform.channel_summary(channel_id).is_none());
    let ticket = controller::ticket::get(engine.db(), GUILD, id).await.unwrap().unwrap();
    assert!(!ticket.open);
    assert!(ticket.close_time.is_some());
    let reason = controller::archive::close_reason(engine.db(), GUILD, id).await.unwrap().unwrap();
    assert_eq!(reason.reason.as_deref(), Some("réglé"));
    assert_eq!(reason.closed_by, Some(OPENER.0 as IDType));
    assert_eq!(platform.deleted_webhooks().len(), 1);
    // Message privé à l'auteur
    assert_eq!(platform.sent_to(ChannelId(1_000_000 + OPENER.0)).len(), 1);

    let res = engine.close(inv(OPENER), id, CloseOptions::default()).await;
    assert!(matches!(res, Err(TicketError::TicketClosed)));
}

#[tokio::test]
async fn silent_opener_gets_no_dm() {
    let platform = Arc::new(MockPlatform::new());
    let engine = engine(platform.clone()).await;
    with_support_team(&engine).await;
    let (id, channel_id) = open(&engine, OPENER).await;
    platform.push_history(channel_id, SUPPORT, 3);

    engine.close(inv(SUPPORT), id, CloseOptions::default()).await.unwrap();
    assert!(platform.sent_to(ChannelId(1_000_000 + OPENER.0)).is_empty());
}

#[tokio::test]
async fn close_requires_opener_or_staff() {
    let platform = Arc::new(MockPlatform::new());
    let engine = engine(platform.clone()).await;
    let (id, _) = open(&engine, OPENER).await;
    let res = engine.close(inv(STRANGER), id, CloseOptions::default()).await;
    assert!(matches!(res, Err(TicketError::NoTicketAccess)));
    engine.close(inv(STRANGER), id, CloseOptions { reason: None, automated: true }).await.unwrap();
    let reason = controller::archive::close_reason(engine.db(), GUILD, id).await.unwrap().unwrap();
    assert_eq!(reason.closed_by, None);
}

#[tokio::test]
async fn concurrent_opens_get_distinct_ids() {
    let platform = Arc::new(MockPlatform::new());
    let engine = engine(platform.clone()).await;
    let (first, second) = (MockResponder::default(), MockResponder::default());
    let (a, b) = futures::join!(
        engine.open(inv(OPENER), None, &first),
        engine.open(inv(STRANGER), None, &second),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    let ids = [a.ticket.id, b.ticket.id].into_iter().collect::<HashSet<_>>();
    assert_eq!(ids, [1, 2].into_iter().collect());
    assert_ne!(a.channel_id, b.channel_id);
}

#[tokio::test]
async fn failed_open_is_rolled_back() {
    let platform = Arc::new(MockPlatform::new());
    let engine = engine(platform.clone()).await;
    platform.fail_on("send_message", Failure::Server);

    let responder = MockResponder::default();
    let res = engine.open(inv(OPENER), None, &responder).await;
    assert!(matches!(res, Err(TicketError::Platform(_))));
    let ticket = controller::ticket::get(engine.db(), GUILD, 1).await.unwrap().unwrap();
    assert!(!ticket.open);
    assert_eq!(platform.channel_count(ChannelKind::Text), 0);
    // La limite de tickets ne compte pas le ticket avorté
    assert_eq!(controller::ticket::count_open_by_opener(engine.db(), GUILD, OPENER, None).await.unwrap(), 0);
}

#[tokio::test]
async fn forbidden_close_excludes_from_autoclose() {
    let platform = Arc::new(MockPlatform::new());
    let engine = engine(platform.clone()).await;
    let (id, channel_id) = open(&engine, OPENER).await;
    platform.fail_on("delete_channel", Failure::Forbidden);

    let res = engine.close(inv(OPENER), id, CloseOptions::default()).await;
    assert!(matches!(res, Err(TicketError::Platform(ref e)) if e.is_forbidden()));
    assert!(engine.is_autoclose_excluded(GUILD, id).await.unwrap());
    assert!(platform.channel_summary(channel_id).is_some());
    let ticket = controller::ticket::get(engine.db(), GUILD, id).await.unwrap().unwrap();
    assert!(ticket.open);
    assert!(ticket.close_time.is_none());
}

#[tokio::test]
async fn blacklisted_member_cannot_open() {
    let platform = Arc::new(MockPlatform::new());
    let engine = engine(platform.clone()).await;
    controller::guild::add_blacklist(engine.db(), GUILD, OPENER.0 as IDType, false).await.unwrap();
    let responder = MockResponder::default();
    assert!(matches!(engine.open(inv(OPENER), None, &responder).await, Err(TicketError::Blacklisted)));
}

#[tokio::test]
async fn ticket_limit_applies_to_members_only() {
    let platform = Arc::new(MockPlatform::new());
    let engine = engine(platform.clone()).await;
    with_support_team(&engine).await;
    update_settings(&engine, |s| s.ticket_limit = 1).await;
    open(&engine, OPENER).await;

    let responder = MockResponder::default();
    assert!(matches!(engine.open(inv(OPENER), None, &responder).await, Err(TicketError::TicketLimit(1))));
    open(&engine, SUPPORT).await;
    open(&engine, SUPPORT).await;
}

#[tokio::test]
async fn panel_limit_of_zero_falls_back_to_guild_limit() {
    let platform = Arc::new(MockPlatform::new());
    let engine = engine(platform.clone()).await;
    let mut unlimited = panel_model("Sans limite");
    unlimited.ticket_limit = Some(0);
    let unlimited = controller::panel::create(engine.db(), unlimited).await.unwrap();
    let responder = MockResponder::default();

    // 0 sur le panel et sur le serveur : aucune limite
    update_settings(&engine, |s| s.ticket_limit = 0).await;
    for _ in 0..6 {
        engine.open(inv(OPENER), Some(unlimited.id), &responder).await.unwrap();
    }
    // La limite du serveur s'applique au panel
    update_settings(&engine, |s| s.ticket_limit = 6).await;
    let res = engine.open(inv(OPENER), Some(unlimited.id), &responder).await;
    assert!(matches!(res, Err(TicketError::TicketLimit(6))));

    // Une limite propre au panel compte les tickets du panel seulement
    let mut limited = panel_model("Limité");
    limited.ticket_limit = Some(1);
    let limited = controller::panel::create(engine.db(), limited).await.unwrap();
    engine.open(inv(OPENER), Some(limited.id), &responder).await.unwrap();
    let res = engine.open(inv(OPENER), Some(limited.id), &responder).await;
    assert!(matches!(res, Err(TicketError::TicketLimit(1))));
}

#[tokio::test]
async fn opens_are_rate_limited_per_guild() {
    let platform = Arc::new(MockPlatform::new());
    let mut config = test_config();
    config.rate_limit_burst = 1;
    config.rate_limit_period_ms = 60_000;
    let engine = engine_with(platform.clone(), config).await;
    open(&engine, OPENER).await;

    let responder = MockResponder::default();
    assert!(matches!(engine.open(inv(STRANGER), None, &responder).await, Err(TicketError::RateLimited)));
}

#[tokio::test]
async fn rate_limit_is_shared_by_engines_on_one_store() {
    let store: Arc<dyn CoordinationStore> = Arc::new(MemoryStore::new());
    let mut config = test_config();
    config.rate_limit_burst = 1;
    config.rate_limit_period_ms = 60_000;
    let first = engine_with_store(Arc::new(MockPlatform::new()), config.clone(), store.clone()).await;
    let second = engine_with_store(Arc::new(MockPlatform::new()), config, store).await;
    open(&first, OPENER).await;

    let responder = MockResponder::default();
    assert!(matches!(second.open(inv(OPENER), None, &responder).await, Err(TicketError::RateLimited)));
}

#[tokio::test]
async fn panel_checks() {
    let platform = Arc::new(MockPlatform::new());
    let engine = engine(platform.clone()).await;
    let mut disabled = panel_model("Fermé");
    disabled.disabled = true;
    let disabled = controller::panel::create(engine.db(), disabled).await.unwrap();
    let restricted = controller::panel::create(engine.db(), panel_model("Restreint")).await.unwrap();
    controller::panel::add_access_rule(engine.db(), restricted.id, SUPPORT_ROLE.0 as IDType, true).await.unwrap();

    let responder = MockResponder::default();
    assert!(matches!(engine.open(inv(OPENER), Some(42), &responder).await, Err(TicketError::PanelNotFound(42))));
    assert!(matches!(engine.open(inv(OPENER), Some(disabled.id), &responder).await, Err(TicketError::PanelDisabled)));
    assert!(matches!(engine.open(inv(OPENER), Some(restricted.id), &responder).await, Err(TicketError::PanelAccessDenied)));
    let opened = engine.open(inv(SUPPORT), Some(restricted.id), &responder).await.unwrap();
    assert_eq!(opened.ticket.panel_id, Some(restricted.id));
}

#[tokio::test]
async fn panel_team_replaces_default_team() {
    let platform = Arc::new(MockPlatform::new());
    let engine = engine(platform.clone()).await;
    with_support_team(&engine).await;
    let mut billing = panel_model("Facturation");
    billing.with_default_team = false;
    billing.mention_opener = true;
    let billing = controller::panel::create(engine.db(), billing).await.unwrap();
    controller::panel::add_support(engine.db(), billing.id, OTHER_SUPPORT.0 as IDType, false).await.unwrap();
    controller::panel::add_mention(engine.db(), billing.id, RoleId(77)).await.unwrap();

    let responder = MockResponder::default();
    let opened = engine.open(inv(OPENER), Some(billing.id), &responder).await.unwrap();
    assert!(platform.overwrite(opened.channel_id, OverwriteTarget::Role(SUPPORT_ROLE)).is_none());
    assert_eq!(platform.overwrite(opened.channel_id, OverwriteTarget::Member(OTHER_SUPPORT)).unwrap().allow, STANDARD);
    let sent = platform.sent_to(opened.channel_id);
    assert!(sent.iter().any(|m| m.content.as_deref() == Some("<@&77> <@100>")));

    // Le support par défaut ne traite pas les tickets de ce panel
    assert!(matches!(engine.claim(inv(SUPPORT), opened.ticket.id).await, Err(TicketError::NotStaff)));
    engine.claim(inv(OTHER_SUPPORT), opened.ticket.id).await.unwrap();
}

#[tokio::test]
async fn members_can_be_added_and_removed() {
    let platform = Arc::new(MockPlatform::new());
    let engine = engine(platform.clone()).await;
    let (id, channel_id) = open(&engine, OPENER).await;

    engine.add_member(inv(OPENER), id, STRANGER).await.unwrap();
    assert_eq!(platform.overwrite(channel_id, OverwriteTarget::Member(STRANGER)).unwrap().allow, STANDARD);
    assert_eq!(controller::ticket::members(engine.db(), GUILD, id).await.unwrap(), vec![STRANGER]);

    assert!(matches!(engine.remove_member(inv(OPENER), id, OPENER).await, Err(TicketError::CannotRemoveOpener)));
    engine.remove_member(inv(OPENER), id, STRANGER).await.unwrap();
    assert!(platform.overwrite(channel_id, OverwriteTarget::Member(STRANGER)).is_none());
    assert!(matches!(engine.add_member(inv(STRANGER), id, STRANGER).await, Err(TicketError::NoTicketAccess)));
}

#[tokio::test]
async fn close_request_round_trip() {
    let platform = Arc::new(MockPlatform::new());
    let engine = engine(platform.clone()).await;
    with_support_team(&engine).await;
    let (id, _) = open(&engine, OPENER).await;

    assert!(matches!(engine.request_close(inv(OPENER), id, None).await, Err(TicketError::NotStaff)));
    assert!(matches!(engine.deny_close_request(inv(OPENER), id).await, Err(TicketError::NoCloseRequest)));

    engine.request_close(inv(SUPPORT), id, Some("plus de nouvelles".into())).await.unwrap();
    let ticket = controller::ticket::get(engine.db(), GUILD, id).await.unwrap().unwrap();
    assert_eq!(ticket.status, TicketStatus::Pending);
    engine.deny_close_request(inv(OPENER), id).await.unwrap();
    let ticket = controller::ticket::get(engine.db(), GUILD, id).await.unwrap().unwrap();
    assert_eq!(ticket.status, TicketStatus::Open);

    engine.request_close(inv(SUPPORT), id, Some("plus de nouvelles".into())).await.unwrap();
    assert!(matches!(engine.accept_close_request(inv(SUPPORT), id).await, Err(TicketError::NoTicketAccess)));
    engine.accept_close_request(inv(OPENER), id).await.unwrap();
    let reason = controller::archive::close_reason(engine.db(), GUILD, id).await.unwrap().unwrap();
    assert_eq!(reason.reason.as_deref(), Some("plus de nouvelles"));
    assert!(controller::ticket::close_request(engine.db(), GUILD, id).await.unwrap().is_none());
}

#[tokio::test]
async fn stuck_provisioning_is_swept() {
    let platform = Arc::new(MockPlatform::new());
    let engine = engine(platform.clone()).await;
    let now = Utc::now();
    let new = |opener| NewTicket { guild_id: GUILD, opener_id: opener, panel_id: None, is_thread: false };
    let old = controller::ticket::create(engine.db(), new(OPENER), now - Duration::hours(1)).await.unwrap();
    let recent = controller::ticket::create(engine.db(), new(STRANGER), now).await.unwrap();

    assert_eq!(engine.reconcile_provisioning(now).await.unwrap(), 1);
    assert!(!controller::ticket::get(engine.db(), GUILD, old.id).await.unwrap().unwrap().open);
    assert!(controller::ticket::get(engine.db(), GUILD, recent.id).await.unwrap().unwrap().open);
    // Le salon arrivé trop tard n'est plus rattaché
    assert!(controller::ticket::set_channel(engine.db(), GUILD, old.id, ChannelId(5)).await.is_err());
}

#[tokio::test]
async fn open_tickets_are_paged() {
    let platform = Arc::new(MockPlatform::new());
    let engine = engine(platform.clone()).await;
    with_support_team(&engine).await;
    for i in 0..12u64 {
        let ticket = controller::ticket::create(engine.db(), NewTicket {
            guild_id: GUILD,
            opener_id: OPENER,
            panel_id: None,
            is_thread: false,
        }, Utc::now()).await.unwrap();
        controller::ticket::set_channel(engine.db(), GUILD, ticket.id, ChannelId(50_000 + i)).await.unwrap();
    }

    assert!(matches!(engine.list_open_tickets(inv(OPENER)).await, Err(TicketError::NotStaff)));
    let paged = engine.list_open_tickets(inv(SUPPORT)).await.unwrap();
    assert_eq!(paged.page_count, 2);
    assert!(paged.first.buttons.iter().any(|b| b.custom_id == format!("tickets_page:{}:1", paged.id)));
    let last = engine.page(GUILD, &paged.id, 5).await.unwrap();
    let description = last.embed.unwrap().description.unwrap();
    assert_eq!(description.lines().count(), 2);
    assert!(matches!(engine.page(GUILD, "inconnu", 0).await, Err(TicketError::PageExpired)));
    assert!(matches!(engine.page(serenity::model::id::GuildId(2), &paged.id, 0).await, Err(TicketError::PageExpired)));
}
