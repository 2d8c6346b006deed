//! End-to-end scenarios: whole messages through the dispatcher, with an in-memory
//! store and a recording transport.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{FixedOffset, TimeDelta, Utc};

use chat_warden::commands::CommandHandler;
use chat_warden::error::{DatabaseError, ModuleError};
use chat_warden::message::{Attachments, ChatScope, ContentType, InboundMessage, MessageContext, ReplyTarget};
use chat_warden::modules::{
    BannedWordsModule, CommandHelp, KeywordReactionsModule, LimiterModule, ModerationModule,
    ModuleContext, ModuleName, ModuleRegistry, ProfanityModule, StatisticsModule,
};
use chat_warden::pipeline::{Dispatch, PipelineDispatcher};
use chat_warden::store::LibSqlBackend;
use chat_warden::transport::{RecordingTransport, TransportCall};

const CHAT: i64 = -100_777;
const ADMIN: i64 = 1;
const MEMBER: i64 = 42;

struct Harness {
    dispatcher: PipelineDispatcher,
    registry: Arc<ModuleRegistry>,
    ctx: Arc<ModuleContext>,
    transport: Arc<RecordingTransport>,
}

impl Harness {
    async fn new() -> Self {
        let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let transport = Arc::new(RecordingTransport::new());
        transport.set_admins(CHAT, vec![ADMIN]).await;

        let ctx = Arc::new(ModuleContext::new(
            store,
            transport.clone(),
            FixedOffset::east_opt(0).unwrap(),
            ModuleName::ALL.to_vec(),
        ));
        let reactions = Arc::new(KeywordReactionsModule::new(ctx.clone(), Duration::from_secs(300)));

        let registry = Arc::new(ModuleRegistry::new());
        registry.register(Arc::new(StatisticsModule::new(ctx.clone()))).await;
        registry.register(Arc::new(LimiterModule::new(ctx.clone()))).await;
        registry.register(Arc::new(ProfanityModule::new(ctx.clone(), None))).await;
        registry.register(Arc::new(BannedWordsModule::new(ctx.clone()))).await;
        registry.register(reactions.clone()).await;
        registry.init_all().await.unwrap();

        let commands = Arc::new(CommandHandler::new(ctx.clone(), registry.clone(), reactions));
        Self {
            dispatcher: PipelineDispatcher::new(registry.clone(), commands),
            registry,
            ctx,
            transport,
        }
    }

    /// Run an admin command and drop its reply from the recorded calls.
    async fn admin(&self, text: &str) -> String {
        self.dispatcher.dispatch(InboundMessage::text(CHAT, ADMIN, 1, text)).await;
        let calls = self.transport.take_calls().await;
        assert_eq!(calls.len(), 1, "one reply per command: {calls:?}");
        calls[0].text().unwrap_or_default().to_string()
    }

    /// Run an admin command as a reply to one of `target`'s messages.
    async fn admin_replying(&self, target: i64, thread_id: i64, text: &str) -> String {
        let msg = InboundMessage::text(CHAT, ADMIN, 1, text)
            .with_thread(thread_id)
            .with_reply_to(ReplyTarget {
                message_id: 2,
                sender_id: target,
                sender_name: format!("user{target}"),
            });
        self.dispatcher.dispatch(msg).await;
        let calls = self.transport.take_calls().await;
        calls.last().and_then(|c| c.text()).unwrap_or_default().to_string()
    }

    async fn send(&self, msg: InboundMessage) -> MessageContext {
        match self.dispatcher.dispatch(msg).await {
            Dispatch::Moderated(ctx) => ctx,
            other => panic!("expected the pipeline to run, got {other:?}"),
        }
    }
}

fn media(id: i64, attachments: Attachments) -> InboundMessage {
    InboundMessage::text(CHAT, MEMBER, id, "").with_attachments(attachments)
}

fn photo(id: i64) -> InboundMessage {
    media(id, Attachments { photo: true, ..Default::default() })
}

fn video(id: i64) -> InboundMessage {
    media(id, Attachments { video: true, ..Default::default() })
}

#[tokio::test]
async fn photo_cap_warns_then_deletes_the_fourth() {
    let h = Harness::new().await;
    h.admin("/setlimit photo 3").await;

    for id in 10..13 {
        assert!(!h.send(photo(id)).await.is_deleted());
    }
    let fourth = h.send(photo(13)).await;
    assert_eq!(fourth.deleted_by(), Some("limiter"));

    let calls = h.transport.calls().await;
    assert_eq!(calls.len(), 4, "{calls:?}");
    assert!(matches!(&calls[0], TransportCall::Reply { message_id: 11, text, .. } if text.contains("2/3 photo")));
    assert!(matches!(&calls[1], TransportCall::Reply { message_id: 12, text, .. } if text.contains("3/3 photo")));
    assert_eq!(calls[2], TransportCall::Delete { chat_id: CHAT, message_id: 13 });
    assert!(matches!(calls[3], TransportCall::Send { .. }));
}

#[tokio::test]
async fn addban_delete_warn_deletes_before_warning() {
    let h = Harness::new().await;
    h.admin("/addban spam delete_warn").await;

    let ctx = h.send(InboundMessage::text(CHAT, MEMBER, 20, "cheap SPAM here")).await;

    assert_eq!(ctx.deleted_by(), Some("banned_words"));
    let calls = h.transport.calls().await;
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0], TransportCall::Delete { chat_id: CHAT, message_id: 20 });
    assert!(matches!(&calls[1], TransportCall::Send { text, .. } if text.contains("banned word")));
}

#[tokio::test]
async fn vip_grant_lifts_an_exhausted_limit() {
    let h = Harness::new().await;
    h.admin("/setlimit video 1").await;

    h.send(video(30)).await;
    assert!(h.send(video(31)).await.is_deleted());

    let reply = h.admin_replying(MEMBER, 0, "/setvip trusted").await;
    assert!(reply.contains("VIP"));

    assert!(!h.send(video(32)).await.is_deleted());
    assert!(h.transport.calls().await.is_empty());
}

#[tokio::test]
async fn forbidden_deletes_first_and_unlimited_never_deletes() {
    let h = Harness::new().await;
    h.admin("/setlimit sticker -1").await;
    h.admin("/setlimit voice 0").await;

    let sticker = h
        .send(media(40, Attachments { sticker: true, ..Default::default() }))
        .await;
    assert!(sticker.is_deleted());
    h.transport.take_calls().await;

    for id in 50..70 {
        let voice = h.send(media(id, Attachments { voice: true, ..Default::default() })).await;
        assert!(!voice.is_deleted());
    }
    assert!(h.transport.calls().await.is_empty());

    let counters = &h.ctx.counters;
    let today = counters.today();
    let scope = ChatScope::chat_wide(CHAT);
    assert_eq!(counters.content_count(scope, MEMBER, ContentType::Voice, today).await.unwrap(), 20);
    assert_eq!(counters.content_count(scope, MEMBER, ContentType::Sticker, today).await.unwrap(), 0);
}

#[tokio::test]
async fn reaction_cooldown_gates_repeat_triggers() {
    let h = Harness::new().await;
    h.admin("/addreaction \"rules\" \"Read the pinned post.\" \"faq\" 30").await;

    let t0 = Utc::now();
    for (id, offset) in [(60, 0), (61, 29), (62, 31)] {
        let msg = InboundMessage::text(CHAT, MEMBER, id, "what are the rules?")
            .with_sent_at(t0 + TimeDelta::seconds(offset));
        h.send(msg).await;
    }

    let replied: Vec<i64> = h
        .transport
        .calls()
        .await
        .iter()
        .filter_map(|c| match c {
            TransportCall::Reply { message_id, .. } => Some(*message_id),
            _ => None,
        })
        .collect();
    assert_eq!(replied, vec![60, 62]);
}

#[tokio::test]
async fn topic_rule_shadows_chat_rule_for_the_same_word() {
    let h = Harness::new().await;
    h.admin("/addban spam delete").await;
    let msg = InboundMessage::text(CHAT, ADMIN, 1, "/addban spam warn").with_thread(7);
    h.dispatcher.dispatch(msg).await;
    h.transport.take_calls().await;

    let in_topic = h
        .send(InboundMessage::text(CHAT, MEMBER, 80, "spam").with_thread(7))
        .await;
    assert!(!in_topic.is_deleted());
    assert!(matches!(&h.transport.take_calls().await[..], [TransportCall::Reply { message_id: 80, .. }]));

    let in_chat = h.send(InboundMessage::text(CHAT, MEMBER, 81, "spam")).await;
    assert!(in_chat.is_deleted());
}

#[tokio::test]
async fn chat_wide_vip_and_limit_apply_inside_topics() {
    let h = Harness::new().await;
    h.admin("/setlimit photo 1").await;

    // Counted chat-wide, so the second photo in another topic is over the cap.
    h.send(photo(90).with_thread(3)).await;
    assert!(h.send(photo(91).with_thread(4)).await.is_deleted());

    h.admin_replying(MEMBER, 0, "/setvip").await;
    assert!(!h.send(photo(92).with_thread(3)).await.is_deleted());
}

#[tokio::test]
async fn disabled_module_does_not_run() {
    let h = Harness::new().await;
    h.admin("/addban spam delete").await;
    let reply = h.admin("/disable banned_words").await;
    assert!(reply.contains("disabled"));

    assert!(!h.send(InboundMessage::text(CHAT, MEMBER, 95, "spam")).await.is_deleted());
    assert!(h.transport.calls().await.is_empty());
}

#[tokio::test]
async fn text_limit_counts_plain_messages() {
    let h = Harness::new().await;
    h.admin("/settextlimit 2").await;

    for id in 100..102 {
        assert!(!h.send(InboundMessage::text(CHAT, MEMBER, id, "hello")).await.is_deleted());
    }
    assert!(h.send(InboundMessage::text(CHAT, MEMBER, 102, "hello")).await.is_deleted());

    let calls = h.transport.take_calls().await;
    assert_eq!(calls.len(), 4, "{calls:?}");
    assert!(matches!(&calls[0], TransportCall::Reply { message_id: 100, text, .. } if text.contains("1/2 text")));
    assert!(matches!(&calls[1], TransportCall::Reply { message_id: 101, text, .. } if text.contains("2/2 text")));
    assert_eq!(calls[2], TransportCall::Delete { chat_id: CHAT, message_id: 102 });
    assert!(matches!(&calls[3], TransportCall::Send { text, .. } if text.contains("limit")));

    let report = h.admin("/chattextviolations").await;
    assert!(report.contains(&format!("1. {MEMBER}: 3")), "{report}");
}

#[tokio::test]
async fn slash_caption_does_not_escape_a_forbidden_type() {
    let h = Harness::new().await;
    h.admin("/setlimit photo -1").await;

    let captioned = InboundMessage::text(CHAT, MEMBER, 120, "/lol")
        .with_attachments(Attachments { photo: true, ..Default::default() });
    let ctx = h.send(captioned).await;

    assert_eq!(ctx.deleted_by(), Some("limiter"));
    let calls = h.transport.calls().await;
    assert_eq!(calls[0], TransportCall::Delete { chat_id: CHAT, message_id: 120 });
}

#[tokio::test]
async fn slash_prefixed_text_is_still_filtered() {
    let h = Harness::new().await;
    h.admin("/addban spam delete").await;

    for (id, text) in [(121, "/ buy spam now"), (122, "/spam")] {
        let ctx = h.send(InboundMessage::text(CHAT, MEMBER, id, text)).await;
        assert_eq!(ctx.deleted_by(), Some("banned_words"), "{text}");
    }
    let deletes: Vec<_> = h.transport.calls().await.into_iter().filter(|c| c.is_delete()).collect();
    assert_eq!(deletes.len(), 2);
}

#[tokio::test]
async fn non_admin_cannot_configure() {
    let h = Harness::new().await;
    h.dispatcher
        .dispatch(InboundMessage::text(CHAT, MEMBER, 5, "/setlimit photo 0"))
        .await;
    let calls = h.transport.take_calls().await;
    assert!(matches!(&calls[..], [TransportCall::Reply { text, .. }] if text.contains("administrators")));

    let limits = h.admin("/listcontentlimits").await;
    assert_eq!(limits, "No content limits set.");
}

struct Exploding;

#[async_trait]
impl ModerationModule for Exploding {
    fn name(&self) -> ModuleName {
        ModuleName::Profanity
    }

    async fn enabled(&self, _chat_id: i64) -> Result<bool, ModuleError> {
        Ok(true)
    }

    async fn on_message(&self, _ctx: &mut MessageContext) -> Result<(), ModuleError> {
        Err(DatabaseError::Query("disk on fire".into()).into())
    }

    fn commands(&self) -> &'static [CommandHelp] {
        &[]
    }
}

#[tokio::test]
async fn failing_module_does_not_stop_later_stages() {
    let h = Harness::new().await;
    h.registry.register(Arc::new(Exploding)).await;
    h.admin("/addban spam delete").await;

    let ctx = h.send(InboundMessage::text(CHAT, MEMBER, 110, "spam")).await;
    assert_eq!(ctx.deleted_by(), Some("banned_words"));

    let stats = h
        .ctx
        .store
        .user_message_stats(CHAT, MEMBER, None)
        .await
        .unwrap();
    assert_eq!(stats[0].count, 1);
}
