//! Telegram side of the bridge
//!
//! Listens to the owner chat and the group chat. `/who` asks the Mumble
//! side for its user list; presence events from Mumble are announced in
//! the group chat.

use crate::base::Result;
use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use teloxide::prelude::*;
use teloxide::types::{AllowedUpdate, MessageId, ParseMode, ReplyParameters, UpdateKind};
use teloxide::update_listeners::{AsUpdateStream, Polling};
use tgm_core::bus::{ChatEvent, RequestId, VoiceEvent};
use tgm_core::config::TelegramConfig;
use tgm_core::SideHandler;
use tracing::{debug, info};

const SIDE_NAME: &str = "telegram";
const POLL_TIMEOUT_SECS: u64 = 10;
const MAX_PENDING_REQUESTS: usize = 64;

/// Telegram update as seen by the bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatUpdate {
    /// Text message
    Text {
        chat_id: i64,
        message_id: i32,
        text: String,
    },
    /// Anything else; ignored
    Other,
}

impl From<Update> for ChatUpdate {
    fn from(update: Update) -> Self {
        match update.kind {
            UpdateKind::Message(msg) => match msg.text() {
                Some(text) => ChatUpdate::Text {
                    chat_id: msg.chat.id.0,
                    message_id: msg.id.0,
                    text: text.to_string(),
                },
                None => ChatUpdate::Other,
            },
            _ => ChatUpdate::Other,
        }
    }
}

/// Bot commands understood by the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatCommand {
    /// List users connected to the voice server
    Who,
}

impl ChatCommand {
    /// Parse the leading command of a message
    ///
    /// A command addressed as `/who@name` is only accepted when `name` is
    /// this bot's username; Telegram usernames compare case-insensitively.
    pub fn parse(text: &str, bot_username: &str) -> Option<Self> {
        let word = text.split_whitespace().next()?;
        let command = match word.split_once('@') {
            Some((command, target)) if target.eq_ignore_ascii_case(bot_username) => command,
            Some(_) => return None,
            None => word,
        };
        match command {
            "/who" => Some(ChatCommand::Who),
            _ => None,
        }
    }
}

/// Outbound actions of the Telegram side
#[async_trait]
pub trait ChatActions: Send + Sync {
    /// Post a silent HTML message to a chat
    async fn send_notice(&self, chat_id: i64, html: &str) -> Result<()>;

    /// Answer a specific message with a silent HTML reply
    async fn send_reply(&self, chat_id: i64, reply_to: i32, html: &str) -> Result<()>;
}

/// Where the answer to a request goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyTarget {
    pub chat_id: i64,
    pub message_id: i32,
}

/// Requests waiting for an answer from the other side, oldest first
struct PendingRequests {
    entries: VecDeque<(RequestId, ReplyTarget, Instant)>,
    timeout: Duration,
    limit: usize,
}

impl PendingRequests {
    fn new(timeout: Duration, limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            timeout,
            limit,
        }
    }

    fn insert(&mut self, id: RequestId, target: ReplyTarget, now: Instant) {
        self.prune(now);
        while self.entries.len() >= self.limit {
            self.entries.pop_front();
        }
        self.entries.push_back((id, target, now));
    }

    fn take(&mut self, id: RequestId) -> Option<ReplyTarget> {
        let index = self.entries.iter().position(|(entry, _, _)| *entry == id)?;
        self.entries.remove(index).map(|(_, target, _)| target)
    }

    fn prune(&mut self, now: Instant) {
        while let Some((_, _, created)) = self.entries.front() {
            if now.duration_since(*created) <= self.timeout {
                break;
            }
            self.entries.pop_front();
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

pub fn user_joined_notice(username: &str) -> String {
    format!(
        "<code>{} joined</code>",
        html_escape::encode_text(username)
    )
}

pub fn user_left_notice(username: &str) -> String {
    format!("<code>{} left</code>", html_escape::encode_text(username))
}

pub fn user_list_reply(usernames: &[String]) -> String {
    if usernames.is_empty() {
        return "<code>no users are connected</code>".to_string();
    }
    let lines: Vec<String> = usernames
        .iter()
        .map(|name| html_escape::encode_text(name).into_owned())
        .collect();
    format!("<pre>{}</pre>", lines.join("\n"))
}

/// Handler for the Telegram side
pub struct TelegramSide<A> {
    actions: A,
    config: TelegramConfig,
    bot_username: String,
    pending: PendingRequests,
    next_request: u64,
}

impl<A: ChatActions> TelegramSide<A> {
    pub fn new(actions: A, config: &TelegramConfig, bot_username: &str) -> Self {
        Self {
            actions,
            config: config.clone(),
            bot_username: bot_username.to_string(),
            pending: PendingRequests::new(
                Duration::from_secs(config.request_timeout_secs),
                MAX_PENDING_REQUESTS,
            ),
            next_request: 0,
        }
    }

    /// Requests still waiting for an answer
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    fn request_user_list(&mut self, target: ReplyTarget) -> ChatEvent {
        self.next_request += 1;
        let request_id = RequestId(self.next_request);
        self.pending.insert(request_id, target, Instant::now());
        debug!(%request_id, chat_id = target.chat_id, "User list requested");
        ChatEvent::UserListRequested { request_id }
    }
}

#[async_trait]
impl<A: ChatActions> SideHandler for TelegramSide<A> {
    type Native = ChatUpdate;
    type Inbound = VoiceEvent;
    type Outbound = ChatEvent;

    fn name(&self) -> &str {
        SIDE_NAME
    }

    async fn on_native(&mut self, update: ChatUpdate) -> tgm_core::Result<Option<ChatEvent>> {
        match update {
            ChatUpdate::Text {
                chat_id,
                message_id,
                text,
            } if self.config.is_bridged_chat(chat_id) => {
                match ChatCommand::parse(&text, &self.bot_username) {
                    Some(ChatCommand::Who) => Ok(Some(self.request_user_list(ReplyTarget {
                        chat_id,
                        message_id,
                    }))),
                    None => Ok(None),
                }
            }
            ChatUpdate::Text { .. } | ChatUpdate::Other => Ok(None),
        }
    }

    async fn on_cross(&mut self, event: VoiceEvent) -> tgm_core::Result<Option<ChatEvent>> {
        match event {
            VoiceEvent::UserJoined { username } => {
                self.actions
                    .send_notice(self.config.group_id, &user_joined_notice(&username))
                    .await?;
            }
            VoiceEvent::UserLeft { username } => {
                self.actions
                    .send_notice(self.config.group_id, &user_left_notice(&username))
                    .await?;
            }
            VoiceEvent::UserListFetched {
                request_id,
                usernames,
            } => match self.pending.take(request_id) {
                Some(target) => {
                    self.actions
                        .send_reply(
                            target.chat_id,
                            target.message_id,
                            &user_list_reply(&usernames),
                        )
                        .await?;
                }
                None => debug!(%request_id, "No pending request for user list, ignoring"),
            },
        }
        Ok(None)
    }
}

/// [`ChatActions`] backed by the Telegram Bot API
#[derive(Clone)]
pub struct TelegramBot {
    bot: Bot,
}

impl TelegramBot {
    pub fn new(token: &str) -> Self {
        Self {
            bot: Bot::new(token),
        }
    }

    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    /// Check the token and return the bot's username
    pub async fn verify(&self) -> Result<String> {
        let me = self.bot.get_me().await?;
        let username = me.username.clone().unwrap_or_else(|| "unknown".to_string());
        info!("Telegram bot @{} connected", username);
        Ok(username)
    }

    /// Long-polling listener for message updates
    pub fn polling(&self) -> Polling<Bot> {
        Polling::builder(self.bot.clone())
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS))
            .allowed_updates(vec![AllowedUpdate::Message])
            .build()
    }
}

#[async_trait]
impl ChatActions for TelegramBot {
    async fn send_notice(&self, chat_id: i64, html: &str) -> Result<()> {
        self.bot
            .send_message(ChatId(chat_id), html)
            .parse_mode(ParseMode::Html)
            .disable_notification(true)
            .await?;
        Ok(())
    }

    async fn send_reply(&self, chat_id: i64, reply_to: i32, html: &str) -> Result<()> {
        self.bot
            .send_message(ChatId(chat_id), html)
            .parse_mode(ParseMode::Html)
            .disable_notification(true)
            .reply_parameters(ReplyParameters::new(MessageId(reply_to)))
            .await?;
        Ok(())
    }
}

/// External event source of the Telegram side
///
/// Any polling error is reported as a fatal source error.
pub fn update_stream(polling: &mut Polling<Bot>) -> BoxStream<'_, tgm_core::Result<ChatUpdate>> {
    update_source(polling.as_stream())
}

/// Map raw updates to [`ChatUpdate`]s; every error becomes fatal
pub fn update_source<'a, S, E>(updates: S) -> BoxStream<'a, tgm_core::Result<ChatUpdate>>
where
    S: Stream<Item = std::result::Result<Update, E>> + Send + 'a,
    E: std::fmt::Display,
{
    updates
        .map(|update| {
            update
                .map(ChatUpdate::from)
                .map_err(|e| tgm_core::Error::source_failed(SIDE_NAME, e))
        })
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::ChannelError;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Sent {
        Notice(i64, String),
        Reply(i64, i32, String),
    }

    #[derive(Clone, Default)]
    struct FakeChat {
        sent: Arc<Mutex<Vec<Sent>>>,
        fail: bool,
    }

    impl FakeChat {
        fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatActions for FakeChat {
        async fn send_notice(&self, chat_id: i64, html: &str) -> Result<()> {
            if self.fail {
                return Err(ChannelError::SendFailed("chat not found".to_string()));
            }
            self.sent
                .lock()
                .unwrap()
                .push(Sent::Notice(chat_id, html.to_string()));
            Ok(())
        }

        async fn send_reply(&self, chat_id: i64, reply_to: i32, html: &str) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push(Sent::Reply(chat_id, reply_to, html.to_string()));
            Ok(())
        }
    }

    const OWNER: i64 = 100;
    const GROUP: i64 = -200;

    fn side(actions: FakeChat) -> TelegramSide<FakeChat> {
        let config = TelegramConfig {
            bot_key: "123:abc".to_string(),
            owner_id: OWNER,
            group_id: GROUP,
            request_timeout_secs: 60,
        };
        TelegramSide::new(actions, &config, "tgm_bot")
    }

    fn text(chat_id: i64, message_id: i32, text: &str) -> ChatUpdate {
        ChatUpdate::Text {
            chat_id,
            message_id,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(ChatCommand::parse("/who", "tgm_bot"), Some(ChatCommand::Who));
        assert_eq!(ChatCommand::parse("/who@tgm_bot", "tgm_bot"), Some(ChatCommand::Who));
        assert_eq!(ChatCommand::parse("/who@TGM_Bot", "tgm_bot"), Some(ChatCommand::Who));
        assert_eq!(ChatCommand::parse("  /who please", "tgm_bot"), Some(ChatCommand::Who));
        assert_eq!(ChatCommand::parse("/whoami", "tgm_bot"), None);
        assert_eq!(ChatCommand::parse("who", "tgm_bot"), None);
        assert_eq!(ChatCommand::parse("", "tgm_bot"), None);
    }

    #[test]
    fn test_command_for_another_bot_is_ignored() {
        assert_eq!(ChatCommand::parse("/who@other_bot", "tgm_bot"), None);
        assert_eq!(ChatCommand::parse("/who@", "tgm_bot"), None);
        assert_eq!(ChatCommand::parse("/who@tgm_bot_2", "tgm_bot"), None);
    }

    #[test]
    fn test_notice_formatting_escapes_names() {
        assert_eq!(user_joined_notice("alice"), "<code>alice joined</code>");
        assert_eq!(user_left_notice("<b>ob"), "<code>&lt;b&gt;ob left</code>");
    }

    #[test]
    fn test_user_list_reply() {
        assert_eq!(user_list_reply(&[]), "<code>no users are connected</code>");
        assert_eq!(
            user_list_reply(&["x".to_string(), "y&z".to_string()]),
            "<pre>x\ny&amp;z</pre>"
        );
    }

    #[tokio::test]
    async fn test_who_from_bridged_chat_requests_user_list() {
        let mut side = side(FakeChat::default());

        let first = side.on_native(text(OWNER, 5, "/who")).await.unwrap();
        let second = side.on_native(text(GROUP, 6, "/who")).await.unwrap();

        assert_eq!(
            first,
            Some(ChatEvent::UserListRequested {
                request_id: RequestId(1)
            })
        );
        assert_eq!(
            second,
            Some(ChatEvent::UserListRequested {
                request_id: RequestId(2)
            })
        );
        assert_eq!(side.pending_requests(), 2);
    }

    #[tokio::test]
    async fn test_other_chats_and_text_are_ignored() {
        let mut side = side(FakeChat::default());

        assert_eq!(side.on_native(text(999, 1, "/who")).await.unwrap(), None);
        assert_eq!(
            side.on_native(text(GROUP, 3, "/who@other_bot")).await.unwrap(),
            None
        );
        assert_eq!(side.on_native(text(OWNER, 2, "hello")).await.unwrap(), None);
        assert_eq!(side.on_native(ChatUpdate::Other).await.unwrap(), None);
        assert_eq!(side.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_user_list_is_delivered_exactly_once() {
        let chat = FakeChat::default();
        let mut side = side(chat.clone());

        let Some(ChatEvent::UserListRequested { request_id }) =
            side.on_native(text(OWNER, 7, "/who")).await.unwrap()
        else {
            panic!("expected a user list request");
        };

        let response = VoiceEvent::UserListFetched {
            request_id,
            usernames: vec!["x".to_string(), "y".to_string()],
        };
        assert_eq!(side.on_cross(response.clone()).await.unwrap(), None);
        assert_eq!(side.on_cross(response).await.unwrap(), None);

        assert_eq!(
            chat.sent(),
            vec![Sent::Reply(OWNER, 7, "<pre>x\ny</pre>".to_string())]
        );
        assert_eq!(side.pending_requests(), 0);
    }

    #[test]
    fn test_unknown_request_id_is_ignored() {
        let chat = FakeChat::default();
        let mut side = side(chat.clone());

        let response = VoiceEvent::UserListFetched {
            request_id: RequestId(42),
            usernames: vec![],
        };
        let outcome = tokio_test::block_on(side.on_cross(response)).unwrap();
        assert_eq!(outcome, None);
        assert!(chat.sent().is_empty());
    }

    #[tokio::test]
    async fn test_presence_is_announced_in_group() {
        let chat = FakeChat::default();
        let mut side = side(chat.clone());

        side.on_cross(VoiceEvent::UserJoined {
            username: "alice".to_string(),
        })
        .await
        .unwrap();
        side.on_cross(VoiceEvent::UserLeft {
            username: "alice".to_string(),
        })
        .await
        .unwrap();

        assert_eq!(
            chat.sent(),
            vec![
                Sent::Notice(GROUP, "<code>alice joined</code>".to_string()),
                Sent::Notice(GROUP, "<code>alice left</code>".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_send_failure_is_not_fatal() {
        let chat = FakeChat {
            fail: true,
            ..FakeChat::default()
        };
        let mut side = side(chat);

        let err = side
            .on_cross(VoiceEvent::UserJoined {
                username: "alice".to_string(),
            })
            .await
            .unwrap_err();
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_update_error_is_fatal_source_error() {
        let updates = futures::stream::iter(vec![Err::<Update, _>("network down".to_string())]);
        let mut updates = update_source(updates);

        let err = updates.next().await.unwrap().unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "telegram source failed: network down");
    }

    #[test]
    fn test_pending_requests_expire_and_are_capped() {
        let start = Instant::now();
        let target = ReplyTarget {
            chat_id: OWNER,
            message_id: 1,
        };

        let mut pending = PendingRequests::new(Duration::from_secs(10), 2);
        pending.insert(RequestId(1), target, start);
        pending.insert(RequestId(2), target, start);
        pending.insert(RequestId(3), target, start);
        assert_eq!(pending.len(), 2);
        assert_eq!(pending.take(RequestId(1)), None);

        pending.insert(RequestId(4), target, start + Duration::from_secs(11));
        assert_eq!(pending.take(RequestId(2)), None);
        assert_eq!(pending.take(RequestId(3)), None);
        assert_eq!(pending.take(RequestId(4)), Some(target));
        assert_eq!(pending.len(), 0);
    }
}
