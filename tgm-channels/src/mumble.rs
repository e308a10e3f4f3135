//! Mumble side of the bridge
//!
//! Turns Murmur server events into presence notices and answers user list
//! requests coming from Telegram.

use crate::base::{ChannelError, Result};
use crate::murmur::{self, EventType, MurmurClient};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use tgm_core::bus::{ChatEvent, VoiceEvent};
use tgm_core::config::MumbleConfig;
use tgm_core::SideHandler;
use tracing::{debug, info, trace};

const SIDE_NAME: &str = "mumble";

/// Kind of a Murmur server event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    UserConnected,
    UserDisconnected,
    UserStateChanged,
    UserTextMessage,
    ChannelCreated,
    ChannelRemoved,
    ChannelStateChanged,
    /// Value not known to this client
    Unknown(i32),
}

impl From<i32> for EventKind {
    fn from(value: i32) -> Self {
        match EventType::try_from(value) {
            Ok(EventType::UserConnected) => EventKind::UserConnected,
            Ok(EventType::UserDisconnected) => EventKind::UserDisconnected,
            Ok(EventType::UserStateChanged) => EventKind::UserStateChanged,
            Ok(EventType::UserTextMessage) => EventKind::UserTextMessage,
            Ok(EventType::ChannelCreated) => EventKind::ChannelCreated,
            Ok(EventType::ChannelRemoved) => EventKind::ChannelRemoved,
            Ok(EventType::ChannelStateChanged) => EventKind::ChannelStateChanged,
            Err(_) => EventKind::Unknown(value),
        }
    }
}

/// Murmur server event as seen by the bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEvent {
    pub kind: EventKind,
    pub user_name: Option<String>,
}

impl From<murmur::ServerEvent> for ServerEvent {
    fn from(event: murmur::ServerEvent) -> Self {
        let kind = match event.r#type {
            Some(value) => EventKind::from(value),
            None => EventKind::Unknown(-1),
        };
        Self {
            kind,
            user_name: event.user.and_then(|user| user.name),
        }
    }
}

/// Outbound actions of the Mumble side
#[async_trait]
pub trait VoiceActions: Send + Sync {
    /// Names of the users currently connected to the bridged server
    async fn connected_users(&self) -> Result<Vec<String>>;
}

/// [`VoiceActions`] backed by the Murmur gRPC interface
#[derive(Debug, Clone)]
pub struct MurmurVoice {
    client: MurmurClient,
    server: murmur::Server,
}

impl MurmurVoice {
    pub fn server_id(&self) -> u32 {
        self.server.id
    }
}

#[async_trait]
impl VoiceActions for MurmurVoice {
    async fn connected_users(&self) -> Result<Vec<String>> {
        let mut client = self.client.clone();
        let list = client
            .user_query(murmur::UserQuery {
                server: Some(self.server.clone()),
            })
            .await?;
        Ok(list.users.into_iter().filter_map(|user| user.name).collect())
    }
}

/// Pick the configured virtual server, or the first one when none is set
pub fn select_server(servers: Vec<murmur::Server>, wanted: Option<u32>) -> Result<murmur::Server> {
    match wanted {
        Some(id) => servers
            .into_iter()
            .find(|server| server.id == id)
            .ok_or_else(|| ChannelError::NotConfigured(format!("Murmur server {} not found", id))),
        None => servers
            .into_iter()
            .next()
            .ok_or_else(|| ChannelError::NotConfigured("Murmur reports no servers".to_string())),
    }
}

/// Connect to Murmur and subscribe to the bridged server's events
///
/// The returned stream ends with a fatal error, see [`event_source`].
pub async fn connect(
    config: &MumbleConfig,
) -> Result<(MurmurVoice, BoxStream<'static, tgm_core::Result<ServerEvent>>)> {
    let mut client = MurmurClient::connect(&config.grpc_address).await?;
    let servers = client.server_query(murmur::ServerQuery {}).await?.servers;
    let server = select_server(servers, config.server_id)?;
    info!(
        server_id = server.id,
        address = %config.grpc_address,
        "Subscribing to Murmur server events"
    );

    let events = client.server_events(server.clone()).await?;
    Ok((MurmurVoice { client, server }, event_source(events)))
}

/// Adapt a raw Murmur event subscription into the bridge's native stream
///
/// gRPC failures become fatal source errors and the end of the
/// subscription is reported as one as well.
pub fn event_source<S>(events: S) -> BoxStream<'static, tgm_core::Result<ServerEvent>>
where
    S: Stream<Item = std::result::Result<murmur::ServerEvent, tonic::Status>> + Send + 'static,
{
    events
        .map(|event| {
            event
                .map(ServerEvent::from)
                .map_err(|status| tgm_core::Error::source_failed(SIDE_NAME, ChannelError::from(status)))
        })
        .chain(stream::once(async {
            Err(tgm_core::Error::source_failed(
                SIDE_NAME,
                "event stream closed by server",
            ))
        }))
        .boxed()
}

/// Handler for the Mumble side
pub struct MumbleSide<A> {
    actions: A,
}

impl<A: VoiceActions> MumbleSide<A> {
    pub fn new(actions: A) -> Self {
        Self { actions }
    }
}

#[async_trait]
impl<A: VoiceActions> SideHandler for MumbleSide<A> {
    type Native = ServerEvent;
    type Inbound = ChatEvent;
    type Outbound = VoiceEvent;

    fn name(&self) -> &str {
        SIDE_NAME
    }

    async fn on_native(&mut self, event: ServerEvent) -> tgm_core::Result<Option<VoiceEvent>> {
        let ServerEvent { kind, user_name } = event;
        match (kind, user_name) {
            (EventKind::UserConnected, Some(username)) => {
                Ok(Some(VoiceEvent::UserJoined { username }))
            }
            (EventKind::UserDisconnected, Some(username)) => {
                Ok(Some(VoiceEvent::UserLeft { username }))
            }
            (kind, _) => {
                trace!(?kind, "Ignoring server event");
                Ok(None)
            }
        }
    }

    async fn on_cross(&mut self, event: ChatEvent) -> tgm_core::Result<Option<VoiceEvent>> {
        match event {
            ChatEvent::UserListRequested { request_id } => {
                let usernames = self.actions.connected_users().await?;
                debug!(%request_id, users = usernames.len(), "User list fetched");
                Ok(Some(VoiceEvent::UserListFetched {
                    request_id,
                    usernames,
                }))
            }
        }
    }
}
