//! Minimal client for the Murmur gRPC interface (`MurmurRPC.V1`)
//!
//! Only the messages and calls the bridge needs are declared. Field tags
//! follow `MurmurRPC.proto`; unknown fields sent by the server are skipped.

use crate::base::{ChannelError, Result};
use std::time::Duration;
use tonic::codec::{ProstCodec, Streaming};
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Server {
    #[prost(uint32, required, tag = "1")]
    pub id: u32,
    #[prost(bool, optional, tag = "2")]
    pub running: Option<bool>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServerQuery {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServerList {
    #[prost(message, repeated, tag = "1")]
    pub servers: Vec<Server>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum EventType {
    UserConnected = 0,
    UserDisconnected = 1,
    UserStateChanged = 2,
    UserTextMessage = 3,
    ChannelCreated = 4,
    ChannelRemoved = 5,
    ChannelStateChanged = 6,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServerEvent {
    #[prost(message, optional, tag = "1")]
    pub server: Option<Server>,
    #[prost(enumeration = "EventType", optional, tag = "2")]
    pub r#type: Option<i32>,
    #[prost(message, optional, tag = "3")]
    pub user: Option<User>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct User {
    #[prost(message, optional, tag = "1")]
    pub server: Option<Server>,
    #[prost(uint32, optional, tag = "2")]
    pub session: Option<u32>,
    #[prost(uint32, optional, tag = "3")]
    pub id: Option<u32>,
    #[prost(string, optional, tag = "4")]
    pub name: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UserQuery {
    #[prost(message, optional, tag = "1")]
    pub server: Option<Server>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UserList {
    #[prost(message, optional, tag = "1")]
    pub server: Option<Server>,
    #[prost(message, repeated, tag = "2")]
    pub users: Vec<User>,
}

/// Deadline for unary calls; the event subscription has none
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

fn unary_request<T>(message: T) -> tonic::Request<T> {
    let mut request = tonic::Request::new(message);
    request.set_timeout(REQUEST_TIMEOUT);
    request
}

/// gRPC client for the `MurmurRPC.V1` service
#[derive(Debug, Clone)]
pub struct MurmurClient {
    inner: tonic::client::Grpc<Channel>,
}

impl MurmurClient {
    /// Connect to a Murmur gRPC endpoint such as `http://127.0.0.1:50051`
    pub async fn connect(address: &str) -> Result<Self> {
        let endpoint = Endpoint::from_shared(address.to_string())
            .map_err(|e| ChannelError::NotConfigured(format!("invalid gRPC address {}: {}", address, e)))?;
        let channel = endpoint.connect().await?;
        Ok(Self {
            inner: tonic::client::Grpc::new(channel),
        })
    }

    /// List the virtual servers hosted by this Murmur instance
    pub async fn server_query(&mut self, request: ServerQuery) -> Result<ServerList> {
        self.inner.ready().await?;
        let path = PathAndQuery::from_static("/MurmurRPC.V1/ServerQuery");
        let response = self
            .inner
            .unary(unary_request(request), path, ProstCodec::default())
            .await?;
        Ok(response.into_inner())
    }

    /// Subscribe to events of one virtual server
    pub async fn server_events(&mut self, server: Server) -> Result<Streaming<ServerEvent>> {
        self.inner.ready().await?;
        let path = PathAndQuery::from_static("/MurmurRPC.V1/ServerEvents");
        let response = self
            .inner
            .server_streaming(tonic::Request::new(server), path, ProstCodec::default())
            .await?;
        Ok(response.into_inner())
    }

    /// List users currently connected to a virtual server
    pub async fn user_query(&mut self, request: UserQuery) -> Result<UserList> {
        self.inner.ready().await?;
        let path = PathAndQuery::from_static("/MurmurRPC.V1/UserQuery");
        let response = self
            .inner
            .unary(unary_request(request), path, ProstCodec::default())
            .await?;
        Ok(response.into_inner())
    }
}
