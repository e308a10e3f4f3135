//! Errors shared by the Telegram and Mumble sides

/// Channel errors
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),
}

pub type Result<T> = std::result::Result<T, ChannelError>;

impl From<teloxide::RequestError> for ChannelError {
    fn from(e: teloxide::RequestError) -> Self {
        ChannelError::ApiError(e.to_string())
    }
}

impl From<tonic::Status> for ChannelError {
    fn from(status: tonic::Status) -> Self {
        ChannelError::ApiError(format!("{:?}: {}", status.code(), status.message()))
    }
}

impl From<tonic::transport::Error> for ChannelError {
    fn from(e: tonic::transport::Error) -> Self {
        ChannelError::ConnectionFailed(e.to_string())
    }
}

/// Failures of outbound actions are handler-level and never fatal
impl From<ChannelError> for tgm_core::Error {
    fn from(e: ChannelError) -> Self {
        tgm_core::Error::Action(e.to_string())
    }
}
