//! Telegram and Mumble sides of the tgm bridge
//!
//! Each side implements [`tgm_core::SideHandler`]. Outbound platform calls
//! go through the [`ChatActions`] and [`VoiceActions`] traits so the
//! handlers can be driven without network access.

pub mod base;
pub mod mumble;
pub mod murmur;
pub mod telegram;

pub use base::{ChannelError, Result};
pub use mumble::{MumbleSide, MurmurVoice, VoiceActions};
pub use telegram::{ChatActions, ChatUpdate, TelegramBot, TelegramSide};
