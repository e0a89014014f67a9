//! Client side of the inbox realtime channel.
//!
//! [`HttpReader`] serves the initial loads and re-fetches, [`SocketGateway`]
//! carries topic frames, and the projections in [`projection`] fold both into
//! lists a UI can render. The [`driver`] functions wire these together as
//! long-running tasks.

pub mod config;
pub mod driver;
mod error;
pub mod gateway;
pub mod http;
pub mod presence;
pub mod projection;
pub mod socket;
pub mod typing;

#[cfg(test)]
mod testing;

pub use config::{ConfigError, RealtimeConfig};
pub use error::RealtimeError;
pub use gateway::{ChannelGateway, ConversationReader, FrameReceiver};
pub use http::HttpReader;
pub use presence::{PresenceRoster, PresenceSession, Visibility};
pub use projection::{ConversationProjection, MessageProjection, UiEvent};
pub use socket::SocketGateway;
pub use typing::{TYPING_EXPIRY, TypingIndicator};
