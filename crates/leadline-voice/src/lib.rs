//! Voice plumbing for Leadline calls.
//!
//! Typed events for the telephony media stream and the realtime AI session,
//! the realtime WebSocket client, and the per-call transcript accumulator.
//! Telephony audio is forwarded opaquely; only control frames are parsed.

pub mod config;
pub mod error;
pub mod events;
pub mod session;
pub mod transcript;

pub use config::{RealtimeConfig, TurnDetectionConfig};
pub use error::VoiceError;
pub use events::{
    decode_audio, ClientEvent, ConversationItem, RealtimeEvent, ResponseInfo, ResponseOutputItem,
    TelephonyEvent, TelephonyOutbound,
};
pub use session::{RealtimeConnector, RealtimeSession, WsRealtimeConnector};
pub use transcript::TranscriptAccumulator;
