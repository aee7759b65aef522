//! Live v2 transcription: session creation, audio streaming and typed events.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`LiveV2Client`], the factory of sessions |
//! | [`session`] | [`LiveV2Session`] and its lifecycle |
//! | [`events`] | Event kinds and their payloads |
//! | [`buffer`] | Replay buffer for unacknowledged audio |

pub mod buffer;
pub mod client;
pub mod events;
pub mod session;

pub use buffer::AudioBuffer;
pub use client::LiveV2Client;
pub use events::{ConnectionInfo, EndingInfo, EventKind, ListenerId, LiveEvent};
pub use session::{LiveStatus, LiveV2Session};
