//! # gladia-live
//!
//! Client for the Gladia live v2 real-time transcription API.
//!
//! A live session is created with `POST /v2/live`, audio is streamed over the
//! WebSocket returned by that call, and every message the server pushes back is
//! delivered as a typed event.
//!
//! ## Overview
//!
//! - **Resilient HTTP**: per-attempt timeout, caller cancellation and retry on
//!   configured status codes with capped exponential backoff.
//! - **Reconnecting WebSocket**: bounded attempts per connection, bounded
//!   reconnections, close-code classification.
//! - **Gapless audio**: unacknowledged audio is kept and replayed in full on every
//!   new connection.
//! - **Typed events**: one subscriber list per event kind, or a single channel of
//!   [`LiveEvent`]s.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gladia_live::live::events;
//! use gladia_live::types::init::{Encoding, LiveV2InitRequest};
//! use gladia_live::GladiaClientBuilder;
//!
//! #[tokio::main]
//! async fn main() -> gladia_live::Result<()> {
//!     let client = GladiaClientBuilder::new().api_key("your-api-key").build()?;
//!     let live = client.live_v2()?;
//!
//!     let session = live.start_session(LiveV2InitRequest {
//!         encoding: Some(Encoding::WavPcm),
//!         sample_rate: Some(16_000),
//!         ..Default::default()
//!     });
//!     session.on::<events::Transcript>(|msg| {
//!         if msg.data.is_final {
//!             println!("{}", msg.data.utterance.text);
//!         }
//!     });
//!
//!     let audio = vec![0u8; 3200];
//!     session.send_audio(&audio);
//!     session.stop_recording();
//!     session.ended().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Client options, builder and entry point |
//! | [`live`] | Live sessions, their events and audio replay |
//! | [`transport`] | Retrying HTTP client and reconnecting WebSocket session |
//! | [`resilience`] | Retry policy evaluation |
//! | [`types`] | Wire types of the live API |
//! | [`error`] | Error type |

pub mod client;
pub mod live;
pub mod resilience;
pub mod transport;
pub mod types;

pub use client::{ClientOptions, GladiaClient, GladiaClientBuilder, Region};
pub use live::{LiveEvent, LiveStatus, LiveV2Client, LiveV2Session};
pub use resilience::{RetryPolicy, WebSocketRetryPolicy};
pub use types::{LiveV2InitRequest, LiveV2InitResponse, LiveV2WebSocketMessage, MessageKind};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext, HttpError};
