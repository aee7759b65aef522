//! Wire types of the live transcription API.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`init`] | `POST /v2/live` request and response |
//! | [`messages`] | Messages received on the live WebSocket |

pub mod init;
pub mod messages;

pub use init::{LiveV2InitRequest, LiveV2InitResponse, MessagesConfig};
pub use messages::{LiveV2WebSocketMessage, MessageKind};
