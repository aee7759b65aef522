//! Client configuration and entry points.
//!
//! [`GladiaClient`] holds validated [`ClientOptions`] and builds API surfaces
//! such as [`LiveV2Client`](crate::live::LiveV2Client) from them.

pub mod builder;
pub mod core;
pub mod options;

pub use builder::GladiaClientBuilder;
pub use core::GladiaClient;
pub use options::{ClientOptions, Region, ResolvedOptions};
