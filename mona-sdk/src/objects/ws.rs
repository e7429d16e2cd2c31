//! Message types for the subscriber channel.
//!
//! Any WebSocket upgrade request (outside the `/api/*` routes) becomes a
//! subscriber and receives [`WsServerMessage`] JSON text frames.
//!
//! # Protocol
//!
//! 1. The server sends exactly one [`WsServerMessage::Snapshot`] right
//!    after the upgrade, describing the state at admission time.
//! 2. Every milestone event applied afterwards is pushed as a
//!    [`WsServerMessage::Update`].
//! 3. Frames sent by the client are ignored.
//! 4. If the server is at its subscriber limit the upgrade request is
//!    answered with HTTP 503 and no WebSocket is opened. When the limit is
//!    reached between that check and admission, the socket is opened and
//!    then closed with [`WsCloseCode::TRY_AGAIN_LATER`] before any snapshot
//!    is sent.
//! 5. A subscriber that stops reading is dropped: it gets what was already
//!    queued, then [`WsCloseCode::POLICY_VIOLATION`].

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Server-to-client message.
///
/// Serialized as an internally-tagged JSON object:
///
/// ```json
/// {"type":"snapshot","currentMilestone":50,"windowsVisible":["1stStoryWindows"]}
/// {"type":"update","paymentPercentage":40,"windowName":"2ndStoryWindows"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum WsServerMessage {
    /// Full state, sent once on admission.
    Snapshot {
        /// Highest payment percentage seen so far.
        current_milestone: u8,
        /// Every window named by an event so far.
        windows_visible: Vec<CompactString>,
    },

    /// A single newly observed milestone event.
    Update {
        payment_percentage: u8,
        window_name: CompactString,
    },
}

/// WebSocket close codes used by the subscriber channel.
pub struct WsCloseCode;

impl WsCloseCode {
    /// Normal closure, sent when the server shuts down.
    pub const NORMAL: u16 = 1000;

    /// The subscriber could not keep up and was dropped.
    pub const POLICY_VIOLATION: u16 = 1008;

    /// The snapshot could not be produced.
    pub const INTERNAL_ERROR: u16 = 1011;

    /// The subscriber limit is reached; the client may reconnect later.
    pub const TRY_AGAIN_LATER: u16 = 1013;
}
