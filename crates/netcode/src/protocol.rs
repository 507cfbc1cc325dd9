use serde::{Deserialize, Serialize};

use crate::game::ClientId;
use crate::server::snapshot::Snapshot;

/// Client-to-server traffic. `I` and `A` are the game's input and action
/// types; the assumed transport is a reliable ordered bidirectional
/// channel, encoding left to the embedder (serde derives carry maps,
/// numeric precision and nesting through any self-describing format).
///
/// `seq` is signed on the wire so that malformed negative values are
/// representable; the server validates and drops them rather than
/// trusting the encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage<I, A> {
    Input {
        seq: i64,
        input: I,
        timestamp: i64,
    },
    Action {
        seq: i64,
        action: A,
        client_timestamp: i64,
    },
    ClockSyncResponse {
        /// Echoed from the originating request.
        server_timestamp: i64,
        /// Client wall clock at the capture moment.
        client_timestamp: i64,
    },
}

/// Server-to-client traffic. `W` is the game world, `R` the action-result
/// payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerMessage<W, R> {
    Snapshot(Snapshot<W>),
    ActionResult {
        seq: u64,
        success: bool,
        result: Option<R>,
        server_timestamp: i64,
    },
    ClockSyncRequest {
        server_timestamp: i64,
    },
    Join {
        player_id: ClientId,
    },
    Leave {
        player_id: ClientId,
    },
}

/// Delivery scope for an outbound server message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Address {
    Broadcast,
    To(ClientId),
}

/// A server message paired with where it should go. The embedding
/// transport drains these and ferries them over its channel.
#[derive(Debug, Clone)]
pub struct Outgoing<W, R> {
    pub to: Address,
    pub message: ServerMessage<W, R>,
}
