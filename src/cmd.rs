use crate::*;
use serde::{Deserialize, Serialize};

/// Requests for the native `cmd` entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CmdRequest {
    /// Replace the node [Configuration].
    SetConf(Configuration),

    /// Start advertising and listening for peers.
    StartDiscovery,

    /// Stop discovery.
    StopDiscovery,

    /// Ask a peer to do something.
    SendPeer {
        /// target peer
        peer: PeerId,
        /// what to ask for
        req: PeerRequest,
    },

    /// Pair with the peer from a scanned qr code.
    Pair(QrPayload),

    /// Answer an inbound [ApiEvent::AppControl].
    Ack {
        /// the requesting peer
        peer: PeerId,
        /// session id from the event
        sid: u64,
        /// our answer
        ack: Ack,
    },
}

message_tags!(CmdRequest {
    SetConf,
    StartDiscovery,
    StopDiscovery,
    SendPeer,
    Pair,
    Ack,
});

impl CmdMessage for CmdRequest {}

/// Things one peer can ask another to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerRequest {
    /// Open a uri on the remote device.
    LaunchUri(String),
}

/// Answer to a control request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ack {
    /// Go ahead.
    Accepted,
    /// Refuse.
    Cancelled,
}

/// Payload found in the `res` of a cmd response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmdResponse {
    /// Done.
    Ok,
}
