use crate::*;
use serde::{Deserialize, Serialize};

/// Node settings as held by the native library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Configuration {
    /// Name advertised to other peers.
    pub name: String,
    /// This node's identifier.
    pub id: PeerId,
    /// Peers we have paired with, in order.
    pub known_peers: Vec<PeerMetadata>,
    /// Accept app control requests without asking.
    pub auto_accept: bool,
}
