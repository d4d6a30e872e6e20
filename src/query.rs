use crate::*;
use serde::{Deserialize, Serialize};

/// Requests for the native `query` entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QueryRequest {
    /// Current [Configuration].
    GetConf,
    /// Peers seen by discovery so far.
    GetDiscoveredPeers,
    /// A [QrPayload] other devices can scan to pair with us.
    GetSharableQrCode,
}

message_tags!(QueryRequest {
    GetConf,
    GetDiscoveredPeers,
    GetSharableQrCode,
});

impl QueryMessage for QueryRequest {}

/// Payloads found in the `res` of a query response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryResponse {
    /// Answer to [QueryRequest::GetConf].
    Conf(Configuration),
    /// Answer to [QueryRequest::GetDiscoveredPeers].
    DiscoveredPeers(Vec<PeerMetadata>),
    /// Answer to [QueryRequest::GetSharableQrCode].
    SharableQrCode(QrPayload),
}

tagged_union!(QueryResponse {
    Conf,
    DiscoveredPeers,
    SharableQrCode,
});
