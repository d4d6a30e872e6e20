#![deny(missing_docs)]
#![deny(warnings)]

//! Typed async bridge to the flydrop native library.
//!
//! The native side exposes three entry points (`init`, `query`, `cmd`)
//! that each return immediately and answer later through a callback, on
//! a thread of its choosing. [Bridge] turns that into `async` calls:
//!
//! - requests are encoded as externally tagged json, see [codec]
//! - each call owns a one-shot completion slot, see [slot]
//! - unsolicited events are decoded and pushed to an [EventSink]
//!
//! ```no_run
//! # async fn demo() -> flydrop::Result<()> {
//! use flydrop::*;
//!
//! let bridge = Bridge::load("libflydrop.so", BridgeConfig::default())?;
//! bridge
//!     .initialize(std::path::Path::new("/var/lib/flydrop"), |evt: ApiEvent| {
//!         tracing::info!(?evt, "event");
//!     })
//!     .await?;
//!
//! bridge.start_discovery().await?;
//! for peer in bridge.get_discovered_peers().await? {
//!     println!("{} at {}", peer.name, peer.address);
//! }
//! # Ok(())
//! # }
//! ```

pub use flydrop_sys::NativeBuffer;

/// Error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The native library could not be started, or the process lock is
    /// already held.
    #[error("initialization failed: {0}")]
    InitializationFailure(String),

    /// A call was made before the ready callback fired.
    #[error("bridge is not initialized")]
    NotInitialized,

    /// A call was made after [Bridge::dispose].
    #[error("bridge is disposed")]
    Disposed,

    /// A request could not be serialized.
    #[error(transparent)]
    Encode(#[from] codec::EncodeError),

    /// A response or event did not match the expected shape.
    #[error(transparent)]
    Decode(#[from] codec::DecodeError),

    /// The native side answered with a populated `err`.
    #[error("remote error: {0}")]
    Remote(String),

    /// The response decoded to a variant the request does not expect.
    #[error("unexpected response `{0}`")]
    UnexpectedResponse(String),

    /// The native side released a callback without calling it.
    #[error("native library dropped the completion callback")]
    Abandoned,

    /// Loading or calling into the native library failed.
    #[error(transparent)]
    Sys(#[from] flydrop_sys::Error),
}

/// Flydrop result type.
pub type Result<T> = std::result::Result<T, Error>;

#[macro_use]
pub mod codec;
pub use codec::{DecodeError, EncodeError, TaggedUnion};

pub mod slot;

mod msg;
pub use msg::*;

mod endpoint;
pub use endpoint::*;

mod peer;
pub use peer::*;

mod settings;
pub use settings::*;

mod query;
pub use query::*;

mod cmd;
pub use cmd::*;

mod evt;
pub use evt::*;

mod lock;
pub use lock::*;

mod native;
pub use native::*;

mod config;
pub use config::*;

mod bridge;
pub use bridge::*;
