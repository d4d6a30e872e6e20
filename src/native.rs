use crate::*;
use flydrop_sys::{EventCb, ReadyCb, ResultCb};
use parking_lot::Mutex;
use std::ffi::CString;
use std::path::Path;
use std::sync::Arc;

/// The three native entry points.
///
/// Every method returns as soon as the request is handed off. Callbacks
/// fire later, on threads the implementation owns.
pub trait Native: 'static + Send + Sync {
    /// Start the library. `on_ready` fires once, then `on_event` zero or
    /// more times.
    fn init(
        &self,
        data_dir: &Path,
        on_event: EventCb,
        on_ready: ReadyCb,
    ) -> Result<()>;

    /// Issue a query. `on_result` fires exactly once.
    fn query(&self, json: &str, on_result: ResultCb) -> Result<()>;

    /// Issue a command. `on_result` fires exactly once.
    fn cmd(&self, json: &str, on_result: ResultCb) -> Result<()>;
}

impl Native for &'static flydrop_sys::Api {
    fn init(
        &self,
        data_dir: &Path,
        on_event: EventCb,
        on_ready: ReadyCb,
    ) -> Result<()> {
        let data_dir = data_dir.to_str().ok_or_else(|| {
            Error::InitializationFailure(format!(
                "data directory {:?} is not valid utf8",
                data_dir
            ))
        })?;
        let data_dir =
            CString::new(data_dir).map_err(flydrop_sys::Error::from)?;
        unsafe { flydrop_sys::Api::init(self, &data_dir, on_event, on_ready) };
        Ok(())
    }

    fn query(&self, json: &str, on_result: ResultCb) -> Result<()> {
        let json = CString::new(json).map_err(flydrop_sys::Error::from)?;
        unsafe { flydrop_sys::Api::query(self, &json, on_result) };
        Ok(())
    }

    fn cmd(&self, json: &str, on_result: ResultCb) -> Result<()> {
        let json = CString::new(json).map_err(flydrop_sys::Error::from)?;
        unsafe { flydrop_sys::Api::cmd(self, &json, on_result) };
        Ok(())
    }
}

impl<N: Native> Native for Arc<N> {
    fn init(
        &self,
        data_dir: &Path,
        on_event: EventCb,
        on_ready: ReadyCb,
    ) -> Result<()> {
        (**self).init(data_dir, on_event, on_ready)
    }

    fn query(&self, json: &str, on_result: ResultCb) -> Result<()> {
        (**self).query(json, on_result)
    }

    fn cmd(&self, json: &str, on_result: ResultCb) -> Result<()> {
        (**self).cmd(json, on_result)
    }
}

/// Native boundary adapter: a [Native] implementation plus the process
/// lock that makes it ours.
pub struct Adapter {
    native: Box<dyn Native>,
    lock: Mutex<Option<ProcessLock>>,
}

impl std::fmt::Debug for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapter").field("lock", &*self.lock.lock()).finish()
    }
}

impl Adapter {
    /// Wrap `native`, taking the process lock `lock_name`.
    pub(crate) fn new<N: Native>(
        native: N,
        lock_name: &str,
    ) -> Result<Self> {
        let lock = ProcessLock::acquire(lock_name)?;
        Ok(Self {
            native: Box::new(native),
            lock: Mutex::new(Some(lock)),
        })
    }

    /// See [Native::init].
    pub fn init(
        &self,
        data_dir: &Path,
        on_event: EventCb,
        on_ready: ReadyCb,
    ) -> Result<()> {
        tracing::debug!(?data_dir, "native init");
        self.native.init(data_dir, on_event, on_ready)
    }

    /// Dispatch `json` through the entry point for `chan`.
    pub fn call(
        &self,
        chan: Channel,
        json: &str,
        on_result: ResultCb,
    ) -> Result<()> {
        match chan {
            Channel::Query => self.native.query(json, on_result),
            Channel::Cmd => self.native.cmd(json, on_result),
        }
    }

    /// Give up the process lock. Returns `false` if already released.
    pub fn release(&self) -> bool {
        self.lock.lock().take().is_some()
    }
}
