//! Raw bindings to the flydrop native peer discovery / transfer library.
//!
//! The native library exports exactly three C entry points:
//!
//! ```c
//! void init (const char *data_dir,
//!            void (*on_event)(void *usr, const uint8_t *ptr, size_t len),
//!            void *event_usr,
//!            void (*on_ready)(void *usr),
//!            void *ready_usr);
//! void query(const char *json,
//!            void (*on_result)(void *usr, const uint8_t *ptr, size_t len),
//!            void *usr);
//! void cmd  (const char *json,
//!            void (*on_result)(void *usr, const uint8_t *ptr, size_t len),
//!            void *usr);
//! ```
//!
//! Every call returns immediately. The callbacks fire later, from threads
//! owned by the native library. `on_result` fires exactly once per
//! `query` / `cmd`, `on_ready` once per `init`, `on_event` zero or more
//! times for the life of the process.
//!
//! Load the library once with [load], then use the returned [Api].

#![allow(clippy::missing_safety_doc)]

use once_cell::sync::{Lazy, OnceCell};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ffi::{c_void, CStr};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};

mod buffer;
pub use buffer::*;

/// Native result / event callback signature.
pub type DataFn = unsafe extern "C" fn(
    *mut c_void, // usr
    *const u8,   // utf8 json ptr
    usize,       // utf8 json len
);

/// Native ready callback signature.
pub type ReadyFn = unsafe extern "C" fn(*mut c_void);

type InitFn = unsafe extern "C" fn(
    *const libc::c_char, // data_dir
    Option<DataFn>,      // on_event
    *mut c_void,         // event_usr
    Option<ReadyFn>,     // on_ready
    *mut c_void,         // ready_usr
);

type CallFn = unsafe extern "C" fn(
    *const libc::c_char, // json
    Option<DataFn>,      // on_result
    *mut c_void,         // usr
);

#[ouroboros::self_referencing]
struct LibInner {
    lib: libloading::Library,
    #[borrows(lib)]
    // we never unload the lib, so it's effectively 'static
    #[covariant]
    init: libloading::Symbol<'this, InitFn>,
    #[borrows(lib)]
    #[covariant]
    query: libloading::Symbol<'this, CallFn>,
    #[borrows(lib)]
    #[covariant]
    cmd: libloading::Symbol<'this, CallFn>,
}

impl LibInner {
    unsafe fn priv_new(path: &std::path::Path) -> Result<Self> {
        let lib = libloading::Library::new(path)?;

        Ok(LibInnerTryBuilder {
            lib,
            init_builder: |lib: &libloading::Library| {
                lib.get(b"init\0")
            },
            query_builder: |lib: &libloading::Library| {
                lib.get(b"query\0")
            },
            cmd_builder: |lib: &libloading::Library| {
                lib.get(b"cmd\0")
            },
        }
        .try_build()?)
    }
}

/// Error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The shared library or one of its symbols could not be loaded.
    #[error("failed to load native library: {0}")]
    Load(#[from] libloading::Error),

    /// A string handed to native code contained an interior nul byte.
    #[error("interior nul byte in string passed to native code")]
    NulByte(#[from] std::ffi::NulError),

    /// A buffer could not be split into whole elements.
    #[error("buffer of {len} bytes is not a multiple of {size} byte elements")]
    SizeMismatch {
        /// buffer length in bytes
        len: usize,
        /// element size in bytes
        size: usize,
    },

    /// A buffer pointer was not aligned for the requested element type.
    #[error("buffer is not aligned to {align} bytes")]
    Misaligned {
        /// required alignment
        align: usize,
    },

    /// A buffer did not hold valid utf8.
    #[error(transparent)]
    Utf8(#[from] std::str::Utf8Error),
}

/// Sys result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Invoked for every pushed event. Lives for the rest of the process.
pub type EventCb =
    Box<dyn for<'a> Fn(NativeBuffer<'a>) + 'static + Send + Sync>;

/// Invoked once when the native library is ready.
pub type ReadyCb = Box<dyn FnOnce() + 'static + Send>;

/// Invoked once with the result of a single query / cmd.
pub type ResultCb = Box<dyn for<'a> FnOnce(NativeBuffer<'a>) + 'static + Send>;

/// Handle to the loaded native library.
pub struct Api(LibInner);

// the symbols are plain fn pointers into a library we never unload
unsafe impl Send for Api {}
unsafe impl Sync for Api {}

impl std::fmt::Debug for Api {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Api").finish()
    }
}

impl Api {
    /// Open the library at `path` and resolve its entry points.
    /// Prefer [load], which keeps a single process-wide instance.
    pub unsafe fn open(path: &std::path::Path) -> Result<Self> {
        Ok(Self(LibInner::priv_new(path)?))
    }

    /// Start the native library.
    ///
    /// `on_ready` fires once, `on_event` any number of times afterwards.
    /// The event closure is leaked: native code may call it until the
    /// process exits.
    ///
    /// # Safety
    ///
    /// The library must honor the callback contract: `on_event` is only
    /// invoked with a `(ptr, len)` readable for the duration of the call.
    /// Repeated `on_ready` invocations are ignored.
    #[inline]
    pub unsafe fn init(
        &self,
        data_dir: &CStr,
        on_event: EventCb,
        on_ready: ReadyCb,
    ) {
        let event_usr: Box<EventCb> = Box::new(on_event);
        let event_usr = Box::into_raw(event_usr);

        let ready_usr = park(&READY, on_ready);

        self.0.borrow_init()(
            data_dir.as_ptr(),
            Some(event_trampoline),
            event_usr as *mut _,
            Some(ready_trampoline),
            ready_usr,
        );
    }

    /// Issue a query. `json` is only read for the duration of this call.
    ///
    /// # Safety
    ///
    /// `on_result` must be invoked with a `(ptr, len)` readable for the
    /// duration of the call. Invocations after the first are ignored.
    #[inline]
    pub unsafe fn query(&self, json: &CStr, on_result: ResultCb) {
        let usr = park(&RESULT, on_result);

        self.0.borrow_query()(json.as_ptr(), Some(result_trampoline), usr);
    }

    /// Issue a command. `json` is only read for the duration of this call.
    ///
    /// # Safety
    ///
    /// `on_result` must be invoked with a `(ptr, len)` readable for the
    /// duration of the call. Invocations after the first are ignored.
    #[inline]
    pub unsafe fn cmd(&self, json: &CStr, on_result: ResultCb) {
        let usr = park(&RESULT, on_result);

        self.0.borrow_cmd()(json.as_ptr(), Some(result_trampoline), usr);
    }
}

unsafe extern "C" fn event_trampoline(
    usr: *mut c_void,
    ptr: *const u8,
    len: usize,
) {
    if usr.is_null() {
        return;
    }
    // borrowed, never freed: the native side keeps calling it
    let closure = &*(usr as *const EventCb);
    let buf = NativeBuffer::from_raw(ptr, len);
    guard("event", || closure(buf));
}

// Single-shot callbacks handed to native code, keyed by the id passed as
// `usr`. Ids start at 1 so `usr` is never null.
static NEXT_ID: AtomicUsize = AtomicUsize::new(1);
static READY: Lazy<Mutex<HashMap<usize, ReadyCb>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));
static RESULT: Lazy<Mutex<HashMap<usize, ResultCb>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn park<T>(map: &Mutex<HashMap<usize, T>>, cb: T) -> *mut c_void {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    map.lock().insert(id, cb);
    id as *mut c_void
}

fn unpark<T>(map: &Mutex<HashMap<usize, T>>, usr: *mut c_void) -> Option<T> {
    let id = usr as usize;
    let cb = map.lock().remove(&id);
    if cb.is_none() {
        tracing::warn!(id, "repeated native callback ignored");
    }
    cb
}

unsafe extern "C" fn ready_trampoline(usr: *mut c_void) {
    if let Some(closure) = unpark(&READY, usr) {
        guard("ready", closure);
    }
}

unsafe extern "C" fn result_trampoline(
    usr: *mut c_void,
    ptr: *const u8,
    len: usize,
) {
    if let Some(closure) = unpark(&RESULT, usr) {
        let buf = NativeBuffer::from_raw(ptr, len);
        guard("result", move || closure(buf));
    }
}

/// Unwinding into native frames is undefined behavior, stop it here.
fn guard<F: FnOnce()>(site: &'static str, f: F) {
    if let Err(err) = catch_unwind(AssertUnwindSafe(f)) {
        let msg = err
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| err.downcast_ref::<String>().map(|s| s.as_str()))
            .unwrap_or("<non-string panic>");
        tracing::error!(site, msg, "panic in native callback");
    }
}

static API: OnceCell<Api> = OnceCell::new();

/// Load the native library at `path`, once per process.
///
/// Subsequent calls return the already loaded instance and ignore `path`.
pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<&'static Api> {
    API.get_or_try_init(|| unsafe { Api::open(path.as_ref()) })
}

/// The loaded library, if [load] has succeeded.
pub fn api() -> Option<&'static Api> {
    API.get()
}
