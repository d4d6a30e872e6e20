use crate::*;

/// Which native entry point a request travels through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// `query(json, on_result)`
    Query,
    /// `cmd(json, on_result)`
    Cmd,
}

/// An outbound request value.
pub trait Message: serde::Serialize + Sync {
    /// The wire tag of this request.
    fn tag(&self) -> &'static str;
}

/// A request sent through the native `query` entry point.
pub trait QueryMessage: Message {}

/// A request sent through the native `cmd` entry point.
pub trait CmdMessage: Message {}

/// Decoded `{"err": .., "res": ..}` envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response<T> {
    /// `err` was null and `res` held a payload.
    Body(T),

    /// Success without payload: a bare `"Ok"`, or `res` null.
    Ok,

    /// `err` was populated. `res` is ignored.
    Err(String),
}

impl<T> Response<T> {
    /// True unless the native side reported an error.
    pub fn is_ok(&self) -> bool {
        !matches!(self, Response::Err(_))
    }

    /// The payload, if any.
    pub fn body(self) -> Option<T> {
        match self {
            Response::Body(body) => Some(body),
            _ => None,
        }
    }

    /// Map a remote error to [Error::Remote].
    pub fn into_result(self) -> Result<Option<T>> {
        match self {
            Response::Body(body) => Ok(Some(body)),
            Response::Ok => Ok(None),
            Response::Err(err) => Err(Error::Remote(err)),
        }
    }
}
