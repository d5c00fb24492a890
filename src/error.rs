use std::fmt;

/// Reason a [`CompletionToken`](crate::io::CompletionToken) or watcher was cancelled.
///
/// Mirrors the four cancellation reasons a pending operation can observe:
/// dropping a handle, closing the owning I/O object, stopping the executor,
/// or an unspecified internal reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Unknown,
    ExecutorShutdown,
    IoObjectShutdown,
    UserCancel,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CancelReason::Unknown => "unknown",
            CancelReason::ExecutorShutdown => "executor shutdown",
            CancelReason::IoObjectShutdown => "io object shutdown",
            CancelReason::UserCancel => "user cancel",
        };
        f.write_str(s)
    }
}

/// The runtime's type-erased error carrier.
///
/// Every failure observable through `poll` ends up as one of these variants.
/// `Custom` keeps the original error behind a trait object so callers can
/// still `downcast_ref` to recover it, matching the "preserve type and
/// message" requirement on thrown-exception conversion.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("polled after the future reached a terminal state")]
    InvalidPoll,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("operation timed out")]
    Timeout,

    #[error("cancelled: {0}")]
    Cancelled(CancelReason),

    #[error("select/when_any polled over an empty future set")]
    EmptyFutureSet,

    #[error("channel closed")]
    ChannelClosed,

    #[error("invalid channel state")]
    InvalidChannelState,

    #[error("dispatch protocol error: {0}")]
    Dispatch(String),

    #[error("future polled after being moved out of a combinator")]
    MovedFuture,

    #[error("not supported: {0}")]
    NotSupported(&'static str),

    #[error("{0}")]
    Custom(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    pub fn custom<E>(err: E) -> Error
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Custom(Box::new(err))
    }

    /// Attempts to recover the concrete error type behind a `Custom` variant
    /// (or an `Io` variant, which is the common case).
    pub fn downcast_ref<T: std::error::Error + 'static>(&self) -> Option<&T> {
        match self {
            Error::Io(e) => (e as &(dyn std::error::Error + 'static)).downcast_ref::<T>(),
            Error::Custom(e) => e.downcast_ref::<T>(),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }
}

impl From<std::net::AddrParseError> for Error {
    fn from(e: std::net::AddrParseError) -> Self {
        Error::custom(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
