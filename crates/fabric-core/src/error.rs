use std::fmt;

/// The closed taxonomy of error kinds the activation host can return.
///
/// This is a *kind* enum, not a type hierarchy: every fallible operation in
/// the host maps its failure onto one of these, which keeps the IPC reply
/// encoding (`error-kind` + optional payload, see the protocol crate) in
/// lockstep with what callers can actually branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    InvalidState,
    NotFound,
    AlreadyExists,
    Timeout,
    LauncherFailure,
    ConfigurationError,
    ProtocolMismatch,
    Closed,
    Disabled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::InvalidState => "invalid state",
            ErrorKind::NotFound => "not found",
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::Timeout => "timed out",
            ErrorKind::LauncherFailure => "launcher failure",
            ErrorKind::ConfigurationError => "configuration error",
            ErrorKind::ProtocolMismatch => "protocol mismatch",
            ErrorKind::Closed => "closed",
            ErrorKind::Disabled => "disabled",
        };
        f.write_str(s)
    }
}

/// A host-level error: a kind callers can match on, plus a human-readable
/// message and, for `LauncherFailure`, the wrapped native error.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Error {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn wrap(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidState, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyExists, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn closed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Closed, message)
    }

    pub fn disabled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Disabled, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Log and terminate the process for invariants that must never be
/// violated (registry internal mismatch, lock-rank violation). Mirrors
/// spec §7: these are asserted, not propagated, and exit with the CLI's
/// reserved unhandled-exception code.
pub fn fatal_invariant(message: impl fmt::Display) -> ! {
    log::error!("unrecoverable invariant violation: {}", message);
    std::process::exit(3);
}
