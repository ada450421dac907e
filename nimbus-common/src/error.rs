use std::error::Error as StdError;

/// The stable set of ways a reconciliation step can fail.
///
/// Every audit `FAIL` record's note is derived from one of these, so the
/// variant names double as the vocabulary the audit log speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ErrorKind {
    InvalidTemplate,
    NameUnavailable,
    QuotaExhausted,
    ProviderTransport,
    ProviderRejected,
    AsyncTimeout,
    ReadinessTimeout,
    PostconditionsViolated,
    StateIllegal,
    PersistenceError,
    Cancelled,
    Internal,
}

/// Crate-wide error. A stable [`ErrorKind`] drives audit-note formatting and
/// step-index dispatch; the variant carries whatever diagnostic detail (a
/// message, a wrapped source) that failure site had on hand.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{kind}")]
    Bare { kind: ErrorKind },
    #[error("{kind}: {message}")]
    Message { kind: ErrorKind, message: String },
    #[error("{kind}: {source}")]
    Wrapped {
        kind: ErrorKind,
        #[source]
        source: Box<dyn StdError + Send + Sync + 'static>,
    },
    #[error("PersistenceError: {0}")]
    Persistence(#[from] sqlx::Error),
    #[error("Internal: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn from_kind(kind: ErrorKind) -> Self {
        Self::Bare { kind }
    }

    pub fn source_of<E: StdError + Send + Sync + 'static>(kind: ErrorKind, err: E) -> Self {
        Self::Wrapped {
            kind,
            source: Box::new(err),
        }
    }

    pub fn custom<S: Into<String>>(kind: ErrorKind, message: S) -> Self {
        Self::Message {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Bare { kind } => *kind,
            Self::Message { kind, .. } => *kind,
            Self::Wrapped { kind, .. } => *kind,
            Self::Persistence(_) => ErrorKind::PersistenceError,
            Self::Io(_) => ErrorKind::Internal,
        }
    }

    /// The text an audit `FAIL` record should carry for this error. A
    /// dedicated method rather than a bare `to_string()` call at each call
    /// site, so the audit vocabulary can diverge from `Display` later
    /// without touching every `record_fail` call.
    pub fn note(&self) -> String {
        self.to_string()
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::from_kind(kind)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
