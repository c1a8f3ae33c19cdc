//! Error types for entmap operations.

use std::fmt;

/// The primary error type for all entmap operations.
#[derive(Debug)]
pub enum Error {
    /// Configuration errors (missing capability, unknown role); fatal at
    /// construction time, not recoverable.
    Config(ConfigError),
    /// Command build errors (entity introspection failed, malformed columns).
    Mapping(MappingError),
    /// Lazy reference resolution errors.
    Resolve(ResolveError),
    /// Forward-link delivery to a missing or incompatible target.
    /// A programming invariant violation, not user-recoverable.
    Link(LinkError),
    /// Value conversion errors.
    Type(TypeError),
    /// Custom error with message.
    Custom(String),
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
}

#[derive(Debug)]
pub struct MappingError {
    /// The entity role being mapped.
    pub role: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ResolveError {
    pub kind: ResolveErrorKind,
    /// The target role the reference points at.
    pub role: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveErrorKind {
    /// The scoped query returned no row for a non-nullable reference.
    /// A referential-integrity violation; the reference stays unresolved.
    NotFound,
    /// Hydrating the fetched row into the target role failed.
    Hydration,
}

#[derive(Debug)]
pub struct LinkError {
    /// The column the link was carrying.
    pub field: String,
    pub message: String,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

impl Error {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(ConfigError {
            message: message.into(),
        })
    }

    /// Shorthand for a command build error.
    pub fn mapping(role: &'static str, message: impl Into<String>) -> Self {
        Error::Mapping(MappingError {
            role,
            message: message.into(),
        })
    }

    /// Shorthand for a forward-link invariant violation.
    pub fn link(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Link(LinkError {
            field: field.into(),
            message: message.into(),
        })
    }

    /// Is this error fatal for the whole unit of work?
    ///
    /// Configuration and link-delivery errors can never be retried by the
    /// orchestrator; resolution misses can (the reference stays unresolved).
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_) | Error::Link(_))
    }

    /// The entity role this error relates to, if any.
    pub fn role(&self) -> Option<&'static str> {
        match self {
            Error::Mapping(e) => Some(e.role),
            Error::Resolve(e) => Some(e.role),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Mapping(e) => write!(f, "Mapping error for '{}': {}", e.role, e.message),
            Error::Resolve(e) => match e.kind {
                ResolveErrorKind::NotFound => write!(
                    f,
                    "Resolution error for '{}': no row matched ({})",
                    e.role, e.message
                ),
                ResolveErrorKind::Hydration => {
                    write!(f, "Resolution error for '{}': {}", e.role, e.message)
                }
            },
            Error::Link(e) => write!(f, "Forward-link error on '{}': {}", e.field, e.message),
            Error::Type(e) => {
                if let Some(col) = &e.column {
                    write!(
                        f,
                        "Type error in column '{}': expected {}, found {}",
                        col, e.expected, e.actual
                    )
                } else {
                    write!(f, "Type error: expected {}, found {}", e.expected, e.actual)
                }
            }
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<MappingError> for Error {
    fn from(err: MappingError) -> Self {
        Error::Mapping(err)
    }
}

impl From<ResolveError> for Error {
    fn from(err: ResolveError) -> Self {
        Error::Resolve(err)
    }
}

impl From<LinkError> for Error {
    fn from(err: LinkError) -> Self {
        Error::Link(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

/// Result type alias for entmap operations.
pub type Result<T> = std::result::Result<T, Error>;
