// SPDX-License-Identifier: Apache-2.0 OR MIT

use core::fmt;
use std::io;

macro_rules! format_err {
    ($kind:ident; $($tt:tt)*) => {
        crate::Error::new(crate::error::ErrorKind::Message(crate::Kind::$kind, format!($($tt)*)))
    };
    ($($tt:tt)*) => {
        crate::Error::new(format!($($tt)*))
    };
}

macro_rules! bail {
    ($($tt:tt)*) => {
        return Err(format_err!($($tt)*))
    };
}

pub(crate) type Result<T, E = Error> = core::result::Result<T, E>;

/// An error that occurred while loading or resolving bake definitions.
#[derive(Debug)]
pub struct Error(ErrorKind);

/// The category of an [`Error`].
///
/// Configuration errors are deterministic: retrying the same resolution
/// without changing its input fails the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Kind {
    /// A document could not be decoded by its decoder.
    Parse,
    /// A document of unknown format was rejected by every decoder.
    ParseConflict,
    /// A requested or inherited target does not exist.
    TargetNotFound,
    /// An override string is malformed.
    InvalidOverrideSyntax,
    /// An override names a field that does not exist.
    UnknownOverrideKey,
    /// An override pattern matched no target.
    NoTargetMatch,
    /// An override pattern is not a valid glob.
    InvalidPattern,
    /// A target's context links to the target itself.
    SelfLink,
    /// Context links form a cycle.
    LinkCycle,
    /// Two linked multi-platform targets declare different platforms.
    PlatformMismatch,
    /// A boolean field received a value that is not `true` or `false`.
    InvalidBooleanValue,
    /// A `matrix` or per-combination `name` declaration is invalid.
    InvalidMatrix,
    /// A target or group name contains unsupported characters.
    InvalidName,
    /// An interpolation references a variable that is not bound.
    UnknownVariable,
    /// An interpolation expression is malformed.
    InvalidExpression,
    /// Any other error.
    Other,
}

// Hiding error variants from a library's public error type to prevent
// dependency updates from becoming breaking changes.
// Callers inspect errors through `Error::kind` instead.
#[derive(Debug)]
pub(crate) enum ErrorKind {
    Bool(core::str::ParseBoolError),
    Utf8(core::str::Utf8Error),

    Toml(toml::de::Error),
    Json(serde_json::Error),
    Glob(globset::Error),

    Message(Kind, String),
    Other(String),
    WithContext(String, Option<Box<Error>>),
}

impl Error {
    pub(crate) fn new(e: impl Into<ErrorKind>) -> Self {
        Self(e.into())
    }

    /// Returns the category of this error.
    ///
    /// For errors that wrap another error with additional context, this is
    /// the category of the innermost error.
    pub fn kind(&self) -> Kind {
        match &self.0 {
            ErrorKind::Bool(_) => Kind::InvalidBooleanValue,
            ErrorKind::Utf8(_) | ErrorKind::Toml(_) | ErrorKind::Json(_) => Kind::Parse,
            ErrorKind::Glob(_) => Kind::InvalidPattern,
            ErrorKind::Message(kind, _) => *kind,
            ErrorKind::Other(_) | ErrorKind::WithContext(_, None) => Kind::Other,
            ErrorKind::WithContext(_, Some(e)) => e.kind(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            ErrorKind::Bool(e) => fmt::Display::fmt(e, f),
            ErrorKind::Utf8(e) => fmt::Display::fmt(e, f),
            ErrorKind::Toml(e) => fmt::Display::fmt(e, f),
            ErrorKind::Json(e) => fmt::Display::fmt(e, f),
            ErrorKind::Glob(e) => fmt::Display::fmt(e, f),
            ErrorKind::Message(_, e) | ErrorKind::Other(e) | ErrorKind::WithContext(e, ..) => {
                fmt::Display::fmt(e, f)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.0 {
            ErrorKind::Bool(e) => Some(e),
            ErrorKind::Utf8(e) => Some(e),
            ErrorKind::Toml(e) => Some(e),
            ErrorKind::Json(e) => Some(e),
            ErrorKind::Glob(e) => Some(e),
            ErrorKind::Message(..) | ErrorKind::Other(_) => None,
            ErrorKind::WithContext(_, e) => Some(e.as_ref()?),
        }
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        match e.kind() {
            Kind::Parse | Kind::ParseConflict => Self::new(io::ErrorKind::InvalidData, e),
            _ => Self::new(io::ErrorKind::Other, e),
        }
    }
}

impl From<Error> for ErrorKind {
    fn from(e: Error) -> Self {
        e.0
    }
}
impl From<String> for ErrorKind {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}
impl From<&str> for ErrorKind {
    fn from(s: &str) -> Self {
        Self::Other(s.to_owned())
    }
}
impl From<core::str::ParseBoolError> for ErrorKind {
    fn from(e: core::str::ParseBoolError) -> Self {
        Self::Bool(e)
    }
}
impl From<core::str::Utf8Error> for ErrorKind {
    fn from(e: core::str::Utf8Error) -> Self {
        Self::Utf8(e)
    }
}
impl From<toml::de::Error> for ErrorKind {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml(e)
    }
}
impl From<serde_json::Error> for ErrorKind {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}
impl From<globset::Error> for ErrorKind {
    fn from(e: globset::Error) -> Self {
        Self::Glob(e)
    }
}

// Note: These implementations are intentionally not-exist to prevent dependency
// updates from becoming breaking changes.
// impl From<toml::de::Error> for Error
// impl From<serde_json::Error> for Error
// impl From<globset::Error> for Error

// Inspired by anyhow::Context.
pub(crate) trait Context<T, E> {
    fn context<C>(self, context: C) -> Result<T, Error>
    where
        C: fmt::Display + Send + Sync + 'static;
    fn with_context<C, F>(self, context: F) -> Result<T, Error>
    where
        C: fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}
impl<T, E> Context<T, E> for Result<T, E>
where
    E: Into<ErrorKind>,
{
    fn context<C>(self, context: C) -> Result<T, Error>
    where
        C: fmt::Display + Send + Sync + 'static,
    {
        match self {
            Ok(ok) => Ok(ok),
            Err(e) => Err(Error(ErrorKind::WithContext(
                context.to_string(),
                Some(Box::new(Error(e.into()))),
            ))),
        }
    }
    fn with_context<C, F>(self, context: F) -> Result<T, Error>
    where
        C: fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        match self {
            Ok(ok) => Ok(ok),
            Err(e) => Err(Error(ErrorKind::WithContext(
                context().to_string(),
                Some(Box::new(Error(e.into()))),
            ))),
        }
    }
}
impl<T> Context<T, core::convert::Infallible> for Option<T> {
    fn context<C>(self, context: C) -> Result<T, Error>
    where
        C: fmt::Display + Send + Sync + 'static,
    {
        match self {
            Some(ok) => Ok(ok),
            None => Err(Error(ErrorKind::WithContext(context.to_string(), None))),
        }
    }
    fn with_context<C, F>(self, context: F) -> Result<T, Error>
    where
        C: fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        match self {
            Some(ok) => Ok(ok),
            None => Err(Error(ErrorKind::WithContext(context().to_string(), None))),
        }
    }
}
