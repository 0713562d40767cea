//! Recoverable resolution errors.

use std::{fmt, io};

/// The kind of failure a [`ConfigError`] represents.
///
/// Kept separate from [`ConfigError`] itself so callers can match on `err.kind()` without caring
/// about the human-readable context fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigErrorKind {
    /// Unknown directive name, a rejected `dynamic*` prefix, a non-string directive entry,
    /// multiple lazy directives in one list, or a non-lazy directive following a lazy one.
    InvalidDirective,
    /// A directive's value has the wrong shape for what it does (e.g. `append` to a non-list).
    InvalidValue,
    /// A directive referenced a setting that isn't present at evaluation time.
    MissingTarget,
    /// [`get_setting`](crate::database::ConfigDatabase::get_setting) was called on an absent key.
    MissingKey,
    /// An empty dotted segment was found while unflattening.
    BlankKey,
    /// The lazy dependency graph has no in-degree-zero nodes to start from.
    LazyCycle,
    /// A self-referential lazy directive's `rename` could not produce a new value.
    RenameUnsupported,
    /// A file couldn't be read, or the YAML/JSON text in it couldn't be parsed.
    Io,
}

impl fmt::Display for ConfigErrorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::InvalidDirective => "invalid directive",
            Self::InvalidValue => "invalid value",
            Self::MissingTarget => "missing target",
            Self::MissingKey => "missing key",
            Self::BlankKey => "blank key",
            Self::LazyCycle => "lazy cycle",
            Self::RenameUnsupported => "rename unsupported",
            Self::Io => "I/O error",
        })
    }
}

/// An error produced while loading or resolving a configuration.
///
/// Modeled after the teacher crate's [`ParseError`](https://docs.rs/smart-config): a typed kind
/// plus whatever contextual fields happen to apply, rather than a flat string.
pub struct ConfigError {
    kind: ConfigErrorKind,
    message: String,
    key: Option<String>,
    directive: Option<String>,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ConfigError {
    pub(crate) fn new(kind: ConfigErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            key: None,
            directive: None,
            source: None,
        }
    }

    pub(crate) fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub(crate) fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directive = Some(directive.into());
        self
    }

    pub(crate) fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub(crate) fn io(message: impl Into<String>, source: io::Error) -> Self {
        Self::new(ConfigErrorKind::Io, message).with_source(source)
    }

    /// Returns the kind of this error, for callers that want to match on it without string
    /// comparison.
    pub fn kind(&self) -> ConfigErrorKind {
        self.kind
    }

    /// Returns the setting key this error concerns, if any.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Returns the directive name this error concerns, if any.
    pub fn directive(&self) -> Option<&str> {
        self.directive.as_deref()
    }
}

impl fmt::Debug for ConfigError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ConfigError")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .field("key", &self.key)
            .field("directive", &self.directive)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}: {}", self.kind, self.message)?;
        if let Some(key) = &self.key {
            write!(formatter, " (key: `{key}`)")?;
        }
        if let Some(directive) = &self.directive {
            write!(formatter, " (directive: `{directive}`)")?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_deref().map(|err| err as _)
    }
}

/// Shorthand for `Result<T, ConfigError>`.
pub type ConfigResult<T> = Result<T, ConfigError>;
