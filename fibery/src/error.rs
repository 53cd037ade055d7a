use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

/// Result that is a wrapper of `Result<T, fibery::Error>`
pub type Result<T> = std::result::Result<T, Error>;

/// ErrorKind is all kinds of Error of fibery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// We don't know what happened here, and no actions other than
    /// just returning it back.
    Unexpected,

    /// The workspace schema is inconsistent.
    ///
    /// Returned when a relation field has no counterpart on its target
    /// database, or a database declares more than one title field. The
    /// schema snapshot violates the backend contract, retrying won't help.
    SchemaIntegrity,
    /// A database name is not part of the schema.
    TypeNotFound,
    /// A field name is not part of the database.
    FieldNotFound,

    /// Talking to the backend failed.
    ///
    /// Covers network errors, timeouts and unexpected http status codes.
    Transport,
    /// The backend answered, but reported that the command failed.
    CommandFailed,

    /// Caller supplied value can't be used, e.g. an unparsable date.
    InvalidInput,
    /// Configuration is missing or malformed.
    ConfigInvalid,
}

impl ErrorKind {
    /// Convert self into static str.
    pub fn into_static(self) -> &'static str {
        self.into()
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.into_static())
    }
}

impl From<ErrorKind> for &'static str {
    fn from(v: ErrorKind) -> &'static str {
        match v {
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::SchemaIntegrity => "SchemaIntegrity",
            ErrorKind::TypeNotFound => "TypeNotFound",
            ErrorKind::FieldNotFound => "FieldNotFound",
            ErrorKind::Transport => "Transport",
            ErrorKind::CommandFailed => "CommandFailed",
            ErrorKind::InvalidInput => "InvalidInput",
            ErrorKind::ConfigInvalid => "ConfigInvalid",
        }
    }
}

/// Error is the error struct returned by all fibery functions.
///
/// Cloning is cheap: the source is shared, so every caller waiting on the
/// same schema fetch can get its own copy of the failure.
#[derive(Clone)]
pub struct Error {
    kind: ErrorKind,
    message: String,

    context: Vec<(&'static str, String)>,
    source: Option<Arc<anyhow::Error>>,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;

        if !self.context.is_empty() {
            write!(f, ", context: {{ ")?;
            write!(
                f,
                "{}",
                self.context
                    .iter()
                    .map(|(k, v)| format!("{k}: {v}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            )?;
            write!(f, " }}")?;
        }

        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }

        if let Some(source) = &self.source {
            write!(f, ", source: {source}")?;
        }

        Ok(())
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        // If alternate has been specified, we will print like Debug.
        if f.alternate() {
            let mut de = f.debug_struct("Error");
            de.field("kind", &self.kind);
            de.field("message", &self.message);
            de.field("context", &self.context);
            de.field("source", &self.source);
            return de.finish();
        }

        write!(f, "{}", self.kind)?;
        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }
        writeln!(f)?;

        if !self.context.is_empty() {
            writeln!(f)?;
            writeln!(f, "Context:")?;
            for (k, v) in self.context.iter() {
                writeln!(f, "    {k}: {v}")?;
            }
        }
        if let Some(source) = &self.source {
            writeln!(f)?;
            writeln!(f, "Source: {source:?}")?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|v| &***v as &(dyn std::error::Error + 'static))
    }
}

impl Error {
    /// Create a new Error with error kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),

            context: Vec::default(),
            source: None,
        }
    }

    /// Add more context in error.
    pub fn with_context(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.context.push((key, value.into()));
        self
    }

    /// Set source for error.
    ///
    /// # Notes
    ///
    /// If the source has been set, we will raise a panic here.
    pub fn set_source(mut self, src: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "the source error has been set");

        self.source = Some(Arc::new(src.into()));
        self
    }

    /// Return error's kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Return error's message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Look up a context value by key.
    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.context
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl From<serde_json::Error> for Error {
    fn from(v: serde_json::Error) -> Self {
        Self::new(ErrorKind::Unexpected, "handling json data failed").set_source(v)
    }
}

impl From<reqwest::Error> for Error {
    fn from(v: reqwest::Error) -> Self {
        let message = if v.is_timeout() {
            "http request timed out"
        } else {
            "http request failed"
        };
        Self::new(ErrorKind::Transport, message).set_source(v)
    }
}

impl From<chrono::ParseError> for Error {
    fn from(v: chrono::ParseError) -> Self {
        Self::new(ErrorKind::InvalidInput, "parsing date value failed").set_source(v)
    }
}
