//! Addon error types.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

/// Addon error that can be serialized across the message bridge.
#[derive(Debug)]
pub struct AppError {
    payload: HashMap<String, String>,
    messages: Vec<String>,
    kind: ErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Input failed schema validation
    Validation,
    /// Input was blocked by the whitelist, the shell-safety filter or path containment
    SecurityPolicy,
    /// Site not found in the host registry
    SiteNotFound,
    /// Site exists but was not created as a Laravel site
    NotLaravelSite,
    /// Configuration error
    Config,
    /// File system error
    Io,
    /// Process error
    Process,
    /// A child process was terminated after its timeout
    Timeout,
    /// Site creation failed
    Install,
    /// Unknown bridge channel
    UnknownChannel,
    /// General error
    Other,
}

impl ErrorKind {
    pub fn code(&self) -> u32 {
        match self {
            Self::Validation => 1001,
            Self::SecurityPolicy => 1002,
            Self::SiteNotFound => 1003,
            Self::NotLaravelSite => 1004,
            Self::Config => 2001,
            Self::Io => 2002,
            Self::Process => 3001,
            Self::Timeout => 3002,
            Self::Install => 3003,
            Self::UnknownChannel => 4001,
            Self::Other => 9999,
        }
    }
}

impl AppError {
    pub fn new(kind: ErrorKind, payload: HashMap<String, String>) -> Self {
        Self {
            payload,
            messages: Vec::new(),
            kind,
        }
    }

    /// Create an error with a single "detail" key from a non-empty string,
    /// or an empty payload if the string is empty.
    fn with_detail(kind: ErrorKind, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let payload = if detail.is_empty() {
            HashMap::new()
        } else {
            HashMap::from([("detail".to_string(), detail)])
        };
        Self::new(kind, payload)
    }

    /// Validation rejection carrying every human-readable message.
    pub fn validation(messages: Vec<String>) -> Self {
        Self {
            payload: HashMap::new(),
            messages,
            kind: ErrorKind::Validation,
        }
    }

    pub fn security_policy(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            payload: HashMap::from([("detail".to_string(), message.clone())]),
            messages: vec![message],
            kind: ErrorKind::SecurityPolicy,
        }
    }

    pub fn site_not_found(id: &str) -> Self {
        Self::new(
            ErrorKind::SiteNotFound,
            HashMap::from([("id".to_string(), id.to_string())]),
        )
    }

    pub fn not_laravel_site(id: &str) -> Self {
        Self::new(
            ErrorKind::NotLaravelSite,
            HashMap::from([("id".to_string(), id.to_string())]),
        )
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Config, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Io, message)
    }

    pub fn process(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Process, message)
    }

    pub fn timeout(program: &str, secs: u64) -> Self {
        Self::new(
            ErrorKind::Timeout,
            HashMap::from([
                ("program".to_string(), program.to_string()),
                ("secs".to_string(), secs.to_string()),
            ]),
        )
    }

    pub fn install(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Install, message)
    }

    pub fn unknown_channel(channel: &str) -> Self {
        Self::new(
            ErrorKind::UnknownChannel,
            HashMap::from([("channel".to_string(), channel.to_string())]),
        )
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Other, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Text suitable for showing to a user.
    pub fn user_message(&self) -> String {
        if !self.messages.is_empty() {
            return self.messages.join("; ");
        }
        if let Some(detail) = self.payload.get("detail") {
            return detail.clone();
        }
        let field = |key: &str| self.payload.get(key).map(String::as_str).unwrap_or("");
        match self.kind {
            ErrorKind::SiteNotFound => format!("Site '{}' not found", field("id")),
            ErrorKind::NotLaravelSite => format!("Site '{}' is not a Laravel site", field("id")),
            ErrorKind::Timeout => format!(
                "{} timed out after {} seconds",
                field("program"),
                field("secs")
            ),
            ErrorKind::UnknownChannel => format!("Unknown channel '{}'", field("channel")),
            _ => self.to_string(),
        }
    }

    /// True for rejections that happened before anything was executed.
    pub fn is_rejection(&self) -> bool {
        matches!(self.kind, ErrorKind::Validation | ErrorKind::SecurityPolicy)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.messages.is_empty() {
            return write!(f, "{:?}: {}", self.kind, self.messages.join("; "));
        }
        if self.payload.is_empty() {
            write!(f, "{:?}", self.kind)
        } else {
            let mut pairs: Vec<String> = self
                .payload
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            pairs.sort();
            write!(f, "{:?}: {}", self.kind, pairs.join(", "))
        }
    }
}

impl std::error::Error for AppError {}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct as _;
        let mut s = serializer.serialize_struct("AppError", 4)?;
        s.serialize_field("code", &self.kind.code())?;
        s.serialize_field("kind", &self.kind)?;
        s.serialize_field("payload", &self.payload)?;
        s.serialize_field("messages", &self.messages)?;
        s.end()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::config(err.to_string())
    }
}

impl From<toml::ser::Error> for AppError {
    fn from(err: toml::ser::Error) -> Self {
        Self::config(err.to_string())
    }
}

impl From<walkdir::Error> for AppError {
    fn from(err: walkdir::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::config(err.to_string())
    }
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, AppError>;
