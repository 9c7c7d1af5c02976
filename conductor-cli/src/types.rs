//! Common types used across CLI modules

use uuid::Uuid;

/// How a user refers to a job on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobRef {
    /// Sequential job id, e.g. `42`
    Id(i64),
    /// Full public token
    Token(Uuid),
    /// Leading characters of a public token that should identify one job
    TokenPrefix(String),
}

impl JobRef {
    /// Parse a string into a JobRef
    ///
    /// Digits are an id, a full UUID is a token, anything else a token prefix.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if let Ok(id) = input.parse::<i64>() {
            JobRef::Id(id)
        } else if let Ok(uuid) = Uuid::parse_str(input) {
            JobRef::Token(uuid)
        } else {
            JobRef::TokenPrefix(input.to_lowercase())
        }
    }
}

impl std::fmt::Display for JobRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobRef::Id(id) => write!(f, "{}", id),
            JobRef::Token(uuid) => write!(f, "{}", uuid),
            JobRef::TokenPrefix(prefix) => write!(f, "{}", prefix),
        }
    }
}

impl From<&str> for JobRef {
    fn from(s: &str) -> Self {
        JobRef::parse(s)
    }
}

/// Parses `key=value`; the value is read as JSON when it is valid JSON and
/// as a plain string otherwise
pub fn parse_param(input: &str) -> Result<(String, serde_json::Value), String> {
    let (key, raw) = input
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", input))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in '{}'", input));
    }

    let value = serde_json::from_str(raw)
        .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));

    Ok((key.to_string(), value))
}
