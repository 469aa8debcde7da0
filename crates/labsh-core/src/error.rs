use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors produced by the labsh session layer.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("network error: {0}")]
    Network(String),

    #[error("authentication failed for {user}@{host}; run 'labsh login' to re-authenticate")]
    Auth { user: String, host: String },

    #[error("host key verification failed: {0}")]
    HostKey(String),

    #[error("session expired at {}", .0.to_rfc3339())]
    Expired(DateTime<Utc>),

    #[error("{0} not found")]
    NotFound(String),

    #[error("remote command failed: {reason}{}", captured(.output))]
    Exec { reason: String, output: String },

    #[error("not connected to any server: {0}")]
    NotConnected(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("secret store error: {0}")]
    Vault(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl SessionError {
    /// True for the "nothing cached yet" family of failures.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SessionError::NotFound(_))
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, SessionError::Expired(_))
    }
}

fn captured(output: &str) -> String {
    let trimmed = output.trim_end();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("\n{trimmed}")
    }
}

impl From<toml::de::Error> for SessionError {
    fn from(e: toml::de::Error) -> Self {
        SessionError::Parse(e.to_string())
    }
}

impl From<toml::ser::Error> for SessionError {
    fn from(e: toml::ser::Error) -> Self {
        SessionError::Parse(e.to_string())
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_error_includes_captured_output() {
        let err = SessionError::Exec {
            reason: "exited with status 2".into(),
            output: "ls: cannot access 'nope'\n".into(),
        };
        assert_eq!(
            err.to_string(),
            "remote command failed: exited with status 2\nls: cannot access 'nope'"
        );
    }

    #[test]
    fn exec_error_without_output() {
        let err = SessionError::Exec {
            reason: "exited with status 1".into(),
            output: String::new(),
        };
        assert_eq!(err.to_string(), "remote command failed: exited with status 1");
    }

    #[test]
    fn auth_error_hints_at_login() {
        let err = SessionError::Auth {
            user: "admin".into(),
            host: "10.0.0.5".into(),
        };
        assert!(err.to_string().contains("labsh login"));
        assert!(err.to_string().contains("admin@10.0.0.5"));
    }

    #[test]
    fn predicates() {
        assert!(SessionError::NotFound("session record".into()).is_not_found());
        assert!(SessionError::Expired(Utc::now()).is_expired());
        assert!(!SessionError::Other("x".into()).is_not_found());
    }
}
