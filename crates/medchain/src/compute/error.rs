use std::fmt;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Whether retrying the failed call could succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Transient,
    Fatal,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::Transient => write!(f, "transient"),
            ErrorClass::Fatal => write!(f, "fatal"),
        }
    }
}

/// Failure raised by a compute backend call, already classified for the poll loop.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{class} backend error: {message}")]
pub struct ProviderError {
    class: ErrorClass,
    message: String,
}

impl ProviderError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Transient,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Fatal,
            message: message.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        self.class
    }

    pub fn is_transient(&self) -> bool {
        self.class == ErrorClass::Transient
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Classifies a non-success HTTP response. Timeouts, throttling and server errors are
    /// transient; every other client error is fatal.
    pub fn from_status(status: StatusCode, context: &str, body: &str) -> Self {
        let body = body.trim();
        let message = if body.is_empty() {
            format!("{context}: HTTP {status}")
        } else {
            format!("{context}: HTTP {status}: {body}")
        };

        if status.is_server_error()
            || status == StatusCode::TOO_MANY_REQUESTS
            || status == StatusCode::REQUEST_TIMEOUT
        {
            Self::transient(message)
        } else {
            Self::fatal(message)
        }
    }

    pub fn from_reqwest(err: reqwest::Error, context: &str) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(status, context, "");
        }

        let message = format!("{context}: {err}");
        if err.is_builder() || err.is_decode() || err.is_redirect() {
            Self::fatal(message)
        } else {
            Self::transient(message)
        }
    }
}
