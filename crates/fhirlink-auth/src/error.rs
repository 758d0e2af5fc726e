//! Top-level error type for the authorization flow.
//!
//! Each module defines its own error enum for the failures it can produce;
//! this module folds them into a single [`AuthError`] that the session
//! orchestrator surfaces to callers. No step of the flow is retried: every
//! error here is terminal for the invocation that produced it.

use std::fmt;

use crate::config::ConfigError;
use crate::discovery::DiscoveryError;
use crate::id_token::IdTokenError;
use crate::redirect::{AuthorizationError, StateMismatchError};
use crate::session::NoTokenError;
use crate::storage::StorageError;
use crate::token::TokenExchangeError;

/// Errors that can occur while driving the authorization flow.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Fetching or parsing the issuer's discovery document failed.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// The persistence medium for the pending request failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The issuer returned an OAuth error on the authorization return.
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),

    /// The anti-forgery state check failed on the authorization return.
    #[error(transparent)]
    StateMismatch(#[from] StateMismatchError),

    /// The code-for-token exchange failed.
    #[error(transparent)]
    TokenExchange(#[from] TokenExchangeError),

    /// The identity token payload could not be decoded.
    #[error(transparent)]
    IdToken(#[from] IdTokenError),

    /// An operation that requires a token was invoked without one.
    #[error(transparent)]
    NoToken(#[from] NoTokenError),

    /// The caller-supplied configuration failed boundary validation.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl AuthError {
    /// Returns the error category for logging and monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Discovery(_) => ErrorCategory::Discovery,
            Self::Storage(_) => ErrorCategory::Storage,
            Self::Authorization(_) | Self::StateMismatch(_) => ErrorCategory::Authorization,
            Self::TokenExchange(_) | Self::IdToken(_) | Self::NoToken(_) => ErrorCategory::Token,
            Self::Config(_) => ErrorCategory::Validation,
        }
    }

    /// Returns `true` if this error indicates a potential forgery or
    /// injection attempt rather than an operational failure.
    #[must_use]
    pub fn is_security_error(&self) -> bool {
        matches!(self, Self::StateMismatch(_))
    }
}

/// Categories of authorization-flow errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Endpoint discovery errors.
    Discovery,
    /// Persistence medium errors.
    Storage,
    /// Authorization response errors (issuer errors, forgery signals).
    Authorization,
    /// Token exchange, decode, and availability errors.
    Token,
    /// Configuration validation errors.
    Validation,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discovery => write!(f, "discovery"),
            Self::Storage => write!(f, "storage"),
            Self::Authorization => write!(f, "authorization"),
            Self::Token => write!(f, "token"),
            Self::Validation => write!(f, "validation"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        let err = AuthError::from(StateMismatchError);
        assert_eq!(err.category(), ErrorCategory::Authorization);
        assert!(err.is_security_error());

        let err = AuthError::from(NoTokenError);
        assert_eq!(err.category(), ErrorCategory::Token);
        assert!(!err.is_security_error());

        let err = AuthError::from(StorageError::unavailable("disk full"));
        assert_eq!(err.category(), ErrorCategory::Storage);
    }

    #[test]
    fn test_error_category_display() {
        assert_eq!(ErrorCategory::Discovery.to_string(), "discovery");
        assert_eq!(ErrorCategory::Storage.to_string(), "storage");
        assert_eq!(ErrorCategory::Authorization.to_string(), "authorization");
        assert_eq!(ErrorCategory::Token.to_string(), "token");
        assert_eq!(ErrorCategory::Validation.to_string(), "validation");
    }
}
