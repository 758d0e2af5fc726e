//! Code-for-token exchange and token revocation.
//!
//! The exchange POSTs form-encoded parameters to the resolved token
//! endpoint and parses the JSON response. Token endpoints report expiry
//! only as a relative `expires_in`, so the response is stamped with
//! `issued_at` from the local clock at parse time; expiry arithmetic is
//! local-clock-based throughout.
//!
//! Revocation is best-effort: the issuer may refuse or the endpoint may be
//! down, and the client proceeds either way. Failures are logged, never
//! escalated.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::discovery::ServiceConfiguration;
use crate::requestor::HttpRequestor;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during the token exchange.
#[derive(Debug, thiserror::Error)]
pub enum TokenExchangeError {
    /// The token endpoint could not be reached.
    #[error("Network error: {0}")]
    Network(String),

    /// The token endpoint answered with a non-success status.
    #[error("Token endpoint rejected the request: status {status}, error {}",
        .error.as_deref().unwrap_or("unknown"))]
    Endpoint {
        /// HTTP status code.
        status: u16,
        /// OAuth error code parsed from the response body, when present.
        error: Option<String>,
        /// OAuth error description parsed from the response body.
        error_description: Option<String>,
    },

    /// The response body could not be parsed as a token response.
    #[error("Failed to parse token response: {0}")]
    Parse(String),
}

// ============================================================================
// Request Types
// ============================================================================

/// OAuth grant types this client can request.
///
/// The redirect flow only ever exchanges authorization codes; refresh-token
/// automation is deliberately not part of this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantType {
    /// `authorization_code` (RFC 6749 §4.1).
    AuthorizationCode,
}

impl GrantType {
    /// Wire value of the `grant_type` parameter.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
        }
    }
}

/// Parameters for one code-for-token exchange.
#[derive(Debug, Clone)]
pub struct TokenRequest {
    /// OAuth client identifier.
    pub client_id: String,
    /// Redirect URI the code was delivered to.
    pub redirect_uri: String,
    /// Grant type; always `authorization_code` here.
    pub grant_type: GrantType,
    /// The authorization code to exchange.
    pub code: String,
    /// The PKCE verifier recovered from the pending record.
    pub code_verifier: String,
}

/// Parameters for a best-effort revocation call.
#[derive(Debug, Clone)]
pub struct RevokeTokenRequest {
    /// The token to revoke.
    pub token: String,
    /// OAuth client identifier.
    pub client_id: String,
    /// Hint for the issuer (`access_token` or `refresh_token`).
    pub token_type_hint: Option<String>,
}

impl RevokeTokenRequest {
    /// Creates a revocation request for an access token.
    #[must_use]
    pub fn access_token(token: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            client_id: client_id.into(),
            token_type_hint: Some("access_token".to_string()),
        }
    }
}

// ============================================================================
// Token Response
// ============================================================================

/// A parsed token response.
///
/// Fields beyond the RFC 6749 set, the SMART launch-context extensions in
/// particular, are retained in `original` and exposed through accessors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The bearer access token.
    pub access_token: String,

    /// Token type; `Bearer` for everything this client requests.
    pub token_type: String,

    /// Lifetime in seconds, relative to `issued_at`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,

    /// Refresh token, when the issuer grants one. Carried but never used
    /// by this client (refresh automation is out of scope).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Raw identity token (compact JWT), when `openid` was in scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// Granted scope, when the issuer narrows the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Local-clock arrival time of the response. Stamped at parse time when
    /// absent from the wire (it always is on the wire), preserved when the
    /// response round-trips through the token cache.
    #[serde(default = "OffsetDateTime::now_utc", with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,

    /// Every other response field, including SMART launch-context
    /// extensions (`patient`, `encounter`, `smart_style_url`,
    /// `need_patient_banner`, ...).
    #[serde(flatten)]
    pub original: serde_json::Map<String, Value>,
}

impl TokenResponse {
    /// Patient in context, from the SMART extensions.
    #[must_use]
    pub fn patient(&self) -> Option<&str> {
        self.original.get("patient").and_then(Value::as_str)
    }

    /// Encounter in context, from the SMART extensions.
    #[must_use]
    pub fn encounter(&self) -> Option<&str> {
        self.original.get("encounter").and_then(Value::as_str)
    }

    /// URL to SMART styling information, from the SMART extensions.
    #[must_use]
    pub fn smart_style_url(&self) -> Option<&str> {
        self.original.get("smart_style_url").and_then(Value::as_str)
    }

    /// Whether the app should render a patient banner.
    #[must_use]
    pub fn need_patient_banner(&self) -> Option<bool> {
        self.original
            .get("need_patient_banner")
            .and_then(Value::as_bool)
    }

    /// Returns `true` when `expires_in` has elapsed relative to `now`.
    /// A response without `expires_in` is never reported as expired.
    #[must_use]
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        match self.expires_in {
            Some(seconds) => {
                let expires_at = self.issued_at + time::Duration::seconds(seconds as i64);
                expires_at <= now
            }
            None => false,
        }
    }
}

/// Error body shape many token endpoints return on rejection (RFC 6749 §5.2).
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: Option<String>,
    error_description: Option<String>,
}

// ============================================================================
// Token Client
// ============================================================================

/// Client for the token and revocation endpoints.
pub struct TokenClient {
    requestor: Arc<dyn HttpRequestor>,
}

impl TokenClient {
    /// Creates a token client on top of the given transport.
    #[must_use]
    pub fn new(requestor: Arc<dyn HttpRequestor>) -> Self {
        Self { requestor }
    }

    /// Exchanges an authorization code for tokens.
    ///
    /// # Errors
    ///
    /// Returns a [`TokenExchangeError`] on transport failure, on a non-2xx
    /// status (with the OAuth error body parsed out when the endpoint sent
    /// one), or when the body cannot be parsed as a token response.
    pub async fn perform_token_request(
        &self,
        service_config: &ServiceConfiguration,
        request: &TokenRequest,
    ) -> Result<TokenResponse, TokenExchangeError> {
        let params = [
            ("grant_type", request.grant_type.as_str()),
            ("code", request.code.as_str()),
            ("redirect_uri", request.redirect_uri.as_str()),
            ("client_id", request.client_id.as_str()),
            ("code_verifier", request.code_verifier.as_str()),
        ];

        let response = self
            .requestor
            .post_form(&service_config.token_endpoint, &params)
            .await
            .map_err(|e| TokenExchangeError::Network(e.to_string()))?;

        if !response.is_success() {
            let body: Option<OAuthErrorBody> = serde_json::from_str(&response.body).ok();
            let (error, error_description) = body
                .map(|b| (b.error, b.error_description))
                .unwrap_or_default();
            tracing::debug!(
                status = response.status,
                error = error.as_deref().unwrap_or("unknown"),
                "token exchange rejected"
            );
            return Err(TokenExchangeError::Endpoint {
                status: response.status,
                error,
                error_description,
            });
        }

        let token: TokenResponse = serde_json::from_str(&response.body)
            .map_err(|e| TokenExchangeError::Parse(e.to_string()))?;
        tracing::debug!(token_type = %token.token_type, "token exchange completed");
        Ok(token)
    }

    /// Revokes a token, best-effort.
    ///
    /// Failures (transport errors and non-success statuses alike) are
    /// logged and swallowed; revocation is advisory from the client's side.
    pub async fn perform_revoke_token_request(
        &self,
        service_config: &ServiceConfiguration,
        request: &RevokeTokenRequest,
    ) {
        let mut params = vec![
            ("token", request.token.as_str()),
            ("client_id", request.client_id.as_str()),
        ];
        if let Some(hint) = &request.token_type_hint {
            params.push(("token_type_hint", hint.as_str()));
        }

        match self
            .requestor
            .post_form(&service_config.revocation_endpoint, &params)
            .await
        {
            Ok(response) if response.is_success() => {
                tracing::debug!("token revoked");
            }
            Ok(response) => {
                tracing::warn!(status = response.status, "token revocation rejected");
            }
            Err(e) => {
                tracing::warn!(error = %e, "token revocation request failed");
            }
        }
    }
}
