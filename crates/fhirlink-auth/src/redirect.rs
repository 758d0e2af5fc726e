//! Redirect-based authorization driver.
//!
//! The heart of the crate: the state machine that carries an authorization
//! request across a full page navigation. There is no in-memory continuity
//! between the two halves of the flow: [`perform_authorization_request`]
//! persists everything the return leg needs as one composite record and
//! navigates away; [`complete_authorization_request_if_possible`] runs on
//! the next page load and reconstructs the flow entirely from that record
//! and the current URL.
//!
//! Persisting a single record (rather than separate pending-request and
//! original-URL keys) makes the pre-redirect write atomic: either the whole
//! flow state committed before navigation or none of it did.
//!
//! Two overlapping flows against the same storage namespace will corrupt
//! each other's pending state; the driver assumes a single flow at a time.
//!
//! [`perform_authorization_request`]: RedirectFlowDriver::perform_authorization_request
//! [`complete_authorization_request_if_possible`]: RedirectFlowDriver::complete_authorization_request_if_possible

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::ConfigError;
use crate::discovery::ServiceConfiguration;
use crate::error::AuthError;
use crate::pkce::{PkceChallenge, PkceChallengeMethod, PkceVerifier};
use crate::storage::{StorageBackend, StorageError, StorageKeys};

/// Query parameters the driver constructs itself. An [`AuthorizationRequest`]
/// may not smuggle these in through `extras`.
pub const RESERVED_PARAMS: &[&str] = &[
    "response_type",
    "client_id",
    "redirect_uri",
    "scope",
    "state",
    "code_challenge",
    "code_challenge_method",
    "response_mode",
    "launch",
];

/// Where the issuer delivers the authorization response on the return URL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    /// Parameters arrive in the query string of the redirect URI.
    Query,
    /// Parameters arrive in the URL fragment. The SMART default: fragments
    /// never reach the server hosting the redirect URI.
    #[default]
    Fragment,
}

impl ResponseMode {
    /// Wire value of the `response_mode` parameter.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Fragment => "fragment",
        }
    }
}

/// The issuer returned an OAuth error on the authorization return.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Authorization error from issuer: {code}")]
pub struct AuthorizationError {
    /// OAuth error code (`access_denied`, `invalid_scope`, ...).
    pub code: String,
    /// Human-readable description, when the issuer sent one.
    pub description: Option<String>,
    /// Documentation URI, when the issuer sent one.
    pub uri: Option<String>,
}

/// The `state` on the authorization return did not match the pending
/// request. Treated as a potential forgery: the pending request is
/// discarded and the flow aborts.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("State mismatch: authorization response does not correlate with the pending request")]
pub struct StateMismatchError;

/// An authorization request about to be sent through the redirect.
///
/// A closed structure: every recognized parameter is an explicit field, and
/// free-form extension parameters go through `extras`, which is validated
/// against [`RESERVED_PARAMS`] at the boundary.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    /// OAuth client identifier.
    pub client_id: String,
    /// Redirect URI registered for the client.
    pub redirect_uri: String,
    /// Space-separated scope string.
    pub scope: String,
    /// Anti-forgery state. Generated by the driver when `None`.
    pub state: Option<String>,
    /// SMART launch parameter for EHR-initiated launches.
    pub launch: Option<String>,
    /// Response delivery mode.
    pub response_mode: ResponseMode,
    /// Free-form extension parameters appended to the authorization URL.
    pub extras: BTreeMap<String, String>,
}

impl AuthorizationRequest {
    /// Creates a request with the required parameters.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            scope: scope.into(),
            state: None,
            launch: None,
            response_mode: ResponseMode::default(),
            extras: BTreeMap::new(),
        }
    }

    /// Sets the SMART launch parameter.
    #[must_use]
    pub fn with_launch(mut self, launch: impl Into<String>) -> Self {
        self.launch = Some(launch.into());
        self
    }

    /// Sets an explicit anti-forgery state instead of a generated one.
    #[must_use]
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Sets the response delivery mode.
    #[must_use]
    pub fn with_response_mode(mut self, mode: ResponseMode) -> Self {
        self.response_mode = mode;
        self
    }

    /// Adds a free-form extension parameter.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }

    /// Validates the request at the boundary.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a required field is empty or an extra
    /// parameter shadows one of [`RESERVED_PARAMS`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client_id.is_empty() {
            return Err(ConfigError::missing_field("client_id"));
        }
        if self.redirect_uri.is_empty() {
            return Err(ConfigError::missing_field("redirect_uri"));
        }
        if let Some(key) = self.extras.keys().find(|k| RESERVED_PARAMS.contains(&k.as_str())) {
            return Err(ConfigError::reserved_parameter(key.clone()));
        }
        Ok(())
    }
}

/// The composite flow record persisted across the redirect.
///
/// Written atomically as one value immediately before navigation; consumed
/// (read once, then deleted) when the return is validated. At most one
/// exists per storage namespace at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAuthorization {
    /// Anti-replay correlation id for this request.
    pub request_id: String,
    /// PKCE secret, needed for the token exchange after return.
    pub code_verifier: String,
    /// PKCE challenge sent in the authorization URL.
    pub code_challenge: String,
    /// Anti-forgery state sent in the authorization URL.
    pub state: String,
    /// OAuth client identifier.
    pub client_id: String,
    /// Redirect URI the response must arrive on.
    pub redirect_uri: String,
    /// Requested scope.
    pub scope: String,
    /// Where the response parameters will arrive.
    pub response_mode: ResponseMode,
    /// Full pre-redirect page URL, restored after the flow completes.
    pub original_url: String,
}

/// Parse result of the return navigation's URL.
///
/// Ephemeral: exists only in memory while the return is processed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationResponse {
    /// Authorization code, on success.
    pub code: Option<String>,
    /// Round-tripped anti-forgery state.
    pub state: Option<String>,
    /// OAuth error code, on failure.
    pub error: Option<String>,
    /// Human-readable error description.
    pub error_description: Option<String>,
    /// Error documentation URI.
    pub error_uri: Option<String>,
}

impl AuthorizationResponse {
    /// Parses an authorization response out of a page URL.
    ///
    /// Unparsable URLs and URLs without response parameters both yield an
    /// empty response; the caller treats that as "no response present".
    #[must_use]
    pub fn parse(page_url: &str, mode: ResponseMode) -> Self {
        let Ok(url) = Url::parse(page_url) else {
            return Self::default();
        };
        match mode {
            ResponseMode::Query => Self::from_pairs(url.query_pairs()),
            ResponseMode::Fragment => match url.fragment() {
                Some(fragment) => {
                    Self::from_pairs(url::form_urlencoded::parse(fragment.as_bytes()))
                }
                None => Self::default(),
            },
        }
    }

    fn from_pairs<'a>(
        pairs: impl Iterator<Item = (std::borrow::Cow<'a, str>, std::borrow::Cow<'a, str>)>,
    ) -> Self {
        let mut response = Self::default();
        for (key, value) in pairs {
            let value = value.into_owned();
            match key.as_ref() {
                "code" => response.code = Some(value),
                "state" => response.state = Some(value),
                "error" => response.error = Some(value),
                "error_description" => response.error_description = Some(value),
                "error_uri" => response.error_uri = Some(value),
                _ => {}
            }
        }
        response
    }

    /// Returns `true` when the URL carried neither a code nor an error.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.code.is_none() && self.error.is_none()
    }
}

/// A validated authorization return, ready for the token exchange.
#[derive(Debug, Clone)]
pub struct ValidatedAuthorization {
    /// The authorization code to exchange.
    pub code: String,
    /// The PKCE verifier recovered from the pending record.
    pub code_verifier: String,
    /// The pre-redirect page URL to restore.
    pub original_url: String,
    /// Correlation id of the completed request.
    pub request_id: String,
}

/// Result of a completion attempt on page load.
#[derive(Debug, Clone)]
pub enum CompletionOutcome {
    /// No authorization response is present. Either nothing is pending, or
    /// the pending redirect has not happened yet.
    NoResponse,
    /// The return was validated; the pending record has been consumed.
    Validated(ValidatedAuthorization),
}

/// Navigation capability injected into the driver.
///
/// The driver never touches a browser directly; hosts implement this for
/// their environment (location assignment in a browser, opening the system
/// browser on native, a recording stub in tests).
pub trait Navigator: Send + Sync {
    /// Performs a full-page navigation to `url`. Does not return an error:
    /// in a browser context the script is about to be unloaded anyway.
    fn navigate(&self, url: &str);

    /// Replaces the current location with `url` without navigating
    /// (history replacement). Used to restore the pre-redirect URL.
    fn restore(&self, url: &str);
}

/// The redirect authorization state machine.
pub struct RedirectFlowDriver {
    storage: Arc<dyn StorageBackend>,
    navigator: Arc<dyn Navigator>,
    keys: StorageKeys,
}

impl RedirectFlowDriver {
    /// Creates a driver over the given storage, navigator and key namespace.
    #[must_use]
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        navigator: Arc<dyn Navigator>,
        keys: StorageKeys,
    ) -> Self {
        Self {
            storage,
            navigator,
            keys,
        }
    }

    /// Starts an authorization flow: persists the pending record and
    /// navigates to the authorization endpoint.
    ///
    /// Generates the PKCE verifier/challenge pair and, when the request
    /// carries none, an anti-forgery state. In a browser context the
    /// navigation unloads the script, so callers must not expect control
    /// back after this resolves; the observable effects are the storage
    /// write and the navigation.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the request fails boundary validation
    /// and a [`StorageError`] if the pending record cannot be persisted. No
    /// navigation is issued in either case.
    pub async fn perform_authorization_request(
        &self,
        service_config: &ServiceConfiguration,
        request: &AuthorizationRequest,
        current_url: &str,
    ) -> Result<(), AuthError> {
        request.validate()?;

        let verifier = PkceVerifier::generate();
        let challenge = PkceChallenge::from_verifier(&verifier);
        let state = request.state.clone().unwrap_or_else(generate_state);

        let pending = PendingAuthorization {
            request_id: uuid::Uuid::new_v4().to_string(),
            code_verifier: verifier.into_inner(),
            code_challenge: challenge.as_str().to_string(),
            state: state.clone(),
            client_id: request.client_id.clone(),
            redirect_uri: request.redirect_uri.clone(),
            scope: request.scope.clone(),
            response_mode: request.response_mode,
            original_url: current_url.to_string(),
        };
        let record = serde_json::to_string(&pending)
            .map_err(|e| StorageError::unavailable(format!("serialize pending record: {e}")))?;
        self.storage
            .set(&self.keys.pending_request(), &record)
            .await?;

        let url = build_authorization_url(service_config, request, &state, pending.code_challenge.as_str());
        tracing::debug!(
            request_id = %pending.request_id,
            endpoint = %service_config.authorization_endpoint,
            "pending authorization stored, navigating to authorization endpoint"
        );
        self.navigator.navigate(&url);
        Ok(())
    }

    /// Resumes the flow on page load, if there is anything to resume.
    ///
    /// Reads the pending record and interprets the current URL against it:
    ///
    /// - no pending record, or no response parameters in the URL: resolves
    ///   to [`CompletionOutcome::NoResponse`] (the record, if any, is kept;
    ///   the redirect may simply not have happened yet);
    /// - an `error` parameter: the record is deleted and an
    ///   [`AuthorizationError`] is returned, regardless of any `code`;
    /// - a `code` with a `state` that does not match the record: the
    ///   record is deleted and a [`StateMismatchError`] is returned;
    /// - a `code` with the matching `state`: the record is consumed and
    ///   a [`ValidatedAuthorization`] is handed back for token exchange.
    ///
    /// Consuming the record makes this idempotent: a second call after a
    /// successful validation yields `NoResponse`.
    ///
    /// # Errors
    ///
    /// [`AuthorizationError`], [`StateMismatchError`], or [`StorageError`]
    /// as described above. A pending record that no longer deserializes is
    /// removed and surfaced as a [`StorageError`].
    pub async fn complete_authorization_request_if_possible(
        &self,
        current_url: &str,
    ) -> Result<CompletionOutcome, AuthError> {
        let key = self.keys.pending_request();
        let Some(raw) = self.storage.get(&key).await? else {
            return Ok(CompletionOutcome::NoResponse);
        };

        let pending: PendingAuthorization = match serde_json::from_str(&raw) {
            Ok(pending) => pending,
            Err(e) => {
                self.storage.remove(&key).await?;
                return Err(StorageError::unavailable(format!(
                    "pending authorization record did not round-trip: {e}"
                ))
                .into());
            }
        };

        let response = AuthorizationResponse::parse(current_url, pending.response_mode);
        if response.is_empty() {
            tracing::trace!(
                request_id = %pending.request_id,
                "pending authorization present but page carries no response"
            );
            return Ok(CompletionOutcome::NoResponse);
        }

        if let Some(error) = response.error {
            self.storage.remove(&key).await?;
            tracing::debug!(
                request_id = %pending.request_id,
                error = %error,
                "authorization request rejected by issuer"
            );
            return Err(AuthorizationError {
                code: error,
                description: response.error_description,
                uri: response.error_uri,
            }
            .into());
        }

        let Some(code) = response.code else {
            return Ok(CompletionOutcome::NoResponse);
        };

        if response.state.as_deref() != Some(pending.state.as_str()) {
            self.storage.remove(&key).await?;
            tracing::warn!(
                request_id = %pending.request_id,
                "state mismatch on authorization return, discarding pending request"
            );
            return Err(StateMismatchError.into());
        }

        self.storage.remove(&key).await?;
        tracing::debug!(
            request_id = %pending.request_id,
            "authorization return validated"
        );
        Ok(CompletionOutcome::Validated(ValidatedAuthorization {
            code,
            code_verifier: pending.code_verifier,
            original_url: pending.original_url,
            request_id: pending.request_id,
        }))
    }

    /// Restores the pre-redirect URL through the navigator.
    pub fn restore_original_url(&self, original_url: &str) {
        self.navigator.restore(original_url);
    }
}

/// Generates an anti-forgery state token: 16 random bytes, base64url.
fn generate_state() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let bytes: [u8; 16] = rng.r#gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Builds the authorization URL for a request.
fn build_authorization_url(
    service_config: &ServiceConfiguration,
    request: &AuthorizationRequest,
    state: &str,
    code_challenge: &str,
) -> String {
    let mut params = url::form_urlencoded::Serializer::new(String::new());
    params.append_pair("response_type", "code");
    params.append_pair("client_id", &request.client_id);
    params.append_pair("redirect_uri", &request.redirect_uri);
    params.append_pair("scope", &request.scope);
    params.append_pair("state", state);
    params.append_pair("code_challenge", code_challenge);
    params.append_pair("code_challenge_method", PkceChallengeMethod::S256.as_str());
    params.append_pair("response_mode", request.response_mode.as_str());
    if let Some(launch) = &request.launch {
        params.append_pair("launch", launch);
    }
    for (key, value) in &request.extras {
        params.append_pair(key, value);
    }
    let query = params.finish();

    let endpoint = &service_config.authorization_endpoint;
    let separator = if endpoint.contains('?') { '&' } else { '?' };
    format!("{endpoint}{separator}{query}")
}
