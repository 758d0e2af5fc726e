//! Session orchestration.
//!
//! Sequences discovery, the redirect driver, the token exchange and the
//! identity-token decode into the two entry points applications actually
//! use: the one-shot [`smart_auth`] function and the long-lived
//! [`SmartSession`] object.
//!
//! A page load always takes one of two paths. On the resume path a pending
//! authorization is completed: the code is exchanged, the identity token
//! decoded, the SMART context and service map assembled, the pre-redirect
//! URL restored, and the composed response returned. On the start path a
//! fresh authorization is persisted and the navigator is pointed at the
//! issuer; in a browser host the script context ends there, and the next
//! page load takes the resume path.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::AuthResult;
use crate::config::{ConfigError, SmartAuthOptions};
use crate::discovery::{DiscoveryClient, ServiceConfiguration};
use crate::id_token::IdTokenClaims;
use crate::redirect::{
    AuthorizationRequest, CompletionOutcome, Navigator, RedirectFlowDriver,
};
use crate::requestor::{HttpRequestor, ReqwestRequestor};
use crate::storage::{StorageBackend, StorageKeys};
use crate::token::{
    GrantType, RevokeTokenRequest, TokenClient, TokenRequest, TokenResponse,
};

/// An operation that needs a token was invoked before one was obtained.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("No token available: complete the authorization flow first")]
pub struct NoTokenError;

/// SMART launch context assembled after a completed flow.
///
/// `patient`, `encounter`, `need_patient_banner` and `smart_style_url` come
/// from the token response body; `fhir_user` comes from the decoded
/// identity token. The two sources are not cross-validated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmartContext {
    /// Patient in context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient: Option<String>,

    /// Encounter in context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encounter: Option<String>,

    /// FHIR resource reference for the authenticated user.
    #[serde(
        rename = "fhirUser",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub fhir_user: Option<String>,

    /// Whether the app should render a patient banner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub need_patient_banner: Option<bool>,

    /// URL to SMART styling information.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smart_style_url: Option<String>,
}

impl SmartContext {
    /// Projects the context out of a token response and decoded identity
    /// token.
    #[must_use]
    pub fn from_token(token: &TokenResponse, id_token: Option<&IdTokenClaims>) -> Self {
        Self {
            patient: token.patient().map(str::to_string),
            encounter: token.encounter().map(str::to_string),
            fhir_user: id_token.and_then(|claims| claims.fhir_user.clone()),
            need_patient_banner: token.need_patient_banner(),
            smart_style_url: token.smart_style_url().map(str::to_string),
        }
    }
}

/// The composed result of a completed authorization flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartAuthResponse {
    /// The bearer access token.
    pub access_token: String,

    /// Decoded identity-token claims, when the response carried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<IdTokenClaims>,

    /// SMART capabilities advertised by the issuer.
    pub capabilities: Vec<String>,

    /// SMART launch context.
    pub context: SmartContext,

    /// Service discovery map: capability key to base URL.
    pub services: BTreeMap<String, String>,
}

/// What one `authorize` call did.
#[derive(Debug, Clone)]
pub enum SessionOutcome {
    /// A fresh authorization was started and the navigator was invoked.
    /// In a browser host the page is about to unload; nothing more will
    /// happen in this script context.
    Redirected,
    /// A pending authorization was completed.
    Completed(SmartAuthResponse),
}

/// Endpoint configuration plus the SMART discovery extras, resolved once
/// per session object.
#[derive(Debug, Clone)]
struct ResolvedServices {
    config: ServiceConfiguration,
    capabilities: Vec<String>,
    services: BTreeMap<String, String>,
}

/// Builder for [`SmartSession`].
pub struct SmartSessionBuilder {
    options: SmartAuthOptions,
    storage: Option<Arc<dyn StorageBackend>>,
    navigator: Option<Arc<dyn Navigator>>,
    requestor: Option<Arc<dyn HttpRequestor>>,
    key_prefix: Option<String>,
    endpoints: Option<ServiceConfiguration>,
}

impl SmartSessionBuilder {
    /// Sets the storage backend (required).
    #[must_use]
    pub fn storage(mut self, storage: Arc<dyn StorageBackend>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Sets the navigator (required).
    #[must_use]
    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Sets the HTTP transport. Defaults to [`ReqwestRequestor`].
    #[must_use]
    pub fn requestor(mut self, requestor: Arc<dyn HttpRequestor>) -> Self {
        self.requestor = Some(requestor);
        self
    }

    /// Sets the storage key prefix. Defaults to
    /// [`StorageKeys::DEFAULT_PREFIX`].
    #[must_use]
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Supplies endpoints directly, skipping discovery entirely. With
    /// direct endpoints the capabilities list and service map come back
    /// empty.
    #[must_use]
    pub fn endpoints(mut self, endpoints: ServiceConfiguration) -> Self {
        self.endpoints = Some(endpoints);
        self
    }

    /// Builds the session.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the options fail boundary validation or
    /// a required collaborator is missing.
    pub fn build(self) -> Result<SmartSession, ConfigError> {
        self.options.validate()?;
        let storage = self.storage.ok_or(ConfigError::missing_field("storage"))?;
        let navigator = self
            .navigator
            .ok_or(ConfigError::missing_field("navigator"))?;
        let requestor = self
            .requestor
            .unwrap_or_else(|| Arc::new(ReqwestRequestor::with_defaults()));
        let keys = self
            .key_prefix
            .map(StorageKeys::new)
            .unwrap_or_default();

        Ok(SmartSession {
            options: self.options,
            storage,
            navigator,
            requestor,
            keys,
            endpoints: self.endpoints,
            resolved: RwLock::new(None),
            token: RwLock::new(None),
        })
    }
}

/// A long-lived SMART authorization session.
///
/// Holds the resolved endpoint configuration and, once a flow completes,
/// the token response. All methods take `&self`; the token is behind a
/// lock so the session can be shared behind an `Arc`.
pub struct SmartSession {
    options: SmartAuthOptions,
    storage: Arc<dyn StorageBackend>,
    navigator: Arc<dyn Navigator>,
    requestor: Arc<dyn HttpRequestor>,
    keys: StorageKeys,
    endpoints: Option<ServiceConfiguration>,
    resolved: RwLock<Option<ResolvedServices>>,
    token: RwLock<Option<TokenResponse>>,
}

impl SmartSession {
    /// Starts building a session for the given options.
    #[must_use]
    pub fn builder(options: SmartAuthOptions) -> SmartSessionBuilder {
        SmartSessionBuilder {
            options,
            storage: None,
            navigator: None,
            requestor: None,
            key_prefix: None,
            endpoints: None,
        }
    }

    /// Runs one authorization pass for the current page load: resume the
    /// pending flow if the URL completes one, otherwise start a fresh flow
    /// and navigate away.
    ///
    /// # Errors
    ///
    /// Any flow error: discovery, storage, issuer rejection, state
    /// mismatch, token exchange, or identity-token decode failure.
    pub async fn authorize(&self, current_url: &str) -> AuthResult<SessionOutcome> {
        if let Some(response) = self.resume(current_url).await? {
            return Ok(SessionOutcome::Completed(response));
        }
        self.start(current_url).await?;
        Ok(SessionOutcome::Redirected)
    }

    /// The resume entry point: completes a pending authorization when the
    /// current URL carries its response, and returns `None` otherwise
    /// without side effects.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`authorize`](Self::authorize), minus the
    /// start-path ones.
    pub async fn resume(&self, current_url: &str) -> AuthResult<Option<SmartAuthResponse>> {
        let driver = self.driver();
        let validated = match driver
            .complete_authorization_request_if_possible(current_url)
            .await?
        {
            CompletionOutcome::NoResponse => return Ok(None),
            CompletionOutcome::Validated(validated) => validated,
        };

        let resolved = self.resolve_services().await?;
        let token_client = TokenClient::new(self.requestor.clone());
        let token = token_client
            .perform_token_request(
                &resolved.config,
                &TokenRequest {
                    client_id: self.options.client_id.clone(),
                    redirect_uri: self.options.redirect_uri.clone(),
                    grant_type: GrantType::AuthorizationCode,
                    code: validated.code,
                    code_verifier: validated.code_verifier,
                },
            )
            .await?;

        // Absence of an identity token is tolerated; a malformed one is not.
        let id_token = match &token.id_token {
            Some(raw) => Some(crate::id_token::decode_id_token(raw)?),
            None => None,
        };
        let context = SmartContext::from_token(&token, id_token.as_ref());

        self.cache_token(&token).await;
        *self.token.write().await = Some(token.clone());

        driver.restore_original_url(&validated.original_url);
        tracing::debug!(request_id = %validated.request_id, "authorization flow completed");

        Ok(Some(SmartAuthResponse {
            access_token: token.access_token,
            id_token,
            capabilities: resolved.capabilities,
            context,
            services: resolved.services,
        }))
    }

    /// The start entry point: persists a fresh pending authorization and
    /// navigates to the authorization endpoint.
    ///
    /// # Errors
    ///
    /// Discovery, validation, or storage failures; no navigation happens
    /// when one is returned.
    pub async fn start(&self, current_url: &str) -> AuthResult<()> {
        let resolved = self.resolve_services().await?;

        let mut request = AuthorizationRequest::new(
            self.options.client_id.clone(),
            self.options.redirect_uri.clone(),
            self.options.scope.clone(),
        )
        .with_response_mode(self.options.response_mode);
        if let Some(launch) = &self.options.launch {
            request = request.with_launch(launch.clone());
        }
        request.extras = self.options.extras.clone();

        self.driver()
            .perform_authorization_request(&resolved.config, &request, current_url)
            .await
    }

    /// Ensures the session holds a token: reuses the in-memory or cached
    /// one unless `force` is set, completes a pending flow when the URL
    /// carries one, and otherwise starts a fresh flow.
    ///
    /// After this resolves, either [`token`](Self::token) is `Some` or the
    /// navigator was pointed at the issuer.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`authorize`](Self::authorize).
    pub async fn init(&self, force: bool, current_url: &str) -> AuthResult<()> {
        if force {
            self.storage.remove(&self.keys.cached_token()).await?;
            *self.token.write().await = None;
        } else {
            if self.token.read().await.is_some() {
                return Ok(());
            }
            if let Some(raw) = self.storage.get(&self.keys.cached_token()).await? {
                match serde_json::from_str::<TokenResponse>(&raw) {
                    Ok(cached) => {
                        tracing::debug!("reusing cached token response");
                        *self.token.write().await = Some(cached);
                        return Ok(());
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "cached token did not parse, discarding");
                        self.storage.remove(&self.keys.cached_token()).await?;
                    }
                }
            }
        }
        self.authorize(current_url).await.map(|_| ())
    }

    /// The token response held by this session, if any.
    pub async fn token(&self) -> Option<TokenResponse> {
        self.token.read().await.clone()
    }

    /// Decodes the identity token of the held token response.
    ///
    /// # Errors
    ///
    /// [`NoTokenError`] when no token is held or the held response carries
    /// no identity token; an [`IdTokenError`](crate::id_token::IdTokenError)
    /// when the identity token does not decode.
    pub async fn decode_id_token(&self) -> AuthResult<IdTokenClaims> {
        let guard = self.token.read().await;
        let token = guard.as_ref().ok_or(NoTokenError)?;
        let raw = token.id_token.as_ref().ok_or(NoTokenError)?;
        Ok(crate::id_token::decode_id_token(raw)?)
    }

    /// Revokes a token, best-effort. Failures, including failure to
    /// resolve the revocation endpoint, are logged and swallowed.
    pub async fn revoke(&self, token: &str) {
        let resolved = match self.resolve_services().await {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::warn!(error = %e, "cannot resolve revocation endpoint, skipping revocation");
                return;
            }
        };
        TokenClient::new(self.requestor.clone())
            .perform_revoke_token_request(
                &resolved.config,
                &RevokeTokenRequest::access_token(token, self.options.client_id.clone()),
            )
            .await;
    }

    /// Injects `Authorization: Bearer <token>` into an outgoing request.
    ///
    /// # Errors
    ///
    /// With no token held the request is refused rather than sent
    /// unauthenticated, and a warning is logged.
    pub async fn authorize_request(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> AuthResult<reqwest::RequestBuilder> {
        let header = self.bearer_header().await.map_err(|e| {
            tracing::warn!(
                "a request was made before authorization finished; refusing to send it unauthenticated"
            );
            e
        })?;
        Ok(builder.header(reqwest::header::AUTHORIZATION, header))
    }

    /// The `Authorization` header value for the held token.
    ///
    /// # Errors
    ///
    /// [`NoTokenError`] when no token is held.
    pub async fn bearer_header(&self) -> AuthResult<String> {
        let guard = self.token.read().await;
        let token = guard.as_ref().ok_or(NoTokenError)?;
        Ok(format!("Bearer {}", token.access_token))
    }

    fn driver(&self) -> RedirectFlowDriver {
        RedirectFlowDriver::new(
            self.storage.clone(),
            self.navigator.clone(),
            self.keys.clone(),
        )
    }

    /// Persists the token response for later `init` calls. Caching is
    /// best-effort; a flow that completed should not fail because the
    /// cache write did.
    async fn cache_token(&self, token: &TokenResponse) {
        match serde_json::to_string(token) {
            Ok(raw) => {
                if let Err(e) = self.storage.set(&self.keys.cached_token(), &raw).await {
                    tracing::warn!(error = %e, "failed to cache token response");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize token response for caching");
            }
        }
    }

    /// Resolves endpoints once per session: direct endpoints when supplied,
    /// otherwise SMART discovery against the effective issuer.
    async fn resolve_services(&self) -> AuthResult<ResolvedServices> {
        if let Some(resolved) = self.resolved.read().await.clone() {
            return Ok(resolved);
        }

        let resolved = match &self.endpoints {
            Some(config) => ResolvedServices {
                config: config.clone(),
                capabilities: Vec::new(),
                services: BTreeMap::new(),
            },
            None => {
                let issuer = self.effective_issuer().await?;
                let document = DiscoveryClient::new(self.requestor.clone())
                    .fetch_from_issuer(&issuer)
                    .await?;
                ResolvedServices {
                    config: document.service_configuration(),
                    capabilities: document.capabilities.clone(),
                    services: document.service_map(),
                }
            }
        };

        *self.resolved.write().await = Some(resolved.clone());
        Ok(resolved)
    }

    /// The issuer to discover against: the configured one (persisted for
    /// later invocations), or the one persisted by the most recent
    /// invocation that supplied it; the return leg of the redirect usually
    /// arrives without launch parameters.
    async fn effective_issuer(&self) -> AuthResult<String> {
        match &self.options.iss {
            Some(iss) => {
                self.storage
                    .set(&self.keys.original_issuer(), iss)
                    .await?;
                Ok(iss.clone())
            }
            None => match self.storage.get(&self.keys.original_issuer()).await? {
                Some(iss) => {
                    tracing::debug!(issuer = %iss, "using issuer persisted by a previous invocation");
                    Ok(iss)
                }
                None => Err(ConfigError::MissingIssuer.into()),
            },
        }
    }
}

/// One-shot convenience: builds a session with the default transport and
/// runs a single authorization pass.
///
/// # Errors
///
/// Same failure modes as [`SmartSession::authorize`].
pub async fn smart_auth(
    options: SmartAuthOptions,
    storage: Arc<dyn StorageBackend>,
    navigator: Arc<dyn Navigator>,
    current_url: &str,
) -> AuthResult<SessionOutcome> {
    SmartSession::builder(options)
        .storage(storage)
        .navigator(navigator)
        .build()?
        .authorize(current_url)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthError;
    use crate::requestor::{HttpResponse, RequestorError};
    use crate::storage::MemoryStorage;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNavigator {
        navigations: Mutex<Vec<String>>,
        restorations: Mutex<Vec<String>>,
    }

    impl Navigator for RecordingNavigator {
        fn navigate(&self, url: &str) {
            self.navigations.lock().unwrap().push(url.to_string());
        }

        fn restore(&self, url: &str) {
            self.restorations.lock().unwrap().push(url.to_string());
        }
    }

    /// Serves canned responses keyed by URL prefix.
    #[derive(Default)]
    struct RoutingRequestor {
        routes: HashMap<String, HttpResponse>,
    }

    impl RoutingRequestor {
        fn route(mut self, prefix: &str, status: u16, body: &str) -> Self {
            self.routes.insert(
                prefix.to_string(),
                HttpResponse {
                    status,
                    body: body.to_string(),
                },
            );
            self
        }

        fn lookup(&self, url: &str) -> Result<HttpResponse, RequestorError> {
            self.routes
                .iter()
                .find(|(prefix, _)| url.starts_with(prefix.as_str()))
                .map(|(_, response)| response.clone())
                .ok_or_else(|| RequestorError::network(format!("no route for {url}")))
        }
    }

    #[async_trait]
    impl HttpRequestor for RoutingRequestor {
        async fn get_json(&self, url: &str) -> Result<HttpResponse, RequestorError> {
            self.lookup(url)
        }

        async fn post_form(
            &self,
            url: &str,
            _params: &[(&str, &str)],
        ) -> Result<HttpResponse, RequestorError> {
            self.lookup(url)
        }
    }

    const DISCOVERY_BODY: &str = r#"{
        "authorization_endpoint": "https://ehr.example/authorize",
        "token_endpoint": "https://ehr.example/token",
        "revocation_endpoint": "https://ehr.example/revoke",
        "capabilities": ["launch-ehr"],
        "services": { "org.fhir.rest": { "baseUrl": "https://ehr.example/fhir/r4" } }
    }"#;

    fn session_with(
        options: SmartAuthOptions,
        storage: Arc<MemoryStorage>,
        requestor: Arc<dyn HttpRequestor>,
    ) -> (SmartSession, Arc<RecordingNavigator>) {
        let navigator = Arc::new(RecordingNavigator::default());
        let session = SmartSession::builder(options)
            .storage(storage)
            .navigator(navigator.clone())
            .requestor(requestor)
            .build()
            .unwrap();
        (session, navigator)
    }

    fn discovery_requestor() -> Arc<RoutingRequestor> {
        Arc::new(RoutingRequestor::default().route(
            "https://ehr.example/fhir/.well-known/",
            200,
            DISCOVERY_BODY,
        ))
    }

    #[tokio::test]
    async fn test_fresh_load_starts_flow_and_redirects() {
        let storage = Arc::new(MemoryStorage::new());
        let options = SmartAuthOptions::new("app1", "https://app.example/cb", "openid")
            .with_issuer("https://ehr.example/fhir");
        let (session, navigator) = session_with(options, storage.clone(), discovery_requestor());

        let outcome = session.authorize("https://app.example/?page=1").await.unwrap();
        assert!(matches!(outcome, SessionOutcome::Redirected));
        assert_eq!(navigator.navigations.lock().unwrap().len(), 1);
        assert!(session.token().await.is_none());
    }

    #[tokio::test]
    async fn test_issuer_fallback_from_storage() {
        let storage = Arc::new(MemoryStorage::new());

        // First invocation supplies the issuer and persists it.
        let options = SmartAuthOptions::new("app1", "https://app.example/cb", "openid")
            .with_issuer("https://ehr.example/fhir");
        let (session, _navigator) = session_with(options, storage.clone(), discovery_requestor());
        session.authorize("https://app.example/").await.unwrap();

        // A later invocation without the issuer discovers against the
        // persisted one.
        let options = SmartAuthOptions::new("app1", "https://app.example/cb", "openid");
        let (session, navigator) = session_with(options, storage, discovery_requestor());
        let outcome = session.authorize("https://app.example/").await.unwrap();
        assert!(matches!(outcome, SessionOutcome::Redirected));
        assert!(!navigator.navigations.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_issuer_with_empty_storage_fails() {
        let storage = Arc::new(MemoryStorage::new());
        let options = SmartAuthOptions::new("app1", "https://app.example/cb", "openid");
        let (session, _navigator) =
            session_with(options, storage, Arc::new(RoutingRequestor::default()));

        let result = session.authorize("https://app.example/").await;
        assert!(matches!(
            result,
            Err(AuthError::Config(ConfigError::MissingIssuer))
        ));
    }

    #[tokio::test]
    async fn test_direct_endpoints_skip_discovery() {
        let storage = Arc::new(MemoryStorage::new());
        let options = SmartAuthOptions::new("app1", "https://app.example/cb", "openid");
        let navigator = Arc::new(RecordingNavigator::default());
        // No discovery route configured: resolution must not hit the network.
        let session = SmartSession::builder(options)
            .storage(storage)
            .navigator(navigator.clone())
            .requestor(Arc::new(RoutingRequestor::default()))
            .endpoints(ServiceConfiguration::from_endpoints(
                "https://direct.example/authorize",
                "https://direct.example/token",
                "https://direct.example/revoke",
            ))
            .build()
            .unwrap();

        let outcome = session.authorize("https://app.example/").await.unwrap();
        assert!(matches!(outcome, SessionOutcome::Redirected));
        let navigations = navigator.navigations.lock().unwrap();
        assert!(navigations[0].starts_with("https://direct.example/authorize?"));
    }

    #[tokio::test]
    async fn test_bearer_injection_requires_token() {
        let storage = Arc::new(MemoryStorage::new());
        let options = SmartAuthOptions::new("app1", "https://app.example/cb", "openid");
        let (session, _navigator) =
            session_with(options, storage, Arc::new(RoutingRequestor::default()));

        let builder = reqwest::Client::new().get("https://ehr.example/fhir/r4/Patient");
        let result = session.authorize_request(builder).await;
        assert!(matches!(result, Err(AuthError::NoToken(_))));

        let result = session.bearer_header().await;
        assert!(matches!(result, Err(AuthError::NoToken(_))));
    }

    #[tokio::test]
    async fn test_decode_id_token_requires_token() {
        let storage = Arc::new(MemoryStorage::new());
        let options = SmartAuthOptions::new("app1", "https://app.example/cb", "openid");
        let (session, _navigator) =
            session_with(options, storage, Arc::new(RoutingRequestor::default()));

        let result = session.decode_id_token().await;
        assert!(matches!(result, Err(AuthError::NoToken(_))));
    }

    #[tokio::test]
    async fn test_init_reuses_cached_token() {
        let storage = Arc::new(MemoryStorage::new());
        let cached = r#"{"access_token": "cached-tok", "token_type": "Bearer"}"#;
        storage
            .set(&StorageKeys::default().cached_token(), cached)
            .await
            .unwrap();

        let options = SmartAuthOptions::new("app1", "https://app.example/cb", "openid");
        let (session, navigator) =
            session_with(options, storage, Arc::new(RoutingRequestor::default()));

        session.init(false, "https://app.example/").await.unwrap();
        assert_eq!(
            session.token().await.map(|t| t.access_token),
            Some("cached-tok".to_string())
        );
        assert_eq!(
            session.bearer_header().await.unwrap(),
            "Bearer cached-tok"
        );
        // No flow was started.
        assert!(navigator.navigations.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_init_force_discards_cached_token() {
        let storage = Arc::new(MemoryStorage::new());
        let cached = r#"{"access_token": "cached-tok", "token_type": "Bearer"}"#;
        storage
            .set(&StorageKeys::default().cached_token(), cached)
            .await
            .unwrap();

        let options = SmartAuthOptions::new("app1", "https://app.example/cb", "openid")
            .with_issuer("https://ehr.example/fhir");
        let (session, navigator) =
            session_with(options, storage.clone(), discovery_requestor());

        session.init(true, "https://app.example/").await.unwrap();
        // Cache discarded, no token held, a fresh flow was started instead.
        assert!(session.token().await.is_none());
        assert!(
            storage
                .get(&StorageKeys::default().cached_token())
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(navigator.navigations.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_revoke_without_resolvable_endpoint_is_swallowed() {
        let storage = Arc::new(MemoryStorage::new());
        let options = SmartAuthOptions::new("app1", "https://app.example/cb", "openid");
        let (session, _navigator) =
            session_with(options, storage, Arc::new(RoutingRequestor::default()));

        // No issuer configured or persisted: revocation cannot even resolve
        // its endpoint, and still must not error.
        session.revoke("tok1").await;
    }
}
