//! HTTP binding for a GoTrue-compatible auth API and a PostgREST profile table.
//!
//! One [`reqwest::Client`] is built per factory and shared by every client it
//! connects and by the profile repository. The session blob is written to the
//! client's bound adapter under the configured storage key, as the hosted
//! browser client does.

use super::{
    read_session_blob, settle_refresh, types::unix_now, write_session_blob, AuthEvent,
    AuthProvider, Credentials, EventHandler, HandlerSlot, Identity, ProviderFactory, Session,
};
use crate::{
    config::AuthConfig,
    error::{ProfileLoadError, ProviderError},
    profile::{Profile, ProfileRepository},
    storage::{StorageAdapter, StorageMode},
    BoxFuture, APP_USER_AGENT,
};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tracing::{debug, info_span, Instrument};
use url::Url;
use uuid::Uuid;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const PGRST_OBJECT: &str = "application/vnd.pgrst.object+json";

#[derive(Deserialize)]
struct UserResponse {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
}

impl From<UserResponse> for Identity {
    fn from(user: UserResponse) -> Self {
        Self {
            id: user.id,
            email: user.email.unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    expires_at: Option<u64>,
    user: UserResponse,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let expires_at = self
            .expires_at
            .or_else(|| self.expires_in.map(|ttl| unix_now() + ttl));
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_type: self.token_type.unwrap_or_else(|| "bearer".to_string()),
            expires_at,
            user: self.user.into(),
        }
    }
}

/// Tokens carried in the fragment of a recovery redirect link.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RecoveryTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: Option<u64>,
    pub token_type: String,
}

/// Parses `...#access_token=..&refresh_token=..&expires_in=..&type=recovery`.
/// An error fragment (`#error=..&error_code=..&error_description=..`) becomes
/// the matching [`ProviderError`].
pub fn parse_recovery_link(link: &str) -> Result<RecoveryTokens, ProviderError> {
    let invalid = || {
        ProviderError::new("Email link is invalid or has expired")
            .with_code("otp_expired")
            .with_status(403)
    };
    let url = Url::parse(link).map_err(|_| invalid())?;
    let fragment = url.fragment().ok_or_else(invalid)?;
    let params: HashMap<String, String> = url::form_urlencoded::parse(fragment.as_bytes())
        .into_owned()
        .collect();

    if let Some(error) = params.get("error") {
        let message = params
            .get("error_description")
            .cloned()
            .unwrap_or_else(|| error.clone());
        let code = params.get("error_code").unwrap_or(error);
        return Err(ProviderError::new(message).with_code(code.clone()));
    }
    if params.get("type").map(String::as_str) != Some("recovery") {
        return Err(invalid());
    }

    let access_token = params.get("access_token").cloned().ok_or_else(invalid)?;
    let refresh_token = params.get("refresh_token").cloned().ok_or_else(invalid)?;
    Ok(RecoveryTokens {
        access_token,
        refresh_token,
        expires_in: params.get("expires_in").and_then(|ttl| ttl.parse().ok()),
        token_type: params
            .get("token_type")
            .cloned()
            .unwrap_or_else(|| "bearer".to_string()),
    })
}

/// Turns a non-success response body into a [`ProviderError`].
///
/// GoTrue puts the machine code in `error_code` (older versions in `code` or
/// `error`) and the text in `msg`, `message` or `error_description`.
fn error_from_body(status: StatusCode, body: &Value) -> ProviderError {
    let text = |key: &str| body[key].as_str().map(ToString::to_string);
    let message = text("msg")
        .or_else(|| text("message"))
        .or_else(|| text("error_description"))
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });
    let code = text("error_code")
        .or_else(|| text("code"))
        .or_else(|| text("error"));

    let err = ProviderError::new(message).with_status(status.as_u16());
    match code {
        Some(code) => err.with_code(code),
        None => err,
    }
}

fn transport_error(err: &reqwest::Error) -> ProviderError {
    let error = ProviderError::new(err.to_string()).with_code("network_error");
    match err.status() {
        Some(status) => error.with_status(status.as_u16()),
        None => error,
    }
}

async fn read_json(response: Response) -> Result<Value, ProviderError> {
    let status = response.status();
    let bytes = response.bytes().await.map_err(|err| transport_error(&err))?;
    let body: Value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    if status.is_success() {
        Ok(body)
    } else {
        Err(error_from_body(status, &body))
    }
}

fn decode<T: for<'de> Deserialize<'de>>(body: Value) -> Result<T, ProviderError> {
    serde_json::from_value(body).map_err(|err| {
        ProviderError::new(format!("unexpected response from auth provider: {err}"))
            .with_code("unexpected_response")
    })
}

/// Shared HTTP plumbing: base URL, project key and the pooled client.
#[derive(Clone)]
struct Endpoint {
    http: Client,
    base: Url,
    api_key: SecretString,
}

impl Endpoint {
    fn url(&self, path: &str) -> Result<Url, ProviderError> {
        self.base.join(path).map_err(|err| {
            ProviderError::new(format!("invalid provider URL: {err}")).with_code("config_error")
        })
    }

    /// Request with the project key; `bearer` defaults to the key as well.
    fn request(&self, method: Method, url: Url, bearer: Option<&str>) -> RequestBuilder {
        let key = self.api_key.expose_secret();
        self.http
            .request(method, url)
            .header("apikey", key)
            .bearer_auth(bearer.unwrap_or(key))
    }

    async fn send(&self, request: RequestBuilder, path: &str) -> Result<Value, ProviderError> {
        let span = info_span!("auth.http", http.path = %path);
        async {
            let response = request.send().await.map_err(|err| transport_error(&err))?;
            debug!(status = response.status().as_u16(), "provider responded");
            read_json(response).await
        }
        .instrument(span)
        .await
    }
}

/// Auth client bound to one storage adapter.
pub struct HttpProvider {
    endpoint: Endpoint,
    storage: Arc<dyn StorageAdapter>,
    storage_key: String,
    handler: HandlerSlot,
}

impl HttpProvider {
    async fn stored_session(&self) -> Result<Option<Session>, ProviderError> {
        let Some(session) = read_session_blob(self.storage.as_ref(), &self.storage_key).await?
        else {
            return Ok(None);
        };
        if !session.is_expired() {
            return Ok(Some(session));
        }
        let refreshed = self.refresh_session(&session.refresh_token).await;
        settle_refresh(
            self.storage.as_ref(),
            &self.storage_key,
            &self.handler,
            refreshed,
        )
        .await
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, ProviderError> {
        let mut url = self.endpoint.url("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "refresh_token");
        let request = self
            .endpoint
            .request(Method::POST, url, None)
            .json(&json!({ "refresh_token": refresh_token }));
        let body = self.endpoint.send(request, "auth/v1/token").await?;
        Ok(decode::<TokenResponse>(body)?.into_session())
    }

    async fn store_and_emit(&self, session: Session, event: AuthEvent) -> Result<(), ProviderError> {
        write_session_blob(self.storage.as_ref(), &self.storage_key, &session).await?;
        self.handler.emit(event);
        Ok(())
    }

    async fn fetch_user(&self, access_token: &str) -> Result<Identity, ProviderError> {
        let url = self.endpoint.url("auth/v1/user")?;
        let request = self.endpoint.request(Method::GET, url, Some(access_token));
        let body = self.endpoint.send(request, "auth/v1/user").await?;
        Ok(decode::<UserResponse>(body)?.into())
    }
}

impl AuthProvider for HttpProvider {
    fn storage_mode(&self) -> StorageMode {
        self.storage.mode()
    }

    /// When the project auto-confirms accounts the response already carries a
    /// session; it is stored and announced like a sign-in.
    fn sign_up<'a>(
        &'a self,
        credentials: &'a Credentials,
    ) -> BoxFuture<'a, Result<(), ProviderError>> {
        Box::pin(async move {
            let url = self.endpoint.url("auth/v1/signup")?;
            let payload = json!({
                "email": credentials.email,
                "password": credentials.password.expose_secret(),
            });
            let request = self.endpoint.request(Method::POST, url, None).json(&payload);
            let body = self.endpoint.send(request, "auth/v1/signup").await?;

            if body.get("access_token").is_some() {
                let session = decode::<TokenResponse>(body)?.into_session();
                return self
                    .store_and_emit(session.clone(), AuthEvent::signed_in(session))
                    .await;
            }
            Ok(())
        })
    }

    fn sign_in_with_password<'a>(
        &'a self,
        credentials: &'a Credentials,
    ) -> BoxFuture<'a, Result<(), ProviderError>> {
        Box::pin(async move {
            let mut url = self.endpoint.url("auth/v1/token")?;
            url.query_pairs_mut().append_pair("grant_type", "password");
            let payload = json!({
                "email": credentials.email,
                "password": credentials.password.expose_secret(),
            });
            let request = self.endpoint.request(Method::POST, url, None).json(&payload);
            let body = self.endpoint.send(request, "auth/v1/token").await?;

            let session = decode::<TokenResponse>(body)?.into_session();
            self.store_and_emit(session.clone(), AuthEvent::signed_in(session))
                .await
        })
    }

    fn reset_password_for_email<'a>(
        &'a self,
        email: &'a str,
        redirect_to: &'a str,
    ) -> BoxFuture<'a, Result<(), ProviderError>> {
        Box::pin(async move {
            let mut url = self.endpoint.url("auth/v1/recover")?;
            url.query_pairs_mut().append_pair("redirect_to", redirect_to);
            let request = self
                .endpoint
                .request(Method::POST, url, None)
                .json(&json!({ "email": email }));
            self.endpoint.send(request, "auth/v1/recover").await?;
            Ok(())
        })
    }

    fn update_user<'a>(
        &'a self,
        password: &'a SecretString,
    ) -> BoxFuture<'a, Result<(), ProviderError>> {
        Box::pin(async move {
            let mut session = self.stored_session().await?.ok_or_else(|| {
                ProviderError::new("Auth session missing!")
                    .with_code("session_not_found")
                    .with_status(401)
            })?;

            let url = self.endpoint.url("auth/v1/user")?;
            let request = self
                .endpoint
                .request(Method::PUT, url, Some(&session.access_token))
                .json(&json!({ "password": password.expose_secret() }));
            let body = self.endpoint.send(request, "auth/v1/user").await?;

            session.user = decode::<UserResponse>(body)?.into();
            self.store_and_emit(
                session.clone(),
                AuthEvent::identity_refreshed(Some(session)),
            )
            .await
        })
    }

    /// Revokes the session server side, then drops it locally. A session the
    /// server no longer knows about still counts as signed out.
    fn sign_out(&self) -> BoxFuture<'_, Result<(), ProviderError>> {
        Box::pin(async move {
            if let Some(session) = self.stored_session().await? {
                let url = self.endpoint.url("auth/v1/logout")?;
                let request = self
                    .endpoint
                    .request(Method::POST, url, Some(&session.access_token));
                match self.endpoint.send(request, "auth/v1/logout").await {
                    Ok(_) => {}
                    Err(err) if matches!(err.status, Some(401 | 403 | 404)) => {
                        debug!("session already revoked: {}", err.message);
                    }
                    Err(err) => return Err(err),
                }
            }
            self.storage.remove(&self.storage_key).await?;
            self.handler.emit(AuthEvent::signed_out());
            Ok(())
        })
    }

    fn get_session(&self) -> BoxFuture<'_, Result<Option<Session>, ProviderError>> {
        Box::pin(self.stored_session())
    }

    fn exchange_recovery_link<'a>(
        &'a self,
        link: &'a str,
    ) -> BoxFuture<'a, Result<(), ProviderError>> {
        Box::pin(async move {
            let tokens = parse_recovery_link(link)?;
            let user = self.fetch_user(&tokens.access_token).await?;
            let session = Session {
                access_token: tokens.access_token,
                refresh_token: tokens.refresh_token,
                token_type: tokens.token_type,
                expires_at: tokens.expires_in.map(|ttl| unix_now() + ttl),
                user,
            };
            self.store_and_emit(session.clone(), AuthEvent::recovery_started(session))
                .await
        })
    }

    fn discard_stored_session(&self) -> BoxFuture<'_, Result<(), ProviderError>> {
        Box::pin(async move {
            self.storage.remove(&self.storage_key).await?;
            Ok(())
        })
    }

    fn on_event(&self, handler: EventHandler) {
        self.handler.set(handler);
    }

    fn detach(&self) {
        self.handler.clear();
    }
}

/// Connects [`HttpProvider`]s sharing one HTTP client.
pub struct HttpProviderFactory {
    endpoint: Endpoint,
    storage_key: String,
}

impl HttpProviderFactory {
    /// # Errors
    /// Fails when no provider URL is configured or the HTTP client cannot be
    /// built.
    pub fn new(config: &AuthConfig) -> Result<Self, ProviderError> {
        let mut base = config.provider_url().cloned().ok_or_else(|| {
            ProviderError::new("no auth provider URL configured").with_code("config_error")
        })?;
        // `Url::join` replaces the last segment of a base without a trailing slash.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| transport_error(&err))?;

        Ok(Self {
            endpoint: Endpoint {
                http,
                base,
                api_key: config.api_key().clone(),
            },
            storage_key: config.storage_key().to_string(),
        })
    }

    /// Profile repository on the same backend and HTTP client.
    #[must_use]
    pub fn profiles(&self) -> HttpProfileRepository {
        HttpProfileRepository {
            endpoint: self.endpoint.clone(),
        }
    }
}

impl ProviderFactory for HttpProviderFactory {
    fn connect(&self, storage: Arc<dyn StorageAdapter>) -> Arc<dyn AuthProvider> {
        Arc::new(HttpProvider {
            endpoint: self.endpoint.clone(),
            storage,
            storage_key: self.storage_key.clone(),
            handler: HandlerSlot::default(),
        })
    }
}

/// Reads rows of the `profiles` table.
pub struct HttpProfileRepository {
    endpoint: Endpoint,
}

impl ProfileRepository for HttpProfileRepository {
    fn fetch_by_id<'a>(
        &'a self,
        id: Uuid,
        access_token: &'a str,
    ) -> BoxFuture<'a, Result<Profile, ProfileLoadError>> {
        Box::pin(async move {
            let mut url = self
                .endpoint
                .url("rest/v1/profiles")
                .map_err(|err| ProfileLoadError::Request(err.message))?;
            url.query_pairs_mut()
                .append_pair("id", &format!("eq.{id}"))
                .append_pair("select", "*");
            let request = self
                .endpoint
                .request(Method::GET, url, Some(access_token))
                .header(reqwest::header::ACCEPT, PGRST_OBJECT);

            match self.endpoint.send(request, "rest/v1/profiles").await {
                Ok(body) => serde_json::from_value(body)
                    .map_err(|err| ProfileLoadError::Decode(err.to_string())),
                // Object mode answers 406 when the filter matched no row.
                Err(err) if matches!(err.status, Some(404 | 406)) => {
                    Err(ProfileLoadError::NotFound(id))
                }
                Err(err) => Err(ProfileLoadError::Request(err.message)),
            }
        })
    }
}
