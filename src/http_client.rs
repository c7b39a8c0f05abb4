use anyhow::Context;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method, Request, RequestBuilder, Response, StatusCode};
use reqwest_cookie_store::{CookieStore, CookieStoreMutex};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::auth::{Credential, RefreshCoordinator, SessionStore};
use crate::error::{AuthError, Result};

/// Cookie jar of the HTTP client, optionally kept in a JSON file
///
/// The refresh cookie lives here. Saving the jar lets the next process
/// resume the session through `/auth/refresh`.
#[derive(Clone)]
pub struct SessionCookies {
    jar: Arc<CookieStoreMutex>,
    path: Option<PathBuf>,
}

impl SessionCookies {
    /// Jar that disappears with the process
    pub fn in_memory() -> Self {
        Self {
            jar: Arc::new(CookieStoreMutex::default()),
            path: None,
        }
    }

    /// Jar saved at `path`; a missing file starts empty
    pub fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();

        let store = match File::open(&path) {
            Ok(file) => cookie_store::serde::json::load(BufReader::new(file)).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), "Ignoring unreadable cookie file: {}", e);
                CookieStore::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CookieStore::default(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to open cookie file {}", path.display()))
            }
        };

        tracing::debug!(path = %path.display(), "Loaded cookie jar");
        Ok(Self {
            jar: Arc::new(CookieStoreMutex::new(store)),
            path: Some(path),
        })
    }

    pub fn jar(&self) -> Arc<CookieStoreMutex> {
        self.jar.clone()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write the jar back to its file; in-memory jars are left alone
    ///
    /// Session cookies are written too, since the refresh cookie usually
    /// has no expiry of its own.
    pub fn save(&self) -> anyhow::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let store = self
            .jar
            .lock()
            .map_err(|_| anyhow::anyhow!("Cookie jar lock poisoned"))?;

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let file = options
            .open(path)
            .with_context(|| format!("Failed to create cookie file {}", path.display()))?;

        let mut writer = BufWriter::new(file);
        cookie_store::serde::json::save_incl_expired_and_nonpersistent(&store, &mut writer)
            .map_err(|e| anyhow::anyhow!(e))
            .with_context(|| format!("Failed to write cookie file {}", path.display()))?;
        writer.flush().context("Failed to write cookie file")?;

        tracing::debug!(path = %path.display(), "Saved cookie jar");
        Ok(())
    }
}

/// Build the shared HTTP client
///
/// The cookie jar is required: the refresh cookie set by the login
/// endpoints is replayed to `/auth/refresh` from it.
pub fn build_http_client(
    max_connections: usize,
    connect_timeout: u64,
    request_timeout: u64,
    cookies: &SessionCookies,
) -> anyhow::Result<Client> {
    Client::builder()
        .cookie_provider(cookies.jar())
        .pool_max_idle_per_host(max_connections)
        .connect_timeout(Duration::from_secs(connect_timeout))
        .timeout(Duration::from_secs(request_timeout))
        .build()
        .context("Failed to create HTTP client")
}

/// HTTP client for API calls that need the session credential
///
/// Attaches the current bearer token and, on a 401, renews the credential
/// once and repeats the request once.
#[derive(Clone)]
pub struct AuthedClient {
    /// Shared HTTP client with connection pooling and cookie jar
    client: Client,

    /// API base URL without trailing slash
    api_base: String,

    /// Credential source, read fresh for every attempt
    store: Arc<SessionStore>,

    /// Single-flight renewal shared with the scheduler
    refresher: RefreshCoordinator,
}

impl AuthedClient {
    pub fn new(
        client: Client,
        api_base: impl Into<String>,
        store: Arc<SessionStore>,
        refresher: RefreshCoordinator,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            store,
            refresher,
        }
    }

    /// Get the underlying HTTP client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Absolute URL of an API path
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if path.starts_with('/') {
            format!("{}{}", self.api_base, path)
        } else {
            format!("{}/{}", self.api_base, path)
        }
    }

    /// Start a request against an API path
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path))
    }

    /// `GET path` through `fetch_with_auth`
    pub async fn get(&self, path: &str) -> Result<Response> {
        let request = self.request(Method::GET, path).build()?;
        self.fetch_with_auth(request).await
    }

    /// Execute a request with the session credential
    ///
    /// - no credential: sent as is, a 401 is returned to the caller
    /// - 401 with a credential: one renewal, then one retry whose response
    ///   is returned whatever its status
    /// - 401 after another caller already replaced the credential: one
    ///   retry with the new credential, no renewal
    /// - renewal failed: the original 401 is returned
    ///
    /// Requests with a streaming body cannot be repeated and are sent once.
    pub async fn fetch_with_auth(&self, request: Request) -> Result<Response> {
        let request_id = Uuid::new_v4().simple().to_string()[..8].to_string();
        let method = request.method().clone();
        let url = request.url().clone();

        let retry = request.try_clone();
        if retry.is_none() {
            tracing::warn!(
                request_id = %request_id,
                url = %url,
                "Request body is not cloneable, a 401 will not be retried"
            );
        }

        let credential = self.store.credential();
        let response = self
            .execute(request, credential.as_ref(), &request_id)
            .await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        if credential.is_none() {
            tracing::debug!(
                request_id = %request_id,
                url = %url,
                "Received 401 without a credential, not refreshing"
            );
            return Ok(response);
        }

        let Some(retry) = retry else {
            return Ok(response);
        };

        let Some(current) = self.store.credential() else {
            tracing::debug!(
                request_id = %request_id,
                "Session ended while the request was in flight, not refreshing"
            );
            return Ok(response);
        };

        // Another caller renewed between send and 401
        if credential.as_ref().map(Credential::token) != Some(current.token()) {
            tracing::debug!(
                request_id = %request_id,
                url = %url,
                "Credential already renewed, retrying without refresh"
            );
            return self.execute(retry, Some(&current), &request_id).await;
        }

        tracing::warn!(
            request_id = %request_id,
            method = %method,
            url = %url,
            "Received 401, refreshing token and retrying..."
        );

        if !self.refresher.refresh().await {
            tracing::warn!(
                request_id = %request_id,
                "Token refresh failed, returning original response"
            );
            return Ok(response);
        }

        let renewed = self.store.credential();
        self.execute(retry, renewed.as_ref(), &request_id).await
    }

    async fn execute(
        &self,
        mut request: Request,
        credential: Option<&Credential>,
        request_id: &str,
    ) -> Result<Response> {
        if let Some(credential) = credential {
            let mut value = HeaderValue::from_str(&credential.bearer())
                .map_err(|e| AuthError::Parse(format!("bearer header: {}", e)))?;
            value.set_sensitive(true);
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        tracing::debug!(
            request_id = %request_id,
            method = %request.method(),
            url = %request.url(),
            authenticated = credential.is_some(),
            "Sending HTTP request"
        );

        let url = request.url().clone();
        match self.client.execute(request).await {
            Ok(response) => {
                tracing::debug!(
                    request_id = %request_id,
                    status = %response.status(),
                    "Received HTTP response"
                );
                Ok(response)
            }
            Err(e) => {
                tracing::warn!(
                    request_id = %request_id,
                    error_kind = error_kind(&e),
                    error = %e,
                    url = %url,
                    "HTTP request error"
                );
                Err(AuthError::Network(e))
            }
        }
    }
}

/// Categorize a transport error for logs
fn error_kind(e: &reqwest::Error) -> &'static str {
    if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connection_failed"
    } else if e.is_request() {
        "request_error"
    } else if e.is_body() {
        "body_error"
    } else if e.is_decode() {
        "decode_error"
    } else {
        "unknown"
    }
}
