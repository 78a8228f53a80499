use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info};
use url::Url;

use super::types::{AuthToken, Credentials, Identity};
use crate::error::{Error, Result};

/// Path of the OAuth token endpoint, relative to the login endpoint.
pub const LOGIN_PATH: &str = "/services/oauth2/token";

/// Path of the OAuth user info endpoint, relative to the login endpoint.
pub const USER_INFO_PATH: &str = "/services/oauth2/userinfo";

/// HTTP client for the OAuth token and user info endpoints.
///
/// Every call is bounded by the timeout passed to it; a timeout, transport
/// failure, or non-200 status all surface as [`Error::Auth`].
#[derive(Debug, Clone)]
pub struct AuthClient {
    http: Arc<Client>,
}

impl AuthClient {
    /// Creates a client that shares the given HTTP connection pool.
    pub fn new(http: Arc<Client>) -> Self {
        Self { http }
    }

    /// Exchanges credentials for a bearer token.
    ///
    /// Sends a form-encoded POST to `{endpoint}/services/oauth2/token` with
    /// the grant selected by `credentials.mechanism`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] on transport errors, timeouts, non-200
    /// responses, or an unparseable body.
    pub async fn login(&self, credentials: &Credentials, timeout: Duration) -> Result<AuthToken> {
        let mut params: HashMap<&str, &str> = HashMap::new();
        params.insert("grant_type", credentials.mechanism.grant_type());
        params.insert("client_id", &credentials.client_id);
        params.insert("client_secret", &credentials.client_secret);
        if credentials.mechanism.requires_user_credentials() {
            params.insert("username", &credentials.username);
            params.insert("password", &credentials.password);
        }

        let url = endpoint_url(&credentials.endpoint, LOGIN_PATH)?;
        debug!(url = %url, mechanism = credentials.mechanism.as_str(), "Requesting access token");

        let resp = self
            .http
            .post(url)
            .timeout(timeout)
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::Auth(format!("token request failed: {e}")))?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            return Err(Error::Auth(format!(
                "non-200 status code returned on OAuth authentication call: {}",
                status.as_u16()
            )));
        }

        let token: AuthToken = resp
            .json()
            .await
            .map_err(|e| Error::Auth(format!("failed to parse token response: {e}")))?;

        info!(instance_url = %token.instance_url, "Authenticated");
        Ok(token)
    }

    /// Resolves the user and organization behind a token.
    ///
    /// Sends a GET to `{endpoint}/services/oauth2/userinfo` with
    /// `Authorization: Bearer <token>`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] under the same conditions as [`Self::login`].
    pub async fn fetch_identity(
        &self,
        endpoint: &str,
        token: &AuthToken,
        timeout: Duration,
    ) -> Result<Identity> {
        let url = endpoint_url(endpoint, USER_INFO_PATH)?;

        let resp = self
            .http
            .get(url)
            .timeout(timeout)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(|e| Error::Auth(format!("user info request failed: {e}")))?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            return Err(Error::Auth(format!(
                "non-200 status code returned on OAuth user info call: {}",
                status.as_u16()
            )));
        }

        let identity: Identity = resp
            .json()
            .await
            .map_err(|e| Error::Auth(format!("failed to parse user info response: {e}")))?;

        debug!(
            user_id = %identity.user_id,
            organization_id = %identity.organization_id,
            "Resolved identity"
        );
        Ok(identity)
    }
}

/// Token and identity for one connection.
///
/// Created once at connect time and dropped on reconnect.
#[derive(Debug, Clone)]
pub struct AuthSession {
    token: AuthToken,
    identity: Identity,
}

impl AuthSession {
    /// Logs in and resolves the identity in one step.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] if either exchange fails.
    pub async fn establish(
        http: Arc<Client>,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<Self> {
        let client = AuthClient::new(http);
        let token = client.login(credentials, timeout).await?;
        let identity = client
            .fetch_identity(&credentials.endpoint, &token, timeout)
            .await?;
        Ok(Self { token, identity })
    }

    /// Builds a session from parts that were obtained elsewhere.
    pub fn from_parts(token: AuthToken, identity: Identity) -> Self {
        Self { token, identity }
    }

    /// The bearer token.
    pub fn token(&self) -> &AuthToken {
        &self.token
    }

    /// The resolved identity.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }
}

/// Appends `path` to the endpoint's own path.
fn endpoint_url(endpoint: &str, path: &str) -> Result<Url> {
    let mut url = Url::parse(endpoint)
        .map_err(|e| Error::Auth(format!("invalid OAuth endpoint {endpoint}: {e}")))?;
    let base = url.path().trim_end_matches('/').to_string();
    url.set_path(&format!("{base}{path}"));
    Ok(url)
}
