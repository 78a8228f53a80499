use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// OAuth grant used to obtain a bearer token.
///
/// Selected by name from configuration; every mechanism yields the same
/// [`AuthToken`] shape.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoginMechanism {
    /// Resource-owner password grant (client id/secret + username/password)
    #[default]
    Password,
    /// Client-credentials grant (client id/secret only)
    ClientCredentials,
}

impl LoginMechanism {
    /// Returns the `grant_type` form value for this mechanism.
    pub fn grant_type(&self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::ClientCredentials => "client_credentials",
        }
    }

    /// Returns the configuration name of this mechanism.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::ClientCredentials => "client_credentials",
        }
    }

    /// Whether the mechanism sends a username and password.
    pub fn requires_user_credentials(&self) -> bool {
        matches!(self, Self::Password)
    }
}

impl FromStr for LoginMechanism {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "password" => Ok(Self::Password),
            "client_credentials" => Ok(Self::ClientCredentials),
            other => Err(Error::Config(format!(
                "unsupported login mechanism: {}",
                other
            ))),
        }
    }
}

/// Input to the credential exchange. Never persisted.
#[derive(Clone)]
pub struct Credentials {
    /// Grant used for the exchange
    pub mechanism: LoginMechanism,
    /// Base URL of the OAuth server (e.g. `https://login.salesforce.com`)
    pub endpoint: String,
    /// Connected app client id
    pub client_id: String,
    /// Connected app client secret
    pub client_secret: String,
    /// Username (password grant only)
    pub username: String,
    /// Password (password grant only)
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("mechanism", &self.mechanism)
            .field("endpoint", &self.endpoint)
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Bearer token returned by the OAuth token endpoint.
///
/// No expiry is tracked; see the module docs.
#[derive(Clone, Deserialize)]
pub struct AuthToken {
    /// Bearer token sent on every subsequent call
    pub access_token: String,
    /// Instance the token is bound to
    pub instance_url: String,
    /// Identity URL of the authenticated user
    #[serde(default)]
    pub id: String,
    /// Usually `Bearer`
    #[serde(default)]
    pub token_type: String,
    /// Issue time in epoch milliseconds, as sent by the server
    #[serde(default)]
    pub issued_at: String,
    /// Server signature over `id` and `issued_at`
    #[serde(default)]
    pub signature: String,
}

impl AuthToken {
    /// Parses `issued_at` into a UTC timestamp when it is well formed.
    pub fn issued_at_time(&self) -> Option<DateTime<Utc>> {
        self.issued_at
            .parse::<i64>()
            .ok()
            .and_then(DateTime::from_timestamp_millis)
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("access_token", &"***")
            .field("instance_url", &self.instance_url)
            .field("token_type", &self.token_type)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// User and organization the token belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Identity {
    /// User id
    pub user_id: String,
    /// Organization (tenant) id
    pub organization_id: String,
}
