//! Credential exchange and identity resolution
//!
//! This module performs the OAuth exchange that precedes every broker
//! session:
//!
//! 1. [`AuthClient::login`] exchanges [`Credentials`] for an [`AuthToken`]
//!    (password or client-credentials grant, selected by
//!    [`LoginMechanism`]).
//! 2. [`AuthClient::fetch_identity`] resolves the [`Identity`] (user and
//!    organization) the token belongs to.
//! 3. [`AuthSession`] bundles both for the lifetime of one connection.
//!
//! There is no refresh path. A token that expires mid-session surfaces as
//! an authorization failure on the next RPC and the caller reconnects.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use platform_events::auth::{AuthSession, Credentials, LoginMechanism};
//!
//! # async fn example() -> platform_events::error::Result<()> {
//! let credentials = Credentials {
//!     mechanism: LoginMechanism::Password,
//!     endpoint: "https://login.salesforce.com".to_string(),
//!     client_id: "client".to_string(),
//!     client_secret: "secret".to_string(),
//!     username: "user@example.com".to_string(),
//!     password: "hunter2".to_string(),
//! };
//! let http = Arc::new(reqwest::Client::new());
//! let session = AuthSession::establish(http, &credentials, Duration::from_secs(5)).await?;
//! println!("org: {}", session.identity().organization_id);
//! # Ok(())
//! # }
//! ```

pub mod session;
pub mod types;

pub use session::{AuthClient, AuthSession, LOGIN_PATH, USER_INFO_PATH};
pub use types::{AuthToken, Credentials, Identity, LoginMechanism};
