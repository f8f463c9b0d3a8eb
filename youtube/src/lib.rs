//! OAuth token lifecycle and authenticated API client behind a YouTube analytics dashboard.
//!
//! The pieces, bottom-up:
//!
//! - [`store`]: per-user credential records and cached YouTube snapshots.
//! - [`oauth`]: the authorization-code grant against Google (consent URL, code exchange,
//!   refresh) and the redirect callback.
//! - [`credentials`]: hands out fresh access tokens, refreshing at most once per expiry per user.
//! - [`youtube_api`]: typed access to the YouTube Data and Analytics APIs with a one-shot retry on
//!   rejected tokens.
//! - [`dashboard`]: ties them together for an application.

pub mod config;
pub mod credentials;
pub mod dashboard;
pub mod error;
pub mod oauth;
pub mod store;
pub mod youtube_api;

pub use config::{ApiConfig, Config, OAuthConfig};
pub use credentials::{Clock, CredentialResolver, ManualClock, SystemClock};
pub use dashboard::Dashboard;
pub use error::{Error, Result, StorageError};
pub use oauth::redirect::CallbackParams;
pub use oauth::{OAuthClient, TokenSet};
pub use store::{CredentialRecord, JsonFileStore, MemoryStore, SnapshotStore, TokenStore};
