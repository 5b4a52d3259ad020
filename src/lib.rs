#![doc = include_str!("../README.md")]

pub mod authn;
pub mod authz;
pub mod codec;
pub mod config;
pub mod directory;
pub mod error;
pub mod identity;
pub mod provider;
pub mod service;
pub mod session;

// Re-exports for convenient access
pub use authn::{Authentication, CallbackParams, USER_ACCESS_TOKEN_KEY, USER_SETTINGS_KEY};
pub use authz::GroupsAuthorization;
pub use codec::{DecodeError, SessionRecord, TokenCodec};
pub use config::{AuthConfig, ServiceAccountConfig};
pub use directory::{DirectoryClient, GoogleDirectory, Group, GroupPage, ListGroupsParams};
pub use error::Error;
pub use identity::{AccessToken, Identity};
pub use provider::{GoogleProvider, IdentityProvider, OAuthConfig};
pub use service::{ServiceCredential, DIRECTORY_GROUP_SCOPE, DIRECTORY_USER_SCOPE};
pub use session::{CookieSession, ServerSession, SessionStore, SharedSessionRecord};
