//! Credential lifecycle: the in-memory store and the refresh exchange.

pub mod credentials;
pub mod oauth;

pub use credentials::{Credential, CredentialStore, TokenGrant};
pub use oauth::OAuthClient;
