//! Read-only access to the bearer credential issued by the external auth
//! service. The token is obtained per operation and never mutated by the chat
//! layer; it is valid for the duration of the authenticated session and is
//! revoked on logout (the provider starts returning `None`).

use std::sync::RwLock;

/// Source of the bearer token used for REST calls and the broker handshake.
///
/// Injected into the API client and each connection session at construction so
/// no component reads ambient global state.
pub trait TokenProvider: Send + Sync {
    /// The current bearer token, or `None` when the user is logged out.
    fn bearer_token(&self) -> Option<String>;
}

/// A provider over a token slot the host application updates on login/logout.
#[derive(Debug, Default)]
pub struct StaticTokenProvider {
    token: RwLock<Option<String>>,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn set(&self, token: impl Into<String>) {
        *self.token.write().expect("token lock poisoned") = Some(token.into());
    }

    /// Revoke the credential; subsequent reads return `None`.
    pub fn clear(&self) {
        *self.token.write().expect("token lock poisoned") = None;
    }
}

impl TokenProvider for StaticTokenProvider {
    fn bearer_token(&self) -> Option<String> {
        self.token.read().expect("token lock poisoned").clone()
    }
}
