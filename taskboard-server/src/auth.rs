//! Authentication collaborator.
//!
//! The server never issues tokens; it only asks an [`Authenticator`] to map a
//! presented token to a user. [`StaticTokenAuthenticator`] is the in-process
//! implementation backed by the `[[auth.users]]` table of the config file.

use std::collections::HashMap;

use taskboard_proto::presence::UserRef;

/// Errors returned when a credential cannot be verified.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No token was presented.
    #[error("access denied: no token provided")]
    MissingToken,
    /// The token is unknown or expired.
    #[error("invalid token")]
    InvalidToken,
    /// The first frame on a connection was not an authentication request.
    #[error("expected an authentication request")]
    NotAuthenticated,
}

/// Verifies session tokens and lists the users known to the board.
pub trait Authenticator: Send + Sync {
    /// Maps a session token to the user it was issued for.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] if the token is missing or not recognised.
    fn verify(&self, token: &str) -> Result<UserRef, AuthError>;

    /// Returns every known user, sorted by id, each listed once.
    fn users(&self) -> Vec<UserRef>;
}

/// Token table held in memory.
#[derive(Debug, Default, Clone)]
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, UserRef>,
}

impl StaticTokenAuthenticator {
    /// Creates an authenticator that accepts no tokens.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the authenticator with `token` mapped to `user`.
    #[must_use]
    pub fn with_user(mut self, token: impl Into<String>, user: UserRef) -> Self {
        self.tokens.insert(token.into(), user);
        self
    }

    /// Number of configured tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns `true` if no tokens are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl FromIterator<(String, UserRef)> for StaticTokenAuthenticator {
    fn from_iter<I: IntoIterator<Item = (String, UserRef)>>(iter: I) -> Self {
        Self {
            tokens: iter.into_iter().collect(),
        }
    }
}

impl Authenticator for StaticTokenAuthenticator {
    fn verify(&self, token: &str) -> Result<UserRef, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        self.tokens
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }

    fn users(&self) -> Vec<UserRef> {
        let mut users: Vec<UserRef> = self.tokens.values().cloned().collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        users.dedup_by(|a, b| a.id == b.id);
        users
    }
}
