//! Authentication provider.

use tasksync_core::UserId;
use tokio::sync::watch;
use tracing::info;

/// Source of the currently signed-in user.
pub trait AuthProvider: Send + Sync {
    /// Returns the signed-in user, if any.
    fn current_user(&self) -> Option<UserId>;

    /// Returns a receiver that observes sign-in and sign-out.
    fn watch(&self) -> watch::Receiver<Option<UserId>>;

    /// Returns true if `user_id` currently has a session.
    fn is_signed_in_as(&self, user_id: &UserId) -> bool {
        self.current_user().as_ref() == Some(user_id)
    }
}

/// A single-session authentication provider.
///
/// Hosts call [`SessionAuth::sign_in`] and [`SessionAuth::sign_out`] as the
/// real identity service reports session changes.
///
/// # Example
///
/// ```rust
/// use tasksync_core::UserId;
/// use tasksync_remote::{AuthProvider, SessionAuth};
///
/// let auth = SessionAuth::new();
/// assert!(auth.current_user().is_none());
///
/// auth.sign_in(UserId::new("alice"));
/// assert!(auth.is_signed_in_as(&UserId::new("alice")));
/// ```
#[derive(Debug)]
pub struct SessionAuth {
    session: watch::Sender<Option<UserId>>,
}

impl SessionAuth {
    /// Creates a provider with nobody signed in.
    pub fn new() -> Self {
        let (session, _) = watch::channel(None);
        Self { session }
    }

    /// Creates a provider with `user_id` already signed in.
    pub fn signed_in(user_id: UserId) -> Self {
        let (session, _) = watch::channel(Some(user_id));
        Self { session }
    }

    /// Starts a session for `user_id`, replacing any previous one.
    pub fn sign_in(&self, user_id: UserId) {
        info!(user = %user_id, "signed in");
        self.session.send_replace(Some(user_id));
    }

    /// Ends the current session.
    pub fn sign_out(&self) {
        if let Some(user) = self.session.send_replace(None) {
            info!(user = %user, "signed out");
        }
    }
}

impl Default for SessionAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthProvider for SessionAuth {
    fn current_user(&self) -> Option<UserId> {
        self.session.borrow().clone()
    }

    fn watch(&self) -> watch::Receiver<Option<UserId>> {
        self.session.subscribe()
    }
}
