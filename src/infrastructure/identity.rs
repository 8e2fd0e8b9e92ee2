use crate::domain::models::UserId;
use tokio::sync::watch;

/// Source of the signed-in user. `subscribe` yields the latest identity and is
/// woken on every sign-in and sign-out.
pub trait IdentityProvider: Send + Sync {
    fn current_user_id(&self) -> Option<UserId>;
    fn subscribe(&self) -> watch::Receiver<Option<UserId>>;
}

#[derive(Debug)]
pub struct InMemoryIdentityProvider {
    sender: watch::Sender<Option<UserId>>,
}

impl InMemoryIdentityProvider {
    pub fn new(initial: Option<UserId>) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    pub fn sign_in(&self, user_id: impl Into<UserId>) {
        self.sender.send_replace(Some(user_id.into()));
    }

    pub fn sign_out(&self) {
        self.sender.send_replace(None);
    }
}

impl Default for InMemoryIdentityProvider {
    fn default() -> Self {
        Self::new(None)
    }
}

impl IdentityProvider for InMemoryIdentityProvider {
    fn current_user_id(&self) -> Option<UserId> {
        self.sender.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<UserId>> {
        self.sender.subscribe()
    }
}
