use crate::domain::models::UserId;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityEvent {
    SignedIn(UserId),
    SignedOut,
}

impl IdentityEvent {
    pub fn from_user_id(user_id: Option<UserId>) -> Self {
        match user_id
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
        {
            Some(user_id) => Self::SignedIn(user_id),
            None => Self::SignedOut,
        }
    }
}

#[async_trait]
pub trait IdentityAware: Send + Sync {
    async fn on_identity_event(&self, event: IdentityEvent);
}

/// Owns the listener task; dropping the handle unsubscribes.
#[derive(Debug)]
pub struct ListenerHandle {
    task: JoinHandle<()>,
}

impl ListenerHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Forwards identity changes to `handler`, one event at a time and in
/// emission order. The value already marked seen on `receiver` is not
/// replayed, and repeated emissions of the same identity are dropped.
pub fn spawn_identity_listener<H>(
    mut receiver: watch::Receiver<Option<UserId>>,
    handler: Arc<H>,
) -> ListenerHandle
where
    H: IdentityAware + 'static,
{
    let task = tokio::spawn(async move {
        let mut last_event = IdentityEvent::from_user_id(receiver.borrow().clone());
        while receiver.changed().await.is_ok() {
            let event = IdentityEvent::from_user_id(receiver.borrow_and_update().clone());
            if event == last_event {
                continue;
            }
            debug!(?event, "identity changed");
            handler.on_identity_event(event.clone()).await;
            last_event = event;
        }
        debug!("identity source closed; listener stopped");
    });
    ListenerHandle { task }
}
