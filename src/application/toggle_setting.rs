use crate::application::identity::{spawn_identity_listener, IdentityAware, IdentityEvent, ListenerHandle};
use crate::domain::models::{SeniorField, UserId, WritePolicy};
use crate::infrastructure::identity::IdentityProvider;
use crate::infrastructure::senior_store::SeniorStore;
use async_trait::async_trait;
use serde::Serialize;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

/// A boolean senior setting backed by one store field, together with the
/// values it takes when no document exists and after sign-out.
pub trait ToggleField: Send + Sync + 'static {
    const NAME: &'static str;
    const FIELD: SeniorField;
    const FIRST_LOAD_DEFAULT: bool;
    const LOGGED_OUT_DEFAULT: bool;
}

#[derive(Debug, Clone, Copy)]
pub struct BrainGames;

impl ToggleField for BrainGames {
    const NAME: &'static str = "brain_games";
    const FIELD: SeniorField = SeniorField::BrainGamesEnabled;
    const FIRST_LOAD_DEFAULT: bool = true;
    const LOGGED_OUT_DEFAULT: bool = false;
}

#[derive(Debug, Clone, Copy)]
pub struct HealthQuiz;

impl ToggleField for HealthQuiz {
    const NAME: &'static str = "health_quiz";
    const FIELD: SeniorField = SeniorField::HealthQuizEnabled;
    const FIRST_LOAD_DEFAULT: bool = true;
    const LOGGED_OUT_DEFAULT: bool = true;
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Unloaded,
    Loading,
    Ready,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ToggleSnapshot {
    pub value: bool,
    pub phase: Phase,
    pub owner: Option<UserId>,
}

#[derive(Debug)]
struct ToggleState {
    value: bool,
    confirmed: bool,
    phase: Phase,
    owner: Option<UserId>,
    // Bumped by every identity load and reset; writes issued under an older
    // epoch must not touch `value`.
    epoch: u64,
    write_in_flight: bool,
    pending: Option<bool>,
}

impl ToggleState {
    fn snapshot(&self) -> ToggleSnapshot {
        ToggleSnapshot {
            value: self.value,
            phase: self.phase,
            owner: self.owner.clone(),
        }
    }
}

struct Inner<F, S, I> {
    store: Arc<S>,
    identity: Arc<I>,
    state: Mutex<ToggleState>,
    events: watch::Sender<ToggleSnapshot>,
    _field: PhantomData<fn() -> F>,
}

struct WriteRequest {
    desired: bool,
    reply: oneshot::Sender<bool>,
}

enum Writer {
    Serialized(mpsc::UnboundedSender<WriteRequest>),
    Coalescing,
}

/// Resolves to `true` once the requested value is applied (or was already
/// current) and to `false` when the write failed and the value was reverted.
#[derive(Debug)]
pub struct SetValue {
    outcome: oneshot::Receiver<bool>,
}

impl Future for SetValue {
    type Output = bool;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<bool> {
        Pin::new(&mut self.outcome)
            .poll(cx)
            .map(|outcome| outcome.unwrap_or(false))
    }
}

pub struct ToggleSetting<F, S, I>
where
    F: ToggleField,
    S: SeniorStore + 'static,
    I: IdentityProvider + 'static,
{
    inner: Arc<Inner<F, S, I>>,
    writer: Writer,
    policy: WritePolicy,
    listener: Mutex<Option<ListenerHandle>>,
}

impl<F, S, I> ToggleSetting<F, S, I>
where
    F: ToggleField,
    S: SeniorStore + 'static,
    I: IdentityProvider + 'static,
{
    /// Must be called inside a Tokio runtime; the serialized policy spawns its
    /// writer task here.
    pub fn new(store: Arc<S>, identity: Arc<I>, policy: WritePolicy) -> Self {
        let state = ToggleState {
            value: F::FIRST_LOAD_DEFAULT,
            confirmed: F::FIRST_LOAD_DEFAULT,
            phase: Phase::Loading,
            owner: None,
            epoch: 0,
            write_in_flight: false,
            pending: None,
        };
        let (events, _) = watch::channel(state.snapshot());
        let inner = Arc::new(Inner {
            store,
            identity,
            state: Mutex::new(state),
            events,
            _field: PhantomData,
        });

        let writer = match policy {
            WritePolicy::Serialized => {
                let (sender, requests) = mpsc::unbounded_channel();
                tokio::spawn(run_serialized_writer(Arc::clone(&inner), requests));
                Writer::Serialized(sender)
            }
            WritePolicy::Coalescing => Writer::Coalescing,
        };

        Self {
            inner,
            writer,
            policy,
            listener: Mutex::new(None),
        }
    }

    /// Loads the value for the current identity, then follows identity
    /// changes until the setting is dropped.
    pub async fn initialize(&self) {
        let mut receiver = self.inner.identity.subscribe();
        let current = receiver.borrow_and_update().clone();
        self.inner
            .on_identity_event(IdentityEvent::from_user_id(current))
            .await;

        let handle = spawn_identity_listener(receiver, Arc::clone(&self.inner));
        let previous = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        drop(previous);
    }

    /// Re-reads the stored value for the current identity.
    pub async fn reload(&self) {
        match self.inner.identity.current_user_id() {
            Some(user_id) => self.inner.load(user_id, true).await,
            None => self.inner.reset(),
        }
    }

    /// Requests `desired`. While a load is in flight the write is held back
    /// until the loaded value is in place, so it needs `initialize` to have
    /// been called to make progress.
    pub fn set_value(&self, desired: bool) -> SetValue {
        let (reply, outcome) = oneshot::channel();
        match &self.writer {
            Writer::Serialized(sender) => {
                if let Err(rejected) = sender.send(WriteRequest { desired, reply }) {
                    warn!(setting = F::NAME, "toggle writer stopped; rejecting write");
                    let _ = rejected.0.reply.send(false);
                }
            }
            Writer::Coalescing => start_coalesced_write(&self.inner, desired, reply),
        }
        SetValue { outcome }
    }

    pub fn current_value(&self) -> bool {
        self.inner.lock_state().value
    }

    pub fn is_loading(&self) -> bool {
        self.phase() == Phase::Loading
    }

    pub fn phase(&self) -> Phase {
        self.inner.lock_state().phase
    }

    pub fn owner(&self) -> Option<UserId> {
        self.inner.lock_state().owner.clone()
    }

    pub fn snapshot(&self) -> ToggleSnapshot {
        self.inner.lock_state().snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<ToggleSnapshot> {
        self.inner.events.subscribe()
    }

    pub fn policy(&self) -> WritePolicy {
        self.policy
    }
}

impl<F, S, I> Inner<F, S, I>
where
    F: ToggleField,
    S: SeniorStore + 'static,
    I: IdentityProvider + 'static,
{
    fn lock_state(&self) -> MutexGuard<'_, ToggleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, snapshot: ToggleSnapshot) {
        self.events.send_replace(snapshot);
    }

    async fn load(&self, user_id: UserId, force: bool) {
        let epoch = {
            let mut state = self.lock_state();
            if !force && state.owner.as_deref() == Some(user_id.as_str()) {
                return;
            }
            state.phase = Phase::Loading;
            state.pending = None;
            state.epoch += 1;
            self.publish(state.snapshot());
            state.epoch
        };
        info!(setting = F::NAME, user_id = %user_id, "loading toggle");

        let fetched = self.store.get_senior_state(&user_id).await;

        let mut state = self.lock_state();
        if state.epoch != epoch {
            debug!(setting = F::NAME, user_id = %user_id, "discarding superseded load");
            return;
        }
        match fetched {
            Ok(senior) => {
                let value = senior
                    .and_then(|senior| senior.field(F::FIELD))
                    .unwrap_or(F::FIRST_LOAD_DEFAULT);
                state.value = value;
                state.confirmed = value;
            }
            Err(error) => {
                if state.owner.as_deref() != Some(user_id.as_str()) {
                    state.value = F::FIRST_LOAD_DEFAULT;
                    state.confirmed = F::FIRST_LOAD_DEFAULT;
                }
                warn!(
                    setting = F::NAME,
                    user_id = %user_id,
                    %error,
                    value = state.value,
                    "failed to load toggle; keeping fallback value"
                );
            }
        }
        state.owner = Some(user_id);
        state.phase = Phase::Ready;
        state.epoch += 1;
        self.publish(state.snapshot());
    }

    fn reset(&self) {
        let mut state = self.lock_state();
        if state.owner.is_none() && state.phase == Phase::Unloaded {
            return;
        }
        state.value = F::LOGGED_OUT_DEFAULT;
        state.confirmed = F::LOGGED_OUT_DEFAULT;
        state.owner = None;
        state.phase = Phase::Unloaded;
        state.pending = None;
        state.epoch += 1;
        self.publish(state.snapshot());
        info!(setting = F::NAME, "signed out; toggle reset");
    }

    /// Waits until the value loaded for the signed-in user is in place, so a
    /// write is never compared against a placeholder. `None` when signed out.
    async fn settled_owner(&self) -> Option<UserId> {
        let mut events = self.events.subscribe();
        loop {
            let current = self.identity.current_user_id()?;
            let settled = {
                let state = self.lock_state();
                state.phase == Phase::Ready && state.owner.as_deref() == Some(current.as_str())
            };
            if settled {
                return Some(current);
            }
            debug!(setting = F::NAME, user_id = %current, "write waiting for load");
            if events.changed().await.is_err() {
                return None;
            }
        }
    }

    async fn apply_serialized(&self, desired: bool) -> bool {
        let (user_id, previous, epoch) = loop {
            let Some(user_id) = self.settled_owner().await else {
                warn!(setting = F::NAME, desired, "rejecting write without a signed-in user");
                return false;
            };
            let mut state = self.lock_state();
            if state.phase != Phase::Ready || state.owner.as_deref() != Some(user_id.as_str()) {
                continue;
            }
            if state.value == desired {
                debug!(setting = F::NAME, desired, "value already current; skipping write");
                return true;
            }
            let previous = state.value;
            state.value = desired;
            self.publish(state.snapshot());
            break (user_id, previous, state.epoch);
        };

        match self.store.update_senior_field(&user_id, F::FIELD, desired).await {
            Ok(()) => {
                let mut state = self.lock_state();
                if state.epoch == epoch {
                    state.confirmed = desired;
                } else {
                    debug!(setting = F::NAME, user_id = %user_id, "write confirmed after identity change");
                }
                info!(setting = F::NAME, user_id = %user_id, value = desired, "toggle saved");
                true
            }
            Err(error) => {
                let mut state = self.lock_state();
                if state.epoch == epoch {
                    state.value = previous;
                    self.publish(state.snapshot());
                }
                warn!(
                    setting = F::NAME,
                    user_id = %user_id,
                    %error,
                    reverted_to = previous,
                    "toggle write failed"
                );
                false
            }
        }
    }

    /// Writes `first`, then keeps writing whatever request was stashed while
    /// the previous write (or the initial load) was in flight. Reports the
    /// outcome of the last iteration it ran.
    async fn drain_coalesced(&self, first: bool) -> bool {
        let mut next = first;
        loop {
            let Some(user_id) = self.settled_owner().await else {
                let mut state = self.lock_state();
                state.pending = None;
                state.write_in_flight = false;
                warn!(setting = F::NAME, "signed out while draining; dropping pending write");
                return false;
            };
            let epoch = {
                let mut state = self.lock_state();
                if state.phase != Phase::Ready || state.owner.as_deref() != Some(user_id.as_str()) {
                    continue;
                }
                if let Some(pending) = state.pending.take() {
                    next = pending;
                }
                if state.value == next {
                    debug!(setting = F::NAME, desired = next, "value already current; skipping write");
                    state.write_in_flight = false;
                    return true;
                }
                state.value = next;
                self.publish(state.snapshot());
                state.epoch
            };

            let result = self.store.update_senior_field(&user_id, F::FIELD, next).await;

            let mut state = self.lock_state();
            match result {
                Ok(()) => {
                    info!(setting = F::NAME, user_id = %user_id, value = next, "toggle saved");
                    let settled = if state.epoch == epoch {
                        state.confirmed = next;
                        next
                    } else {
                        state.value
                    };
                    match state.pending.take() {
                        Some(pending) if pending != settled => next = pending,
                        _ => {
                            state.write_in_flight = false;
                            return true;
                        }
                    }
                }
                Err(error) => {
                    state.pending = None;
                    state.write_in_flight = false;
                    if state.epoch == epoch {
                        state.value = state.confirmed;
                        self.publish(state.snapshot());
                    }
                    warn!(
                        setting = F::NAME,
                        user_id = %user_id,
                        %error,
                        reverted_to = state.value,
                        "toggle write failed"
                    );
                    return false;
                }
            }
        }
    }
}

#[async_trait]
impl<F, S, I> IdentityAware for Inner<F, S, I>
where
    F: ToggleField,
    S: SeniorStore + 'static,
    I: IdentityProvider + 'static,
{
    async fn on_identity_event(&self, event: IdentityEvent) {
        match event {
            IdentityEvent::SignedIn(user_id) => self.load(user_id, false).await,
            IdentityEvent::SignedOut => self.reset(),
        }
    }
}

async fn run_serialized_writer<F, S, I>(
    inner: Arc<Inner<F, S, I>>,
    mut requests: mpsc::UnboundedReceiver<WriteRequest>,
) where
    F: ToggleField,
    S: SeniorStore + 'static,
    I: IdentityProvider + 'static,
{
    while let Some(request) = requests.recv().await {
        let outcome = inner.apply_serialized(request.desired).await;
        let _ = request.reply.send(outcome);
    }
    debug!(setting = F::NAME, "toggle writer stopped");
}

fn start_coalesced_write<F, S, I>(inner: &Arc<Inner<F, S, I>>, desired: bool, reply: oneshot::Sender<bool>)
where
    F: ToggleField,
    S: SeniorStore + 'static,
    I: IdentityProvider + 'static,
{
    let Some(current) = inner.identity.current_user_id() else {
        warn!(setting = F::NAME, desired, "rejecting write without a signed-in user");
        let _ = reply.send(false);
        return;
    };

    {
        let mut state = inner.lock_state();
        if state.write_in_flight {
            debug!(setting = F::NAME, desired, "write in flight; replacing pending value");
            state.pending = Some(desired);
            let _ = reply.send(true);
            return;
        }
        let settled = state.phase == Phase::Ready && state.owner.as_deref() == Some(current.as_str());
        if settled && state.value == desired {
            debug!(setting = F::NAME, desired, "value already current; skipping write");
            let _ = reply.send(true);
            return;
        }
        // Until the load settles the drain waits; later requests stash as pending.
        state.write_in_flight = true;
    }

    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        let outcome = inner.drain_coalesced(desired).await;
        let _ = reply.send(outcome);
    });
}
