use crate::domain::calendar::{aggregate_month, MonthView, MonthlyMetrics};
use crate::domain::models::UserId;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::identity::IdentityProvider;
use crate::infrastructure::senior_store::SeniorStore;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::time::{sleep, Duration as TokioDuration};
use tracing::{debug, info, warn};

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u8,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
        }
    }
}

pub struct MonthlyCalendarService<S, I>
where
    S: SeniorStore,
    I: IdentityProvider,
{
    store: Arc<S>,
    identity: Arc<I>,
    time_zone: Tz,
    retry_policy: RetryPolicy,
    now_provider: NowProvider,
    latest: Mutex<Option<(UserId, MonthlyMetrics)>>,
}

impl<S, I> MonthlyCalendarService<S, I>
where
    S: SeniorStore,
    I: IdentityProvider,
{
    pub fn new(store: Arc<S>, identity: Arc<I>, time_zone: Tz) -> Self {
        Self {
            store,
            identity,
            time_zone,
            retry_policy: RetryPolicy::default(),
            now_provider: Arc::new(Utc::now),
            latest: Mutex::new(None),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn time_zone(&self) -> Tz {
        self.time_zone
    }

    pub fn today(&self) -> NaiveDate {
        (self.now_provider)().with_timezone(&self.time_zone).date_naive()
    }

    pub fn current_month(&self) -> MonthView {
        MonthView::containing(self.today())
    }

    pub async fn load_current_month(&self) -> Result<MonthlyMetrics, InfraError> {
        self.load_month(self.current_month()).await
    }

    /// Fetches the senior's start date and every check-in that can fall in the
    /// local month, then aggregates them. The store is keyed by UTC month, so a
    /// zone offset can pull in the neighbouring UTC month as well. The result
    /// replaces the previously kept snapshot.
    pub async fn load_month(&self, view: MonthView) -> Result<MonthlyMetrics, InfraError> {
        let user_id = self
            .identity
            .current_user_id()
            .ok_or(InfraError::NotAuthenticated)?;
        debug!(%user_id, year = view.year(), month = view.month(), "loading monthly calendar");

        let state = self
            .with_retry("get_senior_state", || self.store.get_senior_state(&user_id))
            .await?;
        let mut records = Vec::new();
        for utc_month in view.utc_months(&self.time_zone) {
            let fetched = self
                .with_retry("get_check_ins_for_month", || {
                    self.store
                        .get_check_ins_for_month(&user_id, utc_month.year(), utc_month.month())
                })
                .await?;
            records.extend(fetched);
        }

        let start_date = state
            .as_ref()
            .and_then(|state| state.start_day(&self.time_zone));
        let metrics = aggregate_month(&records, start_date, view, self.today(), &self.time_zone);
        info!(
            %user_id,
            year = metrics.year,
            month = metrics.month,
            total_check_ins = metrics.total_check_ins,
            success_rate_percent = metrics.success_rate_percent,
            "monthly calendar loaded"
        );

        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) =
            Some((user_id, metrics.clone()));
        Ok(metrics)
    }

    /// Last loaded snapshot, if it belongs to the current identity.
    pub fn latest(&self) -> Option<MonthlyMetrics> {
        let current = self.identity.current_user_id()?;
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|(owner, _)| *owner == current)
            .map(|(_, metrics)| metrics.clone())
    }

    async fn with_retry<T, F, Fut>(&self, operation_name: &str, mut operation: F) -> Result<T, InfraError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, InfraError>>,
    {
        let max_attempts = self.retry_policy.max_attempts.max(1);
        let mut attempt: u8 = 0;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() && attempt + 1 < max_attempts => {
                    let delay = self
                        .retry_policy
                        .base_delay_ms
                        .saturating_mul(2u64.saturating_pow(attempt as u32));
                    warn!(operation = operation_name, attempt, delay_ms = delay, %error, "retrying store read");
                    sleep(TokioDuration::from_millis(delay)).await;
                    attempt = attempt.saturating_add(1);
                }
                Err(error) => return Err(error),
            }
        }
    }
}
