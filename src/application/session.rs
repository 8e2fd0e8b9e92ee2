use crate::application::monthly_calendar::MonthlyCalendarService;
use crate::application::toggle_setting::{BrainGames, HealthQuiz, ToggleSetting};
use crate::domain::models::SeniorField;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::identity::IdentityProvider;
use crate::infrastructure::senior_store::SeniorStore;
use std::sync::Arc;
use tracing::info;

/// The per-process set of senior-facing state: both toggles and the monthly
/// calendar, sharing one store and one identity source.
pub struct CheckInSession<S, I>
where
    S: SeniorStore + 'static,
    I: IdentityProvider + 'static,
{
    pub brain_games: ToggleSetting<BrainGames, S, I>,
    pub health_quiz: ToggleSetting<HealthQuiz, S, I>,
    pub calendar: MonthlyCalendarService<S, I>,
}

impl<S, I> CheckInSession<S, I>
where
    S: SeniorStore + 'static,
    I: IdentityProvider + 'static,
{
    /// Must be called inside a Tokio runtime.
    pub fn new(store: Arc<S>, identity: Arc<I>, config: &AppConfig) -> Self {
        Self {
            brain_games: ToggleSetting::new(
                Arc::clone(&store),
                Arc::clone(&identity),
                config.write_policy(SeniorField::BrainGamesEnabled),
            ),
            health_quiz: ToggleSetting::new(
                Arc::clone(&store),
                Arc::clone(&identity),
                config.write_policy(SeniorField::HealthQuizEnabled),
            ),
            calendar: MonthlyCalendarService::new(store, identity, config.timezone),
        }
    }

    pub async fn initialize(&self) {
        tokio::join!(self.brain_games.initialize(), self.health_quiz.initialize());
        info!(
            brain_games = self.brain_games.current_value(),
            health_quiz = self.health_quiz.current_value(),
            "check-in session initialized"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::toggle_setting::Phase;
    use crate::domain::models::{SeniorState, WritePolicy};
    use crate::infrastructure::identity::InMemoryIdentityProvider;
    use crate::infrastructure::senior_store::InMemorySeniorStore;

    #[tokio::test]
    async fn session_follows_configured_policies_and_loads_both_toggles() {
        let store = Arc::new(InMemorySeniorStore::default());
        store
            .put_senior_state(
                "senior-1",
                SeniorState {
                    start_date: None,
                    brain_games_enabled: Some(false),
                    health_quiz_enabled: None,
                },
            )
            .expect("seed state");
        let identity = Arc::new(InMemoryIdentityProvider::new(Some("senior-1".to_string())));
        let config = AppConfig {
            health_quiz_policy: WritePolicy::Coalescing,
            timezone: chrono_tz::Asia::Tokyo,
            ..AppConfig::default()
        };

        let session = CheckInSession::new(store, identity, &config);
        session.initialize().await;

        assert_eq!(session.brain_games.policy(), WritePolicy::Serialized);
        assert_eq!(session.health_quiz.policy(), WritePolicy::Coalescing);
        assert_eq!(session.calendar.time_zone(), chrono_tz::Asia::Tokyo);
        assert_eq!(session.brain_games.phase(), Phase::Ready);
        assert!(!session.brain_games.current_value());
        assert!(session.health_quiz.current_value());
    }

    #[tokio::test]
    async fn toggles_share_the_store_document() {
        let store = Arc::new(InMemorySeniorStore::default());
        let identity = Arc::new(InMemoryIdentityProvider::new(Some("senior-1".to_string())));
        let session = CheckInSession::new(Arc::clone(&store), identity, &AppConfig::default());
        session.initialize().await;

        assert!(session.brain_games.set_value(false).await);
        assert!(session.health_quiz.set_value(false).await);

        let state = store
            .get_senior_state("senior-1")
            .await
            .expect("read")
            .expect("document exists");
        assert_eq!(state.brain_games_enabled, Some(false));
        assert_eq!(state.health_quiz_enabled, Some(false));
    }
}
