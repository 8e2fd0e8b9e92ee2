pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::bootstrap::{bootstrap_workspace, BootstrapResult};
pub use application::monthly_calendar::{MonthlyCalendarService, RetryPolicy};
pub use application::session::CheckInSession;
pub use application::toggle_setting::{
    BrainGames, HealthQuiz, Phase, SetValue, ToggleField, ToggleSetting, ToggleSnapshot,
};
pub use domain::calendar::{aggregate_month, DayStatus, MonthView, MonthlyMetrics};
pub use domain::models::{CheckInRecord, SeniorField, SeniorState, UserId, WritePolicy};
pub use infrastructure::error::InfraError;
