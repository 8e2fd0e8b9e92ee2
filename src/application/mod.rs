pub mod bootstrap;
pub mod identity;
pub mod monthly_calendar;
pub mod session;
pub mod toggle_setting;
