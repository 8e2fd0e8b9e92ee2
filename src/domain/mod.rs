pub mod calendar;
pub mod models;
