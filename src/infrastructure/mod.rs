pub mod config;
pub mod error;
pub mod identity;
pub mod logging;
pub mod senior_store;
pub mod sqlite_store;
pub mod storage;
