pub mod error;
pub mod event_log;
pub mod paths;
pub mod settings;
pub mod snapshot;
pub mod state_store;
