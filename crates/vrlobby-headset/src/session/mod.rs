pub mod coordinator;
pub mod watchdog;

pub use coordinator::{CoordinatorConfig, RECONNECT_BACKOFF, SessionCoordinator};
