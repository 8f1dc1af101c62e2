pub mod api;
pub mod hub;

pub use api::{ApiError, ManagementApi};
pub use hub::{HubSignal, SignalingChannel, TransportPreference};
