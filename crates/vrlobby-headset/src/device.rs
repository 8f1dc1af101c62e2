//! Platform device queries and the periodic status upload.
//!
//! Battery and WiFi introspection is platform glue provided by the hosting
//! build; the default implementation reports fixed values so the client runs
//! unmodified on a dev box.

use std::sync::Arc;
use std::time::Duration;

use vrlobby_protocol::HeadsetStatus;

use crate::network::ManagementApi;

pub const STATUS_UPLOAD_INTERVAL: Duration = Duration::from_secs(60);

pub trait DeviceInfo: Send + Sync {
    fn headset_name(&self) -> String;
    fn wifi_ssid(&self) -> String;
    fn battery_percent(&self) -> u8;

    fn status(&self) -> HeadsetStatus {
        HeadsetStatus {
            headset_name: self.headset_name(),
            wifi_name: self.wifi_ssid(),
            battery_level: self.battery_percent().to_string(),
        }
    }
}

/// Fallback device info for builds without platform bindings.
pub struct StaticDeviceInfo {
    name: String,
}

impl StaticDeviceInfo {
    pub fn new(name_override: Option<String>) -> Self {
        let name = name_override
            .or_else(|| std::env::var("HOSTNAME").ok())
            .unwrap_or_else(|| "vr-headset".to_string());
        Self { name }
    }
}

impl DeviceInfo for StaticDeviceInfo {
    fn headset_name(&self) -> String {
        self.name.clone()
    }

    fn wifi_ssid(&self) -> String {
        "unknown".to_string()
    }

    fn battery_percent(&self) -> u8 {
        100
    }
}

/// Upload the headset status now, then keep doing so periodically.
pub fn spawn_status_uploader(
    api: ManagementApi,
    device: Arc<dyn DeviceInfo>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(STATUS_UPLOAD_INTERVAL);
        loop {
            ticker.tick().await;
            let status = device.status();
            match api.update_headset_status(&status).await {
                Ok(()) => tracing::debug!("headset status uploaded"),
                Err(e) => tracing::warn!("headset status upload failed: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_reports_battery_as_string() {
        let device = StaticDeviceInfo::new(Some("headset-7".into()));
        let status = device.status();
        assert_eq!(status.headset_name, "headset-7");
        assert_eq!(status.battery_level, "100");
    }
}
