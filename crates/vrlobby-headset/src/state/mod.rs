pub mod app_state;
pub mod settings;

pub use app_state::{DownloadProgress, HeadsetState, OverlayState, PlaybackView};
pub use settings::Settings;
