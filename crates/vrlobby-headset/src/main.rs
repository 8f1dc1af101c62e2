use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vrlobby_media::{TestPatternTarget, VideoEncoder};

use vrlobby_headset::device::{DeviceInfo, StaticDeviceInfo, spawn_status_uploader};
use vrlobby_headset::media::peer::{EncoderFactory, PeerConfig};
use vrlobby_headset::media::{GstH264Encoder, MediaLibrary, NullMediaPlayer, NullThumbnailer};
use vrlobby_headset::network::ManagementApi;
use vrlobby_headset::session::{CoordinatorConfig, RECONNECT_BACKOFF, SessionCoordinator};
use vrlobby_headset::state::{HeadsetState, Settings};

const CONFIG_FETCH_RETRY: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vrlobby=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Vrlobby headset client...");

    let settings = Settings::load();
    let state = HeadsetState::new();
    let device: Arc<dyn DeviceInfo> =
        Arc::new(StaticDeviceInfo::new(settings.headset_name.clone()));
    let api = ManagementApi::new(&settings.api_base_url);

    state.set_status("Initializing device info...").await;
    if let Err(e) = api.update_headset_status(&device.status()).await {
        tracing::warn!("initial headset status upload failed: {}", e);
    }

    // The session is unusable without its startup config; keep asking until
    // the API answers.
    state.set_status("Fetching session config...").await;
    let startup_config = loop {
        match api.startup_config(&device.headset_name()).await {
            Ok(config) => break config,
            Err(e) => {
                tracing::warn!(
                    "startup config fetch failed, retrying in {}s: {}",
                    CONFIG_FETCH_RETRY.as_secs(),
                    e
                );
                tokio::time::sleep(CONFIG_FETCH_RETRY).await;
            }
        }
    };
    tracing::info!(
        vr_user_id = startup_config.vr_user_id,
        session_type = %startup_config.session_type,
        "session config resolved"
    );
    state.set_progress(0.25).await;

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    state.set_status("Downloading media list...").await;
    let mut library = MediaLibrary::new(
        api.clone(),
        settings.media_cache_dir(),
        state.clone(),
        Box::new(NullMediaPlayer),
        Box::new(NullThumbnailer),
        startup_config.vr_user_id,
        shutdown_tx,
    );
    if let Err(e) = library.refresh().await {
        tracing::error!("media library refresh failed: {}", e);
    }
    state.set_progress(0.5).await;

    state.set_status("Generating thumbnails...").await;
    library.generate_thumbnails().await;
    state.set_progress(0.75).await;

    spawn_status_uploader(api.clone(), device.clone());
    tokio::spawn(library.run_media_hub(
        settings.media_hub_url(&device.headset_name()),
        settings.transport,
    ));

    // A real deployment binds the engine's camera render target here;
    // without an engine the built-in test pattern keeps the feed useful for
    // diagnostics.
    let target = Arc::new(TestPatternTarget::new(
        settings.capture_width,
        settings.capture_height,
    ));
    let capture_fps = settings.capture_fps;
    let encoder_factory: EncoderFactory = Arc::new(move |width, height| {
        Ok(Box::new(GstH264Encoder::new(width, height, capture_fps)?) as Box<dyn VideoEncoder>)
    });

    let coordinator = SessionCoordinator::new(
        CoordinatorConfig {
            hub_url: settings.live_feed_hub_url(),
            transport: settings.transport,
            vr_user_id: startup_config.vr_user_id,
            capture_width: settings.capture_width,
            capture_height: settings.capture_height,
            reconnect_backoff: RECONNECT_BACKOFF,
        },
        target,
        encoder_factory,
        PeerConfig {
            ice_servers: settings.stun_servers.clone(),
            capture_fps,
        },
        state.clone(),
    );

    state.set_progress(1.0).await;
    state.set_status("Startup complete. Loading environment...").await;

    tokio::select! {
        _ = coordinator.run() => {}
        _ = shutdown_rx.wait_for(|&requested| requested) => {
            tracing::info!("shutdown command received, exiting");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, exiting");
        }
    }

    Ok(())
}
