pub mod encoder;
pub mod library;
pub mod peer;
pub mod player;

pub use encoder::GstH264Encoder;
pub use library::MediaLibrary;
pub use peer::{
    EncoderFactory, IceCandidateSender, PeerConfig, PeerController, PeerError, SessionHandle,
};
pub use player::{MediaPlayer, NullMediaPlayer, NullThumbnailer, PlayerError, Thumbnailer};
