pub mod audio;
pub mod playback;
pub mod upstream;

// Re-export commonly used types for convenience
pub use audio::{BYTES_PER_SAMPLE, BYTES_PER_SECOND, SAMPLE_RATE_HZ};

pub use playback::{AudioSink, PlaybackScheduler, PlaybackUnit};

pub use upstream::{
    ClientEvent, RealtimeModel, RealtimeVoice, SessionConfig, UpstreamConfig, UpstreamEvent,
    UpstreamLink, UpstreamLinkEvent, VoiceConfiguration,
};
