//! Low-level voice transport constants.

use tokio::time::Duration;

/// Raw sample rate of the Opus stream used by the voice gateway.
pub const SAMPLE_RATE: usize = 48_000;

/// Number of 20ms frames sent per second.
pub const AUDIO_FRAME_RATE: usize = 50;

/// Number of samples in one frame of audio, per channel.
pub const MONO_FRAME_SIZE: usize = SAMPLE_RATE / AUDIO_FRAME_RATE;

/// Number of samples in one frame of audio, across both channels.
pub const STEREO_FRAME_SIZE: usize = MONO_FRAME_SIZE * 2;

/// Largest Opus frame the voice gateway will forward, plus header room.
pub const VOICE_PACKET_MAX: usize = 1460;

/// Spacing between outgoing RTP packets (one Opus frame).
pub const TIMESTEP_LENGTH: Duration = Duration::from_millis(20);

/// A single Opus "silence" frame, sent to flush the decoder jitter buffer on
/// the receiving end whenever a stream stops or stalls.
pub const SILENCE_FRAME: &[u8] = &[0xF8, 0xFF, 0xFE];
