//! The Audio Streamer (spec §4.1): plays a guide's pre-encoded Opus frame
//! file over a voice connection at real-time pace.
//!
//! This is a thin convenience layer over [`crate::voice::VoiceConnection`],
//! whose background task already owns the pacing loop
//! (`voice::streamer::PacketStreamer`) and RTP socket the teacher built for
//! music playback — "exactly one stream per session may be active" falls
//! out of `VoiceConnection::play` itself replacing whatever source was
//! previously streaming.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::voice::{Source, VoiceConnection};

/// Starts streaming a guide's audio clip over `conn`, stopping whatever
/// else was playing first (spec §4.1: Start implicitly stops).
pub async fn start(conn: &VoiceConnection, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();

    if tokio::fs::metadata(path).await.is_err() {
        return Err(Error::AudioNotFound(path.display().to_string()));
    }

    let source = Source::open(path).await.map_err(|err| Error::AudioIo(io_of(err)))?;

    conn.play(source).map_err(|_| Error::VoiceNotReady)
}

/// Stops any active stream. Idempotent.
pub fn stop(conn: &VoiceConnection) {
    let _ = conn.stop();
}

/// Whether a stream is currently active.
pub fn is_active(conn: &VoiceConnection) -> bool {
    conn.playing()
}

fn io_of(err: crate::voice::source::Error) -> std::io::Error {
    match err {
        crate::voice::source::Error::Io(err) => err,
        other => std::io::Error::new(std::io::ErrorKind::Other, other.to_string()),
    }
}

/// Resolves the on-disk path for a guide's audio clip, `name` being one of
/// the fixed Guide Asset Set slugs (e.g. `"0-voice-select"`, `"1-intro"`).
///
/// Layout: `audio/{guide}/{name}.bin`, e.g. `audio/kk/1-intro.bin`.
pub fn clip_path(audio_root: &Path, guide: &str, name: &str) -> PathBuf {
    audio_root.join(guide).join(format!("{name}.bin"))
}

/// The preview clip played from the guide menu, before any guide is chosen.
pub const PREVIEW_CLIP: &str = "0-voice-select";

/// Maps a step number (1-7) to its Guide Asset Set clip slug.
pub fn step_clip_name(step: u8) -> &'static str {
    match step {
        1 => "1-intro",
        2 => "2-profile",
        3 => "3-role",
        4 => "4-point",
        5 => "5-club",
        6 => "6-membership",
        _ => "7-end",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_path_layout() {
        let path = clip_path(Path::new("audio"), "kk", step_clip_name(1));
        assert_eq!(path, PathBuf::from("audio/kk/1-intro.bin"));
    }

    #[test]
    fn step_clip_names_cover_all_steps() {
        assert_eq!(step_clip_name(1), "1-intro");
        assert_eq!(step_clip_name(2), "2-profile");
        assert_eq!(step_clip_name(3), "3-role");
        assert_eq!(step_clip_name(4), "4-point");
        assert_eq!(step_clip_name(5), "5-club");
        assert_eq!(step_clip_name(6), "6-membership");
        assert_eq!(step_clip_name(7), "7-end");
    }
}
