//! Audio sources.
//!
//! Onboarding guide audio ships as pre-encoded Opus frames on disk, one
//! length-prefixed frame per tick (20ms @ 48kHz), so there's no ffmpeg/ytdl
//! pipe to manage here — just a buffered file reader.

use super::constants::VOICE_PACKET_MAX;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, BufReader};

use std::fmt::{self, Debug, Display, Formatter};
use std::path::Path;

/// A pre-encoded Opus frame source, read from a guide's frame file.
///
/// The file format is a flat sequence of `(u16 length, length bytes of Opus
/// payload)` records, one per 20ms tick, with no header.
pub struct Source {
    reader: BufReader<File>,
}

impl Source {
    /// Opens a frame file for playback.
    pub async fn open(path: impl AsRef<Path>) -> Result<Source, Error> {
        let file = File::open(path).await.map_err(Error::Io)?;
        Ok(Source {
            reader: BufReader::new(file),
        })
    }

    /// Reads the next Opus frame into `buf`. Returns `Ok(0)` at end of file.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let len = match self.reader.read_u16_le().await {
            Ok(len) => len as usize,
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(0),
            Err(err) => return Err(Error::Io(err)),
        };

        if len > VOICE_PACKET_MAX {
            return Err(Error::FrameTooLarge(len));
        }

        self.reader
            .read_exact(&mut buf[..len])
            .await
            .map_err(Error::Io)?;

        Ok(len)
    }

    /// No background process to kill; present for parity with
    /// [`super::streamer::PacketStreamer`]'s cleanup path.
    pub async fn close(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

impl Debug for Source {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("Source(_)")
    }
}

/// An audio track error.
#[derive(Debug)]
pub enum Error {
    /// Io error reading the frame file.
    Io(std::io::Error),
    /// A frame's declared length exceeds the RTP payload limit.
    FrameTooLarge(usize),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => Display::fmt(err, f),
            Error::FrameTooLarge(len) => write!(f, "frame of {len} bytes exceeds packet limit"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::FrameTooLarge(_) => None,
        }
    }
}
