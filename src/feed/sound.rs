//! Audible cue played when a notification arrives.

use crate::error::{RealtimeError, Result};
use std::io::Write;

/// Something that can play a short notification sound.
///
/// Failures are reported but never surfaced to the user; the feed swallows
/// them.
pub trait SoundCue: Send + Sync {
    fn play(&self) -> Result<()>;
}

/// Rings the terminal bell on stderr.
#[derive(Clone, Copy, Debug, Default)]
pub struct TerminalBell;

impl SoundCue for TerminalBell {
    fn play(&self) -> Result<()> {
        let mut stderr = std::io::stderr().lock();
        stderr
            .write_all(b"\x07")
            .and_then(|_| stderr.flush())
            .map_err(|e| RealtimeError::Playback(e.to_string()))
    }
}

/// Plays nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct Silent;

impl SoundCue for Silent {
    fn play(&self) -> Result<()> {
        Ok(())
    }
}
