use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use salesmind_engine::traits::{AudioCueError, AudioCueService, PlaybackProgress};

/// Pre-rendered utterances stored as `<dir>/<cue_id>.wav`.
///
/// Playback runs on the clip's own clock: `play` resolves once the WAV's duration has
/// elapsed, and `stop` cuts it short with [`AudioCueError::Stopped`].
#[derive(Debug)]
pub struct WavCueLibrary {
    dir: PathBuf,
    stopped: Notify,
    current: Mutex<Option<(Instant, Duration)>>,
}

impl WavCueLibrary {
    pub fn at_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            stopped: Notify::new(),
            current: Mutex::new(None),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn cue_path(&self, cue_id: &str) -> Result<PathBuf, AudioCueError> {
        let valid = !cue_id.is_empty()
            && cue_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !cue_id.contains("..");
        if !valid {
            return Err(AudioCueError::CueUnavailable(format!("invalid cue id: {cue_id}")));
        }
        Ok(self.dir.join(format!("{cue_id}.wav")))
    }

    pub fn duration(&self, cue_id: &str) -> Result<Duration, AudioCueError> {
        let path = self.cue_path(cue_id)?;
        wav_duration(&path)
            .map_err(|e| AudioCueError::CueUnavailable(format!("{}: {e}", path.display())))
    }

    fn set_current(&self, value: Option<(Instant, Duration)>) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = value;
    }
}

fn wav_duration(path: &Path) -> Result<Duration, hound::Error> {
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Ok(Duration::ZERO);
    }
    // `duration()` counts samples per channel.
    let frames = u64::from(reader.duration());
    Ok(Duration::from_millis(
        frames * 1_000 / u64::from(spec.sample_rate),
    ))
}

#[async_trait::async_trait]
impl AudioCueService for WavCueLibrary {
    async fn play(&self, cue_id: &str) -> Result<(), AudioCueError> {
        let len = self.duration(cue_id)?;

        let stopped = self.stopped.notified();
        tokio::pin!(stopped);
        stopped.as_mut().enable();

        self.set_current(Some((Instant::now(), len)));
        log::debug!("playing cue {cue_id} ({} ms)", len.as_millis());
        let result = tokio::select! {
            _ = &mut stopped => Err(AudioCueError::Stopped),
            _ = tokio::time::sleep(len) => Ok(()),
        };
        self.set_current(None);
        result
    }

    async fn stop(&self) {
        self.stopped.notify_waiters();
    }

    fn progress(&self) -> Option<PlaybackProgress> {
        let (started, total) = (*self.current.lock().unwrap_or_else(PoisonError::into_inner))?;
        let elapsed = started.elapsed().min(total);
        Some(PlaybackProgress {
            elapsed_ms: elapsed.as_millis().try_into().unwrap_or(u64::MAX),
            total_ms: total.as_millis().try_into().unwrap_or(u64::MAX),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    // Mono 8 kHz clip of `ms` milliseconds.
    fn write_cue(dir: &Path, cue_id: &str, ms: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(dir.join(format!("{cue_id}.wav")), spec).unwrap();
        for _ in 0..(8 * ms) {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn reads_duration_from_header() {
        let dir = tempfile::tempdir().unwrap();
        write_cue(dir.path(), "call1_greeting", 1_250);

        let lib = WavCueLibrary::at_dir(dir.path());
        assert_eq!(lib.duration("call1_greeting").unwrap(), Duration::from_millis(1_250));
    }

    #[test]
    fn rejects_ids_that_escape_the_directory() {
        let lib = WavCueLibrary::at_dir("/tmp/cues");
        assert!(lib.cue_path("../secrets").is_err());
        assert!(lib.cue_path("a/b").is_err());
        assert!(lib.cue_path("").is_err());
        assert!(lib.cue_path("call2_final").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_cue_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let lib = WavCueLibrary::at_dir(dir.path());
        assert!(matches!(
            lib.play("nope").await,
            Err(AudioCueError::CueUnavailable(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn plays_for_the_clip_length() {
        let dir = tempfile::tempdir().unwrap();
        write_cue(dir.path(), "hello", 500);

        let lib = WavCueLibrary::at_dir(dir.path());
        let started = Instant::now();
        lib.play("hello").await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_millis(500));
        assert!(lib.progress().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_interrupts_playback() {
        let dir = tempfile::tempdir().unwrap();
        write_cue(dir.path(), "long", 10_000);

        let lib = Arc::new(WavCueLibrary::at_dir(dir.path()));
        let playing = tokio::spawn({
            let lib = lib.clone();
            async move { lib.play("long").await }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        let progress = lib.progress().unwrap();
        assert_eq!(progress.total_ms, 10_000);
        assert_eq!(progress.elapsed_ms, 100);

        lib.stop().await;
        assert_eq!(playing.await.unwrap(), Err(AudioCueError::Stopped));
    }
}
