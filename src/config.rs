//! Immutable runtime configuration.
//!
//! Every tunable lives in one [`StreamConfig`] value that is loaded once (JSON, all fields
//! optional) and handed to the sequencer and supervisor constructors.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context as _;

use crate::foundation::{
    core::{Fps, Resolution},
    error::{LoopcastError, LoopcastResult},
};

/// Encoder settings passed through to `ffmpeg`.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncoderSettings {
    pub program: String,
    pub video_codec: String,
    pub preset: String,
    pub video_bitrate: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
    /// Container format for the network output (`flv` for RTMP/RTMPS).
    pub container: String,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            video_codec: "libx264".to_string(),
            preset: "veryfast".to_string(),
            video_bitrate: "1000k".to_string(),
            audio_codec: "aac".to_string(),
            audio_bitrate: "96k".to_string(),
            container: "flv".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StreamConfig {
    /// Looped under the countdown; its audio track also feeds the stream.
    pub background_video: PathBuf,
    /// Played once, without overlay, after the countdown.
    pub sting_video: PathBuf,
    /// Audio bed; defaults to `background_video`.
    pub audio_source: Option<PathBuf>,
    /// TrueType/OpenType font for the readout. Built-in segment glyphs are used when unset.
    pub font_file: Option<PathBuf>,
    pub countdown_secs: u64,
    /// Remaining seconds at which the countdown hands off to the sting.
    pub handoff_secs: u64,
    pub resolution: Resolution,
    pub fps: Fps,
    /// Full ingest URL including the stream key.
    pub output_url: Option<String>,
    pub encoder: EncoderSettings,
    pub retry_delay_ms: u64,
    pub shutdown_grace_ms: u64,
    pub preview_title: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            background_video: PathBuf::from("assets/background.mp4"),
            sting_video: PathBuf::from("assets/ten.mp4"),
            audio_source: None,
            font_file: None,
            countdown_secs: 30,
            handoff_secs: 10,
            resolution: Resolution {
                width: 1280,
                height: 720,
            },
            fps: Fps { num: 30, den: 1 },
            output_url: None,
            encoder: EncoderSettings::default(),
            retry_delay_ms: 5_000,
            shutdown_grace_ms: 3_000,
            preview_title: "loopcast preview (q to quit)".to_string(),
        }
    }
}

impl StreamConfig {
    /// Load a JSON config; relative asset paths resolve against the file's directory.
    pub fn load(path: &Path) -> LoopcastResult<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config '{}'", path.display()))?;
        let cfg: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parse config '{}'", path.display()))?;
        let root = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(cfg.resolve_relative_to(root))
    }

    pub fn resolve_relative_to(mut self, root: &Path) -> Self {
        let rebase = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = root.join(&*p);
            }
        };
        rebase(&mut self.background_video);
        rebase(&mut self.sting_video);
        if let Some(p) = self.audio_source.as_mut() {
            rebase(p);
        }
        if let Some(p) = self.font_file.as_mut() {
            rebase(p);
        }
        self
    }

    pub fn validate(&self) -> LoopcastResult<()> {
        self.resolution.validate()?;
        Fps::new(self.fps.num, self.fps.den)?;
        if self.countdown_secs == 0 {
            return Err(LoopcastError::validation("countdown_secs must be > 0"));
        }
        if self.handoff_secs >= self.countdown_secs {
            return Err(LoopcastError::validation(
                "handoff_secs must be smaller than countdown_secs",
            ));
        }
        if let Some(url) = self.output_url.as_deref()
            && url.trim().is_empty()
        {
            return Err(LoopcastError::validation("output_url must not be empty"));
        }
        for (name, value) in [
            ("encoder.program", &self.encoder.program),
            ("encoder.video_codec", &self.encoder.video_codec),
            ("encoder.video_bitrate", &self.encoder.video_bitrate),
            ("encoder.audio_codec", &self.encoder.audio_codec),
            ("encoder.audio_bitrate", &self.encoder.audio_bitrate),
            ("encoder.container", &self.encoder.container),
        ] {
            if value.trim().is_empty() {
                return Err(LoopcastError::validation(format!("{name} must not be empty")));
            }
        }
        Ok(())
    }

    /// Every required path that does not exist, in declaration order.
    pub fn missing_assets(&self) -> Vec<PathBuf> {
        let mut required = vec![&self.background_video, &self.sting_video];
        required.extend(self.audio_source.as_ref());
        required.extend(self.font_file.as_ref());
        required
            .into_iter()
            .filter(|p| !p.exists())
            .cloned()
            .collect()
    }

    pub fn verify_assets(&self) -> LoopcastResult<()> {
        let missing = self.missing_assets();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(LoopcastError::MissingAssets(missing))
        }
    }

    pub fn audio_path(&self) -> &Path {
        self.audio_source
            .as_deref()
            .unwrap_or(self.background_video.as_path())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
