use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    config::StreamConfig,
    encode::{pipe::PipeSession, sink::EncoderLauncher},
    foundation::{
        core::PIXEL_FORMAT,
        error::{LoopcastError, LoopcastResult},
    },
};

/// `ffmpeg` arguments for the persistent publisher.
///
/// Video is raw `rgb24` on stdin at the configured size and rate; audio, when present, is
/// read from a file looped forever. Output goes to `url` in the configured container.
pub fn encoder_args(cfg: &StreamConfig, url: &str, audio: Option<&Path>) -> Vec<OsString> {
    let enc = &cfg.encoder;
    let mut args: Vec<OsString> = Vec::new();

    push_all(&mut args, &["-hide_banner", "-loglevel", "error", "-nostdin"]);
    push_all(
        &mut args,
        &[
            "-f",
            "rawvideo",
            "-pix_fmt",
            PIXEL_FORMAT,
            "-s",
            &cfg.resolution.to_ffmpeg_size(),
            "-r",
            &cfg.fps.to_ffmpeg_rate(),
            "-i",
            "pipe:0",
        ],
    );

    if let Some(audio) = audio {
        push_all(&mut args, &["-stream_loop", "-1", "-i"]);
        args.push(audio.as_os_str().to_os_string());
        push_all(&mut args, &["-map", "0:v:0", "-map", "1:a:0"]);
    }

    push_all(
        &mut args,
        &[
            "-c:v",
            &enc.video_codec,
            "-preset",
            &enc.preset,
            "-b:v",
            &enc.video_bitrate,
            "-pix_fmt",
            "yuv420p",
            "-g",
            &(cfg.fps.ceil_frames() * 2).to_string(),
        ],
    );

    if audio.is_some() {
        push_all(
            &mut args,
            &["-c:a", &enc.audio_codec, "-b:a", &enc.audio_bitrate],
        );
    } else {
        push_all(&mut args, &["-an"]);
    }

    push_all(&mut args, &["-f", &enc.container, url]);
    args
}

fn push_all(args: &mut Vec<OsString>, items: &[&str]) {
    args.extend(items.iter().map(OsString::from));
}

/// `ffplay` arguments for the local preview window.
pub fn preview_args(cfg: &StreamConfig) -> Vec<OsString> {
    [
        "-hide_banner",
        "-loglevel",
        "error",
        "-f",
        "rawvideo",
        "-pixel_format",
        PIXEL_FORMAT,
        "-video_size",
        &cfg.resolution.to_ffmpeg_size(),
        "-framerate",
        &cfg.fps.to_ffmpeg_rate(),
        "-window_title",
        &cfg.preview_title,
        "-autoexit",
        "pipe:0",
    ]
    .iter()
    .map(OsString::from)
    .collect()
}

/// Spawns one publishing `ffmpeg` per launch.
#[derive(Clone, Debug)]
pub struct FfmpegLauncher {
    cfg: Arc<StreamConfig>,
    url: String,
    audio: Option<PathBuf>,
}

impl FfmpegLauncher {
    /// Publisher for `cfg.output_url`, with audio from `cfg.audio_path()`.
    pub fn new(cfg: Arc<StreamConfig>) -> LoopcastResult<Self> {
        let url = cfg
            .output_url
            .clone()
            .ok_or_else(|| LoopcastError::validation("output_url is required for streaming"))?;
        let audio = Some(cfg.audio_path().to_path_buf());
        Ok(Self { cfg, url, audio })
    }

    /// Publish without an audio track.
    pub fn without_audio(mut self) -> Self {
        self.audio = None;
        self
    }

    pub fn args(&self) -> Vec<OsString> {
        encoder_args(&self.cfg, &self.url, self.audio.as_deref())
    }
}

impl EncoderLauncher for FfmpegLauncher {
    type Session = PipeSession;

    fn launch(&mut self) -> LoopcastResult<PipeSession> {
        PipeSession::spawn(
            "ffmpeg",
            &self.cfg.encoder.program,
            &self.args(),
            self.cfg.resolution.frame_len(),
        )
    }
}

/// Spawns an `ffplay` window; closing it (q / Esc) ends the session.
#[derive(Clone, Debug)]
pub struct FfplayLauncher {
    cfg: Arc<StreamConfig>,
}

impl FfplayLauncher {
    pub fn new(cfg: Arc<StreamConfig>) -> Self {
        Self { cfg }
    }
}

impl EncoderLauncher for FfplayLauncher {
    type Session = PipeSession;

    fn launch(&mut self) -> LoopcastResult<PipeSession> {
        PipeSession::spawn(
            "ffplay",
            "ffplay",
            &preview_args(&self.cfg),
            self.cfg.resolution.frame_len(),
        )
    }
}
