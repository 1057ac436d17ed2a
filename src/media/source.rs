use std::{
    io::{BufReader, Read},
    path::Path,
    process::{Child, ChildStdout, Command, Stdio},
    thread::JoinHandle,
};

use crate::{
    foundation::{
        core::{BYTES_PER_PIXEL, Frame, PIXEL_FORMAT},
        error::{LoopcastError, LoopcastResult},
        process::forward_stderr,
    },
    media::probe::{VideoSourceInfo, probe_video},
};

/// Sequential decode-by-frame access to one video file.
pub trait FrameSource {
    /// Next decoded frame at the source's native size, `None` at end of stream.
    fn next_frame(&mut self) -> LoopcastResult<Option<Frame>>;

    /// Seek back to the first frame.
    fn rewind(&mut self) -> LoopcastResult<()>;
}

/// Opens a fresh [`FrameSource`], positioned at the first frame, for a path.
pub trait SourceOpener {
    fn open(&self, path: &Path) -> LoopcastResult<Box<dyn FrameSource>>;
}

/// Opens sources by spawning the system `ffmpeg` as a decoder.
#[derive(Clone, Copy, Debug, Default)]
pub struct FfmpegSourceOpener;

impl SourceOpener for FfmpegSourceOpener {
    fn open(&self, path: &Path) -> LoopcastResult<Box<dyn FrameSource>> {
        Ok(Box::new(FfmpegSource::open(path)?))
    }
}

/// Decodes a file to packed `rgb24` frames through an `ffmpeg` child writing to a pipe.
///
/// Rewinding restarts the child; dropping the source kills and reaps it.
pub struct FfmpegSource {
    info: VideoSourceInfo,
    frame_len: usize,
    decoder: Option<DecoderProcess>,
    frames_read: u64,
}

struct DecoderProcess {
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr_drain: Option<JoinHandle<()>>,
}

impl FfmpegSource {
    pub fn open(path: &Path) -> LoopcastResult<Self> {
        let info = probe_video(path)?;
        let frame_len = info.width as usize * info.height as usize * BYTES_PER_PIXEL;
        let decoder = DecoderProcess::spawn(&info)?;
        tracing::debug!(
            path = %path.display(),
            width = info.width,
            height = info.height,
            "opened video source"
        );
        Ok(Self {
            info,
            frame_len,
            decoder: Some(decoder),
            frames_read: 0,
        })
    }

    pub fn info(&self) -> &VideoSourceInfo {
        &self.info
    }
}

impl FrameSource for FfmpegSource {
    fn next_frame(&mut self) -> LoopcastResult<Option<Frame>> {
        let Some(decoder) = self.decoder.as_mut() else {
            return Ok(None);
        };

        let mut buf = vec![0u8; self.frame_len];
        let filled = read_full(&mut decoder.stdout, &mut buf).map_err(|e| {
            LoopcastError::media(format!(
                "failed reading decoded frames of '{}': {e}",
                self.info.source_path.display()
            ))
        })?;

        if filled < self.frame_len {
            if filled > 0 {
                tracing::debug!(
                    path = %self.info.source_path.display(),
                    bytes = filled,
                    "discarding truncated trailing frame"
                );
            }
            // Reap now so the child does not linger until the source is dropped.
            self.decoder = None;
            return Ok(None);
        }

        self.frames_read += 1;
        Frame::from_rgb24(self.info.width, self.info.height, buf).map(Some)
    }

    fn rewind(&mut self) -> LoopcastResult<()> {
        self.decoder = None;
        self.decoder = Some(DecoderProcess::spawn(&self.info)?);
        tracing::trace!(
            path = %self.info.source_path.display(),
            frames = self.frames_read,
            "rewound video source"
        );
        self.frames_read = 0;
        Ok(())
    }
}

impl DecoderProcess {
    fn spawn(info: &VideoSourceInfo) -> LoopcastResult<Self> {
        let mut child = Command::new("ffmpeg")
            .args(["-hide_banner", "-nostdin", "-v", "error", "-i"])
            .arg(&info.source_path)
            .args([
                "-map",
                "0:v:0",
                "-an",
                "-sn",
                "-f",
                "rawvideo",
                "-pix_fmt",
                PIXEL_FORMAT,
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                LoopcastError::media(format!(
                    "failed to spawn ffmpeg decoder (is it installed and on PATH?): {e}"
                ))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LoopcastError::media("failed to open ffmpeg decoder stdout"))?;
        let stderr_drain = match child.stderr.take() {
            Some(stderr) => Some(forward_stderr("ffmpeg-decode", stderr)?),
            None => None,
        };

        Ok(Self {
            child,
            stdout: BufReader::with_capacity(1 << 20, stdout),
            stderr_drain,
        })
    }
}

impl Drop for DecoderProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        if let Some(handle) = self.stderr_drain.take() {
            let _ = handle.join();
        }
    }
}

/// Fill `buf` as far as the reader allows; returns the byte count read before EOF.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
