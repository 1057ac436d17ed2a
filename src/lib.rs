//! loopcast streams an endless countdown show: a background video looped under a burned-in
//! `MM:SS` readout, then a closing sting, over and over, published by one long-lived `ffmpeg`.
//!
//! # Pipeline overview
//!
//! 1. **Decode**: [`FrameSource`]s read the background and sting files frame by frame.
//! 2. **Compose**: [`letterbox`] fits each frame to the output [`Resolution`];
//!    [`CountdownRenderer`] burns in the remaining time.
//! 3. **Sequence**: [`CycleSequencer`] alternates countdown and sting phases on wall-clock time.
//! 4. **Publish**: [`Supervisor`] writes raw frames into the encoder and relaunches it when
//!    the pipe breaks.
//!
//! Frames are packed `rgb24` end to end; that layout is exactly what the encoder is told to
//! read from its stdin.
#![forbid(unsafe_code)]

mod clock;
mod compose;
mod config;
mod encode;
mod foundation;
mod media;
mod preview;
mod sequencer;
mod stop;
mod supervisor;

pub use clock::{Clock, SystemClock};
pub use compose::countdown::{
    CountdownLayout, CountdownRenderer, PixelRect, countdown_layout, format_countdown,
    overlay_countdown,
};
pub use compose::letterbox::{LetterboxGeometry, letterbox, letterbox_geometry};
pub use config::{EncoderSettings, StreamConfig};
pub use encode::ffmpeg::{FfmpegLauncher, FfplayLauncher, encoder_args, preview_args};
pub use encode::pipe::PipeSession;
pub use encode::sink::{EncoderLauncher, EncoderSession};
pub use foundation::core::{BYTES_PER_PIXEL, Fps, Frame, PIXEL_FORMAT, Resolution};
pub use foundation::error::{LoopcastError, LoopcastResult};
pub use foundation::process::is_tool_on_path;
pub use media::probe::{VideoSourceInfo, probe_video};
pub use media::source::{FfmpegSource, FfmpegSourceOpener, FrameSource, SourceOpener};
pub use preview::run_preview;
pub use sequencer::{CycleSequencer, Phase, SequencedFrame};
pub use stop::{AbortHandle, ArmGuard, StopSignal};
pub use supervisor::{Supervisor, SupervisorEvent, SupervisorReport, SupervisorState};
