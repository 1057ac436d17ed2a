use std::time::Duration;

use crate::{
    foundation::{core::Frame, error::LoopcastResult},
    stop::AbortHandle,
};

/// A running consumer of raw frames, usually a child process reading its stdin.
///
/// Ordering contract: frames are written in emission order; nothing is reordered or dropped.
pub trait EncoderSession {
    /// Write one frame's bytes. Any error means the session is dead.
    fn write_frame(&mut self, frame: &Frame) -> std::io::Result<()>;

    /// Handle that forces the session down from another thread. Calling it does not stop the
    /// process at once: it is killed only if still running `grace` after the call, which is
    /// what unblocks a write stuck on a process that stopped reading.
    fn abort_handle(&self, grace: Duration) -> AbortHandle;

    /// Failure path: close the pipe and terminate immediately.
    fn abort(self);

    /// Stop path: close the pipe, give the process `grace` to exit on its own, then kill it.
    fn shutdown(self, grace: Duration);
}

/// Spawns a fresh [`EncoderSession`] for every (re)launch.
pub trait EncoderLauncher {
    type Session: EncoderSession;

    fn launch(&mut self) -> LoopcastResult<Self::Session>;
}
