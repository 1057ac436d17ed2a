use std::{
    ffi::OsString,
    io::Write as _,
    process::{Child, ChildStdin, Command, ExitStatus, Stdio},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread::JoinHandle,
    time::{Duration, Instant},
};

use crate::{
    encode::sink::EncoderSession,
    foundation::{
        core::Frame,
        error::{LoopcastError, LoopcastResult},
        process::forward_stderr,
    },
    stop::AbortHandle,
};

/// A child process fed raw frames on stdin.
///
/// Dropping the session closes the pipe, kills the child if it is still running and reaps it,
/// so no exit path leaks a process.
pub struct PipeSession {
    label: &'static str,
    child: Arc<Mutex<Child>>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<JoinHandle<()>>,
    frame_len: usize,
    frames_written: u64,
}

impl PipeSession {
    pub fn spawn(
        label: &'static str,
        program: &str,
        args: &[OsString],
        frame_len: usize,
    ) -> LoopcastResult<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                LoopcastError::encode(format!(
                    "failed to spawn {program} (is it installed and on PATH?): {e}"
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| LoopcastError::encode(format!("failed to open {program} stdin")));
        let stdin = match stdin {
            Ok(stdin) => stdin,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e);
            }
        };
        let stderr_drain = match child.stderr.take() {
            Some(stderr) => Some(forward_stderr(label, stderr)?),
            None => None,
        };

        tracing::debug!(process = label, pid = child.id(), "spawned");
        Ok(Self {
            label,
            child: Arc::new(Mutex::new(child)),
            stdin: Some(stdin),
            stderr_drain,
            frame_len,
            frames_written: 0,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn child(&self) -> MutexGuard<'_, Child> {
        self.child.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn close_pipe(&mut self) {
        drop(self.stdin.take());
    }

    fn kill_and_reap(&mut self) -> Option<ExitStatus> {
        let mut child = self.child();
        let _ = child.kill();
        child.wait().ok()
    }

    fn wait_for_exit(&mut self, grace: Duration) -> Option<ExitStatus> {
        let deadline = Instant::now() + grace;
        loop {
            match self.child().try_wait() {
                Ok(Some(status)) => return Some(status),
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(process = self.label, "try_wait failed: {e}");
                    return None;
                }
            }
            if Instant::now() >= deadline {
                return None;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    fn join_drain(&mut self) {
        if let Some(handle) = self.stderr_drain.take()
            && handle.join().is_err()
        {
            tracing::debug!(process = self.label, "stderr drain thread panicked");
        }
    }
}

impl EncoderSession for PipeSession {
    fn write_frame(&mut self, frame: &Frame) -> std::io::Result<()> {
        if frame.data.len() != self.frame_len {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "frame is {} bytes, pipe expects {}",
                    frame.data.len(),
                    self.frame_len
                ),
            ));
        }
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "pipe already closed",
            ));
        };
        stdin.write_all(&frame.data)?;
        self.frames_written += 1;
        Ok(())
    }

    fn abort_handle(&self, grace: Duration) -> AbortHandle {
        let child = Arc::clone(&self.child);
        let label = self.label;
        Arc::new(move || {
            let timer_child = Arc::clone(&child);
            let timer = std::thread::Builder::new()
                .name(format!("{label}-stop-timer"))
                .spawn(move || {
                    std::thread::sleep(grace);
                    let mut child = timer_child.lock().unwrap_or_else(PoisonError::into_inner);
                    if matches!(child.try_wait(), Ok(None)) {
                        tracing::warn!(
                            process = label,
                            grace_ms = grace.as_millis() as u64,
                            "still running after stop; killing"
                        );
                        let _ = child.kill();
                    }
                });
            if let Err(e) = timer {
                tracing::warn!(process = label, "no stop timer ({e}); killing now");
                let _ = child.lock().unwrap_or_else(PoisonError::into_inner).kill();
            }
        })
    }

    fn abort(mut self) {
        self.close_pipe();
        let status = self.kill_and_reap();
        self.join_drain();
        tracing::debug!(process = self.label, ?status, "aborted");
    }

    fn shutdown(mut self, grace: Duration) {
        self.close_pipe();
        let status = match self.wait_for_exit(grace) {
            Some(status) => Some(status),
            None => {
                tracing::warn!(
                    process = self.label,
                    grace_ms = grace.as_millis() as u64,
                    "did not exit after its input closed; killing"
                );
                self.kill_and_reap()
            }
        };
        self.join_drain();
        tracing::info!(
            process = self.label,
            ?status,
            frames = self.frames_written,
            "stopped"
        );
    }
}

impl Drop for PipeSession {
    fn drop(&mut self) {
        self.close_pipe();
        let mut child = self.child();
        if matches!(child.try_wait(), Ok(None)) {
            let _ = child.kill();
        }
        let _ = child.wait();
        drop(child);
        self.join_drain();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn writes_reach_a_reading_child_and_shutdown_is_clean() {
        let mut session = PipeSession::spawn("cat", "cat", &[], 6).unwrap();
        let frame = Frame::from_rgb24(2, 1, vec![1, 2, 3, 4, 5, 6]).unwrap();
        session.write_frame(&frame).unwrap();
        session.write_frame(&frame).unwrap();
        assert_eq!(session.frames_written(), 2);
        session.shutdown(Duration::from_secs(5));
    }

    #[test]
    fn wrong_frame_size_is_rejected() {
        let mut session = PipeSession::spawn("cat", "cat", &[], 6).unwrap();
        let frame = Frame::black(4, 4);
        let err = session.write_frame(&frame).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
        session.abort();
    }

    #[test]
    fn writes_fail_once_the_child_is_gone() {
        let frame = Frame::black(64, 64);
        let mut session =
            PipeSession::spawn("sh", "sh", &os(&["-c", "exit 0"]), frame.data.len()).unwrap();

        let mut failed = false;
        for _ in 0..200 {
            if session.write_frame(&frame).is_err() {
                failed = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(failed, "writing into an exited child must fail");
        session.abort();
    }

    #[test]
    fn abort_handle_unblocks_a_write_into_a_stalled_child() {
        let frame = Frame::black(64, 64);
        let mut session =
            PipeSession::spawn("sleep", "sleep", &os(&["30"]), frame.data.len()).unwrap();
        let handle = session.abort_handle(Duration::from_millis(100));
        let t0 = Instant::now();
        let firing = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            handle();
        });

        // `sleep` never reads, so a write blocks once the pipe buffer is full.
        let mut failed = false;
        for _ in 0..10_000 {
            if session.write_frame(&frame).is_err() {
                failed = true;
                break;
            }
        }
        firing.join().unwrap();
        assert!(failed);
        assert!(t0.elapsed() < Duration::from_secs(10));
        session.abort();
    }

    #[test]
    fn abort_handle_leaves_a_draining_child_time_to_exit() {
        let dir = std::path::PathBuf::from("target").join("pipe_stop_grace");
        std::fs::create_dir_all(&dir).unwrap();
        let marker = dir.join("exited");
        let _ = std::fs::remove_file(&marker);
        let script = format!("cat >/dev/null; sleep 0.2; touch '{}'", marker.display());

        let mut session = PipeSession::spawn("sh", "sh", &os(&["-c", &script]), 6).unwrap();
        let frame = Frame::from_rgb24(2, 1, vec![1, 2, 3, 4, 5, 6]).unwrap();
        session.write_frame(&frame).unwrap();

        session.abort_handle(Duration::from_secs(5))();
        session.write_frame(&frame).unwrap();
        session.shutdown(Duration::from_secs(5));
        assert!(marker.exists(), "child was killed before it could exit on EOF");
    }

    #[test]
    fn shutdown_kills_a_child_that_ignores_eof() {
        let session = PipeSession::spawn("sleep", "sleep", &os(&["30"]), 3).unwrap();
        let t0 = Instant::now();
        session.shutdown(Duration::from_millis(50));
        assert!(t0.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn missing_program_is_an_encode_error() {
        let err = PipeSession::spawn("nope", "loopcast-no-such-program", &[], 3)
            .err()
            .unwrap();
        assert!(err.to_string().contains("failed to spawn"));
    }
}
