//! Supervision of the persistent encoder.
//!
//! One [`EncoderSession`] is alive at a time. Frames from a fresh [`CycleSequencer`] are written
//! into it until a write fails, then the session is torn down and, after a fixed delay, a new
//! session and a new sequencer are started. Retries are unbounded; only a stop request ends
//! the loop.

use std::sync::Arc;

use crate::{
    clock::Clock,
    config::StreamConfig,
    encode::sink::{EncoderLauncher, EncoderSession},
    foundation::error::LoopcastResult,
    media::source::SourceOpener,
    sequencer::CycleSequencer,
    stop::StopSignal,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisorState {
    Launching,
    Streaming,
    Failed,
    Stopped,
}

/// A state transition, reported to the observer in the order it happens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SupervisorEvent {
    Launching {
        attempt: u64,
    },
    Streaming {
        attempt: u64,
    },
    Failed {
        attempt: u64,
        frames_written: u64,
        reason: String,
    },
    Stopped {
        frames_written: u64,
    },
}

impl SupervisorEvent {
    pub fn state(&self) -> SupervisorState {
        match self {
            Self::Launching { .. } => SupervisorState::Launching,
            Self::Streaming { .. } => SupervisorState::Streaming,
            Self::Failed { .. } => SupervisorState::Failed,
            Self::Stopped { .. } => SupervisorState::Stopped,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SupervisorReport {
    /// Sessions successfully spawned.
    pub sessions: u64,
    /// Frames written across all sessions.
    pub frames_written: u64,
}

enum SessionEnd {
    Stop,
    Failed(String),
}

type Observer = Box<dyn FnMut(&SupervisorEvent)>;

pub struct Supervisor<L, O, C> {
    cfg: Arc<StreamConfig>,
    launcher: L,
    opener: O,
    clock: C,
    stop: StopSignal,
    observer: Option<Observer>,
    state: SupervisorState,
    report: SupervisorReport,
}

impl<L, O, C> Supervisor<L, O, C>
where
    L: EncoderLauncher,
    O: SourceOpener + Clone,
    C: Clock + Clone,
{
    pub fn new(cfg: Arc<StreamConfig>, launcher: L, opener: O, clock: C, stop: StopSignal) -> Self {
        Self {
            cfg,
            launcher,
            opener,
            clock,
            stop,
            observer: None,
            state: SupervisorState::Launching,
            report: SupervisorReport::default(),
        }
    }

    pub fn with_observer(mut self, observer: impl FnMut(&SupervisorEvent) + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Stream until stopped.
    pub fn run(&mut self) -> LoopcastResult<SupervisorReport> {
        let mut attempt = 0u64;
        loop {
            if self.stop.is_triggered() {
                self.emit(SupervisorEvent::Stopped {
                    frames_written: self.report.frames_written,
                });
                return Ok(self.report);
            }

            attempt += 1;
            self.emit(SupervisorEvent::Launching { attempt });

            let (frames, end) = match self.launcher.launch() {
                Ok(session) => {
                    self.report.sessions += 1;
                    self.emit(SupervisorEvent::Streaming { attempt });
                    self.stream(session)
                }
                Err(e) => (0, SessionEnd::Failed(format!("launch failed: {e}"))),
            };
            self.report.frames_written += frames;

            match end {
                SessionEnd::Stop => {
                    self.emit(SupervisorEvent::Stopped {
                        frames_written: self.report.frames_written,
                    });
                    return Ok(self.report);
                }
                SessionEnd::Failed(reason) => {
                    self.emit(SupervisorEvent::Failed {
                        attempt,
                        frames_written: frames,
                        reason,
                    });
                    if self.stop.wait_timeout(self.cfg.retry_delay()) {
                        self.emit(SupervisorEvent::Stopped {
                            frames_written: self.report.frames_written,
                        });
                        return Ok(self.report);
                    }
                }
            }
        }
    }

    /// Feed one session until it fails or a stop is requested. The session is always released
    /// before returning.
    fn stream(&mut self, mut session: L::Session) -> (u64, SessionEnd) {
        let guard = self.stop.arm(session.abort_handle(self.cfg.shutdown_grace()));
        let mut frames = 0u64;

        let end = match CycleSequencer::new(
            Arc::clone(&self.cfg),
            self.opener.clone(),
            self.clock.clone(),
        ) {
            Err(e) => SessionEnd::Failed(format!("sequencer setup failed: {e}")),
            Ok(mut sequencer) => loop {
                if self.stop.is_triggered() {
                    break SessionEnd::Stop;
                }
                let item = match sequencer.next_frame() {
                    Ok(item) => item,
                    Err(e) => break SessionEnd::Failed(format!("frame source failed: {e}")),
                };
                if let Err(e) = session.write_frame(&item.frame) {
                    if self.stop.is_triggered() {
                        break SessionEnd::Stop;
                    }
                    break SessionEnd::Failed(format!("encoder pipe write failed: {e}"));
                }
                frames += 1;
            },
        };
        drop(guard);

        match &end {
            SessionEnd::Stop => session.shutdown(self.cfg.shutdown_grace()),
            SessionEnd::Failed(_) => session.abort(),
        }
        (frames, end)
    }

    fn emit(&mut self, event: SupervisorEvent) {
        self.state = event.state();
        match &event {
            SupervisorEvent::Launching { attempt } => {
                tracing::info!(attempt, "launching encoder");
            }
            SupervisorEvent::Streaming { attempt } => {
                tracing::info!(attempt, "live");
            }
            SupervisorEvent::Failed {
                attempt,
                frames_written,
                reason,
            } => {
                tracing::warn!(
                    attempt,
                    frames_written,
                    retry_in_ms = self.cfg.retry_delay_ms,
                    "{reason}; reconnecting"
                );
            }
            SupervisorEvent::Stopped { frames_written } => {
                tracing::info!(frames_written, "stopped");
            }
        }
        if let Some(observer) = self.observer.as_mut() {
            observer(&event);
        }
    }
}
