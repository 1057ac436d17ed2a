//! The endless countdown → sting frame sequence.
//!
//! A cycle is a countdown phase (background looped under a live `MM:SS` overlay until
//! `handoff_secs` remain on the wall clock) followed by a sting phase (second source played
//! once, no overlay). The state that a generator would keep implicitly lives in
//! [`CycleSequencer`], advanced one frame per [`CycleSequencer::next_frame`] call.

use std::{sync::Arc, time::Instant};

use crate::{
    clock::Clock,
    compose::{countdown::CountdownRenderer, letterbox::letterbox},
    config::StreamConfig,
    foundation::{
        core::Frame,
        error::{LoopcastError, LoopcastResult},
    },
    media::source::{FrameSource, SourceOpener},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Countdown,
    Sting,
}

/// One composited output frame plus where in the cycle it came from.
#[derive(Clone, Debug)]
pub struct SequencedFrame {
    pub frame: Frame,
    pub phase: Phase,
    /// Seconds shown by the overlay; `None` during the sting.
    pub remaining_secs: Option<i64>,
    /// Completed cycles before this frame.
    pub cycle: u64,
    pub index_in_phase: u64,
}

enum CycleState {
    /// Next phase to enter; its source is not open yet.
    Pending(Phase),
    Countdown {
        source: Box<dyn FrameSource>,
        started_at: Instant,
    },
    Sting {
        source: Box<dyn FrameSource>,
    },
}

pub struct CycleSequencer<O, C> {
    cfg: Arc<StreamConfig>,
    opener: O,
    clock: C,
    overlay: CountdownRenderer,
    state: CycleState,
    cycle: u64,
    index_in_phase: u64,
}

impl<O: SourceOpener, C: Clock> CycleSequencer<O, C> {
    /// Sequencer positioned at the start of a countdown; no source is opened until the first
    /// frame is requested.
    pub fn new(cfg: Arc<StreamConfig>, opener: O, clock: C) -> LoopcastResult<Self> {
        let overlay = CountdownRenderer::for_config(&cfg)?;
        Ok(Self::with_renderer(cfg, opener, clock, overlay))
    }

    pub fn with_renderer(
        cfg: Arc<StreamConfig>,
        opener: O,
        clock: C,
        overlay: CountdownRenderer,
    ) -> Self {
        Self {
            cfg,
            opener,
            clock,
            overlay,
            state: CycleState::Pending(Phase::Countdown),
            cycle: 0,
            index_in_phase: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        match &self.state {
            CycleState::Pending(phase) => *phase,
            CycleState::Countdown { .. } => Phase::Countdown,
            CycleState::Sting { .. } => Phase::Sting,
        }
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Release any open source and go back to the top of a countdown.
    pub fn reset(&mut self) {
        self.state = CycleState::Pending(Phase::Countdown);
        self.index_in_phase = 0;
    }

    pub fn next_frame(&mut self) -> LoopcastResult<SequencedFrame> {
        loop {
            match &mut self.state {
                CycleState::Pending(phase) => {
                    let phase = *phase;
                    self.enter(phase)?;
                }
                CycleState::Countdown { source, started_at } => {
                    let started_at = *started_at;
                    let raw = match source.next_frame()? {
                        Some(raw) => raw,
                        None => {
                            source.rewind()?;
                            source.next_frame()?.ok_or_else(|| {
                                LoopcastError::EmptySource(self.cfg.background_video.clone())
                            })?
                        }
                    };

                    let elapsed = self.clock.now().saturating_duration_since(started_at);
                    let remaining = countdown_remaining(self.cfg.countdown_secs, elapsed.as_secs());

                    let mut frame = letterbox(raw, self.cfg.resolution)?;
                    self.overlay.overlay(&mut frame, remaining)?;

                    let out = SequencedFrame {
                        frame,
                        phase: Phase::Countdown,
                        remaining_secs: Some(remaining),
                        cycle: self.cycle,
                        index_in_phase: self.index_in_phase,
                    };
                    self.index_in_phase += 1;

                    if remaining <= self.handoff_secs() {
                        tracing::debug!(
                            cycle = self.cycle,
                            frames = self.index_in_phase,
                            remaining,
                            "countdown handing off to sting"
                        );
                        self.state = CycleState::Pending(Phase::Sting);
                    }
                    return Ok(out);
                }
                CycleState::Sting { source } => match source.next_frame()? {
                    Some(raw) => {
                        let frame = letterbox(raw, self.cfg.resolution)?;
                        let out = SequencedFrame {
                            frame,
                            phase: Phase::Sting,
                            remaining_secs: None,
                            cycle: self.cycle,
                            index_in_phase: self.index_in_phase,
                        };
                        self.index_in_phase += 1;
                        return Ok(out);
                    }
                    None => {
                        if self.index_in_phase == 0 {
                            tracing::warn!(
                                path = %self.cfg.sting_video.display(),
                                "sting produced no frames; skipping it"
                            );
                        }
                        self.cycle += 1;
                        self.state = CycleState::Pending(Phase::Countdown);
                    }
                },
            }
        }
    }

    #[tracing::instrument(level = "debug", skip(self), fields(cycle = self.cycle))]
    fn enter(&mut self, phase: Phase) -> LoopcastResult<()> {
        self.index_in_phase = 0;
        self.state = match phase {
            Phase::Countdown => {
                let source = self.opener.open(&self.cfg.background_video)?;
                CycleState::Countdown {
                    source,
                    started_at: self.clock.now(),
                }
            }
            Phase::Sting => {
                let source = self.opener.open(&self.cfg.sting_video)?;
                CycleState::Sting { source }
            }
        };
        Ok(())
    }

    fn handoff_secs(&self) -> i64 {
        i64::try_from(self.cfg.handoff_secs).unwrap_or(i64::MAX)
    }
}

/// `countdown - floor(elapsed)`, saturating instead of overflowing.
fn countdown_remaining(countdown_secs: u64, elapsed_secs: u64) -> i64 {
    let total = i64::try_from(countdown_secs).unwrap_or(i64::MAX);
    let elapsed = i64::try_from(elapsed_secs).unwrap_or(i64::MAX);
    total.saturating_sub(elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_goes_negative_without_overflow() {
        assert_eq!(countdown_remaining(30, 0), 30);
        assert_eq!(countdown_remaining(30, 20), 10);
        assert_eq!(countdown_remaining(30, 45), -15);
        assert_eq!(countdown_remaining(u64::MAX, 0), i64::MAX);
    }
}
