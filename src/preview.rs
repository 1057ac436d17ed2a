use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use crate::{
    clock::Clock,
    config::StreamConfig,
    encode::sink::{EncoderLauncher, EncoderSession},
    foundation::error::LoopcastResult,
    media::source::SourceOpener,
    sequencer::CycleSequencer,
    stop::StopSignal,
};

/// Play the cycle in a local window at the configured frame rate.
///
/// Returns the number of frames shown once the window is closed (its pipe breaks) or a stop is
/// requested. There is no relaunch.
pub fn run_preview<L, O, C>(
    cfg: Arc<StreamConfig>,
    mut launcher: L,
    opener: O,
    clock: C,
    stop: &StopSignal,
) -> LoopcastResult<u64>
where
    L: EncoderLauncher,
    O: SourceOpener,
    C: Clock,
{
    let mut session = launcher.launch()?;
    let guard = stop.arm(session.abort_handle(cfg.shutdown_grace()));
    let mut sequencer = CycleSequencer::new(Arc::clone(&cfg), opener, clock)?;
    let mut pacer = Pacer::new(cfg.fps.frame_duration());
    let mut shown = 0u64;

    let result = loop {
        if stop.is_triggered() {
            break Ok(());
        }
        let item = match sequencer.next_frame() {
            Ok(item) => item,
            Err(e) => break Err(e),
        };
        if let Err(e) = session.write_frame(&item.frame) {
            tracing::info!("preview window closed ({e})");
            break Ok(());
        }
        shown += 1;
        if stop.wait_timeout(pacer.until_next()) {
            break Ok(());
        }
    };

    drop(guard);
    session.shutdown(cfg.shutdown_grace());
    result.map(|()| shown)
}

/// Fixed-rate schedule anchored at the first frame, so per-frame jitter does not accumulate.
struct Pacer {
    interval: Duration,
    next: Option<Instant>,
}

impl Pacer {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: None,
        }
    }

    fn until_next(&mut self) -> Duration {
        self.until_next_at(Instant::now())
    }

    fn until_next_at(&mut self, now: Instant) -> Duration {
        let next = self.next.map_or(now + self.interval, |n| n + self.interval);
        // Fell more than a frame behind: resynchronise instead of bursting.
        let next = if next + self.interval < now {
            now + self.interval
        } else {
            next
        };
        self.next = Some(next);
        next.saturating_duration_since(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pacer_keeps_a_steady_schedule() {
        let step = Duration::from_millis(40);
        let mut p = Pacer::new(step);
        let t0 = Instant::now();
        assert_eq!(p.until_next_at(t0), step);
        // Work took 10ms, so the wait shrinks to keep the cadence.
        let late = t0 + step + Duration::from_millis(10);
        assert_eq!(p.until_next_at(late), Duration::from_millis(30));
    }

    #[test]
    fn pacer_resyncs_after_a_stall() {
        let step = Duration::from_millis(40);
        let mut p = Pacer::new(step);
        let t0 = Instant::now();
        p.until_next_at(t0);
        assert_eq!(p.until_next_at(t0 + Duration::from_secs(2)), step);
    }
}
