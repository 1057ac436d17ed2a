use std::{
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use anyhow::Context as _;

use crate::foundation::error::LoopcastResult;

/// Callback that starts a forced end of a running session, callable from any thread.
pub type AbortHandle = Arc<dyn Fn() + Send + Sync>;

/// Operator stop request shared between the signal handler and the streaming loop.
///
/// Triggering wakes any [`StopSignal::wait_timeout`] and runs every armed abort handle. A
/// session's handle kills its process only after the shutdown grace, so a write blocked on a
/// full pipe still returns while a healthy encoder gets to flush.
#[derive(Clone, Default)]
pub struct StopSignal {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<StopState>,
    cvar: Condvar,
}

#[derive(Default)]
struct StopState {
    triggered: bool,
    armed: Vec<(u64, AbortHandle)>,
    next_id: u64,
}

/// Keeps an abort handle registered until dropped.
#[must_use = "the abort handle is disarmed when the guard is dropped"]
pub struct ArmGuard {
    signal: StopSignal,
    id: Option<u64>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        let handles: Vec<AbortHandle> = {
            let mut st = self.lock();
            st.triggered = true;
            st.armed.iter().map(|(_, h)| Arc::clone(h)).collect()
        };
        self.inner.cvar.notify_all();
        for handle in handles {
            handle();
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.lock().triggered
    }

    /// Sleep up to `timeout`; returns `true` if a stop was requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.lock();
        let (guard, _) = self
            .inner
            .cvar
            .wait_timeout_while(guard, timeout, |st| !st.triggered)
            .unwrap_or_else(PoisonError::into_inner);
        guard.triggered
    }

    /// Register `handle` to run on trigger. Runs it at once if a stop is already pending.
    pub fn arm(&self, handle: AbortHandle) -> ArmGuard {
        let mut st = self.lock();
        if st.triggered {
            drop(st);
            handle();
            return ArmGuard {
                signal: self.clone(),
                id: None,
            };
        }
        let id = st.next_id;
        st.next_id += 1;
        st.armed.push((id, handle));
        ArmGuard {
            signal: self.clone(),
            id: Some(id),
        }
    }

    /// Trigger on SIGINT/SIGTERM (Ctrl-C on Windows).
    pub fn install_ctrlc(&self) -> LoopcastResult<()> {
        let signal = self.clone();
        ctrlc::set_handler(move || {
            tracing::info!("stop requested");
            signal.trigger();
        })
        .context("install Ctrl-C handler")?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, StopState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ArmGuard {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.signal.lock().armed.retain(|(armed, _)| *armed != id);
        }
    }
}
