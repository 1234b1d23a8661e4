//! Background solving for interactive front ends.
//!
//! A [`SolveWorker`] owns one thread and a single-slot mailbox. Submitting replaces whatever
//! request is still waiting, so a burst of parameter edits collapses into one follow-up solve
//! with the latest values. A request that is already being solved is never touched.

use log::{debug, warn};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crate::error::SolveResult;
use crate::parameters::{PressureLaw, SolverSettings, UserParameters};
use crate::result::EquilibriumShape;
use crate::solve::solve_with;

#[derive(Debug, Clone, PartialEq)]
pub struct SolveRequest {
    pub params: UserParameters,
    pub law: PressureLaw,
}

#[derive(Default)]
struct Mailbox {
    pending: Option<SolveRequest>,
    shutdown: bool,
}

#[derive(Default)]
struct Shared {
    mailbox: Mutex<Mailbox>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Mailbox> {
        self.mailbox.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct SolveWorker {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl SolveWorker {
    /// Starts a worker that runs `solve` on each request and hands the output to `deliver`.
    ///
    /// A panic in either callback drops that request and the worker keeps serving later ones.
    pub fn spawn<R, F, D>(mut solve: F, mut deliver: D) -> Self
    where
        R: Send + 'static,
        F: FnMut(&SolveRequest) -> R + Send + 'static,
        D: FnMut(SolveRequest, R) + Send + 'static,
    {
        let shared = Arc::new(Shared::default());
        let worker_shared = Arc::clone(&shared);
        let handle = thread::spawn(move || loop {
            let request = {
                let mut mailbox = worker_shared.lock();
                while mailbox.pending.is_none() && !mailbox.shutdown {
                    mailbox = worker_shared
                        .wake
                        .wait(mailbox)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                if mailbox.shutdown {
                    break;
                }
                match mailbox.pending.take() {
                    Some(request) => request,
                    None => continue,
                }
            };
            debug!("Solve worker picked up a {:?} request.", request.law);
            let handled = panic::catch_unwind(AssertUnwindSafe(|| {
                let output = solve(&request);
                deliver(request, output);
            }));
            if handled.is_err() {
                warn!("Solve worker dropped a request whose solve or delivery panicked.");
            }
        });
        Self {
            shared,
            handle: Some(handle),
        }
    }

    /// Worker that runs the regular solver with fixed settings.
    pub fn with_settings<D>(settings: SolverSettings, deliver: D) -> Self
    where
        D: FnMut(SolveRequest, SolveResult<EquilibriumShape>) + Send + 'static,
    {
        Self::spawn(
            move |request: &SolveRequest| solve_with(&request.params, request.law, &settings),
            deliver,
        )
    }

    /// Queues `request`, replacing any request that has not started yet.
    ///
    /// Returns `true` when an older pending request was superseded.
    pub fn submit(&self, request: SolveRequest) -> bool {
        let mut mailbox = self.shared.lock();
        let superseded = mailbox.pending.replace(request).is_some();
        if superseded {
            debug!("Superseded a pending solve request.");
        }
        drop(mailbox);
        self.shared.wake.notify_one();
        superseded
    }

    /// Stops the worker after the solve in flight, dropping any pending request.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.shared.lock().shutdown = true;
            self.shared.wake.notify_one();
            if handle.join().is_err() {
                warn!("Solve worker thread panicked.");
            }
        }
    }
}

impl Drop for SolveWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
