//! Lifecycle Controller: couples viewer presence reported by an Egress
//! Transport to Frame Source connect/disconnect and the Frame Broker's
//! producer loop. Grounded on `gl_stream::lib.rs`'s subscriber-count
//! gating (`subscribers.load() == 0` sleep loop), generalized to the
//! explicit two-state machine in the spec.

use crate::broker::FrameBroker;
use bc_core::Result;
use bc_source::FrameSource;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

enum State {
    Idle,
    Running {
        cancel: CancellationToken,
        handle: JoinHandle<()>,
        generation: u64,
    },
}

/// IDLE ⇄ RUNNING, driven entirely by viewer-count deltas. The upstream
/// tunnel is a scarce, device-side resource: holding it open with zero
/// viewers would block legitimate use of the printer's own UI.
pub struct LifecycleController {
    source: Arc<dyn FrameSource>,
    broker: Arc<FrameBroker>,
    state: Arc<Mutex<State>>,
    generation: AtomicU64,
}

impl LifecycleController {
    pub fn new(source: Arc<dyn FrameSource>, broker: Arc<FrameBroker>) -> Self {
        Self {
            source,
            broker,
            state: Arc::new(Mutex::new(State::Idle)),
            generation: AtomicU64::new(0),
        }
    }

    pub fn broker(&self) -> &Arc<FrameBroker> {
        &self.broker
    }

    /// Called by an Egress Transport whenever its viewer count changes.
    /// A 0→≥1 transition connects the Frame Source and starts the
    /// producer loop; a ≥1→0 transition stops the loop and disconnects.
    /// Transitions among nonzero counts, or staying at zero, are no-ops.
    /// The viewer count is always mirrored onto `BrokerMetrics::active_viewers`,
    /// even for the no-op transitions, since that gauge tracks presence,
    /// not connect/disconnect edges.
    pub async fn on_viewer_count_changed(&self, count: usize) -> Result<()> {
        self.broker.metrics().active_viewers.set(count as i64);

        let mut state = self.state.lock().await;

        match (&*state, count) {
            (State::Idle, c) if c > 0 => {
                info!(viewer_count = c, "viewer count left zero, connecting frame source");
                let cancel = CancellationToken::new();

                if let Err(e) = self.source.connect(cancel.clone()).await {
                    error!(error = %e, "frame source connect failed, staying idle");
                    return Err(e);
                }
                self.broker.slot().reset().await;

                let my_generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                let broker = self.broker.clone();
                let source = self.source.clone();
                let state_for_task = self.state.clone();
                let producer_cancel = cancel.clone();

                // This task outlives `on_viewer_count_changed`'s call: it
                // is the only place that tears the state back down to
                // `Idle`, whether that is because a viewer-count
                // transition cancelled it or because the producer failed
                // on its own (spec's "Upstream fatal" case). The
                // `generation` check stops it from clobbering a
                // connection that reconnected after this one was
                // deliberately stopped.
                let handle = tokio::spawn(async move {
                    if let Err(e) = broker.run_producer(producer_cancel).await {
                        error!(
                            error = %e,
                            "frame broker producer exited with an error, tearing lifecycle back down to idle"
                        );
                    }

                    let mut state = state_for_task.lock().await;
                    let still_current =
                        matches!(&*state, State::Running { generation, .. } if *generation == my_generation);
                    if still_current {
                        *state = State::Idle;
                        source.disconnect().await;
                    }
                });

                *state = State::Running { cancel, handle, generation: my_generation };
            }
            (State::Running { .. }, 0) => {
                info!("viewer count reached zero, stopping producer and disconnecting");
                // The supervisor task spawned when this connection
                // started needs this same lock to check whether it
                // should disconnect after the producer exits; setting
                // the state to `Idle` here marks this run as no longer
                // current (so the supervisor's own disconnect is
                // skipped) and the guard is dropped before awaiting
                // `handle`, so the two never deadlock on each other.
                let previous = std::mem::replace(&mut *state, State::Idle);
                drop(state);
                if let State::Running { cancel, handle, .. } = previous {
                    cancel.cancel();
                    let _ = handle.await;
                }
                self.source.disconnect().await;
            }
            _ => {}
        }

        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        matches!(*self.state.lock().await, State::Running { .. })
    }

    /// Forces a shutdown regardless of viewer count, used when the
    /// process is exiting.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        let previous = std::mem::replace(&mut *state, State::Idle);
        drop(state);
        if let State::Running { cancel, handle, .. } = previous {
            cancel.cancel();
            let _ = handle.await;
            self.source.disconnect().await;
        }
    }
}
