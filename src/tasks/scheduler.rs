use std::time::Duration;

use tokio::select;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::{PlayState, SwapEvent};
use crate::pool::PoolManager;

/// Periodic rotation driven by a `PlayState` watch channel.
///
/// Rules:
/// - Ticks only while `Playing`; the first tick lands one full interval after
///   entering `Playing`, and missed ticks are never replayed.
/// - Each tick performs one `PoolManager::swap_once`; a refused swap is skipped.
/// - `shutdown` returns only after the ticking task has exited.
pub struct RotationScheduler {
    state: watch::Sender<PlayState>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl RotationScheduler {
    pub fn spawn(
        pool: PoolManager,
        interval: Duration,
        swaps: mpsc::Sender<SwapEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let (state, state_rx) = watch::channel(PlayState::Stopped);
        let cancel = cancel.child_token();
        let task = tokio::spawn(run(pool, interval, state_rx, swaps, cancel.clone()));
        Self {
            state,
            cancel,
            task,
        }
    }

    pub fn state(&self) -> PlayState {
        *self.state.borrow()
    }

    /// Start or resume ticking. Returns whether the state changed.
    pub fn play(&self) -> bool {
        self.transition(PlayState::Playing)
    }

    /// Stop ticking until the next `play`. Idempotent.
    pub fn pause(&self) -> bool {
        self.transition(PlayState::Paused)
    }

    fn transition(&self, next: PlayState) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            info!(state = ?next, "rotation state changed");
        }
        changed
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(err) = self.task.await {
            warn!("rotation task ended abnormally: {err}");
        }
    }
}

async fn run(
    pool: PoolManager,
    interval: Duration,
    mut state_rx: watch::Receiver<PlayState>,
    swaps: mpsc::Sender<SwapEvent>,
    cancel: CancellationToken,
) {
    loop {
        while *state_rx.borrow_and_update() != PlayState::Playing {
            select! {
                _ = cancel.cancelled() => return,
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }

        debug!(interval_ms = interval.as_millis() as u64, "rotation ticking");
        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            select! {
                biased;

                _ = cancel.cancelled() => return,

                changed = state_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    if *state_rx.borrow_and_update() != PlayState::Playing {
                        debug!("rotation idle");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    if *state_rx.borrow() != PlayState::Playing {
                        continue;
                    }
                    match pool.swap_once() {
                        Ok(swap) => {
                            select! {
                                biased;
                                _ = cancel.cancelled() => return,
                                sent = swaps.send(swap) => {
                                    if sent.is_err() {
                                        warn!("swap receiver closed");
                                        return;
                                    }
                                }
                            }
                        }
                        Err(err) => debug!(error = %err, "rotation tick skipped"),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::test_result_set;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn ticks_only_while_playing() {
        let pool = PoolManager::new(4, Some(11));
        pool.install(&test_result_set(6)).unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        let scheduler =
            RotationScheduler::spawn(pool, Duration::from_millis(20), tx, CancellationToken::new());

        let idle = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(idle.is_err(), "stopped scheduler must not tick");

        assert!(scheduler.play());
        assert!(!scheduler.play());
        let swap = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("tick expected while playing")
            .expect("channel open");
        assert_eq!(swap.generation, 1);

        scheduler.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn uninstalled_pool_ticks_are_swallowed() {
        let pool = PoolManager::new(4, Some(12));
        let (tx, mut rx) = mpsc::channel(16);
        let scheduler = RotationScheduler::spawn(
            pool.clone(),
            Duration::from_millis(10),
            tx,
            CancellationToken::new(),
        );
        scheduler.play();

        let none = tokio::time::timeout(Duration::from_millis(80), rx.recv()).await;
        assert!(none.is_err());

        pool.install(&test_result_set(5)).unwrap();
        let swap = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
        assert!(matches!(swap, Ok(Some(_))), "ticking continues after skipped ticks");

        scheduler.shutdown().await;
    }
}
