use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tokio::select;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Configuration;
use crate::error::{FetchError, PoolError};
use crate::events::{EngineCommand, EngineEvent, ErrorKind, PlayState, SwapEvent};
use crate::model::ResultSet;
use crate::pool::PoolManager;
use crate::provider::SearchProvider;
use crate::tasks::refresh::RefreshWorker;
use crate::tasks::scheduler::RotationScheduler;

/// Running engine: the controller task plus a handle for issuing commands.
pub struct Engine {
    handle: EngineHandle,
    pool: PoolManager,
    task: JoinHandle<()>,
}

/// Cloneable command surface for the shell.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<EngineCommand>,
}

impl Engine {
    /// Wire the pool, refresh worker and scheduler and start the controller.
    ///
    /// The returned receiver carries every event the rendering side needs.
    pub fn spawn(
        cfg: &Configuration,
        provider: Arc<dyn SearchProvider>,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<EngineEvent>) {
        let (events_tx, events_rx) = mpsc::channel(cfg.event_buffer);
        let (commands_tx, commands_rx) = mpsc::channel(16);
        let (swap_tx, swap_rx) = mpsc::channel(cfg.event_buffer);
        let (worker_tx, worker_rx) = mpsc::unbounded_channel();

        let pool = PoolManager::new(cfg.slot_count, cfg.rng_seed);
        let scheduler = RotationScheduler::spawn(
            pool.clone(),
            cfg.rotation_interval,
            swap_tx,
            cancel.clone(),
        );
        let controller = Controller {
            pool: pool.clone(),
            worker: RefreshWorker::new(provider, cfg.slot_count),
            scheduler,
            events: events_tx,
            worker_tx,
            cancel: cancel.clone(),
            refresh_seq: 0,
            in_flight: None,
        };

        info!(
            slots = cfg.slot_count,
            interval = %humantime::format_duration(cfg.rotation_interval),
            "engine starting"
        );
        let task = tokio::spawn(run(controller, commands_rx, worker_rx, swap_rx, cancel));
        let engine = Self {
            handle: EngineHandle {
                commands: commands_tx,
            },
            pool,
            task,
        };
        (engine, events_rx)
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    pub fn pool(&self) -> &PoolManager {
        &self.pool
    }

    /// Wait for the controller to exit (after `stop` or cancellation).
    pub async fn join(self) -> Result<()> {
        self.task.await.context("engine task failed")
    }
}

impl EngineHandle {
    pub async fn refresh(&self, query: impl Into<String>) -> Result<()> {
        self.send(EngineCommand::Refresh(query.into())).await
    }

    pub async fn play(&self) -> Result<()> {
        self.send(EngineCommand::Play).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.send(EngineCommand::Pause).await
    }

    pub async fn toggle_play(&self) -> Result<()> {
        self.send(EngineCommand::TogglePlay).await
    }

    /// Resolves once rotation has been torn down; no swap happens afterwards.
    pub async fn stop(&self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(EngineCommand::Stop(ack_tx)).await?;
        ack_rx.await.context("engine exited before acknowledging stop")
    }

    async fn send(&self, command: EngineCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| anyhow!("engine is not running"))
    }
}

enum WorkerMessage {
    Progress {
        seq: u64,
        fraction: f64,
    },
    Done {
        seq: u64,
        result: Result<ResultSet, FetchError>,
    },
}

struct InFlight {
    seq: u64,
    cancel: CancellationToken,
    /// Whether rotation should run once this refresh settles.
    resume_after: bool,
}

struct Controller {
    pool: PoolManager,
    worker: RefreshWorker,
    scheduler: RotationScheduler,
    events: mpsc::Sender<EngineEvent>,
    worker_tx: mpsc::UnboundedSender<WorkerMessage>,
    cancel: CancellationToken,
    refresh_seq: u64,
    in_flight: Option<InFlight>,
}

/// Serializes commands, refresh completions and swap forwarding.
///
/// Rules:
/// - At most one refresh is in flight; a newer request cancels the older one
///   and the older one's messages are dropped by sequence number.
/// - Rotation is paused while a refresh runs; play/pause requests made during
///   a refresh only change what happens when it settles.
/// - Swap events from an older pool generation are never forwarded.
async fn run(
    mut ctl: Controller,
    mut commands: mpsc::Receiver<EngineCommand>,
    mut worker_rx: mpsc::UnboundedReceiver<WorkerMessage>,
    mut swap_rx: mpsc::Receiver<SwapEvent>,
    cancel: CancellationToken,
) {
    let mut stop_ack = None;

    loop {
        let step = select! {
            _ = cancel.cancelled() => break,

            cmd = commands.recv() => match cmd {
                Some(EngineCommand::Stop(ack)) => {
                    stop_ack = Some(ack);
                    break;
                }
                Some(cmd) => ctl.handle_command(cmd).await,
                None => break,
            },

            Some(msg) = worker_rx.recv() => ctl.handle_worker(msg).await,

            Some(swap) = swap_rx.recv() => ctl.forward_swap(swap).await,
        };

        if let Err(err) = step {
            warn!("{err:#}; stopping engine");
            break;
        }
    }

    ctl.shutdown().await;
    if let Some(ack) = stop_ack {
        let _ = ack.send(());
    }
}

impl Controller {
    async fn handle_command(&mut self, cmd: EngineCommand) -> Result<()> {
        match cmd {
            EngineCommand::Refresh(query) => self.begin_refresh(query).await,
            EngineCommand::Play => self.set_playing(true).await,
            EngineCommand::Pause => self.set_playing(false).await,
            EngineCommand::TogglePlay => {
                let playing = match &self.in_flight {
                    Some(refresh) => refresh.resume_after,
                    None => self.scheduler.state() == PlayState::Playing,
                };
                self.set_playing(!playing).await
            }
            EngineCommand::Stop(_) => Ok(()),
        }
    }

    async fn set_playing(&mut self, playing: bool) -> Result<()> {
        if !self.pool.is_installed() {
            debug!(playing, "nothing to rotate yet; ignoring play state request");
            return Ok(());
        }
        if let Some(refresh) = self.in_flight.as_mut() {
            debug!(
                refresh = refresh.seq,
                playing, "play state request deferred until refresh settles"
            );
            refresh.resume_after = playing;
            return Ok(());
        }
        let changed = if playing {
            self.scheduler.play()
        } else {
            self.scheduler.pause()
        };
        if changed {
            self.publish_state().await?;
        }
        Ok(())
    }

    async fn begin_refresh(&mut self, query: String) -> Result<()> {
        self.refresh_seq += 1;
        let seq = self.refresh_seq;

        let resume_after = match self.in_flight.take() {
            Some(previous) => {
                warn!(
                    superseded = previous.seq,
                    refresh = seq,
                    "cancelling in-flight refresh"
                );
                previous.cancel.cancel();
                previous.resume_after
            }
            None => {
                let was_playing = self.scheduler.state() == PlayState::Playing;
                if was_playing && self.scheduler.pause() {
                    self.publish_state().await?;
                }
                was_playing
            }
        };

        let cancel = self.cancel.child_token();
        self.in_flight = Some(InFlight {
            seq,
            cancel: cancel.clone(),
            resume_after,
        });
        info!(refresh = seq, query = %query, resume_after, "refresh started");
        self.publish(EngineEvent::Progress {
            refresh: seq,
            fraction: 0.0,
        })
        .await?;

        let worker = self.worker.clone();
        let tx = self.worker_tx.clone();
        tokio::spawn(async move {
            let progress_tx = tx.clone();
            let fetch = worker.fetch(&query, move |fraction| {
                let _ = progress_tx.send(WorkerMessage::Progress { seq, fraction });
            });
            let result = select! {
                _ = cancel.cancelled() => {
                    debug!(refresh = seq, "refresh abandoned");
                    return;
                }
                result = fetch => result,
            };
            let _ = tx.send(WorkerMessage::Done { seq, result });
        });
        Ok(())
    }

    fn is_current(&self, seq: u64) -> bool {
        self.in_flight.as_ref().is_some_and(|f| f.seq == seq)
    }

    async fn handle_worker(&mut self, msg: WorkerMessage) -> Result<()> {
        match msg {
            WorkerMessage::Progress { seq, fraction } => {
                if self.is_current(seq) {
                    debug!(refresh = seq, fraction, "refresh progress");
                    self.publish(EngineEvent::Progress {
                        refresh: seq,
                        fraction,
                    })
                    .await?;
                }
                Ok(())
            }
            WorkerMessage::Done { seq, result } => {
                if !self.is_current(seq) {
                    debug!(refresh = seq, "discarding superseded refresh result");
                    return Ok(());
                }
                let Some(refresh) = self.in_flight.take() else {
                    return Ok(());
                };
                self.finish_refresh(refresh, result).await
            }
        }
    }

    async fn finish_refresh(
        &mut self,
        refresh: InFlight,
        result: Result<ResultSet, FetchError>,
    ) -> Result<()> {
        let set = match result {
            Ok(set) => set,
            Err(err) => {
                warn!(refresh = refresh.seq, "refresh failed: {err}");
                let kind = match err {
                    FetchError::InsufficientResults { .. } => ErrorKind::InsufficientResults,
                    FetchError::Provider(_) | FetchError::Duplicate(_) => ErrorKind::Provider,
                };
                self.publish_error(kind, err.to_string()).await?;
                // The previous pool is still on screen; put rotation back as it was.
                if refresh.resume_after {
                    self.set_playing(true).await?;
                }
                return Ok(());
            }
        };

        match self.pool.install(&set) {
            Ok(replaced) => {
                info!(
                    refresh = refresh.seq,
                    generation = replaced.generation,
                    "refresh installed"
                );
                self.publish(EngineEvent::PoolReplaced(replaced)).await?;
                if refresh.resume_after {
                    self.set_playing(true).await?;
                }
                Ok(())
            }
            Err(err) => {
                warn!(refresh = refresh.seq, "install rejected: {err}");
                let kind = match err {
                    PoolError::InsufficientResults { .. } => ErrorKind::InsufficientResults,
                    PoolError::NoEligibleRecords | PoolError::InvalidState => ErrorKind::Install,
                };
                self.publish_error(kind, err.to_string()).await
            }
        }
    }

    async fn forward_swap(&mut self, swap: SwapEvent) -> Result<()> {
        let generation = self.pool.generation();
        if swap.generation != generation {
            debug!(
                stale = swap.generation,
                current = generation,
                "dropping swap from replaced pool"
            );
            return Ok(());
        }
        self.publish(EngineEvent::Swap(swap)).await
    }

    async fn publish_state(&self) -> Result<()> {
        self.publish(EngineEvent::PlayState(self.scheduler.state()))
            .await
    }

    async fn publish_error(&self, kind: ErrorKind, message: String) -> Result<()> {
        self.publish(EngineEvent::Error { kind, message }).await
    }

    async fn publish(&self, event: EngineEvent) -> Result<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| anyhow!("event receiver closed"))
    }

    async fn shutdown(self) {
        if let Some(refresh) = &self.in_flight {
            refresh.cancel.cancel();
        }
        self.scheduler.shutdown().await;
        info!("engine stopped");
    }
}
