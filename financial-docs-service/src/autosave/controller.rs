use super::backup::{write_backup, BackupStore};
use super::state::{AutosaveState, SavePhase};
use super::{AutosaveConfig, AutosaveError, SaveError, SaveTarget};
use crate::services::metrics::{BACKUPS_TOTAL, SAVES_TOTAL, SAVE_DURATION};
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use service_core::retry::Retryable;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Invoked on every failed save.
pub type ErrorCallback = Arc<dyn Fn(&SaveError) + Send + Sync>;

type Reply = oneshot::Sender<Result<(), AutosaveError>>;

enum Command<T> {
    Update(T),
    SaveNow(Reply),
}

/// Builder for an autosave task.
pub struct AutosaveController<T> {
    config: AutosaveConfig,
    target: Arc<dyn SaveTarget<T>>,
    backup: Option<Arc<dyn BackupStore>>,
    baseline: Option<T>,
    on_error: Option<ErrorCallback>,
}

impl<T> AutosaveController<T>
where
    T: Clone + PartialEq + Serialize + Send + Sync + 'static,
{
    pub fn new(config: AutosaveConfig, target: Arc<dyn SaveTarget<T>>) -> Self {
        Self {
            config,
            target,
            backup: None,
            baseline: None,
            on_error: None,
        }
    }

    /// Write periodic backups to `store`.
    pub fn with_backup_store(mut self, store: Arc<dyn BackupStore>) -> Self {
        self.backup = Some(store);
        self
    }

    /// The value already persisted. Observing it again is not a change.
    pub fn with_baseline(mut self, value: T) -> Self {
        self.baseline = Some(value);
        self
    }

    pub fn on_error(mut self, callback: impl Fn(&SaveError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }

    /// Start the controller task. Must be called inside a tokio runtime.
    pub fn spawn(self) -> AutosaveHandle<T> {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(AutosaveState::default());
        let cancel = CancellationToken::new();

        let worker = Worker {
            config: self.config,
            target: self.target,
            backup: self.backup,
            on_error: self.on_error,
            state: state_tx,
            latest: self.baseline,
            generation: 0,
            saved_generation: 0,
            backed_up_generation: 0,
            deadline: None,
            retry_attempt: 0,
            consecutive_failures: 0,
            queued: Vec::new(),
            manual_pending: false,
        };
        let task = tokio::spawn(worker.run(command_rx, cancel.clone()));

        AutosaveHandle {
            commands: command_tx,
            state: state_rx,
            cancel,
            task: Some(task),
        }
    }
}

/// Owner's side of a running controller. Dropping it stops the task.
pub struct AutosaveHandle<T> {
    commands: mpsc::UnboundedSender<Command<T>>,
    state: watch::Receiver<AutosaveState>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl<T> AutosaveHandle<T> {
    /// Report the current value. Equal consecutive values are ignored; any
    /// change restarts the debounce.
    pub fn update(&self, value: T) -> Result<(), AutosaveError> {
        self.commands
            .send(Command::Update(value))
            .map_err(|_| AutosaveError::Closed)
    }

    /// Save the latest value now, after any save already in flight.
    pub async fn save_now(&self) -> Result<(), AutosaveError> {
        let (reply, outcome) = oneshot::channel();
        self.commands
            .send(Command::SaveNow(reply))
            .map_err(|_| AutosaveError::Closed)?;
        outcome.await.map_err(|_| AutosaveError::Closed)?
    }

    pub fn state(&self) -> AutosaveState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AutosaveState> {
        self.state.clone()
    }

    /// Stop all timers and wait for a save already in flight to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Autosave task ended abnormally");
            }
        }
    }
}

impl<T> Drop for AutosaveHandle<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct InFlight {
    future: BoxFuture<'static, Result<(), SaveError>>,
    generation: u64,
    started: Instant,
    waiters: Vec<Reply>,
}

async fn next_result(in_flight: &mut Option<InFlight>) -> Result<(), SaveError> {
    match in_flight {
        Some(flight) => flight.future.as_mut().await,
        None => std::future::pending().await,
    }
}

struct Worker<T> {
    config: AutosaveConfig,
    target: Arc<dyn SaveTarget<T>>,
    backup: Option<Arc<dyn BackupStore>>,
    on_error: Option<ErrorCallback>,
    state: watch::Sender<AutosaveState>,
    /// Last observed value.
    latest: Option<T>,
    /// Bumped on every observed change.
    generation: u64,
    saved_generation: u64,
    backed_up_generation: u64,
    /// Debounce or retry deadline.
    deadline: Option<Instant>,
    retry_attempt: u32,
    consecutive_failures: u32,
    /// `save_now` callers waiting for the next save.
    queued: Vec<Reply>,
    manual_pending: bool,
}

impl<T> Worker<T>
where
    T: Clone + PartialEq + Serialize + Send + Sync + 'static,
{
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command<T>>,
        cancel: CancellationToken,
    ) {
        let backup_period = self.config.backup_interval.max(Duration::from_millis(1));
        let mut backup_timer = interval_at(Instant::now() + backup_period, backup_period);
        backup_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let backups_enabled =
            self.config.enabled && self.backup.is_some() && !self.config.backup_interval.is_zero();

        let mut in_flight: Option<InFlight> = None;

        loop {
            let deadline = self.deadline;
            let saving = in_flight.is_some();

            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                result = next_result(&mut in_flight), if saving => {
                    if let Some(flight) = in_flight.take() {
                        self.finish_save(flight, result);
                    }
                    if self.manual_pending {
                        in_flight = self.start_save();
                    }
                }

                command = commands.recv() => match command {
                    Some(Command::Update(value)) => self.observe(value, saving),
                    Some(Command::SaveNow(reply)) => {
                        self.queued.push(reply);
                        if saving {
                            self.manual_pending = true;
                        } else {
                            in_flight = self.start_save();
                        }
                    }
                    None => break,
                },

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() && !saving => {
                    self.deadline = None;
                    in_flight = self.start_save();
                }

                _ = backup_timer.tick(), if backups_enabled => self.write_backup().await,
            }
        }

        // Timers stop here; a save already started is allowed to land.
        if let Some(mut flight) = in_flight.take() {
            let result = flight.future.as_mut().await;
            self.finish_save(flight, result);
        }
        for reply in self.queued.drain(..) {
            let _ = reply.send(Err(AutosaveError::Closed));
        }
        debug!(save_key = %self.config.save_key, "Autosave controller stopped");
    }

    fn publish(&self, change: impl FnOnce(&mut AutosaveState)) {
        self.state.send_modify(change);
    }

    fn observe(&mut self, value: T, saving: bool) {
        if self.latest.as_ref() == Some(&value) {
            return;
        }
        self.latest = Some(value);
        self.generation += 1;
        self.retry_attempt = 0;

        let enabled = self.config.enabled;
        if enabled {
            self.deadline = Some(Instant::now() + self.config.delay);
        }
        self.publish(|s| {
            s.has_unsaved_changes = true;
            if !saving && enabled {
                s.phase = SavePhase::PendingSave;
            }
        });
    }

    fn start_save(&mut self) -> Option<InFlight> {
        self.manual_pending = false;
        let waiters = std::mem::take(&mut self.queued);

        let value = match &self.latest {
            Some(value) if self.generation != self.saved_generation => value.clone(),
            _ => {
                for reply in waiters {
                    let _ = reply.send(Ok(()));
                }
                return None;
            }
        };

        // This save carries every change observed so far.
        self.deadline = None;

        let target = Arc::clone(&self.target);
        let limit = self.config.save_timeout;
        let future = async move {
            match timeout(limit, target.save(&value)).await {
                Ok(result) => result,
                Err(_) => Err(SaveError::Transient(format!(
                    "save timed out after {}s",
                    limit.as_secs_f64()
                ))),
            }
        }
        .boxed();

        self.publish(|s| {
            s.is_saving = true;
            s.phase = SavePhase::Saving;
        });

        Some(InFlight {
            future,
            generation: self.generation,
            started: Instant::now(),
            waiters,
        })
    }

    fn finish_save(&mut self, flight: InFlight, result: Result<(), SaveError>) {
        let elapsed = flight.started.elapsed().as_secs_f64();
        let reply = match result {
            Ok(()) => {
                SAVES_TOTAL.with_label_values(&["saved"]).inc();
                SAVE_DURATION.with_label_values(&["saved"]).observe(elapsed);

                self.saved_generation = flight.generation;
                self.retry_attempt = 0;
                self.consecutive_failures = 0;
                let dirty = self.generation != self.saved_generation;

                self.publish(|s| {
                    s.is_saving = false;
                    s.last_saved_at = Some(Utc::now());
                    s.has_unsaved_changes = dirty;
                    s.last_error = None;
                    s.consecutive_failures = 0;
                    s.persistent_error = false;
                    s.phase = if dirty {
                        SavePhase::PendingSave
                    } else {
                        SavePhase::Idle
                    };
                });
                info!(save_key = %self.config.save_key, "Autosaved");
                Ok(())
            }
            Err(SaveError::Validation(reason)) => {
                SAVES_TOTAL.with_label_values(&["skipped"]).inc();
                debug!(save_key = %self.config.save_key, reason = %reason, "Save skipped");

                let pending = self.deadline.is_some();
                self.publish(|s| {
                    s.is_saving = false;
                    s.phase = if pending {
                        SavePhase::PendingSave
                    } else {
                        SavePhase::Idle
                    };
                });
                Err(AutosaveError::Save(SaveError::Validation(reason)))
            }
            Err(error) => {
                SAVES_TOTAL.with_label_values(&["failed"]).inc();
                SAVE_DURATION.with_label_values(&["failed"]).observe(elapsed);

                self.consecutive_failures += 1;
                let failures = self.consecutive_failures;
                let persistent = failures >= self.config.failure_threshold;

                if let Some(callback) = &self.on_error {
                    callback(&error);
                }

                if self.config.enabled
                    && error.is_retryable()
                    && self.deadline.is_none()
                    && self.retry_attempt < self.config.retry.max_retries
                {
                    let backoff = self.config.retry.backoff_duration(self.retry_attempt);
                    self.retry_attempt += 1;
                    self.deadline = Some(Instant::now() + backoff);
                    warn!(
                        save_key = %self.config.save_key,
                        error = %error,
                        failures,
                        retry_in_ms = backoff.as_millis() as u64,
                        "Save failed, retrying"
                    );
                } else {
                    warn!(
                        save_key = %self.config.save_key,
                        error = %error,
                        failures,
                        "Save failed"
                    );
                }

                let message = error.to_string();
                self.publish(|s| {
                    s.is_saving = false;
                    s.last_error = Some(message);
                    s.consecutive_failures = failures;
                    s.persistent_error = s.persistent_error || persistent;
                    s.phase = SavePhase::Error;
                });
                Err(AutosaveError::Save(error))
            }
        };

        for waiter in flight.waiters {
            let _ = waiter.send(reply.clone());
        }
    }

    async fn write_backup(&mut self) {
        if self.generation == self.backed_up_generation {
            return;
        }
        let (Some(store), Some(value)) = (&self.backup, &self.latest) else {
            return;
        };

        match write_backup(store.as_ref(), &self.config.save_key, value).await {
            Ok(()) => {
                BACKUPS_TOTAL.with_label_values(&["written"]).inc();
                self.backed_up_generation = self.generation;
                debug!(save_key = %self.config.save_key, "Backup written");
            }
            Err(e) => {
                BACKUPS_TOTAL.with_label_values(&["failed"]).inc();
                warn!(save_key = %self.config.save_key, error = %e, "Backup failed");
            }
        }
    }
}
