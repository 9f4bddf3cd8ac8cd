//! Starts and stops one consume worker as a feature flag flips.
//!
//! Flag events become [`LifecycleCommand`]s on an unbounded channel and a
//! single controller task applies them in order, so concurrent `true`
//! notifications still launch exactly one worker.

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::core::error::FlagError;
use crate::core::flags::{ChangeHandler, FlagChange, FlagStore};
use crate::runtime::consume::ConsumeLoop;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Running,
}

#[derive(Debug)]
pub(crate) enum LifecycleCommand {
    FlagChanged(bool),
    WorkerExited { generation: u64 },
    Sync(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

struct Shared {
    running: AtomicBool,
    workers_started: AtomicUsize,
    state: watch::Sender<LifecycleState>,
}

/// Handle to a flag-gated subscription.
pub struct ConsumerLifecycleController {
    flag_key: String,
    commands: mpsc::UnboundedSender<LifecycleCommand>,
    shared: Arc<Shared>,
}

impl ConsumerLifecycleController {
    /// Registers the flag listener, evaluates the flag and starts the worker
    /// if it is on. Must be called inside a Tokio runtime.
    pub(crate) fn spawn<K, V>(
        flags: Arc<FlagStore>,
        flag_key: &str,
        worker: ConsumeLoop<K, V>,
    ) -> Result<Arc<Self>, FlagError>
    where
        K: Send + Sync + 'static,
        V: Any + Send + Sync + 'static,
    {
        let (commands, inbox) = mpsc::unbounded_channel();

        let listener_commands = commands.clone();
        let on_change: ChangeHandler = Arc::new(move |change: &FlagChange| {
            // the controller may have been shut down already
            let _ = listener_commands.send(LifecycleCommand::FlagChanged(change.new));
        });
        flags.subscribe_to_changes(flag_key, Some(on_change))?;
        let enabled = flags.evaluate(flag_key, false)?;

        let (state, _) = watch::channel(LifecycleState::Stopped);
        let shared = Arc::new(Shared {
            running: AtomicBool::new(false),
            workers_started: AtomicUsize::new(0),
            state,
        });

        let actor = Actor {
            flag_key: flag_key.to_string(),
            template: worker,
            shared: Arc::clone(&shared),
            commands: commands.clone(),
            active: None,
            generation: 0,
        };
        tokio::spawn(actor.run(inbox));

        if enabled {
            let _ = commands.send(LifecycleCommand::FlagChanged(true));
        }
        info!(flag_key, enabled, "consumer lifecycle controller started");

        Ok(Arc::new(Self {
            flag_key: flag_key.to_string(),
            commands,
            shared,
        }))
    }

    pub fn flag_key(&self) -> &str {
        &self.flag_key
    }

    pub fn state(&self) -> LifecycleState {
        *self.shared.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<LifecycleState> {
        self.shared.state.subscribe()
    }

    /// The running guard: true from the moment a start wins until its worker exits.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn workers_started(&self) -> usize {
        self.shared.workers_started.load(Ordering::Acquire)
    }

    /// Resolves once every command queued before this call has been applied.
    pub async fn settled(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(LifecycleCommand::Sync(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Stops any worker and ends the controller task. Later flag changes are ignored.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(LifecycleCommand::Shutdown(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

struct ActiveWorker {
    generation: u64,
    cancel: watch::Sender<bool>,
    supervisor: JoinHandle<()>,
}

struct Actor<K, V> {
    flag_key: String,
    template: ConsumeLoop<K, V>,
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<LifecycleCommand>,
    active: Option<ActiveWorker>,
    generation: u64,
}

impl<K, V> Actor<K, V>
where
    K: Send + Sync + 'static,
    V: Any + Send + Sync + 'static,
{
    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<LifecycleCommand>) {
        while let Some(command) = inbox.recv().await {
            match command {
                LifecycleCommand::FlagChanged(true) => self.start(),
                LifecycleCommand::FlagChanged(false) => self.stop().await,
                LifecycleCommand::WorkerExited { generation } => self.reap(generation),
                LifecycleCommand::Sync(reply) => {
                    let _ = reply.send(());
                }
                LifecycleCommand::Shutdown(reply) => {
                    self.stop().await;
                    let _ = reply.send(());
                    break;
                }
            }
        }
        info!(flag_key = %self.flag_key, "consumer lifecycle controller stopped");
    }

    fn start(&mut self) {
        if self
            .shared
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(flag_key = %self.flag_key, "consumer already running");
            return;
        }

        self.generation += 1;
        let generation = self.generation;
        let (cancel, cancel_rx) = watch::channel(false);
        let worker = tokio::spawn(self.template.clone().run(cancel_rx));
        self.shared.workers_started.fetch_add(1, Ordering::AcqRel);

        let shared = Arc::clone(&self.shared);
        let commands = self.commands.clone();
        let flag_key = self.flag_key.clone();
        let supervisor = tokio::spawn(async move {
            match worker.await {
                Ok(()) => debug!(%flag_key, generation, "consumer worker exited"),
                Err(err) if err.is_panic() => error!(
                    %flag_key,
                    generation,
                    "consumer worker panicked; it stays down until the flag changes again"
                ),
                Err(err) => warn!(%flag_key, generation, %err, "consumer worker aborted"),
            }
            shared.running.store(false, Ordering::Release);
            let _ = commands.send(LifecycleCommand::WorkerExited { generation });
        });

        self.active = Some(ActiveWorker {
            generation,
            cancel,
            supervisor,
        });
        self.shared.state.send_replace(LifecycleState::Running);
        info!(flag_key = %self.flag_key, generation, "consumer worker started");
    }

    async fn stop(&mut self) {
        let Some(active) = self.active.take() else {
            debug!(flag_key = %self.flag_key, "consumer already stopped");
            return;
        };

        let _ = active.cancel.send(true);
        if let Err(err) = active.supervisor.await {
            error!(flag_key = %self.flag_key, %err, "consumer supervisor failed");
        }
        self.shared.running.store(false, Ordering::Release);
        self.shared.state.send_replace(LifecycleState::Stopped);
        info!(flag_key = %self.flag_key, generation = active.generation, "consumer worker stopped");
    }

    /// A worker ended on its own. Stale generations were already stopped.
    fn reap(&mut self, generation: u64) {
        if self.active.as_ref().map(|a| a.generation) != Some(generation) {
            return;
        }
        self.active = None;
        self.shared.state.send_replace(LifecycleState::Stopped);
        warn!(
            flag_key = %self.flag_key,
            generation,
            "consumer worker is no longer running and will not restart until the flag changes"
        );
    }
}
