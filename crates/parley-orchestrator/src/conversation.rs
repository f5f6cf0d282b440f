//! The per-conversation state machine.
//!
//! ```text
//! Idle ──inbound──▶ Collecting ──debounce expires──▶ Processing ──exit──▶ Idle
//!                      ▲   │ inbound re-arms the timer      │
//!                      └───┴──────── inbound preempts ◀─────┘
//! ```
//!
//! Each conversation is a single task that owns its pending list, debounce
//! deadline, presence handle and the join handle of its active run, so none
//! of that state is shared or locked.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parley_channels::InboundMessage;
use parley_core::ConversationId;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use crate::dispatch::ConversationState;
use crate::pipeline::{run_batch, RunOutcome};
use crate::services::Services;
use crate::task::TaskController;
use crate::typing::PresenceHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// Messages pending, debounce timer armed.
    Collecting,
    Processing,
}

/// Current phase and when it was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub phase: Phase,
    pub since: Instant,
}

impl Status {
    fn now(phase: Phase) -> Self {
        Self {
            phase,
            since: Instant::now(),
        }
    }
}

/// Registry-side handle to a running conversation task.
pub struct ConversationHandle {
    tx: mpsc::UnboundedSender<InboundMessage>,
    status: watch::Receiver<Status>,
    state: Arc<Mutex<ConversationState>>,
    /// Messages sent but not yet taken in by the task.
    queued: Arc<AtomicUsize>,
}

impl ConversationHandle {
    pub fn spawn(
        id: ConversationId,
        services: Arc<Services>,
        controller: TaskController,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(Status::now(Phase::Idle));
        let state = Arc::new(Mutex::new(ConversationState::new(
            services.config.history.max_entries,
            services.config.ledger.capacity,
        )));
        let queued = Arc::new(AtomicUsize::new(0));

        let actor = ConversationActor {
            id,
            services,
            controller,
            state: state.clone(),
            rx,
            queued: queued.clone(),
            status: status_tx,
            pending: Vec::new(),
            deadline: None,
            flush_when_idle: false,
            presence: None,
            running: None,
        };
        tokio::spawn(actor.run());

        Self {
            tx,
            status,
            state,
            queued,
        }
    }

    /// Hand `msg` to the conversation task. Returns it back if the task is gone.
    pub fn send(&self, msg: InboundMessage) -> Result<(), InboundMessage> {
        self.queued.fetch_add(1, Ordering::AcqRel);
        self.tx.send(msg).map_err(|e| {
            self.queued.fetch_sub(1, Ordering::AcqRel);
            e.0
        })
    }

    /// Idle with nothing queued: the status alone lags behind `send`.
    pub fn is_quiescent(&self) -> bool {
        self.queued.load(Ordering::Acquire) == 0 && self.status().phase == Phase::Idle
    }

    pub fn status(&self) -> Status {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.status.clone()
    }

    pub fn state(&self) -> &Arc<Mutex<ConversationState>> {
        &self.state
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

struct ActiveRun {
    run_id: u64,
    handle: JoinHandle<RunOutcome>,
}

struct ConversationActor {
    id: ConversationId,
    services: Arc<Services>,
    controller: TaskController,
    state: Arc<Mutex<ConversationState>>,
    rx: mpsc::UnboundedReceiver<InboundMessage>,
    queued: Arc<AtomicUsize>,
    status: watch::Sender<Status>,
    pending: Vec<InboundMessage>,
    deadline: Option<Instant>,
    /// Debounce expired while a cancelled run was still winding down.
    flush_when_idle: bool,
    presence: Option<PresenceHandle>,
    running: Option<ActiveRun>,
}

impl ConversationActor {
    async fn run(mut self) {
        debug!(conversation = %self.id, "conversation task started");
        loop {
            tokio::select! {
                msg = self.rx.recv() => match msg {
                    Some(msg) => {
                        self.on_inbound(msg).await;
                        self.queued.fetch_sub(1, Ordering::AcqRel);
                    }
                    None => break,
                },
                _ = wait_deadline(self.deadline) => self.on_debounce(),
                result = wait_run(&mut self.running) => self.on_run_exit(result),
            }
        }
        self.shutdown();
    }

    async fn on_inbound(&mut self, msg: InboundMessage) {
        if msg.sender_is_self {
            // Our own echo: remember it, but it never opens a batch.
            self.state
                .lock()
                .await
                .history
                .push_bot(msg.content.clone(), msg.message_ref());
            return;
        }

        self.state
            .lock()
            .await
            .history
            .push_user(msg.content.clone(), msg.message_ref());
        self.pending.push(msg);

        self.deadline = Some(Instant::now() + self.services.debounce());
        self.flush_when_idle = false;
        if self.presence.is_none() {
            self.start_presence();
        }

        if let Some(run) = &self.running {
            if self.controller.signal(&self.id) {
                info!(conversation = %self.id, run_id = run.run_id, "new input, preempting active run");
            }
        } else {
            self.set_phase(Phase::Collecting);
        }
    }

    fn on_debounce(&mut self) {
        self.deadline = None;
        if self.running.is_some() {
            // Still winding down after a cancel; start as soon as it exits.
            self.flush_when_idle = true;
            return;
        }
        self.start_run();
    }

    fn start_run(&mut self) {
        let batch = std::mem::take(&mut self.pending);
        if batch.is_empty() {
            return;
        }
        if self.presence.is_none() {
            self.start_presence();
        }

        let ticket = self.controller.start(&self.id);
        info!(conversation = %self.id, run_id = ticket.run_id, messages = batch.len(), "starting run");

        let handle = tokio::spawn(run_batch(
            self.services.clone(),
            self.id.clone(),
            self.state.clone(),
            batch,
            ticket.token,
        ));
        self.running = Some(ActiveRun {
            run_id: ticket.run_id,
            handle,
        });
        self.set_phase(Phase::Processing);
    }

    fn on_run_exit(&mut self, result: Result<RunOutcome, JoinError>) {
        // Presence goes first, whatever the outcome.
        self.presence = None;

        if let Some(run) = self.running.take() {
            self.controller.finish(&self.id, run.run_id);
            match result {
                Ok(RunOutcome::Completed) => {
                    info!(conversation = %self.id, run_id = run.run_id, "run completed")
                }
                Ok(RunOutcome::Cancelled) => {
                    info!(conversation = %self.id, run_id = run.run_id, "run cancelled")
                }
                Ok(RunOutcome::Failed(e)) => {
                    warn!(conversation = %self.id, run_id = run.run_id, error = %e, "run failed")
                }
                Err(e) => {
                    error!(conversation = %self.id, run_id = run.run_id, error = %e, "run task panicked")
                }
            }
        }

        if self.pending.is_empty() {
            self.set_phase(Phase::Idle);
            return;
        }
        self.start_presence();
        if std::mem::take(&mut self.flush_when_idle) {
            self.start_run();
        } else {
            self.set_phase(Phase::Collecting);
        }
    }

    fn start_presence(&mut self) {
        self.presence = Some(PresenceHandle::start(
            self.services.messenger.clone(),
            self.id.clone(),
            self.services.typing_refresh(),
        ));
    }

    fn set_phase(&self, phase: Phase) {
        self.status.send_replace(Status::now(phase));
    }

    fn shutdown(&mut self) {
        if !self.pending.is_empty() {
            warn!(conversation = %self.id, dropped = self.pending.len(), "conversation closed with pending messages");
        }
        if self.running.is_some() {
            self.controller.signal(&self.id);
        }
        self.presence = None;
        debug!(conversation = %self.id, "conversation task stopped");
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn wait_run(running: &mut Option<ActiveRun>) -> Result<RunOutcome, JoinError> {
    match running {
        Some(run) => (&mut run.handle).await,
        None => std::future::pending().await,
    }
}
