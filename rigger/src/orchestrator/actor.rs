//! One task per release name, owning its state machine
//!
//! Commands arrive on a bounded mailbox. Actions run as a single in-flight
//! future polled next to the mailbox, so a release keeps answering `state`
//! and `cancel` while it deploys or checks health. Requests arriving while an
//! operation is underway are refused instead of queued.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::errors::RiggerError;
use crate::models::release::Release;
use crate::orchestrator::actions::Actions;
use crate::orchestrator::context::{ExtendedState, OperationRequest};
use crate::orchestrator::fsm::{ReleaseEvent, ReleaseFsm, ReleaseState};

type Reply = oneshot::Sender<Result<Release, RiggerError>>;

type Step = Pin<Box<dyn Future<Output = (ExtendedState, Result<ReleaseEvent, RiggerError>)> + Send>>;

/// Command sent to a release actor
pub enum Command {
    /// Start an operation, answered once the machine is back to initial
    Submit {
        request: OperationRequest,
        reply: Reply,
    },

    /// Cancel a running upgrade
    Cancel { reply: oneshot::Sender<bool> },

    State { reply: oneshot::Sender<ReleaseState> },
}

/// Sending side of a release actor
#[derive(Clone)]
pub struct ReleaseHandle {
    name: String,
    sender: mpsc::Sender<Command>,
}

impl ReleaseHandle {
    /// Spawn the actor of a release
    pub fn spawn(name: impl Into<String>, actions: Arc<Actions>) -> Self {
        let name = name.into();
        let settings = actions.settings();
        let (sender, mailbox) = mpsc::channel(settings.mailbox_capacity.max(1));
        let actor = ReleaseActor {
            name: name.clone(),
            check_interval: settings.check_interval,
            actions,
            mailbox,
            fsm: ReleaseFsm::new(),
            ctx: ExtendedState::default(),
            step: None,
            next_check: None,
            reply: None,
            cancel_requested: false,
        };
        tokio::spawn(actor.run().instrument(info_span!("release", release = %name)));
        Self { name, sender }
    }

    /// No other clone of this handle is in use
    pub fn is_idle(&self) -> bool {
        self.sender.strong_count() == 1
    }

    /// Run an operation to completion
    pub async fn submit(&self, request: OperationRequest) -> Result<Release, RiggerError> {
        let verb = request.verb();
        let (reply, response) = oneshot::channel();
        self.sender
            .try_send(Command::Submit { request, reply })
            .map_err(|e| match e {
                TrySendError::Full(_) => self.not_ready(verb),
                TrySendError::Closed(_) => self.stopped(),
            })?;
        response.await.map_err(|_| self.stopped())?
    }

    /// Cancel a running upgrade, true when the cancel was accepted
    pub async fn cancel(&self) -> Result<bool, RiggerError> {
        let (reply, response) = oneshot::channel();
        match self.sender.try_send(Command::Cancel { reply }) {
            Ok(()) => response.await.map_err(|_| self.stopped()),
            Err(TrySendError::Full(_)) => Ok(false),
            Err(TrySendError::Closed(_)) => Err(self.stopped()),
        }
    }

    pub async fn state(&self) -> Result<ReleaseState, RiggerError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(Command::State { reply })
            .await
            .map_err(|_| self.stopped())?;
        response.await.map_err(|_| self.stopped())
    }

    fn not_ready(&self, verb: &str) -> RiggerError {
        RiggerError::Conflict(format!(
            "Release [{}] is not in a state ready to {}",
            self.name, verb
        ))
    }

    fn stopped(&self) -> RiggerError {
        RiggerError::Internal(format!("Release [{}] actor stopped", self.name))
    }
}

struct ReleaseActor {
    name: String,
    check_interval: Duration,
    actions: Arc<Actions>,
    mailbox: mpsc::Receiver<Command>,
    fsm: ReleaseFsm,
    ctx: ExtendedState,

    /// Action of the current state, while it runs
    step: Option<Step>,

    /// Next health check while waiting on target apps
    next_check: Option<Instant>,

    /// Caller of the running operation
    reply: Option<Reply>,

    /// Cancel received while a health check was in flight
    cancel_requested: bool,
}

impl ReleaseActor {
    async fn run(mut self) {
        debug!("Release actor started");

        loop {
            tokio::select! {
                (ctx, outcome) = poll_step(&mut self.step) => {
                    self.step = None;
                    self.on_step_done(ctx, outcome);
                }
                command = self.mailbox.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => break,
                },
                _ = sleep_until(self.next_check) => {
                    self.next_check = None;
                    self.fire(ReleaseEvent::CheckTargetApps);
                }
            }
        }

        debug!("Release actor stopped");
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Submit { request, reply } => self.on_submit(request, reply),
            Command::Cancel { reply } => {
                let accepted = self.on_cancel();
                let _ = reply.send(accepted);
            }
            Command::State { reply } => {
                let _ = reply.send(self.fsm.state());
            }
        }
    }

    fn on_submit(&mut self, request: OperationRequest, reply: Reply) {
        let event = match request {
            OperationRequest::Install { .. } => ReleaseEvent::Install,
            OperationRequest::Upgrade { .. } => ReleaseEvent::Upgrade,
            OperationRequest::Rollback(_) => ReleaseEvent::Rollback,
            OperationRequest::Delete { .. } => ReleaseEvent::Delete,
            OperationRequest::Scale { .. } => ReleaseEvent::Scale,
        };

        if self.reply.is_some() || !self.fsm.accepts(event) {
            debug!("Refusing {} in state {:?}", request.verb(), self.fsm.state());
            let _ = reply.send(Err(RiggerError::Conflict(format!(
                "Release [{}] is not in a state ready to {}",
                self.name,
                request.verb()
            ))));
            return;
        }

        let operation_id = Uuid::new_v4().to_string();
        info!(operation = %operation_id, "Starting {}", request.verb());
        self.ctx = ExtendedState {
            operation_id,
            request: Some(request),
            ..Default::default()
        };
        self.reply = Some(reply);
        self.cancel_requested = false;
        self.fire(event);
    }

    fn on_cancel(&mut self) -> bool {
        match self.fsm.state() {
            ReleaseState::UpgradeWaitTargetApps => {
                self.next_check = None;
                self.fire(ReleaseEvent::UpgradeCancel);
                true
            }
            ReleaseState::UpgradeCheckTargetApps => {
                // Applied once the running check returns.
                self.cancel_requested = true;
                true
            }
            state => {
                debug!("Nothing to cancel in state {:?}", state);
                false
            }
        }
    }

    fn on_step_done(&mut self, ctx: ExtendedState, outcome: Result<ReleaseEvent, RiggerError>) {
        self.ctx = ctx;
        let state = self.fsm.state();
        match outcome {
            Ok(_) if state == ReleaseState::UpgradeCheckTargetApps && self.cancel_requested => {
                self.cancel_requested = false;
                self.fire(ReleaseEvent::UpgradeCancel);
            }
            Ok(event) => self.fire(event),
            Err(e) => {
                if e.is_failure() {
                    error!(operation = %self.ctx.operation_id, "{:?} failed: {}", state, e);
                } else {
                    warn!(operation = %self.ctx.operation_id, "{:?} stopped: {}", state, e);
                }
                self.ctx.error = Some(e);
                self.fire(ReleaseEvent::Failed);
            }
        }
    }

    fn fire(&mut self, event: ReleaseEvent) {
        let from = self.fsm.state();
        match self.fsm.process(event) {
            Ok(to) => {
                debug!("{:?} --{:?}--> {:?}", from, event, to);
                self.enter();
            }
            Err(e) => {
                error!(operation = %self.ctx.operation_id, "{}", e);
                self.ctx
                    .error
                    .get_or_insert_with(|| RiggerError::Internal(e));
                self.fsm.reset();
                self.enter();
            }
        }
    }

    /// Run the entry behaviour of the current state
    fn enter(&mut self) {
        loop {
            match self.fsm.state() {
                ReleaseState::Initial => {
                    self.finish();
                    return;
                }
                ReleaseState::Error => {
                    if self.fsm.process(ReleaseEvent::Completed).is_err() {
                        self.fsm.reset();
                    }
                }
                ReleaseState::UpgradeWaitTargetApps => {
                    self.next_check = Some(Instant::now() + self.check_interval);
                    return;
                }
                state => {
                    let actions = self.actions.clone();
                    let mut ctx = std::mem::take(&mut self.ctx);
                    self.step = Some(Box::pin(async move {
                        let outcome = actions.run(state, &mut ctx).await;
                        (ctx, outcome)
                    }));
                    return;
                }
            }
        }
    }

    /// Answer the caller of the operation that just ended
    fn finish(&mut self) {
        let outcome = match (self.ctx.error.take(), self.ctx.result.take()) {
            (Some(e), _) => Err(e),
            (None, Some(release)) => Ok(release),
            (None, None) => Err(RiggerError::Internal(format!(
                "Operation on release [{}] ended without a result",
                self.name
            ))),
        };
        match &outcome {
            Ok(release) => info!(operation = %self.ctx.operation_id, "Completed with {}", release),
            Err(e) => info!(operation = %self.ctx.operation_id, "Ended with error: {}", e),
        }
        if let Some(reply) = self.reply.take() {
            let _ = reply.send(outcome);
        }
        self.ctx = ExtendedState::default();
        self.cancel_requested = false;
    }
}

async fn poll_step(step: &mut Option<Step>) -> (ExtendedState, Result<ReleaseEvent, RiggerError>) {
    match step {
        Some(step) => step.await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
