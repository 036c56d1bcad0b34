//! Per-peer runtime.
//!
//! One reactor task owns every piece of local state: the reconciler, the
//! presence roster, the arbiter, the draft, and the playback transport.
//! Callers talk to it through a [`PeerHandle`]; requests flow in over an
//! mpsc channel and replies come back on oneshot channels, so nothing is
//! shared or locked.
//!
//! The reactor interleaves:
//! - commands from handles
//! - relay messages and presence events
//! - the fixed-interval arbitration tick (presence refresh, bootstrap,
//!   turn evaluation, retry of an undelivered publish)
//! - the clock resync deadline

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use campconf::{CampConfig, SessionSeedConfig};
use campproto::{
    Envelope, Instrument, LoopId, Participant, ParticipantId, Pitch, Scale, SessionState, Turn,
    STATE_TOPIC,
};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::admin;
use crate::arbiter::{TurnArbiter, TurnDecision};
use crate::clock::{ClockSync, LocalTransport, ResyncReason, TickTransport, WallClock};
use crate::commit::prepare_commit;
use crate::draft::Draft;
use crate::error::{PeerError, Rejection};
use crate::presence::{self, PresenceRoster};
use crate::reconciler::{ApplyOutcome, StateReconciler};
use crate::relay::{Relay, RelayError, RelayEvent, Subscription};

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 256;

/// Runtime knobs for one peer.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    pub history_limit: usize,
    /// Upper bound on every relay call.
    pub relay_timeout: Duration,
    pub arbitration_interval: Duration,
    pub bpm_ramp: Duration,
    pub seed: SessionSeedConfig,
    pub clock: WallClock,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self::from_config(&CampConfig::default())
    }
}

impl PeerConfig {
    pub fn from_config(config: &CampConfig) -> Self {
        let infra = &config.infra;
        Self {
            history_limit: infra.relay.history_limit,
            relay_timeout: Duration::from_millis(infra.relay.timeout_ms),
            arbitration_interval: Duration::from_millis(infra.timing.arbitration_interval_ms.max(1)),
            bpm_ramp: Duration::from_millis(infra.timing.bpm_ramp_ms),
            seed: config.bootstrap.session.clone(),
            clock: WallClock::new(),
        }
    }

    pub fn with_clock(mut self, clock: WallClock) -> Self {
        self.clock = clock;
        self
    }
}

/// Notifications for the UI and audio layers.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    StateAdopted {
        version: u64,
    },
    TurnChanged {
        holder: Option<ParticipantId>,
        ends_at: Option<i64>,
    },
    Committed {
        loop_id: LoopId,
        replaced: Option<LoopId>,
    },
    QueueChanged {
        queue: Vec<ParticipantId>,
    },
    /// A relay call failed. Local state keeps the last merged value.
    ConnectivityLost {
        operation: &'static str,
        error: RelayError,
    },
    Resynced {
        reason: ResyncReason,
        position: Option<f64>,
    },
}

/// Edits to the local draft.
#[derive(Debug, Clone)]
pub enum DraftOp {
    Toggle { pitch: Pitch, step: u8 },
    SetVelocity { pitch: Pitch, step: u8, velocity: f32 },
    SetInstrument(Instrument),
    SetScale(Scale),
    SetReplaceTarget(Option<LoopId>),
    Clear,
}

/// Shared-state controls.
#[derive(Debug, Clone)]
pub enum AdminOp {
    SetBpm(f64),
    SetWindowCycles(u32),
    StartPlayback,
    StopPlayback,
    RemoveLoop(LoopId),
}

/// A locally adopted state and whether the relay accepted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Publication {
    pub version: u64,
    /// False when the relay refused or timed out. The state stays adopted
    /// locally and is offered again on the next arbitration tick.
    pub delivered: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    pub loop_id: LoopId,
    pub replaced: Option<LoopId>,
    pub publication: Publication,
}

/// Point-in-time view of a peer.
#[derive(Debug, Clone)]
pub struct PeerSnapshot {
    pub me: Participant,
    pub state: Option<SessionState>,
    pub queue: Vec<Participant>,
    pub draft: Draft,
    pub is_leader: bool,
    pub transport_position: Option<f64>,
}

enum Command {
    Snapshot(oneshot::Sender<PeerSnapshot>),
    Draft(DraftOp, oneshot::Sender<Result<Draft, Rejection>>),
    Commit(oneshot::Sender<Result<CommitReceipt, Rejection>>),
    Pass(oneshot::Sender<Result<Publication, Rejection>>),
    Admin(AdminOp, oneshot::Sender<Result<Option<Publication>, Rejection>>),
}

/// Run `op` with a deadline so no relay call can hang the caller.
async fn bounded<T>(
    limit: Duration,
    operation: &'static str,
    op: impl Future<Output = Result<T, RelayError>>,
) -> Result<T, RelayError> {
    match timeout(limit, op).await {
        Ok(result) => result,
        Err(_) => Err(RelayError::Timeout {
            operation,
            after: limit,
        }),
    }
}

pub struct Peer;

impl Peer {
    /// Join the session on `relay` as `me` with the default transport.
    pub async fn join(
        relay: Arc<dyn Relay>,
        me: Participant,
        config: PeerConfig,
    ) -> Result<PeerHandle, PeerError> {
        Self::join_with_transport(relay, me, config, Box::new(TickTransport::default())).await
    }

    /// Subscribe, enter presence, replay history, take a presence snapshot,
    /// then hand everything to a freshly spawned reactor.
    ///
    /// Subscribing first means nothing published during the history fetch
    /// is missed.
    pub async fn join_with_transport(
        relay: Arc<dyn Relay>,
        me: Participant,
        config: PeerConfig,
        transport: Box<dyn LocalTransport>,
    ) -> Result<PeerHandle, PeerError> {
        let limit = config.relay_timeout;
        let subscription = bounded(limit, "subscribe", relay.subscribe()).await?;
        bounded(limit, "presence enter", relay.enter(me.clone())).await?;

        let joined = async {
            let history = bounded(limit, "history", relay.history(config.history_limit)).await?;
            let members = bounded(limit, "presence snapshot", relay.members()).await?;
            Ok::<_, RelayError>((history, members))
        }
        .await;
        let (history, members) = match joined {
            Ok(fetched) => fetched,
            Err(e) => {
                let _ = bounded(limit, "presence leave", relay.leave(&me)).await;
                return Err(e.into());
            }
        };

        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let mut reactor = Reactor::new(relay.clone(), me.clone(), config, transport, events.clone());
        reactor.roster.replace(members);
        let replayed = history.len();
        for envelope in history {
            reactor.receive(envelope);
        }
        info!(
            "{}: joined as {} ({} history messages, {} present)",
            me.name,
            me.id,
            replayed,
            reactor.roster.queue().len()
        );

        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(reactor.run(subscription, cmd_rx, cancel.clone()));

        Ok(PeerHandle {
            me,
            relay,
            cmd_tx,
            events,
            cancel,
            task,
            relay_timeout: limit,
        })
    }
}

/// The caller's side of a running peer.
pub struct PeerHandle {
    me: Participant,
    relay: Arc<dyn Relay>,
    cmd_tx: mpsc::Sender<Command>,
    events: broadcast::Sender<PeerEvent>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    relay_timeout: Duration,
}

impl PeerHandle {
    pub fn me(&self) -> &Participant {
        &self.me
    }

    pub fn events(&self) -> broadcast::Receiver<PeerEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> Result<PeerSnapshot, PeerError> {
        self.request(Command::Snapshot).await
    }

    pub async fn state(&self) -> Result<Option<SessionState>, PeerError> {
        Ok(self.snapshot().await?.state)
    }

    pub async fn queue(&self) -> Result<Vec<Participant>, PeerError> {
        Ok(self.snapshot().await?.queue)
    }

    pub async fn turn_holder(&self) -> Result<Option<ParticipantId>, PeerError> {
        let state = self.state().await?;
        Ok(state.and_then(|s| s.turn_holder().cloned()))
    }

    /// Does committed loop `loop_id` sound `pitch` at `step`?
    pub async fn is_step_active(
        &self,
        loop_id: &LoopId,
        pitch: &Pitch,
        step: u8,
    ) -> Result<bool, PeerError> {
        let state = self.state().await?.ok_or(Rejection::NoSession)?;
        let found = state
            .find_loop(loop_id)
            .ok_or_else(|| Rejection::UnknownLoop(loop_id.clone()))?;
        Ok(found.is_active(pitch, step))
    }

    pub async fn edit_draft(&self, op: DraftOp) -> Result<Draft, PeerError> {
        Ok(self.request(|tx| Command::Draft(op, tx)).await??)
    }

    pub async fn toggle(&self, pitch: Pitch, step: u8) -> Result<Draft, PeerError> {
        self.edit_draft(DraftOp::Toggle { pitch, step }).await
    }

    pub async fn set_instrument(&self, instrument: Instrument) -> Result<Draft, PeerError> {
        self.edit_draft(DraftOp::SetInstrument(instrument)).await
    }

    pub async fn set_replace_target(&self, target: Option<LoopId>) -> Result<Draft, PeerError> {
        self.edit_draft(DraftOp::SetReplaceTarget(target)).await
    }

    pub async fn commit(&self) -> Result<CommitReceipt, PeerError> {
        Ok(self.request(Command::Commit).await??)
    }

    pub async fn pass(&self) -> Result<Publication, PeerError> {
        Ok(self.request(Command::Pass).await??)
    }

    /// Apply an admin action. `None` means the session already matched.
    pub async fn admin(&self, op: AdminOp) -> Result<Option<Publication>, PeerError> {
        Ok(self.request(|tx| Command::Admin(op, tx)).await??)
    }

    pub async fn set_bpm(&self, bpm: f64) -> Result<Option<Publication>, PeerError> {
        self.admin(AdminOp::SetBpm(bpm)).await
    }

    pub async fn set_window_cycles(&self, cycles: u32) -> Result<Option<Publication>, PeerError> {
        self.admin(AdminOp::SetWindowCycles(cycles)).await
    }

    pub async fn start_playback(&self) -> Result<Option<Publication>, PeerError> {
        self.admin(AdminOp::StartPlayback).await
    }

    pub async fn stop_playback(&self) -> Result<Option<Publication>, PeerError> {
        self.admin(AdminOp::StopPlayback).await
    }

    pub async fn remove_loop(&self, loop_id: LoopId) -> Result<Option<Publication>, PeerError> {
        self.admin(AdminOp::RemoveLoop(loop_id)).await
    }

    /// Stop the reactor and its timers, then tell presence we left.
    ///
    /// Anything still queued for the reactor is dropped. The presence leave
    /// is best effort; a failure is logged and otherwise ignored.
    pub async fn leave(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!("{}: reactor ended abnormally: {}", self.me.name, e);
        }
        match bounded(self.relay_timeout, "presence leave", self.relay.leave(&self.me)).await {
            Ok(()) => info!("{}: left session", self.me.name),
            Err(e) => warn!("{}: presence leave failed: {}", self.me.name, e),
        }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, PeerError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| PeerError::Closed)?;
        rx.await.map_err(|_| PeerError::Closed)
    }
}

/// Everything the reactor task owns.
struct Reactor {
    relay: Arc<dyn Relay>,
    me: Participant,
    config: PeerConfig,
    reconciler: StateReconciler,
    roster: PresenceRoster,
    arbiter: TurnArbiter,
    draft: Draft,
    clock: ClockSync,
    transport: Box<dyn LocalTransport>,
    events: broadcast::Sender<PeerEvent>,
    last_turn: Option<Turn>,
    /// Locally adopted version the relay has not accepted yet.
    undelivered: Option<u64>,
}

impl Reactor {
    fn new(
        relay: Arc<dyn Relay>,
        me: Participant,
        config: PeerConfig,
        transport: Box<dyn LocalTransport>,
        events: broadcast::Sender<PeerEvent>,
    ) -> Self {
        let clock = ClockSync::new(config.bpm_ramp);
        Self {
            relay,
            me,
            config,
            reconciler: StateReconciler::new(),
            roster: PresenceRoster::new(),
            arbiter: TurnArbiter::new(),
            draft: Draft::default(),
            clock,
            transport,
            events,
            last_turn: None,
            undelivered: None,
        }
    }

    async fn run(
        mut self,
        subscription: Subscription,
        mut cmd_rx: mpsc::Receiver<Command>,
        cancel: CancellationToken,
    ) {
        let mut subscription = Some(subscription);
        let mut arbitration = tokio::time::interval(self.config.arbitration_interval);
        arbitration.set_missed_tick_behavior(MissedTickBehavior::Skip);

        debug!("{}: reactor started", self.me.name);

        loop {
            let resync_at = self.clock.next_deadline();

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("{}: cancelled", self.me.name);
                    break;
                }

                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => {
                            info!("{}: all handles dropped, reactor exiting", self.me.name);
                            break;
                        }
                    }
                }

                event = next_event(&mut subscription) => {
                    match event {
                        Some(event) => self.handle_relay_event(event).await,
                        None => {
                            warn!("{}: relay subscription closed", self.me.name);
                            subscription = None;
                            self.connectivity_lost("subscribe", RelayError::Closed);
                        }
                    }
                }

                _ = arbitration.tick() => {
                    if subscription.is_none() {
                        subscription = self.resubscribe().await;
                    }
                    self.arbitrate().await;
                }

                _ = sleep_until(resync_at) => {
                    if let Some(reason) = self.clock.due(Instant::now()) {
                        self.resync(reason);
                    }
                }
            }
        }

        debug!("{}: reactor exiting", self.me.name);
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::Draft(op, reply) => {
                let result = self.edit_draft(op).map(|()| self.draft.clone());
                let _ = reply.send(result);
            }
            Command::Commit(reply) => {
                let result = self.commit().await;
                let _ = reply.send(result);
            }
            Command::Pass(reply) => {
                let result = self.pass().await;
                let _ = reply.send(result);
            }
            Command::Admin(op, reply) => {
                let result = self.admin(op).await;
                let _ = reply.send(result);
            }
        }
    }

    async fn handle_relay_event(&mut self, event: RelayEvent) {
        match event {
            RelayEvent::Message(envelope) => self.receive(envelope),
            RelayEvent::Presence(presence) => {
                debug!(member = %presence.participant().id, "presence change");
                if self.roster.apply(&presence) {
                    self.queue_changed();
                    self.evaluate_turn().await;
                }
            }
        }
    }

    /// Merge one relay message into local state.
    fn receive(&mut self, envelope: Envelope) {
        if envelope.topic != STATE_TOPIC {
            debug!("{}: ignoring message on {}", self.me.name, envelope.topic);
            return;
        }
        let sender = envelope.sender.clone();
        let Some(state) = envelope.into_state() else {
            return;
        };
        let version = state.version;
        if self.reconciler.apply(state) == ApplyOutcome::Adopted {
            debug!("{}: adopted v{} from {}", self.me.name, version, sender);
            if self.undelivered.is_some_and(|v| v <= version) {
                self.undelivered = None;
            }
            self.adopted();
        }
    }

    /// React to a newly adopted local state.
    fn adopted(&mut self) {
        let Some(state) = self.reconciler.current() else {
            return;
        };
        let version = state.version;
        let turn = state.active_turn.clone();
        self.arbiter.observe(state, self.roster.queue());
        let immediate = self.clock.observe(state, Instant::now());

        self.emit(PeerEvent::StateAdopted { version });

        let turn_moved = match (&self.last_turn, &turn) {
            (Some(old), Some(new)) => old.user_id != new.user_id || old.started_at != new.started_at,
            (None, None) => false,
            _ => true,
        };
        if turn_moved {
            if let Some(t) = &turn {
                info!(
                    "{}: turn -> {} until {} (v{})",
                    self.me.name, t.user_id, t.ends_at, version
                );
            }
            self.emit(PeerEvent::TurnChanged {
                holder: turn.as_ref().map(|t| t.user_id.clone()),
                ends_at: turn.as_ref().map(|t| t.ends_at),
            });
        }
        self.last_turn = turn;

        if let Some(reason) = immediate {
            self.resync(reason);
        }
    }

    fn resync(&mut self, reason: ResyncReason) {
        let Some(state) = self.reconciler.current() else {
            return;
        };
        let position = self.clock.resync(
            self.transport.as_mut(),
            state,
            self.config.clock.now_ms(),
            Instant::now(),
        );
        self.emit(PeerEvent::Resynced { reason, position });
    }

    /// One level-triggered pass: refresh presence, bootstrap if we are the
    /// head of an empty session, offer an undelivered state again, and
    /// evaluate the turn.
    async fn arbitrate(&mut self) {
        match bounded(self.config.relay_timeout, "presence snapshot", self.relay.members()).await {
            Ok(members) => {
                if self.roster.replace(members) {
                    self.queue_changed();
                }
            }
            Err(e) => self.connectivity_lost("presence snapshot", e),
        }

        if self.reconciler.should_bootstrap(self.roster.queue(), &self.me.id) {
            let now = self.config.clock.now_ms();
            let genesis = self.reconciler.genesis(&self.me.id, &self.config.seed, now);
            info!("{}: no session found, created v{}", self.me.name, genesis.version);
            self.adopted();
            self.send(genesis).await;
        } else if let Some(version) = self.undelivered {
            if let Some(state) = self.reconciler.current().filter(|s| s.version == version) {
                let state = state.clone();
                debug!("{}: retrying delivery of v{}", self.me.name, version);
                self.send(state).await;
            } else {
                self.undelivered = None;
            }
        }

        self.evaluate_turn().await;
    }

    async fn evaluate_turn(&mut self) {
        let Some(state) = self.reconciler.current() else {
            return;
        };
        let now = self.config.clock.now_ms();
        let queue = self.roster.queue();
        let Some(decision) = self.arbiter.evaluate(state, queue, now) else {
            return;
        };

        if !presence::is_leader(queue, &self.me.id) {
            debug!("{}: turn change due, leaving it to the leader", self.me.name);
            return;
        }

        match &decision {
            TurnDecision::Start(turn) => {
                info!("{}: starting first turn for {}", self.me.name, turn.user_id)
            }
            TurnDecision::Rotate { from, turn, reason } => info!(
                "{}: rotating turn {} -> {} ({})",
                self.me.name, from, turn.user_id, reason
            ),
        }
        let next = decision.apply_to(state);
        self.publish(next).await;
    }

    async fn commit(&mut self) -> Result<CommitReceipt, Rejection> {
        let state = self.reconciler.current().ok_or(Rejection::NoSession)?;
        let now = self.config.clock.now_ms();
        let outcome = prepare_commit(
            state,
            self.roster.queue(),
            &self.me,
            &self.draft,
            &self.arbiter,
            now,
        )?;

        info!(
            "{}: committing {} loop {} (replacing {:?})",
            self.me.name,
            self.draft.instrument(),
            outcome.loop_id,
            outcome.replaced
        );
        let publication = self.publish(outcome.next).await;
        self.draft.clear();
        self.emit(PeerEvent::Committed {
            loop_id: outcome.loop_id.clone(),
            replaced: outcome.replaced.clone(),
        });

        Ok(CommitReceipt {
            loop_id: outcome.loop_id,
            replaced: outcome.replaced,
            publication,
        })
    }

    async fn pass(&mut self) -> Result<Publication, Rejection> {
        let state = self.reconciler.current().ok_or(Rejection::NoSession)?;
        let now = self.config.clock.now_ms();
        let decision = self
            .arbiter
            .pass(state, self.roster.queue(), &self.me.id, now)?;
        info!("{}: passing turn to {}", self.me.name, decision.turn().user_id);
        let next = decision.apply_to(state);
        Ok(self.publish(next).await)
    }

    async fn admin(&mut self, op: AdminOp) -> Result<Option<Publication>, Rejection> {
        let state = self.reconciler.current().ok_or(Rejection::NoSession)?;
        let queue = self.roster.queue();
        let me = &self.me.id;
        let now = self.config.clock.now_ms();

        let next = match op {
            AdminOp::SetBpm(bpm) => admin::set_bpm(state, queue, me, bpm, now)?,
            AdminOp::SetWindowCycles(cycles) => {
                admin::set_window_cycles(state, queue, me, cycles, now)?
            }
            AdminOp::StartPlayback => admin::start_playback(state, queue, me, now)?,
            AdminOp::StopPlayback => admin::stop_playback(state, queue, me)?,
            AdminOp::RemoveLoop(loop_id) => Some(admin::remove_loop(state, me, &loop_id, now)?),
        };

        match next {
            Some(next) => Ok(Some(self.publish(next).await)),
            None => Ok(None),
        }
    }

    fn edit_draft(&mut self, op: DraftOp) -> Result<(), Rejection> {
        match op {
            DraftOp::Toggle { pitch, step } => self.draft.toggle(pitch, step).map(|_| ()),
            DraftOp::SetVelocity {
                pitch,
                step,
                velocity,
            } => self.draft.set_velocity(&pitch, step, velocity),
            DraftOp::SetInstrument(instrument) => {
                self.draft.set_instrument(instrument);
                Ok(())
            }
            DraftOp::SetScale(scale) => {
                self.draft.set_scale(scale);
                Ok(())
            }
            DraftOp::SetReplaceTarget(target) => {
                self.draft.set_replace_target(target);
                Ok(())
            }
            DraftOp::Clear => {
                self.draft.clear();
                Ok(())
            }
        }
    }

    /// Stamp, adopt locally, then hand to the relay.
    async fn publish(&mut self, next: SessionState) -> Publication {
        let now = self.config.clock.now_ms();
        let stamped = self.reconciler.stamp(next, now);
        self.adopted();
        self.send(stamped).await
    }

    async fn send(&mut self, state: SessionState) -> Publication {
        let version = state.version;
        let envelope = Envelope::state(self.me.id.clone(), state);
        let delivered =
            match bounded(self.config.relay_timeout, "publish", self.relay.publish(envelope)).await
            {
                Ok(()) => {
                    if self.undelivered.is_some_and(|v| v <= version) {
                        self.undelivered = None;
                    }
                    true
                }
                Err(e) => {
                    self.undelivered = Some(version);
                    self.connectivity_lost("publish", e);
                    false
                }
            };
        Publication { version, delivered }
    }

    async fn resubscribe(&mut self) -> Option<Subscription> {
        match bounded(self.config.relay_timeout, "subscribe", self.relay.subscribe()).await {
            Ok(subscription) => {
                info!("{}: resubscribed to relay", self.me.name);
                Some(subscription)
            }
            Err(e) => {
                self.connectivity_lost("subscribe", e);
                None
            }
        }
    }

    fn snapshot(&self) -> PeerSnapshot {
        let queue = self.roster.queue().to_vec();
        PeerSnapshot {
            is_leader: presence::is_leader(&queue, &self.me.id),
            me: self.me.clone(),
            state: self.reconciler.current().cloned(),
            queue,
            draft: self.draft.clone(),
            transport_position: self
                .transport
                .is_running()
                .then(|| self.transport.position_secs()),
        }
    }

    fn queue_changed(&self) {
        let queue: Vec<ParticipantId> = self.roster.queue().iter().map(|p| p.id.clone()).collect();
        debug!("{}: queue is now {:?}", self.me.name, queue);
        self.emit(PeerEvent::QueueChanged { queue });
    }

    fn connectivity_lost(&self, operation: &'static str, error: RelayError) {
        warn!("{}: relay {} failed: {}", self.me.name, operation, error);
        self.emit(PeerEvent::ConnectivityLost { operation, error });
    }

    fn emit(&self, event: PeerEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }
}

async fn next_event(subscription: &mut Option<Subscription>) -> Option<RelayEvent> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
