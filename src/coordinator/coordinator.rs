use std::{
    borrow::Cow,
    error::Error,
    fmt::{self, Display},
    io,
    net::SocketAddr,
};

use comms::{
    ParameterSet, ShapeMismatch,
    msg::{Command, Msg},
};
use futures::future;
use log::{debug, error, info, warn};
use tokio::{
    sync::{Mutex, watch},
    time::{self, Instant},
};

use super::{
    BufferedUpdate, CoordinatorSettings, ParticipantId, ParticipantSink, Phase, Registry,
    RoundStatus, TimeoutPolicy, state::RoundState,
};
use crate::{
    aggregation::{AggregationErr, Aggregator, FedAvg, WeightedUpdate},
    anomaly::{AnomalyDetector, NoopDetector},
    model::{Model, ModelErr},
};

/// A locally trained parameter set as submitted by a participant.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub params: ParameterSet,
    /// The amount of local samples the update was trained on.
    pub samples: u64,
}

impl Update {
    pub fn new(params: ParameterSet, samples: u64) -> Self {
        Self { params, samples }
    }
}

/// Why a submission was turned down without touching the round.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    Empty,
    Shape(ShapeMismatch),
    Finished,
    /// The id was never issued to any participant.
    UnknownParticipant,
}

impl Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("empty parameter set"),
            Self::Shape(e) => write!(f, "{e}"),
            Self::Finished => f.write_str("every round already finished"),
            Self::UnknownParticipant => f.write_str("unknown participant id"),
        }
    }
}

/// Returned whenever a complete round can't produce a new global model.
#[derive(Debug)]
pub enum CloseErr {
    Aggregation(AggregationErr),
    Install(ModelErr),
}

impl Display for CloseErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aggregation(e) => write!(f, "aggregation failed: {e}"),
            Self::Install(e) => write!(f, "failed to install the aggregate: {e}"),
        }
    }
}

impl Error for CloseErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Aggregation(e) => Some(e),
            Self::Install(e) => Some(e),
        }
    }
}

impl From<AggregationErr> for CloseErr {
    fn from(value: AggregationErr) -> Self {
        Self::Aggregation(value)
    }
}

impl From<ModelErr> for CloseErr {
    fn from(value: ModelErr) -> Self {
        Self::Install(value)
    }
}

/// The outcome of `Coordinator::submit`.
#[derive(Debug)]
pub enum Submission {
    Rejected(Rejection),
    /// Stored, the round still waits on `pending` participants.
    Buffered { round: u64, pending: usize },
    /// This submission completed `round`, which is now closed.
    RoundClosed { round: u64 },
    /// The round was complete but couldn't be aggregated, the buffer is kept.
    AggregationFailed(CloseErr),
}

/// The outcome of `Coordinator::enforce_deadline`.
#[derive(Debug)]
pub enum Deadline {
    /// No deadline configured, or it hasn't passed yet.
    Pending,
    /// The deadline passed without any update, the timer started over.
    Restarted,
    Aborted { round: u64, dropped: usize },
    Aggregated { round: u64, updates: usize },
    Failed(CloseErr),
}

/// Runs the rounds: collects one update per registered participant, aggregates them into the
/// global model and broadcasts the result.
///
/// All the round bookkeeping lives behind a single lock which is held for the whole of a
/// submission, including the aggregation and the broadcast that may follow it. Reading updates off
/// the network happens outside of it.
pub struct Coordinator<M: Model> {
    state: Mutex<RoundState<M>>,
    shape: Vec<Vec<usize>>,
    aggregator: Box<dyn Aggregator>,
    eval_data: Option<M::Dataset>,
    settings: CoordinatorSettings,
    status: watch::Sender<RoundStatus>,
}

impl<M: Model> Coordinator<M> {
    /// Creates a new `Coordinator` averaging with `FedAvg` and without anomaly detection.
    ///
    /// # Arguments
    /// * `model` - The global model, its current parameters are the ones of round 0.
    /// * `settings` - The coordinator settings.
    pub fn new(model: M, settings: CoordinatorSettings) -> Self {
        let shape = model.parameters().shape();
        let state = RoundState::new(model, Box::new(NoopDetector));
        let (status, _) = watch::channel(state.status(settings.total_rounds));

        Self {
            state: Mutex::new(state),
            shape,
            aggregator: Box::new(FedAvg),
            eval_data: None,
            settings,
            status,
        }
    }

    pub fn with_aggregator(mut self, aggregator: Box<dyn Aggregator>) -> Self {
        self.aggregator = aggregator;
        self
    }

    pub fn with_detector(mut self, detector: Box<dyn AnomalyDetector>) -> Self {
        self.state.get_mut().detector = detector;
        self
    }

    /// Sets the held out data evaluated before and after every aggregation.
    pub fn with_eval_data(mut self, data: M::Dataset) -> Self {
        self.eval_data = Some(data);
        self
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    /// The latest published status.
    pub fn status(&self) -> RoundStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RoundStatus> {
        self.status.subscribe()
    }

    /// A copy of the current global parameters.
    pub async fn parameters(&self) -> ParameterSet {
        self.state.lock().await.model.parameters().clone()
    }

    /// Registers a newly connected participant and welcomes it with its id.
    ///
    /// The welcome is written while holding the round lock, so it always reaches the participant
    /// before any broadcast does.
    ///
    /// # Arguments
    /// * `addr` - The remote address, if any.
    /// * `sink` - The sending half of the participant's connection.
    ///
    /// # Returns
    /// The issued id, or an io error if the welcome couldn't be written or every round finished.
    pub async fn register(
        &self,
        addr: Option<SocketAddr>,
        mut sink: Box<dyn ParticipantSink>,
    ) -> io::Result<ParticipantId> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        if state.phase == Phase::Finished {
            let msg = Msg::Err(Cow::Borrowed("every round already finished"));
            sink.deliver(&msg).await?;
            return Err(io::Error::other("registration after the last round"));
        }

        let id = state.registry.register(addr, None);
        let welcome = Msg::Control(Command::Welcome {
            participant: id.get(),
            round: state.round,
        });

        if let Err(e) = sink.deliver(&welcome).await {
            state.registry.deregister(id);
            return Err(e);
        }

        state.registry.attach(id, sink);

        info!(
            participant = id.get(),
            round = state.round;
            "participant {id} registered, {} in the cohort",
            state.registry.len()
        );

        self.publish(state);
        Ok(id)
    }

    /// Removes a participant from the cohort, dropping its buffered update and its connection.
    ///
    /// The barrier is re-evaluated right away, the round closes if every remaining participant
    /// already submitted.
    pub async fn deregister(&self, id: ParticipantId) {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        if state.registry.deregister(id).is_none() {
            return;
        }

        let dropped = state.buffer.remove(id).is_some();
        state.detector.forget(id);

        info!(
            participant = id.get(),
            round = state.round;
            "participant {id} left, {} in the cohort{}",
            state.registry.len(),
            if dropped { ", its update was discarded" } else { "" }
        );

        if state.phase == Phase::Collecting && state.barrier_reached(self.settings.min_participants)
        {
            if let Err(e) = self.close_round(state).await {
                debug!(participant = id.get(); "round left open after {id} left: {e}");
            }
            return;
        }

        self.publish(state);
    }

    /// Submits a participant's update for the round in progress.
    ///
    /// Empty updates and updates whose layout differs from the global model are rejected with a
    /// warning and leave the round untouched. Otherwise the update goes through the anomaly
    /// detector and is buffered, replacing any earlier update of the same participant this round.
    /// A participant that left the cohort is enrolled again on the spot, ids that were never
    /// issued are rejected.
    ///
    /// If that completes the barrier, the round is closed before returning: the buffered updates
    /// are aggregated, installed, evaluated and broadcast to every registered participant.
    pub async fn submit(&self, id: ParticipantId, update: Update) -> Submission {
        if update.params.is_empty() {
            warn!(participant = id.get(); "rejected empty update from {id}");
            return Submission::Rejected(Rejection::Empty);
        }

        if let Err(e) = update.params.check_shape(&self.shape) {
            warn!(participant = id.get(); "rejected update from {id}: {e}");
            return Submission::Rejected(Rejection::Shape(e));
        }

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let round = state.round;

        if state.phase == Phase::Finished {
            warn!(participant = id.get(); "rejected update from {id}: every round already finished");
            return Submission::Rejected(Rejection::Finished);
        }

        if !state.registry.issued(id) {
            warn!(participant = id.get(); "rejected update from {id}: the id was never issued");
            return Submission::Rejected(Rejection::UnknownParticipant);
        }

        self.evaluate_model(
            &state.model,
            &format!("round {round}, before aggregation, on update from {id}"),
        );

        state.detector.observe(id, &update.params);
        let flagged = state.detector.poll(id);

        if flagged {
            state.anomalies_flagged += 1;
            warn!(
                participant = id.get(),
                round = round;
                "anomalous update from {id} in round {round}"
            );
        }

        let replaced = state.buffer.insert(
            id,
            BufferedUpdate {
                params: update.params,
                samples: update.samples,
                flagged,
            },
        );

        if replaced.is_some() {
            debug!(participant = id.get(); "replaced the earlier update of {id}");
        }

        if state.registry.enroll(id) {
            info!(
                participant = id.get();
                "enrolled departed participant {id} without a connection"
            );
        }

        if !state.barrier_reached(self.settings.min_participants) {
            let pending = state.registry.len().saturating_sub(state.buffer.len());
            debug!(
                round = round;
                "buffered update from {id}, {}/{} updates",
                state.buffer.len(),
                state.registry.len()
            );

            self.publish(state);
            return Submission::Buffered { round, pending };
        }

        match self.close_round(state).await {
            Ok(()) => Submission::RoundClosed { round },
            Err(e) => Submission::AggregationFailed(e),
        }
    }

    /// Closes the round in progress if it outlived the configured deadline.
    ///
    /// Depending on the timeout policy the buffered updates are discarded or aggregated as a
    /// partial round. A round with no updates at all just restarts its timer.
    pub async fn enforce_deadline(&self) -> Deadline {
        let Some(limit) = self.settings.round_timeout else {
            return Deadline::Pending;
        };

        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        if state.phase != Phase::Collecting || state.started_at.elapsed() < limit {
            return Deadline::Pending;
        }

        let round = state.round;
        let updates = state.buffer.len();

        if updates == 0 {
            state.started_at = Instant::now();
            return Deadline::Restarted;
        }

        if let TimeoutPolicy::AggregatePartial { min_updates } = self.settings.timeout_policy
            && updates >= min_updates.max(1)
        {
            warn!(
                round = round;
                "round {round} timed out with {updates}/{} updates, aggregating what arrived",
                state.registry.len()
            );

            return match self.close_round(state).await {
                Ok(()) => Deadline::Aggregated { round, updates },
                Err(e) => {
                    state.started_at = Instant::now();
                    Deadline::Failed(e)
                }
            };
        }

        warn!(
            round = round;
            "round {round} timed out with {updates}/{} updates, discarding them",
            state.registry.len()
        );

        state.buffer.clear();
        state.started_at = Instant::now();
        self.publish(state);

        Deadline::Aborted {
            round,
            dropped: updates,
        }
    }

    /// Evaluates the current global model on the held out data.
    ///
    /// # Arguments
    /// * `context` - A human readable label for the logs.
    ///
    /// # Returns
    /// The accuracy, or `None` if there is no evaluation data or the evaluation failed.
    pub async fn evaluate(&self, context: &str) -> Option<f32> {
        let state = self.state.lock().await;
        self.evaluate_model(&state.model, context)
    }

    /// Writes `params` to every registered participant concurrently.
    ///
    /// A failed or timed out write is logged and doesn't stop the others.
    pub async fn broadcast(&self, params: &ParameterSet) {
        let mut state = self.state.lock().await;
        let round = state.round;
        self.broadcast_to(&mut state.registry, params, round).await;
    }

    /// Writes `params` to a single registered participant.
    ///
    /// # Returns
    /// An io error if `id` isn't registered, has no open connection or the write failed.
    pub async fn send_to(&self, id: ParticipantId, params: &ParameterSet) -> io::Result<()> {
        let mut state = self.state.lock().await;
        let participant = state.registry.get_mut(id).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{id} is not registered"))
        })?;
        let sink = participant.sink_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, format!("{id} has no open connection"))
        })?;

        sink.deliver(&Msg::Params(Cow::Borrowed(params))).await
    }

    /// Aggregates the buffered updates and advances the round, the lock must be held.
    async fn close_round(&self, state: &mut RoundState<M>) -> Result<(), CloseErr> {
        let round = state.round;
        state.phase = Phase::Aggregating;
        self.publish(state);

        if let Err(e) = self.install_aggregate(state) {
            error!(round = round; "round {round} stays open: {e}");
            state.phase = Phase::Collecting;
            self.publish(state);
            return Err(e);
        }

        let context = format!("round {round}, after aggregation");
        state.last_accuracy = self.evaluate_model(&state.model, &context);

        let RoundState {
            registry, model, ..
        } = &mut *state;
        self.broadcast_to(registry, model.parameters(), round).await;

        let updates = state.buffer.len();
        state.buffer.clear();
        state.round += 1;
        state.started_at = Instant::now();
        state.phase = if self.settings.stop_at_total_rounds
            && state.round >= self.settings.total_rounds
        {
            Phase::Finished
        } else {
            Phase::Collecting
        };

        info!(
            round = round,
            updates = updates;
            "round {round} closed over {updates} updates, now at round {}{}",
            state.round,
            if state.phase == Phase::Finished { ", training finished" } else { "" }
        );

        self.publish(state);
        Ok(())
    }

    fn install_aggregate(&self, state: &mut RoundState<M>) -> Result<(), CloseErr> {
        let settings = &self.settings;
        let outliers = self.group_outliers(state);
        let updates: Vec<_> = state
            .buffer
            .iter()
            .zip(outliers)
            .filter_map(|((id, update), outlier)| {
                let weight = settings.weighting.weight(update.samples);
                match settings.exclusion.apply(weight, update.flagged || outlier) {
                    Some(weight) => Some(WeightedUpdate::new(&update.params, weight)),
                    None => {
                        debug!(participant = id.get(); "left flagged update of {id} out");
                        None
                    }
                }
            })
            .collect();

        let aggregate = self.aggregator.aggregate(&updates)?;
        state.model.set_parameters(aggregate)?;
        Ok(())
    }

    /// Runs the group outlier check over the buffered updates, if one is configured.
    ///
    /// # Returns
    /// One verdict per buffered update, in buffer order.
    fn group_outliers(&self, state: &RoundState<M>) -> Vec<bool> {
        let Some(check) = self.settings.group_check else {
            return vec![false; state.buffer.len()];
        };

        let norms: Vec<_> = state
            .buffer
            .iter()
            .map(|(_, update)| update.params.l2_norm())
            .collect();

        let Some(scores) = check.scores(&norms) else {
            debug!(
                round = state.round;
                "skipped the group outlier check over {} updates",
                norms.len()
            );
            return vec![false; norms.len()];
        };

        state
            .buffer
            .iter()
            .zip(scores)
            .map(|((id, _), score)| {
                let outlier = score > check.threshold;
                if outlier {
                    warn!(
                        participant = id.get(),
                        round = state.round,
                        score = score;
                        "update from {id} stands out among round {}'s updates",
                        state.round
                    );
                }
                outlier
            })
            .collect()
    }

    /// Tells every registered participant that the session is over and drops their connections.
    pub async fn disconnect_all(&self) {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let msg = Msg::Control(Command::Disconnect);

        self.deliver_all(&mut state.registry, &msg).await;

        let ids: Vec<_> = state.registry.ids().collect();
        for id in ids {
            state.registry.deregister(id);
            state.buffer.remove(id);
            state.detector.forget(id);
        }

        self.publish(state);
    }

    async fn broadcast_to(&self, registry: &mut Registry, params: &ParameterSet, round: u64) {
        let msg = Msg::Params(Cow::Borrowed(params));
        let failed = self.deliver_all(registry, &msg).await;

        for (id, e) in failed {
            error!(
                participant = id.get(),
                round = round;
                "failed to broadcast round {round} parameters to {id}: {e}"
            );
        }
    }

    /// Writes `msg` to every registered participant with an open connection, concurrently.
    ///
    /// # Returns
    /// The participants the write failed or timed out for.
    async fn deliver_all(
        &self,
        registry: &mut Registry,
        msg: &Msg<'_>,
    ) -> Vec<(ParticipantId, io::Error)> {
        let limit = self.settings.broadcast_timeout;

        let sends = registry.iter_mut().map(|participant| async move {
            let id = participant.id();
            let Some(sink) = participant.sink_mut() else {
                warn!(participant = id.get(); "{id} has no open connection, skipping {}", msg.kind());
                return None;
            };

            let sent = match limit {
                Some(limit) => time::timeout(limit, sink.deliver(msg))
                    .await
                    .unwrap_or_else(|_| {
                        Err(io::Error::new(io::ErrorKind::TimedOut, "write timed out"))
                    }),
                None => sink.deliver(msg).await,
            };

            sent.err().map(|e| (id, e))
        });

        future::join_all(sends).await.into_iter().flatten().collect()
    }

    fn evaluate_model(&self, model: &M, context: &str) -> Option<f32> {
        let Some(data) = &self.eval_data else {
            warn!("no evaluation data configured, skipping evaluation ({context})");
            return None;
        };

        match model.evaluate(data) {
            Ok(eval) => {
                info!(
                    loss = eval.loss,
                    accuracy = eval.accuracy;
                    "evaluation ({context}): loss {:.4}, accuracy {:.4}",
                    eval.loss,
                    eval.accuracy
                );
                Some(eval.accuracy)
            }
            Err(e) => {
                error!("evaluation ({context}) failed: {e}");
                None
            }
        }
    }

    fn publish(&self, state: &RoundState<M>) {
        self.status
            .send_replace(state.status(self.settings.total_rounds));
    }
}
