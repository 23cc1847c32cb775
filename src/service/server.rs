use std::{future, io, net::SocketAddr, sync::Arc, time::Duration};

use comms::{
    FrameReceiver, FrameSender,
    msg::{Command, Msg},
};
use log::{debug, error, info, warn};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpListener,
    sync::watch,
    task::JoinSet,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    coordinator::{Coordinator, Deadline, Phase, RoundStatus, Submission, Update},
    model::Model,
};

const DEFAULT_DEADLINE_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Accepts participant connections and runs one task per connection against a shared coordinator.
pub struct Server<M: Model> {
    coordinator: Arc<Coordinator<M>>,
    tasks: JoinSet<()>,
    cancel: CancellationToken,
    /// Stops the connection tasks, only after the participants were told to disconnect.
    connections: CancellationToken,
    max_frame_len: usize,
    deadline_check_interval: Duration,
}

impl<M: Model + 'static> Server<M> {
    /// Creates a new `Server`.
    ///
    /// # Arguments
    /// * `coordinator` - The coordinator every connection submits to.
    /// * `cancel` - Stops the server and every connection task once cancelled.
    pub fn new(coordinator: Arc<Coordinator<M>>, cancel: CancellationToken) -> Self {
        Self {
            coordinator,
            tasks: JoinSet::new(),
            cancel,
            connections: CancellationToken::new(),
            max_frame_len: comms::DEFAULT_MAX_FRAME_LEN,
            deadline_check_interval: DEFAULT_DEADLINE_CHECK_INTERVAL,
        }
    }

    /// Frames announcing a longer payload than `max_frame_len` drop the connection.
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    /// How often the round deadline is checked, if the coordinator has one.
    pub fn with_deadline_check_interval(mut self, interval: Duration) -> Self {
        self.deadline_check_interval = interval;
        self
    }

    pub fn coordinator(&self) -> &Arc<Coordinator<M>> {
        &self.coordinator
    }

    /// Accepts participants until cancelled or until every round finished, then disconnects every
    /// participant and waits for their tasks.
    pub async fn run(mut self, listener: TcpListener) -> io::Result<()> {
        let cancel = self.cancel.clone();
        let mut status = self.coordinator.subscribe();

        if self.coordinator.settings().round_timeout.is_some() {
            self.spawn_watchdog();
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("shutting down");
                    break;
                }
                _ = finished(&mut status) => {
                    info!("every round finished, shutting down");
                    break;
                }
                accepted = listener.accept() => {
                    let (stream, addr) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!("failed to accept a connection: {e}");
                            continue;
                        }
                    };

                    info!("participant connected from {addr}");
                    let (rx, tx) = stream.into_split();
                    self.spawn(rx, tx, Some(addr));
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Binds a new participant connection to this server and spawns its task.
    ///
    /// # Arguments
    /// * `rx` - The receiving end of the connection.
    /// * `tx` - The sending end of the connection.
    /// * `addr` - The remote address, if any.
    pub fn spawn<R, W>(&mut self, rx: R, tx: W, addr: Option<SocketAddr>)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (rx, tx) = comms::channel(rx, tx);
        let rx = rx.with_max_len(self.max_frame_len);
        let coordinator = Arc::clone(&self.coordinator);
        let cancel = self.connections.clone();

        self.tasks
            .spawn(serve_participant(coordinator, rx, tx, addr, cancel));
    }

    /// Tells the remaining participants the session is over and stops every task.
    pub async fn shutdown(mut self) {
        self.coordinator.disconnect_all().await;
        self.connections.cancel();

        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                error!("connection task failed: {e}");
            }
        }
    }

    fn spawn_watchdog(&mut self) {
        let coordinator = Arc::clone(&self.coordinator);
        let cancel = self.connections.clone();
        let period = self.deadline_check_interval;

        self.tasks.spawn(async move {
            let mut ticks = time::interval(period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticks.tick() => {
                        if let Deadline::Restarted = coordinator.enforce_deadline().await {
                            debug!("round deadline passed without updates, timer restarted");
                        }
                    }
                }
            }
        });
    }
}

/// Resolves once the coordinator enters its finished phase.
async fn finished(status: &mut watch::Receiver<RoundStatus>) {
    let finished = status
        .wait_for(|status| status.phase == Phase::Finished)
        .await
        .is_ok();

    // The coordinator is gone, only cancellation can stop the server now.
    if !finished {
        future::pending::<()>().await;
    }
}

/// Serves a single participant connection until it disconnects, fails or `cancel` fires.
///
/// The participant is registered (and welcomed with its id) first, then every update it sends is
/// submitted to the coordinator. A transport error drops the update being read and the connection,
/// the participant is deregistered either way.
///
/// # Arguments
/// * `coordinator` - The coordinator to submit to.
/// * `rx` - The receiving end of the connection.
/// * `tx` - The sending end of the connection, handed over to the coordinator for broadcasts.
/// * `addr` - The remote address, if any.
/// * `cancel` - Ends the session once cancelled.
pub async fn serve_participant<M, R, W>(
    coordinator: Arc<Coordinator<M>>,
    mut rx: FrameReceiver<R>,
    tx: FrameSender<W>,
    addr: Option<SocketAddr>,
    cancel: CancellationToken,
) where
    M: Model + 'static,
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let id = match coordinator.register(addr, Box::new(tx)).await {
        Ok(id) => id,
        Err(e) => {
            warn!("failed to register participant {addr:?}: {e}");
            return;
        }
    };

    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => break,
            received = rx.recv::<Msg>() => received,
        };

        match received {
            Ok(Msg::Update { samples, params }) => {
                let update = Update::new(params.into_owned(), samples);

                match coordinator.submit(id, update).await {
                    Submission::Buffered { round, pending } => {
                        debug!("update from {id} buffered for round {round}, {pending} pending");
                    }
                    Submission::RoundClosed { round } => {
                        debug!("update from {id} closed round {round}");
                    }
                    Submission::Rejected(_) | Submission::AggregationFailed(_) => {}
                }
            }
            Ok(Msg::Control(Command::Disconnect)) => {
                info!(participant = id.get(); "{id} disconnected");
                break;
            }
            Ok(Msg::Err(e)) => warn!(participant = id.get(); "{id} reported an error: {e}"),
            Ok(msg) => warn!(
                participant = id.get();
                "unexpected {} message from {id}, ignoring it",
                msg.kind()
            ),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                info!(participant = id.get(); "connection with {id} closed: {e}");
                break;
            }
            Err(e) => {
                warn!(participant = id.get(); "transport error with {id}, dropping it: {e}");
                break;
            }
        }
    }

    coordinator.deregister(id).await;
}
