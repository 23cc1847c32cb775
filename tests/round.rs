use std::{borrow::Cow, future, sync::Arc, time::Duration};

use async_trait::async_trait;

use comms::{
    FrameReceiver,
    msg::{Command, Msg},
};
use fedround::{
    ParameterSet,
    aggregation::{AggregationErr, Weighting},
    anomaly::{AnomalyDetector, ExclusionPolicy, GroupOutlierCheck},
    coordinator::{
        CloseErr, Coordinator, CoordinatorSettings, Deadline, ParticipantId, ParticipantSink, Phase,
        Rejection, Submission, TimeoutPolicy, Update,
    },
    model::{DenseModel, EvalSet},
    service::{Server, serve_participant},
};
use ndarray::array;
use tokio::{
    io::{self, AsyncWriteExt, DuplexStream},
    net::{TcpListener, TcpStream},
    time,
};
use tokio_util::sync::CancellationToken;

type Inbox = FrameReceiver<DuplexStream>;

/// One single valued layer per entry.
fn params(values: &[f32]) -> ParameterSet {
    ParameterSet::from_vecs(values.iter().map(|&v| vec![v]).collect())
}

fn coordinator(settings: CoordinatorSettings) -> Coordinator<DenseModel> {
    Coordinator::new(DenseModel::new(params(&[0., 0.])), settings)
}

/// Registers a participant backed by an in-memory stream and consumes its welcome.
async fn join(coordinator: &Coordinator<DenseModel>) -> (ParticipantId, Inbox) {
    let (ours, theirs) = io::duplex(1 << 16);
    let (_, tx) = comms::channel(io::empty(), ours);
    let id = coordinator.register(None, Box::new(tx)).await.unwrap();

    let (mut inbox, _) = comms::channel(theirs, io::sink());
    match inbox.recv::<Msg>().await.unwrap() {
        Msg::Control(Command::Welcome { participant, .. }) => assert_eq!(participant, id.get()),
        msg => panic!("expected a welcome, got {msg:?}"),
    }

    (id, inbox)
}

async fn next_params(inbox: &mut Inbox) -> ParameterSet {
    match inbox.recv::<Msg>().await.unwrap() {
        Msg::Params(params) => params.into_owned(),
        msg => panic!("expected params, got {msg:?}"),
    }
}

async fn submit(
    coordinator: &Coordinator<DenseModel>,
    id: ParticipantId,
    values: &[f32],
) -> Submission {
    coordinator.submit(id, Update::new(params(values), 1)).await
}

/// Flags every update of a single participant.
struct FlagOne(ParticipantId);

impl AnomalyDetector for FlagOne {
    fn observe(&mut self, _participant: ParticipantId, _params: &ParameterSet) {}

    fn poll(&mut self, participant: ParticipantId) -> bool {
        participant == self.0
    }
}

/// Accepts the welcome, then fails every write.
#[derive(Default)]
struct Broken {
    welcomed: bool,
}

#[async_trait]
impl ParticipantSink for Broken {
    async fn deliver(&mut self, _msg: &Msg<'_>) -> io::Result<()> {
        if !self.welcomed {
            self.welcomed = true;
            return Ok(());
        }

        Err(io::ErrorKind::BrokenPipe.into())
    }
}

/// Accepts the welcome, then never completes a write.
#[derive(Default)]
struct Stalled {
    welcomed: bool,
}

#[async_trait]
impl ParticipantSink for Stalled {
    async fn deliver(&mut self, _msg: &Msg<'_>) -> io::Result<()> {
        if !self.welcomed {
            self.welcomed = true;
            return Ok(());
        }

        future::pending().await
    }
}

#[tokio::test]
async fn full_round_averages_and_broadcasts() {
    let coordinator = coordinator(CoordinatorSettings::default());
    let (a, mut a_inbox) = join(&coordinator).await;
    let (b, mut b_inbox) = join(&coordinator).await;
    let (c, mut c_inbox) = join(&coordinator).await;

    assert!(matches!(
        submit(&coordinator, a, &[1., 2.]).await,
        Submission::Buffered { round: 0, pending: 2 }
    ));
    assert!(matches!(
        submit(&coordinator, b, &[3., 4.]).await,
        Submission::Buffered { round: 0, pending: 1 }
    ));
    assert!(matches!(
        submit(&coordinator, c, &[5., 6.]).await,
        Submission::RoundClosed { round: 0 }
    ));

    let expected = params(&[3., 4.]);
    assert_eq!(coordinator.parameters().await, expected);

    for inbox in [&mut a_inbox, &mut b_inbox, &mut c_inbox] {
        assert_eq!(next_params(inbox).await, expected);
    }

    let status = coordinator.status();
    assert_eq!(status.round, 1);
    assert_eq!(status.phase, Phase::Collecting);
    assert_eq!(status.updates_received, 0);
    assert_eq!(status.participants, 3);
}

#[tokio::test]
async fn round_waits_for_every_participant() {
    let coordinator = coordinator(CoordinatorSettings::default());
    let (a, _a_inbox) = join(&coordinator).await;
    let (b, _b_inbox) = join(&coordinator).await;
    let (_c, _c_inbox) = join(&coordinator).await;

    submit(&coordinator, a, &[1., 2.]).await;
    submit(&coordinator, b, &[3., 4.]).await;

    let status = coordinator.status();
    assert_eq!(status.round, 0);
    assert_eq!(status.updates_received, 2);
    assert_eq!(coordinator.parameters().await, params(&[0., 0.]));
}

#[tokio::test]
async fn min_participants_holds_the_barrier() {
    let settings = CoordinatorSettings {
        min_participants: 2,
        ..Default::default()
    };
    let coordinator = coordinator(settings);
    let (a, _inbox) = join(&coordinator).await;

    assert!(matches!(
        submit(&coordinator, a, &[1., 2.]).await,
        Submission::Buffered { round: 0, .. }
    ));

    let (b, _inbox) = join(&coordinator).await;
    assert!(matches!(
        submit(&coordinator, b, &[3., 4.]).await,
        Submission::RoundClosed { round: 0 }
    ));
    assert_eq!(coordinator.parameters().await, params(&[2., 3.]));
}

#[tokio::test]
async fn empty_update_is_rejected() {
    let coordinator = coordinator(CoordinatorSettings::default());
    let (a, _inbox) = join(&coordinator).await;

    let submission = coordinator
        .submit(a, Update::new(ParameterSet::default(), 10))
        .await;

    assert!(matches!(submission, Submission::Rejected(Rejection::Empty)));
    assert_eq!(coordinator.status().updates_received, 0);
    assert_eq!(coordinator.status().round, 0);
}

#[tokio::test]
async fn mismatched_shape_is_rejected() {
    let coordinator = coordinator(CoordinatorSettings::default());
    let (a, _inbox) = join(&coordinator).await;

    assert!(matches!(
        submit(&coordinator, a, &[1., 2., 3.]).await,
        Submission::Rejected(Rejection::Shape(_))
    ));

    let wrong_layer = ParameterSet::from_vecs(vec![vec![1., 1.], vec![2.]]);
    assert!(matches!(
        coordinator.submit(a, Update::new(wrong_layer, 1)).await,
        Submission::Rejected(Rejection::Shape(_))
    ));

    assert_eq!(coordinator.status().updates_received, 0);
}

#[tokio::test]
async fn resubmission_replaces_the_earlier_update() {
    let coordinator = coordinator(CoordinatorSettings::default());
    let (a, _a_inbox) = join(&coordinator).await;
    let (b, _b_inbox) = join(&coordinator).await;

    submit(&coordinator, a, &[100., 100.]).await;
    submit(&coordinator, a, &[1., 2.]).await;
    assert_eq!(coordinator.status().updates_received, 1);

    submit(&coordinator, b, &[3., 4.]).await;
    assert_eq!(coordinator.parameters().await, params(&[2., 3.]));
}

#[tokio::test]
async fn flagged_update_is_counted_but_still_aggregated() {
    let coordinator = coordinator(CoordinatorSettings::default())
        .with_detector(Box::new(FlagOne(ParticipantId::new(1))));
    let (a, _a_inbox) = join(&coordinator).await;
    let (b, _b_inbox) = join(&coordinator).await;
    let (c, _c_inbox) = join(&coordinator).await;

    submit(&coordinator, a, &[1., 1.]).await;
    submit(&coordinator, b, &[4., 4.]).await;
    assert_eq!(coordinator.status().anomalies_flagged, 1);

    assert!(matches!(
        submit(&coordinator, c, &[1., 1.]).await,
        Submission::RoundClosed { round: 0 }
    ));
    assert_eq!(coordinator.parameters().await, params(&[2., 2.]));
    assert_eq!(coordinator.status().anomalies_flagged, 1);
}

#[tokio::test]
async fn excluded_update_still_satisfies_the_barrier() {
    let settings = CoordinatorSettings {
        exclusion: ExclusionPolicy::ExcludeFlagged,
        ..Default::default()
    };
    let coordinator =
        coordinator(settings).with_detector(Box::new(FlagOne(ParticipantId::new(2))));
    let (a, _a_inbox) = join(&coordinator).await;
    let (b, _b_inbox) = join(&coordinator).await;
    let (c, _c_inbox) = join(&coordinator).await;

    submit(&coordinator, a, &[1., 1.]).await;
    submit(&coordinator, b, &[2., 2.]).await;
    submit(&coordinator, c, &[30., 30.]).await;

    assert_eq!(coordinator.status().round, 1);
    assert_eq!(coordinator.parameters().await, params(&[1.5, 1.5]));
}

#[tokio::test]
async fn group_outlier_is_left_out() {
    let settings = CoordinatorSettings {
        exclusion: ExclusionPolicy::ExcludeFlagged,
        group_check: Some(GroupOutlierCheck::default()),
        ..Default::default()
    };
    let coordinator = coordinator(settings);
    let mut ids = Vec::new();
    for _ in 0..4 {
        ids.push(join(&coordinator).await);
    }

    for ((id, _), value) in ids.iter().zip([1., 2., 3., 100.]) {
        submit(&coordinator, *id, &[value, value]).await;
    }

    let status = coordinator.status();
    assert_eq!(status.round, 1);
    assert_eq!(status.anomalies_flagged, 0);
    assert_eq!(coordinator.parameters().await, params(&[2., 2.]));
}

#[tokio::test]
async fn group_check_needs_three_updates() {
    let settings = CoordinatorSettings {
        exclusion: ExclusionPolicy::ExcludeFlagged,
        group_check: Some(GroupOutlierCheck::default()),
        ..Default::default()
    };
    let coordinator = coordinator(settings);
    let (a, _a_inbox) = join(&coordinator).await;
    let (b, _b_inbox) = join(&coordinator).await;

    submit(&coordinator, a, &[2., 2.]).await;
    submit(&coordinator, b, &[100., 100.]).await;

    assert_eq!(coordinator.parameters().await, params(&[51., 51.]));
}

#[tokio::test]
async fn sample_count_weighting() {
    let settings = CoordinatorSettings {
        weighting: Weighting::SampleCount,
        ..Default::default()
    };
    let coordinator = coordinator(settings);
    let (a, _a_inbox) = join(&coordinator).await;
    let (b, _b_inbox) = join(&coordinator).await;

    coordinator.submit(a, Update::new(params(&[0., 0.]), 1)).await;
    coordinator.submit(b, Update::new(params(&[4., 8.]), 3)).await;

    assert_eq!(coordinator.parameters().await, params(&[3., 6.]));
}

#[tokio::test]
async fn failed_aggregation_keeps_the_buffer() {
    let settings = CoordinatorSettings {
        weighting: Weighting::SampleCount,
        ..Default::default()
    };
    let coordinator = coordinator(settings);
    let (a, _a_inbox) = join(&coordinator).await;
    let (b, _b_inbox) = join(&coordinator).await;

    coordinator.submit(a, Update::new(params(&[1., 1.]), 0)).await;
    let submission = coordinator.submit(b, Update::new(params(&[2., 2.]), 0)).await;

    assert!(matches!(
        submission,
        Submission::AggregationFailed(CloseErr::Aggregation(AggregationErr::ZeroWeight))
    ));

    let status = coordinator.status();
    assert_eq!(status.round, 0);
    assert_eq!(status.phase, Phase::Collecting);
    assert_eq!(status.updates_received, 2);

    assert!(matches!(
        coordinator.submit(a, Update::new(params(&[5., 5.]), 2)).await,
        Submission::RoundClosed { round: 0 }
    ));
    assert_eq!(coordinator.parameters().await, params(&[5., 5.]));
}

#[tokio::test]
async fn departed_submitter_rejoins_the_cohort() {
    let coordinator = coordinator(CoordinatorSettings::default());
    let (a, _a_inbox) = join(&coordinator).await;
    let (b, _b_inbox) = join(&coordinator).await;
    coordinator.deregister(b).await;

    assert!(matches!(
        submit(&coordinator, b, &[2., 2.]).await,
        Submission::Buffered { round: 0, pending: 1 }
    ));
    assert_eq!(coordinator.status().participants, 2);

    submit(&coordinator, a, &[4., 4.]).await;
    assert_eq!(coordinator.parameters().await, params(&[3., 3.]));
}

#[tokio::test]
async fn never_issued_id_is_rejected() {
    let coordinator = coordinator(CoordinatorSettings::default());
    let (a, _a_inbox) = join(&coordinator).await;

    for id in [ParticipantId::new(42), ParticipantId::new(u64::MAX)] {
        assert!(matches!(
            submit(&coordinator, id, &[9., 9.]).await,
            Submission::Rejected(Rejection::UnknownParticipant)
        ));
    }

    let status = coordinator.status();
    assert_eq!(status.participants, 1);
    assert_eq!(status.updates_received, 0);

    let (b, _b_inbox) = join(&coordinator).await;
    assert_eq!(b, ParticipantId::new(1));

    submit(&coordinator, a, &[1., 1.]).await;
    assert!(matches!(
        submit(&coordinator, b, &[3., 3.]).await,
        Submission::RoundClosed { round: 0 }
    ));
    assert_eq!(coordinator.parameters().await, params(&[2., 2.]));
}

#[tokio::test]
async fn leaving_participant_completes_the_round() {
    let coordinator = coordinator(CoordinatorSettings::default());
    let (a, mut a_inbox) = join(&coordinator).await;
    let (b, mut b_inbox) = join(&coordinator).await;
    let (c, _c_inbox) = join(&coordinator).await;

    submit(&coordinator, a, &[1., 2.]).await;
    submit(&coordinator, b, &[3., 4.]).await;
    coordinator.deregister(c).await;

    let expected = params(&[2., 3.]);
    assert_eq!(next_params(&mut a_inbox).await, expected);
    assert_eq!(next_params(&mut b_inbox).await, expected);

    let status = coordinator.status();
    assert_eq!(status.round, 1);
    assert_eq!(status.participants, 2);
}

#[tokio::test]
async fn leaving_participant_with_a_failed_close_keeps_the_round() {
    let settings = CoordinatorSettings {
        weighting: Weighting::SampleCount,
        ..Default::default()
    };
    let coordinator = coordinator(settings);
    let (a, _a_inbox) = join(&coordinator).await;
    let (b, _b_inbox) = join(&coordinator).await;
    let (c, _c_inbox) = join(&coordinator).await;

    coordinator.submit(a, Update::new(params(&[1., 1.]), 0)).await;
    coordinator.submit(b, Update::new(params(&[2., 2.]), 0)).await;
    coordinator.deregister(c).await;

    let status = coordinator.status();
    assert_eq!(status.round, 0);
    assert_eq!(status.phase, Phase::Collecting);
    assert_eq!(status.participants, 2);
    assert_eq!(status.updates_received, 2);
    assert_eq!(coordinator.parameters().await, params(&[0., 0.]));
}

#[tokio::test]
async fn leaving_participant_takes_its_update_along() {
    let coordinator = coordinator(CoordinatorSettings::default());
    let (a, _a_inbox) = join(&coordinator).await;
    let (b, _b_inbox) = join(&coordinator).await;
    let (_c, _c_inbox) = join(&coordinator).await;

    submit(&coordinator, a, &[1., 2.]).await;
    coordinator.deregister(a).await;

    let status = coordinator.status();
    assert_eq!(status.round, 0);
    assert_eq!(status.updates_received, 0);

    submit(&coordinator, b, &[3., 4.]).await;
    assert_eq!(coordinator.status().round, 0);
}

#[tokio::test(start_paused = true)]
async fn deadline_aborts_the_round() {
    let settings = CoordinatorSettings {
        round_timeout: Some(Duration::from_secs(10)),
        ..Default::default()
    };
    let coordinator = coordinator(settings);
    let (a, _a_inbox) = join(&coordinator).await;
    let (_b, _b_inbox) = join(&coordinator).await;

    submit(&coordinator, a, &[1., 2.]).await;
    assert!(matches!(coordinator.enforce_deadline().await, Deadline::Pending));

    time::advance(Duration::from_secs(11)).await;
    assert!(matches!(
        coordinator.enforce_deadline().await,
        Deadline::Aborted { round: 0, dropped: 1 }
    ));

    let status = coordinator.status();
    assert_eq!(status.round, 0);
    assert_eq!(status.updates_received, 0);
    assert_eq!(coordinator.parameters().await, params(&[0., 0.]));
}

#[tokio::test(start_paused = true)]
async fn deadline_without_updates_restarts_the_timer() {
    let settings = CoordinatorSettings {
        round_timeout: Some(Duration::from_secs(10)),
        ..Default::default()
    };
    let coordinator = coordinator(settings);
    let (_a, _inbox) = join(&coordinator).await;

    time::advance(Duration::from_secs(11)).await;
    assert!(matches!(coordinator.enforce_deadline().await, Deadline::Restarted));

    time::advance(Duration::from_secs(5)).await;
    assert!(matches!(coordinator.enforce_deadline().await, Deadline::Pending));
}

#[tokio::test(start_paused = true)]
async fn deadline_aggregates_a_partial_round() {
    let settings = CoordinatorSettings {
        round_timeout: Some(Duration::from_secs(10)),
        timeout_policy: TimeoutPolicy::AggregatePartial { min_updates: 1 },
        ..Default::default()
    };
    let coordinator = coordinator(settings);
    let (a, mut a_inbox) = join(&coordinator).await;
    let (_b, mut b_inbox) = join(&coordinator).await;

    submit(&coordinator, a, &[2., 4.]).await;
    time::advance(Duration::from_secs(11)).await;

    assert!(matches!(
        coordinator.enforce_deadline().await,
        Deadline::Aggregated { round: 0, updates: 1 }
    ));

    let expected = params(&[2., 4.]);
    assert_eq!(next_params(&mut a_inbox).await, expected);
    assert_eq!(next_params(&mut b_inbox).await, expected);
    assert_eq!(coordinator.status().round, 1);
}

#[tokio::test]
async fn no_deadline_never_expires() {
    let coordinator = coordinator(CoordinatorSettings::default());
    let (a, _inbox) = join(&coordinator).await;
    let (_b, _inbox) = join(&coordinator).await;

    submit(&coordinator, a, &[1., 1.]).await;
    assert!(matches!(coordinator.enforce_deadline().await, Deadline::Pending));
}

#[tokio::test]
async fn last_round_finishes_the_session() {
    let settings = CoordinatorSettings {
        total_rounds: 1,
        stop_at_total_rounds: true,
        ..Default::default()
    };
    let coordinator = coordinator(settings);
    let (a, _inbox) = join(&coordinator).await;

    submit(&coordinator, a, &[1., 1.]).await;
    assert_eq!(coordinator.status().phase, Phase::Finished);

    assert!(matches!(
        submit(&coordinator, a, &[2., 2.]).await,
        Submission::Rejected(Rejection::Finished)
    ));

    let (ours, theirs) = io::duplex(1 << 16);
    let (_, tx) = comms::channel(io::empty(), ours);
    assert!(coordinator.register(None, Box::new(tx)).await.is_err());

    let (mut inbox, _) = comms::channel(theirs, io::sink());
    assert!(matches!(inbox.recv::<Msg>().await.unwrap(), Msg::Err(_)));
}

#[tokio::test]
async fn rounds_past_the_total_keep_going_by_default() {
    let coordinator = coordinator(CoordinatorSettings::default());
    let (a, mut inbox) = join(&coordinator).await;

    for round in 0..3 {
        let value = round as f32;
        assert!(matches!(
            submit(&coordinator, a, &[value, value]).await,
            Submission::RoundClosed { .. }
        ));
        assert_eq!(next_params(&mut inbox).await, params(&[value, value]));
    }

    let status = coordinator.status();
    assert_eq!(status.round, 3);
    assert_eq!(status.phase, Phase::Collecting);
}

#[tokio::test]
async fn disconnect_all_says_goodbye() {
    let coordinator = coordinator(CoordinatorSettings::default());
    let (_a, mut inbox) = join(&coordinator).await;

    coordinator.disconnect_all().await;

    assert_eq!(
        inbox.recv::<Msg>().await.unwrap(),
        Msg::Control(Command::Disconnect)
    );
    assert_eq!(coordinator.status().participants, 0);
}

#[tokio::test]
async fn participant_session_over_a_stream() -> io::Result<()> {
    let coordinator = Arc::new(coordinator(CoordinatorSettings::default()));
    let cancel = CancellationToken::new();

    let (one, two) = io::duplex(1 << 16);
    let (coordinator_rx, coordinator_tx) = io::split(one);
    let (participant_rx, participant_tx) = io::split(two);
    let (rx, tx) = comms::channel(coordinator_rx, coordinator_tx);
    let (mut rx_p, mut tx_p) = comms::channel(participant_rx, participant_tx);

    let session = tokio::spawn(serve_participant(
        Arc::clone(&coordinator),
        rx,
        tx,
        None,
        cancel,
    ));

    let Msg::Control(Command::Welcome { round, .. }) = rx_p.recv::<Msg>().await? else {
        panic!("expected a welcome");
    };
    assert_eq!(round, 0);

    let local = params(&[7., 8.]);
    let update = Msg::Update {
        samples: 16,
        params: Cow::Borrowed(&local),
    };
    tx_p.send(&update).await?;

    let Msg::Params(global) = rx_p.recv::<Msg>().await? else {
        panic!("expected params");
    };
    assert_eq!(*global, local);

    tx_p.send(&Msg::Control(Command::Disconnect)).await?;
    session.await.unwrap();

    let status = coordinator.status();
    assert_eq!(status.round, 1);
    assert_eq!(status.participants, 0);
    Ok(())
}

#[tokio::test]
async fn server_stops_once_every_round_finished() -> io::Result<()> {
    let settings = CoordinatorSettings {
        total_rounds: 1,
        stop_at_total_rounds: true,
        ..Default::default()
    };
    let coordinator = Arc::new(coordinator(settings));
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let server = tokio::spawn(Server::new(coordinator, CancellationToken::new()).run(listener));

    let (rx, tx) = TcpStream::connect(addr).await?.into_split();
    let (mut rx, mut tx) = comms::channel(rx, tx);

    let Msg::Control(Command::Welcome { .. }) = rx.recv::<Msg>().await? else {
        panic!("expected a welcome");
    };

    let local = params(&[1., 2.]);
    tx.send(&Msg::Update {
        samples: 1,
        params: Cow::Borrowed(&local),
    })
    .await?;

    assert_eq!(rx.recv::<Msg>().await?, Msg::Params(Cow::Owned(local)));
    assert_eq!(rx.recv::<Msg>().await?, Msg::Control(Command::Disconnect));

    tx.shutdown().await?;
    server.await.unwrap()?;
    Ok(())
}

#[tokio::test]
async fn cancelling_the_server_disconnects_participants() -> io::Result<()> {
    let coordinator = Arc::new(coordinator(CoordinatorSettings::default()));
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let cancel = CancellationToken::new();

    let server = tokio::spawn(Server::new(Arc::clone(&coordinator), cancel.clone()).run(listener));

    let (rx, _tx) = TcpStream::connect(addr).await?.into_split();
    let (mut rx, _) = comms::channel(rx, io::sink());

    let Msg::Control(Command::Welcome { .. }) = rx.recv::<Msg>().await? else {
        panic!("expected a welcome");
    };

    cancel.cancel();

    assert_eq!(rx.recv::<Msg>().await?, Msg::Control(Command::Disconnect));
    server.await.unwrap()?;
    assert_eq!(coordinator.status().participants, 0);
    Ok(())
}

#[tokio::test]
async fn broadcast_continues_past_a_failed_write() {
    let coordinator = coordinator(CoordinatorSettings::default());
    let broken = coordinator
        .register(None, Box::new(Broken::default()))
        .await
        .unwrap();
    let (a, mut inbox) = join(&coordinator).await;

    submit(&coordinator, broken, &[1., 1.]).await;
    assert!(matches!(
        submit(&coordinator, a, &[3., 3.]).await,
        Submission::RoundClosed { round: 0 }
    ));

    assert_eq!(next_params(&mut inbox).await, params(&[2., 2.]));
    assert_eq!(coordinator.status().round, 1);
}

#[tokio::test(start_paused = true)]
async fn stalled_participant_times_out() {
    let settings = CoordinatorSettings {
        broadcast_timeout: Some(Duration::from_secs(5)),
        ..Default::default()
    };
    let coordinator = coordinator(settings);
    let stalled = coordinator
        .register(None, Box::new(Stalled::default()))
        .await
        .unwrap();
    let (a, mut inbox) = join(&coordinator).await;

    submit(&coordinator, stalled, &[2., 2.]).await;
    assert!(matches!(
        submit(&coordinator, a, &[2., 2.]).await,
        Submission::RoundClosed { round: 0 }
    ));

    assert_eq!(next_params(&mut inbox).await, params(&[2., 2.]));
}

#[tokio::test]
async fn send_to_a_single_participant() {
    let coordinator = coordinator(CoordinatorSettings::default());
    let (a, mut inbox) = join(&coordinator).await;
    let global = params(&[9., 9.]);

    coordinator.send_to(a, &global).await.unwrap();
    assert_eq!(next_params(&mut inbox).await, global);

    let err = coordinator
        .send_to(ParticipantId::new(99), &global)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::NotFound);
}

#[tokio::test]
async fn broadcast_reaches_everyone() {
    let coordinator = coordinator(CoordinatorSettings::default());
    let (_a, mut a_inbox) = join(&coordinator).await;
    let (_b, mut b_inbox) = join(&coordinator).await;
    let global = params(&[4., 2.]);

    coordinator.broadcast(&global).await;

    assert_eq!(next_params(&mut a_inbox).await, global);
    assert_eq!(next_params(&mut b_inbox).await, global);
}

#[tokio::test]
async fn evaluation_needs_data() {
    let coordinator = coordinator(CoordinatorSettings::default());
    assert_eq!(coordinator.evaluate("no data").await, None);
}

#[tokio::test]
async fn round_records_the_accuracy_of_the_new_model() {
    // Two features, two classes, the identity weights classify by the larger feature.
    let layout = |w: [f32; 4]| {
        ParameterSet::new(vec![
            array![[w[0], w[1]], [w[2], w[3]]].into_dyn(),
            array![0., 0.].into_dyn(),
        ])
    };
    let data = EvalSet::new(array![[1., 0.], [0., 1.]], vec![0, 1]).unwrap();
    let coordinator = Coordinator::new(
        DenseModel::new(layout([0., 1., 1., 0.])),
        CoordinatorSettings::default(),
    )
    .with_eval_data(data);

    assert_eq!(coordinator.evaluate("swapped").await, Some(0.));

    let (a, _inbox) = join(&coordinator).await;
    coordinator
        .submit(a, Update::new(layout([1., 0., 0., 1.]), 1))
        .await;

    assert_eq!(coordinator.status().last_accuracy, Some(1.));
    assert_eq!(coordinator.evaluate("identity").await, Some(1.));
}
