mod common;

use std::sync::Arc;
use std::time::Duration;

use camview::{
    Capabilities, CameraEndpoint, EventStream, HeadlessSurface, Player, PlayerConfig, PlayerError,
    PlayerEvent, RecordAction, SessionState, StatusReporter, StreamSession, Transport,
    TransportError, TransportPreference,
};
use common::{jpeg, AttemptLog, ByteDecoder, FakeFetcher, FakeRecorder};

fn session(config: PlayerConfig, fetcher: Arc<FakeFetcher>) -> (StreamSession, EventStream) {
    let (reporter, events) = StatusReporter::channel();
    let capabilities = Capabilities {
        fetcher: Some(fetcher),
        decoder: Some(Arc::new(ByteDecoder)),
        ..Capabilities::default()
    };
    let session = StreamSession::new(
        CameraEndpoint::new("cam.local").unwrap(),
        config,
        capabilities,
        Box::new(HeadlessSurface::default()),
        reporter,
    );
    (session, events)
}

fn refused() -> Result<Vec<u8>, TransportError> {
    Err(TransportError::Network("connection refused".into()))
}

/// Step until nothing arrives for `quiet` of virtual time.
async fn settle(session: &mut StreamSession, quiet: Duration) {
    while tokio::time::timeout(quiet, session.step()).await.is_ok() {}
}

#[tokio::test(start_paused = true)]
async fn six_consecutive_jpeg_failures_disconnect_once() {
    let fetcher = Arc::new(
        FakeFetcher::new(AttemptLog::default()).with_snapshots(vec![Ok(jpeg(1))], refused()),
    );
    let mut config = PlayerConfig::default();
    config.reconnect_interval = Duration::ZERO;
    let (mut session, mut events) = session(config, fetcher.clone());

    session.start(Transport::JpegPoll);
    assert_eq!(session.await_attempt().await, Ok(Transport::JpegPoll));
    settle(&mut session, Duration::from_secs(30)).await;

    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(fetcher.fetches(), 1 + 6);
    assert_eq!(
        events.drain(),
        vec![
            PlayerEvent::Connected(Transport::JpegPoll),
            PlayerEvent::Error {
                message: "network error: connection refused".into(),
                recoverable: true,
            },
            PlayerEvent::Disconnected,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn a_successful_fetch_resets_the_failure_count() {
    let mut script = vec![Ok(jpeg(1))];
    for _ in 0..2 {
        script.extend((0..5).map(|_| refused()));
        script.push(Ok(jpeg(2)));
    }
    let fetcher = Arc::new(
        FakeFetcher::new(AttemptLog::default()).with_snapshots(script, Ok(jpeg(3))),
    );
    let (mut session, mut events) = session(PlayerConfig::default(), fetcher.clone());

    session.start(Transport::JpegPoll);
    session.await_attempt().await.unwrap();
    let _ = tokio::time::timeout(Duration::from_secs(20), async {
        loop {
            session.step().await;
        }
    })
    .await;

    assert_eq!(session.state(), SessionState::Connected(Transport::JpegPoll));
    assert!(fetcher.fetches() > 13);
    assert_eq!(events.drain(), vec![PlayerEvent::Connected(Transport::JpegPoll)]);
}

#[tokio::test(start_paused = true)]
async fn jpeg_polling_waits_for_completion_between_fetches() {
    let fetcher = Arc::new(
        FakeFetcher::new(AttemptLog::default()).with_snapshots(Vec::new(), Ok(jpeg(5))),
    );
    let mut config = PlayerConfig::default();
    config.jpeg.fps = 10;
    let (mut session, _events) = session(config, fetcher.clone());

    session.start(Transport::JpegPoll);
    session.await_attempt().await.unwrap();
    let _ = tokio::time::timeout(Duration::from_millis(1050), async {
        loop {
            session.step().await;
        }
    })
    .await;

    // One fetch at t=0, then one every 100 ms.
    assert_eq!(fetcher.fetches(), 11);
}

#[tokio::test(start_paused = true)]
async fn disconnect_then_connect_leaves_one_live_handler() {
    let fetcher = Arc::new(FakeFetcher::new(AttemptLog::default()));
    let (mut player, mut events) = Player::builder(PlayerConfig::default())
        .fetcher(fetcher.clone())
        .decoder(Arc::new(ByteDecoder))
        .surface(HeadlessSurface::default())
        .build()
        .unwrap();
    let endpoint = CameraEndpoint::new("cam.local")
        .unwrap()
        .with_preferred_transport(TransportPreference::Only(Transport::Mjpeg));

    player.connect(endpoint.clone()).await.unwrap();

    // A frame the old handler delivers but the session has not applied yet.
    fetcher.stream(0).send(Ok(jpeg(99))).await.unwrap();
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }

    player.disconnect();
    player.connect(endpoint).await.unwrap();

    assert_eq!(fetcher.streams_opened(), 2);
    assert!(fetcher.stream_closed(0));
    assert!(!fetcher.stream_closed(1));

    let stats = player.stats().unwrap();
    assert_eq!(stats.stale_dropped, 1);
    assert_eq!(stats.frames, 1);
    assert_eq!(
        events.drain(),
        vec![
            PlayerEvent::Connected(Transport::Mjpeg),
            PlayerEvent::Disconnected,
            PlayerEvent::Connected(Transport::Mjpeg),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn ended_stream_reconnects_after_fixed_delay() {
    let fetcher = Arc::new(FakeFetcher::new(AttemptLog::default()));
    let (mut session, mut events) = session(PlayerConfig::default(), fetcher.clone());

    session.start(Transport::Mjpeg);
    session.await_attempt().await.unwrap();
    fetcher.end_stream(0);

    assert_eq!(session.step().await, SessionState::Reconnecting(Transport::Mjpeg));
    let scheduled = tokio::time::Instant::now();
    assert_eq!(session.step().await, SessionState::Connecting(Transport::Mjpeg));
    assert!(scheduled.elapsed() >= Duration::from_secs(5));
    assert_eq!(session.step().await, SessionState::Connected(Transport::Mjpeg));
    assert_eq!(fetcher.streams_opened(), 2);

    let events = events.drain();
    assert_eq!(events[0], PlayerEvent::Connected(Transport::Mjpeg));
    assert!(matches!(events[1], PlayerEvent::Error { recoverable: true, .. }));
    assert_eq!(events[2], PlayerEvent::Disconnected);
    assert_eq!(
        events[3],
        PlayerEvent::Reconnecting {
            transport: Transport::Mjpeg,
            delay: Duration::from_secs(5)
        }
    );
    assert_eq!(events[4], PlayerEvent::Connected(Transport::Mjpeg));
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_pending_reconnect() {
    let fetcher = Arc::new(FakeFetcher::new(AttemptLog::default()));
    let (mut session, mut events) = session(PlayerConfig::default(), fetcher.clone());

    session.start(Transport::Mjpeg);
    session.await_attempt().await.unwrap();
    fetcher.end_stream(0);
    assert_eq!(session.step().await, SessionState::Reconnecting(Transport::Mjpeg));

    session.disconnect();
    settle(&mut session, Duration::from_secs(60)).await;

    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(fetcher.streams_opened(), 1);
    let events = events.drain();
    // The failure reported Disconnected; the explicit disconnect adds none.
    assert_eq!(
        events
            .iter()
            .filter(|e| **e == PlayerEvent::Disconnected)
            .count(),
        1
    );
    assert!(matches!(events.last(), Some(PlayerEvent::Reconnecting { .. })));
}

#[tokio::test(start_paused = true)]
async fn starting_while_reconnecting_cancels_the_reconnect_timer() {
    let fetcher = Arc::new(FakeFetcher::new(AttemptLog::default()));
    let mut config = PlayerConfig::default();
    config.mjpeg_liveness = Duration::from_secs(60);
    let (mut session, _events) = session(config, fetcher.clone());

    session.start(Transport::Mjpeg);
    session.await_attempt().await.unwrap();
    fetcher.end_stream(0);
    assert_eq!(session.step().await, SessionState::Reconnecting(Transport::Mjpeg));

    session.start(Transport::Mjpeg);
    assert_eq!(session.await_attempt().await, Ok(Transport::Mjpeg));
    let _ = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            session.step().await;
        }
    })
    .await;

    assert_eq!(session.state(), SessionState::Connected(Transport::Mjpeg));
    assert_eq!(session.stats().stale_dropped, 0);
    assert_eq!(fetcher.streams_opened(), 2);
}

#[tokio::test(start_paused = true)]
async fn recording_starts_only_on_a_connected_stream() {
    let fetcher = Arc::new(FakeFetcher::new(AttemptLog::default()));
    let recorder = Arc::new(FakeRecorder::default());
    let (mut player, _events) = Player::builder(PlayerConfig::default())
        .fetcher(fetcher)
        .decoder(Arc::new(ByteDecoder))
        .surface(HeadlessSurface::default())
        .recorder(recorder.clone())
        .build()
        .unwrap();

    let err = player.toggle_recording().await.unwrap_err();
    assert!(matches!(err, PlayerError::NotConnected));
    assert!(!player.is_recording());
    assert!(recorder.actions().is_empty());

    let endpoint = CameraEndpoint::new("cam.local")
        .unwrap()
        .with_preferred_transport(TransportPreference::Only(Transport::Mjpeg));
    player.connect(endpoint).await.unwrap();

    assert_eq!(player.toggle_recording().await.unwrap(), RecordAction::Start);
    assert!(player.is_recording());
    assert_eq!(player.recording_filename(), Some("cam.mp4"));

    // Stopping does not need the stream.
    player.disconnect();
    assert_eq!(player.toggle_recording().await.unwrap(), RecordAction::Stop);
    assert!(!player.is_recording());
    assert_eq!(recorder.actions(), vec![RecordAction::Start, RecordAction::Stop]);
}

#[tokio::test(start_paused = true)]
async fn stalled_mjpeg_stream_hits_liveness_timeout() {
    let fetcher = Arc::new(FakeFetcher::new(AttemptLog::default()));
    let mut config = PlayerConfig::default();
    config.reconnect_interval = Duration::ZERO;
    let (mut session, mut events) = session(config, fetcher.clone());

    session.start(Transport::Mjpeg);
    session.await_attempt().await.unwrap();
    let stalled = tokio::time::Instant::now();
    assert_eq!(session.step().await, SessionState::Disconnected);
    assert!(stalled.elapsed() >= Duration::from_secs(5));

    assert!(events.drain().contains(&PlayerEvent::Error {
        message: "mjpeg connect timed out after 5000 ms".into(),
        recoverable: true,
    }));
}
