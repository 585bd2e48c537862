//! Room session integration tests
//!
//! Two sessions share one in-memory signaling store and negotiate real
//! peer connections over loopback. Media assertions ride host ICE
//! candidates, so these tests need no network beyond 127.0.0.1.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::info;

use parlor_rtc::{
    AudioCodec, ConnectionPhase, LocalStream, MemorySignalingStore, RemoteTrackHandler,
    RoomSession, RtcConfig, SignalingStore, VideoCodec,
};

/// Initialize tracing for tests (call once per test)
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info,webrtc=warn")
        .try_init();
}

fn lan_session(my_id: &str, store: &Arc<MemorySignalingStore>) -> RoomSession {
    let store = Arc::clone(store) as Arc<dyn SignalingStore>;
    RoomSession::new(my_id, "test-room", RtcConfig::lan(), store)
        .expect("session config should be valid")
}

fn noop_handler() -> RemoteTrackHandler {
    Arc::new(|_media| {})
}

/// Poll until `condition` holds, panicking after `secs` seconds
async fn wait_for<F>(secs: u64, what: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    let waited = tokio::time::timeout(Duration::from_secs(secs), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {}", what);
}

#[tokio::test]
async fn test_offer_answer_settles_through_store() {
    init_logging();

    let store = Arc::new(MemorySignalingStore::new());
    let alice = lan_session("alice", &store);
    let bob = lan_session("bob", &store);

    let alice_conn = alice.open("bob", None, noop_handler()).await.unwrap();
    let bob_conn = bob.open("alice", None, noop_handler()).await.unwrap();

    // Bob consumes the offer and publishes an answer, Alice consumes
    // the answer; both stored descriptions end up cleared.
    let store_probe = Arc::clone(&store);
    let settled = tokio::time::timeout(Duration::from_secs(10), async move {
        loop {
            let to_bob = store_probe.load("test-room", "bob").await.unwrap();
            let to_alice = store_probe.load("test-room", "alice").await.unwrap();
            if to_bob.description_from("alice").is_none()
                && to_alice.description_from("bob").is_none()
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await;
    assert!(settled.is_ok(), "offer/answer exchange did not settle");

    assert_ne!(alice_conn.phase(), ConnectionPhase::Created);
    assert_ne!(bob_conn.phase(), ConnectionPhase::Created);

    alice.shutdown().await;
    bob.shutdown().await;
}

#[tokio::test]
async fn test_remote_tracks_fire_once_each_and_not_after_close() {
    init_logging();

    let store = Arc::new(MemorySignalingStore::new());
    let alice = lan_session("alice", &store);
    let bob = lan_session("bob", &store);

    let stream = LocalStream::new();
    let audio = stream.add_audio_track(&AudioCodec::Opus);
    let video = stream.add_video_track(&VideoCodec::VP9);

    let track_count = Arc::new(AtomicUsize::new(0));
    let seen_streams: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let handler: RemoteTrackHandler = {
        let track_count = Arc::clone(&track_count);
        let seen_streams = Arc::clone(&seen_streams);
        Arc::new(move |media| {
            info!(
                stream_id = %media.stream_id(),
                track_id = %media.track_id(),
                "Test observed remote track"
            );
            track_count.fetch_add(1, Ordering::SeqCst);
            seen_streams.lock().push(media.stream_id().to_string());
        })
    };

    let alice_conn = alice.open("bob", Some(&stream), noop_handler()).await.unwrap();
    bob.open("alice", None, handler).await.unwrap();

    // Remote tracks only surface once RTP flows, so keep feeding
    // samples until the test ends.
    let writer = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(20));
        loop {
            ticker.tick().await;
            let _ = audio
                .write_media(Bytes::from_static(&[0u8; 120]), Duration::from_millis(20))
                .await;
            let _ = video
                .write_media(Bytes::from_static(&[0u8; 1200]), Duration::from_millis(20))
                .await;
        }
    });

    wait_for(20, "transport to connect", || {
        alice_conn.phase() == ConnectionPhase::Connected
    })
    .await;

    let count_probe = Arc::clone(&track_count);
    wait_for(20, "both remote tracks", move || {
        count_probe.load(Ordering::SeqCst) == 2
    })
    .await;

    // Both tracks belong to the one published stream
    {
        let streams = seen_streams.lock();
        assert_eq!(streams.len(), 2);
        assert_eq!(streams[0], streams[1]);
        assert_eq!(streams[0], stream.id());
    }

    // Continued media after close must not surface new tracks
    bob.close("alice").await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(track_count.load(Ordering::SeqCst), 2);

    writer.abort();
    alice.shutdown().await;
    bob.shutdown().await;
}

#[tokio::test]
async fn test_candidate_records_are_drained() {
    init_logging();

    let store = Arc::new(MemorySignalingStore::new());
    let alice = lan_session("alice", &store);
    let bob = lan_session("bob", &store);

    let alice_conn = alice.open("bob", None, noop_handler()).await.unwrap();
    bob.open("alice", None, noop_handler()).await.unwrap();

    // Candidates flow once the offer/answer exchange finishes; the
    // drains clear each batch after applying it.
    wait_for(10, "candidates to be applied or buffered", || {
        alice_conn.applied_candidate_count() + alice_conn.buffered_candidate_count() > 0
    })
    .await;

    let store_probe = Arc::clone(&store);
    let drained = tokio::time::timeout(Duration::from_secs(10), async move {
        loop {
            let to_alice = store_probe.load("test-room", "alice").await.unwrap();
            let to_bob = store_probe.load("test-room", "bob").await.unwrap();
            if to_alice.candidates_from("bob").is_empty()
                && to_bob.candidates_from("alice").is_empty()
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await;
    assert!(drained.is_ok(), "candidate records were not drained");

    alice.shutdown().await;
    bob.shutdown().await;
}

#[tokio::test]
async fn test_session_shutdown_closes_everything() {
    init_logging();

    let store = Arc::new(MemorySignalingStore::new());
    let alice = lan_session("alice", &store);

    let bob_conn = alice.open("bob", None, noop_handler()).await.unwrap();
    let carol_conn = alice.open("carol", None, noop_handler()).await.unwrap();
    assert_eq!(alice.peer_ids().len(), 2);
    assert_eq!(store.watch_count(), 2);

    alice.shutdown().await;

    assert!(alice.peer_ids().is_empty());
    assert_eq!(store.watch_count(), 0);
    assert_eq!(bob_conn.phase(), ConnectionPhase::Closed);
    assert_eq!(carol_conn.phase(), ConnectionPhase::Closed);
}

#[tokio::test]
async fn test_meter_follows_live_stream() {
    init_logging();

    let stream = LocalStream::new();
    let track = stream.add_audio_track(&AudioCodec::Opus);

    // Deterministic broadband frame, loud enough to register
    let mut state: u32 = 0x1234_5678;
    let frame: Vec<f32> = (0..1024)
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 8) as f32 / 16_777_216.0 * 1.6 - 0.8
        })
        .collect();
    track.push_pcm(&frame);

    let mut meter = parlor_rtc::AudioLevelMeter::new();
    let handle = meter.start(&stream);
    assert!(handle.is_sampling());

    let probe = handle.clone();
    wait_for(5, "meter to register audio", move || probe.level() > 0.0).await;

    // Muting the track clears the tap; the meter falls back to zero
    track.set_enabled(false);
    let probe = handle.clone();
    wait_for(5, "meter to return to zero", move || probe.level() == 0.0).await;

    handle.stop();
    assert!(!handle.is_sampling());
}
