//! Two peers in one room over an in-process signaling store
//!
//! Alice publishes an audio track and Bob receives it. Both sides
//! negotiate through `MemorySignalingStore` records instead of a
//! signaling server, so the whole demo runs in a single process.
//!
//! Run with:
//! ```bash
//! cargo run --example local_room
//! ```

use bytes::Bytes;
use parlor_rtc::signaling::MemorySignalingStore;
use parlor_rtc::{
    AudioLevelMeter, ConnectionPhase, LocalStream, RemoteMedia, RemoteTrackHandler, RoomSession,
    RtcConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("Local Room Example");
    println!("==================\n");

    // One store shared by both participants stands in for the
    // deployment's document database.
    let store = Arc::new(MemorySignalingStore::new());
    let config = RtcConfig::lan();

    let alice = RoomSession::new("alice", "demo-room", config.clone(), store.clone())?;
    let bob = RoomSession::new("bob", "demo-room", config, store.clone())?;
    println!("✓ Sessions created for alice and bob in {}", alice.room_id());

    // Alice publishes an audio track; Bob joins receive-only.
    let stream = LocalStream::new();
    let audio = stream.add_audio_track(&alice.config().audio_codec);
    println!(
        "✓ Alice publishing stream {} with track {}",
        stream.id(),
        audio.id()
    );

    let on_track: RemoteTrackHandler = Arc::new(|media: RemoteMedia| {
        println!(
            "  Bob received {} track {} on stream {}",
            if media.is_audio() { "audio" } else { "video" },
            media.track_id(),
            media.stream_id()
        );
    });

    let alice_conn = alice
        .open("bob", Some(&stream), Arc::new(|_: RemoteMedia| {}))
        .await?;
    let bob_conn = bob.open("alice", None, on_track).await?;
    println!("✓ Connections opened, negotiating through the store\n");

    // Feed the track so there is something to send and to meter. The
    // payload here is arbitrary bytes, not real Opus, which is fine
    // for a loopback demo.
    let writer_track = Arc::clone(&audio);
    let writer = tokio::spawn(async move {
        let mut state = 0x2545_f491_u32;
        loop {
            writer_track.push_pcm(&noise_frame(960, &mut state));
            let _ = writer_track
                .write_media(Bytes::from(vec![0u8; 120]), Duration::from_millis(20))
                .await;
            sleep(Duration::from_millis(20)).await;
        }
    });

    // Wait for the transport to come up over loopback.
    for _ in 0..200 {
        if alice_conn.phase() == ConnectionPhase::Connected
            && bob_conn.phase() == ConnectionPhase::Connected
        {
            break;
        }
        sleep(Duration::from_millis(50)).await;
    }
    println!(
        "✓ Connection phases: alice={:?} bob={:?}\n",
        alice_conn.phase(),
        bob_conn.phase()
    );

    // Meter Alice's outgoing audio.
    let mut meter = AudioLevelMeter::new();
    let handle = meter.start(&stream);
    println!("--- Audio level (noise source) ---");
    for i in 1..=5 {
        sleep(Duration::from_millis(100)).await;
        println!("  Sample {}: {:.1}", i, handle.level());
    }

    // Muting the track silences the meter without renegotiation.
    audio.set_enabled(false);
    sleep(Duration::from_millis(100)).await;
    println!("  Muted:    {:.1}\n", handle.level());

    // Cleanup
    handle.stop();
    writer.abort();
    alice.shutdown().await;
    bob.shutdown().await;
    println!(
        "✓ Sessions shut down, {} store watches remain",
        store.watch_count()
    );

    println!("\nExample completed successfully!");
    Ok(())
}

fn noise_frame(len: usize, state: &mut u32) -> Vec<f32> {
    (0..len)
        .map(|_| {
            *state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (*state >> 8) as f32 / 16_777_216.0 * 1.6 - 0.8
        })
        .collect()
}
