//! Shared helpers for the end-to-end engine tests.
//!
//! Each test builds a composition through the in-memory parameter store,
//! renders it offline and asserts on the produced samples.
#![allow(dead_code)]

use cadenza::composition::Composition;
use cadenza::param::MemStore;
use cadenza::player::Player;
use std::sync::Arc;

/// A store preloaded with a single additive instrument on control 0 and
/// an empty song scaffold; tests add patterns and extra devices.
pub fn additive_store(tempo: f64, pattern_beats: i64) -> MemStore {
    let mut store = MemStore::new();
    store.put_json("p_connections.json", r#"[["au_00/out_00", "out_00"]]"#);
    store.put_json("p_control_map.json", "[[0, 0]]");

    store.put_json("au_00/p_manifest.json", r#"{"type": "instrument"}"#);
    store.put_json(
        "au_00/p_connections.json",
        r#"[["proc_00/out_00", "out_00"]]"#,
    );
    store.put_json("au_00/proc_00/p_manifest.json", r#"{"type": "add"}"#);
    store.put_json("au_00/proc_00/p_signal_type.json", r#""voice""#);

    store.put_json("pat_000/p_manifest.json", "{}");
    store.put_json(
        "pat_000/p_length.jsont",
        &format!("[{pattern_beats}, 0]"),
    );

    store.put_json("song_00/p_manifest.json", "{}");
    store.put_json("song_00/p_order_list.json", "[[0, 0]]");
    store.put_json("song_00/p_tempo.jsonf", &tempo.to_string());
    store
}

pub fn build_player(store: &MemStore, audio_rate: u32, buffer_size: usize) -> Player {
    // Surface build diagnostics when a test fails.
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let comp = Arc::new(Composition::build(store).expect("composition builds"));
    let mut player = Player::new(comp, audio_rate, buffer_size).expect("player builds");
    player.play();
    player
}

/// Render until the composition ends or `max_frames` is reached.
/// Returns interleaved-free stereo buffers.
pub fn render_all(player: &mut Player, max_frames: usize) -> (Vec<f32>, Vec<f32>) {
    let chunk = player.buffer_size();
    let mut left = Vec::with_capacity(max_frames);
    let mut right = Vec::with_capacity(max_frames);
    let mut scratch_l = vec![0.0f32; chunk];
    let mut scratch_r = vec![0.0f32; chunk];

    while left.len() < max_frames {
        let want = chunk.min(max_frames - left.len());
        let rendered = player.render(&mut scratch_l[..want], &mut scratch_r[..want]);
        left.extend_from_slice(&scratch_l[..rendered]);
        right.extend_from_slice(&scratch_r[..rendered]);
        if rendered < want {
            break;
        }
    }
    (left, right)
}

/// One cycle of a sine wave as a PCM sample.
pub fn sine_cycle(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| (std::f64::consts::TAU * i as f64 / len as f64).sin() as f32)
        .collect()
}
