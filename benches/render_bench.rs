//! Render-loop benchmark: an eight-channel additive arrangement through
//! a master filter, rendered in audio-callback sized chunks.

use cadenza::composition::Composition;
use cadenza::param::MemStore;
use cadenza::player::Player;
use criterion::{criterion_group, criterion_main, Criterion};
use std::sync::Arc;

fn arrangement_store() -> MemStore {
    let mut store = MemStore::new();
    store.put_json(
        "p_connections.json",
        r#"[
            ["au_00/out_00", "au_01/in_00"],
            ["au_01/out_00", "out_00"]
        ]"#,
    );
    store.put_json("p_control_map.json", "[[0, 0]]");

    store.put_json("au_00/p_manifest.json", r#"{"type": "instrument"}"#);
    store.put_json(
        "au_00/p_connections.json",
        r#"[["proc_00/out_00", "out_00"]]"#,
    );
    store.put_json("au_00/proc_00/p_manifest.json", r#"{"type": "add"}"#);
    store.put_json("au_00/proc_00/p_signal_type.json", r#""voice""#);
    for tone in 1..8 {
        store.put_json(
            &format!("au_00/proc_00/tone_{tone:02x}/p_f_pitch.jsonf"),
            &format!("{}.0", tone + 1),
        );
        store.put_json(
            &format!("au_00/proc_00/tone_{tone:02x}/p_f_volume.jsonf"),
            &format!("{}", 1.0 / f64::from(tone + 1)),
        );
    }

    store.put_json("au_01/p_manifest.json", r#"{"type": "effect"}"#);
    store.put_json(
        "au_01/p_connections.json",
        r#"[
            ["in_00", "proc_00/in_00"],
            ["proc_00/out_00", "out_00"]
        ]"#,
    );
    store.put_json("au_01/proc_00/p_manifest.json", r#"{"type": "filter"}"#);
    store.put_json("au_01/proc_00/p_signal_type.json", r#""mixed""#);
    store.put_json("au_01/proc_00/p_f_cutoff.jsonf", "2400.0");

    store.put_json("pat_000/p_manifest.json", "{}");
    store.put_json("pat_000/p_length.jsont", "[64, 0]");
    // An eight-note cluster held for the whole pattern.
    for ch in 0..8 {
        store.put_json(
            &format!("pat_000/col_{ch:02x}/p_events.json"),
            &format!(r#"[[[0, 0], "note_on", {}.0]]"#, ch * 300 - 1200),
        );
    }

    store.put_json("song_00/p_manifest.json", "{}");
    store.put_json("song_00/p_order_list.json", "[[0, 0]]");
    store.put_json("song_00/p_tempo.jsonf", "120");
    store
}

fn bench_render(c: &mut Criterion) {
    let comp = Arc::new(Composition::build(&arrangement_store()).unwrap());

    c.bench_function("render_1024_frame_chunks", |b| {
        let mut player = Player::new(Arc::clone(&comp), 48000, 1024).unwrap();
        player.play();
        let mut left = vec![0.0f32; 1024];
        let mut right = vec![0.0f32; 1024];
        b.iter(|| {
            if player.render(&mut left, &mut right) < 1024 {
                player.play();
            }
            left[0]
        });
    });
}

criterion_group!(benches, bench_render);
criterion_main!(benches);
