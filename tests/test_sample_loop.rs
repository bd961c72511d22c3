/// End-to-end: looped sample playback.
///
/// A 1024-frame single sine cycle looped unidirectionally. With the
/// sample's middle tone chosen so one pass equals its natural rate, a
/// 440 Hz note produces 440 cycles per second of output.
use cadenza::analysis::{count_cycles, has_non_finite};
use cadenza::sample::Sample;

mod engine_test_utils;
use engine_test_utils::{build_player, render_all, sine_cycle};

use cadenza::param::MemStore;

fn sample_store() -> MemStore {
    let mut store = MemStore::new();
    store.put_json("p_connections.json", r#"[["au_00/out_00", "out_00"]]"#);
    store.put_json("p_control_map.json", "[[0, 0]]");

    store.put_json("au_00/p_manifest.json", r#"{"type": "instrument"}"#);
    store.put_json(
        "au_00/p_connections.json",
        r#"[["proc_00/out_00", "out_00"]]"#,
    );
    store.put_json("au_00/proc_00/p_manifest.json", r#"{"type": "sample"}"#);
    store.put_json("au_00/proc_00/p_signal_type.json", r#""voice""#);

    store.put_pcm(
        "au_00/proc_00/sample_00/p_sample.wv",
        Sample::from_channels(vec![sine_cycle(1024)]).unwrap(),
    );
    // The cycle plays at its natural rate (48000 / 1024 = 46.875 Hz)
    // when the voice frequency matches the middle tone.
    store.put_json(
        "au_00/proc_00/sample_00/p_sample_params.json",
        r#"{"freq": 48000.0, "tone": 46.875, "loop": "uni", "loop_start": 0, "loop_end": 1024}"#,
    );
    store.put_json(
        "au_00/proc_00/p_note_map.jsonsm",
        "[[0.0, 1.0, 0, 1.0]]",
    );

    store.put_json("pat_000/p_manifest.json", "{}");
    store.put_json("pat_000/p_length.jsont", "[4, 0]");
    store.put_json(
        "pat_000/col_00/p_events.json",
        r#"[[[0, 0], "note_on", 0.0]]"#,
    );

    store.put_json("song_00/p_manifest.json", "{}");
    store.put_json("song_00/p_order_list.json", "[[0, 0]]");
    store.put_json("song_00/p_tempo.jsonf", "60");
    store
}

#[test]
fn test_uni_loop_cycle_count() {
    let mut player = build_player(&sample_store(), 48000, 4096);
    let (left, _) = render_all(&mut player, 96000);
    assert_eq!(left.len(), 96000);
    assert!(!has_non_finite(&left));

    // A 440 Hz note over two seconds: 880 cycles, one rising crossing
    // tolerance at each end.
    let cycles = count_cycles(&left);
    assert!(
        (878..=881).contains(&cycles),
        "counted {cycles} cycles, expected about 880"
    );
}

#[test]
fn test_loop_off_ends_voice() {
    let mut store = sample_store();
    store.put_json(
        "au_00/proc_00/sample_00/p_sample_params.json",
        r#"{"freq": 48000.0, "tone": 46.875}"#,
    );

    let mut player = build_player(&store, 48000, 4096);
    let (left, _) = render_all(&mut player, 96000);

    // Playing 1024 frames of data at 440/46.875 speed exhausts the
    // sample after ~109 frames; everything after a short margin is
    // silence and the voice is gone.
    assert!(left[..100].iter().any(|&x| x != 0.0));
    assert!(left[2048..].iter().all(|&x| x == 0.0));
    assert_eq!(player.active_voice_count(), 0);
}

#[test]
fn test_bi_loop_stays_bounded() {
    let mut store = sample_store();
    store.put_json(
        "au_00/proc_00/sample_00/p_sample_params.json",
        r#"{"freq": 48000.0, "tone": 46.875, "loop": "bi", "loop_start": 0, "loop_end": 1024}"#,
    );

    let mut player = build_player(&store, 48000, 4096);
    let (left, _) = render_all(&mut player, 48000);
    assert!(!has_non_finite(&left));
    assert!(left.iter().all(|&x| x.abs() <= 1.01));
    // The triangle wrap keeps producing signal.
    assert!(left[40000..].iter().any(|&x| x.abs() > 0.1));
}
