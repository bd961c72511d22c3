/// End-to-end: audio unit bypass.
///
/// An additive instrument feeds an effect unit holding a heavy lowpass.
/// With the effect active the 440 Hz tone is strongly attenuated;
/// bypassing the unit mid-pattern routes the raw tone through.
use cadenza::analysis::rms;
use cadenza::param::MemStore;

mod engine_test_utils;
use engine_test_utils::{build_player, render_all};

fn bypass_store() -> MemStore {
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
    // 55 Hz cutoff, three octaves below the tone.
    store.put_json("au_01/proc_00/p_f_cutoff.jsonf", "-3600.0");

    store.put_json("pat_000/p_manifest.json", "{}");
    store.put_json("pat_000/p_length.jsont", "[4, 0]");
    store.put_json("song_00/p_manifest.json", "{}");
    store.put_json("song_00/p_order_list.json", "[[0, 0]]");
    store.put_json("song_00/p_tempo.jsonf", "60");
    store
}

#[test]
fn test_filter_attenuates_without_bypass() {
    let mut store = bypass_store();
    store.put_json(
        "pat_000/col_00/p_events.json",
        r#"[[[0, 0], "note_on", 0.0]]"#,
    );

    let mut player = build_player(&store, 48000, 4096);
    let (left, _) = render_all(&mut player, 48000);

    let filtered = rms(&left[8000..]);
    assert!(
        filtered < 0.1,
        "lowpass barely attenuated the tone: rms {filtered}"
    );
}

#[test]
fn test_bypass_event_restores_raw_signal() {
    let mut store = bypass_store();
    store.put_json(
        "pat_000/col_00/p_events.json",
        r#"[
            [[0, 0], "note_on", 0.0],
            [[2, 0], "set_cv", "au_01/bypass", true]
        ]"#,
    );

    let mut player = build_player(&store, 48000, 4096);
    let (left, _) = render_all(&mut player, 192000);

    let before = rms(&left[48000..96000]);
    let after = rms(&left[100000..148000]);
    assert!(before < 0.1, "pre-bypass rms {before}");
    assert!(
        after > 0.6,
        "bypass did not restore the raw tone: rms {after}"
    );
}
