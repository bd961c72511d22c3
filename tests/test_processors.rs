/// End-to-end: processor implementations in realistic chains.
use cadenza::analysis::{has_non_finite, peak, rms};
use cadenza::param::MemStore;

mod engine_test_utils;
use engine_test_utils::{build_player, render_all};

fn instrument_store(proc_type: &str) -> MemStore {
    let mut store = MemStore::new();
    store.put_json("p_connections.json", r#"[["au_00/out_00", "out_00"]]"#);
    store.put_json("p_control_map.json", "[[0, 0]]");
    store.put_json("au_00/p_manifest.json", r#"{"type": "instrument"}"#);
    store.put_json(
        "au_00/p_connections.json",
        r#"[["proc_00/out_00", "out_00"]]"#,
    );
    store.put_json(
        "au_00/proc_00/p_manifest.json",
        &format!(r#"{{"type": "{proc_type}"}}"#),
    );
    store.put_json("au_00/proc_00/p_signal_type.json", r#""voice""#);
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
fn test_plucked_string_rings_and_decays() {
    let mut player = build_player(&instrument_store("ks"), 48000, 4096);
    let (left, _) = render_all(&mut player, 192000);

    assert!(!has_non_finite(&left));
    let early = rms(&left[1000..13000]);
    let late = rms(&left[150000..190000]);
    assert!(early > 0.05, "string never sounded: rms {early}");
    assert!(
        late < early * 0.5,
        "string did not decay: early {early}, late {late}"
    );
}

#[test]
fn test_envgen_shapes_voice_chain() {
    let mut store = instrument_store("add");
    store.put_json("au_00/proc_01/p_manifest.json", r#"{"type": "envgen"}"#);
    store.put_json("au_00/proc_01/p_signal_type.json", r#""voice""#);
    store.put_json(
        "au_00/proc_01/p_env.jsone",
        r#"{"nodes": [[0.0, 0.0], [0.1, 1.0], [1.0, 0.0]]}"#,
    );
    store.put_json(
        "au_00/p_connections.json",
        r#"[
            ["proc_00/out_00", "proc_01/in_00"],
            ["proc_01/out_00", "out_00"]
        ]"#,
    );

    let mut player = build_player(&store, 48000, 4096);
    let (left, _) = render_all(&mut player, 192000);
    assert!(!has_non_finite(&left));

    // Attack peak around 0.1 s, then a fade to nothing by 1 s; the
    // envelope end terminates the whole group.
    let at_peak = rms(&left[4000..6000]);
    let faded = rms(&left[40000..46000]);
    assert!(at_peak > 0.4, "envelope attack missing: rms {at_peak}");
    assert!(faded < at_peak * 0.6, "envelope did not fade: {faded}");
    assert!(left[50000..].iter().all(|&x| x == 0.0));
    assert_eq!(player.active_voice_count(), 0);
}

#[test]
fn test_voice_gain_chain_scales() {
    let mut store = instrument_store("add");
    store.put_json("au_00/proc_01/p_manifest.json", r#"{"type": "gain"}"#);
    store.put_json("au_00/proc_01/p_signal_type.json", r#""voice""#);
    store.put_json("au_00/proc_01/p_f_volume.jsonf", "0.5");
    store.put_json(
        "au_00/p_connections.json",
        r#"[
            ["proc_00/out_00", "proc_01/in_00"],
            ["proc_01/out_00", "out_00"]
        ]"#,
    );

    let mut player = build_player(&store, 48000, 4096);
    let (left, _) = render_all(&mut player, 48000);
    let level = peak(&left[1000..]);
    assert!((level - 0.5).abs() < 0.01, "gain 0.5 produced peak {level}");
}

#[test]
fn test_delay_effect_repeats() {
    let mut store = instrument_store("add");
    // A short note into a quarter-second delay.
    store.put_json(
        "pat_000/col_00/p_events.json",
        r#"[
            [[0, 0], "note_on", 0.0],
            [[0, 441080640], "note_off"]
        ]"#,
    );
    store.put_json("au_01/p_manifest.json", r#"{"type": "effect"}"#);
    store.put_json(
        "au_01/p_connections.json",
        r#"[
            ["in_00", "proc_00/in_00"],
            ["proc_00/out_00", "out_00"]
        ]"#,
    );
    store.put_json("au_01/proc_00/p_manifest.json", r#"{"type": "delay"}"#);
    store.put_json("au_01/proc_00/p_signal_type.json", r#""mixed""#);
    store.put_json("au_01/proc_00/p_f_delay.jsonf", "0.25");
    store.put_json("au_01/proc_00/p_f_feedback.jsonf", "0.5");
    store.put_json(
        "p_connections.json",
        r#"[
            ["au_00/out_00", "au_01/in_00"],
            ["au_01/out_00", "out_00"]
        ]"#,
    );

    let mut player = build_player(&store, 48000, 4096);
    let (left, _) = render_all(&mut player, 96000);
    assert!(!has_non_finite(&left));

    // The dry half-beat note ends by 0.5 s, but quarter-second echoes
    // with 0.5 feedback keep the tail sounding and decaying.
    let tail = rms(&left[30000..60000]);
    assert!(tail > 0.1, "no delay tail after the note: rms {tail}");
    let early = rms(&left[24000..48000]);
    let late = rms(&left[84000..96000]);
    assert!(
        late < early * 0.5,
        "echoes not decaying: early {early}, late {late}"
    );
}

#[test]
fn test_chorus_thickens_signal() {
    let mut store = instrument_store("add");
    store.put_json("au_01/p_manifest.json", r#"{"type": "effect"}"#);
    store.put_json(
        "au_01/p_connections.json",
        r#"[
            ["in_00", "proc_00/in_00"],
            ["proc_00/out_00", "out_00"]
        ]"#,
    );
    store.put_json("au_01/proc_00/p_manifest.json", r#"{"type": "chorus"}"#);
    store.put_json("au_01/proc_00/p_signal_type.json", r#""mixed""#);
    store.put_json("au_01/proc_00/voice_00/p_f_delay.jsonf", "0.0");
    store.put_json("au_01/proc_00/voice_01/p_f_delay.jsonf", "0.02");
    store.put_json("au_01/proc_00/voice_01/p_f_range.jsonf", "0.005");
    store.put_json("au_01/proc_00/voice_01/p_f_speed.jsonf", "1.5");
    store.put_json("au_01/proc_00/voice_01/p_f_volume.jsonf", "0.7");
    store.put_json(
        "p_connections.json",
        r#"[
            ["au_00/out_00", "au_01/in_00"],
            ["au_01/out_00", "out_00"]
        ]"#,
    );

    let mut player = build_player(&store, 48000, 4096);
    let (left, _) = render_all(&mut player, 96000);
    assert!(!has_non_finite(&left));
    // Two taps of a full-scale sine interfere; the result is present and
    // bounded by the summed tap volumes.
    let level = rms(&left[24000..90000]);
    assert!(level > 0.3, "chorus output too quiet: {level}");
    assert!(peak(&left) < 1.8);
}
