/// End-to-end: channel parameter events and realtime event injection.
use cadenza::analysis::{peak, rms};
use cadenza::event::{Event, EventKind};
use cadenza::tstamp::Tstamp;
use cadenza::value::Value;

mod engine_test_utils;
use engine_test_utils::{additive_store, build_player, render_all};

#[test]
fn test_channel_force_scales_output() {
    let mut store = additive_store(60.0, 4);
    store.put_json(
        "pat_000/col_00/p_events.json",
        r#"[
            [[0, 0], "set_ch_param", "force", 0.25],
            [[0, 0], "note_on", 0.0]
        ]"#,
    );

    let mut player = build_player(&store, 48000, 4096);
    let (left, _) = render_all(&mut player, 48000);

    let level = peak(&left[1000..]);
    assert!(
        (level - 0.25).abs() < 0.01,
        "force 0.25 produced peak {level}"
    );
}

#[test]
fn test_panning_hard_left_mutes_right() {
    let mut store = additive_store(60.0, 4);
    store.put_json(
        "pat_000/col_00/p_events.json",
        r#"[
            [[0, 0], "set_ch_param", "panning", -1.0],
            [[0, 0], "note_on", 0.0]
        ]"#,
    );

    let mut player = build_player(&store, 48000, 4096);
    let (left, right) = render_all(&mut player, 24000);

    // Equal-power law, unity at center: a hard pan boosts the kept
    // channel by 3 dB and silences the other.
    let left_peak = peak(&left[1000..]);
    assert!(
        (left_peak - std::f32::consts::SQRT_2).abs() < 0.01,
        "hard-left peak {left_peak}"
    );
    assert!(peak(&right[1000..]) < 1e-6);
}

#[test]
fn test_panning_equal_power_off_center() {
    let mut store = additive_store(60.0, 4);
    store.put_json(
        "pat_000/col_00/p_events.json",
        r#"[
            [[0, 0], "set_ch_param", "panning", 0.5],
            [[0, 0], "note_on", 0.0]
        ]"#,
    );

    let mut player = build_player(&store, 48000, 4096);
    let (left, right) = render_all(&mut player, 24000);

    // pan = 0.5: theta = 3π/8, gains √2·cos(θ) and √2·sin(θ).
    let left_peak = peak(&left[1000..]);
    let right_peak = peak(&right[1000..]);
    assert!((left_peak - 0.5412).abs() < 0.01, "left peak {left_peak}");
    assert!((right_peak - 1.3066).abs() < 0.01, "right peak {right_peak}");

    // Combined power stays at the centered level times two.
    let power = left_peak * left_peak + right_peak * right_peak;
    assert!((power - 2.0).abs() < 0.05, "combined power {power}");
}

#[test]
fn test_force_slide_moves_held_note() {
    let mut store = additive_store(60.0, 4);
    store.put_json(
        "pat_000/col_00/p_events.json",
        r#"[
            [[0, 0], "note_on", 0.0],
            [[1, 0], "set_ch_param", "slide_length", [2, 0]],
            [[1, 0], "set_ch_param", "force_slide", 0.0]
        ]"#,
    );

    let mut player = build_player(&store, 48000, 4096);
    let (left, _) = render_all(&mut player, 192000);

    // Full force during the first beat, fading over the next two.
    assert!(rms(&left[24000..47000]) > 0.6);
    let mid = rms(&left[86000..96000]);
    assert!(mid > 0.1 && mid < 0.6, "mid-slide rms {mid}");
    assert!(rms(&left[150000..190000]) < 0.05);
}

#[test]
fn test_master_volume_event_scales_output() {
    let mut store = additive_store(60.0, 4);
    store.put_json(
        "pat_000/col_00/p_events.json",
        r#"[[[0, 0], "note_on", 0.0]]"#,
    );
    store.put_json(
        "pat_000/gcol/p_events.json",
        r#"[[[2, 0], "set_global_param", "volume", 0.5]]"#,
    );

    let mut player = build_player(&store, 48000, 4096);
    let (left, _) = render_all(&mut player, 192000);

    assert!((peak(&left[24000..90000]) - 1.0).abs() < 0.01);
    assert!((peak(&left[100000..190000]) - 0.5).abs() < 0.01);
}

#[test]
fn test_gain_control_variable_automation() {
    let mut store = additive_store(60.0, 4);
    store.put_json("au_01/p_manifest.json", r#"{"type": "effect"}"#);
    store.put_json(
        "au_01/p_connections.json",
        r#"[
            ["in_00", "proc_00/in_00"],
            ["proc_00/out_00", "out_00"]
        ]"#,
    );
    store.put_json("au_01/proc_00/p_manifest.json", r#"{"type": "gain"}"#);
    store.put_json("au_01/proc_00/p_signal_type.json", r#""mixed""#);
    store.put_json(
        "p_connections.json",
        r#"[
            ["au_00/out_00", "au_01/in_00"],
            ["au_01/out_00", "out_00"]
        ]"#,
    );
    store.put_json(
        "pat_000/col_00/p_events.json",
        r#"[
            [[0, 0], "note_on", 0.0],
            [[2, 0], "set_cv", "au_01/proc_00/volume", 0.25]
        ]"#,
    );

    let mut player = build_player(&store, 48000, 4096);
    let (left, _) = render_all(&mut player, 192000);

    assert!((peak(&left[24000..90000]) - 1.0).abs() < 0.01);
    assert!((peak(&left[100000..190000]) - 0.25).abs() < 0.01);
}

#[test]
fn test_fire_event_str_parses_pattern_format() {
    let store = additive_store(60.0, 4);
    let mut player = build_player(&store, 48000, 4096);

    assert!(player.fire_event_str(Some(0), r#"[[0, 0], "note_on", 0.0]"#));
    assert_eq!(player.active_voice_count(), 1);

    assert!(!player.fire_event_str(Some(0), r#"[[0, 0], "no_such_event"]"#));
    assert_eq!(player.stats().rejected_events, 1);
}

#[test]
fn test_fire_event_plays_realtime_note() {
    // An empty four-beat pattern; the note arrives from the host.
    let store = additive_store(60.0, 4);
    let mut player = build_player(&store, 48000, 4096);

    player.fire_event(&Event::new(
        Tstamp::zero(),
        EventKind::NoteOn,
        Some(0),
        Value::Pitch(0.0),
    ));
    assert_eq!(player.active_voice_count(), 1);

    let (left, _) = render_all(&mut player, 24000);
    assert!(peak(&left[1000..]) > 0.9);

    player.fire_event(&Event::new(
        Tstamp::zero(),
        EventKind::NoteOff,
        Some(0),
        Value::None,
    ));
    let (tail, _) = render_all(&mut player, 24000);
    assert_eq!(player.active_voice_count(), 0);
    assert!(tail[4096..].iter().all(|&x| x == 0.0));
}
