/// End-to-end: a single additive tone.
///
/// One pattern, one NoteOn at the pattern start for the default additive
/// instrument, no NoteOff. The output must be a full-scale 440 Hz sine
/// on both channels.
use cadenza::analysis::{dominant_frequency, has_non_finite, peak_to_peak};

mod engine_test_utils;
use engine_test_utils::{additive_store, build_player, render_all};

#[test]
fn test_single_sine_tone_amplitude_and_pitch() {
    let mut store = additive_store(60.0, 4);
    store.put_json(
        "pat_000/col_00/p_events.json",
        r#"[[[0, 0], "note_on", 0.0]]"#,
    );

    let mut player = build_player(&store, 48000, 4096);
    let (left, right) = render_all(&mut player, 48000);
    assert_eq!(left.len(), 48000);

    assert!(!has_non_finite(&left));
    assert!(!has_non_finite(&right));

    // Skip the attack ramp when measuring amplitude.
    let steady = &left[1000..];
    let p2p = peak_to_peak(steady);
    assert!(
        (1.9..=2.01).contains(&p2p),
        "peak-to-peak amplitude {p2p} outside [1.9, 2.0]"
    );

    let freq = dominant_frequency(steady, 48000).expect("tone has a spectral peak");
    assert!(
        (freq - 440.0).abs() <= 1.0,
        "dominant peak at {freq} Hz, expected 440"
    );

    // Centered panning leaves the channels identical.
    assert_eq!(left, right);
}

#[test]
fn test_pitch_follows_note() {
    let mut store = additive_store(60.0, 4);
    // One octave below the 440 Hz reference.
    store.put_json(
        "pat_000/col_00/p_events.json",
        r#"[[[0, 0], "note_on", -1200.0]]"#,
    );

    let mut player = build_player(&store, 48000, 4096);
    let (left, _) = render_all(&mut player, 48000);

    let freq = dominant_frequency(&left[1000..], 48000).expect("tone has a spectral peak");
    assert!(
        (freq - 220.0).abs() <= 1.0,
        "dominant peak at {freq} Hz, expected 220"
    );
}

#[test]
fn test_second_harmonic_tone() {
    let mut store = additive_store(60.0, 4);
    store.put_json("au_00/proc_00/tone_01/p_f_pitch.jsonf", "2.0");
    store.put_json("au_00/proc_00/tone_01/p_f_volume.jsonf", "0.25");
    store.put_json(
        "pat_000/col_00/p_events.json",
        r#"[[[0, 0], "note_on", 0.0]]"#,
    );

    let mut player = build_player(&store, 48000, 4096);
    let (left, _) = render_all(&mut player, 48000);

    // Fundamental still dominates, but the waveform is no longer a pure
    // sine: peak-to-peak exceeds the single-harmonic bound.
    let freq = dominant_frequency(&left[1000..], 48000).unwrap();
    assert!((freq - 440.0).abs() <= 1.0);
    assert!(peak_to_peak(&left[1000..]) > 2.01);
}
