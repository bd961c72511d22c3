/// End-to-end: voice pool stealing under pressure.
///
/// Five NoteOns on one channel land in a four-voice pool: the oldest
/// superseded group is stolen, the newest four stay, and the output
/// remains finite throughout.
use cadenza::analysis::has_non_finite;
use cadenza::tstamp::BEAT_DIVISOR;

mod engine_test_utils;
use engine_test_utils::{additive_store, build_player, render_all};

#[test]
fn test_fifth_note_steals_oldest() {
    let mut store = additive_store(60.0, 4);

    // Five NoteOns roughly one frame apart (one frame at 60 BPM and
    // 48 kHz is BEAT_DIVISOR / 48000 remainder units).
    let step = i64::from(BEAT_DIVISOR) / 48000;
    let events: Vec<String> = (0..5)
        .map(|i| format!(r#"[[0, {}], "note_on", {}]"#, step * i, i * 100))
        .collect();
    store.put_json(
        "pat_000/col_00/p_events.json",
        &format!("[{}]", events.join(",")),
    );

    let mut player = build_player(&store, 48000, 4096);
    player.set_voice_count(4);
    player.play();

    let (left, right) = render_all(&mut player, 48000);

    assert!(!has_non_finite(&left));
    assert!(!has_non_finite(&right));
    assert_eq!(player.active_voice_count(), 4);
    // The stolen voice was a superseded background group, so the pool
    // never had to evict a foreground voice.
    assert_eq!(player.stats().pool.exhausted, 0);
}

#[test]
fn test_all_foreground_steal_is_counted() {
    let mut store = additive_store(60.0, 4);
    let step = i64::from(BEAT_DIVISOR) / 48000;
    // Two simultaneous-ish notes on two channels into a one-voice pool.
    store.put_json(
        "pat_000/col_00/p_events.json",
        r#"[[[0, 0], "note_on", 0.0]]"#,
    );
    store.put_json(
        "pat_000/col_01/p_events.json",
        &format!(r#"[[[0, {step}], "note_on", 700.0]]"#),
    );

    let mut player = build_player(&store, 48000, 4096);
    player.set_voice_count(1);
    player.play();

    let (left, _) = render_all(&mut player, 4800);
    assert!(!has_non_finite(&left));
    assert_eq!(player.active_voice_count(), 1);
    assert_eq!(player.stats().pool.exhausted, 1);
}
