//! Chorus
//!
//! A bank of modulated delay taps. Each chorus voice reads the shared
//! history at its own delay, modulated sinusoidally by its speed and
//! range, and contributes with its own volume. Voices are configured
//! under `voice_XX/` wildcard keys.

use crate::device::{ProcKind, ProcessorImpl, SetResult, SignalType};
use crate::device_state::{DeviceThreadState, MixedState};
use crate::key::match_pattern;
use crate::param::ParamValue;
use crate::work_buffer::WorkBuffers;
use std::f64::consts::TAU;

/// Maximum number of chorus taps.
pub const CHORUS_VOICES_MAX: usize = 32;

/// History length in seconds; bounds every tap's total excursion.
const CHORUS_BUF_TIME: f64 = 0.25;

/// One configured tap.
#[derive(Debug, Clone, Copy)]
struct ChorusTap {
    /// Center delay in seconds; negative disables the tap.
    delay: f64,
    /// Modulation depth in seconds.
    range: f64,
    /// Modulation speed in Hz.
    speed: f64,
    volume: f64,
}

impl ChorusTap {
    fn disabled() -> Self {
        ChorusTap {
            delay: -1.0,
            range: 0.0,
            speed: 0.0,
            volume: 1.0,
        }
    }

    fn is_enabled(&self) -> bool {
        self.delay >= 0.0 && self.delay < CHORUS_BUF_TIME
    }
}

/// Chunk-persistent chorus state: the ring history plus tap phases.
#[derive(Debug)]
pub struct ChorusState {
    history: [Vec<f32>; 2],
    write: usize,
    phases: [f64; CHORUS_VOICES_MAX],
}

impl ChorusState {
    pub fn new(frames: usize) -> Self {
        ChorusState {
            history: [vec![0.0; frames.max(2)], vec![0.0; frames.max(2)]],
            write: 0,
            phases: [0.0; CHORUS_VOICES_MAX],
        }
    }

    pub fn clear(&mut self) {
        self.history[0].fill(0.0);
        self.history[1].fill(0.0);
        self.write = 0;
        self.phases = [0.0; CHORUS_VOICES_MAX];
    }
}

pub struct ChorusProc {
    taps: [ChorusTap; CHORUS_VOICES_MAX],
    volume: f64,
}

impl ChorusProc {
    pub fn new() -> Self {
        ChorusProc {
            taps: [ChorusTap::disabled(); CHORUS_VOICES_MAX],
            volume: 1.0,
        }
    }
}

impl Default for ChorusProc {
    fn default() -> Self {
        ChorusProc::new()
    }
}

impl ProcessorImpl for ChorusProc {
    fn kind(&self) -> ProcKind {
        ProcKind::Chorus
    }

    fn default_signal_type(&self) -> SignalType {
        SignalType::Mixed
    }

    fn make_mixed_state(&self, audio_rate: u32, _buffer_size: usize) -> MixedState {
        let frames = (CHORUS_BUF_TIME * f64::from(audio_rate)).ceil() as usize;
        MixedState::Chorus(ChorusState::new(frames))
    }

    fn render_mixed(
        &self,
        state: &mut MixedState,
        dts: &mut DeviceThreadState,
        _wbs: &mut WorkBuffers,
        audio_rate: u32,
        _tempo: f64,
        frame_count: usize,
    ) {
        let MixedState::Chorus(chorus_state) = state else {
            return;
        };
        let (Some(input), Some(output)) = dts.mixed_io_mut(0, 0) else {
            return;
        };

        let rate = f64::from(audio_rate);
        let len = chorus_state.history[0].len();

        // Write the dry signal into the history first so taps with tiny
        // delays read fresh input.
        let write_start = chorus_state.write;
        for ch in 0..2 {
            let in_data = input.ch[ch].contents();
            let history = &mut chorus_state.history[ch];
            let mut write = write_start;
            for i in 0..frame_count {
                history[write] = in_data[i];
                write = (write + 1) % len;
            }
        }

        for ch in 0..2 {
            let out_data = output.ch[ch].contents_mut();
            out_data[..frame_count].fill(0.0);
        }

        for (ti, tap) in self.taps.iter().enumerate() {
            if !tap.is_enabled() {
                continue;
            }
            let mut phase = chorus_state.phases[ti];
            let gain = (tap.volume * self.volume) as f32;

            for i in 0..frame_count {
                let excursion = phase.sin() * tap.range;
                let delay_frames = ((tap.delay + excursion).max(0.0) * rate).min((len - 2) as f64);
                let whole = delay_frames as usize;
                let rem = (delay_frames - whole as f64) as f32;

                let read_base = (write_start + i + len - whole) % len;
                let read_prev = (read_base + len - 1) % len;

                for ch in 0..2 {
                    let history = &chorus_state.history[ch];
                    let a = history[read_base];
                    let b = history[read_prev];
                    let tapped = a + (b - a) * rem;
                    output.ch[ch].contents_mut()[i] += tapped * gain;
                }

                if tap.speed > 0.0 {
                    phase = (phase + TAU * tap.speed / rate) % TAU;
                }
            }
            chorus_state.phases[ti] = phase;
        }

        chorus_state.write = (write_start + frame_count) % len;
        for ch in 0..2 {
            output.ch[ch].mark_valid();
            output.ch[ch].clear_const_start();
        }
    }

    fn set_param(&mut self, subkey: &str, value: &ParamValue) -> SetResult {
        if subkey == "p_f_volume.jsonf" {
            let ParamValue::Float(v) = value else {
                return SetResult::Invalid("volume must be a float".to_string());
            };
            if *v < 0.0 {
                return SetResult::Invalid("volume must be nonnegative".to_string());
            }
            self.volume = *v;
            return SetResult::Applied;
        }

        let field: fn(&mut ChorusTap) -> &mut f64;
        let indices;
        if let Some(found) = match_pattern("voice_XX/p_f_delay.jsonf", subkey) {
            indices = found;
            field = |tap| &mut tap.delay;
        } else if let Some(found) = match_pattern("voice_XX/p_f_range.jsonf", subkey) {
            indices = found;
            field = |tap| &mut tap.range;
        } else if let Some(found) = match_pattern("voice_XX/p_f_speed.jsonf", subkey) {
            indices = found;
            field = |tap| &mut tap.speed;
        } else if let Some(found) = match_pattern("voice_XX/p_f_volume.jsonf", subkey) {
            indices = found;
            field = |tap| &mut tap.volume;
        } else {
            return SetResult::Unmatched;
        }

        let tap_index = indices[0] as usize;
        if tap_index >= CHORUS_VOICES_MAX {
            return SetResult::Invalid(format!("chorus voice out of range: {tap_index}"));
        }
        let ParamValue::Float(v) = value else {
            return SetResult::Invalid("chorus voice parameters are floats".to_string());
        };
        if !v.is_finite() {
            return SetResult::Invalid("chorus voice parameters must be finite".to_string());
        }
        *field(&mut self.taps[tap_index]) = *v;
        SetResult::Applied
    }
}
