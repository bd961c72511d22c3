//! Additive synthesis
//!
//! Sums up to `HARMONICS_MAX` tones, each reading a shared base function
//! table at its own pitch factor with per-tone volume and panning. The
//! default base function is a single sine cycle; a custom waveform can be
//! supplied as a sample parameter.

use crate::device::{ProcKind, ProcessorImpl, SetResult, SignalType};
use crate::device_state::DeviceThreadState;
use crate::key::match_pattern;
use crate::param::ParamValue;
use crate::voice::{VoicePayload, VoiceState};
use crate::work_buffer::{wb, WorkBuffers};
use crate::HARMONICS_MAX;
use std::f64::consts::TAU;

/// Size of the base function table; power of two for cheap wrapping.
pub const BASE_FUNC_SIZE: usize = 4096;

/// One tone of the additive stack.
#[derive(Debug, Clone, Copy)]
pub struct AddTone {
    /// Frequency factor relative to the voice frequency; NaN disables the
    /// tone.
    pub pitch: f64,
    pub volume: f64,
    pub panning: f64,
}

impl AddTone {
    fn disabled() -> Self {
        AddTone {
            pitch: f64::NAN,
            volume: 1.0,
            panning: 0.0,
        }
    }

    fn is_enabled(&self) -> bool {
        self.pitch.is_finite() && self.pitch > 0.0
    }
}

/// Per-voice additive state: one table phase per tone.
#[derive(Debug, Clone)]
pub struct AddVoice {
    pub phases: [f64; HARMONICS_MAX],
}

impl AddVoice {
    pub fn new() -> Self {
        AddVoice {
            phases: [0.0; HARMONICS_MAX],
        }
    }
}

impl Default for AddVoice {
    fn default() -> Self {
        AddVoice::new()
    }
}

pub struct AddProc {
    base: Vec<f32>,
    tones: [AddTone; HARMONICS_MAX],
    volume: f64,
}

impl AddProc {
    pub fn new() -> Self {
        let mut base = Vec::with_capacity(BASE_FUNC_SIZE);
        for i in 0..BASE_FUNC_SIZE {
            base.push((TAU * i as f64 / BASE_FUNC_SIZE as f64).sin() as f32);
        }

        let mut tones = [AddTone::disabled(); HARMONICS_MAX];
        tones[0] = AddTone {
            pitch: 1.0,
            volume: 1.0,
            panning: 0.0,
        };

        AddProc {
            base,
            tones,
            volume: 1.0,
        }
    }

    fn read_table(&self, phase: f64) -> f32 {
        let len = self.base.len();
        let scaled = phase * len as f64;
        let index = scaled as usize;
        let rem = (scaled - index as f64) as f32;
        let a = self.base[index & (len - 1)];
        let b = self.base[(index + 1) & (len - 1)];
        a + (b - a) * rem
    }
}

impl Default for AddProc {
    fn default() -> Self {
        AddProc::new()
    }
}

impl ProcessorImpl for AddProc {
    fn kind(&self) -> ProcKind {
        ProcKind::Add
    }

    fn default_signal_type(&self) -> SignalType {
        SignalType::Voice
    }

    fn init_voice(&self, voice: &mut VoiceState) {
        voice.payload = VoicePayload::Add(AddVoice::new());
    }

    fn render_voice(
        &self,
        voice: &mut VoiceState,
        dts: &mut DeviceThreadState,
        wbs: &mut WorkBuffers,
        audio_rate: u32,
        _tempo: f64,
        frame_count: usize,
    ) -> usize {
        let VoicePayload::Add(add_state) = &mut voice.payload else {
            return 0;
        };

        let freqs = wbs.buffer(wb::FREQ).contents();
        let Some(out) = dts.voice_send_mut(0) else {
            return 0;
        };
        out.clear(0, frame_count);

        let rate = f64::from(audio_rate);

        for (ti, tone) in self.tones.iter().enumerate() {
            if !tone.is_enabled() {
                continue;
            }
            let scale = (tone.volume * self.volume) as f32;
            let (pan_left, pan_right) = crate::voice::pan_gains(tone.panning);
            let left_gain = scale * pan_left;
            let right_gain = scale * pan_right;

            let mut phase = add_state.phases[ti];
            let [left, right] = &mut out.ch;
            let ldata = left.contents_mut();
            let rdata = right.contents_mut();
            for i in 0..frame_count {
                let value = self.read_table(phase);
                ldata[i] += value * left_gain;
                rdata[i] += value * right_gain;

                phase += f64::from(freqs[i]) * tone.pitch / rate;
                if phase >= 1.0 {
                    phase -= phase.floor();
                }
            }
            add_state.phases[ti] = phase;
        }

        out.ch[0].clear_const_start();
        out.ch[1].clear_const_start();
        frame_count
    }

    fn set_param(&mut self, subkey: &str, value: &ParamValue) -> SetResult {
        match (subkey, value) {
            ("p_f_volume.jsonf", ParamValue::Float(v)) => {
                if *v < 0.0 {
                    return SetResult::Invalid("volume must be nonnegative".to_string());
                }
                self.volume = *v;
                SetResult::Applied
            }
            ("p_base.wv", ParamValue::Sample(sample)) => {
                if sample.len() < 2 || !sample.len().is_power_of_two() {
                    return SetResult::Invalid(
                        "base function length must be a power of two".to_string(),
                    );
                }
                self.base = sample.channel(0).to_vec();
                SetResult::Applied
            }
            _ => self.set_tone_param(subkey, value),
        }
    }
}

impl AddProc {
    fn set_tone_param(&mut self, subkey: &str, value: &ParamValue) -> SetResult {
        let field: fn(&mut AddTone) -> &mut f64;
        let indices;

        if let Some(found) = match_pattern("tone_XX/p_f_pitch.jsonf", subkey) {
            indices = found;
            field = |tone| &mut tone.pitch;
        } else if let Some(found) = match_pattern("tone_XX/p_f_volume.jsonf", subkey) {
            indices = found;
            field = |tone| &mut tone.volume;
        } else if let Some(found) = match_pattern("tone_XX/p_f_pan.jsonf", subkey) {
            indices = found;
            field = |tone| &mut tone.panning;
        } else {
            return SetResult::Unmatched;
        }

        let tone_index = indices[0] as usize;
        if tone_index >= HARMONICS_MAX {
            return SetResult::Invalid(format!("tone index out of range: {tone_index}"));
        }
        let ParamValue::Float(v) = value else {
            return SetResult::Invalid("tone parameters are floats".to_string());
        };
        *field(&mut self.tones[tone_index]) = *v;
        SetResult::Applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_base_is_one_sine_cycle() {
        let add = AddProc::new();
        assert_eq!(add.base.len(), BASE_FUNC_SIZE);
        assert!((add.base[BASE_FUNC_SIZE / 4] - 1.0).abs() < 1e-3);
        assert!(add.base[0].abs() < 1e-6);
    }

    #[test]
    fn test_tone_params_by_wildcard_key() {
        let mut add = AddProc::new();
        assert_eq!(
            add.set_param("tone_01/p_f_pitch.jsonf", &ParamValue::Float(2.0)),
            SetResult::Applied
        );
        assert_eq!(
            add.set_param("tone_01/p_f_volume.jsonf", &ParamValue::Float(0.5)),
            SetResult::Applied
        );
        assert!(add.tones[1].is_enabled());
        assert_eq!(add.tones[1].volume, 0.5);
    }

    #[test]
    fn test_out_of_range_tone_rejected() {
        let mut add = AddProc::new();
        let result = add.set_param("tone_ff/p_f_pitch.jsonf", &ParamValue::Float(1.0));
        assert!(matches!(result, SetResult::Invalid(_)));
    }

    #[test]
    fn test_unknown_key_unmatched() {
        let mut add = AddProc::new();
        assert_eq!(
            add.set_param("p_f_no_such_thing.jsonf", &ParamValue::Float(1.0)),
            SetResult::Unmatched
        );
    }
}
