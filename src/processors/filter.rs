//! State-variable filter
//!
//! A topology-preserving state-variable lowpass usable both as a mixed
//! effect and as a per-voice processor. The same core (`Svf`) also backs
//! the voice-level filter applied by the common voice pipeline.

use crate::device::{ProcKind, ProcessorImpl, SetResult, SignalType};
use crate::device_state::{DeviceThreadState, MixedState};
use crate::param::ParamValue;
use crate::tuning::cents_to_hz;
use crate::voice::{VoicePayload, VoiceState};
use crate::work_buffer::WorkBuffers;
use std::f32::consts::PI;

/// One channel of state-variable filter memory.
#[derive(Debug, Clone, Copy)]
pub struct Svf {
    g: f32,
    k: f32,
    ic1: f32,
    ic2: f32,
}

impl Svf {
    pub fn new() -> Self {
        Svf {
            g: 0.5,
            k: 1.0,
            ic1: 0.0,
            ic2: 0.0,
        }
    }

    /// Update coefficients; `q` below 0.5 is clamped for stability.
    pub fn set_coeffs(&mut self, cutoff_hz: f32, q: f32, audio_rate: u32) {
        let nyquist = audio_rate as f32 * 0.5;
        let fc = cutoff_hz.clamp(1.0, nyquist * 0.99);
        self.g = (PI * fc / audio_rate as f32).tan();
        self.k = 1.0 / q.max(0.5);
    }

    pub fn clear(&mut self) {
        self.ic1 = 0.0;
        self.ic2 = 0.0;
    }

    #[inline]
    pub fn process_lowpass(&mut self, input: f32) -> f32 {
        let v1 = (self.ic1 + self.g * (input - self.ic2)) / (1.0 + self.g * (self.g + self.k));
        let v2 = self.ic2 + self.g * v1;
        self.ic1 = 2.0 * v1 - self.ic1;
        self.ic2 = 2.0 * v2 - self.ic2;
        v2
    }
}

impl Default for Svf {
    fn default() -> Self {
        Svf::new()
    }
}

/// Mixed-path filter memory.
#[derive(Debug, Default)]
pub struct FilterMixedState {
    svf: [Svf; 2],
}

impl FilterMixedState {
    pub fn clear(&mut self) {
        self.svf[0].clear();
        self.svf[1].clear();
    }
}

/// Voice-path filter memory.
#[derive(Debug, Clone, Default)]
pub struct FilterVoice {
    svf: [Svf; 2],
}

pub struct FilterProc {
    /// Cutoff in cents above 0 = 440 Hz.
    cutoff_cents: f64,
    resonance: f64,
}

impl FilterProc {
    pub fn new() -> Self {
        FilterProc {
            cutoff_cents: 2400.0,
            resonance: 1.0,
        }
    }

    fn run(&self, svf: &mut [Svf; 2], io: FilterIo<'_>, audio_rate: u32, frame_count: usize) {
        let FilterIo { input, output } = io;
        let hz = cents_to_hz(self.cutoff_cents) as f32;
        for ch in 0..2 {
            svf[ch].set_coeffs(hz, self.resonance as f32, audio_rate);
            let in_data = input.ch[ch].contents();
            let out_data = output.ch[ch].contents_mut();
            for i in 0..frame_count.min(out_data.len()) {
                out_data[i] = svf[ch].process_lowpass(in_data[i]);
            }
            output.ch[ch].mark_valid();
            output.ch[ch].clear_const_start();
        }
    }
}

struct FilterIo<'a> {
    input: &'a crate::work_buffer::AudioBuffer,
    output: &'a mut crate::work_buffer::AudioBuffer,
}

impl Default for FilterProc {
    fn default() -> Self {
        FilterProc::new()
    }
}

impl ProcessorImpl for FilterProc {
    fn kind(&self) -> ProcKind {
        ProcKind::Filter
    }

    fn default_signal_type(&self) -> SignalType {
        SignalType::Mixed
    }

    fn init_voice(&self, voice: &mut VoiceState) {
        voice.payload = VoicePayload::Filter(FilterVoice::default());
    }

    fn render_voice(
        &self,
        voice: &mut VoiceState,
        dts: &mut DeviceThreadState,
        _wbs: &mut WorkBuffers,
        audio_rate: u32,
        _tempo: f64,
        frame_count: usize,
    ) -> usize {
        let VoicePayload::Filter(filter_state) = &mut voice.payload else {
            return 0;
        };
        let (Some(input), Some(output)) = dts.voice_io_mut(0, 0) else {
            return 0;
        };
        if !input.is_valid() {
            return 0;
        }
        self.run(
            &mut filter_state.svf,
            FilterIo { input, output },
            audio_rate,
            frame_count,
        );
        frame_count
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
        let MixedState::Filter(filter_state) = state else {
            return;
        };
        let (Some(input), Some(output)) = dts.mixed_io_mut(0, 0) else {
            return;
        };
        self.run(
            &mut filter_state.svf,
            FilterIo { input, output },
            audio_rate,
            frame_count,
        );
    }

    fn make_mixed_state(&self, _audio_rate: u32, _buffer_size: usize) -> MixedState {
        MixedState::Filter(FilterMixedState::default())
    }

    fn set_param(&mut self, subkey: &str, value: &ParamValue) -> SetResult {
        match (subkey, value) {
            ("p_f_cutoff.jsonf", ParamValue::Float(v)) => {
                self.cutoff_cents = *v;
                SetResult::Applied
            }
            ("p_f_resonance.jsonf", ParamValue::Float(v)) => {
                if *v <= 0.0 {
                    return SetResult::Invalid("resonance must be positive".to_string());
                }
                self.resonance = *v;
                SetResult::Applied
            }
            _ => SetResult::Unmatched,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowpass_attenuates_high_frequencies() {
        let rate = 48000;
        let mut svf = Svf::new();
        svf.set_coeffs(500.0, 0.7, rate);

        // A high-frequency alternating signal should come out much
        // smaller than a slow ramp.
        let mut hf_peak = 0.0f32;
        for i in 0..512 {
            let x = if i % 2 == 0 { 1.0 } else { -1.0 };
            hf_peak = hf_peak.max(svf.process_lowpass(x).abs());
        }

        svf.clear();
        let mut lf_out = 0.0;
        for _ in 0..512 {
            lf_out = svf.process_lowpass(1.0);
        }

        assert!(hf_peak < 0.1, "high frequencies pass: {hf_peak}");
        assert!(lf_out > 0.9, "dc blocked: {lf_out}");
    }

    #[test]
    fn test_param_validation() {
        let mut proc = FilterProc::new();
        assert_eq!(
            proc.set_param("p_f_cutoff.jsonf", &ParamValue::Float(1200.0)),
            SetResult::Applied
        );
        assert!(matches!(
            proc.set_param("p_f_resonance.jsonf", &ParamValue::Float(0.0)),
            SetResult::Invalid(_)
        ));
    }
}
