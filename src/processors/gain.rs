//! Gain
//!
//! Scales its input by a constant volume. Works in both voice and mixed
//! chains; the volume is also a control variable, so compositions can
//! automate it with `set_cv` events.

use crate::device::{ProcKind, ProcessorImpl, SetResult, SignalType};
use crate::device_state::{DeviceThreadState, MixedState};
use crate::param::ParamValue;
use crate::voice::VoiceState;
use crate::work_buffer::{AudioBuffer, WorkBuffers};

/// Mixed-path gain state; holds the automatable volume.
#[derive(Debug, Clone)]
pub struct GainState {
    pub volume: f64,
}

pub struct GainProc {
    volume: f64,
}

impl GainProc {
    pub fn new() -> Self {
        GainProc { volume: 1.0 }
    }

    fn scale(&self, gain: f32, input: &AudioBuffer, output: &mut AudioBuffer, frame_count: usize) {
        for ch in 0..2 {
            let in_data = input.ch[ch].contents();
            let out_data = output.ch[ch].contents_mut();
            for i in 0..frame_count.min(out_data.len()) {
                out_data[i] = in_data[i] * gain;
            }
            output.ch[ch].mark_valid();
            output.ch[ch].set_const_start(input.ch[ch].const_start());
            output.ch[ch].set_final(input.ch[ch].is_final());
        }
    }
}

impl Default for GainProc {
    fn default() -> Self {
        GainProc::new()
    }
}

impl ProcessorImpl for GainProc {
    fn kind(&self) -> ProcKind {
        ProcKind::Gain
    }

    fn default_signal_type(&self) -> SignalType {
        SignalType::Mixed
    }

    fn render_voice(
        &self,
        _voice: &mut VoiceState,
        dts: &mut DeviceThreadState,
        _wbs: &mut WorkBuffers,
        _audio_rate: u32,
        _tempo: f64,
        frame_count: usize,
    ) -> usize {
        let (Some(input), Some(output)) = dts.voice_io_mut(0, 0) else {
            return 0;
        };
        if !input.is_valid() {
            return 0;
        }
        self.scale(self.volume as f32, input, output, frame_count);
        frame_count
    }

    fn render_mixed(
        &self,
        state: &mut MixedState,
        dts: &mut DeviceThreadState,
        _wbs: &mut WorkBuffers,
        _audio_rate: u32,
        _tempo: f64,
        frame_count: usize,
    ) {
        let gain = match state {
            MixedState::Gain(gain_state) => gain_state.volume,
            _ => self.volume,
        };
        let (Some(input), Some(output)) = dts.mixed_io_mut(0, 0) else {
            return;
        };
        self.scale(gain as f32, input, output, frame_count);
    }

    fn make_mixed_state(&self, _audio_rate: u32, _buffer_size: usize) -> MixedState {
        MixedState::Gain(GainState {
            volume: self.volume,
        })
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
            _ => SetResult::Unmatched,
        }
    }

    fn set_cv_float(&self, state: &mut MixedState, name: &str, value: f64) {
        if name == "volume" && value >= 0.0 {
            if let MixedState::Gain(gain_state) = state {
                gain_state.volume = value;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_param() {
        let mut proc = GainProc::new();
        assert_eq!(
            proc.set_param("p_f_volume.jsonf", &ParamValue::Float(0.5)),
            SetResult::Applied
        );
        assert_eq!(proc.volume, 0.5);
        assert!(matches!(
            proc.set_param("p_f_volume.jsonf", &ParamValue::Float(-1.0)),
            SetResult::Invalid(_)
        ));
    }
}
