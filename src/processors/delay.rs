//! Delay line
//!
//! A mixed-signal tap delay with feedback and dry/wet mix. History length
//! is fixed by the maximum delay parameter and allocated when the player
//! is configured.

use crate::device::{ProcKind, ProcessorImpl, SetResult, SignalType};
use crate::device_state::{DeviceThreadState, MixedState};
use crate::param::ParamValue;
use crate::work_buffer::WorkBuffers;

/// Chunk-persistent delay history.
#[derive(Debug)]
pub struct DelayState {
    history: [Vec<f32>; 2],
    write: usize,
}

impl DelayState {
    pub fn new(frames: usize) -> Self {
        DelayState {
            history: [vec![0.0; frames.max(1)], vec![0.0; frames.max(1)]],
            write: 0,
        }
    }

    pub fn clear(&mut self) {
        self.history[0].fill(0.0);
        self.history[1].fill(0.0);
        self.write = 0;
    }
}

pub struct DelayProc {
    /// Tap position in seconds.
    delay: f64,
    /// Upper bound for the tap; fixes the history allocation.
    max_delay: f64,
    feedback: f64,
    dry: f64,
    wet: f64,
}

impl DelayProc {
    pub fn new() -> Self {
        DelayProc {
            delay: 0.25,
            max_delay: 2.0,
            feedback: 0.0,
            dry: 1.0,
            wet: 1.0,
        }
    }
}

impl Default for DelayProc {
    fn default() -> Self {
        DelayProc::new()
    }
}

impl ProcessorImpl for DelayProc {
    fn kind(&self) -> ProcKind {
        ProcKind::Delay
    }

    fn default_signal_type(&self) -> SignalType {
        SignalType::Mixed
    }

    fn make_mixed_state(&self, audio_rate: u32, _buffer_size: usize) -> MixedState {
        let frames = (self.max_delay * f64::from(audio_rate)).ceil() as usize;
        MixedState::Delay(DelayState::new(frames))
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
        let MixedState::Delay(delay_state) = state else {
            return;
        };
        let (Some(input), Some(output)) = dts.mixed_io_mut(0, 0) else {
            return;
        };

        let len = delay_state.history[0].len();
        let tap_frames = ((self.delay * f64::from(audio_rate)) as usize).clamp(1, len - 1);
        let feedback = self.feedback as f32;
        let dry = self.dry as f32;
        let wet = self.wet as f32;

        let start_write = delay_state.write;
        for ch in 0..2 {
            let mut write = start_write;
            let history = &mut delay_state.history[ch];
            let in_data = input.ch[ch].contents();
            let out_data = output.ch[ch].contents_mut();
            for i in 0..frame_count {
                let read = (write + len - tap_frames) % len;
                let tapped = history[read];
                out_data[i] = in_data[i] * dry + tapped * wet;
                history[write] = in_data[i] + tapped * feedback;
                write = (write + 1) % len;
            }
            output.ch[ch].mark_valid();
            output.ch[ch].clear_const_start();
        }
        delay_state.write = (start_write + frame_count) % len;
    }

    fn set_param(&mut self, subkey: &str, value: &ParamValue) -> SetResult {
        let ParamValue::Float(v) = value else {
            return match subkey {
                "p_f_delay.jsonf" | "p_f_max_delay.jsonf" | "p_f_feedback.jsonf"
                | "p_f_dry.jsonf" | "p_f_wet.jsonf" => {
                    SetResult::Invalid("delay parameters are floats".to_string())
                }
                _ => SetResult::Unmatched,
            };
        };
        match subkey {
            "p_f_delay.jsonf" => {
                if *v < 0.0 {
                    return SetResult::Invalid("delay must be nonnegative".to_string());
                }
                self.delay = *v;
            }
            "p_f_max_delay.jsonf" => {
                if *v <= 0.0 {
                    return SetResult::Invalid("max delay must be positive".to_string());
                }
                self.max_delay = *v;
            }
            "p_f_feedback.jsonf" => {
                if !(-1.0..1.0).contains(v) {
                    return SetResult::Invalid("feedback must be within (-1, 1)".to_string());
                }
                self.feedback = *v;
            }
            "p_f_dry.jsonf" => self.dry = *v,
            "p_f_wet.jsonf" => self.wet = *v,
            _ => return SetResult::Unmatched,
        }
        SetResult::Applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_state_sizing() {
        let proc = DelayProc::new();
        match proc.make_mixed_state(48000, 256) {
            MixedState::Delay(state) => assert_eq!(state.history[0].len(), 96000),
            other => panic!("wrong state: {other:?}"),
        }
    }

    #[test]
    fn test_feedback_bounds() {
        let mut proc = DelayProc::new();
        assert!(matches!(
            proc.set_param("p_f_feedback.jsonf", &ParamValue::Float(1.0)),
            SetResult::Invalid(_)
        ));
        assert_eq!(
            proc.set_param("p_f_feedback.jsonf", &ParamValue::Float(0.5)),
            SetResult::Applied
        );
    }
}
