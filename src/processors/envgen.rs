//! Envelope generator
//!
//! Shapes the voice signal on its input port by a time envelope. With no
//! input wired, the envelope itself becomes the output signal, which
//! makes the processor usable as a modulation source in a voice chain.
//! Without loop marks the envelope runs once and the voice ends when the
//! final node is reached.

use crate::device::{ProcKind, ProcessorImpl, SetResult, SignalType};
use crate::device_state::DeviceThreadState;
use crate::envelope::Envelope;
use crate::param::ParamValue;
use crate::voice::{VoicePayload, VoiceState};
use crate::work_buffer::WorkBuffers;

/// Per-voice envelope position.
#[derive(Debug, Clone, Default)]
pub struct EnvGenVoice {
    /// Envelope x in seconds, scaled by `time_scale`.
    pub x: f64,
}

pub struct EnvGenProc {
    env: Envelope,
    /// Time stretch: 2.0 runs the envelope at half speed.
    time_scale: f64,
    /// Loop while the note is held.
    loop_enabled: bool,
}

impl EnvGenProc {
    pub fn new() -> Self {
        // A short attack-decay shape; compositions override it.
        let env = Envelope::from_nodes(vec![(0.0, 0.0), (0.01, 1.0), (1.0, 0.0)])
            .expect("default envelope is well formed");
        EnvGenProc {
            env,
            time_scale: 1.0,
            loop_enabled: false,
        }
    }
}

impl Default for EnvGenProc {
    fn default() -> Self {
        EnvGenProc::new()
    }
}

impl ProcessorImpl for EnvGenProc {
    fn kind(&self) -> ProcKind {
        ProcKind::EnvGen
    }

    fn default_signal_type(&self) -> SignalType {
        SignalType::Voice
    }

    fn init_voice(&self, voice: &mut VoiceState) {
        voice.payload = VoicePayload::EnvGen(EnvGenVoice::default());
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
        let VoicePayload::EnvGen(env_state) = &mut voice.payload else {
            return 0;
        };
        let note_on = voice.note_on;
        let (input, Some(output)) = dts.voice_io_mut(0, 0) else {
            return 0;
        };

        let step = 1.0 / (f64::from(audio_rate) * self.time_scale.max(1e-6));
        let end_x = self.env.end_x();
        let loop_bounds = self.loop_enabled.then(|| {
            match self.env.loop_marks() {
                Some((start, end)) => (self.env.nodes()[start].0, self.env.nodes()[end].0),
                None => (0.0, end_x),
            }
        });

        let mut x = env_state.x;
        let mut stop = frame_count;
        let has_input = input.map(|b| b.is_valid()).unwrap_or(false);

        for i in 0..frame_count {
            if let Some((loop_start, loop_end)) = loop_bounds {
                // Loop only while the note is held.
                if note_on && x >= loop_end && loop_end > loop_start {
                    x = loop_start + (x - loop_start) % (loop_end - loop_start);
                }
            }
            if x >= end_x && !note_on {
                stop = i;
                break;
            }
            if x >= end_x && self.env.value_at(end_x) == 0.0 {
                stop = i;
                break;
            }

            let level = self.env.value_at(x) as f32;
            for ch in 0..2 {
                let out_data = output.ch[ch].contents_mut();
                out_data[i] = level;
            }
            x += step;
        }
        env_state.x = x;

        if has_input {
            let input = input.expect("checked above");
            for ch in 0..2 {
                let in_data = input.ch[ch].contents();
                let out_data = output.ch[ch].contents_mut();
                for i in 0..stop {
                    out_data[i] *= in_data[i];
                }
            }
        }

        for ch in 0..2 {
            if stop < frame_count {
                output.ch[ch].contents_mut()[stop..frame_count].fill(0.0);
                output.ch[ch].set_final(true);
            }
            output.ch[ch].mark_valid();
            output.ch[ch].clear_const_start();
            if stop < frame_count {
                output.ch[ch].set_const_start(stop + 1);
            }
        }
        stop
    }

    fn set_param(&mut self, subkey: &str, value: &ParamValue) -> SetResult {
        match (subkey, value) {
            ("p_env.jsone", ParamValue::Envelope(env)) => {
                self.env = env.clone();
                SetResult::Applied
            }
            ("p_f_time_scale.jsonf", ParamValue::Float(v)) => {
                if *v <= 0.0 {
                    return SetResult::Invalid("time scale must be positive".to_string());
                }
                self.time_scale = *v;
                SetResult::Applied
            }
            ("p_b_loop.jsonb", ParamValue::Bool(b)) => {
                self.loop_enabled = *b;
                SetResult::Applied
            }
            _ => SetResult::Unmatched,
        }
    }
}
