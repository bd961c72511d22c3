//! Plucked string
//!
//! A Karplus–Strong string: a noise burst excites a recirculating delay
//! line whose length tracks the voice frequency, with a two-point damping
//! average in the feedback path. The delay line lives in the voice's
//! scratch buffer, sized for the lowest playable frequency at
//! configuration time.

use crate::device::{ProcKind, ProcessorImpl, SetResult, SignalType};
use crate::device_state::DeviceThreadState;
use crate::param::ParamValue;
use crate::voice::{VoicePayload, VoiceState};
use crate::work_buffer::{wb, WorkBuffers};
use rand::Rng;

/// Lowest frequency the string supports; fixes the delay line size.
const MIN_FREQ: f64 = 20.0;

/// Per-voice string state; the delay line itself is the voice scratch.
#[derive(Debug, Clone, Default)]
pub struct KsVoice {
    pub primed: bool,
    pub period: usize,
    pub write: usize,
    pub excite_remaining: usize,
}

pub struct KsProc {
    /// Feedback damping in (0, 1]; higher sustains longer.
    damp: f64,
    volume: f64,
}

impl KsProc {
    pub fn new() -> Self {
        KsProc {
            damp: 0.996,
            volume: 1.0,
        }
    }
}

impl Default for KsProc {
    fn default() -> Self {
        KsProc::new()
    }
}

impl ProcessorImpl for KsProc {
    fn kind(&self) -> ProcKind {
        ProcKind::Ks
    }

    fn default_signal_type(&self) -> SignalType {
        SignalType::Voice
    }

    fn voice_wb_size(&self, audio_rate: u32) -> usize {
        (f64::from(audio_rate) / MIN_FREQ).ceil() as usize + 2
    }

    fn init_voice(&self, voice: &mut VoiceState) {
        voice.payload = VoicePayload::Ks(KsVoice::default());
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
        let freqs = wbs.buffer(wb::FREQ).contents();
        let Some(out) = dts.voice_send_mut(0) else {
            return 0;
        };
        out.clear(0, frame_count);

        // Split the payload out so the scratch buffer can borrow freely.
        let VoicePayload::Ks(mut ks) = voice.payload.clone() else {
            return 0;
        };
        let line = &mut voice.scratch;
        if line.is_empty() {
            return 0;
        }

        if !ks.primed {
            let freq = f64::from(freqs[0]).max(MIN_FREQ);
            ks.period = ((f64::from(audio_rate) / freq) as usize).clamp(2, line.len() - 1);
            ks.excite_remaining = ks.period;
            ks.primed = true;
        }

        let period = ks.period;
        let len = line.len();
        let damp = self.damp as f32;
        let gain = self.volume as f32;

        let [left, right] = &mut out.ch;
        let ldata = left.contents_mut();
        let rdata = right.contents_mut();

        for i in 0..frame_count {
            let excite = if ks.excite_remaining > 0 {
                ks.excite_remaining -= 1;
                voice.rand.gen_range(-1.0f32..1.0f32)
            } else {
                0.0
            };

            let tap0 = line[(ks.write + len - period) % len];
            let tap1 = line[(ks.write + len - period + 1) % len];
            let feedback = damp * 0.5 * (tap0 + tap1);
            let value = excite + feedback;
            line[ks.write] = value;
            ks.write = (ks.write + 1) % len;

            ldata[i] = value * gain;
            rdata[i] = value * gain;
        }

        left.clear_const_start();
        right.clear_const_start();

        voice.payload = VoicePayload::Ks(ks);
        frame_count
    }

    fn set_param(&mut self, subkey: &str, value: &ParamValue) -> SetResult {
        match (subkey, value) {
            ("p_f_damp.jsonf", ParamValue::Float(v)) => {
                if !(0.0..=1.0).contains(v) || *v == 0.0 {
                    return SetResult::Invalid("damp must be within (0, 1]".to_string());
                }
                self.damp = *v;
                SetResult::Applied
            }
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_sized_for_lowest_note() {
        let proc = KsProc::new();
        assert_eq!(proc.voice_wb_size(48000), 2402);
    }

    #[test]
    fn test_damp_validation() {
        let mut proc = KsProc::new();
        assert!(matches!(
            proc.set_param("p_f_damp.jsonf", &ParamValue::Float(0.0)),
            SetResult::Invalid(_)
        ));
        assert_eq!(
            proc.set_param("p_f_damp.jsonf", &ParamValue::Float(0.9)),
            SetResult::Applied
        );
    }
}
