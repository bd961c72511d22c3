//! Sample playback
//!
//! Plays PCM samples selected by a note map (pitch and force addressed)
//! or a hit map (hit index addressed). The read position advances by a
//! per-frame shift derived from the voice frequency and the sample's
//! middle tone, accumulated as a whole part plus a double remainder, with
//! unidirectional and bidirectional loop support and linear
//! interpolation.

use crate::device::{ProcKind, ProcessorImpl, SetResult, SignalType};
use crate::device_state::DeviceThreadState;
use crate::key::match_pattern;
use crate::param::ParamValue;
use crate::sample::{HitMap, LoopMode, MapEntry, NoteMap, Sample, SampleParams};
use crate::voice::{VoicePayload, VoiceState};
use crate::work_buffer::{wb, WorkBuffers};

/// Number of addressable sample slots.
pub const SAMPLE_SLOTS: usize = 64;

/// Per-voice playback state: the selected map entry.
#[derive(Debug, Clone, Default)]
pub struct SampleVoice {
    pub entry: Option<MapEntry>,
    /// Precomputed pitch factor from the entry's cents offset.
    pub offset_factor: f64,
}

pub struct SamplePlayerProc {
    samples: Vec<Option<(Sample, SampleParams)>>,
    note_map: NoteMap,
    hit_map: HitMap,
    volume: f64,
}

impl SamplePlayerProc {
    pub fn new() -> Self {
        SamplePlayerProc {
            samples: (0..SAMPLE_SLOTS).map(|_| None).collect(),
            note_map: NoteMap::default(),
            hit_map: HitMap::default(),
            volume: 1.0,
        }
    }
}

impl Default for SamplePlayerProc {
    fn default() -> Self {
        SamplePlayerProc::new()
    }
}

impl ProcessorImpl for SamplePlayerProc {
    fn kind(&self) -> ProcKind {
        ProcKind::SamplePlayer
    }

    fn default_signal_type(&self) -> SignalType {
        SignalType::Voice
    }

    fn init_voice(&self, voice: &mut VoiceState) {
        let entry = match voice.hit {
            Some(hit) => self.hit_map.select(hit),
            None => self
                .note_map
                .select(voice.pitch.value(), voice.force.value()),
        };
        let offset_factor = entry
            .as_ref()
            .map(|e| (e.cents_offset / 1200.0).exp2())
            .unwrap_or(1.0);
        voice.payload = VoicePayload::Sample(SampleVoice {
            entry,
            offset_factor,
        });
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
        let VoicePayload::Sample(sample_state) = &voice.payload else {
            return 0;
        };
        let Some(entry) = sample_state.entry.as_ref() else {
            return 0;
        };
        let Some((sample, params)) = self.samples.get(entry.sample).and_then(|s| s.as_ref())
        else {
            return 0;
        };
        if sample.is_empty() {
            return 0;
        }

        let offset_factor = sample_state.offset_factor;
        let freqs = wbs.buffer(wb::FREQ).contents();
        let Some(out) = dts.voice_send_mut(0) else {
            return 0;
        };
        out.clear(0, frame_count);

        let loop_mode = params.effective_loop(sample.len());
        let scale = (self.volume * params.volume * entry.volume) as f32;
        // Note offset and middle-tone mapping fold into one factor over
        // the per-frame frequency.
        let shift_factor = offset_factor * params.middle_freq
            / (params.middle_tone * f64::from(audio_rate));

        let mut pos = voice.pos as i64;
        let mut pos_rem = voice.pos_rem;
        let mut stop = frame_count;

        let [left, right] = &mut out.ch;
        let ldata = left.contents_mut();
        let rdata = right.contents_mut();

        for i in 0..frame_count {
            let (read_pos, read_rem) = match loop_mode {
                LoopMode::Off => {
                    if pos >= sample.len() as i64 {
                        stop = i;
                        break;
                    }
                    (pos as usize, pos_rem)
                }
                LoopMode::Uni => {
                    let start = params.loop_start as i64;
                    let length = (params.loop_end - params.loop_start) as i64;
                    let wrapped = if pos > start {
                        start + (pos - start) % length
                    } else {
                        pos
                    };
                    (wrapped as usize, pos_rem)
                }
                LoopMode::Bi => {
                    let start = params.loop_start as i64;
                    let uni_length = (params.loop_end - params.loop_start) as i64 - 1;
                    let period = (uni_length * 2).max(1);
                    let wrapped = if pos > start {
                        let mut lp = (pos - start) % period;
                        if lp >= uni_length {
                            lp = period - lp;
                        }
                        start + lp
                    } else {
                        pos
                    };
                    (wrapped as usize, pos_rem)
                }
            };

            ldata[i] = sample.read(0, read_pos, read_rem) * scale;
            rdata[i] = sample.read(1, read_pos, read_rem) * scale;

            let shift = f64::from(freqs[i]) * shift_factor;
            let shift_floor = shift.floor();
            pos += shift_floor as i64;
            pos_rem += shift - shift_floor;
            if pos_rem >= 1.0 {
                let excess = pos_rem.floor();
                pos += excess as i64;
                pos_rem -= excess;
            }
        }

        voice.pos = pos.max(0) as u64;
        voice.pos_rem = pos_rem;

        left.clear_const_start();
        right.clear_const_start();
        if stop < frame_count {
            left.set_const_start(stop + 1);
            right.set_const_start(stop + 1);
            left.set_final(true);
            right.set_final(true);
        }
        stop
    }

    fn set_param(&mut self, subkey: &str, value: &ParamValue) -> SetResult {
        if let Some(indices) = match_pattern("sample_XX/p_sample.wv", subkey) {
            let slot = indices[0] as usize;
            if slot >= SAMPLE_SLOTS {
                return SetResult::Invalid(format!("sample slot out of range: {slot}"));
            }
            let ParamValue::Sample(sample) = value else {
                return SetResult::Invalid("sample slot expects PCM data".to_string());
            };
            let params = self.samples[slot]
                .take()
                .map(|(_, params)| params)
                .unwrap_or_default();
            self.samples[slot] = Some((sample.clone(), params));
            return SetResult::Applied;
        }

        if let Some(indices) = match_pattern("sample_XX/p_sample_params.json", subkey) {
            let slot = indices[0] as usize;
            if slot >= SAMPLE_SLOTS {
                return SetResult::Invalid(format!("sample slot out of range: {slot}"));
            }
            let ParamValue::Json(json) = value else {
                return SetResult::Invalid("sample params expect JSON".to_string());
            };
            let params = match SampleParams::from_json(json) {
                Ok(params) => params,
                Err(e) => return SetResult::Invalid(e),
            };
            match &mut self.samples[slot] {
                Some((_, existing)) => *existing = params,
                None => {
                    // Parameters may arrive before the PCM; hold them in
                    // an empty slot.
                    self.samples[slot] =
                        Some((Sample::from_channels(vec![vec![]]).unwrap(), params));
                }
            }
            return SetResult::Applied;
        }

        match (subkey, value) {
            ("p_note_map.jsonsm", ParamValue::NoteMap(map)) => {
                self.note_map = map.clone();
                SetResult::Applied
            }
            ("p_hit_map.jsonsh", ParamValue::HitMap(map)) => {
                self.hit_map = map.clone();
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

    /// Per-voice volume override for sounding notes.
    fn set_vcv_float(&self, voice: &mut VoiceState, name: &str, value: f64) {
        if name != "volume" || value < 0.0 {
            return;
        }
        if let VoicePayload::Sample(sample_state) = &mut voice.payload {
            if let Some(entry) = sample_state.entry.as_mut() {
                entry.volume = value;
            }
        }
    }
}
