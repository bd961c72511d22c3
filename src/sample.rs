//! PCM sample data and playback parameters
//!
//! Samples arrive from the parameter store as decoded PCM float buffers
//! (decoding is the store's concern). Playback parameters describe the
//! mapping from voice pitch to read speed, the loop descriptor, and the
//! per-sample volume. Note and hit maps select which sample a NoteOn or
//! Hit event plays.

use std::sync::Arc;

/// Loop semantics for sample playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    Off,
    /// Unidirectional: wrap back to the loop start.
    Uni,
    /// Bidirectional: triangle-wrap between the loop bounds.
    Bi,
}

impl LoopMode {
    pub fn from_name(name: &str) -> Option<LoopMode> {
        match name {
            "off" => Some(LoopMode::Off),
            "uni" => Some(LoopMode::Uni),
            "bi" => Some(LoopMode::Bi),
            _ => None,
        }
    }
}

/// Decoded PCM data, mono or stereo, shared between voices.
#[derive(Debug, Clone)]
pub struct Sample {
    channels: Vec<Arc<[f32]>>,
    len: usize,
}

impl Sample {
    pub fn from_channels(channels: Vec<Vec<f32>>) -> Option<Sample> {
        if channels.is_empty() || channels.len() > 2 {
            return None;
        }
        let len = channels[0].len();
        if channels.iter().any(|ch| ch.len() != len) {
            return None;
        }
        Some(Sample {
            channels: channels.into_iter().map(Arc::from).collect(),
            len,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Channel data; mono samples serve channel 0 for both sides.
    pub fn channel(&self, ch: usize) -> &[f32] {
        let ch = ch.min(self.channels.len() - 1);
        &self.channels[ch]
    }

    /// Linearly interpolated read at `pos + rem`, clamped to the end.
    pub fn read(&self, ch: usize, pos: usize, rem: f64) -> f32 {
        let data = self.channel(ch);
        if pos + 1 >= self.len {
            return data[self.len - 1];
        }
        let a = data[pos];
        let b = data[pos + 1];
        a + (b - a) * rem as f32
    }
}

/// Playback parameters attached to one sample slot.
#[derive(Debug, Clone)]
pub struct SampleParams {
    /// Natural playback rate of the data in frames per second.
    pub middle_freq: f64,
    /// Pitch in Hz at which the sample plays at its natural rate.
    pub middle_tone: f64,
    pub volume: f64,
    pub loop_mode: LoopMode,
    pub loop_start: usize,
    pub loop_end: usize,
}

impl Default for SampleParams {
    fn default() -> Self {
        SampleParams {
            middle_freq: 48000.0,
            middle_tone: 440.0,
            volume: 1.0,
            loop_mode: LoopMode::Off,
            loop_start: 0,
            loop_end: 0,
        }
    }
}

impl SampleParams {
    /// Parse `{"freq": .., "tone": .., "volume": .., "loop": "uni",
    /// "loop_start": .., "loop_end": ..}`; missing fields keep defaults.
    pub fn from_json(json: &serde_json::Value) -> Result<SampleParams, String> {
        let obj = json.as_object().ok_or("sample params must be an object")?;
        let mut params = SampleParams::default();
        if let Some(freq) = obj.get("freq") {
            params.middle_freq = freq.as_f64().ok_or("freq must be a number")?;
            if params.middle_freq <= 0.0 {
                return Err("freq must be positive".to_string());
            }
        }
        if let Some(tone) = obj.get("tone") {
            params.middle_tone = tone.as_f64().ok_or("tone must be a number")?;
            if params.middle_tone <= 0.0 {
                return Err("tone must be positive".to_string());
            }
        }
        if let Some(volume) = obj.get("volume") {
            params.volume = volume.as_f64().ok_or("volume must be a number")?;
        }
        if let Some(mode) = obj.get("loop") {
            let name = mode.as_str().ok_or("loop must be a mode name")?;
            params.loop_mode = LoopMode::from_name(name).ok_or("unknown loop mode")?;
        }
        if let Some(start) = obj.get("loop_start") {
            params.loop_start = start.as_u64().ok_or("loop_start must be an index")? as usize;
        }
        if let Some(end) = obj.get("loop_end") {
            params.loop_end = end.as_u64().ok_or("loop_end must be an index")? as usize;
        }
        Ok(params)
    }

    /// Loop bounds are only usable when they describe a nonempty range
    /// inside the sample.
    pub fn effective_loop(&self, sample_len: usize) -> LoopMode {
        if self.loop_end > sample_len || self.loop_start >= self.loop_end {
            return LoopMode::Off;
        }
        self.loop_mode
    }
}

/// One selectable entry in a note or hit map.
#[derive(Debug, Clone)]
pub struct MapEntry {
    pub sample: usize,
    pub volume: f64,
    /// Additional pitch offset in cents applied on top of the voice pitch.
    pub cents_offset: f64,
}

/// Pitch/force addressed sample selection.
#[derive(Debug, Clone, Default)]
pub struct NoteMap {
    entries: Vec<(f64, f64, MapEntry)>,
}

impl NoteMap {
    /// Parse `[[cents, force, sample, volume], ...]`.
    pub fn from_json(json: &serde_json::Value) -> Result<NoteMap, String> {
        let list = json.as_array().ok_or("note map must be a list")?;
        let mut entries = Vec::with_capacity(list.len());
        for item in list {
            let fields = item.as_array().ok_or("note map entry must be a list")?;
            if fields.len() != 4 {
                return Err("note map entry must have four fields".to_string());
            }
            let cents = fields[0].as_f64().ok_or("note map cents must be a number")?;
            let force = fields[1].as_f64().ok_or("note map force must be a number")?;
            let sample = fields[2].as_u64().ok_or("note map sample must be an index")? as usize;
            let volume = fields[3].as_f64().ok_or("note map volume must be a number")?;
            entries.push((
                cents,
                force,
                MapEntry {
                    sample,
                    volume,
                    cents_offset: 0.0,
                },
            ));
        }
        Ok(NoteMap { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pick the entry closest to `(cents, force)`, weighting pitch
    /// distance above force distance. The chosen entry's `cents_offset`
    /// preserves the distance between the requested pitch and the entry's
    /// nominal pitch.
    pub fn select(&self, cents: f64, force: f64) -> Option<MapEntry> {
        let (entry_cents, _, entry) = self.entries.iter().min_by(|a, b| {
            let da = note_distance(a.0 - cents, a.1 - force);
            let db = note_distance(b.0 - cents, b.1 - force);
            da.total_cmp(&db)
        })?;
        let mut chosen = entry.clone();
        chosen.cents_offset = cents - entry_cents;
        Some(chosen)
    }
}

fn note_distance(dcents: f64, dforce: f64) -> f64 {
    dcents.abs() + dforce.abs() * 100.0
}

/// Hit-index addressed sample selection.
#[derive(Debug, Clone, Default)]
pub struct HitMap {
    entries: Vec<(u16, MapEntry)>,
}

impl HitMap {
    /// Parse `[[hit, sample, volume], ...]`.
    pub fn from_json(json: &serde_json::Value) -> Result<HitMap, String> {
        let list = json.as_array().ok_or("hit map must be a list")?;
        let mut entries = Vec::with_capacity(list.len());
        for item in list {
            let fields = item.as_array().ok_or("hit map entry must be a list")?;
            if fields.len() != 3 {
                return Err("hit map entry must have three fields".to_string());
            }
            let hit = fields[0].as_u64().ok_or("hit index must be an integer")? as u16;
            let sample = fields[1].as_u64().ok_or("hit sample must be an index")? as usize;
            let volume = fields[2].as_f64().ok_or("hit volume must be a number")?;
            entries.push((
                hit,
                MapEntry {
                    sample,
                    volume,
                    cents_offset: 0.0,
                },
            ));
        }
        Ok(HitMap { entries })
    }

    pub fn select(&self, hit: u16) -> Option<MapEntry> {
        self.entries
            .iter()
            .find(|(h, _)| *h == hit)
            .map(|(_, e)| e.clone())
    }
}
