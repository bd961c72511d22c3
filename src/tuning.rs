//! Tuning tables
//!
//! A tuning table maps pitches expressed in cents (0 cents = 440 Hz) to
//! frequencies. With no table configured, pitches convert directly in
//! twelve-tone equal temperament; a table retunes pitches to its nearest
//! note offset within the octave before conversion.

use crate::TUNING_TABLE_NOTES;

/// Convert a pitch in cents (0 = 440 Hz) to a frequency in Hz.
pub fn cents_to_hz(cents: f64) -> f64 {
    440.0 * (cents / 1200.0).exp2()
}

/// A pitch-class → offset tuning description.
#[derive(Debug, Clone)]
pub struct TuningTable {
    ref_pitch: f64,
    global_offset: f64,
    octave_width: f64,
    /// Note offsets in cents within one octave, sorted ascending.
    notes: Vec<f64>,
}

impl Default for TuningTable {
    fn default() -> Self {
        TuningTable {
            ref_pitch: 440.0,
            global_offset: 0.0,
            octave_width: 1200.0,
            notes: Vec::new(),
        }
    }
}

impl TuningTable {
    /// Parse `{"ref_pitch": 440, "global_offset": 0, "octave_width": 1200,
    /// "notes": [0, 100, ...]}`.
    pub fn from_json(json: &serde_json::Value) -> Result<TuningTable, String> {
        let obj = json.as_object().ok_or("tuning table must be an object")?;
        let mut table = TuningTable::default();

        if let Some(ref_pitch) = obj.get("ref_pitch") {
            table.ref_pitch = ref_pitch.as_f64().ok_or("ref_pitch must be a number")?;
            if table.ref_pitch <= 0.0 {
                return Err("ref_pitch must be positive".to_string());
            }
        }
        if let Some(offset) = obj.get("global_offset") {
            table.global_offset = offset.as_f64().ok_or("global_offset must be a number")?;
        }
        if let Some(width) = obj.get("octave_width") {
            table.octave_width = width.as_f64().ok_or("octave_width must be a number")?;
            if table.octave_width <= 0.0 {
                return Err("octave_width must be positive".to_string());
            }
        }
        if let Some(notes) = obj.get("notes") {
            let list = notes.as_array().ok_or("notes must be a list")?;
            if list.len() > TUNING_TABLE_NOTES {
                return Err(format!("too many notes (max {TUNING_TABLE_NOTES})"));
            }
            for note in list {
                let cents = note.as_f64().ok_or("note offset must be a number")?;
                table.notes.push(cents);
            }
            table.notes.sort_by(f64::total_cmp);
        }

        Ok(table)
    }

    pub fn note_count(&self) -> usize {
        self.notes.len()
    }

    /// Map a pitch in cents to a frequency.
    ///
    /// With notes configured, the pitch is retuned to the nearest note
    /// offset in its octave; the reference pitch anchors 0 cents.
    pub fn pitch_to_freq(&self, cents: f64) -> f64 {
        let adjusted = cents + self.global_offset;

        let retuned = if self.notes.is_empty() {
            adjusted
        } else {
            let octave = (adjusted / self.octave_width).floor();
            let within = adjusted - octave * self.octave_width;
            let snapped = self
                .notes
                .iter()
                .min_by(|a, b| {
                    let da = octave_distance(**a - within, self.octave_width);
                    let db = octave_distance(**b - within, self.octave_width);
                    da.total_cmp(&db)
                })
                .copied()
                .expect("notes is nonempty");
            octave * self.octave_width + snapped
        };

        self.ref_pitch * (retuned / 1200.0).exp2()
    }
}

/// Distance between two offsets within an octave, accounting for wrap.
fn octave_distance(delta: f64, octave_width: f64) -> f64 {
    let d = delta.abs() % octave_width;
    d.min(octave_width - d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cents_to_hz_reference_points() {
        assert!((cents_to_hz(0.0) - 440.0).abs() < 1e-9);
        assert!((cents_to_hz(1200.0) - 880.0).abs() < 1e-9);
        assert!((cents_to_hz(-1200.0) - 220.0).abs() < 1e-9);
    }

    #[test]
    fn test_default_table_is_equal_temperament() {
        let table = TuningTable::default();
        assert!((table.pitch_to_freq(0.0) - 440.0).abs() < 1e-9);
        assert!((table.pitch_to_freq(700.0) - 440.0 * (7.0f64 / 12.0).exp2()).abs() < 1e-6);
    }

    #[test]
    fn test_table_snaps_to_nearest_note() {
        let json = serde_json::json!({
            "ref_pitch": 440.0,
            "notes": [0.0, 100.0, 200.0, 300.0, 400.0, 500.0, 600.0,
                      700.0, 800.0, 900.0, 1000.0, 1100.0],
        });
        let table = TuningTable::from_json(&json).unwrap();
        // 130 cents is closest to the 100-cent note.
        let snapped = table.pitch_to_freq(130.0);
        let expected = 440.0 * (100.0f64 / 1200.0).exp2();
        assert!((snapped - expected).abs() < 1e-9);
    }

    #[test]
    fn test_octaves_preserved_with_table() {
        let json = serde_json::json!({"notes": [0.0]});
        let table = TuningTable::from_json(&json).unwrap();
        assert!((table.pitch_to_freq(1250.0) - 880.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_oversized_note_list() {
        let notes: Vec<f64> = (0..200).map(|i| i as f64).collect();
        let json = serde_json::json!({ "notes": notes });
        assert!(TuningTable::from_json(&json).is_err());
    }
}
