//! Patterns, columns and songs
//!
//! A pattern is a bounded timeline: a fixed set of voice columns plus one
//! global column, each an ordered stream of events. A song is an ordered
//! list of pattern instances. At build time each pattern's columns are
//! merged into one dispatch-ordered event list so the player needs no
//! runtime priority queue.

use crate::event::Event;
use crate::tstamp::Tstamp;
use crate::value::tstamp_from_json_array;
use crate::COLUMNS_MAX;

/// An ordered stream of events with nondecreasing positions.
#[derive(Debug, Clone, Default)]
pub struct Column {
    events: Vec<Event>,
}

impl Column {
    /// Parse a serialized event list. Returns the column and the number of
    /// rejected (malformed) entries.
    pub fn from_json(
        json: &serde_json::Value,
        channel: Option<u8>,
        length: Tstamp,
    ) -> Result<(Column, usize), String> {
        let list = json.as_array().ok_or("column must be a list of events")?;
        let mut events = Vec::with_capacity(list.len());
        let mut rejected = 0;
        let mut last_pos = Tstamp::zero();

        for entry in list {
            let Some(event) = Event::from_json(entry, channel) else {
                rejected += 1;
                continue;
            };
            if event.pos < last_pos {
                return Err("column events must be in nondecreasing order".to_string());
            }
            if event.pos >= length {
                return Err("event position outside pattern".to_string());
            }
            last_pos = event.pos;
            events.push(event);
        }

        Ok((Column { events }, rejected))
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// A bounded timeline of columns.
#[derive(Debug, Clone)]
pub struct Pattern {
    length: Tstamp,
    /// All column events merged into dispatch order: position first, then
    /// global column before voice columns, then column index, then the
    /// original order within a column.
    merged: Vec<Event>,
}

impl Pattern {
    pub fn new(length: Tstamp, global: Column, columns: Vec<Column>) -> Result<Pattern, String> {
        if columns.len() > COLUMNS_MAX {
            return Err(format!("too many columns (max {COLUMNS_MAX})"));
        }

        let mut keyed: Vec<(Tstamp, usize, usize, Event)> = Vec::new();
        for (seq, event) in global.events.into_iter().enumerate() {
            keyed.push((event.pos, 0, seq, event));
        }
        for (col, column) in columns.into_iter().enumerate() {
            for (seq, event) in column.events.into_iter().enumerate() {
                keyed.push((event.pos, col + 1, seq, event));
            }
        }
        keyed.sort_by(|a, b| (a.0, a.1, a.2).cmp(&(b.0, b.1, b.2)));

        Ok(Pattern {
            length,
            merged: keyed.into_iter().map(|(_, _, _, ev)| ev).collect(),
        })
    }

    /// Parse the pattern length from its `p_length.jsont` payload.
    pub fn length_from_json(json: &serde_json::Value) -> Result<Tstamp, String> {
        let items = json.as_array().ok_or("pattern length must be [beats, rem]")?;
        let length = tstamp_from_json_array(items).ok_or("invalid pattern length")?;
        if length <= Tstamp::zero() {
            return Err("pattern length must be positive".to_string());
        }
        Ok(length)
    }

    pub fn length(&self) -> Tstamp {
        self.length
    }

    /// All events in dispatch order.
    pub fn events(&self) -> &[Event] {
        &self.merged
    }

    /// Index of the first event at or after `pos`.
    pub fn first_event_at(&self, pos: Tstamp) -> usize {
        self.merged.partition_point(|ev| ev.pos < pos)
    }
}

/// One placement of a pattern in a song.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternInstance {
    pub pattern: usize,
    pub instance: usize,
}

/// An ordered sequence of pattern instances with a starting tempo.
#[derive(Debug, Clone)]
pub struct Song {
    pub order: Vec<PatternInstance>,
    pub tempo: f64,
}

impl Song {
    pub fn new(order: Vec<PatternInstance>, tempo: f64) -> Result<Song, String> {
        if !(1.0..=999.0).contains(&tempo) {
            return Err("song tempo out of range".to_string());
        }
        Ok(Song { order, tempo })
    }

    /// Parse `[[pattern, instance], ...]`.
    pub fn order_from_json(json: &serde_json::Value) -> Result<Vec<PatternInstance>, String> {
        let list = json.as_array().ok_or("order list must be a list")?;
        let mut order = Vec::with_capacity(list.len());
        for entry in list {
            let pair = entry.as_array().ok_or("order entry must be a pair")?;
            if pair.len() != 2 {
                return Err("order entry must be a pair".to_string());
            }
            let pattern = pair[0].as_u64().ok_or("pattern id must be an index")? as usize;
            let instance = pair[1].as_u64().ok_or("instance id must be an index")? as usize;
            order.push(PatternInstance { pattern, instance });
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    fn column(json: serde_json::Value, channel: Option<u8>, beats: i64) -> Column {
        Column::from_json(&json, channel, Tstamp::from_beats(beats))
            .unwrap()
            .0
    }

    #[test]
    fn test_column_rejects_out_of_order() {
        let json = serde_json::json!([
            [[1, 0], "note_on", 0.0],
            [[0, 0], "note_off"],
        ]);
        assert!(Column::from_json(&json, Some(0), Tstamp::from_beats(4)).is_err());
    }

    #[test]
    fn test_column_rejects_event_beyond_length() {
        let json = serde_json::json!([[[4, 0], "note_on", 0.0]]);
        assert!(Column::from_json(&json, Some(0), Tstamp::from_beats(4)).is_err());
    }

    #[test]
    fn test_column_counts_malformed_entries() {
        let json = serde_json::json!([
            [[0, 0], "note_on", 0.0],
            [[1, 0], "not_an_event", 0.0],
        ]);
        let (col, rejected) = Column::from_json(&json, Some(0), Tstamp::from_beats(4)).unwrap();
        assert_eq!(col.events().len(), 1);
        assert_eq!(rejected, 1);
    }

    #[test]
    fn test_merge_order_global_first() {
        let global = column(serde_json::json!([[[1, 0], "set_tempo", 90.0]]), None, 4);
        let col0 = column(serde_json::json!([[[1, 0], "note_on", 0.0]]), Some(0), 4);
        let pattern = Pattern::new(Tstamp::from_beats(4), global, vec![col0]).unwrap();

        let kinds: Vec<EventKind> = pattern.events().iter().map(|ev| ev.kind).collect();
        assert_eq!(kinds, vec![EventKind::TempoSet, EventKind::NoteOn]);
    }

    #[test]
    fn test_merge_order_by_column_index() {
        let col0 = column(serde_json::json!([[[2, 0], "note_off"]]), Some(0), 4);
        let col1 = column(serde_json::json!([[[0, 0], "note_on", 0.0]]), Some(1), 4);
        let pattern = Pattern::new(Tstamp::from_beats(4), Column::default(), vec![col0, col1]).unwrap();

        assert_eq!(pattern.events()[0].channel, Some(1));
        assert_eq!(pattern.events()[1].channel, Some(0));
    }

    #[test]
    fn test_first_event_at() {
        let col = column(
            serde_json::json!([
                [[0, 0], "note_on", 0.0],
                [[2, 0], "note_off"],
            ]),
            Some(0),
            4,
        );
        let pattern = Pattern::new(Tstamp::from_beats(4), Column::default(), vec![col]).unwrap();
        assert_eq!(pattern.first_event_at(Tstamp::zero()), 0);
        assert_eq!(pattern.first_event_at(Tstamp::new(0, 1)), 1);
        assert_eq!(pattern.first_event_at(Tstamp::from_beats(3)), 2);
    }
}
