//! Timeline events
//!
//! Events live in pattern columns and may also be fired directly at a
//! player for realtime use. Each event names its effect, an optional
//! channel target and a typed payload.

use crate::tstamp::Tstamp;
use crate::value::{tstamp_from_json_array, Value};

/// The closed set of event effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NoteOn,
    NoteOff,
    Hit,
    TempoSet,
    TempoSlide,
    ChannelParamSet,
    GlobalParamSet,
    ControlVarSet,
    ControlVarSlide,
    PatternJump,
}

impl EventKind {
    /// Parse the serialized event name.
    pub fn from_name(name: &str) -> Option<EventKind> {
        let kind = match name {
            "note_on" => EventKind::NoteOn,
            "note_off" => EventKind::NoteOff,
            "hit" => EventKind::Hit,
            "set_tempo" => EventKind::TempoSet,
            "slide_tempo" => EventKind::TempoSlide,
            "set_ch_param" => EventKind::ChannelParamSet,
            "set_global_param" => EventKind::GlobalParamSet,
            "set_cv" => EventKind::ControlVarSet,
            "slide_cv" => EventKind::ControlVarSlide,
            "pattern_jump" => EventKind::PatternJump,
            _ => return None,
        };
        Some(kind)
    }

    /// Events in the global column affect playback state rather than a
    /// single channel.
    pub fn is_global(&self) -> bool {
        matches!(
            self,
            EventKind::TempoSet
                | EventKind::TempoSlide
                | EventKind::GlobalParamSet
                | EventKind::PatternJump
        )
    }
}

/// One timeline event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Position within the owning pattern.
    pub pos: Tstamp,
    pub kind: EventKind,
    /// Target channel; `None` for global events.
    pub channel: Option<u8>,
    pub value: Value,
    /// Extra payload for two-argument events (slide lengths, cv names).
    pub aux: Value,
}

impl Event {
    pub fn new(pos: Tstamp, kind: EventKind, channel: Option<u8>, value: Value) -> Self {
        Event {
            pos,
            kind,
            channel,
            value,
            aux: Value::None,
        }
    }

    /// Parse one serialized column entry: `[[beats, rem], "name", payload]`
    /// with an optional fourth auxiliary payload element.
    ///
    /// Returns `None` for a malformed entry; the caller rejects the event
    /// and keeps going.
    pub fn from_json(entry: &serde_json::Value, channel: Option<u8>) -> Option<Event> {
        let items = entry.as_array()?;
        if items.len() < 2 || items.len() > 4 {
            return None;
        }
        let pos = tstamp_from_json_array(items[0].as_array()?)?;
        let kind = EventKind::from_name(items[1].as_str()?)?;
        let value = match items.get(2) {
            Some(v) => Value::from_json(v)?,
            None => Value::None,
        };
        let aux = match items.get(3) {
            Some(v) => Value::from_json(v)?,
            None => Value::None,
        };
        let channel = if kind.is_global() { None } else { channel };
        Some(Event {
            pos,
            kind,
            channel,
            value,
            aux,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_note_on() {
        let entry = serde_json::json!([[1, 0], "note_on", -1200.0]);
        let ev = Event::from_json(&entry, Some(3)).unwrap();
        assert_eq!(ev.kind, EventKind::NoteOn);
        assert_eq!(ev.channel, Some(3));
        assert_eq!(ev.pos, Tstamp::from_beats(1));
        assert_eq!(ev.value, Value::Float(-1200.0));
    }

    #[test]
    fn test_parse_tempo_slide_with_length() {
        let entry = serde_json::json!([[0, 0], "slide_tempo", 90.0, [2, 0]]);
        let ev = Event::from_json(&entry, None).unwrap();
        assert_eq!(ev.kind, EventKind::TempoSlide);
        assert_eq!(ev.value, Value::Float(90.0));
        assert_eq!(ev.aux, Value::Tstamp(Tstamp::from_beats(2)));
    }

    #[test]
    fn test_global_event_drops_channel() {
        let entry = serde_json::json!([[0, 0], "set_tempo", 140.0]);
        let ev = Event::from_json(&entry, Some(5)).unwrap();
        assert_eq!(ev.channel, None);
    }

    #[test]
    fn test_malformed_entries_rejected() {
        assert!(Event::from_json(&serde_json::json!([[0, 0]]), None).is_none());
        assert!(Event::from_json(&serde_json::json!([[0, 0], "no_such_event", 1]), None).is_none());
        // Remainder out of range: InvalidTimestamp, event rejected.
        assert!(Event::from_json(&serde_json::json!([[0, -5], "note_off"]), Some(0)).is_none());
    }
}
