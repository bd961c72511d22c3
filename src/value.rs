//! Tagged values carried by events and control-variable updates.

use crate::tstamp::{Tstamp, BEAT_DIVISOR};

/// A dynamically typed value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Tstamp(Tstamp),
    /// A pitch in cents, 0 cents = 440 Hz.
    Pitch(f64),
    String(String),
    /// A reference to another store key or named entity.
    Ref(String),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric coercion: ints widen to floats, pitches read as their cents.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::Pitch(p) => Some(*p),
            _ => None,
        }
    }

    pub fn as_tstamp(&self) -> Option<Tstamp> {
        match self {
            Value::Tstamp(ts) => Some(*ts),
            Value::Int(i) => Some(Tstamp::from_beats(*i)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Ref(s) => Some(s),
            _ => None,
        }
    }

    /// Read a value out of its JSON form.
    ///
    /// Timestamps are two-element `[beats, rem]` arrays; a remainder
    /// outside `[0, BEAT_DIVISOR)` makes the whole value invalid.
    pub fn from_json(json: &serde_json::Value) -> Option<Value> {
        match json {
            serde_json::Value::Null => Some(Value::None),
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Value::Int(i))
                } else {
                    n.as_f64().map(Value::Float)
                }
            }
            serde_json::Value::String(s) => Some(Value::String(s.clone())),
            serde_json::Value::Array(items) => tstamp_from_json_array(items).map(Value::Tstamp),
            _ => None,
        }
    }
}

/// Parse `[beats, rem]`, rejecting out-of-range remainders.
pub fn tstamp_from_json_array(items: &[serde_json::Value]) -> Option<Tstamp> {
    if items.len() != 2 {
        return None;
    }
    let beats = items[0].as_i64()?;
    let rem = items[1].as_i64()?;
    if !(0..i64::from(BEAT_DIVISOR)).contains(&rem) {
        return None;
    }
    Some(Tstamp::new(beats, rem))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_scalars() {
        assert_eq!(
            Value::from_json(&serde_json::json!(true)),
            Some(Value::Bool(true))
        );
        assert_eq!(Value::from_json(&serde_json::json!(3)), Some(Value::Int(3)));
        assert_eq!(
            Value::from_json(&serde_json::json!(2.5)),
            Some(Value::Float(2.5))
        );
    }

    #[test]
    fn test_tstamp_rejects_bad_remainder() {
        let bad = serde_json::json!([0, -1]);
        assert_eq!(Value::from_json(&bad), None);
        let bad = serde_json::json!([0, i64::from(BEAT_DIVISOR)]);
        assert_eq!(Value::from_json(&bad), None);
        let good = serde_json::json!([2, 7]);
        assert_eq!(
            Value::from_json(&good),
            Some(Value::Tstamp(Tstamp::new(2, 7)))
        );
    }

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(Value::Int(4).as_float(), Some(4.0));
        assert_eq!(Value::Float(0.5).as_int(), None);
    }
}
