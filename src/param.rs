//! Parameter store access
//!
//! The engine never parses project files itself; it reads resolved values
//! from a keyed hierarchical store. JSON payloads arrive as
//! `serde_json::Value`, samples as decoded PCM. Typed accessors validate
//! payloads against the type encoded in the key suffix; a malformed value
//! is reported and replaced by the registered default, and an unknown key
//! is silently ignored for forward compatibility.

use crate::envelope::Envelope;
use crate::key::KeyType;
use crate::sample::{HitMap, NoteMap, Sample, SampleParams};
use crate::tstamp::Tstamp;
use crate::value::tstamp_from_json_array;
use std::collections::BTreeMap;

/// One stored payload.
#[derive(Debug, Clone)]
pub enum StoreEntry {
    Json(serde_json::Value),
    /// Decoded PCM, produced by an external decoder.
    Pcm(Sample),
}

/// The read contract the engine builds compositions from.
pub trait ParamStore {
    fn get(&self, key: &str) -> Option<&StoreEntry>;

    /// All keys beginning with `prefix`, in lexicographic order.
    fn keys_under(&self, prefix: &str) -> Vec<String>;
}

/// An in-memory store, used by tests and embedders without a file format.
#[derive(Debug, Default)]
pub struct MemStore {
    map: BTreeMap<String, StoreEntry>,
}

impl MemStore {
    pub fn new() -> Self {
        MemStore::default()
    }

    /// Insert a JSON payload.
    ///
    /// Panics on malformed JSON or an invalid key; this is a construction
    /// convenience, not an ingestion path.
    pub fn put_json(&mut self, key: &str, json: &str) {
        assert!(crate::key::is_valid_key(key), "invalid key: {key}");
        let value: serde_json::Value =
            serde_json::from_str(json).unwrap_or_else(|e| panic!("bad JSON for {key}: {e}"));
        self.map.insert(key.to_string(), StoreEntry::Json(value));
    }

    /// Insert decoded PCM data.
    pub fn put_pcm(&mut self, key: &str, sample: Sample) {
        assert!(crate::key::is_valid_key(key), "invalid key: {key}");
        self.map.insert(key.to_string(), StoreEntry::Pcm(sample));
    }

    pub fn remove(&mut self, key: &str) {
        self.map.remove(key);
    }
}

impl ParamStore for MemStore {
    fn get(&self, key: &str) -> Option<&StoreEntry> {
        self.map.get(key)
    }

    fn keys_under(&self, prefix: &str) -> Vec<String> {
        self.map
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect()
    }
}

/// A typed parameter payload handed to processor setters.
#[derive(Debug, Clone)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Tstamp(Tstamp),
    Envelope(Envelope),
    Sample(Sample),
    NoteMap(NoteMap),
    HitMap(HitMap),
    NumList(Vec<f64>),
    Json(serde_json::Value),
}

impl ParamValue {
    /// Convert a store entry according to the type its key encodes.
    pub fn from_entry(key: &str, entry: &StoreEntry) -> Result<ParamValue, String> {
        let kind = KeyType::of_key(key).ok_or_else(|| format!("unrecognized key suffix: {key}"))?;

        match (kind, entry) {
            (KeyType::Sample, StoreEntry::Pcm(sample)) => Ok(ParamValue::Sample(sample.clone())),
            (KeyType::Sample, StoreEntry::Json(_)) => {
                Err("sample key holds JSON instead of PCM".to_string())
            }
            (_, StoreEntry::Pcm(_)) => Err("JSON key holds PCM data".to_string()),
            (kind, StoreEntry::Json(json)) => ParamValue::from_json(kind, json),
        }
    }

    fn from_json(kind: KeyType, json: &serde_json::Value) -> Result<ParamValue, String> {
        match kind {
            KeyType::Bool => json
                .as_bool()
                .map(ParamValue::Bool)
                .ok_or_else(|| "expected a boolean".to_string()),
            KeyType::Int => json
                .as_i64()
                .map(ParamValue::Int)
                .ok_or_else(|| "expected an integer".to_string()),
            KeyType::Float => json
                .as_f64()
                .filter(|f| f.is_finite())
                .map(ParamValue::Float)
                .ok_or_else(|| "expected a finite number".to_string()),
            KeyType::Tstamp => json
                .as_array()
                .and_then(|items| tstamp_from_json_array(items))
                .map(ParamValue::Tstamp)
                .ok_or_else(|| "expected [beats, rem]".to_string()),
            KeyType::Envelope => Envelope::from_json(json).map(ParamValue::Envelope),
            KeyType::SampleMap => NoteMap::from_json(json).map(ParamValue::NoteMap),
            KeyType::HitMap => HitMap::from_json(json).map(ParamValue::HitMap),
            KeyType::NumList => {
                let list = json.as_array().ok_or("expected a number list")?;
                let mut numbers = Vec::with_capacity(list.len());
                for item in list {
                    let n = item
                        .as_f64()
                        .filter(|f| f.is_finite())
                        .ok_or("number list entries must be finite numbers")?;
                    numbers.push(n);
                }
                Ok(ParamValue::NumList(numbers))
            }
            KeyType::Sample => Err("sample key holds JSON instead of PCM".to_string()),
            KeyType::Json => Ok(ParamValue::Json(json.clone())),
        }
    }
}

/// Typed reads against a store subtree.
pub struct Accessor<'a> {
    store: &'a dyn ParamStore,
}

impl<'a> Accessor<'a> {
    pub fn new(store: &'a dyn ParamStore) -> Self {
        Accessor { store }
    }

    fn json(&self, key: &str) -> Result<Option<&'a serde_json::Value>, String> {
        match self.store.get(key) {
            None => Ok(None),
            Some(StoreEntry::Json(json)) => Ok(Some(json)),
            Some(StoreEntry::Pcm(_)) => Err(format!("{key}: JSON key holds PCM data")),
        }
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, String> {
        match self.json(key)? {
            None => Ok(None),
            Some(json) => json
                .as_bool()
                .map(Some)
                .ok_or_else(|| format!("{key}: expected a boolean")),
        }
    }

    pub fn get_int(&self, key: &str) -> Result<Option<i64>, String> {
        match self.json(key)? {
            None => Ok(None),
            Some(json) => json
                .as_i64()
                .map(Some)
                .ok_or_else(|| format!("{key}: expected an integer")),
        }
    }

    pub fn get_float(&self, key: &str) -> Result<Option<f64>, String> {
        match self.json(key)? {
            None => Ok(None),
            Some(json) => json
                .as_f64()
                .filter(|f| f.is_finite())
                .map(Some)
                .ok_or_else(|| format!("{key}: expected a finite number")),
        }
    }

    pub fn get_tstamp(&self, key: &str) -> Result<Option<Tstamp>, String> {
        match self.json(key)? {
            None => Ok(None),
            Some(json) => json
                .as_array()
                .and_then(|items| tstamp_from_json_array(items))
                .map(Some)
                .ok_or_else(|| format!("{key}: expected [beats, rem]")),
        }
    }

    pub fn get_envelope(&self, key: &str) -> Result<Option<Envelope>, String> {
        match self.json(key)? {
            None => Ok(None),
            Some(json) => Envelope::from_json(json)
                .map(Some)
                .map_err(|e| format!("{key}: {e}")),
        }
    }

    pub fn get_sample(&self, key: &str) -> Result<Option<Sample>, String> {
        match self.store.get(key) {
            None => Ok(None),
            Some(StoreEntry::Pcm(sample)) => Ok(Some(sample.clone())),
            Some(StoreEntry::Json(_)) => Err(format!("{key}: sample key holds JSON")),
        }
    }

    pub fn get_sample_params(&self, key: &str) -> Result<Option<SampleParams>, String> {
        match self.json(key)? {
            None => Ok(None),
            Some(json) => SampleParams::from_json(json)
                .map(Some)
                .map_err(|e| format!("{key}: {e}")),
        }
    }

    pub fn get_note_map(&self, key: &str) -> Result<Option<NoteMap>, String> {
        match self.json(key)? {
            None => Ok(None),
            Some(json) => NoteMap::from_json(json)
                .map(Some)
                .map_err(|e| format!("{key}: {e}")),
        }
    }

    pub fn get_hit_map(&self, key: &str) -> Result<Option<HitMap>, String> {
        match self.json(key)? {
            None => Ok(None),
            Some(json) => HitMap::from_json(json)
                .map(Some)
                .map_err(|e| format!("{key}: {e}")),
        }
    }

    pub fn get_num_list(&self, key: &str) -> Result<Option<Vec<f64>>, String> {
        match self.json(key)? {
            None => Ok(None),
            Some(json) => match ParamValue::from_json(KeyType::NumList, json) {
                Ok(ParamValue::NumList(list)) => Ok(Some(list)),
                Ok(_) => unreachable!("num list conversion yields a num list"),
                Err(e) => Err(format!("{key}: {e}")),
            },
        }
    }

    pub fn get_json(&self, key: &str) -> Result<Option<&'a serde_json::Value>, String> {
        self.json(key)
    }
}
