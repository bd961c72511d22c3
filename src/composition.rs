//! The composition root
//!
//! A composition is built once from the parameter store and is immutable
//! afterwards: patterns, songs, audio units with their processors, the
//! master connection graph, the tuning table, and the flat device table
//! the player indexes its states by.
//!
//! Build policy: structural problems (bad connection lists, graph cycles,
//! malformed pattern data) abort the build and leave any previously built
//! composition untouched; malformed processor parameters are reported,
//! the registered default stays in effect, and the build continues.
//! Unknown keys are ignored.

use crate::audio_unit::{AuKind, AudioUnit};
use crate::connections::{Connections, NodeKind};
use crate::device::{Processor, SignalType, VoiceFeatures};
use crate::param::{Accessor, ParamStore, ParamValue};
use crate::pattern::{Column, Pattern, Song};
use crate::processors::new_from_name;
use crate::tstamp::Tstamp;
use crate::tuning::TuningTable;
use crate::{COLUMNS_MAX, INSTRUMENTS_MAX, PATTERNS_MAX, PROCESSORS_MAX, SONGS_MAX};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that abort a composition build.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("connection graph cycle at node {node}")]
    GraphCycle { node: String },
    #[error("malformed parameter {key}: {detail}")]
    MalformedParameter { key: String, detail: String },
    #[error("composition structure: {0}")]
    Structure(String),
}

/// What a flat device table entry stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Master,
    AudioUnit(usize),
    AuInput(usize),
    AuOutput(usize),
    Processor { au: usize, proc: usize },
}

/// Device ids assigned to one audio unit and its members.
#[derive(Debug, Clone)]
pub struct AuDeviceIds {
    pub unit: usize,
    pub input: usize,
    pub output: usize,
    pub procs: Vec<Option<usize>>,
}

/// The master device id.
pub const MASTER_DEVICE: usize = 0;

pub struct Composition {
    songs: Vec<Option<Song>>,
    patterns: Vec<Option<Pattern>>,
    audio_units: Vec<Option<AudioUnit>>,
    connections: Connections,
    tuning: TuningTable,
    /// Control index → audio unit index.
    control_map: Vec<Option<usize>>,
    devices: Vec<DeviceKind>,
    au_devices: Vec<Option<AuDeviceIds>>,
    /// Non-fatal build notices (rejected parameters and events).
    reports: Vec<String>,
}

impl Composition {
    /// Build a composition from the parameter store.
    pub fn build(store: &dyn ParamStore) -> Result<Composition, BuildError> {
        let acc = Accessor::new(store);
        let mut reports = Vec::new();

        let tuning = match acc.get_json("p_tuning_table.json").map_err(structure)? {
            Some(json) => TuningTable::from_json(json).map_err(|detail| {
                BuildError::MalformedParameter {
                    key: "p_tuning_table.json".to_string(),
                    detail,
                }
            })?,
            None => TuningTable::default(),
        };

        let audio_units = build_audio_units(store, &mut reports)?;
        let patterns = build_patterns(store, &mut reports)?;
        let songs = build_songs(store)?;

        let connections = match acc.get_json("p_connections.json").map_err(structure)? {
            Some(json) => Connections::from_json(json, false).map_err(structure)?,
            None => Connections::empty(),
        };
        connections
            .check_cycles()
            .map_err(|node| BuildError::GraphCycle { node })?;

        validate_graph_refs(&connections, &audio_units, None)?;
        check_containment(&audio_units)?;

        let control_map = build_control_map(store, &audio_units)?;
        let (devices, au_devices) = build_device_table(&audio_units);

        debug!(
            units = audio_units.iter().flatten().count(),
            patterns = patterns.iter().flatten().count(),
            songs = songs.iter().flatten().count(),
            devices = devices.len(),
            "composition built"
        );

        Ok(Composition {
            songs,
            patterns,
            audio_units,
            connections,
            tuning,
            control_map,
            devices,
            au_devices,
            reports,
        })
    }

    pub fn song(&self, index: usize) -> Option<&Song> {
        self.songs.get(index).and_then(|s| s.as_ref())
    }

    /// The first existing song, if any.
    pub fn first_song(&self) -> Option<&Song> {
        self.songs.iter().flatten().next()
    }

    pub fn first_song_index(&self) -> Option<usize> {
        self.songs.iter().position(|s| s.is_some())
    }

    pub fn pattern(&self, index: usize) -> Option<&Pattern> {
        self.patterns.get(index).and_then(|p| p.as_ref())
    }

    pub fn audio_unit(&self, index: usize) -> Option<&AudioUnit> {
        self.audio_units.get(index).and_then(|au| au.as_ref())
    }

    pub fn audio_units(&self) -> impl Iterator<Item = &AudioUnit> {
        self.audio_units.iter().flatten()
    }

    pub fn connections(&self) -> &Connections {
        &self.connections
    }

    pub fn tuning(&self) -> &TuningTable {
        &self.tuning
    }

    /// Resolve a control index to its audio unit.
    pub fn control_au(&self, control: usize) -> Option<usize> {
        self.control_map.get(control).copied().flatten()
    }

    pub fn devices(&self) -> &[DeviceKind] {
        &self.devices
    }

    pub fn device_kind(&self, device: usize) -> DeviceKind {
        self.devices[device]
    }

    pub fn au_device_ids(&self, au: usize) -> Option<&AuDeviceIds> {
        self.au_devices.get(au).and_then(|ids| ids.as_ref())
    }

    /// The processor behind a device id, if the device is a processor.
    pub fn processor_at(&self, device: usize) -> Option<&Processor> {
        match self.devices.get(device)? {
            DeviceKind::Processor { au, proc } => self.audio_unit(*au)?.processor(*proc),
            _ => None,
        }
    }

    pub fn reports(&self) -> &[String] {
        &self.reports
    }
}

impl std::fmt::Debug for Composition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Composition")
            .field("devices", &self.devices.len())
            .field("patterns", &self.patterns.iter().flatten().count())
            .finish()
    }
}

fn structure(detail: String) -> BuildError {
    BuildError::Structure(detail)
}

/// Parse `prefix` + exactly `digits` lowercase hex digits.
fn parse_index(fragment: &str, prefix: &str, digits: usize) -> Option<usize> {
    let rest = fragment.strip_prefix(prefix)?;
    if rest.len() != digits || rest.bytes().any(|b| !b.is_ascii_hexdigit() || b.is_ascii_uppercase())
    {
        return None;
    }
    usize::from_str_radix(rest, 16).ok()
}

/// Entity indices present under a store prefix family, e.g. `au_`.
fn present_indices(store: &dyn ParamStore, prefix: &str, digits: usize, max: usize) -> Vec<usize> {
    let mut found: Vec<usize> = store
        .keys_under(prefix)
        .iter()
        .filter_map(|key| {
            let fragment = key.split('/').next()?;
            parse_index(fragment, prefix, digits)
        })
        .filter(|&i| i < max)
        .collect();
    found.sort_unstable();
    found.dedup();
    found
}

fn build_audio_units(
    store: &dyn ParamStore,
    reports: &mut Vec<String>,
) -> Result<Vec<Option<AudioUnit>>, BuildError> {
    let acc = Accessor::new(store);
    let indices = present_indices(store, "au_", 2, INSTRUMENTS_MAX);
    let unit_count = indices.iter().max().map(|&i| i + 1).unwrap_or(0);
    let mut units: Vec<Option<AudioUnit>> = (0..unit_count).map(|_| None).collect();

    for au_index in indices {
        let prefix = format!("au_{au_index:02x}/");
        let manifest_key = format!("{prefix}p_manifest.json");
        let Some(manifest) = acc.get_json(&manifest_key).map_err(structure)? else {
            continue;
        };

        let mut unit = AudioUnit::new(au_index);
        if let Some(kind_name) = manifest.get("type").and_then(|t| t.as_str()) {
            unit.kind = AuKind::from_name(kind_name).ok_or_else(|| {
                BuildError::Structure(format!("{manifest_key}: unknown unit type {kind_name}"))
            })?;
        }

        unit.params.force_release_env = acc
            .get_envelope(&format!("{prefix}p_env_force_rel.jsone"))
            .unwrap_or_else(|detail| {
                report_param(reports, &detail);
                None
            });
        if let Some(volume) = acc
            .get_float(&format!("{prefix}p_f_volume.jsonf"))
            .unwrap_or_else(|detail| {
                report_param(reports, &detail);
                None
            })
        {
            unit.params.volume = volume;
        }

        unit.connections = match acc
            .get_json(&format!("{prefix}p_connections.json"))
            .map_err(structure)?
        {
            Some(json) => Connections::from_json(json, true)
                .map_err(|e| structure(format!("{prefix}p_connections.json: {e}")))?,
            None => Connections::empty(),
        };
        unit.connections.check_cycles().map_err(|node| BuildError::GraphCycle {
            node: format!("{prefix}{node}"),
        })?;

        unit.processors = build_processors(store, &prefix, reports)?;
        validate_graph_refs(&unit.connections, &[], Some(&unit))?;

        units[au_index] = Some(unit);
    }

    Ok(units)
}

fn build_processors(
    store: &dyn ParamStore,
    au_prefix: &str,
    reports: &mut Vec<String>,
) -> Result<Vec<Option<Processor>>, BuildError> {
    let acc = Accessor::new(store);
    let proc_keys = store.keys_under(&format!("{au_prefix}proc_"));
    let mut indices: Vec<usize> = proc_keys
        .iter()
        .filter_map(|key| {
            let fragment = key.strip_prefix(au_prefix)?.split('/').next()?;
            parse_index(fragment, "proc_", 2)
        })
        .filter(|&i| i < PROCESSORS_MAX)
        .collect();
    indices.sort_unstable();
    indices.dedup();

    let count = indices.iter().max().map(|&i| i + 1).unwrap_or(0);
    let mut processors: Vec<Option<Processor>> = (0..count).map(|_| None).collect();

    for proc_index in indices {
        let prefix = format!("{au_prefix}proc_{proc_index:02x}/");
        let manifest_key = format!("{prefix}p_manifest.json");
        let Some(manifest) = acc.get_json(&manifest_key).map_err(structure)? else {
            continue;
        };
        let Some(type_name) = manifest.get("type").and_then(|t| t.as_str()) else {
            return Err(BuildError::Structure(format!(
                "{manifest_key}: processor manifest needs a type"
            )));
        };
        let Some(imp) = new_from_name(type_name) else {
            return Err(BuildError::Structure(format!(
                "{manifest_key}: unknown processor type {type_name}"
            )));
        };

        let mut proc = Processor::new(proc_index, imp);

        match acc
            .get_json(&format!("{prefix}p_signal_type.json"))
            .map_err(structure)?
            .and_then(|j| j.as_str())
        {
            Some("voice") => proc.signal_type = SignalType::Voice,
            Some("mixed") => proc.signal_type = SignalType::Mixed,
            Some(other) => {
                return Err(BuildError::Structure(format!(
                    "{prefix}p_signal_type.json: unknown signal type {other}"
                )))
            }
            None => {}
        }

        if let Some(features) = acc
            .get_json(&format!("{prefix}p_voice_features.json"))
            .map_err(structure)?
        {
            let parsed = parse_voice_features(features).map_err(|detail| {
                BuildError::MalformedParameter {
                    key: format!("{prefix}p_voice_features.json"),
                    detail,
                }
            })?;
            for port in 0..crate::DEVICE_PORTS_MAX {
                proc.set_feature(port, parsed);
            }
        }

        route_processor_params(store, &prefix, &mut proc, reports);
        processors[proc_index] = Some(proc);
    }

    Ok(processors)
}

/// Feed every parameter key under the processor directory to its
/// implementation.
fn route_processor_params(
    store: &dyn ParamStore,
    prefix: &str,
    proc: &mut Processor,
    reports: &mut Vec<String>,
) {
    const STRUCTURAL: [&str; 3] = [
        "p_manifest.json",
        "p_signal_type.json",
        "p_voice_features.json",
    ];

    for key in store.keys_under(prefix) {
        let subkey = &key[prefix.len()..];
        if STRUCTURAL.contains(&subkey) {
            continue;
        }
        let Some(entry) = store.get(&key) else {
            continue;
        };
        let value = match ParamValue::from_entry(subkey, entry) {
            Ok(value) => value,
            Err(detail) => {
                report_param(reports, &format!("{key}: {detail}"));
                continue;
            }
        };
        match proc.imp.set_param(subkey, &value) {
            crate::device::SetResult::Applied => {}
            crate::device::SetResult::Unmatched => {
                debug!(key = %key, "ignoring unknown parameter key");
            }
            crate::device::SetResult::Invalid(detail) => {
                report_param(reports, &format!("{key}: {detail}"));
            }
        }
    }
}

fn parse_voice_features(json: &serde_json::Value) -> Result<VoiceFeatures, String> {
    let obj = json.as_object().ok_or("voice features must be an object")?;
    let mut features = VoiceFeatures::default();
    for (name, value) in obj {
        let enabled = value.as_bool().ok_or("voice feature flags are booleans")?;
        match name.as_str() {
            "pitch" => features.pitch = enabled,
            "force" => features.force = enabled,
            "filter" => features.filter = enabled,
            "panning" => features.panning = enabled,
            "cut" => features.cut = enabled,
            other => return Err(format!("unknown voice feature: {other}")),
        }
    }
    Ok(features)
}

fn build_patterns(
    store: &dyn ParamStore,
    reports: &mut Vec<String>,
) -> Result<Vec<Option<Pattern>>, BuildError> {
    let acc = Accessor::new(store);
    let indices = present_indices(store, "pat_", 3, PATTERNS_MAX);
    let count = indices.iter().max().map(|&i| i + 1).unwrap_or(0);
    let mut patterns: Vec<Option<Pattern>> = (0..count).map(|_| None).collect();

    for pat_index in indices {
        let prefix = format!("pat_{pat_index:03x}/");
        if acc
            .get_json(&format!("{prefix}p_manifest.json"))
            .map_err(structure)?
            .is_none()
        {
            continue;
        }

        let length = match acc
            .get_json(&format!("{prefix}p_length.jsont"))
            .map_err(structure)?
        {
            Some(json) => Pattern::length_from_json(json)
                .map_err(|e| structure(format!("{prefix}p_length.jsont: {e}")))?,
            None => Tstamp::from_beats(16),
        };

        let global = match acc
            .get_json(&format!("{prefix}gcol/p_events.json"))
            .map_err(structure)?
        {
            Some(json) => {
                let (col, rejected) = Column::from_json(json, None, length)
                    .map_err(|e| structure(format!("{prefix}gcol: {e}")))?;
                report_rejected(reports, &prefix, "gcol", rejected);
                col
            }
            None => Column::default(),
        };

        let mut columns = Vec::new();
        for col_index in 0..COLUMNS_MAX {
            let key = format!("{prefix}col_{col_index:02x}/p_events.json");
            let column = match acc.get_json(&key).map_err(structure)? {
                Some(json) => {
                    let (col, rejected) =
                        Column::from_json(json, Some(col_index as u8), length)
                            .map_err(|e| structure(format!("{key}: {e}")))?;
                    report_rejected(reports, &prefix, &format!("col_{col_index:02x}"), rejected);
                    col
                }
                None => Column::default(),
            };
            columns.push(column);
        }

        let pattern = Pattern::new(length, global, columns).map_err(structure)?;
        patterns[pat_index] = Some(pattern);
    }

    Ok(patterns)
}

fn build_songs(store: &dyn ParamStore) -> Result<Vec<Option<Song>>, BuildError> {
    let acc = Accessor::new(store);
    let indices = present_indices(store, "song_", 2, SONGS_MAX);
    let count = indices.iter().max().map(|&i| i + 1).unwrap_or(0);
    let mut songs: Vec<Option<Song>> = (0..count).map(|_| None).collect();

    for song_index in indices {
        let prefix = format!("song_{song_index:02x}/");
        if acc
            .get_json(&format!("{prefix}p_manifest.json"))
            .map_err(structure)?
            .is_none()
        {
            continue;
        }

        let order = match acc
            .get_json(&format!("{prefix}p_order_list.json"))
            .map_err(structure)?
        {
            Some(json) => Song::order_from_json(json)
                .map_err(|e| structure(format!("{prefix}p_order_list.json: {e}")))?,
            None => Vec::new(),
        };
        let tempo = acc
            .get_float(&format!("{prefix}p_tempo.jsonf"))
            .map_err(structure)?
            .unwrap_or(120.0);

        let song =
            Song::new(order, tempo).map_err(|e| structure(format!("{prefix}: {e}")))?;
        songs[song_index] = Some(song);
    }

    Ok(songs)
}

fn build_control_map(
    store: &dyn ParamStore,
    units: &[Option<AudioUnit>],
) -> Result<Vec<Option<usize>>, BuildError> {
    let acc = Accessor::new(store);
    match acc.get_json("p_control_map.json").map_err(structure)? {
        Some(json) => {
            let list = json
                .as_array()
                .ok_or_else(|| structure("control map must be a list".to_string()))?;
            let mut map: Vec<Option<usize>> = Vec::new();
            for entry in list {
                let pair = entry
                    .as_array()
                    .filter(|p| p.len() == 2)
                    .ok_or_else(|| structure("control map entry must be a pair".to_string()))?;
                let control = pair[0]
                    .as_u64()
                    .ok_or_else(|| structure("control index must be an integer".to_string()))?
                    as usize;
                let au = pair[1]
                    .as_u64()
                    .ok_or_else(|| structure("unit index must be an integer".to_string()))?
                    as usize;
                if units.get(au).and_then(|u| u.as_ref()).is_none() {
                    return Err(structure(format!("control {control} maps to missing unit {au}")));
                }
                if control >= map.len() {
                    map.resize(control + 1, None);
                }
                map[control] = Some(au);
            }
            Ok(map)
        }
        None => {
            // Identity map over existing units.
            Ok(units
                .iter()
                .enumerate()
                .map(|(i, u)| u.as_ref().map(|_| i))
                .collect())
        }
    }
}

/// Check that graph nodes refer to devices that exist.
fn validate_graph_refs(
    conns: &Connections,
    units: &[Option<AudioUnit>],
    container: Option<&AudioUnit>,
) -> Result<(), BuildError> {
    for node in conns.nodes() {
        match node.kind {
            NodeKind::Master | NodeKind::InputInterface => {}
            NodeKind::AudioUnit(au) => {
                let exists = match container {
                    // Nested units resolve against the global unit list,
                    // checked later by containment validation.
                    Some(_) => true,
                    None => units.get(au).and_then(|u| u.as_ref()).is_some(),
                };
                if !exists {
                    return Err(structure(format!("connection to missing unit au_{au:02x}")));
                }
            }
            NodeKind::Processor(proc) => {
                let Some(unit) = container else {
                    return Err(structure(
                        "master graph cannot reference processors directly".to_string(),
                    ));
                };
                if unit.processor(proc).is_none() {
                    return Err(structure(format!(
                        "au_{:02x} references missing processor proc_{proc:02x}",
                        unit.index
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Audio units may nest other units in their graphs; containment must be
/// acyclic for the mixed plan recursion to terminate.
fn check_containment(units: &[Option<AudioUnit>]) -> Result<(), BuildError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        New,
        Reached,
        Visited,
    }

    fn visit(units: &[Option<AudioUnit>], au: usize, marks: &mut [Mark]) -> Result<(), BuildError> {
        match marks[au] {
            Mark::Reached => {
                return Err(BuildError::GraphCycle {
                    node: format!("au_{au:02x}"),
                })
            }
            Mark::Visited => return Ok(()),
            Mark::New => {}
        }
        marks[au] = Mark::Reached;
        if let Some(unit) = units[au].as_ref() {
            for node in unit.connections.nodes() {
                if let NodeKind::AudioUnit(inner) = node.kind {
                    if units.get(inner).and_then(|u| u.as_ref()).is_none() {
                        return Err(BuildError::Structure(format!(
                            "au_{au:02x} nests missing unit au_{inner:02x}"
                        )));
                    }
                    visit(units, inner, marks)?;
                }
            }
        }
        marks[au] = Mark::Visited;
        Ok(())
    }

    let mut marks = vec![Mark::New; units.len()];
    for au in 0..units.len() {
        if marks[au] == Mark::New {
            visit(units, au, &mut marks)?;
        }
    }
    Ok(())
}

/// Assign a flat device id to the master, every unit, its interfaces and
/// processors, in deterministic order.
fn build_device_table(
    units: &[Option<AudioUnit>],
) -> (Vec<DeviceKind>, Vec<Option<AuDeviceIds>>) {
    let mut devices = vec![DeviceKind::Master];
    let mut au_devices: Vec<Option<AuDeviceIds>> = (0..units.len()).map(|_| None).collect();

    for (au_index, unit) in units.iter().enumerate() {
        let Some(unit) = unit.as_ref() else {
            continue;
        };
        let unit_dev = devices.len();
        devices.push(DeviceKind::AudioUnit(au_index));
        let input_dev = devices.len();
        devices.push(DeviceKind::AuInput(au_index));
        let output_dev = devices.len();
        devices.push(DeviceKind::AuOutput(au_index));

        let mut procs = Vec::with_capacity(unit.processors.len());
        for (proc_index, proc) in unit.processors.iter().enumerate() {
            if proc.is_some() {
                procs.push(Some(devices.len()));
                devices.push(DeviceKind::Processor {
                    au: au_index,
                    proc: proc_index,
                });
            } else {
                procs.push(None);
            }
        }

        au_devices[au_index] = Some(AuDeviceIds {
            unit: unit_dev,
            input: input_dev,
            output: output_dev,
            procs,
        });
    }

    (devices, au_devices)
}

fn report_param(reports: &mut Vec<String>, detail: &str) {
    warn!(detail = %detail, "rejected parameter; default stays in effect");
    reports.push(detail.to_string());
}

fn report_rejected(reports: &mut Vec<String>, prefix: &str, col: &str, rejected: usize) {
    if rejected > 0 {
        let detail = format!("{prefix}{col}: rejected {rejected} malformed events");
        warn!(detail = %detail, "rejected events");
        reports.push(detail);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::MemStore;

    fn minimal_store() -> MemStore {
        let mut store = MemStore::new();
        store.put_json("p_connections.json", r#"[["au_00/out_00", "out_00"]]"#);
        store.put_json("au_00/p_manifest.json", r#"{"type": "instrument"}"#);
        store.put_json(
            "au_00/p_connections.json",
            r#"[["proc_00/out_00", "out_00"]]"#,
        );
        store.put_json("au_00/proc_00/p_manifest.json", r#"{"type": "add"}"#);
        store.put_json("au_00/proc_00/p_signal_type.json", r#""voice""#);
        store.put_json("pat_000/p_manifest.json", "{}");
        store.put_json("pat_000/p_length.jsont", "[4, 0]");
        store.put_json(
            "pat_000/col_00/p_events.json",
            r#"[[[0, 0], "note_on", 0.0]]"#,
        );
        store.put_json("song_00/p_manifest.json", "{}");
        store.put_json("song_00/p_order_list.json", "[[0, 0]]");
        store.put_json("song_00/p_tempo.jsonf", "60");
        store
    }

    #[test]
    fn test_minimal_build() {
        let comp = Composition::build(&minimal_store()).unwrap();
        assert!(comp.audio_unit(0).is_some());
        assert!(comp.pattern(0).is_some());
        assert_eq!(comp.first_song().unwrap().tempo, 60.0);
        // Master + unit + two interfaces + one processor.
        assert_eq!(comp.devices().len(), 5);
        assert_eq!(comp.control_au(0), Some(0));
    }

    #[test]
    fn test_missing_manifest_means_missing_entity() {
        let mut store = minimal_store();
        store.remove("au_00/p_manifest.json");
        // The master graph now references a missing unit.
        assert!(Composition::build(&store).is_err());
    }

    #[test]
    fn test_cycle_aborts_build() {
        let mut store = minimal_store();
        store.put_json("au_00/proc_01/p_manifest.json", r#"{"type": "gain"}"#);
        store.put_json("au_00/proc_01/p_signal_type.json", r#""voice""#);
        store.put_json(
            "au_00/p_connections.json",
            r#"[
                ["proc_00/out_00", "proc_01/in_00"],
                ["proc_01/out_00", "proc_00/in_00"],
                ["proc_01/out_00", "out_00"]
            ]"#,
        );
        match Composition::build(&store) {
            Err(BuildError::GraphCycle { node }) => assert!(node.contains("proc_")),
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_param_reported_not_fatal() {
        let mut store = minimal_store();
        store.put_json("au_00/proc_00/p_f_volume.jsonf", r#""loud""#);
        let comp = Composition::build(&store).unwrap();
        assert_eq!(comp.reports().len(), 1);
    }

    #[test]
    fn test_unknown_key_ignored() {
        let mut store = minimal_store();
        store.put_json("au_00/proc_00/p_f_mystery_knob.jsonf", "0.5");
        let comp = Composition::build(&store).unwrap();
        assert!(comp.reports().is_empty());
    }

    #[test]
    fn test_device_table_layout() {
        let comp = Composition::build(&minimal_store()).unwrap();
        let ids = comp.au_device_ids(0).unwrap();
        assert_eq!(comp.device_kind(MASTER_DEVICE), DeviceKind::Master);
        assert_eq!(comp.device_kind(ids.unit), DeviceKind::AudioUnit(0));
        assert_eq!(
            comp.device_kind(ids.procs[0].unwrap()),
            DeviceKind::Processor { au: 0, proc: 0 }
        );
    }
}
