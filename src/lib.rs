//! # Cadenza - Composition Rendering and Synthesis Engine
//!
//! Cadenza renders a declarative, tree-structured composition description
//! into a stream of stereo audio samples. A composition specifies patterns
//! (timelines of note and control events), audio units containing DSP
//! processors, and a connection graph wiring processor ports into a
//! signal-flow DAG that terminates at the master output.
//!
//! ## Core Features
//!
//! - **Sample-Accurate Sequencing**: pattern events dispatch at exact frame
//!   positions, with mid-chunk tempo changes bounding the render loop
//! - **Voice Pool**: fixed-capacity polyphony with priority-based stealing
//!   and per-channel foreground group tracking
//! - **Compiled Signal Flow**: the device graph is compiled into separate
//!   per-voice and mixed-signal execution plans before playback
//! - **Per-Voice DSP Control**: pitch, force, filter and panning controls
//!   with linear slides and sinusoidal oscillation, attack/release ramps
//! - **Processor Library**: additive synthesis, sample playback, plucked
//!   string, state-variable filter, delay, chorus, envelope, gain
//! - **Keyed Parameters**: processors consume typed values from a
//!   hierarchical parameter store with hex-indexed wildcard keys
//!
//! ## Quick Start
//!
//! ```rust
//! use cadenza::param::MemStore;
//! use cadenza::composition::Composition;
//! use cadenza::player::Player;
//! use std::sync::Arc;
//!
//! // A composition with one additive instrument playing a single note
//! let mut store = MemStore::new();
//! store.put_json("p_connections.json", r#"[["au_00/out_00", "out_00"]]"#);
//! store.put_json("p_control_map.json", "[[0, 0]]");
//! store.put_json("au_00/p_manifest.json", r#"{"type": "instrument"}"#);
//! store.put_json(
//!     "au_00/p_connections.json",
//!     r#"[["proc_00/out_00", "out_00"]]"#,
//! );
//! store.put_json("au_00/proc_00/p_manifest.json", r#"{"type": "add"}"#);
//! store.put_json("au_00/proc_00/p_signal_type.json", r#""voice""#);
//! store.put_json("pat_000/p_manifest.json", "{}");
//! store.put_json("pat_000/p_length.jsont", "[4, 0]");
//! store.put_json(
//!     "pat_000/col_00/p_events.json",
//!     r#"[[[0, 0], "note_on", 0.0]]"#,
//! );
//! store.put_json("song_00/p_manifest.json", "{}");
//! store.put_json("song_00/p_order_list.json", "[[0, 0]]");
//! store.put_json("song_00/p_tempo.jsonf", "120");
//!
//! let composition = Arc::new(Composition::build(&store).unwrap());
//! let mut player = Player::new(composition, 48000, 1024).unwrap();
//! player.play();
//!
//! let mut left = vec![0.0f32; 1024];
//! let mut right = vec![0.0f32; 1024];
//! let rendered = player.render(&mut left, &mut right);
//! assert_eq!(rendered, 1024);
//! ```
//!
//! ## Architecture
//!
//! ### Main Modules
//!
//! - [`player`] - Playback state, timeline driver and the render loop
//! - [`composition`] - Immutable composition root built from the store
//! - [`voice_plan`] / [`mixed_plan`] - Compiled signal-flow execution plans
//! - [`voice_pool`] - Voice allocation, stealing and group iteration
//! - [`processors`] - Concrete DSP processor implementations
//! - [`connections`] - Device graph model with cycle detection
//! - [`param`] - Parameter store contract and typed accessors
//!
//! ### Signal Flow
//!
//! 1. **Patterns** supply timed events; the timeline driver slices the
//!    requested frame range into event-free chunks
//! 2. **The dispatcher** applies events at chunk boundaries, allocating
//!    voice groups for notes and mutating channel and playback state
//! 3. **The voice plan** runs once per active voice group, rendering
//!    voice signals into per-processor send buffers
//! 4. **Voice signals** of roots connected to the mixed graph are summed
//!    into mixed-signal receive buffers
//! 5. **The mixed plan** runs filters, delays and audio-unit interfaces in
//!    dependency order, honoring bypass
//! 6. **The master output** is copied to the host buffers with the global
//!    volume applied

pub mod analysis;
pub mod audio_unit;
pub mod channel;
pub mod composition;
pub mod connections;
pub mod control;
pub mod device;
pub mod device_state;
pub mod dispatch;
pub mod envelope;
pub mod event;
pub mod key;
pub mod mixed_plan;
pub mod param;
pub mod pattern;
pub mod player;
pub mod processors;
pub mod sample;
pub mod tstamp;
pub mod tuning;
pub mod value;
pub mod voice;
pub mod voice_plan;
pub mod voice_pool;
pub mod work_buffer;

/// Maximum number of voice columns in a pattern; also the channel count.
pub const COLUMNS_MAX: usize = 64;

/// Maximum number of channels; equals the per-pattern voice column count.
pub const CHANNELS_MAX: usize = COLUMNS_MAX;

/// Maximum number of audio units in a composition.
pub const INSTRUMENTS_MAX: usize = 256;

/// Maximum number of processors inside one audio unit.
pub const PROCESSORS_MAX: usize = 256;

/// Number of input/output ports on every device.
pub const DEVICE_PORTS_MAX: usize = 8;

/// Maximum number of patterns in a composition.
pub const PATTERNS_MAX: usize = 1024;

/// Maximum number of songs in a composition.
pub const SONGS_MAX: usize = 256;

/// Maximum number of notes in a tuning table.
pub const TUNING_TABLE_NOTES: usize = 128;

/// Maximum number of tones in the additive processor.
pub const HARMONICS_MAX: usize = 32;

/// Maximum number of hexadecimal indices extracted from one key.
pub const KEY_INDICES_MAX: usize = 8;

/// Default voice pool capacity.
pub const VOICES_DEFAULT: usize = 64;

/// Length of the linear release ramp applied when a voice is deactivated.
pub const RELEASE_RAMP_FRAMES: u32 = 96;

/// Length of the linear attack ramp applied on the first render of a voice.
pub const ATTACK_RAMP_FRAMES: u32 = 96;
