//! Processor declarations and the processor implementation contract
//!
//! A processor is the atomic participant in the signal-flow graph. Its
//! declaration carries the signal type (voice or mixed), per-port voice
//! feature flags, and the concrete DSP implementation behind the
//! [`ProcessorImpl`] trait. Implementations receive typed parameters
//! through [`ProcessorImpl::set_param`] during composition build, keyed
//! by subkeys that may match wildcard patterns.

use crate::device_state::{DeviceThreadState, MixedState};
use crate::param::ParamValue;
use crate::tstamp::Tstamp;
use crate::voice::VoiceState;
use crate::DEVICE_PORTS_MAX;

/// Identity of a concrete processor algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcKind {
    Add,
    SamplePlayer,
    Ks,
    Filter,
    Delay,
    Chorus,
    EnvGen,
    Gain,
}

impl ProcKind {
    pub fn from_name(name: &str) -> Option<ProcKind> {
        let kind = match name {
            "add" => ProcKind::Add,
            "sample" => ProcKind::SamplePlayer,
            "ks" => ProcKind::Ks,
            "filter" => ProcKind::Filter,
            "delay" => ProcKind::Delay,
            "chorus" => ProcKind::Chorus,
            "envgen" => ProcKind::EnvGen,
            "gain" => ProcKind::Gain,
            _ => return None,
        };
        Some(kind)
    }
}

/// Whether a processor participates in per-voice or mixed rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalType {
    Voice,
    Mixed,
}

/// Per-port flags selecting which standard voice controllers modulate the
/// signal at that port.
#[derive(Debug, Clone, Copy)]
pub struct VoiceFeatures {
    pub pitch: bool,
    pub force: bool,
    pub filter: bool,
    pub panning: bool,
    pub cut: bool,
}

impl Default for VoiceFeatures {
    fn default() -> Self {
        VoiceFeatures {
            pitch: true,
            force: true,
            filter: true,
            panning: true,
            cut: true,
        }
    }
}

/// Outcome of routing one parameter key to an implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetResult {
    Applied,
    /// The key matches none of the implementation's patterns; callers
    /// ignore it for forward compatibility.
    Unmatched,
    /// The key matched but the value failed validation; the registered
    /// default stays in effect.
    Invalid(String),
}

/// The uniform contract of every processor algorithm.
///
/// Parameter setters run during composition build only; the render
/// methods run on the audio thread and must not allocate.
pub trait ProcessorImpl: Send + Sync {
    fn kind(&self) -> ProcKind;

    /// The signal type used when the composition does not specify one.
    fn default_signal_type(&self) -> SignalType;

    /// Prepare a voice's processor payload after the common header has
    /// been initialized.
    fn init_voice(&self, _voice: &mut VoiceState) {}

    /// Per-voice scratch requirement in frames, 0 if none.
    fn voice_wb_size(&self, _audio_rate: u32) -> usize {
        0
    }

    /// Render voice signals for `[0, frame_count)` into this device's
    /// voice send buffers. Returns the frame index up to which the voice
    /// must be kept alive; less than `frame_count` means the processor
    /// finished the note internally.
    fn render_voice(
        &self,
        _voice: &mut VoiceState,
        _dts: &mut DeviceThreadState,
        _wbs: &mut crate::work_buffer::WorkBuffers,
        _audio_rate: u32,
        _tempo: f64,
        _frame_count: usize,
    ) -> usize {
        0
    }

    /// Render mixed signals from this device's mixed receive buffers into
    /// its mixed send buffers.
    fn render_mixed(
        &self,
        _state: &mut MixedState,
        _dts: &mut DeviceThreadState,
        _wbs: &mut crate::work_buffer::WorkBuffers,
        _audio_rate: u32,
        _tempo: f64,
        _frame_count: usize,
    ) {
    }

    /// Allocate the mixed-signal history this implementation needs.
    /// Called at player construction and configuration changes.
    fn make_mixed_state(&self, _audio_rate: u32, _buffer_size: usize) -> MixedState {
        MixedState::None
    }

    /// Route a typed parameter to the implementation. `subkey` is the key
    /// relative to the processor's directory.
    fn set_param(&mut self, _subkey: &str, _value: &ParamValue) -> SetResult {
        SetResult::Unmatched
    }

    /// Process-state control variables (mixed rendering).
    fn set_cv_bool(&self, _state: &mut MixedState, _name: &str, _value: bool) {}
    fn set_cv_int(&self, _state: &mut MixedState, _name: &str, _value: i64) {}
    fn set_cv_float(&self, _state: &mut MixedState, _name: &str, _value: f64) {}
    fn set_cv_tstamp(&self, _state: &mut MixedState, _name: &str, _value: Tstamp) {}

    /// Voice-state control variables (per-voice rendering).
    fn set_vcv_bool(&self, _voice: &mut VoiceState, _name: &str, _value: bool) {}
    fn set_vcv_int(&self, _voice: &mut VoiceState, _name: &str, _value: i64) {}
    fn set_vcv_float(&self, _voice: &mut VoiceState, _name: &str, _value: f64) {}
    fn set_vcv_tstamp(&self, _voice: &mut VoiceState, _name: &str, _value: Tstamp) {}
}

/// One processor declaration inside an audio unit.
pub struct Processor {
    pub index: usize,
    pub signal_type: SignalType,
    pub features: [VoiceFeatures; DEVICE_PORTS_MAX],
    pub imp: Box<dyn ProcessorImpl>,
}

impl Processor {
    pub fn new(index: usize, imp: Box<dyn ProcessorImpl>) -> Self {
        let signal_type = imp.default_signal_type();
        Processor {
            index,
            signal_type,
            features: [VoiceFeatures::default(); DEVICE_PORTS_MAX],
            imp,
        }
    }

    pub fn kind(&self) -> ProcKind {
        self.imp.kind()
    }

    /// Whether this processor renders once per chunk rather than once per
    /// voice group.
    pub fn produces_mixed_signal(&self) -> bool {
        self.signal_type == SignalType::Mixed
    }

    pub fn feature(&self, port: usize) -> VoiceFeatures {
        self.features[port]
    }

    pub fn set_feature(&mut self, port: usize, features: VoiceFeatures) {
        self.features[port] = features;
    }
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("index", &self.index)
            .field("kind", &self.kind())
            .field("signal_type", &self.signal_type)
            .finish()
    }
}
