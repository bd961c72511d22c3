//! Audio units
//!
//! An audio unit is a named subgraph: processors wired between an input
//! interface and an output interface, with unit-level parameters that
//! affect every voice it plays (force-release envelope, unit volume) and
//! a bypass flag evaluated by the mixed-signal executor.

use crate::connections::Connections;
use crate::device::Processor;
use crate::envelope::Envelope;

/// What role a unit plays in the composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuKind {
    #[default]
    Instrument,
    Effect,
}

impl AuKind {
    pub fn from_name(name: &str) -> Option<AuKind> {
        match name {
            "instrument" => Some(AuKind::Instrument),
            "effect" => Some(AuKind::Effect),
            _ => None,
        }
    }
}

/// Unit-level parameters consumed by the voice pipeline.
#[derive(Debug, Clone, Default)]
pub struct AuParams {
    /// Scales force after NoteOff; the voice terminates when it reaches
    /// the envelope end.
    pub force_release_env: Option<Envelope>,
    /// Linear gain applied by the unit's processors that honor it.
    pub volume: f64,
}

impl AuParams {
    pub fn new() -> Self {
        AuParams {
            force_release_env: None,
            volume: 1.0,
        }
    }
}

/// One audio unit of the composition.
pub struct AudioUnit {
    pub index: usize,
    pub kind: AuKind,
    pub params: AuParams,
    pub processors: Vec<Option<Processor>>,
    pub connections: Connections,
}

impl AudioUnit {
    pub fn new(index: usize) -> Self {
        AudioUnit {
            index,
            kind: AuKind::Instrument,
            params: AuParams::new(),
            processors: Vec::new(),
            connections: Connections::empty(),
        }
    }

    pub fn processor(&self, index: usize) -> Option<&Processor> {
        self.processors.get(index).and_then(|p| p.as_ref())
    }

    /// Indices of processors that render per-voice signals, in order.
    pub fn voice_processors(&self) -> impl Iterator<Item = &Processor> {
        self.processors
            .iter()
            .flatten()
            .filter(|p| !p.produces_mixed_signal())
    }
}

impl std::fmt::Debug for AudioUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioUnit")
            .field("index", &self.index)
            .field("kind", &self.kind)
            .field("processors", &self.processors.iter().flatten().count())
            .finish()
    }
}
