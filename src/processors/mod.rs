//! Concrete processor implementations
//!
//! Each module implements one DSP algorithm behind the
//! [`ProcessorImpl`](crate::device::ProcessorImpl) contract. Voice
//! processors render into their device's voice send buffers once per
//! voice group; mixed processors transform mixed receive buffers into
//! mixed send buffers once per chunk.

pub mod additive;
pub mod chorus;
pub mod delay;
pub mod envgen;
pub mod filter;
pub mod gain;
pub mod ks;
pub mod sample_player;

use crate::device::{ProcKind, ProcessorImpl};

/// Construct an implementation by kind.
pub fn new_processor_impl(kind: ProcKind) -> Box<dyn ProcessorImpl> {
    match kind {
        ProcKind::Add => Box::new(additive::AddProc::new()),
        ProcKind::SamplePlayer => Box::new(sample_player::SamplePlayerProc::new()),
        ProcKind::Ks => Box::new(ks::KsProc::new()),
        ProcKind::Filter => Box::new(filter::FilterProc::new()),
        ProcKind::Delay => Box::new(delay::DelayProc::new()),
        ProcKind::Chorus => Box::new(chorus::ChorusProc::new()),
        ProcKind::EnvGen => Box::new(envgen::EnvGenProc::new()),
        ProcKind::Gain => Box::new(gain::GainProc::new()),
    }
}

/// Construct an implementation from its manifest type name.
pub fn new_from_name(name: &str) -> Option<Box<dyn ProcessorImpl>> {
    ProcKind::from_name(name).map(new_processor_impl)
}
