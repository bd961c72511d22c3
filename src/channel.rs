//! Per-channel state
//!
//! A channel tracks its foreground voice group, the control (instrument)
//! new notes resolve through, and the persisted control values that
//! freshly allocated voices inherit. Channel parameter events update
//! both the channel templates and the foreground group, so held notes
//! follow along.

use crate::control::FloatControl;
use crate::tstamp::Tstamp;
use crate::voice::CUTOFF_BYPASS_CENTS;
use rand::rngs::SmallRng;
use rand::SeedableRng;

#[derive(Debug)]
pub struct Channel {
    pub id: u8,
    /// The group spawned by this channel's most recent NoteOn.
    pub fg_group: Option<u64>,
    /// Audio unit of the foreground group.
    pub fg_au: Option<usize>,
    /// Control index used to resolve the next NoteOn.
    pub control: usize,
    pub mute: bool,
    /// Default musical length for slides started by channel events.
    pub slide_length: Tstamp,
    pub force: FloatControl,
    pub panning: FloatControl,
    pub cutoff: FloatControl,
    pub resonance: FloatControl,
    pub rand: SmallRng,
}

impl Channel {
    pub fn new(id: u8) -> Self {
        Channel {
            id,
            fg_group: None,
            fg_au: None,
            control: 0,
            mute: false,
            slide_length: Tstamp::zero(),
            force: FloatControl::new(1.0),
            panning: FloatControl::new(0.0),
            cutoff: FloatControl::new(CUTOFF_BYPASS_CENTS),
            resonance: FloatControl::new(1.0),
            rand: SmallRng::seed_from_u64(u64::from(id)),
        }
    }

    /// Reset to note-on defaults; used on playback start.
    pub fn reset(&mut self) {
        let id = self.id;
        *self = Channel::new(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_restores_defaults() {
        let mut ch = Channel::new(3);
        ch.control = 7;
        ch.mute = true;
        ch.force.set_value(0.5);
        ch.reset();
        assert_eq!(ch.id, 3);
        assert_eq!(ch.control, 0);
        assert!(!ch.mute);
        assert_eq!(ch.force.value(), 1.0);
    }
}
