//! The voice pool
//!
//! A fixed-capacity allocator of voices. A NoteOn allocates one voice per
//! voice-signal processor of the target audio unit, all under a freshly
//! minted group id; the group advances in lockstep and is released and
//! deactivated as a unit. When no slot is free the pool steals the lowest
//! priority voice, breaking ties by oldest group id; stealing a
//! foreground voice is a last resort and is surfaced through a counter.

use crate::voice::{Voice, VoicePrio};
use serde::Serialize;

/// Pool statistics reported to the embedder; never fatal.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct VoicePoolStats {
    /// Times a foreground voice had to be stolen because the pool was
    /// fully occupied by foreground groups.
    pub exhausted: u64,
}

#[derive(Debug)]
pub struct VoicePool {
    voices: Vec<Voice>,
    group_counter: u64,
    stats: VoicePoolStats,
}

impl VoicePool {
    pub fn new(capacity: usize) -> Self {
        VoicePool {
            voices: (0..capacity.max(1)).map(|_| Voice::new()).collect(),
            group_counter: 0,
            stats: VoicePoolStats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.voices.len()
    }

    pub fn stats(&self) -> VoicePoolStats {
        self.stats
    }

    /// Resize every voice's scratch buffer; configuration time only.
    pub fn reserve_scratch(&mut self, frames: usize) {
        for voice in &mut self.voices {
            voice.state.scratch = vec![0.0; frames];
        }
    }

    /// Mint the group id for the next NoteOn.
    pub fn new_group_id(&mut self) -> u64 {
        self.group_counter += 1;
        self.group_counter
    }

    /// Allocate a voice for `group_id` in processor device `device`.
    ///
    /// Preference order: an inactive slot, then the background voice with
    /// the oldest group, then the foreground voice with the oldest group
    /// (counted as pool exhaustion).
    pub fn allocate(&mut self, group_id: u64, device: usize, channel: u8) -> &mut Voice {
        let slot = self
            .voices
            .iter()
            .enumerate()
            .min_by_key(|(_, v)| (v.prio, v.group_id))
            .map(|(i, _)| i)
            .expect("pool capacity is at least one");

        if self.voices[slot].prio == VoicePrio::Foreground {
            self.stats.exhausted += 1;
        }

        let voice = &mut self.voices[slot];
        voice.prio = VoicePrio::Foreground;
        voice.group_id = group_id;
        voice.device = device;
        voice.channel = channel;
        voice.state.reset(group_id);
        voice
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    /// The voice of `group_id` rendering in `device`, if alive.
    pub fn find_voice_mut(&mut self, group_id: u64, device: usize) -> Option<&mut Voice> {
        self.voices.iter_mut().find(|v| {
            v.prio != VoicePrio::Inactive && v.group_id == group_id && v.device == device
        })
    }

    /// Iterate all live voices of one group.
    pub fn group_voices_mut(&mut self, group_id: u64) -> impl Iterator<Item = &mut Voice> {
        self.voices
            .iter_mut()
            .filter(move |v| v.prio != VoicePrio::Inactive && v.group_id == group_id)
    }

    /// Mark a group released: NoteOff semantics.
    pub fn release_group(&mut self, group_id: u64) {
        for voice in self.group_voices_mut(group_id) {
            voice.state.note_on = false;
            voice.prio = VoicePrio::Background;
        }
    }

    /// Demote a superseded foreground group without releasing it.
    pub fn demote_group(&mut self, group_id: u64) {
        for voice in self.group_voices_mut(group_id) {
            if voice.prio == VoicePrio::Foreground {
                voice.prio = VoicePrio::Background;
            }
        }
    }

    /// Deactivate every voice of a group.
    pub fn deactivate_group(&mut self, group_id: u64) {
        for voice in self.group_voices_mut(group_id) {
            voice.prio = VoicePrio::Inactive;
            voice.state.active = false;
        }
    }

    /// Free any voice whose state went inactive during rendering, and
    /// drop groups that no longer have any active voice.
    pub fn reap_inactive(&mut self) {
        for voice in &mut self.voices {
            if voice.prio != VoicePrio::Inactive && !voice.state.active {
                voice.prio = VoicePrio::Inactive;
            }
        }
    }

    /// Collect live group ids in ascending order into `out` (cleared
    /// first); ascending order keeps group iteration deterministic.
    pub fn collect_active_groups(&self, out: &mut Vec<u64>) {
        out.clear();
        for voice in &self.voices {
            if voice.prio != VoicePrio::Inactive {
                out.push(voice.group_id);
            }
        }
        out.sort_unstable();
        out.dedup();
    }

    pub fn active_count(&self) -> usize {
        self.voices
            .iter()
            .filter(|v| v.prio != VoicePrio::Inactive)
            .count()
    }

    pub fn reset_all(&mut self) {
        for voice in &mut self.voices {
            voice.prio = VoicePrio::Inactive;
            voice.state.active = false;
            voice.group_id = 0;
        }
    }
}
