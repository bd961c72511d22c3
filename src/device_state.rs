//! Per-device mutable state
//!
//! Every device in the composition (master, audio units, unit interfaces,
//! processors) owns one [`DeviceState`]: implementation state that
//! persists across chunks (delay histories, filter memories, bypass
//! flags) plus per-thread port buffers. Port buffers exist only for ports
//! that the connection graph actually wires, and are allocated during
//! player construction, never on the render path.

use crate::processors::chorus::ChorusState;
use crate::processors::delay::DelayState;
use crate::processors::filter::FilterMixedState;
use crate::processors::gain::GainState;
use crate::work_buffer::AudioBuffer;
use crate::DEVICE_PORTS_MAX;

/// Mixed-rendering state of an audio unit.
#[derive(Debug, Clone, Default)]
pub struct AuState {
    pub bypass: bool,
}

/// Chunk-persistent implementation state, tagged by processor kind.
#[derive(Debug)]
pub enum MixedState {
    None,
    Au(AuState),
    Filter(FilterMixedState),
    Delay(DelayState),
    Chorus(ChorusState),
    Gain(GainState),
}

impl MixedState {
    /// Drop accumulated history without touching parameters.
    pub fn clear_history(&mut self) {
        match self {
            MixedState::None | MixedState::Au(_) | MixedState::Gain(_) => {}
            MixedState::Filter(state) => state.clear(),
            MixedState::Delay(state) => state.clear(),
            MixedState::Chorus(state) => state.clear(),
        }
    }
}

/// Which side of a device's mixed port buffers a plan connection
/// addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixedBank {
    Recv,
    Send,
}

/// Port buffers owned by one render thread for one device.
#[derive(Debug, Default)]
pub struct DeviceThreadState {
    voice_recv: Vec<Option<AudioBuffer>>,
    voice_send: Vec<Option<AudioBuffer>>,
    mixed_recv: Vec<Option<AudioBuffer>>,
    mixed_send: Vec<Option<AudioBuffer>>,
}

impl DeviceThreadState {
    pub fn new() -> Self {
        DeviceThreadState {
            voice_recv: none_ports(),
            voice_send: none_ports(),
            mixed_recv: none_ports(),
            mixed_send: none_ports(),
        }
    }

    pub fn ensure_voice_recv(&mut self, port: usize, size: usize) {
        ensure(&mut self.voice_recv, port, size);
    }

    pub fn ensure_voice_send(&mut self, port: usize, size: usize) {
        ensure(&mut self.voice_send, port, size);
    }

    pub fn ensure_mixed_recv(&mut self, port: usize, size: usize) {
        ensure(&mut self.mixed_recv, port, size);
    }

    pub fn ensure_mixed_send(&mut self, port: usize, size: usize) {
        ensure(&mut self.mixed_send, port, size);
    }

    pub fn voice_recv(&self, port: usize) -> Option<&AudioBuffer> {
        self.voice_recv[port].as_ref()
    }

    pub fn voice_recv_mut(&mut self, port: usize) -> Option<&mut AudioBuffer> {
        self.voice_recv[port].as_mut()
    }

    pub fn voice_send(&self, port: usize) -> Option<&AudioBuffer> {
        self.voice_send[port].as_ref()
    }

    pub fn voice_send_mut(&mut self, port: usize) -> Option<&mut AudioBuffer> {
        self.voice_send[port].as_mut()
    }

    pub fn mixed_recv(&self, port: usize) -> Option<&AudioBuffer> {
        self.mixed_recv[port].as_ref()
    }

    pub fn mixed_recv_mut(&mut self, port: usize) -> Option<&mut AudioBuffer> {
        self.mixed_recv[port].as_mut()
    }

    pub fn mixed_send(&self, port: usize) -> Option<&AudioBuffer> {
        self.mixed_send[port].as_ref()
    }

    pub fn mixed_send_mut(&mut self, port: usize) -> Option<&mut AudioBuffer> {
        self.mixed_send[port].as_mut()
    }

    /// Generic access by bank; plans address interface copies through the
    /// send side.
    pub fn mixed_buf(&self, bank: MixedBank, port: usize) -> Option<&AudioBuffer> {
        match bank {
            MixedBank::Recv => self.mixed_recv[port].as_ref(),
            MixedBank::Send => self.mixed_send[port].as_ref(),
        }
    }

    pub fn mixed_buf_mut(&mut self, bank: MixedBank, port: usize) -> Option<&mut AudioBuffer> {
        match bank {
            MixedBank::Recv => self.mixed_recv[port].as_mut(),
            MixedBank::Send => self.mixed_send[port].as_mut(),
        }
    }

    pub fn ensure_mixed(&mut self, bank: MixedBank, port: usize, size: usize) {
        match bank {
            MixedBank::Recv => ensure(&mut self.mixed_recv, port, size),
            MixedBank::Send => ensure(&mut self.mixed_send, port, size),
        }
    }

    /// Borrow a mixed receive port and a mixed send port together, for
    /// in-place effect processing.
    pub fn mixed_io_mut(
        &mut self,
        recv_port: usize,
        send_port: usize,
    ) -> (Option<&AudioBuffer>, Option<&mut AudioBuffer>) {
        (
            self.mixed_recv[recv_port].as_ref(),
            self.mixed_send[send_port].as_mut(),
        )
    }

    /// Borrow a voice receive port and a voice send port together.
    pub fn voice_io_mut(
        &mut self,
        recv_port: usize,
        send_port: usize,
    ) -> (Option<&AudioBuffer>, Option<&mut AudioBuffer>) {
        (
            self.voice_recv[recv_port].as_ref(),
            self.voice_send[send_port].as_mut(),
        )
    }

    /// Invalidate all voice buffers before a voice group renders.
    pub fn invalidate_voice_buffers(&mut self) {
        for buf in self.voice_recv.iter_mut().chain(self.voice_send.iter_mut()) {
            if let Some(buf) = buf {
                buf.invalidate();
            }
        }
    }

    /// Clear all mixed receive and send buffers at the start of a chunk.
    pub fn clear_mixed_buffers(&mut self, frame_count: usize) {
        for buf in self.mixed_recv.iter_mut().chain(self.mixed_send.iter_mut()) {
            if let Some(buf) = buf {
                buf.invalidate();
                buf.clear(0, frame_count);
            }
        }
    }

    /// Sum this device's voice send buffers into its own mixed send
    /// buffers; used for voice plan roots feeding the mixed graph.
    pub fn mix_voice_to_mixed(&mut self, stop: usize) {
        for port in 0..DEVICE_PORTS_MAX {
            let (Some(voice), Some(mixed)) =
                (self.voice_send[port].as_ref(), self.mixed_send[port].as_mut())
            else {
                continue;
            };
            if voice.is_valid() {
                mixed.mix_from(voice, 0, stop);
            }
        }
    }

}

fn none_ports() -> Vec<Option<AudioBuffer>> {
    (0..DEVICE_PORTS_MAX).map(|_| None).collect()
}

fn ensure(ports: &mut [Option<AudioBuffer>], port: usize, size: usize) {
    if ports[port].is_none() {
        ports[port] = Some(AudioBuffer::new(size));
    }
}

/// All mutable state of one device.
#[derive(Debug)]
pub struct DeviceState {
    pub mixed_state: MixedState,
    threads: Vec<DeviceThreadState>,
}

impl DeviceState {
    pub fn new(mixed_state: MixedState, thread_count: usize) -> Self {
        DeviceState {
            mixed_state,
            threads: (0..thread_count).map(|_| DeviceThreadState::new()).collect(),
        }
    }

    pub fn thread(&self, thread_id: usize) -> &DeviceThreadState {
        &self.threads[thread_id]
    }

    pub fn thread_mut(&mut self, thread_id: usize) -> &mut DeviceThreadState {
        &mut self.threads[thread_id]
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// Split borrow: implementation state together with one thread's
    /// port buffers.
    pub fn mixed_and_thread_mut(
        &mut self,
        thread_id: usize,
    ) -> (&mut MixedState, &mut DeviceThreadState) {
        (&mut self.mixed_state, &mut self.threads[thread_id])
    }
}

/// The state table of every device, indexed by device id.
#[derive(Debug, Default)]
pub struct DeviceStates {
    states: Vec<DeviceState>,
}

impl DeviceStates {
    pub fn new(states: Vec<DeviceState>) -> Self {
        DeviceStates { states }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn get(&self, device: usize) -> &DeviceState {
        &self.states[device]
    }

    pub fn get_mut(&mut self, device: usize) -> &mut DeviceState {
        &mut self.states[device]
    }

    /// Borrow one device mutably and another immutably; used when mixing
    /// a sender's port buffers into a receiver's.
    pub fn get_pair_mut(&mut self, recv: usize, send: usize) -> (&mut DeviceState, &DeviceState) {
        assert_ne!(recv, send, "a device does not feed itself");
        if recv < send {
            let (head, tail) = self.states.split_at_mut(send);
            (&mut head[recv], &tail[0])
        } else {
            let (head, tail) = self.states.split_at_mut(recv);
            (&mut tail[0], &head[send])
        }
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut DeviceState> {
        self.states.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mix_voice_to_mixed_sums_only_allocated_ports() {
        let mut dts = DeviceThreadState::new();
        dts.ensure_voice_send(0, 8);
        dts.ensure_mixed_send(0, 8);

        {
            let voice = dts.voice_send_mut(0).unwrap();
            voice.ch[0].clear(0, 8);
            voice.ch[0].contents_mut().fill(0.5);
            voice.ch[0].set_const_start(1);
            voice.ch[1].clear(0, 8);
        }
        dts.mixed_send_mut(0).unwrap().clear(0, 8);

        dts.mix_voice_to_mixed(8);
        let mixed = dts.mixed_send(0).unwrap();
        assert!(mixed.ch[0].contents().iter().all(|&x| x == 0.5));
        assert!(mixed.ch[1].contents().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_pair_borrow() {
        let mut states = DeviceStates::new(vec![
            DeviceState::new(MixedState::None, 1),
            DeviceState::new(MixedState::None, 1),
        ]);
        let (recv, send) = states.get_pair_mut(1, 0);
        recv.thread_mut(0).ensure_mixed_recv(0, 4);
        assert!(send.thread(0).mixed_recv(0).is_none());
    }
}
