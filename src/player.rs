//! The player
//!
//! A player renders one composition. It owns every piece of mutable
//! state: device states with their port buffers, the voice pool, channel
//! states, work buffer sets, the compiled plans and the playback
//! position. All allocation happens at construction and configuration
//! changes; the render path only reuses what is already there.
//!
//! The timeline driver slices each render request into chunks bounded by
//! the next event, the next tempo slide step and the pattern end, so
//! events always dispatch at exact frame boundaries.

use crate::channel::Channel;
use crate::composition::{Composition, DeviceKind, MASTER_DEVICE};
use crate::control::Slider;
use crate::device_state::{DeviceState, DeviceStates, MixedBank, MixedState};
use crate::dispatch::{dispatch_event, DispatchCtx};
use crate::event::Event;
use crate::mixed_plan::MixedPlan;
use crate::tstamp::{frames_to_index, Tstamp};
use crate::voice_plan::VoicePlan;
use crate::voice_pool::{VoicePool, VoicePoolStats};
use crate::work_buffer::WorkBuffers;
use crate::{CHANNELS_MAX, VOICES_DEFAULT};
use std::sync::Arc;
use tracing::debug;

/// Jumps honored per playback before jump events become no-ops.
const JUMP_LIMIT: u32 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayMode {
    Stopped,
    Playing,
}

/// A stepped linear tempo trajectory.
#[derive(Debug, Clone)]
pub struct TempoSlide {
    pub target: f64,
    pub delta: f64,
    pub steps_left: u32,
    /// Musical time until the next tempo adjustment.
    pub to_next_step: Tstamp,
}

/// Everything describing "where playback is".
#[derive(Debug)]
pub struct PlaybackState {
    pub mode: PlayMode,
    pub song: usize,
    /// Index into the song's order list.
    pub system: usize,
    /// Position within the current pattern.
    pub pat_offset: Tstamp,
    /// Index of the next undispatched event in the current pattern.
    pub event_cursor: usize,
    pub tempo: f64,
    pub tempo_slide: Option<TempoSlide>,
    pub master_volume: Slider,
    pub jump_counter: u32,
    /// Set by a dispatched jump event; consumed by the driver.
    pub jump_to_system: Option<usize>,
}

impl PlaybackState {
    fn new() -> Self {
        PlaybackState {
            mode: PlayMode::Stopped,
            song: 0,
            system: 0,
            pat_offset: Tstamp::zero(),
            event_cursor: 0,
            tempo: 120.0,
            tempo_slide: None,
            master_volume: Slider::new(1.0),
            jump_counter: JUMP_LIMIT,
            jump_to_system: None,
        }
    }
}

/// Render statistics; counters only, never fatal. Serializable so hosts
/// can ship them to their own telemetry.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct PlayerStats {
    pub rendered_frames: u64,
    pub rejected_events: u64,
    pub pool: VoicePoolStats,
}

pub struct Player {
    comp: Arc<Composition>,
    audio_rate: u32,
    buffer_size: usize,
    thread_count: usize,
    voice_count: usize,
    states: DeviceStates,
    pool: VoicePool,
    channels: Vec<Channel>,
    work_buffers: Vec<WorkBuffers>,
    voice_plans: Vec<VoicePlan>,
    mixed_plan: MixedPlan,
    playback: PlaybackState,
    group_scratch: Vec<u64>,
    rejected_events: u64,
    rendered_frames: u64,
}

impl Player {
    pub fn new(
        comp: Arc<Composition>,
        audio_rate: u32,
        buffer_size: usize,
    ) -> Result<Player, String> {
        if audio_rate == 0 {
            return Err("audio rate must be positive".to_string());
        }
        if buffer_size == 0 {
            return Err("buffer size must be positive".to_string());
        }

        let mut player = Player {
            comp,
            audio_rate,
            buffer_size,
            thread_count: 1,
            voice_count: VOICES_DEFAULT,
            states: DeviceStates::default(),
            pool: VoicePool::new(VOICES_DEFAULT),
            channels: (0..CHANNELS_MAX).map(|i| Channel::new(i as u8)).collect(),
            work_buffers: Vec::new(),
            voice_plans: Vec::new(),
            mixed_plan: MixedPlan::default(),
            playback: PlaybackState::new(),
            group_scratch: Vec::with_capacity(VOICES_DEFAULT),
            rejected_events: 0,
            rendered_frames: 0,
        };
        player.configure();
        Ok(player)
    }

    /// Rebuild plans, device states and buffers. Resets playback.
    fn configure(&mut self) {
        let comp = Arc::clone(&self.comp);

        self.mixed_plan = MixedPlan::build(&comp);
        let unit_count = comp
            .audio_units()
            .map(|unit| unit.index + 1)
            .max()
            .unwrap_or(0);
        self.voice_plans = (0..unit_count)
            .map(|au| VoicePlan::build(&comp, au))
            .collect();

        // Device states with kind-appropriate implementation state.
        let states: Vec<DeviceState> = comp
            .devices()
            .iter()
            .map(|kind| {
                let mixed_state = match kind {
                    DeviceKind::AudioUnit(_) => MixedState::Au(Default::default()),
                    DeviceKind::Processor { au, proc } => comp
                        .audio_unit(*au)
                        .and_then(|unit| unit.processor(*proc))
                        .map(|p| p.imp.make_mixed_state(self.audio_rate, self.buffer_size))
                        .unwrap_or(MixedState::None),
                    _ => MixedState::None,
                };
                DeviceState::new(mixed_state, self.thread_count)
            })
            .collect();
        self.states = DeviceStates::new(states);

        self.allocate_port_buffers();

        self.work_buffers = (0..self.thread_count)
            .map(|_| WorkBuffers::new(self.buffer_size))
            .collect();

        let scratch = comp
            .audio_units()
            .flat_map(|unit| unit.processors.iter().flatten())
            .map(|proc| proc.imp.voice_wb_size(self.audio_rate))
            .max()
            .unwrap_or(0);
        self.pool = VoicePool::new(self.voice_count);
        self.pool.reserve_scratch(scratch);
        self.group_scratch = Vec::with_capacity(self.voice_count);

        for channel in &mut self.channels {
            channel.reset();
        }
        self.playback = PlaybackState::new();

        debug!(
            audio_rate = self.audio_rate,
            buffer_size = self.buffer_size,
            devices = self.states.len(),
            "player configured"
        );
    }

    /// Create exactly the port buffers the plans reference.
    fn allocate_port_buffers(&mut self) {
        let size = self.buffer_size;

        for plan in &self.voice_plans {
            for task in plan.tasks() {
                for thread in 0..self.thread_count {
                    let dts = self.states.get_mut(task.device).thread_mut(thread);
                    dts.ensure_voice_send(0, size);
                    if task.is_connected_to_mixed {
                        dts.ensure_mixed_send(0, size);
                    }
                }
                for conn in &task.conns {
                    for thread in 0..self.thread_count {
                        self.states
                            .get_mut(conn.recv_dev)
                            .thread_mut(thread)
                            .ensure_voice_recv(conn.recv_port, size);
                        self.states
                            .get_mut(conn.send_dev)
                            .thread_mut(thread)
                            .ensure_voice_send(conn.send_port, size);
                    }
                }
            }
        }

        for task in self.mixed_plan.tasks() {
            for conn in task.conns.iter().chain(task.bypass_conns.iter()) {
                self.states
                    .get_mut(conn.recv_dev)
                    .thread_mut(0)
                    .ensure_mixed(conn.recv_bank, conn.recv_port, size);
                self.states
                    .get_mut(conn.send_dev)
                    .thread_mut(0)
                    .ensure_mixed(conn.send_bank, conn.send_port, size);
            }
        }

        // The master output pair exists even in a silent composition.
        self.states
            .get_mut(MASTER_DEVICE)
            .thread_mut(0)
            .ensure_mixed(MixedBank::Recv, 0, size);
    }

    pub fn audio_rate(&self) -> u32 {
        self.audio_rate
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn set_audio_rate(&mut self, hz: u32) {
        if hz > 0 {
            self.audio_rate = hz;
            self.configure();
        }
    }

    pub fn set_buffer_size(&mut self, frames: u32) {
        if frames > 0 {
            self.buffer_size = frames as usize;
            self.configure();
        }
    }

    /// Thread state is structured per thread id; this build executes on
    /// one thread, so the count only sizes the state tables.
    pub fn set_thread_count(&mut self, n: u32) {
        self.thread_count = (n.max(1)) as usize;
        self.configure();
    }

    /// Reconfigure the voice pool capacity. Resets player state.
    pub fn set_voice_count(&mut self, n: usize) {
        self.voice_count = n.max(1);
        self.configure();
    }

    pub fn stats(&self) -> PlayerStats {
        PlayerStats {
            rendered_frames: self.rendered_frames,
            rejected_events: self.rejected_events,
            pool: self.pool.stats(),
        }
    }

    pub fn playback(&self) -> &PlaybackState {
        &self.playback
    }

    pub fn active_voice_count(&self) -> usize {
        self.pool.active_count()
    }

    /// Start playback from the top of the first song.
    pub fn play(&mut self) {
        self.pool.reset_all();
        for channel in &mut self.channels {
            channel.reset();
        }
        for state in self.states.iter_mut() {
            state.mixed_state.clear_history();
            if let MixedState::Au(au_state) = &mut state.mixed_state {
                au_state.bypass = false;
            }
        }

        self.playback = PlaybackState::new();
        if let Some(song_index) = self.comp.first_song_index() {
            self.playback.song = song_index;
            if let Some(song) = self.comp.song(song_index) {
                self.playback.tempo = song.tempo;
            }
            self.playback.mode = PlayMode::Playing;
        }
    }

    pub fn stop(&mut self) {
        self.playback.mode = PlayMode::Stopped;
        self.pool.reset_all();
    }

    /// Parse and inject one serialized event. The payload uses the same
    /// form as a pattern column entry: `[[beats, rem], "name", value]`;
    /// the position is ignored for realtime delivery. Returns false and
    /// counts a rejection for malformed input.
    pub fn fire_event_str(&mut self, channel: Option<u8>, json: &str) -> bool {
        let parsed = serde_json::from_str::<serde_json::Value>(json)
            .ok()
            .and_then(|value| Event::from_json(&value, channel));
        match parsed {
            Some(event) => {
                self.fire_event(&event);
                true
            }
            None => {
                self.rejected_events += 1;
                false
            }
        }
    }

    /// Inject one event immediately (realtime use, between renders).
    pub fn fire_event(&mut self, event: &Event) {
        let comp = Arc::clone(&self.comp);
        let mut ctx = DispatchCtx {
            comp: &comp,
            pool: &mut self.pool,
            channels: &mut self.channels,
            states: &mut self.states,
            playback: &mut self.playback,
            audio_rate: self.audio_rate,
            rejected_events: &mut self.rejected_events,
        };
        dispatch_event(&mut ctx, event);
    }

    /// Render up to `min(slice_len, buffer_size)` frames of stereo output.
    /// A short count means the composition ended.
    pub fn render(&mut self, out_left: &mut [f32], out_right: &mut [f32]) -> usize {
        let frames = out_left.len().min(out_right.len()).min(self.buffer_size);
        let mut rendered = 0;

        while rendered < frames && self.playback.mode == PlayMode::Playing {
            let Some(chunk) = self.prepare_chunk(frames - rendered) else {
                break;
            };
            self.render_chunk(
                chunk,
                &mut out_left[rendered..rendered + chunk],
                &mut out_right[rendered..rendered + chunk],
            );
            self.advance(chunk);
            rendered += chunk;
        }

        self.rendered_frames += rendered as u64;
        rendered
    }

    /// Dispatch everything due at the current position and return the
    /// next chunk length. `None` means playback ended.
    fn prepare_chunk(&mut self, max_frames: usize) -> Option<usize> {
        let comp = Arc::clone(&self.comp);

        loop {
            if self.playback.mode != PlayMode::Playing {
                return None;
            }

            // A dispatched jump takes effect before anything else.
            if let Some(target) = self.playback.jump_to_system.take() {
                self.playback.system = target;
                self.playback.pat_offset = Tstamp::zero();
                self.playback.event_cursor = 0;
            }

            let Some(song) = comp.song(self.playback.song) else {
                self.playback.mode = PlayMode::Stopped;
                return None;
            };
            let Some(instance) = song.order.get(self.playback.system) else {
                self.playback.mode = PlayMode::Stopped;
                return None;
            };
            let Some(pattern) = comp.pattern(instance.pattern) else {
                // A dangling pattern reference skips to the next system.
                self.playback.system += 1;
                self.playback.pat_offset = Tstamp::zero();
                self.playback.event_cursor = 0;
                continue;
            };

            // Dispatch events due at this position.
            let mut jumped = false;
            while self.playback.event_cursor < pattern.events().len() {
                let event = &pattern.events()[self.playback.event_cursor];
                let distance = event.pos - self.playback.pat_offset;
                let to_event =
                    frames_to_index(distance.to_frames(self.playback.tempo, self.audio_rate));
                if to_event > 0 {
                    break;
                }
                self.playback.event_cursor += 1;

                let event = event.clone();
                let mut ctx = DispatchCtx {
                    comp: &comp,
                    pool: &mut self.pool,
                    channels: &mut self.channels,
                    states: &mut self.states,
                    playback: &mut self.playback,
                    audio_rate: self.audio_rate,
                    rejected_events: &mut self.rejected_events,
                };
                dispatch_event(&mut ctx, &event);

                if self.playback.jump_to_system.is_some() {
                    jumped = true;
                    break;
                }
            }
            if jumped {
                continue;
            }

            // Apply a due tempo slide step.
            if let Some(slide) = self.playback.tempo_slide.as_mut() {
                let to_step =
                    frames_to_index(slide.to_next_step.to_frames(self.playback.tempo, self.audio_rate));
                if to_step <= 0 {
                    self.playback.tempo += slide.delta;
                    slide.steps_left -= 1;
                    if slide.steps_left == 0 {
                        self.playback.tempo = slide.target;
                        self.playback.tempo_slide = None;
                    } else {
                        slide.to_next_step = crate::dispatch::TEMPO_SLIDE_STEP;
                    }
                    continue;
                }
            }

            // Pattern end?
            let to_end = frames_to_index(
                (pattern.length() - self.playback.pat_offset)
                    .to_frames(self.playback.tempo, self.audio_rate),
            );
            if to_end <= 0 {
                self.playback.system += 1;
                self.playback.pat_offset = Tstamp::zero();
                self.playback.event_cursor = 0;
                continue;
            }

            // Bound the chunk.
            let mut chunk = max_frames.min(to_end as usize);
            if self.playback.event_cursor < pattern.events().len() {
                let event = &pattern.events()[self.playback.event_cursor];
                let to_event = frames_to_index(
                    (event.pos - self.playback.pat_offset)
                        .to_frames(self.playback.tempo, self.audio_rate),
                );
                chunk = chunk.min(to_event.max(1) as usize);
            }
            if let Some(slide) = self.playback.tempo_slide.as_ref() {
                let to_step = frames_to_index(
                    slide
                        .to_next_step
                        .to_frames(self.playback.tempo, self.audio_rate),
                );
                chunk = chunk.min(to_step.max(1) as usize);
            }

            return Some(chunk.max(1));
        }
    }

    /// Advance the playback position across a rendered chunk.
    fn advance(&mut self, chunk: usize) {
        let step = Tstamp::from_frames(chunk as f64, self.playback.tempo, self.audio_rate);
        self.playback.pat_offset += step;
        if let Some(slide) = self.playback.tempo_slide.as_mut() {
            slide.to_next_step -= step;
            if slide.to_next_step < Tstamp::zero() {
                slide.to_next_step = Tstamp::zero();
            }
        }
    }

    /// Render one event-free chunk.
    fn render_chunk(&mut self, chunk: usize, out_left: &mut [f32], out_right: &mut [f32]) {
        let comp = Arc::clone(&self.comp);

        for state in self.states.iter_mut() {
            for thread in 0..self.thread_count {
                state.thread_mut(thread).clear_mixed_buffers(chunk);
            }
        }

        // Voice groups in ascending group id order.
        let mut groups = std::mem::take(&mut self.group_scratch);
        self.pool.collect_active_groups(&mut groups);
        for &group_id in &groups {
            let Some(au) = self
                .pool
                .voices()
                .iter()
                .find(|v| v.group_id == group_id && v.prio != crate::voice::VoicePrio::Inactive)
                .and_then(|v| match comp.device_kind(v.device) {
                    DeviceKind::Processor { au, .. } => Some(au),
                    _ => None,
                })
            else {
                continue;
            };
            let Some(plan) = self.voice_plans.get_mut(au) else {
                continue;
            };

            plan.execute(
                &comp,
                &mut self.states,
                0,
                &mut self.pool,
                group_id,
                comp.tuning(),
                &mut self.work_buffers[0],
                self.audio_rate,
                self.playback.tempo,
                chunk,
                true,
            );
        }
        self.group_scratch = groups;
        self.pool.reap_inactive();

        self.mixed_plan.execute(
            &comp,
            &mut self.states,
            &mut self.work_buffers[0],
            self.audio_rate,
            self.playback.tempo,
            chunk,
        );

        // Master output with the global volume trajectory.
        let master = self.states.get(MASTER_DEVICE).thread(0);
        let volume = &mut self.playback.master_volume;
        match master.mixed_buf(MixedBank::Recv, 0) {
            Some(buf) => {
                let ldata = buf.ch[0].contents();
                let rdata = buf.ch[1].contents();
                if volume.is_active() {
                    for i in 0..chunk {
                        let gain = volume.step() as f32;
                        out_left[i] = ldata[i] * gain;
                        out_right[i] = rdata[i] * gain;
                    }
                } else {
                    let gain = volume.value() as f32;
                    out_left[..chunk].copy_from_slice(&ldata[..chunk]);
                    out_right[..chunk].copy_from_slice(&rdata[..chunk]);
                    if gain != 1.0 {
                        for frame in out_left[..chunk].iter_mut() {
                            *frame *= gain;
                        }
                        for frame in out_right[..chunk].iter_mut() {
                            *frame *= gain;
                        }
                    }
                }
            }
            None => {
                out_left[..chunk].fill(0.0);
                out_right[..chunk].fill(0.0);
            }
        }
    }
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("audio_rate", &self.audio_rate)
            .field("buffer_size", &self.buffer_size)
            .field("mode", &self.playback.mode)
            .finish()
    }
}
