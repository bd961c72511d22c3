//! Voices and the per-voice render pipeline
//!
//! A voice is one sounding note inside one voice-signal processor. Its
//! state is a common header (activity, playback position, the standard
//! pitch/force/filter/panning controls, a random source) followed by a
//! processor-specific payload. Payloads are a tagged enum with fixed-size
//! variants, so reassigning a voice never allocates.
//!
//! [`process_voice`] is the pipeline every voice renders through: control
//! trajectories, the cut fast path, the implementation's render routine,
//! force scaling, release and attack ramps, the voice filter, and
//! panning.

use crate::audio_unit::AuParams;
use crate::control::FloatControl;
use crate::device::Processor;
use crate::device_state::DeviceThreadState;
use crate::processors::additive::AddVoice;
use crate::processors::envgen::EnvGenVoice;
use crate::processors::filter::{FilterVoice, Svf};
use crate::processors::ks::KsVoice;
use crate::processors::sample_player::SampleVoice;
use crate::tuning::TuningTable;
use crate::work_buffer::{wb, WorkBuffers};
use crate::{ATTACK_RAMP_FRAMES, RELEASE_RAMP_FRAMES};
use rand::rngs::SmallRng;
use rand::SeedableRng;

/// Cutoff control values at or above this many cents bypass the voice
/// filter entirely.
pub const CUTOFF_BYPASS_CENTS: f64 = 12000.0;

/// Scheduling priority of a voice slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VoicePrio {
    Inactive,
    /// Released or superseded; still sounding.
    Background,
    /// The newest note of its channel.
    Foreground,
}

/// Processor-specific voice payload.
#[derive(Debug, Clone)]
pub enum VoicePayload {
    None,
    Add(AddVoice),
    Sample(SampleVoice),
    Ks(KsVoice),
    EnvGen(EnvGenVoice),
    Filter(FilterVoice),
}

/// The per-voice state header plus payload.
#[derive(Debug, Clone)]
pub struct VoiceState {
    pub active: bool,
    pub note_on: bool,
    /// Frames rendered since NoteOn; drives the attack ramp.
    pub frames_rendered: u64,
    /// Frames rendered since NoteOff.
    pub rel_frames: u64,
    /// Release ramp progress in [0, 1].
    pub release_progress: f64,
    /// Generic playback position (whole frames plus remainder).
    pub pos: u64,
    pub pos_rem: f64,
    pub pitch: FloatControl,
    pub force: FloatControl,
    pub cutoff: FloatControl,
    pub resonance: FloatControl,
    pub panning: FloatControl,
    pub hit: Option<u16>,
    pub rand: SmallRng,
    /// Voice-level filter memory, one per channel.
    pub filter: [Svf; 2],
    /// Scratch for implementations that need per-voice history; sized by
    /// the pool at configuration time.
    pub scratch: Vec<f32>,
    pub payload: VoicePayload,
}

impl VoiceState {
    pub fn new() -> Self {
        VoiceState {
            active: false,
            note_on: false,
            frames_rendered: 0,
            rel_frames: 0,
            release_progress: 0.0,
            pos: 0,
            pos_rem: 0.0,
            pitch: FloatControl::new(0.0),
            force: FloatControl::new(1.0),
            cutoff: FloatControl::new(CUTOFF_BYPASS_CENTS),
            resonance: FloatControl::new(1.0),
            panning: FloatControl::new(0.0),
            hit: None,
            rand: SmallRng::seed_from_u64(0),
            filter: [Svf::new(), Svf::new()],
            payload: VoicePayload::None,
            scratch: Vec::new(),
        }
    }

    /// Reinitialize the header for a fresh note. Controls are inherited
    /// from the channel by the dispatcher afterwards.
    pub fn reset(&mut self, rand_seed: u64) {
        self.active = true;
        self.note_on = true;
        self.frames_rendered = 0;
        self.rel_frames = 0;
        self.release_progress = 0.0;
        self.pos = 0;
        self.pos_rem = 0.0;
        self.hit = None;
        self.rand = SmallRng::seed_from_u64(rand_seed);
        self.filter = [Svf::new(), Svf::new()];
        self.payload = VoicePayload::None;
        self.scratch.fill(0.0);
    }
}

impl Default for VoiceState {
    fn default() -> Self {
        VoiceState::new()
    }
}

/// One slot in the voice pool.
#[derive(Debug)]
pub struct Voice {
    pub prio: VoicePrio,
    pub group_id: u64,
    /// Device id of the processor this voice renders in.
    pub device: usize,
    /// Channel that spawned the voice.
    pub channel: u8,
    pub state: VoiceState,
}

impl Voice {
    pub fn new() -> Self {
        Voice {
            prio: VoicePrio::Inactive,
            group_id: 0,
            device: 0,
            channel: 0,
            state: VoiceState::new(),
        }
    }
}

impl Default for Voice {
    fn default() -> Self {
        Voice::new()
    }
}

/// Render one voice through its processor, applying the standard controls
/// around the implementation's render routine.
///
/// Returns the frame index up to which the voice must be kept alive; 0
/// means the voice ended before producing anything this chunk.
#[allow(clippy::too_many_arguments)]
pub fn process_voice(
    proc: &Processor,
    au: &AuParams,
    state: &mut VoiceState,
    tuning: &TuningTable,
    dts: &mut DeviceThreadState,
    wbs: &mut WorkBuffers,
    audio_rate: u32,
    tempo: f64,
    frame_count: usize,
) -> usize {
    if !state.active {
        return 0;
    }

    let features = proc.feature(0);
    let has_force_rel_env = au.force_release_env.is_some() && features.force;

    // Cut before rendering anything: a voice released before producing a
    // single frame needs no ramp.
    if !state.note_on && state.frames_rendered == 0 && features.cut && !has_force_rel_env {
        state.active = false;
        return 0;
    }

    if frame_count == 0 {
        return 0;
    }

    // Control trajectories.
    if features.pitch {
        state.pitch.fill(wbs.buffer_mut(wb::PITCH), 0, frame_count, audio_rate);
        fill_freqs(wbs, tuning, frame_count);
    } else {
        let freq_wb = wbs.buffer_mut(wb::FREQ);
        freq_wb.contents_mut()[..frame_count].fill(440.0);
        freq_wb.mark_valid();
        freq_wb.set_const_start(1);
    }

    let mut process_stop = frame_count;
    let mut deactivate_after = false;

    if features.force {
        state.force.fill(wbs.buffer_mut(wb::FORCE), 0, frame_count, audio_rate);
        if !state.note_on {
            if let Some(env) = au.force_release_env.as_ref() {
                let force_stop =
                    apply_force_release(env, state, wbs, audio_rate, frame_count);
                if force_stop < process_stop {
                    deactivate_after = true;
                    process_stop = force_stop;
                }
            }
        }
    }

    if features.filter {
        state.cutoff.fill(wbs.buffer_mut(wb::CUTOFF), 0, frame_count, audio_rate);
        state
            .resonance
            .fill(wbs.buffer_mut(wb::RESONANCE), 0, frame_count, audio_rate);
    }
    if features.panning {
        state.panning.fill(wbs.buffer_mut(wb::PANNING), 0, frame_count, audio_rate);
    }

    // The implementation renders into this device's voice send buffers.
    let impl_stop = proc
        .imp
        .render_voice(state, dts, wbs, audio_rate, tempo, process_stop);
    if impl_stop < process_stop {
        deactivate_after = true;
        process_stop = impl_stop;
    }

    // Post-processing of the rendered block.
    if let Some(out) = dts.voice_send_mut(0) {
        if out.is_valid() && process_stop > 0 {
            if features.force {
                apply_buffer_scale(out, wbs.buffer(wb::FORCE), process_stop);
            }

            if !state.note_on && !has_force_rel_env {
                let ramp_stop = apply_release_ramp(out, state, process_stop);
                if state.release_progress >= 1.0 {
                    deactivate_after = true;
                    process_stop = ramp_stop;
                }
            }

            if state.frames_rendered < u64::from(ATTACK_RAMP_FRAMES) {
                apply_attack_ramp(out, state.frames_rendered, process_stop);
            }

            if features.filter {
                apply_voice_filter(out, state, wbs, audio_rate, process_stop);
            }

            if features.panning {
                apply_panning(out, wbs.buffer(wb::PANNING), process_stop);
            }
        }
    }

    state.frames_rendered += process_stop as u64;
    if !state.note_on {
        state.rel_frames += process_stop as u64;
    }

    if deactivate_after {
        state.active = false;
    }

    process_stop
}

/// Derive the frequency trajectory from the pitch trajectory.
fn fill_freqs(wbs: &mut WorkBuffers, tuning: &TuningTable, frame_count: usize) {
    let (pitch_wb, freq_wb) = wbs.pair_mut(wb::PITCH, wb::FREQ);
    let pitch_const = pitch_wb.const_start().max(1).min(frame_count);
    let pitch = pitch_wb.contents();

    let data = freq_wb.contents_mut();
    for i in 0..pitch_const {
        data[i] = tuning.pitch_to_freq(f64::from(pitch[i])) as f32;
    }
    if pitch_const < frame_count {
        // A constant pitch tail converts to a constant frequency tail.
        let tail_value = data[pitch_const - 1];
        data[pitch_const..frame_count].fill(tail_value);
    }
    freq_wb.mark_valid();
    freq_wb.set_const_start(pitch_const);
}

/// Scale the force trajectory by the release envelope, returning the
/// frame at which the envelope reached zero (or `frame_count`).
fn apply_force_release(
    env: &crate::envelope::Envelope,
    state: &VoiceState,
    wbs: &mut WorkBuffers,
    audio_rate: u32,
    frame_count: usize,
) -> usize {
    let force_wb = wbs.buffer_mut(wb::FORCE);
    let data = force_wb.contents_mut();
    let end_x = env.end_x();
    let mut stop = frame_count;

    for (i, frame) in data[..frame_count].iter_mut().enumerate() {
        let x = (state.rel_frames + i as u64) as f64 / f64::from(audio_rate);
        if x >= end_x {
            *frame = 0.0;
            if stop == frame_count {
                stop = i;
            }
        } else {
            *frame *= env.value_at(x) as f32;
        }
    }
    force_wb.clear_const_start();
    if stop < frame_count {
        force_wb.set_const_start(stop + 1);
        force_wb.set_final(true);
    }
    stop
}

fn apply_buffer_scale(
    out: &mut crate::work_buffer::AudioBuffer,
    scale: &crate::work_buffer::WorkBuffer,
    stop: usize,
) {
    let scale_data = scale.contents();
    for ch in &mut out.ch {
        if !ch.is_valid() {
            continue;
        }
        let data = ch.contents_mut();
        for i in 0..stop.min(data.len()) {
            data[i] *= scale_data[i];
        }
        ch.clear_const_start();
    }
}

/// Linear fade to silence over `RELEASE_RAMP_FRAMES`.
///
/// Progress derives from the integer release frame counter, so splitting
/// a render into different chunk sizes cannot change the trajectory.
fn apply_release_ramp(
    out: &mut crate::work_buffer::AudioBuffer,
    state: &mut VoiceState,
    stop: usize,
) -> usize {
    let ramp = u64::from(RELEASE_RAMP_FRAMES);
    let done = state.rel_frames;
    let mut ramp_stop = stop;

    for ch in &mut out.ch {
        if !ch.is_valid() {
            continue;
        }
        let data = ch.contents_mut();
        for i in 0..stop.min(data.len()) {
            let frames_done = done + i as u64;
            if frames_done >= ramp {
                data[i] = 0.0;
                ramp_stop = ramp_stop.min(i);
            } else {
                let gain = 1.0 - frames_done as f64 / ramp as f64;
                data[i] *= gain as f32;
            }
        }
        ch.clear_const_start();
    }

    state.release_progress = ((done + stop as u64) as f64 / ramp as f64).min(1.0);
    ramp_stop
}

/// Linear fade-in on the first frames of a fresh voice.
fn apply_attack_ramp(out: &mut crate::work_buffer::AudioBuffer, rendered: u64, stop: usize) {
    let ramp_len = f64::from(ATTACK_RAMP_FRAMES);
    for ch in &mut out.ch {
        if !ch.is_valid() {
            continue;
        }
        let data = ch.contents_mut();
        for i in 0..stop.min(data.len()) {
            let progress = (rendered + i as u64) as f64 / ramp_len;
            if progress >= 1.0 {
                break;
            }
            data[i] *= progress as f32;
        }
    }
}

/// State-variable lowpass driven by the cutoff and resonance controls.
fn apply_voice_filter(
    out: &mut crate::work_buffer::AudioBuffer,
    state: &mut VoiceState,
    wbs: &WorkBuffers,
    audio_rate: u32,
    stop: usize,
) {
    const COEFF_BLOCK: usize = 16;

    let cutoff = wbs.buffer(wb::CUTOFF).contents();
    let resonance = wbs.buffer(wb::RESONANCE).contents();

    if f64::from(cutoff[0]) >= CUTOFF_BYPASS_CENTS && wbs.buffer(wb::CUTOFF).const_start() <= 1 {
        return;
    }

    for (ci, ch) in out.ch.iter_mut().enumerate() {
        if !ch.is_valid() {
            continue;
        }
        let data = ch.contents_mut();
        let svf = &mut state.filter[ci];
        let mut i = 0;
        while i < stop.min(data.len()) {
            let block_end = (i + COEFF_BLOCK).min(stop);
            let cents = f64::from(cutoff[i]);
            if cents >= CUTOFF_BYPASS_CENTS {
                i = block_end;
                continue;
            }
            let hz = crate::tuning::cents_to_hz(cents);
            svf.set_coeffs(hz as f32, resonance[i].max(0.5), audio_rate);
            for frame in data[i..block_end].iter_mut() {
                *frame = svf.process_lowpass(*frame);
            }
            i = block_end;
        }
        ch.clear_const_start();
    }
}

/// Equal-power panning: gains follow a quarter sine arc so combined
/// power stays constant across the pan range, normalized so centered
/// panning is unity. Full left mutes the right channel.
fn apply_panning(
    out: &mut crate::work_buffer::AudioBuffer,
    panning: &crate::work_buffer::WorkBuffer,
    stop: usize,
) {
    let pan = panning.contents();
    if panning.const_start() <= 1 && pan[0] == 0.0 {
        return;
    }

    let [left, right] = &mut out.ch;
    if left.is_valid() {
        let data = left.contents_mut();
        for i in 0..stop.min(data.len()) {
            data[i] *= pan_gains(f64::from(pan[i])).0;
        }
        left.clear_const_start();
    }
    if right.is_valid() {
        let data = right.contents_mut();
        for i in 0..stop.min(data.len()) {
            data[i] *= pan_gains(f64::from(pan[i])).1;
        }
        right.clear_const_start();
    }
}

/// Left/right gains for a pan position in [-1, 1].
pub fn pan_gains(pan: f64) -> (f32, f32) {
    let theta = (pan.clamp(-1.0, 1.0) + 1.0) * std::f64::consts::FRAC_PI_4;
    (
        (std::f64::consts::SQRT_2 * theta.cos()) as f32,
        (std::f64::consts::SQRT_2 * theta.sin()) as f32,
    )
}
