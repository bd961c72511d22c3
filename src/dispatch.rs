//! Event dispatch
//!
//! Applies one event's effect to channel state, the voice pool, device
//! states and playback state. The timeline driver bounds every chunk by
//! the next event position, so dispatch always happens at a chunk
//! boundary and voice-control changes take effect at the event's exact
//! frame.

use crate::channel::Channel;
use crate::composition::Composition;
use crate::device_state::{DeviceStates, MixedState};
use crate::event::{Event, EventKind};
use crate::player::{PlaybackState, TempoSlide};
use crate::tstamp::Tstamp;
use crate::value::Value;
use crate::voice_pool::VoicePool;
use rand::Rng;
use tracing::warn;

/// Musical interval between tempo slide adjustments.
pub const TEMPO_SLIDE_STEP: Tstamp = Tstamp::new_const(0, crate::tstamp::BEAT_DIVISOR / 32);

/// Everything an event may mutate.
pub struct DispatchCtx<'a> {
    pub comp: &'a Composition,
    pub pool: &'a mut VoicePool,
    pub channels: &'a mut [Channel],
    pub states: &'a mut DeviceStates,
    pub playback: &'a mut PlaybackState,
    pub audio_rate: u32,
    /// Incremented for every event whose effect had to be dropped.
    pub rejected_events: &'a mut u64,
}

/// Apply one event.
pub fn dispatch_event(ctx: &mut DispatchCtx, event: &Event) {
    match event.kind {
        EventKind::NoteOn => note_on(ctx, event, None),
        EventKind::Hit => {
            let Some(hit) = event.value.as_int().map(|h| h as u16) else {
                reject(ctx, event, "hit needs an index");
                return;
            };
            note_on(ctx, event, Some(hit));
        }
        EventKind::NoteOff => {
            let Some(channel) = channel_of(ctx, event) else {
                return;
            };
            if let Some(group) = ctx.channels[channel].fg_group.take() {
                ctx.pool.release_group(group);
            }
            ctx.channels[channel].fg_au = None;
        }
        EventKind::TempoSet => {
            let Some(tempo) = event.value.as_float().filter(|t| (1.0..=999.0).contains(t))
            else {
                reject(ctx, event, "tempo out of range");
                return;
            };
            ctx.playback.tempo = tempo;
            ctx.playback.tempo_slide = None;
        }
        EventKind::TempoSlide => tempo_slide(ctx, event),
        EventKind::ChannelParamSet => channel_param(ctx, event),
        EventKind::GlobalParamSet => global_param(ctx, event),
        EventKind::ControlVarSet | EventKind::ControlVarSlide => control_var(ctx, event),
        EventKind::PatternJump => {
            let Some(target) = event.value.as_int().filter(|&t| t >= 0) else {
                reject(ctx, event, "jump needs a target system");
                return;
            };
            if ctx.playback.jump_counter == 0 {
                return;
            }
            ctx.playback.jump_counter -= 1;
            ctx.playback.jump_to_system = Some(target as usize);
        }
    }
}

fn channel_of(ctx: &mut DispatchCtx, event: &Event) -> Option<usize> {
    match event.channel {
        Some(ch) if (ch as usize) < ctx.channels.len() => Some(ch as usize),
        _ => {
            reject(ctx, event, "missing or invalid channel");
            None
        }
    }
}

fn reject(ctx: &mut DispatchCtx, event: &Event, why: &str) {
    warn!(kind = ?event.kind, why, "dropping event");
    *ctx.rejected_events += 1;
}

/// Allocate a voice group for a NoteOn or Hit.
fn note_on(ctx: &mut DispatchCtx, event: &Event, hit: Option<u16>) {
    let Some(channel_index) = channel_of(ctx, event) else {
        return;
    };
    if ctx.channels[channel_index].mute {
        return;
    }

    let control = match event.aux.as_int() {
        Some(c) if c >= 0 => c as usize,
        _ => ctx.channels[channel_index].control,
    };
    let Some(au_index) = ctx.comp.control_au(control) else {
        reject(ctx, event, "control resolves to no audio unit");
        return;
    };
    let Some(unit) = ctx.comp.audio_unit(au_index) else {
        reject(ctx, event, "audio unit missing");
        return;
    };
    let Some(ids) = ctx.comp.au_device_ids(au_index) else {
        reject(ctx, event, "audio unit has no devices");
        return;
    };

    let cents = event.value.as_float().unwrap_or(0.0);

    // A new note supersedes the channel's foreground group.
    if let Some(old) = ctx.channels[channel_index].fg_group.take() {
        ctx.pool.demote_group(old);
    }

    let group_id = ctx.pool.new_group_id();
    let mut allocated = false;

    for proc in unit.voice_processors() {
        let Some(device) = ids.procs[proc.index] else {
            continue;
        };
        let channel = &mut ctx.channels[channel_index];
        let seed = group_id ^ (channel.rand.gen::<u64>() | 1);

        let voice = ctx.pool.allocate(group_id, device, channel_index as u8);
        voice.state.reset(seed);
        voice.state.hit = hit;
        voice.state.pitch.set_value(cents);
        voice.state.force = channel.force.clone();
        voice.state.panning = channel.panning.clone();
        voice.state.cutoff = channel.cutoff.clone();
        voice.state.resonance = channel.resonance.clone();
        proc.imp.init_voice(&mut voice.state);
        allocated = true;
    }

    if allocated {
        ctx.channels[channel_index].fg_group = Some(group_id);
        ctx.channels[channel_index].fg_au = Some(au_index);
    } else {
        reject(ctx, event, "unit has no voice processors");
    }
}

fn tempo_slide(ctx: &mut DispatchCtx, event: &Event) {
    let Some(target) = event.value.as_float().filter(|t| (1.0..=999.0).contains(t)) else {
        reject(ctx, event, "tempo slide target out of range");
        return;
    };
    let Some(length) = event.aux.as_tstamp() else {
        reject(ctx, event, "tempo slide needs a length");
        return;
    };

    let step_beats = TEMPO_SLIDE_STEP.to_beats_f64();
    let steps = (length.to_beats_f64() / step_beats).ceil().max(1.0) as u32;
    let delta = (target - ctx.playback.tempo) / f64::from(steps);
    ctx.playback.tempo_slide = Some(TempoSlide {
        target,
        delta,
        steps_left: steps,
        to_next_step: TEMPO_SLIDE_STEP,
    });
}

/// Channel parameter events: update the channel template, and follow
/// through to the foreground group so held notes move too.
fn channel_param(ctx: &mut DispatchCtx, event: &Event) {
    let Some(channel_index) = channel_of(ctx, event) else {
        return;
    };
    let Some(name) = event.value.as_str() else {
        reject(ctx, event, "channel param needs a name");
        return;
    };
    let name = name.to_string();
    let aux = event.aux.clone();
    let tempo = ctx.playback.tempo;
    let audio_rate = ctx.audio_rate;

    let slide_length = ctx.channels[channel_index].slide_length;
    let fg_group = ctx.channels[channel_index].fg_group;

    enum Target {
        Force,
        Panning,
        Cutoff,
        Resonance,
    }

    let (target, slide) = match name.as_str() {
        "control" => {
            let Some(c) = aux.as_int().filter(|&c| c >= 0) else {
                reject(ctx, event, "control must be a nonnegative index");
                return;
            };
            ctx.channels[channel_index].control = c as usize;
            return;
        }
        "mute" => {
            let Some(m) = aux.as_bool() else {
                reject(ctx, event, "mute must be a boolean");
                return;
            };
            ctx.channels[channel_index].mute = m;
            return;
        }
        "slide_length" => {
            let Some(len) = aux.as_tstamp() else {
                reject(ctx, event, "slide_length must be a timestamp");
                return;
            };
            let channel = &mut ctx.channels[channel_index];
            channel.slide_length = len;
            channel.force.set_slide_length(len);
            channel.panning.set_slide_length(len);
            channel.cutoff.set_slide_length(len);
            channel.resonance.set_slide_length(len);
            return;
        }
        "force" => (Target::Force, false),
        "force_slide" => (Target::Force, true),
        "panning" => (Target::Panning, false),
        "panning_slide" => (Target::Panning, true),
        "cutoff" => (Target::Cutoff, false),
        "cutoff_slide" => (Target::Cutoff, true),
        "resonance" => (Target::Resonance, false),
        "resonance_slide" => (Target::Resonance, true),
        _ => {
            reject(ctx, event, "unknown channel parameter");
            return;
        }
    };

    let Some(value) = aux.as_float() else {
        reject(ctx, event, "channel parameter must be numeric");
        return;
    };

    let apply = |control: &mut crate::control::FloatControl| {
        if slide {
            control.set_slide_length(slide_length);
            control.slide_to(value, tempo, audio_rate);
        } else {
            control.set_value(value);
        }
    };

    {
        let channel = &mut ctx.channels[channel_index];
        match target {
            Target::Force => apply(&mut channel.force),
            Target::Panning => apply(&mut channel.panning),
            Target::Cutoff => apply(&mut channel.cutoff),
            Target::Resonance => apply(&mut channel.resonance),
        }
    }

    if let Some(group) = fg_group {
        for voice in ctx.pool.group_voices_mut(group) {
            match target {
                Target::Force => apply(&mut voice.state.force),
                Target::Panning => apply(&mut voice.state.panning),
                Target::Cutoff => apply(&mut voice.state.cutoff),
                Target::Resonance => apply(&mut voice.state.resonance),
            }
        }
    }
}

fn global_param(ctx: &mut DispatchCtx, event: &Event) {
    let Some(name) = event.value.as_str() else {
        reject(ctx, event, "global param needs a name");
        return;
    };
    match name {
        "volume" => {
            let Some(v) = event.aux.as_float().filter(|v| *v >= 0.0) else {
                reject(ctx, event, "volume must be nonnegative");
                return;
            };
            ctx.playback.master_volume.set_value(v);
        }
        "volume_slide" => {
            let Some(v) = event.aux.as_float().filter(|v| *v >= 0.0) else {
                reject(ctx, event, "volume must be nonnegative");
                return;
            };
            let tempo = ctx.playback.tempo;
            ctx.playback
                .master_volume
                .slide_to(v, tempo, ctx.audio_rate);
        }
        "volume_slide_length" => {
            let Some(len) = event.aux.as_tstamp() else {
                reject(ctx, event, "slide length must be a timestamp");
                return;
            };
            ctx.playback.master_volume.set_length(len);
        }
        _ => reject(ctx, event, "unknown global parameter"),
    }
}

/// Control variable targets: `au_XX/bypass` toggles unit bypass,
/// `au_XX/proc_XX/<name>` routes to the processor's callbacks. The voice
/// variant mutates every voice of the event channel's foreground group.
fn control_var(ctx: &mut DispatchCtx, event: &Event) {
    let Some(path) = event.value.as_str() else {
        reject(ctx, event, "control var needs a target path");
        return;
    };
    let path = path.to_string();

    let mut parts = path.splitn(3, '/');
    let Some(au_part) = parts.next() else {
        reject(ctx, event, "empty control var path");
        return;
    };
    let Some(au_index) = au_part
        .strip_prefix("au_")
        .and_then(|d| usize::from_str_radix(d, 16).ok())
    else {
        reject(ctx, event, "control var path must start with a unit");
        return;
    };
    let Some(ids) = ctx.comp.au_device_ids(au_index) else {
        reject(ctx, event, "control var unit missing");
        return;
    };

    match (parts.next(), parts.next()) {
        (Some("bypass"), None) => {
            let Some(bypass) = event.aux.as_bool() else {
                reject(ctx, event, "bypass must be a boolean");
                return;
            };
            if let MixedState::Au(au_state) = &mut ctx.states.get_mut(ids.unit).mixed_state {
                au_state.bypass = bypass;
            }
        }
        (Some(proc_part), Some(var_name)) => {
            let Some(proc_index) = proc_part
                .strip_prefix("proc_")
                .and_then(|d| usize::from_str_radix(d, 16).ok())
            else {
                reject(ctx, event, "control var path names no processor");
                return;
            };
            let Some(proc) = ctx
                .comp
                .audio_unit(au_index)
                .and_then(|unit| unit.processor(proc_index))
            else {
                reject(ctx, event, "control var processor missing");
                return;
            };
            let Some(device) = ids.procs.get(proc_index).copied().flatten() else {
                reject(ctx, event, "control var processor has no device");
                return;
            };

            // Process-state variant.
            let state = &mut ctx.states.get_mut(device).mixed_state;
            match &event.aux {
                Value::Bool(b) => proc.imp.set_cv_bool(state, var_name, *b),
                Value::Int(i) => proc.imp.set_cv_int(state, var_name, *i),
                Value::Float(f) => proc.imp.set_cv_float(state, var_name, *f),
                Value::Tstamp(ts) => proc.imp.set_cv_tstamp(state, var_name, *ts),
                _ => {
                    reject(ctx, event, "unsupported control var payload");
                    return;
                }
            }

            // Voice-state variant for the channel's foreground group.
            if let Some(channel_index) = event.channel.map(usize::from) {
                if let Some(group) = ctx
                    .channels
                    .get(channel_index)
                    .and_then(|ch| ch.fg_group)
                {
                    for voice in ctx.pool.group_voices_mut(group) {
                        if voice.device != device {
                            continue;
                        }
                        match &event.aux {
                            Value::Bool(b) => proc.imp.set_vcv_bool(&mut voice.state, var_name, *b),
                            Value::Int(i) => proc.imp.set_vcv_int(&mut voice.state, var_name, *i),
                            Value::Float(f) => {
                                proc.imp.set_vcv_float(&mut voice.state, var_name, *f)
                            }
                            Value::Tstamp(ts) => {
                                proc.imp.set_vcv_tstamp(&mut voice.state, var_name, *ts)
                            }
                            _ => {}
                        }
                    }
                }
            }
        }
        _ => reject(ctx, event, "incomplete control var path"),
    }
}
