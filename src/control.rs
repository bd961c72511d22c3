//! Voice parameter controls
//!
//! A float control combines a current value, an optional linear slide
//! toward a target over a musical duration, and an optional sinusoidal
//! oscillation. Once per chunk the control writes its sample-accurate
//! trajectory into a work buffer; event-driven updates take effect at the
//! event's frame offset because chunks are bounded by events.

use crate::tstamp::Tstamp;
use crate::work_buffer::WorkBuffer;
use std::f64::consts::TAU;

/// A linear slide toward a target value.
#[derive(Debug, Clone)]
pub struct Slider {
    length: Tstamp,
    current: f64,
    target: f64,
    steps_left: u64,
    step: f64,
}

impl Slider {
    pub fn new(initial: f64) -> Self {
        Slider {
            length: Tstamp::zero(),
            current: initial,
            target: initial,
            steps_left: 0,
            step: 0.0,
        }
    }

    pub fn value(&self) -> f64 {
        self.current
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn is_active(&self) -> bool {
        self.steps_left > 0
    }

    /// Set the musical duration used by subsequent slides.
    pub fn set_length(&mut self, length: Tstamp) {
        self.length = length;
    }

    /// Jump to a value, cancelling any slide in progress.
    pub fn set_value(&mut self, value: f64) {
        self.current = value;
        self.target = value;
        self.steps_left = 0;
        self.step = 0.0;
    }

    /// Begin sliding toward `target` over the configured length.
    pub fn slide_to(&mut self, target: f64, tempo: f64, audio_rate: u32) {
        let frames = self.length.to_frames(tempo, audio_rate).round_ties_even();
        if frames < 1.0 {
            self.set_value(target);
            return;
        }
        self.target = target;
        self.steps_left = frames as u64;
        self.step = (target - self.current) / frames;
    }

    /// Advance one frame and return the new value.
    pub fn step(&mut self) -> f64 {
        if self.steps_left > 0 {
            self.steps_left -= 1;
            self.current += self.step;
            if self.steps_left == 0 {
                self.current = self.target;
            }
        }
        self.current
    }
}

/// A sinusoidal oscillation around a control's base value.
#[derive(Debug, Clone)]
pub struct Lfo {
    speed: Slider,
    depth: Slider,
    phase: f64,
}

impl Lfo {
    pub fn new() -> Self {
        Lfo {
            speed: Slider::new(0.0),
            depth: Slider::new(0.0),
            phase: 0.0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.depth.value() != 0.0 || self.depth.is_active()
    }

    pub fn set_speed(&mut self, hz: f64) {
        self.speed.set_value(hz.max(0.0));
    }

    pub fn set_depth(&mut self, depth: f64) {
        self.depth.set_value(depth);
    }

    pub fn slide_speed(&mut self, hz: f64, tempo: f64, audio_rate: u32) {
        self.speed.slide_to(hz.max(0.0), tempo, audio_rate);
    }

    pub fn slide_depth(&mut self, depth: f64, tempo: f64, audio_rate: u32) {
        self.depth.slide_to(depth, tempo, audio_rate);
    }

    pub fn set_slide_length(&mut self, length: Tstamp) {
        self.speed.set_length(length);
        self.depth.set_length(length);
    }

    /// Advance one frame and return the oscillation contribution.
    pub fn step(&mut self, audio_rate: u32) -> f64 {
        let speed = self.speed.step();
        let depth = self.depth.step();
        if depth == 0.0 && speed == 0.0 {
            return 0.0;
        }
        let value = self.phase.sin() * depth;
        self.phase = (self.phase + TAU * speed / f64::from(audio_rate)) % TAU;
        value
    }
}

impl Default for Lfo {
    fn default() -> Self {
        Lfo::new()
    }
}

/// One controlled voice parameter: base value with slide plus oscillation.
#[derive(Debug, Clone)]
pub struct FloatControl {
    slider: Slider,
    lfo: Lfo,
}

impl FloatControl {
    pub fn new(initial: f64) -> Self {
        FloatControl {
            slider: Slider::new(initial),
            lfo: Lfo::new(),
        }
    }

    pub fn value(&self) -> f64 {
        self.slider.value()
    }

    pub fn set_value(&mut self, value: f64) {
        self.slider.set_value(value);
    }

    pub fn set_slide_length(&mut self, length: Tstamp) {
        self.slider.set_length(length);
    }

    pub fn slide_to(&mut self, target: f64, tempo: f64, audio_rate: u32) {
        self.slider.slide_to(target, tempo, audio_rate);
    }

    pub fn lfo_mut(&mut self) -> &mut Lfo {
        &mut self.lfo
    }

    /// True when the trajectory is flat for the foreseeable future.
    pub fn is_static(&self) -> bool {
        !self.slider.is_active() && !self.lfo.is_active()
    }

    /// Write the control's trajectory for `[start, stop)` into `out`.
    ///
    /// A static control fills the range with a single constant and marks
    /// the tail accordingly, so consumers can skip per-frame work.
    pub fn fill(&mut self, out: &mut WorkBuffer, start: usize, stop: usize, audio_rate: u32) {
        let stop = stop.min(out.len());
        if start >= stop {
            return;
        }

        if self.is_static() {
            let value = self.slider.value() as f32;
            out.contents_mut()[start..stop].fill(value);
            out.mark_valid();
            out.set_const_start(start + 1);
            return;
        }

        let data = out.contents_mut();
        for frame in data[start..stop].iter_mut() {
            let base = self.slider.step();
            let osc = self.lfo.step(audio_rate);
            *frame = (base + osc) as f32;
        }
        out.mark_valid();
        out.clear_const_start();
    }
}
