//! Scheduled gain automation
//!
//! A [`GainParam`] holds a time-ordered list of automation events measured on
//! the audio clock (seconds). The render path evaluates it once per output
//! frame, so ramps are sample accurate regardless of when the control task
//! happened to run.
//!
//! # Event Semantics
//!
//! - **SetValue**: value jumps to `value` at `time`
//! - **LinearRamp**: value moves linearly from the previous event's value
//!   (at the previous event's time) to `value`, arriving at `time`
//!
//! Events sharing a timestamp keep insertion order; the last one wins.

/// One automation event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GainEvent {
    SetValue { value: f32, time: f64 },
    LinearRamp { value: f32, time: f64 },
}

impl GainEvent {
    pub fn time(&self) -> f64 {
        match *self {
            GainEvent::SetValue { time, .. } | GainEvent::LinearRamp { time, .. } => time,
        }
    }

    pub fn value(&self) -> f32 {
        match *self {
            GainEvent::SetValue { value, .. } | GainEvent::LinearRamp { value, .. } => value,
        }
    }
}

/// Gain parameter with scheduled automation
#[derive(Debug, Clone)]
pub struct GainParam {
    default_value: f32,
    events: Vec<GainEvent>,
}

impl GainParam {
    pub fn new(default_value: f32) -> Self {
        Self {
            default_value,
            events: Vec::new(),
        }
    }

    /// Jump to `value` at `time`
    pub fn set_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(GainEvent::SetValue { value, time });
    }

    /// Ramp linearly from the preceding event to `value`, arriving at `time`
    pub fn linear_ramp_to_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(GainEvent::LinearRamp { value, time });
    }

    /// Remove every event at or after `time`
    pub fn cancel_scheduled_values(&mut self, time: f64) {
        self.events.retain(|e| e.time() < time);
    }

    /// Freeze the parameter at its value for `time`, dropping later events.
    ///
    /// A ramp in progress at `time` is truncated so the value reached so far
    /// is kept rather than jumping back to the ramp's starting point.
    pub fn cancel_and_hold_at_time(&mut self, time: f64) {
        let held = self.value_at(time);

        let first_later = self.events.iter().position(|e| e.time() > time);
        match first_later {
            Some(idx) => {
                let spanning = matches!(self.events[idx], GainEvent::LinearRamp { .. });
                self.events.truncate(idx);
                if spanning {
                    self.events.push(GainEvent::LinearRamp { value: held, time });
                } else {
                    self.events.push(GainEvent::SetValue { value: held, time });
                }
            }
            None => self.events.push(GainEvent::SetValue { value: held, time }),
        }
    }

    /// Parameter value at `time`
    pub fn value_at(&self, time: f64) -> f32 {
        // Index of the first event strictly after `time`
        let next = self.events.partition_point(|e| e.time() <= time);

        let (prev_time, prev_value) = match next.checked_sub(1) {
            Some(idx) => (self.events[idx].time(), self.events[idx].value()),
            None => (f64::NEG_INFINITY, self.default_value),
        };

        match self.events.get(next) {
            Some(GainEvent::LinearRamp { value, time: end }) if prev_time.is_finite() => {
                let span = end - prev_time;
                if span <= 0.0 {
                    return *value;
                }
                let progress = ((time - prev_time) / span).clamp(0.0, 1.0) as f32;
                prev_value + (value - prev_value) * progress
            }
            _ => prev_value,
        }
    }

    /// Final value once every scheduled event has played out
    pub fn target_value(&self) -> f32 {
        self.events
            .last()
            .map(|e| e.value())
            .unwrap_or(self.default_value)
    }

    pub fn events(&self) -> &[GainEvent] {
        &self.events
    }

    fn insert(&mut self, event: GainEvent) {
        let idx = self.events.partition_point(|e| e.time() <= event.time());
        self.events.insert(idx, event);
    }
}

impl Default for GainParam {
    fn default() -> Self {
        Self::new(1.0)
    }
}
