use serde::{Deserialize, Serialize};

/// Averaging window policy. Exactly one mode is active at a time; setting
/// a mode replaces the previous one wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowMode {
    /// Close the window after N ensembles have been folded in.
    SampleCount { samples: usize },
    /// Close the window once the elapsed wall-clock time exceeds the
    /// interval. The close happens on the next ensemble after expiry.
    Timer { interval_ms: u64 },
    /// Sliding set of the most recent K ensembles; an updated average is
    /// emitted on every arrival.
    Running { capacity: usize },
}

impl Default for WindowMode {
    fn default() -> Self {
        WindowMode::SampleCount { samples: 2 }
    }
}

/// Enable flag and post-average scale factor for one data field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldSettings {
    pub enabled: bool,
    /// Applied once, at emission, to the averaged value.
    pub scale: f64,
}

impl FieldSettings {
    pub fn enabled() -> Self {
        Self { enabled: true, scale: 1.0 }
    }
}

impl Default for FieldSettings {
    fn default() -> Self {
        Self { enabled: false, scale: 1.0 }
    }
}

/// Depth-bin range used to normalize velocity against a local baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceLayer {
    pub enabled: bool,
    pub min_bin: usize,
    pub max_bin: usize,
}

impl Default for ReferenceLayer {
    fn default() -> Self {
        Self { enabled: false, min_bin: 1, max_bin: 5 }
    }
}

/// Complete configuration for one average manager instance.
///
/// The same record is instantiated twice, once for the long-term and once
/// for the short-term manager; the two never share state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AverageOptions {
    pub mode: WindowMode,
    pub amplitude: FieldSettings,
    pub correlation: FieldSettings,
    pub beam_velocity: FieldSettings,
    pub instrument_velocity: FieldSettings,
    pub earth_velocity: FieldSettings,
    pub bottom_track: FieldSettings,
    pub reference_layer: ReferenceLayer,
}

impl AverageOptions {
    pub fn set_sample_count_mode(&mut self, samples: usize) {
        self.mode = WindowMode::SampleCount { samples: samples.max(1) };
    }

    pub fn set_timer_mode(&mut self, interval_ms: u64) {
        self.mode = WindowMode::Timer { interval_ms };
    }

    pub fn set_running_mode(&mut self, capacity: usize) {
        self.mode = WindowMode::Running { capacity: capacity.max(1) };
    }

    pub fn is_by_sample_count(&self) -> bool {
        matches!(self.mode, WindowMode::SampleCount { .. })
    }

    pub fn is_by_timer(&self) -> bool {
        matches!(self.mode, WindowMode::Timer { .. })
    }

    pub fn is_running(&self) -> bool {
        matches!(self.mode, WindowMode::Running { .. })
    }

    /// True if at least one data field is selected for averaging.
    pub fn any_field_enabled(&self) -> bool {
        self.amplitude.enabled
            || self.correlation.enabled
            || self.beam_velocity.enabled
            || self.instrument_velocity.enabled
            || self.earth_velocity.enabled
            || self.bottom_track.enabled
    }
}
