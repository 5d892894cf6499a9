use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel marking a bad (screened-out or unmeasured) sample.
///
/// Matches the instrument's own bad-velocity flag so recorded data and
/// live data screen identically.
pub const BAD_VELOCITY: f64 = 88.888;

/// Where an ensemble came from, used to route it to the correct consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnsembleSource {
    Serial,
    Playback,
    ShortTermAverage,
    LongTermAverage,
}

/// Subsystem configuration identity (code + index within the ensemble
/// ping order). Two connected instruments never share an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubsystemId {
    pub code: u8,
    pub index: u8,
}

impl SubsystemId {
    pub fn new(code: u8, index: u8) -> Self {
        Self { code, index }
    }
}

impl fmt::Display for SubsystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.code, self.index)
    }
}

/// Bottom-track data, one entry per beam.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BottomTrack {
    /// Range to bottom in meters, per beam.
    pub range: Vec<f64>,
    /// Bottom-track beam velocity in m/s, per beam.
    pub beam_velocity: Vec<f64>,
    /// Bottom-track earth velocity in m/s (East, North, Up, error).
    pub earth_velocity: Vec<f64>,
}

impl BottomTrack {
    pub fn new(num_beams: usize) -> Self {
        Self {
            range: vec![BAD_VELOCITY; num_beams],
            beam_velocity: vec![BAD_VELOCITY; num_beams],
            earth_velocity: vec![BAD_VELOCITY; num_beams],
        }
    }
}

/// Environmental and attitude readings taken with the ping cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    pub water_temp: f64,
    pub salinity: f64,
    pub pressure: f64,
    pub transducer_depth: f64,
    pub heading: f64,
    pub pitch: f64,
    pub roll: f64,
}

/// One complete multi-beam measurement cycle.
///
/// Per-bin matrices are indexed `[bin][beam]` (earth velocity uses
/// East/North/Up/error in place of beams). Ensembles are treated as
/// immutable once they arrive; stages deep-clone before handing one to a
/// concurrent consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ensemble {
    pub ensemble_number: u64,
    /// Timestamp in microseconds since epoch.
    pub timestamp_us: u64,
    pub source: EnsembleSource,
    pub subsystem: SubsystemId,
    pub serial_number: String,
    pub num_bins: usize,
    pub num_beams: usize,
    /// Echo amplitude in dB.
    pub amplitude: Vec<Vec<f64>>,
    /// Correlation, 0.0 to 1.0.
    pub correlation: Vec<Vec<f64>>,
    /// Beam-coordinate velocity in m/s.
    pub beam_velocity: Vec<Vec<f64>>,
    /// Instrument-coordinate velocity in m/s.
    pub instrument_velocity: Vec<Vec<f64>>,
    /// Earth-coordinate velocity in m/s (East, North, Up, error).
    pub earth_velocity: Vec<Vec<f64>>,
    pub bottom_track: Option<BottomTrack>,
    pub environment: Environment,
}

impl Ensemble {
    /// Create an ensemble with every sample flagged bad.
    pub fn new(num_bins: usize, num_beams: usize) -> Self {
        let matrix = || vec![vec![BAD_VELOCITY; num_beams]; num_bins];
        Self {
            ensemble_number: 0,
            timestamp_us: 0,
            source: EnsembleSource::Serial,
            subsystem: SubsystemId::new(0, 0),
            serial_number: String::new(),
            num_bins,
            num_beams,
            amplitude: matrix(),
            correlation: matrix(),
            beam_velocity: matrix(),
            instrument_velocity: matrix(),
            earth_velocity: matrix(),
            bottom_track: None,
            environment: Environment::default(),
        }
    }

    /// Create an ensemble with every field set to a single uniform value.
    /// Used by tests and the demo generator.
    pub fn with_uniform(num_bins: usize, num_beams: usize, value: f64) -> Self {
        let mut ens = Self::new(num_bins, num_beams);
        for matrix in [
            &mut ens.amplitude,
            &mut ens.correlation,
            &mut ens.beam_velocity,
            &mut ens.instrument_velocity,
            &mut ens.earth_velocity,
        ] {
            for bin in matrix.iter_mut() {
                for sample in bin.iter_mut() {
                    *sample = value;
                }
            }
        }
        ens
    }

    /// True if the sample carries the bad-value flag.
    pub fn is_bad(value: f64) -> bool {
        (value - BAD_VELOCITY).abs() < f64::EPSILON || !value.is_finite()
    }
}
