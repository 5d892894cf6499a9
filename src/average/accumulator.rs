use crate::average::options::{AverageOptions, FieldSettings, ReferenceLayer};
use crate::core::{BottomTrack, Ensemble, EnsembleSource, BAD_VELOCITY};

/// Running sum and good-sample count for one `[bin][beam]` matrix.
#[derive(Debug, Clone, Default)]
struct MatrixAccumulator {
    sums: Vec<Vec<f64>>,
    counts: Vec<Vec<u32>>,
}

impl MatrixAccumulator {
    fn resize(&mut self, num_bins: usize, num_beams: usize) {
        self.sums = vec![vec![0.0; num_beams]; num_bins];
        self.counts = vec![vec![0; num_beams]; num_bins];
    }

    fn fold(&mut self, matrix: &[Vec<f64>]) {
        for ((sum_row, count_row), row) in self.sums.iter_mut().zip(&mut self.counts).zip(matrix) {
            for ((sum, count), &value) in sum_row.iter_mut().zip(count_row.iter_mut()).zip(row) {
                if !Ensemble::is_bad(value) {
                    *sum += value;
                    *count += 1;
                }
            }
        }
    }

    /// Arithmetic mean per cell; cells with no good contributions stay
    /// flagged bad.
    fn mean(&self) -> Vec<Vec<f64>> {
        self.sums
            .iter()
            .zip(&self.counts)
            .map(|(sum_row, count_row)| {
                sum_row
                    .iter()
                    .zip(count_row)
                    .map(|(&sum, &count)| {
                        if count == 0 {
                            BAD_VELOCITY
                        } else {
                            sum / count as f64
                        }
                    })
                    .collect()
            })
            .collect()
    }
}

/// Per-beam sum and count for one bottom-track vector.
#[derive(Debug, Clone, Default)]
struct VectorAccumulator {
    sums: Vec<f64>,
    counts: Vec<u32>,
}

impl VectorAccumulator {
    fn resize(&mut self, len: usize) {
        self.sums = vec![0.0; len];
        self.counts = vec![0; len];
    }

    fn fold(&mut self, values: &[f64]) {
        for (i, &value) in values.iter().enumerate() {
            if i < self.sums.len() && !Ensemble::is_bad(value) {
                self.sums[i] += value;
                self.counts[i] += 1;
            }
        }
    }

    fn mean(&self) -> Vec<f64> {
        self.sums
            .iter()
            .zip(&self.counts)
            .map(|(&sum, &count)| if count == 0 { BAD_VELOCITY } else { sum / count as f64 })
            .collect()
    }
}

/// Accumulates one averaging window of ensembles, bin by bin.
///
/// Once a window is emitted the accumulator resets to empty; no data from
/// a closed window leaks into the next. A change in bin or beam count
/// restarts the window in place, since accumulating mismatched widths is
/// undefined.
#[derive(Debug, Clone, Default)]
pub struct AverageAccumulator {
    width: Option<(usize, usize)>,
    amplitude: MatrixAccumulator,
    correlation: MatrixAccumulator,
    beam_velocity: MatrixAccumulator,
    instrument_velocity: MatrixAccumulator,
    earth_velocity: MatrixAccumulator,
    bt_range: VectorAccumulator,
    bt_beam_velocity: VectorAccumulator,
    bt_earth_velocity: VectorAccumulator,
    /// Clone of the last folded ensemble; the emitted average is built on
    /// top of it so disabled fields pass through.
    template: Option<Ensemble>,
    count: usize,
    valid_count: usize,
}

impl AverageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensembles folded into the current window.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Ensembles that contributed at least one good sample.
    pub fn valid_count(&self) -> usize {
        self.valid_count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Fold one ensemble into the window. Returns true if a bin/beam width
    /// change forced the window to restart before folding.
    pub fn fold(&mut self, ensemble: &Ensemble) -> bool {
        let width = (ensemble.num_bins, ensemble.num_beams);
        let restarted = match self.width {
            Some(current) if current != width => {
                self.reset();
                true
            }
            _ => false,
        };

        if self.width.is_none() {
            self.width = Some(width);
            self.amplitude.resize(width.0, width.1);
            self.correlation.resize(width.0, width.1);
            self.beam_velocity.resize(width.0, width.1);
            self.instrument_velocity.resize(width.0, width.1);
            self.earth_velocity.resize(width.0, width.1);
            self.bt_range.resize(width.1);
            self.bt_beam_velocity.resize(width.1);
            self.bt_earth_velocity.resize(width.1);
        }

        self.amplitude.fold(&ensemble.amplitude);
        self.correlation.fold(&ensemble.correlation);
        self.beam_velocity.fold(&ensemble.beam_velocity);
        self.instrument_velocity.fold(&ensemble.instrument_velocity);
        self.earth_velocity.fold(&ensemble.earth_velocity);
        if let Some(bt) = &ensemble.bottom_track {
            self.bt_range.fold(&bt.range);
            self.bt_beam_velocity.fold(&bt.beam_velocity);
            self.bt_earth_velocity.fold(&bt.earth_velocity);
        }

        if has_good_sample(ensemble) {
            self.valid_count += 1;
        }
        self.count += 1;
        self.template = Some(ensemble.clone());
        restarted
    }

    /// Close the window: build the averaged ensemble and reset.
    ///
    /// Returns None when no folded ensemble carried a single good sample,
    /// in which case nothing is emitted for this window.
    pub fn emit(&mut self, options: &AverageOptions, source: EnsembleSource) -> Option<Ensemble> {
        let result = self.build_average(options, source);
        self.reset();
        result
    }

    fn build_average(
        &self,
        options: &AverageOptions,
        source: EnsembleSource,
    ) -> Option<Ensemble> {
        if self.valid_count == 0 {
            return None;
        }
        let mut averaged = self.template.as_ref()?.clone();
        averaged.source = source;

        if options.amplitude.enabled {
            averaged.amplitude = finish(self.amplitude.mean(), &options.amplitude, None);
        }
        if options.correlation.enabled {
            averaged.correlation = finish(self.correlation.mean(), &options.correlation, None);
        }
        let reference = options.reference_layer;
        if options.beam_velocity.enabled {
            averaged.beam_velocity =
                finish(self.beam_velocity.mean(), &options.beam_velocity, Some(reference));
        }
        if options.instrument_velocity.enabled {
            averaged.instrument_velocity = finish(
                self.instrument_velocity.mean(),
                &options.instrument_velocity,
                Some(reference),
            );
        }
        if options.earth_velocity.enabled {
            averaged.earth_velocity =
                finish(self.earth_velocity.mean(), &options.earth_velocity, Some(reference));
        }
        if options.bottom_track.enabled {
            let scale = options.bottom_track.scale;
            averaged.bottom_track = Some(BottomTrack {
                range: scale_vector(self.bt_range.mean(), scale),
                beam_velocity: scale_vector(self.bt_beam_velocity.mean(), scale),
                earth_velocity: scale_vector(self.bt_earth_velocity.mean(), scale),
            });
        }

        Some(averaged)
    }
}

fn has_good_sample(ensemble: &Ensemble) -> bool {
    let matrices = [
        &ensemble.amplitude,
        &ensemble.correlation,
        &ensemble.beam_velocity,
        &ensemble.instrument_velocity,
        &ensemble.earth_velocity,
    ];
    if matrices
        .iter()
        .any(|m| m.iter().flatten().any(|&v| !Ensemble::is_bad(v)))
    {
        return true;
    }
    ensemble.bottom_track.as_ref().is_some_and(|bt| {
        bt.range
            .iter()
            .chain(&bt.beam_velocity)
            .chain(&bt.earth_velocity)
            .any(|&v| !Ensemble::is_bad(v))
    })
}

/// Reference-layer normalization followed by the post-average scale, both
/// applied exactly once to the finished mean.
fn finish(
    mut matrix: Vec<Vec<f64>>,
    settings: &FieldSettings,
    reference: Option<ReferenceLayer>,
) -> Vec<Vec<f64>> {
    if let Some(layer) = reference {
        if layer.enabled {
            normalize_to_reference_layer(&mut matrix, layer);
        }
    }
    for row in matrix.iter_mut() {
        for value in row.iter_mut() {
            if !Ensemble::is_bad(*value) {
                *value *= settings.scale;
            }
        }
    }
    matrix
}

/// Subtract the per-beam mean of the bins inside [min_bin, max_bin] from
/// every good sample in that beam column.
fn normalize_to_reference_layer(matrix: &mut [Vec<f64>], layer: ReferenceLayer) {
    let num_bins = matrix.len();
    if num_bins == 0 {
        return;
    }
    let num_beams = matrix[0].len();
    let min_bin = layer.min_bin.min(num_bins.saturating_sub(1));
    let max_bin = layer.max_bin.min(num_bins.saturating_sub(1));
    if min_bin > max_bin {
        return;
    }

    for beam in 0..num_beams {
        let mut sum = 0.0;
        let mut count = 0u32;
        for row in matrix.iter().take(max_bin + 1).skip(min_bin) {
            if !Ensemble::is_bad(row[beam]) {
                sum += row[beam];
                count += 1;
            }
        }
        if count == 0 {
            continue;
        }
        let baseline = sum / count as f64;
        for row in matrix.iter_mut() {
            if !Ensemble::is_bad(row[beam]) {
                row[beam] -= baseline;
            }
        }
    }
}

fn scale_vector(mut values: Vec<f64>, scale: f64) -> Vec<f64> {
    for value in values.iter_mut() {
        if !Ensemble::is_bad(*value) {
            *value *= scale;
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::average::options::AverageOptions;

    fn velocity_options() -> AverageOptions {
        let mut opts = AverageOptions::default();
        opts.beam_velocity = FieldSettings::enabled();
        opts
    }

    #[test]
    fn mean_skips_bad_samples() {
        let mut acc = AverageAccumulator::new();
        let mut a = Ensemble::with_uniform(1, 1, 2.0);
        a.beam_velocity[0][0] = 2.0;
        let mut b = Ensemble::with_uniform(1, 1, 4.0);
        b.beam_velocity[0][0] = BAD_VELOCITY;
        acc.fold(&a);
        acc.fold(&b);

        let avg = acc
            .emit(&velocity_options(), EnsembleSource::LongTermAverage)
            .unwrap();
        // Bad sample does not drag the mean down.
        assert_eq!(avg.beam_velocity[0][0], 2.0);
    }

    #[test]
    fn emit_resets_the_window() {
        let mut acc = AverageAccumulator::new();
        acc.fold(&Ensemble::with_uniform(2, 2, 1.0));
        assert_eq!(acc.count(), 1);
        acc.emit(&velocity_options(), EnsembleSource::LongTermAverage);
        assert!(acc.is_empty());
        assert_eq!(acc.valid_count(), 0);
    }

    #[test]
    fn width_change_restarts_window() {
        let mut acc = AverageAccumulator::new();
        assert!(!acc.fold(&Ensemble::with_uniform(4, 4, 1.0)));
        assert!(acc.fold(&Ensemble::with_uniform(8, 4, 2.0)));
        assert_eq!(acc.count(), 1);

        let avg = acc
            .emit(&velocity_options(), EnsembleSource::LongTermAverage)
            .unwrap();
        assert_eq!(avg.num_bins, 8);
        assert_eq!(avg.beam_velocity[0][0], 2.0);
    }

    #[test]
    fn all_bad_window_emits_nothing() {
        let mut acc = AverageAccumulator::new();
        acc.fold(&Ensemble::new(4, 4));
        acc.fold(&Ensemble::new(4, 4));
        assert!(acc
            .emit(&velocity_options(), EnsembleSource::LongTermAverage)
            .is_none());
        assert!(acc.is_empty());
    }

    #[test]
    fn scale_applies_to_the_averaged_value() {
        let mut opts = velocity_options();
        opts.beam_velocity.scale = 10.0;

        let mut acc = AverageAccumulator::new();
        acc.fold(&Ensemble::with_uniform(1, 1, 1.0));
        acc.fold(&Ensemble::with_uniform(1, 1, 3.0));
        let avg = acc.emit(&opts, EnsembleSource::LongTermAverage).unwrap();
        assert_eq!(avg.beam_velocity[0][0], 20.0);
    }

    #[test]
    fn disabled_fields_pass_through_last_ensemble() {
        let mut acc = AverageAccumulator::new();
        acc.fold(&Ensemble::with_uniform(1, 1, 1.0));
        acc.fold(&Ensemble::with_uniform(1, 1, 5.0));
        let avg = acc
            .emit(&velocity_options(), EnsembleSource::ShortTermAverage)
            .unwrap();
        // Amplitude was not enabled: last folded value, not the mean.
        assert_eq!(avg.amplitude[0][0], 5.0);
        assert_eq!(avg.beam_velocity[0][0], 3.0);
    }

    #[test]
    fn reference_layer_subtracts_column_baseline() {
        let mut opts = velocity_options();
        opts.reference_layer = ReferenceLayer { enabled: true, min_bin: 0, max_bin: 1 };

        let mut ens = Ensemble::with_uniform(3, 1, 0.0);
        ens.beam_velocity = vec![vec![1.0], vec![3.0], vec![10.0]];

        let mut acc = AverageAccumulator::new();
        acc.fold(&ens);
        let avg = acc.emit(&opts, EnsembleSource::LongTermAverage).unwrap();
        // Baseline over bins 0..=1 is 2.0.
        assert_eq!(avg.beam_velocity[0][0], -1.0);
        assert_eq!(avg.beam_velocity[1][0], 1.0);
        assert_eq!(avg.beam_velocity[2][0], 8.0);
    }
}
