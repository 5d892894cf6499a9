use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::average::accumulator::AverageAccumulator;
use crate::average::options::{AverageOptions, WindowMode};
use crate::core::{Ensemble, EnsembleSource};

/// Which of the two independent averaging streams a manager feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AverageKind {
    LongTerm,
    ShortTerm,
}

impl AverageKind {
    /// Source tag stamped on emitted ensembles.
    pub fn source(self) -> EnsembleSource {
        match self {
            AverageKind::LongTerm => EnsembleSource::LongTermAverage,
            AverageKind::ShortTerm => EnsembleSource::ShortTermAverage,
        }
    }
}

/// Converts a stream of ensembles into a stream of averaged ensembles
/// according to the configured window policy.
///
/// The accumulator is only ever mutated by the single drain worker that
/// calls [`add_ensemble`](Self::add_ensemble); the surrounding runtime
/// synchronizes configuration changes against it.
pub struct AverageManager {
    kind: AverageKind,
    options: AverageOptions,
    accumulator: AverageAccumulator,
    /// Sliding set for running-average mode.
    window: VecDeque<Ensemble>,
    window_started: Option<Instant>,
}

impl AverageManager {
    pub fn new(kind: AverageKind, options: AverageOptions) -> Self {
        Self {
            kind,
            options,
            accumulator: AverageAccumulator::new(),
            window: VecDeque::new(),
            window_started: None,
        }
    }

    pub fn kind(&self) -> AverageKind {
        self.kind
    }

    pub fn options(&self) -> &AverageOptions {
        &self.options
    }

    /// Replace the configuration. A mode change discards any in-progress
    /// accumulation; there is no partial-window carry-over.
    pub fn configure(&mut self, options: AverageOptions) {
        if options.mode != self.options.mode {
            self.discard_window();
        }
        self.options = options;
    }

    /// Discard all accumulated state and any pending window. Emits nothing.
    pub fn clear(&mut self) {
        self.discard_window();
    }

    /// Ensembles folded into the window in progress.
    pub fn accumulated(&self) -> usize {
        match self.options.mode {
            WindowMode::Running { .. } => self.window.len(),
            _ => self.accumulator.count(),
        }
    }

    /// Fold one ensemble in; returns the averaged ensemble if this arrival
    /// closed (or, in running mode, updated) a window.
    pub fn add_ensemble(&mut self, ensemble: &Ensemble) -> Option<Ensemble> {
        match self.options.mode {
            WindowMode::SampleCount { samples } => self.add_by_sample_count(ensemble, samples),
            WindowMode::Timer { interval_ms } => self.add_by_timer(ensemble, interval_ms),
            WindowMode::Running { capacity } => self.add_running(ensemble, capacity),
        }
    }

    fn add_by_sample_count(&mut self, ensemble: &Ensemble, samples: usize) -> Option<Ensemble> {
        self.accumulator.fold(ensemble);
        if self.accumulator.count() >= samples {
            self.accumulator.emit(&self.options, self.kind.source())
        } else {
            None
        }
    }

    fn add_by_timer(&mut self, ensemble: &Ensemble, interval_ms: u64) -> Option<Ensemble> {
        // A window closes lazily: the first arrival after expiry finalizes
        // the previous window, then seeds the next one.
        let mut emitted = None;
        if let Some(started) = self.window_started {
            if started.elapsed() >= Duration::from_millis(interval_ms)
                && !self.accumulator.is_empty()
            {
                emitted = self.accumulator.emit(&self.options, self.kind.source());
                self.window_started = None;
            }
        }

        self.accumulator.fold(ensemble);
        if self.accumulator.count() == 1 {
            self.window_started = Some(Instant::now());
        }
        emitted
    }

    fn add_running(&mut self, ensemble: &Ensemble, capacity: usize) -> Option<Ensemble> {
        // A width change restarts the sliding set rather than mixing bins.
        if self
            .window
            .back()
            .is_some_and(|prev| {
                prev.num_bins != ensemble.num_bins || prev.num_beams != ensemble.num_beams
            })
        {
            self.window.clear();
        }

        self.window.push_back(ensemble.clone());
        while self.window.len() > capacity {
            self.window.pop_front();
        }

        let mut acc = AverageAccumulator::new();
        for member in &self.window {
            acc.fold(member);
        }
        acc.emit(&self.options, self.kind.source())
    }

    fn discard_window(&mut self) {
        self.accumulator.reset();
        self.window.clear();
        self.window_started = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::average::options::FieldSettings;

    fn options(mode: WindowMode) -> AverageOptions {
        let mut opts = AverageOptions::default();
        opts.mode = mode;
        opts.beam_velocity = FieldSettings::enabled();
        opts
    }

    fn single_bin(value: f64) -> Ensemble {
        Ensemble::with_uniform(1, 1, value)
    }

    #[test]
    fn sample_count_window_emits_mean_and_resets() {
        let mut mgr = AverageManager::new(
            AverageKind::LongTerm,
            options(WindowMode::SampleCount { samples: 3 }),
        );

        assert!(mgr.add_ensemble(&single_bin(1.0)).is_none());
        assert!(mgr.add_ensemble(&single_bin(2.0)).is_none());
        let avg = mgr.add_ensemble(&single_bin(3.0)).unwrap();

        assert_eq!(avg.beam_velocity[0][0], 2.0);
        assert_eq!(avg.source, EnsembleSource::LongTermAverage);
        assert_eq!(mgr.accumulated(), 0);
    }

    #[test]
    fn timer_window_closes_on_next_arrival_after_expiry() {
        let mut mgr = AverageManager::new(
            AverageKind::ShortTerm,
            options(WindowMode::Timer { interval_ms: 100 }),
        );

        assert!(mgr.add_ensemble(&single_bin(4.0)).is_none());
        std::thread::sleep(Duration::from_millis(150));

        let avg = mgr.add_ensemble(&single_bin(8.0)).unwrap();
        assert_eq!(avg.beam_velocity[0][0], 4.0);
        assert_eq!(avg.source, EnsembleSource::ShortTermAverage);
        // The second ensemble seeded a new window.
        assert_eq!(mgr.accumulated(), 1);
    }

    #[test]
    fn timer_window_stays_open_before_expiry() {
        let mut mgr = AverageManager::new(
            AverageKind::ShortTerm,
            options(WindowMode::Timer { interval_ms: 60_000 }),
        );
        assert!(mgr.add_ensemble(&single_bin(1.0)).is_none());
        assert!(mgr.add_ensemble(&single_bin(2.0)).is_none());
        assert_eq!(mgr.accumulated(), 2);
    }

    #[test]
    fn running_average_evicts_oldest() {
        let mut mgr = AverageManager::new(
            AverageKind::ShortTerm,
            options(WindowMode::Running { capacity: 2 }),
        );

        let first = mgr.add_ensemble(&single_bin(10.0)).unwrap();
        let second = mgr.add_ensemble(&single_bin(20.0)).unwrap();
        let third = mgr.add_ensemble(&single_bin(30.0)).unwrap();

        assert_eq!(first.beam_velocity[0][0], 10.0);
        assert_eq!(second.beam_velocity[0][0], 15.0);
        assert_eq!(third.beam_velocity[0][0], 25.0);
    }

    #[test]
    fn clear_is_idempotent_and_emits_nothing() {
        let mut mgr = AverageManager::new(
            AverageKind::LongTerm,
            options(WindowMode::SampleCount { samples: 5 }),
        );

        mgr.clear();
        assert_eq!(mgr.accumulated(), 0);

        mgr.add_ensemble(&single_bin(1.0));
        mgr.add_ensemble(&single_bin(2.0));
        assert_eq!(mgr.accumulated(), 2);

        mgr.clear();
        assert_eq!(mgr.accumulated(), 0);
        mgr.clear();
        assert_eq!(mgr.accumulated(), 0);
    }

    #[test]
    fn mode_change_discards_in_progress_window() {
        let mut mgr = AverageManager::new(
            AverageKind::LongTerm,
            options(WindowMode::SampleCount { samples: 3 }),
        );
        mgr.add_ensemble(&single_bin(100.0));
        mgr.add_ensemble(&single_bin(100.0));

        mgr.configure(options(WindowMode::SampleCount { samples: 2 }));

        // New window: the stale 100.0 members are gone.
        assert!(mgr.add_ensemble(&single_bin(1.0)).is_none());
        let avg = mgr.add_ensemble(&single_bin(3.0)).unwrap();
        assert_eq!(avg.beam_velocity[0][0], 2.0);
    }

    #[test]
    fn reconfigure_without_mode_change_keeps_window() {
        let mut mgr = AverageManager::new(
            AverageKind::LongTerm,
            options(WindowMode::SampleCount { samples: 3 }),
        );
        mgr.add_ensemble(&single_bin(1.0));

        let mut opts = options(WindowMode::SampleCount { samples: 3 });
        opts.beam_velocity.scale = 2.0;
        mgr.configure(opts);

        assert_eq!(mgr.accumulated(), 1);
        mgr.add_ensemble(&single_bin(2.0));
        let avg = mgr.add_ensemble(&single_bin(3.0)).unwrap();
        assert_eq!(avg.beam_velocity[0][0], 4.0);
    }

    #[test]
    fn all_bad_sample_count_window_emits_nothing() {
        let mut mgr = AverageManager::new(
            AverageKind::LongTerm,
            options(WindowMode::SampleCount { samples: 2 }),
        );
        assert!(mgr.add_ensemble(&Ensemble::new(1, 1)).is_none());
        assert!(mgr.add_ensemble(&Ensemble::new(1, 1)).is_none());
        assert_eq!(mgr.accumulated(), 0);
    }

    #[test]
    fn bin_count_change_restarts_sample_window() {
        let mut mgr = AverageManager::new(
            AverageKind::LongTerm,
            options(WindowMode::SampleCount { samples: 2 }),
        );
        assert!(mgr.add_ensemble(&Ensemble::with_uniform(4, 4, 1.0)).is_none());
        // Instrument reconfigured mid-stream: window restarts at the new width.
        assert!(mgr.add_ensemble(&Ensemble::with_uniform(8, 4, 3.0)).is_none());
        let avg = mgr.add_ensemble(&Ensemble::with_uniform(8, 4, 5.0)).unwrap();
        assert_eq!(avg.num_bins, 8);
        assert_eq!(avg.beam_velocity[0][0], 4.0);
    }
}
