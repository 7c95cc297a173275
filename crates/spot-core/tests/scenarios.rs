//! End-to-end detector scenarios: calibration, alarms, learning, and the
//! bounded detrended variant.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use spot_core::*;

fn ramp() -> Vec<f64> {
    (1..=100).map(|i| i as f64).collect()
}

/// Gaussian-ish noise from a seeded generator (sum of uniforms).
fn noise(rng: &mut StdRng, n: usize, scale: f64) -> Vec<f64> {
    (0..n)
        .map(|_| {
            let s: f64 = (0..12).map(|_| rng.gen::<f64>()).sum();
            (s - 6.0) * scale
        })
        .collect()
}

// ── Calibration ─────────────────────────────────────────────────────────

#[test]
fn ramp_calibration_places_order_statistics() {
    let state = fit(&ramp(), 1e-4).unwrap();
    assert_eq!(state.threshold(Side::Upper).init_threshold, 99.0);
    assert_eq!(state.threshold(Side::Lower).init_threshold, 3.0);
    assert!(state.extreme_quantile(Side::Upper) > 99.0);
    assert!(state.extreme_quantile(Side::Lower) < 3.0);
}

#[test]
fn order_statistics_hold_on_random_batches() {
    let mut rng = StdRng::seed_from_u64(7);
    for n in [137usize, 500, 1000] {
        let batch = noise(&mut rng, n, 1.0);
        let state = fit(&batch, 1e-3).unwrap();
        let mut sorted = batch.clone();
        sorted.sort_by(f64::total_cmp);
        assert_eq!(
            state.threshold(Side::Upper).init_threshold,
            sorted[(0.98 * n as f64) as usize]
        );
        assert_eq!(
            state.threshold(Side::Lower).init_threshold,
            sorted[(0.02 * n as f64) as usize]
        );
    }
}

// ── Alarm handling ──────────────────────────────────────────────────────

#[test]
fn alarm_reading_does_not_touch_the_model() {
    let mut state = fit(&ramp(), 1e-4).unwrap();
    let qu = state.extreme_quantile(Side::Upper);
    let nt = state.threshold(Side::Upper).peak_count;
    let n = state.observation_count();

    let v = state.ingest(qu + 1.0, true).unwrap();
    assert!(v.alarm);
    assert_eq!(state.threshold(Side::Upper).peak_count, nt);
    assert_eq!(state.observation_count(), n);
    assert_eq!(state.extreme_quantile(Side::Upper), qu);
}

#[test]
fn learning_mode_folds_alarm_level_reading_into_the_tail() {
    let mut state = fit(&ramp(), 1e-4).unwrap();
    let qu = state.extreme_quantile(Side::Upper);
    let nt = state.threshold(Side::Upper).peak_count;
    let n = state.observation_count();

    let v = state.ingest(qu + 1.0, false).unwrap();
    assert!(!v.alarm);
    assert_eq!(state.threshold(Side::Upper).peak_count, nt + 1);
    assert_eq!(state.observation_count(), n + 1);
    assert_ne!(state.extreme_quantile(Side::Upper), qu);
    assert_eq!(v.upper_threshold, state.extreme_quantile(Side::Upper));
}

/// Readings between the initial threshold and the extreme quantile update
/// the tail whatever `with_alarm` says; only alarm-level readings depend on
/// it. Kept as observed behaviour of the detector.
#[test]
fn with_alarm_only_gates_alarm_level_readings() {
    let between = 100.0;
    for with_alarm in [true, false] {
        let mut state = fit(&ramp(), 1e-4).unwrap();
        let v = state.ingest(between, with_alarm).unwrap();
        assert!(!v.alarm);
        assert_eq!(v.decision, Decision::Peak(Side::Upper));
        assert_eq!(state.threshold(Side::Upper).peak_count, 2);
        assert_eq!(state.observation_count(), 101);
    }

    let mut alarmed = fit(&ramp(), 1e-4).unwrap();
    let mut learned = alarmed.clone();
    let far = alarmed.extreme_quantile(Side::Upper) + 10.0;
    alarmed.ingest(far, true).unwrap();
    learned.ingest(far, false).unwrap();
    assert_eq!(alarmed.peaks(Side::Upper).len(), 1);
    assert_eq!(learned.peaks(Side::Upper).len(), 2);
}

#[test]
fn lower_side_mirrors_upper() {
    let mut state = fit(&ramp(), 1e-4).unwrap();
    let ql = state.extreme_quantile(Side::Lower);

    let v = state.ingest(ql - 1.0, true).unwrap();
    assert_eq!(v.alarm_side(), Some(Side::Lower));

    let v = state.ingest(2.5, true).unwrap();
    assert_eq!(v.decision, Decision::Peak(Side::Lower));
    assert_eq!(state.peaks(Side::Lower).len(), 3);
}

#[test]
fn bulk_reading_only_advances_n() {
    let mut state = fit(&ramp(), 1e-4).unwrap();
    let before = state.clone();
    for (i, v) in [3.0, 50.0, 99.0].into_iter().enumerate() {
        let verdict = state.ingest(v, true).unwrap();
        assert_eq!(verdict.decision, Decision::Bulk);
        assert_eq!(state.observation_count(), before.observation_count() + i as u64 + 1);
    }
    assert_eq!(state.thresholds(), before.thresholds());
    assert_eq!(state.peaks(Side::Upper), before.peaks(Side::Upper));
    assert_eq!(state.peaks(Side::Lower), before.peaks(Side::Lower));
}

// ── Estimators ──────────────────────────────────────────────────────────

#[test]
fn moments_on_identical_peaks_is_degenerate() {
    let peaks = PeakSet::from_levels(Side::Upper, vec![15.0, 15.0, 15.0], 10.0, PeakPolicy::Unbounded);
    assert_eq!(peaks.excesses(), &[5.0, 5.0, 5.0]);
    let err = MomentEstimator.estimate(&peaks).unwrap_err();
    assert!(matches!(err, SpotError::DegenerateVariance { count: 3 }));
}

#[test]
fn mom_spot_calibrates_on_noisy_batch() {
    let mut rng = StdRng::seed_from_u64(11);
    let batch = noise(&mut rng, 2000, 1.0);
    let mut p = StreamProcessor::new(SpotConfig::mom_spot(1e-3));
    p.fit(&batch).unwrap();
    let state = p.state().unwrap();
    assert!(state.threshold(Side::Upper).sigma > 0.0);
    assert!(state.extreme_quantile(Side::Upper) > state.threshold(Side::Upper).init_threshold);
    assert!(!p.ingest(0.0, true).unwrap().alarm);
    assert!(p.ingest(100.0, true).unwrap().alarm);
}

// ── Bounded detrended variant ───────────────────────────────────────────

fn drifting(rng: &mut StdRng, n: usize) -> Vec<f64> {
    noise(rng, n, 1.0)
        .into_iter()
        .enumerate()
        .map(|(i, e)| 0.05 * i as f64 + e)
        .collect()
}

#[test]
fn bounded_value_inside_tracked_peaks_changes_nothing_but_n_and_window() {
    let mut rng = StdRng::seed_from_u64(3);
    let batch = drifting(&mut rng, 1000);
    let mut state = Calibrator::new(SpotConfig::espot(1e-3, 10)).fit(&batch).unwrap();

    let t = state.threshold(Side::Upper).init_threshold;
    let min_level = state
        .peaks(Side::Upper)
        .levels()
        .iter()
        .copied()
        .fold(f64::INFINITY, f64::min);
    assert!(min_level > t);

    let baseline = state.baseline();
    let raw = baseline + 0.5 * (t + min_level);
    let before = state.clone();

    let v = state.ingest(raw, false).unwrap();
    assert_eq!(v.decision, Decision::Peak(Side::Upper));
    assert_eq!(state.thresholds(), before.thresholds());
    assert_eq!(state.peaks(Side::Upper), before.peaks(Side::Upper));
    assert_eq!(state.observation_count(), before.observation_count() + 1);

    let window: Vec<f64> = state.window().unwrap().values().collect();
    assert_eq!(window.last().copied(), Some(raw));
    assert_eq!(window.len(), 10);
}

#[test]
fn bounded_replacement_moves_the_initial_threshold() {
    let mut rng = StdRng::seed_from_u64(5);
    let batch = drifting(&mut rng, 1000);
    let mut state = Calibrator::new(SpotConfig::espot(1e-3, 10)).fit(&batch).unwrap();
    let cap = state.peaks(Side::Upper).len();
    let t = state.threshold(Side::Upper).init_threshold;
    let n = state.observation_count();

    // Just past the extreme quantile in learning mode: always replaces.
    let raw = state.baseline() + state.extreme_quantile(Side::Upper) + 0.5;
    let v = state.ingest(raw, false).unwrap();
    assert!(!v.alarm);
    assert_ne!(state.threshold(Side::Upper).init_threshold, t);
    assert!(state.peaks(Side::Upper).len() <= cap);
    assert_eq!(
        state.threshold(Side::Upper).peak_count,
        state.peaks(Side::Upper).len() as u64
    );
    assert_eq!(state.observation_count(), n + 1);
}

#[test]
fn bounded_lower_replacement_refits_only_the_lower_side() {
    // Only the side whose peak set changed is refitted. Refitting the upper
    // side on every bounded update would leave the lower quantile stale.
    let mut rng = StdRng::seed_from_u64(5);
    let batch = drifting(&mut rng, 1000);
    let mut state = Calibrator::new(SpotConfig::espot(1e-3, 10)).fit(&batch).unwrap();
    let upper = *state.threshold(Side::Upper);
    let lower = *state.threshold(Side::Lower);
    let n = state.observation_count();

    let raw = state.baseline() + state.extreme_quantile(Side::Lower) - 0.5;
    let v = state.ingest(raw, false).unwrap();
    assert!(!v.alarm);
    assert_eq!(v.decision, Decision::Peak(Side::Lower));

    let now = *state.threshold(Side::Lower);
    assert_ne!(now.init_threshold, lower.init_threshold);
    assert_ne!(now.extreme_quantile, lower.extreme_quantile);
    assert_eq!(now.peak_count, state.peaks(Side::Lower).len() as u64);
    assert_eq!(state.observation_count(), n + 1);

    let after = *state.threshold(Side::Upper);
    assert_eq!(after.init_threshold.to_bits(), upper.init_threshold.to_bits());
    assert_eq!(after.extreme_quantile.to_bits(), upper.extreme_quantile.to_bits());
    assert_eq!(after.gamma.to_bits(), upper.gamma.to_bits());
    assert_eq!(after.sigma.to_bits(), upper.sigma.to_bits());
    assert_eq!(after.peak_count, upper.peak_count);

    let restored = deserialize(&serialize(&state).unwrap()).unwrap();
    assert_eq!(restored, state);
}

#[test]
fn bounded_alarm_still_counts_the_reading() {
    let mut rng = StdRng::seed_from_u64(9);
    let batch = drifting(&mut rng, 1000);
    let mut state = Calibrator::new(SpotConfig::espot(1e-3, 10)).fit(&batch).unwrap();
    let n = state.observation_count();
    let raw = state.baseline() + state.extreme_quantile(Side::Upper) + 50.0;
    let v = state.ingest(raw, true).unwrap();
    assert!(v.alarm);
    assert_eq!(state.observation_count(), n + 1);
}

#[test]
fn detrended_thresholds_follow_the_drift() {
    let mut rng = StdRng::seed_from_u64(21);
    let series = drifting(&mut rng, 3000);
    let (calib, stream) = series.split_at(1000);
    let mut state = Calibrator::new(SpotConfig::espot(1e-4, 10)).fit(calib).unwrap();

    let out = state.predict_batch(stream, true).unwrap();
    assert_eq!(out.len(), stream.len());
    // The drift adds 100 over the stream; thresholds must track it.
    let first = out.upper_thresholds[0];
    let last = out.upper_thresholds[out.len() - 1];
    assert!(last - first > 50.0, "first {first}, last {last}");
    assert!(out.alarms.len() < stream.len() / 20);
}

// ── Fault handling ──────────────────────────────────────────────────────

#[test]
fn fatal_error_requires_recalibration() {
    let state = fit(&ramp(), 1e-4).unwrap();
    let mut config = state.config().clone();
    config.estimator = EstimatorKind::Moments;
    let bytes = String::from_utf8(serialize(&state).unwrap())
        .unwrap()
        .replace("\"grimshaw\",\"peak_policy\"", "\"moments\",\"peak_policy\"");
    let moment_state = deserialize(bytes.as_bytes()).unwrap();
    assert_eq!(moment_state.config(), &config);

    let mut p = StreamProcessor::from_state(moment_state);
    let err = p.ingest(100.0, true).unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(p.ingest(50.0, true), Err(SpotError::DetectorFaulted(_))));
    assert!(matches!(p.phase(), Phase::Faulted(_)));
}

#[test]
fn rejected_reading_is_not_fatal() {
    let mut p = StreamProcessor::new(SpotConfig::default());
    p.fit(&ramp()).unwrap();
    assert!(matches!(
        p.ingest(f64::NAN, true),
        Err(SpotError::UnsupportedInputShape(_))
    ));
    assert!(p.is_calibrated());
}

// ── Monitoring and persistence ──────────────────────────────────────────

#[test]
fn monitor_set_survives_a_restart() {
    let dir = std::env::temp_dir().join(format!("spot_scenario_{}", uuid::Uuid::new_v4()));
    let store = JsonFileStore::new(dir.join("detectors.json"));

    let mut rng = StdRng::seed_from_u64(1);
    let latency = MetricId::new("api", "latency_ms");
    let errors = MetricId::new("api", "error_rate");

    let mut set = MonitorSet::new(SpotConfig::bispot(1e-3));
    set.calibrate(latency.clone(), &noise(&mut rng, 500, 1.0)).unwrap();
    set.calibrate(errors.clone(), &noise(&mut rng, 500, 0.1)).unwrap();
    store.save(&set.states()).unwrap();

    let mut restored = MonitorSet::new(SpotConfig::default());
    restored.restore(store.load().unwrap()).unwrap();
    assert_eq!(restored.len(), 2);

    for v in noise(&mut rng, 50, 1.0) {
        assert_eq!(
            set.observe(&latency, v, true).unwrap(),
            restored.observe(&latency, v, true).unwrap()
        );
    }
    restored.observe(&errors, 1e3, true).unwrap();
    assert_eq!(restored.recent_alarms().last().unwrap().metric, errors);

    let _ = std::fs::remove_dir_all(&dir);
}
