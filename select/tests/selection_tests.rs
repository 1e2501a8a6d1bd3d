//! Selection tests
//!
//! These tests resolve and materialize selections on small recordings
//! written to temporary directories, and check the results against the
//! same selection taken from the in-memory values.

use ephys_data::{
    ArrayStore, Coordinates, DType, DataHandle, DataKind, Dataset, DiskArray, Index, Slice,
    StorageConfig, TrialDefinition,
};
use ephys_select::{
    SelectError, Selection, SelectionRequest, Selector, SelectorResolver, TrialMaterializer,
    Value, select,
};
use itertools::Itertools;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

const NCHAN: usize = 6;
const RATE: f64 = 10.0;

/// Value stored at (sample, channel)
fn value(t: usize, c: usize) -> f64 {
    (t * NCHAN + c) as f64
}

fn write_recording(path: &Path, n_time: usize) -> anyhow::Result<DiskArray> {
    let values: Vec<f32> = (0..n_time)
        .flat_map(|t| (0..NCHAN).map(move |c| value(t, c) as f32))
        .collect();
    Ok(DiskArray::create_from(path, vec![n_time, NCHAN], &values)?)
}

fn continuous(store: Arc<dyn ArrayStore>, trials: Vec<(usize, usize)>) -> anyhow::Result<Dataset> {
    let n = trials.len();
    let def = TrialDefinition::new(trials, vec![-2; n], Array2::zeros((n, 0)))?;
    let mut dataset = Dataset::continuous(
        DataHandle::new(store),
        vec!["time".into(), "channel".into()],
        Some(RATE),
    )?
    .with_coords("channel", Coordinates::numbered("chan", NCHAN))?;
    dataset.redefine_trials(def)?;
    Ok(dataset)
}

fn recording(dir: &Path, n_time: usize, trials: Vec<(usize, usize)>) -> anyhow::Result<Dataset> {
    let array = write_recording(&dir.join("rec.dat"), n_time)?;
    continuous(Arc::new(array), trials)
}

fn data_files(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext == "dat"))
                .collect()
        })
        .unwrap_or_default()
}

/// Randomized selections match a sorted, de-duplicated reference
#[test]
fn test_random_selections_match_reference() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut rng = StdRng::seed_from_u64(7);
    let n_time = 200;
    let trials: Vec<(usize, usize)> = (0..8)
        .map(|_| {
            let start = rng.random_range(0..150);
            (start, start + rng.random_range(10..40))
        })
        .collect();
    let dataset = recording(dir.path(), n_time, trials.clone())?;
    let config = StorageConfig::in_dir(dir.path().join("store"));

    for _ in 0..20 {
        let mut channels: Vec<usize> = (0..NCHAN).collect();
        channels.shuffle(&mut rng);
        channels.truncate(rng.random_range(1..=NCHAN));
        // repeat one channel now and then
        if rng.random_bool(0.3) {
            channels.push(channels[0]);
        }
        let mut picked: Vec<usize> = (0..trials.len()).collect();
        picked.shuffle(&mut rng);
        picked.truncate(rng.random_range(1..=trials.len()));
        let a = rng.random_range(0..5);
        let b = rng.random_range(a + 1..=10);
        let deepcopy = rng.random_bool(0.5);

        let request = SelectionRequest::builder()
            .select("channel", Selector::IndexList(channels.clone()))
            .select("time", Selector::range(a, b))
            .trials(picked.clone())
            .deepcopy(deepcopy)
            .build()?;
        let out = select(&dataset, &request, &config)?;

        let expected_channels: Vec<usize> = channels.iter().copied().sorted().dedup().collect();
        assert_eq!(out.ntrials(), picked.len());
        assert_eq!(
            out.coords("channel"),
            Some(&Coordinates::Labels(
                expected_channels.iter().map(|c| format!("chan{}", c + 1)).collect()
            ))
        );
        for (i, &k) in picked.iter().enumerate() {
            let start = trials[k].0;
            let trial = out.trial(i)?;
            assert_eq!(trial.shape(), &[b - a, expected_channels.len()]);
            for (t, row) in trial.outer_iter().enumerate() {
                for (j, &c) in expected_channels.iter().enumerate() {
                    let expected = value(start + a + t, c);
                    assert_eq!(row[j], expected, "trial {k}, sample {t}, channel {c}");
                }
            }
            assert_eq!(out.trial_definition().t0()[i], -2 + a as i64);
        }
        if deepcopy || !equidistant(&expected_channels) {
            assert!(!out.data().shares_storage(dataset.data()));
        }
    }
    Ok(())
}

fn equidistant(list: &[usize]) -> bool {
    list.iter().tuple_windows().all(|(a, b)| b - a == list[1] - list[0])
}

/// A contiguous index list resolves exactly like the equivalent slice
#[test]
fn test_contiguous_list_equals_slice() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let dataset = recording(dir.path(), 60, vec![(0, 20), (20, 40), (40, 60)])?;
    let config = StorageConfig::in_dir(dir.path().join("store"));

    let by_list = SelectionRequest::builder()
        .select("channel", Selector::IndexList(vec![1, 2, 3]))
        .build()?;
    let by_slice = SelectionRequest::builder()
        .select("channel", Selector::range(1, 4))
        .build()?;
    assert_eq!(by_list.resolve(&dataset)?, by_slice.resolve(&dataset)?);

    let a = select(&dataset, &by_list, &config)?;
    let b = select(&dataset, &by_slice, &config)?;
    for (x, y) in a.trials().zip(b.trials()) {
        assert_eq!(x?, y?);
    }
    Ok(())
}

/// Slices without deepcopy share the source store and write nothing
#[test]
fn test_view_shares_storage() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let dataset = recording(dir.path(), 60, vec![(0, 20), (30, 50)])?;
    let store = dir.path().join("store");
    let config = StorageConfig::in_dir(&store);

    let request = SelectionRequest::builder()
        .select("channel", Selector::between("chan2", "chan4"))
        .select("time", Selector::between(-0.1, 0.5))
        .trials(vec![1])
        .build()?;
    let selection = request.resolve(&dataset)?;
    assert!(!selection.requires_copy());
    let out = TrialMaterializer::new(config).materialize(&dataset, &selection)?;

    assert!(out.data().shares_storage(dataset.data()));
    assert!(data_files(&store).is_empty());
    // -0.1 s is sample 1 of a trial starting at -0.2 s; 0.5 s is sample 7
    assert_eq!(out.sampleinfo(), &[(31, 38)]);
    assert_eq!(out.trial_definition().t0(), &[-1]);
    let trial = out.trial(0)?;
    assert_eq!(trial.shape(), &[7, 3]);
    assert_eq!(trial[[0, 0]], value(31, 1));
    Ok(())
}

/// Copies lay trials out gap-free, storing shared samples once
#[test]
fn test_copy_renumbers_overlapping_trials() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let dataset = recording(dir.path(), 40, vec![(0, 10), (5, 15), (20, 30)])?;
    let store = dir.path().join("store");
    let config = StorageConfig::in_dir(&store);

    let request = SelectionRequest::builder()
        .select("channel", Selector::IndexList(vec![0, 2, 5]))
        .build()?;
    let out = select(&dataset, &request, &config)?;

    assert!(!out.data().shares_storage(dataset.data()));
    assert_eq!(out.sampleinfo(), &[(0, 10), (5, 15), (15, 25)]);
    assert_eq!(out.data().shape(), vec![25, 3]);
    for (k, trial) in out.trials().enumerate() {
        let trial = trial?;
        let start = dataset.sampleinfo()[k].0;
        assert_eq!(trial.shape(), &[10, 3]);
        assert_eq!(trial[[0, 0]], value(start, 0));
        assert_eq!(trial[[9, 2]], value(start + 9, 5));
    }
    let files = data_files(&store);
    assert_eq!(files.len(), 1);
    assert!(files[0].with_extension("dat.info").exists());
    Ok(())
}

/// Trials reordered or stepped in time start new runs with monotone bounds
#[test]
fn test_copy_bounds_are_monotone() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let dataset = recording(dir.path(), 60, vec![(0, 20), (10, 30), (40, 60)])?;
    let config = StorageConfig::in_dir(dir.path().join("store"));

    let request = SelectionRequest::builder()
        .select("time", Selector::IndexRange { start: Some(0), stop: Some(12), step: 2 })
        .trials(vec![2, 0, 1])
        .build()?;
    let out = select(&dataset, &request, &config)?;

    let starts: Vec<usize> = out.sampleinfo().iter().map(|s| s.0).collect();
    assert!(starts.iter().tuple_windows().all(|(a, b)| a <= b));
    assert!(out.sampleinfo().iter().all(|(a, b)| b - a == 6));
    let trial = out.trial(0)?;
    assert_eq!(trial[[1, 0]], value(42, 0));
    assert_eq!(out.samplerate(), Some(RATE / 2.0));
    assert_eq!(out.trial_definition().t0(), &[-1, -1, -1]);
    Ok(())
}

fn assert_times(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-9, "{actual:?} != {expected:?}");
    }
}

/// Stepped time copies run at the reduced rate and keep sample times
#[test]
fn test_stepped_copy_keeps_sample_times() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut dataset = recording(dir.path(), 40, vec![(0, 20)])?;
    dataset.redefine_trials(TrialDefinition::new(vec![(0, 20)], vec![0], Array2::zeros((1, 0)))?)?;
    let config = StorageConfig::in_dir(dir.path().join("store"));

    let request = SelectionRequest::builder()
        .select("time", Selector::IndexList(vec![0, 2, 4, 6]))
        .build()?;
    let out = select(&dataset, &request, &config)?;

    assert!(!out.data().shares_storage(dataset.data()));
    assert_eq!(out.samplerate(), Some(5.0));
    let trial = out.trial(0)?;
    assert_eq!(trial.shape(), &[4, NCHAN]);
    let first: Vec<f64> = trial.iter().step_by(NCHAN).copied().collect();
    assert_eq!(first, vec![value(0, 0), value(2, 0), value(4, 0), value(6, 0)]);
    assert_times(&out.time(0)?, &[0.0, 0.2, 0.4, 0.6]);

    // the source's own time axis at the kept samples
    let source = dataset.time(0)?;
    let kept: Vec<f64> = [0, 2, 4, 6].iter().map(|&i| source[i]).collect();
    assert_times(&out.time(0)?, &kept);

    // samples 4 and 7 of a trial with t0 = -1 lie at 0.3 s and 0.6 s
    dataset.redefine_trials(TrialDefinition::new(vec![(0, 20)], vec![-1], Array2::zeros((1, 0)))?)?;
    let request = SelectionRequest::builder()
        .select("time", Selector::IndexRange { start: Some(4), stop: Some(10), step: 3 })
        .build()?;
    let out = select(&dataset, &request, &config)?;
    assert_eq!(out.samplerate(), Some(RATE / 3.0));
    assert_eq!(out.trial_definition().t0(), &[1]);
    assert_times(&out.time(0)?, &[0.3, 0.6]);
    Ok(())
}

/// A stepped copy whose time zero falls between kept samples is rejected
#[test]
fn test_stepped_copy_off_time_zero_is_invalid() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let dataset = recording(dir.path(), 40, vec![(0, 20)])?;
    let storage = dir.path().join("store");

    // t0 = -2 moved by one sample is odd
    let request = SelectionRequest::builder()
        .select("time", Selector::IndexRange { start: Some(1), stop: Some(9), step: 2 })
        .build()?;
    let err = select(&dataset, &request, &StorageConfig::in_dir(&storage)).unwrap_err();
    assert!(err.is_invalid_value());
    assert!(data_files(&storage).is_empty());
    Ok(())
}

/// Copies above the configured threshold still complete
#[test]
fn test_large_copy_is_reported_and_written() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let dataset = recording(dir.path(), 40, vec![(0, 20), (20, 40)])?;
    let storage = dir.path().join("store");
    let config = StorageConfig {
        copy_warning_bytes: 16,
        ..StorageConfig::in_dir(&storage)
    };

    let request = SelectionRequest::builder().deepcopy(true).build()?;
    let out = select(&dataset, &request, &config)?;
    assert!(config.exceeds_copy_threshold(out.data().nbytes()));
    assert!(!StorageConfig::in_dir(&storage).exceeds_copy_threshold(out.data().nbytes()));
    assert_eq!(data_files(&storage).len(), 1);
    assert_eq!(out.trial(1)?, dataset.trial(1)?);
    Ok(())
}

/// First coordinate at minimum distance from `x`
fn nearest(coords: &[f64], x: f64) -> usize {
    let mut best = 0;
    for (i, v) in coords.iter().enumerate() {
        if (v - x).abs() < (coords[best] - x).abs() {
            best = i;
        }
    }
    best
}

/// Value ranges snap both bounds to the nearest coordinate, the first on ties
#[test]
fn test_value_ranges_snap_to_nearest() -> anyhow::Result<()> {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..200 {
        let len = rng.random_range(1..12);
        let mut at = f64::from(rng.random_range(-20..20)) * 0.25;
        let values: Vec<f64> = (0..len)
            .map(|_| {
                let v = at;
                at += f64::from(rng.random_range(1..=4)) * 0.5;
                v
            })
            .collect();
        let coords = Coordinates::Values(values.clone());
        let resolver = SelectorResolver::new("freq", len, Some(&coords), false);

        // quarter steps between half-step coordinates land on midpoints
        let span = (values[0] - 2.0, values[len - 1] + 2.0);
        let quarters = ((span.1 - span.0) / 0.25) as i32;
        let mut bounds = [0, 0].map(|_| span.0 + f64::from(rng.random_range(0..=quarters)) * 0.25);
        bounds.sort_by(f64::total_cmp);
        let [lo, hi] = bounds.map(|b| (!rng.random_bool(0.2)).then_some(b));

        let first = lo.map_or(0, |x| nearest(&values, x));
        let last = hi.map_or(len - 1, |x| nearest(&values, x));
        let selector = Selector::ValueRange(lo.map(Value::Number), hi.map(Value::Number));
        assert_eq!(
            resolver.resolve(&selector)?,
            Index::Slice(Slice::range(first, last + 1)),
            "{values:?} in [{lo:?}, {hi:?}]"
        );
    }
    Ok(())
}

/// A store that fails after a number of reads
#[derive(Debug)]
struct FlakyStore {
    inner: DiskArray,
    reads_left: AtomicUsize,
}

impl ArrayStore for FlakyStore {
    fn shape(&self) -> &[usize] {
        self.inner.shape()
    }

    fn dtype(&self) -> DType {
        self.inner.dtype()
    }

    fn paths(&self) -> Vec<&Path> {
        self.inner.paths()
    }

    fn read(&self, index: &[Index]) -> ephys_data::Result<Vec<u8>> {
        if self.reads_left.fetch_sub(1, Ordering::SeqCst) == 0 {
            return Err(std::io::Error::other("device went away").into());
        }
        self.inner.read(index)
    }
}

/// A copy that fails part-way leaves no output behind
#[test]
fn test_failed_copy_removes_output() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = FlakyStore {
        inner: write_recording(&dir.path().join("rec.dat"), 40)?,
        reads_left: AtomicUsize::new(1),
    };
    let dataset = continuous(Arc::new(store), vec![(0, 10), (20, 30)])?;
    let storage = dir.path().join("store");

    let request = SelectionRequest::builder().deepcopy(true).build()?;
    let err = select(&dataset, &request, &StorageConfig::in_dir(&storage)).unwrap_err();
    assert!(matches!(err, SelectError::Data(_) | SelectError::Io(_) | SelectError::Other { .. }));
    assert!(data_files(&storage).is_empty());
    Ok(())
}

/// A time selection that leaves a trial empty is rejected before copying
#[test]
fn test_time_past_short_trial_is_invalid() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let dataset = recording(dir.path(), 40, vec![(0, 20), (20, 24)])?;
    let storage = dir.path().join("store");

    let request = SelectionRequest::builder()
        .select("time", Selector::range(10, 15))
        .deepcopy(true)
        .build()?;
    let err = select(&dataset, &request, &StorageConfig::in_dir(&storage)).unwrap_err();
    assert!(err.is_invalid_value());
    assert!(data_files(&storage).is_empty());
    Ok(())
}

/// Time lists must reduce to a slice
#[test]
fn test_time_lists_must_be_equidistant() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let dataset = recording(dir.path(), 40, vec![(0, 20)])?;

    let uneven = SelectionRequest::builder()
        .select("time", Selector::IndexList(vec![0, 1, 3]))
        .build()?;
    assert!(matches!(uneven.resolve(&dataset), Err(SelectError::InvalidValue { .. })));

    let even = SelectionRequest::builder()
        .select("time", Selector::IndexList(vec![0, 1, 2, 3]))
        .build()?;
    let selection: Selection = even.resolve(&dataset)?;
    assert_eq!(selection.time(), Some(&ephys_data::Slice::range(0, 4)));
    assert!(!selection.requires_copy());
    Ok(())
}

/// Unknown dimensions and mismatched selector kinds fail to resolve
#[test]
fn test_bad_selectors_are_rejected() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let dataset = recording(dir.path(), 40, vec![(0, 20)])?;

    let unknown = SelectionRequest::builder()
        .select("freq", Selector::all())
        .build()?;
    assert!(unknown.resolve(&dataset).unwrap_err().is_invalid_value());

    let numeric = SelectionRequest::builder()
        .select("channel", Selector::between(0.0, 2.0))
        .build()?;
    assert!(matches!(numeric.resolve(&dataset), Err(SelectError::TypeMismatch { .. })));

    let twice = SelectionRequest::builder()
        .select("channel", Selector::SingleIndex(0))
        .select("channel", Selector::SingleIndex(1))
        .build()?;
    assert!(twice.resolve(&dataset).is_err());
    Ok(())
}

/// Discrete selections keep matching rows of the selected trials
#[test]
fn test_discrete_selection_filters_rows() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    // [sample, channel, unit]
    let rows: [[i64; 3]; 8] = [
        [2, 0, 0],
        [4, 1, 0],
        [6, 0, 1],
        [8, 2, 0],
        [12, 1, 1],
        [14, 0, 0],
        [16, 2, 1],
        [18, 1, 0],
    ];
    let values: Vec<i64> = rows.iter().flatten().copied().collect();
    let array = DiskArray::create_from(dir.path().join("spikes.dat"), vec![8, 3], &values)?;
    let mut dataset = Dataset::discrete(
        DataHandle::new(Arc::new(array)),
        vec!["sample".into(), "channel".into(), "unit".into()],
        Some(RATE),
    )?
    .with_coords("channel", Coordinates::numbered("chan", 3))?;
    dataset.redefine_trials(TrialDefinition::new(
        vec![(0, 10), (10, 20)],
        vec![0, 0],
        Array2::zeros((2, 0)),
    )?)?;
    let trialid: Vec<Option<usize>> = [0, 0, 0, 0, 1, 1, 1, 1].into_iter().map(Some).collect();
    assert_eq!(dataset.trialid(), trialid.as_slice());

    let request = SelectionRequest::builder()
        .select("channel", Selector::IndexList(vec![0, 1]))
        .select("unit", Selector::SingleIndex(0))
        .trials(vec![1, 0])
        .build()?;
    let out = select(&dataset, &request, &StorageConfig::in_dir(dir.path().join("store")))?;

    assert_eq!(out.kind(), DataKind::Discrete);
    assert_eq!(out.sampleinfo(), &[(10, 20), (0, 10)]);
    assert_eq!(out.samples()?, vec![14, 18, 2, 4]);
    assert_eq!(out.trial(0)?.shape(), &[2, 3]);
    assert_eq!(out.trial(1)?.iter().step_by(3).copied().collect::<Vec<_>>(), vec![2.0, 4.0]);
    assert_eq!(out.coords("channel"), dataset.coords("channel"));
    Ok(())
}
