//! Turning a resolved [`Selection`] into a new dataset.
//!
//! ## View path
//!
//! Continuous selections made of unit-step slices, without `deepcopy`, become
//! a window into the source store. No file is created and no sample is
//! read; the new dataset shares the store `Arc` with its source. Trial
//! bounds stay absolute, narrowed by the time slice.
//!
//! ## Copy path
//!
//! Everything else is copied into a new array file under
//! [`StorageConfig::dir`], one `commit_trial` per trial. Trials are
//! renumbered onto a gap-free time axis by [`renumber_trials`]: source
//! samples shared by consecutive trials are stored once, and each trial
//! only writes the part of its target range no earlier trial has written,
//! so committed regions never overlap. If any trial fails, the partial
//! output is deleted and the error is returned.
//!
//! Discrete data is always copied: rows of the selected trials are kept when
//! their label columns fall in the selected index sets and their sample lies
//! in the time slice.

use crate::error::{Result, SelectError};
use crate::request::Selection;
use ephys_data::{
    Coordinates, DataHandle, DataKind, Dataset, DiskArrayBuilder, Index, Slice, StorageConfig,
    TrialDefinition, save_info,
};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where one trial lands in a copied time axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// New `[start, stop)` of the trial
    pub target: (usize, usize),
    /// Part of `target` written by this trial; empty if earlier trials cover it
    pub fresh: (usize, usize),
}

impl Placement {
    #[must_use]
    pub const fn fresh_len(&self) -> usize {
        self.fresh.1 - self.fresh.0
    }
}

/// Lays out trials with the given source windows on a new, gap-free axis
///
/// Returns the placement of every trial and the length of the new axis.
/// A trial that starts inside the samples already placed for the current
/// run of unit-step trials (and not before the previous trial) reuses them;
/// any other trial starts a new run at the end of the axis. Trials never
/// change length, and new starts never decrease.
#[must_use]
pub fn renumber_trials(sources: &[Slice]) -> (Vec<Placement>, usize) {
    let mut placements = Vec::with_capacity(sources.len());
    let mut cursor = 0;
    // end of the current run in source samples, and where that run began
    let mut cursor_src = 0;
    let mut run_start_src = 0;
    let mut previous_src: Option<usize> = None;

    for src in sources {
        let len = src.len();
        let shares = src.step == 1
            && previous_src.is_some_and(|prev| prev <= src.start)
            && run_start_src <= src.start
            && src.start < cursor_src;
        let start = if shares {
            cursor - (cursor_src - src.start)
        } else {
            run_start_src = src.start;
            cursor_src = src.start;
            cursor
        };
        let stop = start + len;
        placements.push(Placement {
            target: (start, stop),
            fresh: (cursor.max(start), cursor.max(stop)),
        });
        if stop > cursor {
            cursor = stop;
            cursor_src = src.end();
        }
        previous_src = (src.step == 1).then_some(src.start);
    }
    (placements, cursor)
}

/// Builds datasets from resolved selections
#[derive(Debug, Clone, Default)]
pub struct TrialMaterializer {
    config: StorageConfig,
}

impl TrialMaterializer {
    #[must_use]
    pub const fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Materializes `selection` of `dataset` as a view or a copy
    /// # Errors
    /// Will return `Err` if the selection does not belong to the dataset, a
    /// trial is empty after the time selection, or the copy fails
    pub fn materialize(&self, dataset: &Dataset, selection: &Selection) -> Result<Dataset> {
        if selection.kind() != dataset.kind()
            || selection.indices().len() != dataset.dimord().len()
        {
            return Err(SelectError::invalid_value(
                "selection",
                format!("selection resolved against this {} dataset", dataset.kind()),
                format!("selection over {} dimensions", selection.indices().len()),
            ));
        }
        match dataset.kind() {
            DataKind::Discrete => self.copy_discrete(dataset, selection),
            DataKind::Continuous if selection.deepcopy() || selection.requires_copy() => {
                self.copy_continuous(dataset, selection)
            }
            DataKind::Continuous => view(dataset, selection),
        }
    }

    fn copy_continuous(&self, dataset: &Dataset, selection: &Selection) -> Result<Dataset> {
        let def = dataset.trial_definition();
        let time_axis = continuous_time_axis(dataset)?;
        let windows = trial_windows(def, selection)?;
        let (samplerate, t0) =
            decimated_timing(dataset, selection, shifted_t0(def, selection, &windows))?;
        let sources: Vec<Slice> = selection
            .trials()
            .iter()
            .zip(&windows)
            .map(|(&k, rel)| absolute(def.sampleinfo()[k].0, rel))
            .collect();
        let (placements, n_time) = renumber_trials(&sources);

        let source_shape = dataset.data().shape();
        let mut read_index: Vec<Index> = (0..source_shape.len())
            .map(|axis| axis_index(selection, axis, source_shape[axis]))
            .collect();
        let mut shape: Vec<usize> = read_index.iter().map(Index::len).collect();
        shape[time_axis] = n_time;
        let mut region: Vec<Index> = shape.iter().map(|&len| Index::full(len)).collect();

        let path = self.config.new_data_path();
        let mut builder = DiskArrayBuilder::create(&path, shape, dataset.data().dtype())?;
        self.warn_footprint(&builder);

        let written: Result<()> = selection
            .trials()
            .iter()
            .zip(&sources)
            .zip(&placements)
            .try_for_each(|((&k, src), placement)| {
                if placement.fresh_len() == 0 {
                    return Ok(());
                }
                let skip = placement.fresh.0 - placement.target.0;
                read_index[time_axis] = Index::Slice(Slice {
                    start: src.at(skip),
                    stop: src.at(skip + placement.fresh_len() - 1) + 1,
                    step: src.step,
                });
                region[time_axis] =
                    Index::Slice(Slice::range(placement.fresh.0, placement.fresh.1));
                let bytes = dataset.data().read(&read_index)?;
                builder.commit_trial(k, &region, &bytes)?;
                Ok(())
            });
        let array = match written {
            Ok(()) => builder.finish()?,
            Err(error) => {
                abandon(builder);
                return Err(error.with_context("copying selected trials"));
            }
        };

        let sampleinfo = placements.iter().map(|p| p.target).collect();
        let trialdef = narrowed_definition(def, selection, t0, sampleinfo)?;
        let coords = selected_coords(dataset, selection);
        let out = Dataset::from_parts(
            DataKind::Continuous,
            DataHandle::new(Arc::new(array)),
            dataset.dimord().to_vec(),
            coords,
            samplerate,
            Some(trialdef),
        )?;
        save_info(&out)?;
        info!(
            "Copied {} trial(s) into {} ({n_time} samples)",
            selection.trials().len(),
            path.display()
        );
        Ok(out)
    }

    fn copy_discrete(&self, dataset: &Dataset, selection: &Selection) -> Result<Dataset> {
        let def = dataset.trial_definition();
        let windows = trial_windows(def, selection)?;
        let sample_column = dataset.sample_column().ok_or_else(|| {
            SelectError::invalid_value("dimord", "a sample column", dataset.dimord().join(", "))
        })?;
        let filters: Vec<(usize, FxHashSet<usize>)> = selection
            .indices()
            .iter()
            .enumerate()
            .filter_map(|(axis, index)| {
                index.as_ref().map(|i| (axis, i.to_vec().into_iter().collect()))
            })
            .collect();

        // decide which rows survive before anything is allocated
        let mut kept: Vec<Vec<usize>> = Vec::with_capacity(windows.len());
        for (&k, rel) in selection.trials().iter().zip(&windows) {
            let rows = dataset.trial_rows(k);
            if rows.is_empty() {
                kept.push(rows);
                continue;
            }
            let ncols = dataset.dimord().len();
            let table = dataset
                .data()
                .read_f64(&[Index::List(rows.clone()), Index::full(ncols)])?;
            let start = def.sampleinfo()[k].0;
            let keep = rows
                .iter()
                .enumerate()
                .filter(|&(r, _)| {
                    let sample = table[[r, sample_column]];
                    let offset = sample as usize - start;
                    in_slice(rel, offset)
                        && filters.iter().all(|(axis, allowed)| {
                            let value = table[[r, *axis]];
                            value >= 0.0
                                && value.fract() == 0.0
                                && allowed.contains(&(value as usize))
                        })
                })
                .map(|(_, &row)| row)
                .collect();
            kept.push(keep);
        }
        let nrows: usize = kept.iter().map(Vec::len).sum();
        if nrows == 0 {
            return Err(SelectError::invalid_value(
                "selection",
                "at least one matching event",
                "no events",
            ));
        }

        let ncols = dataset.dimord().len();
        let path = self.config.new_data_path();
        let mut builder =
            DiskArrayBuilder::create(&path, vec![nrows, ncols], dataset.data().dtype())?;
        self.warn_footprint(&builder);

        let mut offset = 0;
        let written: Result<()> = selection
            .trials()
            .iter()
            .zip(&kept)
            .try_for_each(|(&k, rows)| {
                if rows.is_empty() {
                    return Ok(());
                }
                let bytes = dataset
                    .data()
                    .read(&[Index::List(rows.clone()), Index::full(ncols)])?;
                let region = [
                    Index::Slice(Slice::range(offset, offset + rows.len())),
                    Index::full(ncols),
                ];
                builder.commit_trial(k, &region, &bytes)?;
                offset += rows.len();
                Ok(())
            });
        let array = match written {
            Ok(()) => builder.finish()?,
            Err(error) => {
                abandon(builder);
                return Err(error.with_context("copying selected events"));
            }
        };

        let sampleinfo = selection
            .trials()
            .iter()
            .zip(&windows)
            .map(|(&k, rel)| {
                let src = absolute(def.sampleinfo()[k].0, rel);
                (src.start, src.end())
            })
            .collect();
        let t0 = shifted_t0(def, selection, &windows);
    let trialdef = narrowed_definition(def, selection, t0, sampleinfo)?;
        let out = Dataset::from_parts(
            DataKind::Discrete,
            DataHandle::new(Arc::new(array)),
            dataset.dimord().to_vec(),
            dataset.all_coords().clone(),
            dataset.samplerate(),
            Some(trialdef),
        )?;
        save_info(&out)?;
        info!(
            "Copied {nrows} event(s) of {} trial(s) into {}",
            selection.trials().len(),
            path.display()
        );
        Ok(out)
    }

    fn warn_footprint(&self, builder: &DiskArrayBuilder) {
        let nbytes = builder.nbytes();
        if self.config.exceeds_copy_threshold(nbytes) {
            warn!(
                "Copying {:.1} MB of selected data to {}",
                nbytes as f64 / 1024_f64.powi(2),
                builder.path().display()
            );
        }
    }
}

fn view(dataset: &Dataset, selection: &Selection) -> Result<Dataset> {
    let def = dataset.trial_definition();
    let windows = trial_windows(def, selection)?;
    let shape = dataset.data().shape();
    let window = (0..shape.len())
        .map(|axis| match selection.index(axis) {
            Some(Index::Slice(slice)) => Ok(*slice),
            None => Ok(Slice::full(shape[axis])),
            Some(Index::List(_)) => Err(SelectError::invalid_value(
                dataset.dimord()[axis].as_str(),
                "slice for a view",
                "index list",
            )),
        })
        .collect::<Result<Vec<_>>>()?;
    let handle = dataset.data().view(&window)?;

    let sampleinfo = selection
        .trials()
        .iter()
        .zip(&windows)
        .map(|(&k, rel)| {
            let start = def.sampleinfo()[k].0;
            (start + rel.start, start + rel.end())
        })
        .collect();
    let t0 = shifted_t0(def, selection, &windows);
    let trialdef = narrowed_definition(def, selection, t0, sampleinfo)?;
    debug!(
        "Selected {} trial(s) as a view sharing {:?}",
        selection.trials().len(),
        dataset.data().store().paths()
    );
    Ok(Dataset::from_parts(
        DataKind::Continuous,
        handle,
        dataset.dimord().to_vec(),
        selected_coords(dataset, selection),
        dataset.samplerate(),
        Some(trialdef),
    )?)
}

/// Trial-relative time slice of every selected trial, clamped to its length
fn trial_windows(def: &TrialDefinition, selection: &Selection) -> Result<Vec<Slice>> {
    selection
        .trials()
        .iter()
        .map(|&k| {
            def.check_trial(k)?;
            let len = def.trial_len(k);
            let rel = selection.time().map_or(Slice::full(len), |t| t.clamp(len));
            if rel.is_empty() {
                return Err(SelectError::invalid_value(
                    format!("time selection in trial {k}"),
                    format!("samples within its {len} samples"),
                    format!("{:?}", selection.time()),
                ));
            }
            Ok(rel)
        })
        .collect()
}

/// `t0` of every selected trial, moved by the start of its time slice
fn shifted_t0(def: &TrialDefinition, selection: &Selection, windows: &[Slice]) -> Vec<i64> {
    selection
        .trials()
        .iter()
        .zip(windows)
        .map(|(&k, rel)| def.t0()[k] + rel.start as i64)
        .collect()
}

/// Sampling rate and `t0` of continuous trials copied with a stepped time slice
///
/// Every `step`-th sample is kept, so the copy runs at `samplerate / step`
/// and each `t0` is counted in kept samples.
/// # Errors
/// Will return `Err` if a trial's shifted `t0` is not a multiple of the step
fn decimated_timing(
    dataset: &Dataset,
    selection: &Selection,
    t0: Vec<i64>,
) -> Result<(Option<f64>, Vec<i64>)> {
    let step = selection.time().map_or(1, |t| t.step);
    if step == 1 {
        return Ok((dataset.samplerate(), t0));
    }
    let divisor = step as i64;
    let t0 = t0
        .into_iter()
        .zip(selection.trials())
        .map(|(t0, &k)| {
            if t0 % divisor == 0 {
                Ok(t0 / divisor)
            } else {
                Err(SelectError::invalid_value(
                    format!("time selection in trial {k}"),
                    format!("time zero on a kept sample (t0 a multiple of step {step})"),
                    format!("t0 = {t0}"),
                ))
            }
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((dataset.samplerate().map(|rate| rate / step as f64), t0))
}

/// The selected trials with new bounds and `t0`
fn narrowed_definition(
    def: &TrialDefinition,
    selection: &Selection,
    t0: Vec<i64>,
    sampleinfo: Vec<(usize, usize)>,
) -> Result<TrialDefinition> {
    let picked = def.select(selection.trials())?;
    Ok(TrialDefinition::new(sampleinfo, t0, picked.trialinfo().clone())?)
}

fn selected_coords(dataset: &Dataset, selection: &Selection) -> FxHashMap<String, Coordinates> {
    dataset
        .all_coords()
        .iter()
        .map(|(dim, coords)| {
            let picked = dataset
                .dim_index(dim)
                .ok()
                .and_then(|axis| selection.index(axis))
                .map_or_else(|| coords.clone(), |index| coords.select(index));
            (dim.clone(), picked)
        })
        .collect()
}

fn continuous_time_axis(dataset: &Dataset) -> Result<usize> {
    dataset.time_axis().ok_or_else(|| {
        SelectError::invalid_value("dimord", "a time dimension", dataset.dimord().join(", "))
    })
}

fn axis_index(selection: &Selection, axis: usize, len: usize) -> Index {
    selection.index(axis).cloned().unwrap_or(Index::full(len))
}

/// Absolute source window of a trial starting at `start`
const fn absolute(start: usize, rel: &Slice) -> Slice {
    Slice {
        start: start + rel.start,
        stop: start + rel.stop,
        step: rel.step,
    }
}

fn in_slice(slice: &Slice, pos: usize) -> bool {
    pos >= slice.start && pos < slice.stop && (pos - slice.start) % slice.step == 0
}

fn abandon(builder: DiskArrayBuilder) {
    let path = builder.path().to_path_buf();
    if let Err(error) = builder.abandon() {
        warn!("Could not remove partial output {}: {error}", path.display());
    }
}
