use crate::error::{DataError, Result};
use ndarray::{Array2, Axis, s};
use serde::{Deserialize, Serialize};

/// Trial bounds, time offsets and user metadata, indexed by trial number
///
/// The three parts are kept parallel: `sampleinfo[k]`, `t0[k]` and row `k`
/// of `trialinfo` all describe trial `k`. Bounds are absolute, half-open
/// sample positions with `start < stop`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialDefinition {
    sampleinfo: Vec<(usize, usize)>,
    t0: Vec<i64>,
    trialinfo: Array2<f64>,
}

impl TrialDefinition {
    /// Creates a definition from its three parallel parts
    /// # Errors
    /// Will return `Err` if the parts differ in length or any trial has `start >= stop`
    pub fn new(
        sampleinfo: Vec<(usize, usize)>,
        t0: Vec<i64>,
        trialinfo: Array2<f64>,
    ) -> Result<Self> {
        let n = sampleinfo.len();
        if t0.len() != n || trialinfo.nrows() != n {
            return Err(DataError::invalid_value(
                "trialdefinition",
                format!("{n} t0 offsets and {n} trialinfo rows"),
                format!("{} offsets and {} rows", t0.len(), trialinfo.nrows()),
            ));
        }
        if let Some((k, (start, stop))) = sampleinfo
            .iter()
            .enumerate()
            .find(|(_, (start, stop))| start >= stop)
        {
            return Err(DataError::invalid_value(
                format!("sampleinfo of trial {k}"),
                "start < stop",
                format!("[{start}, {stop})"),
            ));
        }
        Ok(Self {
            sampleinfo,
            t0,
            trialinfo,
        })
    }

    /// A single trial `[0, len)` without metadata
    /// # Errors
    /// Will return `Err` if `len` is zero
    pub fn whole(len: usize) -> Result<Self> {
        Self::spanning(0, len)
    }

    /// A single trial `[start, stop)` with `t0 = 0` and no metadata
    /// # Errors
    /// Will return `Err` if `start >= stop`
    pub fn spanning(start: usize, stop: usize) -> Result<Self> {
        Self::new(vec![(start, stop)], vec![0], Array2::zeros((1, 0)))
    }

    /// Parses a `[start, stop, t0, *trialinfo]` table, one row per trial
    /// # Errors
    /// Will return `Err` if the table has fewer than 3 columns, or a bound or
    /// offset is not integral, or a bound is negative, or `start >= stop`
    pub fn from_table(table: &Array2<f64>) -> Result<Self> {
        if table.ncols() < 3 {
            return Err(DataError::invalid_value(
                "trialdefinition",
                "table with at least 3 columns [start, stop, t0]",
                format!("{} columns", table.ncols()),
            ));
        }
        let mut sampleinfo = Vec::with_capacity(table.nrows());
        let mut t0 = Vec::with_capacity(table.nrows());
        for (k, row) in table.axis_iter(Axis(0)).enumerate() {
            let start = sample_bound(row[0], k, "start")?;
            let stop = sample_bound(row[1], k, "stop")?;
            if row[2].fract() != 0.0 || !row[2].is_finite() {
                return Err(DataError::invalid_value(
                    format!("t0 of trial {k}"),
                    "integral sample offset",
                    row[2].to_string(),
                ));
            }
            sampleinfo.push((start, stop));
            t0.push(row[2] as i64);
        }
        Self::new(sampleinfo, t0, table.slice(s![.., 3..]).to_owned())
    }

    /// The definition as a `[start, stop, t0, *trialinfo]` table
    #[must_use]
    pub fn to_table(&self) -> Array2<f64> {
        let mut table = Array2::zeros((self.len(), 3 + self.trialinfo.ncols()));
        for (k, mut row) in table.axis_iter_mut(Axis(0)).enumerate() {
            row[0] = self.sampleinfo[k].0 as f64;
            row[1] = self.sampleinfo[k].1 as f64;
            row[2] = self.t0[k] as f64;
            row.slice_mut(s![3..]).assign(&self.trialinfo.row(k));
        }
        table
    }

    /// Keeps the given trials, in the given order
    /// # Errors
    /// Will return `Err` if a trial number is out of range
    pub fn select(&self, trials: &[usize]) -> Result<Self> {
        for &k in trials {
            self.check_trial(k)?;
        }
        Ok(Self {
            sampleinfo: trials.iter().map(|&k| self.sampleinfo[k]).collect(),
            t0: trials.iter().map(|&k| self.t0[k]).collect(),
            trialinfo: self.trialinfo.select(Axis(0), trials),
        })
    }

    /// Relative time axis of trial `k` in seconds: `(i + t0[k]) / rate`
    /// # Errors
    /// Will return `Err` if `k` is out of range or `rate` is not positive
    pub fn time_axis(&self, k: usize, rate: f64) -> Result<Vec<f64>> {
        self.check_trial(k)?;
        if !(rate > 0.0 && rate.is_finite()) {
            return Err(DataError::invalid_value(
                "samplerate",
                "positive sampling rate",
                rate.to_string(),
            ));
        }
        let t0 = self.t0[k];
        Ok((0..self.trial_len(k))
            .map(|i| (i as i64 + t0) as f64 / rate)
            .collect())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sampleinfo.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sampleinfo.is_empty()
    }

    #[must_use]
    pub fn sampleinfo(&self) -> &[(usize, usize)] {
        &self.sampleinfo
    }

    #[must_use]
    pub fn t0(&self) -> &[i64] {
        &self.t0
    }

    #[must_use]
    pub fn trialinfo(&self) -> &Array2<f64> {
        &self.trialinfo
    }

    /// Number of samples in trial `k`; panics if `k` is out of range
    #[must_use]
    pub fn trial_len(&self, k: usize) -> usize {
        let (start, stop) = self.sampleinfo[k];
        stop - start
    }

    /// Largest stop over all trials
    #[must_use]
    pub fn max_stop(&self) -> usize {
        self.sampleinfo.iter().map(|&(_, stop)| stop).max().unwrap_or(0)
    }

    /// Validates a trial number
    /// # Errors
    /// Will return `Err` if `k` is out of range
    pub fn check_trial(&self, k: usize) -> Result<()> {
        if k >= self.len() {
            return Err(DataError::invalid_value(
                "trial",
                format!("trial number below {}", self.len()),
                k.to_string(),
            ));
        }
        Ok(())
    }
}

fn sample_bound(value: f64, trial: usize, which: &str) -> Result<usize> {
    if value < 0.0 || value.fract() != 0.0 || !value.is_finite() {
        return Err(DataError::invalid_value(
            format!("{which} of trial {trial}"),
            "non-negative integral sample index",
            value.to_string(),
        ));
    }
    Ok(value as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn table_round_trip_keeps_trialinfo() {
        let table = array![[0.0, 10.0, -2.0, 7.0], [10.0, 25.0, 0.0, 8.0]];
        let def = TrialDefinition::from_table(&table).unwrap();
        assert_eq!(def.sampleinfo(), &[(0, 10), (10, 25)]);
        assert_eq!(def.t0(), &[-2, 0]);
        assert_eq!(def.trialinfo(), &array![[7.0], [8.0]]);
        assert_eq!(def.to_table(), table);
    }

    #[test]
    fn table_needs_three_columns() {
        let table = array![[0.0, 10.0]];
        assert!(matches!(
            TrialDefinition::from_table(&table),
            Err(DataError::InvalidValue { .. })
        ));
    }

    #[test]
    fn table_rejects_bad_bounds() {
        assert!(TrialDefinition::from_table(&array![[-1.0, 4.0, 0.0]]).is_err());
        assert!(TrialDefinition::from_table(&array![[0.5, 4.0, 0.0]]).is_err());
        assert!(TrialDefinition::from_table(&array![[4.0, 4.0, 0.0]]).is_err());
    }

    #[test]
    fn select_reorders_all_parts() {
        let table = array![[0.0, 5.0, 0.0, 1.0], [5.0, 9.0, -1.0, 2.0], [9.0, 12.0, 0.0, 3.0]];
        let def = TrialDefinition::from_table(&table).unwrap();
        let picked = def.select(&[2, 0]).unwrap();
        assert_eq!(picked.sampleinfo(), &[(9, 12), (0, 5)]);
        assert_eq!(picked.trialinfo(), &array![[3.0], [1.0]]);
        assert!(def.select(&[3]).is_err());
    }

    #[test]
    fn time_axis_is_offset_by_t0() {
        let def = TrialDefinition::new(vec![(10, 14)], vec![-2], Array2::zeros((1, 0))).unwrap();
        let time = def.time_axis(0, 2.0).unwrap();
        let expected = [-1.0, -0.5, 0.0, 0.5];
        for (t, e) in time.iter().zip(expected) {
            assert_relative_eq!(*t, e);
        }
        assert!(def.time_axis(0, 0.0).is_err());
    }
}
