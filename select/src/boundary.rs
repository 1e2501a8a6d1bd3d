//! Trial boundaries derived from event streams.
//!
//! Event data is a discrete dataset with a `sample` column and an `eventid`
//! column. Trials are cut from it in one of two modes:
//!
//! - **Trigger mode**: every event carrying the trigger code opens a trial
//!   `pre` seconds before and closes it `post` seconds after the event.
//! - **Start/stop mode**: the stream is walked forward once; each trial
//!   runs from the next start code to the next stop code after it, and every
//!   event is consumed at most once.
//!
//! Boundaries are kept in seconds (or in event samples when the event data
//! has no sampling rate) until they are sampled at a concrete rate, which
//! rounds half to even. Sampled boundaries can be clipped to the recording.

use crate::error::{Result, SelectError};
use ephys_data::{Dataset, SAMPLE_DIM, TrialDefinition};
use itertools::Itertools;
use ndarray::Array2;
use tracing::{debug, info};

/// Name of the event code column of event data
pub const EVENT_ID_DIM: &str = "eventid";

/// One event code for every trial, or one per trial
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventCodes {
    Scalar(i64),
    PerTrial(Vec<i64>),
}

impl EventCodes {
    fn get(&self, k: usize) -> Option<i64> {
        match self {
            Self::Scalar(code) => Some(*code),
            Self::PerTrial(codes) => codes.get(k).copied(),
        }
    }

    fn count(&self) -> Option<usize> {
        match self {
            Self::Scalar(_) => None,
            Self::PerTrial(codes) => Some(codes.len()),
        }
    }
}

impl From<i64> for EventCodes {
    fn from(code: i64) -> Self {
        Self::Scalar(code)
    }
}

impl From<Vec<i64>> for EventCodes {
    fn from(codes: Vec<i64>) -> Self {
        Self::PerTrial(codes)
    }
}

/// How trials are cut from an event stream
#[derive(Debug, Clone, PartialEq)]
pub enum TrialSpec {
    /// `[event - pre, event + post]` around every `trigger` event; times in seconds
    Trigger { trigger: i64, pre: f64, post: f64 },
    /// From each start code to the following stop code
    StartStop { start: EventCodes, stop: EventCodes },
}

impl TrialSpec {
    /// Validates a keyword-style combination of options
    ///
    /// Exactly one of `{pre, post, trigger}` and `{start, stop}` must be
    /// given, and each completely.
    /// # Errors
    /// Will return `Err` if the options mix or leave out parts of a mode
    pub fn from_options(
        pre: Option<f64>,
        post: Option<f64>,
        trigger: Option<i64>,
        start: Option<EventCodes>,
        stop: Option<EventCodes>,
    ) -> Result<Self> {
        let triggered = pre.is_some() || post.is_some() || trigger.is_some();
        let paired = start.is_some() || stop.is_some();
        match (triggered, paired) {
            (true, true) => Err(SelectError::invalid_value(
                "trial specification",
                "either pre/post/trigger or start/stop",
                "both",
            )),
            (false, false) => Err(SelectError::invalid_value(
                "trial specification",
                "either pre/post/trigger or start/stop",
                "neither",
            )),
            (true, false) => {
                let (Some(pre), Some(post)) = (pre, post) else {
                    return Err(SelectError::invalid_value(
                        "pre/post",
                        "both pre and post",
                        format!("pre = {pre:?}, post = {post:?}"),
                    ));
                };
                let Some(trigger) = trigger else {
                    return Err(SelectError::invalid_value("trigger", "a trigger code", "none"));
                };
                if !(pre.is_finite() && post.is_finite()) {
                    return Err(SelectError::invalid_value(
                        "pre/post",
                        "finite times in seconds",
                        format!("pre = {pre}, post = {post}"),
                    ));
                }
                Ok(Self::Trigger { trigger, pre, post })
            }
            (false, true) => {
                let (Some(start), Some(stop)) = (start, stop) else {
                    return Err(SelectError::invalid_value(
                        "start/stop",
                        "both start and stop codes",
                        "only one of them",
                    ));
                };
                Self::start_stop(start, stop)
            }
        }
    }

    /// Start/stop mode; per-trial sequences must agree in length
    /// # Errors
    /// Will return `Err` if two per-trial sequences differ in length or one is empty
    pub fn start_stop(start: EventCodes, stop: EventCodes) -> Result<Self> {
        match (start.count(), stop.count()) {
            (Some(0), _) | (_, Some(0)) => Err(SelectError::invalid_value(
                "start/stop",
                "non-empty code sequences",
                "empty sequence",
            )),
            (Some(a), Some(b)) if a != b => Err(SelectError::invalid_value(
                "start/stop",
                "sequences of equal length",
                format!("{a} start and {b} stop codes"),
            )),
            _ => Ok(Self::StartStop { start, stop }),
        }
    }
}

/// Trial boundaries cut from an event stream, before sampling
///
/// Positions are in seconds when the event rate is known, otherwise in
/// event samples.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedTrials {
    bounds: Vec<(f64, f64)>,
    t0: Vec<f64>,
    trialinfo: Array2<f64>,
    event_rate: Option<f64>,
}

impl DerivedTrials {
    #[must_use]
    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    #[must_use]
    pub const fn event_rate(&self) -> Option<f64> {
        self.event_rate
    }

    /// Boundaries sampled at `rate`, rounding half to even
    /// # Errors
    /// Will return `Err` if the event rate is unknown or `rate` is not positive
    pub fn at_rate(&self, rate: f64) -> Result<TrialBounds> {
        if self.event_rate.is_none() {
            return Err(SelectError::invalid_value(
                "samplerate",
                "event data with a known sampling rate",
                "none",
            ));
        }
        if !(rate > 0.0 && rate.is_finite()) {
            return Err(SelectError::invalid_value(
                "samplerate",
                "positive sampling rate",
                rate.to_string(),
            ));
        }
        Ok(self.sample(rate))
    }

    /// Boundaries in samples of the event data itself
    #[must_use]
    pub fn at_event_rate(&self) -> TrialBounds {
        self.sample(self.event_rate.unwrap_or(1.0))
    }

    fn sample(&self, rate: f64) -> TrialBounds {
        let at = |x: f64| (x * rate).round_ties_even() as i64;
        TrialBounds {
            sampleinfo: self.bounds.iter().map(|&(a, b)| (at(a), at(b))).collect(),
            t0: self.t0.iter().map(|&t| at(t)).collect(),
            trialinfo: self.trialinfo.clone(),
        }
    }
}

/// Trial boundaries in samples, possibly reaching outside the recording
#[derive(Debug, Clone, PartialEq)]
pub struct TrialBounds {
    sampleinfo: Vec<(i64, i64)>,
    t0: Vec<i64>,
    trialinfo: Array2<f64>,
}

impl TrialBounds {
    /// Bounds from their parts
    /// # Errors
    /// Will return `Err` if the parts differ in length
    pub fn new(sampleinfo: Vec<(i64, i64)>, t0: Vec<i64>, trialinfo: Array2<f64>) -> Result<Self> {
        if t0.len() != sampleinfo.len() || trialinfo.nrows() != sampleinfo.len() {
            return Err(SelectError::invalid_value(
                "trial bounds",
                "one t0 and one trialinfo row per trial",
                format!(
                    "{} trials, {} t0, {} rows",
                    sampleinfo.len(),
                    t0.len(),
                    trialinfo.nrows()
                ),
            ));
        }
        Ok(Self {
            sampleinfo,
            t0,
            trialinfo,
        })
    }

    #[must_use]
    pub fn sampleinfo(&self) -> &[(i64, i64)] {
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

    /// Clamps every trial to `[0, len]`
    ///
    /// `t0` moves with a clipped start so time zero stays on the same sample.
    /// # Errors
    /// Will return `Err` if a trial has no samples left
    pub fn clip(mut self, len: usize) -> Result<Self> {
        let len = len as i64;
        for (k, ((start, stop), t0)) in self.sampleinfo.iter_mut().zip(&mut self.t0).enumerate() {
            let clipped = ((*start).max(0), (*stop).min(len));
            if clipped.1 <= clipped.0 {
                return Err(SelectError::invalid_value(
                    format!("trial {k}"),
                    format!("samples within [0, {len}) after clipping"),
                    format!(
                        "trial collapsed to empty: [{start}, {stop}) -> [{}, {})",
                        clipped.0, clipped.1
                    ),
                ));
            }
            *t0 += clipped.0 - *start;
            (*start, *stop) = clipped;
        }
        Ok(self)
    }

    /// Converts to a trial definition
    /// # Errors
    /// Will return `Err` if a trial starts before sample 0 or is empty
    pub fn into_definition(self) -> Result<TrialDefinition> {
        let sampleinfo = self
            .sampleinfo
            .iter()
            .enumerate()
            .map(|(k, &(start, stop))| {
                let start = usize::try_from(start).map_err(|_| {
                    SelectError::invalid_value(
                        format!("trial {k}"),
                        "start at or after sample 0 (or clip edges)",
                        start.to_string(),
                    )
                })?;
                let stop = usize::try_from(stop).unwrap_or(0);
                Ok((start, stop))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(TrialDefinition::new(sampleinfo, self.t0, self.trialinfo)?)
    }
}

/// Per-trial bounds, `t0` and trialinfo row, as cut by one of the modes
struct Cuts {
    bounds: Vec<(f64, f64)>,
    t0: Vec<f64>,
    info: Vec<Vec<f64>>,
}

/// Walks the events of a discrete dataset
#[derive(Debug, Clone)]
pub struct TrialBoundaryDeriver {
    /// `(sample, code)` pairs, ordered by sample
    events: Vec<(usize, i64)>,
    rate: Option<f64>,
}

impl TrialBoundaryDeriver {
    /// Reads the `sample` and `eventid` columns of `events`
    /// # Errors
    /// Will return `Err` if the columns are missing, unreadable or the data is empty
    pub fn new(events: &Dataset) -> Result<Self> {
        let samples = events.samples()?;
        let codes = events.column(events.dim_index(EVENT_ID_DIM)?)?;
        if samples.is_empty() {
            return Err(SelectError::invalid_value("event data", "at least one event", "none"));
        }
        let pairs = samples
            .into_iter()
            .zip(codes)
            .map(|(sample, code)| (sample, code as i64))
            .sorted_by_key(|&(sample, _)| sample)
            .collect();
        Ok(Self::from_events(pairs, events.samplerate()))
    }

    /// A deriver over `(sample, code)` pairs, which must be ordered by sample
    #[must_use]
    pub const fn from_events(events: Vec<(usize, i64)>, rate: Option<f64>) -> Self {
        Self { events, rate }
    }

    /// One more than the last event sample
    #[must_use]
    pub fn extent(&self) -> usize {
        self.events.last().map_or(0, |&(sample, _)| sample + 1)
    }

    /// Cuts trials according to `spec`
    /// # Errors
    /// Will return `Err` if:
    /// - trigger mode is used without a known event rate
    /// - no trial is found, a start code has no following stop code, or a per-trial code is missing
    pub fn derive(&self, spec: &TrialSpec) -> Result<DerivedTrials> {
        let Cuts { bounds, t0, info } = match spec {
            TrialSpec::Trigger { trigger, pre, post } => self.triggered(*trigger, *pre, *post)?,
            TrialSpec::StartStop { start, stop } => self.paired(start, stop)?,
        };
        if bounds.is_empty() {
            return Err(SelectError::invalid_value(
                "trial specification",
                "codes present in the event data",
                format!("no trial found for {spec:?}"),
            ));
        }
        let width = info.first().map_or(0, Vec::len);
        let trialinfo = Array2::from_shape_vec((bounds.len(), width), info.concat()).map_err(|e| {
            SelectError::invalid_value("trialinfo", "rectangular table", e.to_string())
        })?;
        debug!("Derived {} trial(s) from {} events", bounds.len(), self.events.len());
        Ok(DerivedTrials {
            bounds,
            t0,
            trialinfo,
            event_rate: self.rate,
        })
    }

    fn triggered(&self, trigger: i64, pre: f64, post: f64) -> Result<Cuts> {
        let Some(rate) = self.rate else {
            return Err(SelectError::invalid_value(
                "samplerate",
                "event data with a known sampling rate for pre/post",
                "none",
            ));
        };
        let (bounds, t0, info): (Vec<_>, Vec<_>, Vec<_>) = self
            .events
            .iter()
            .filter(|&&(_, code)| code == trigger)
            .map(|&(sample, _)| {
                let at = sample as f64 / rate;
                ((at - pre, at + post), -pre, vec![trigger as f64])
            })
            .multiunzip();
        Ok(Cuts { bounds, t0, info })
    }

    fn paired(&self, start: &EventCodes, stop: &EventCodes) -> Result<Cuts> {
        let scale = self.rate.unwrap_or(1.0);
        let expected = start.count().or(stop.count());
        let mut bounds = Vec::new();
        let mut info = Vec::new();
        let mut cursor = 0;
        for k in 0.. {
            if expected.is_some_and(|n| k >= n) {
                break;
            }
            let (Some(start_code), Some(stop_code)) = (start.get(k), stop.get(k)) else {
                break;
            };
            let Some(opened) = self.find(start_code, cursor) else {
                if expected.is_some() {
                    return Err(SelectError::invalid_value(
                        format!("start code of trial {k}"),
                        "code present after the previous trial",
                        start_code.to_string(),
                    ));
                }
                break;
            };
            let Some(closed) = self.find(stop_code, opened + 1) else {
                return Err(SelectError::invalid_value(
                    format!("stop code of trial {k}"),
                    format!("code following the start event at sample {}", self.events[opened].0),
                    stop_code.to_string(),
                ));
            };
            bounds.push((
                self.events[opened].0 as f64 / scale,
                self.events[closed].0 as f64 / scale,
            ));
            info.push(vec![start_code as f64, stop_code as f64]);
            cursor = closed + 1;
        }
        let t0 = vec![0.0; bounds.len()];
        Ok(Cuts { bounds, t0, info })
    }

    fn find(&self, code: i64, from: usize) -> Option<usize> {
        self.events
            .get(from..)?
            .iter()
            .position(|&(_, c)| c == code)
            .map(|i| from + i)
    }
}

/// Cuts trials from event data and assigns them to it
///
/// With `clip_edges` trials are clamped to the span of the events.
/// # Errors
/// Will return `Err` if the trials cannot be derived, a trial collapses
/// when clipped, or a trial starts before sample 0 without clipping
pub fn define_trials(events: &mut Dataset, spec: &TrialSpec, clip_edges: bool) -> Result<()> {
    let deriver = TrialBoundaryDeriver::new(events)?;
    let mut bounds = deriver.derive(spec)?.at_event_rate();
    if clip_edges {
        bounds = bounds.clip(deriver.extent())?;
    }
    events.redefine_trials(bounds.into_definition()?)?;
    info!("Defined {} trial(s) on event data", events.ntrials());
    Ok(())
}

/// Cuts trials from `events` and assigns them to `target`, rescaled to its rate
///
/// With `clip_edges` trials are clamped to the recording of `target`.
/// # Errors
/// Will return `Err` if either dataset lacks a sampling rate, the trials
/// cannot be derived, or they do not fit the target
pub fn define_trials_from(
    target: &mut Dataset,
    events: &Dataset,
    spec: &TrialSpec,
    clip_edges: bool,
) -> Result<()> {
    let rate = target.require_samplerate()?;
    let derived = TrialBoundaryDeriver::new(events)?.derive(spec)?;
    let mut bounds = derived.at_rate(rate)?;
    if clip_edges {
        bounds = bounds.clip(recording_len(target)?)?;
    }
    target.redefine_trials(bounds.into_definition()?)?;
    info!("Defined {} trial(s) from event data at {rate} Hz", target.ntrials());
    Ok(())
}

fn recording_len(dataset: &Dataset) -> Result<usize> {
    match dataset.time_axis() {
        Some(axis) => Ok(dataset.data().shape()[axis]),
        None => Ok(dataset.samples()?.into_iter().max().map_or(0, |s| s + 1)),
    }
}

/// Column names of event data: `[sample, eventid]`
#[must_use]
pub fn event_dimord() -> Vec<String> {
    vec![SAMPLE_DIM.to_string(), EVENT_ID_DIM.to_string()]
}
