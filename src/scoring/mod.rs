//! Transcription scoring
//!
//! Pairs estimated notes with reference notes through a maximum-cardinality
//! bipartite matching and turns the pairing into precision, recall,
//! F-measure and overlap scores. Four matching variants are scored:
//!
//! - onset, offset and pitch (the headline metrics)
//! - onset and pitch, ignoring offsets
//! - onset alone
//! - offset alone
//!
//! With family breakdown enabled, every instrument family present on either
//! side is scored again as an independent sub-problem with its own graph.

pub mod matching;
pub mod metrics;

pub use matching::CompatibilityGraph;
pub use metrics::{f_measure, overlap_ratio, precision_recall_f, Metrics};

use crate::config::ScoringConfig;
use crate::error::{EvalError, Result};
use crate::notes::PreparedNotes;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

/// Time distances are rounded to this many decimals before comparison
const DISTANCE_DECIMALS: i32 = 4;

/// Matching tolerances and switches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringParams {
    /// Maximum onset deviation in seconds
    pub onset_tolerance: f64,
    /// Maximum pitch deviation in semitones
    pub pitch_tolerance: f64,
    /// Offset window as a fraction of the reference duration
    pub offset_ratio: f64,
    pub require_family_match: bool,
    pub family_breakdown: bool,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self::from(&ScoringConfig::default())
    }
}

impl From<&ScoringConfig> for ScoringParams {
    fn from(config: &ScoringConfig) -> Self {
        Self {
            onset_tolerance: config.onset_tolerance,
            pitch_tolerance: config.pitch_tolerance,
            offset_ratio: config.offset_ratio,
            require_family_match: config.require_family_match,
            family_breakdown: config.family_breakdown,
        }
    }
}

impl ScoringParams {
    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("onset_tolerance", self.onset_tolerance),
            ("pitch_tolerance", self.pitch_tolerance),
            ("offset_ratio", self.offset_ratio),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(EvalError::InvalidInput(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// One matched (reference, estimate) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub reference: usize,
    pub estimate: usize,
    /// Temporal Jaccard index of the two intervals
    pub overlap_ratio: f64,
    /// Estimate pitch minus reference pitch, in semitones
    pub pitch_error: f64,
    pub family_match: bool,
}

/// Metrics for all four matching variants
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSet {
    pub with_offset: Metrics,
    pub no_offset: Metrics,
    pub onset_only: Metrics,
    pub offset_only: Metrics,
}

/// Scores restricted to one instrument family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyScore {
    pub reference_count: usize,
    pub estimate_count: usize,
    pub metrics: MetricSet,
}

/// Result of one evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    pub reference_count: usize,
    pub estimate_count: usize,
    pub metrics: MetricSet,
    /// Pairs behind the onset + offset + pitch metrics, by reference index
    pub matches: Vec<Match>,
    pub per_family: BTreeMap<String, FamilyScore>,
}

impl ScoreReport {
    pub fn precision(&self) -> f64 {
        self.metrics.with_offset.precision
    }

    pub fn recall(&self) -> f64 {
        self.metrics.with_offset.recall
    }

    pub fn f_measure(&self) -> f64 {
        self.metrics.with_offset.f_measure
    }

    pub fn average_overlap_ratio(&self) -> f64 {
        self.metrics.with_offset.average_overlap_ratio
    }

    pub fn precision_no_offset(&self) -> f64 {
        self.metrics.no_offset.precision
    }

    pub fn recall_no_offset(&self) -> f64 {
        self.metrics.no_offset.recall
    }

    pub fn f_measure_no_offset(&self) -> f64 {
        self.metrics.no_offset.f_measure
    }

    /// Number of true positives under the headline criterion
    pub fn true_positives(&self) -> usize {
        self.metrics.with_offset.matched
    }

    /// Ordered `(key, value)` pairs; per-family keys are `family/Metric`
    pub fn entries(&self) -> Vec<(String, f64)> {
        let mut entries = metric_entries("", &self.metrics);
        for (family, score) in &self.per_family {
            entries.extend(metric_entries(&format!("{}/", family), &score.metrics));
        }
        entries
    }

    /// `key: value` text, one line per metric
    pub fn to_lines(&self) -> String {
        let mut out = String::new();
        for (key, value) in self.entries() {
            let _ = writeln!(out, "{}: {:?}", key, value);
        }
        out
    }
}

fn metric_entries(prefix: &str, set: &MetricSet) -> Vec<(String, f64)> {
    let rows: [(&str, f64); 14] = [
        ("Precision", set.with_offset.precision),
        ("Recall", set.with_offset.recall),
        ("F-measure", set.with_offset.f_measure),
        ("Average_Overlap_Ratio", set.with_offset.average_overlap_ratio),
        ("Precision_no_offset", set.no_offset.precision),
        ("Recall_no_offset", set.no_offset.recall),
        ("F-measure_no_offset", set.no_offset.f_measure),
        ("Average_Overlap_Ratio_no_offset", set.no_offset.average_overlap_ratio),
        ("Onset_Precision", set.onset_only.precision),
        ("Onset_Recall", set.onset_only.recall),
        ("Onset_F-measure", set.onset_only.f_measure),
        ("Offset_Precision", set.offset_only.precision),
        ("Offset_Recall", set.offset_only.recall),
        ("Offset_F-measure", set.offset_only.f_measure),
    ];
    rows.iter()
        .map(|(key, value)| (format!("{}{}", prefix, key), *value))
        .collect()
}

/// Borrowed view of one validated note
#[derive(Debug, Clone, Copy)]
struct ScoredNote<'a> {
    index: usize,
    onset: f64,
    offset: f64,
    pitch: f64,
    family: &'a str,
}

/// Which parts of the note a variant compares
#[derive(Debug, Clone, Copy)]
struct Criteria {
    onset: bool,
    offset: bool,
    pitch: bool,
}

const WITH_OFFSET: Criteria = Criteria {
    onset: true,
    offset: true,
    pitch: true,
};
const NO_OFFSET: Criteria = Criteria {
    onset: true,
    offset: false,
    pitch: true,
};
const ONSET_ONLY: Criteria = Criteria {
    onset: true,
    offset: false,
    pitch: false,
};
const OFFSET_ONLY: Criteria = Criteria {
    onset: false,
    offset: true,
    pitch: false,
};

/// Score an estimated transcription against a reference.
///
/// Inputs are validated up front; any malformed interval, length mismatch or
/// bad tolerance fails the whole call with [`EvalError::InvalidInput`].
///
/// Notes need not be sorted. Where several maximum matchings exist, earlier
/// onsets claim their partners first and equal onsets fall back to input
/// order, so the result does not depend on how the rows were arranged
/// beyond that. Reported indices always refer to the input rows.
pub fn evaluate(
    ref_intervals: &Array2<f64>,
    ref_pitches: &[f64],
    ref_families: &[String],
    est_intervals: &Array2<f64>,
    est_pitches: &[f64],
    est_families: &[String],
    params: &ScoringParams,
) -> Result<ScoreReport> {
    params.validate()?;
    let reference = collect_notes("reference", ref_intervals, ref_pitches, ref_families)?;
    let estimate = collect_notes("estimate", est_intervals, est_pitches, est_families)?;

    let (metrics, matches) = score_all(&reference, &estimate, params);

    let mut per_family = BTreeMap::new();
    if params.family_breakdown {
        let families: BTreeSet<&str> = reference
            .iter()
            .chain(estimate.iter())
            .map(|n| n.family)
            .collect();
        for family in families {
            let ref_subset: Vec<ScoredNote<'_>> =
                reference.iter().filter(|n| n.family == family).copied().collect();
            let est_subset: Vec<ScoredNote<'_>> =
                estimate.iter().filter(|n| n.family == family).copied().collect();
            let (family_metrics, _) = score_all(&ref_subset, &est_subset, params);
            per_family.insert(
                family.to_string(),
                FamilyScore {
                    reference_count: ref_subset.len(),
                    estimate_count: est_subset.len(),
                    metrics: family_metrics,
                },
            );
        }
    }

    log::debug!(
        "Scored {} reference vs {} estimated notes: {} matched, F = {:.4}",
        reference.len(),
        estimate.len(),
        metrics.with_offset.matched,
        metrics.with_offset.f_measure
    );

    Ok(ScoreReport {
        reference_count: reference.len(),
        estimate_count: estimate.len(),
        metrics,
        matches,
        per_family,
    })
}

/// [`evaluate`] over the output of [`crate::notes::prepare`]
pub fn evaluate_prepared(
    reference: &PreparedNotes,
    estimate: &PreparedNotes,
    params: &ScoringParams,
) -> Result<ScoreReport> {
    evaluate(
        &reference.intervals,
        &reference.pitches,
        &reference.families,
        &estimate.intervals,
        &estimate.pitches,
        &estimate.families,
        params,
    )
}

fn collect_notes<'a>(
    side: &str,
    intervals: &Array2<f64>,
    pitches: &[f64],
    families: &'a [String],
) -> Result<Vec<ScoredNote<'a>>> {
    let rows = intervals.nrows();
    if rows > 0 && intervals.ncols() != 2 {
        return Err(EvalError::InvalidInput(format!(
            "{} intervals must have 2 columns, got {}",
            side,
            intervals.ncols()
        )));
    }
    if pitches.len() != rows || families.len() != rows {
        return Err(EvalError::InvalidInput(format!(
            "{} arrays disagree in length: {} intervals, {} pitches, {} families",
            side,
            rows,
            pitches.len(),
            families.len()
        )));
    }

    let mut notes = Vec::with_capacity(rows);
    for (index, row) in intervals.rows().into_iter().enumerate() {
        let (onset, offset) = (row[0], row[1]);
        if !onset.is_finite() || !offset.is_finite() || onset < 0.0 || offset < onset {
            return Err(EvalError::InvalidInput(format!(
                "{} interval {} is malformed: [{}, {}]",
                side, index, onset, offset
            )));
        }
        let pitch = pitches[index];
        if !pitch.is_finite() {
            return Err(EvalError::InvalidInput(format!(
                "{} pitch {} is not finite",
                side, index
            )));
        }
        notes.push(ScoredNote {
            index,
            onset,
            offset,
            pitch,
            family: families[index].as_str(),
        });
    }
    // Matching visits notes by onset; equal onsets keep their input order
    notes.sort_by(|a, b| a.onset.total_cmp(&b.onset));
    Ok(notes)
}

fn score_all(
    reference: &[ScoredNote<'_>],
    estimate: &[ScoredNote<'_>],
    params: &ScoringParams,
) -> (MetricSet, Vec<Match>) {
    let with_offset = match_notes(reference, estimate, params, WITH_OFFSET);
    let metrics = MetricSet {
        with_offset: summarize(reference, estimate, &with_offset),
        no_offset: summarize(
            reference,
            estimate,
            &match_notes(reference, estimate, params, NO_OFFSET),
        ),
        onset_only: summarize(
            reference,
            estimate,
            &match_notes(reference, estimate, params, ONSET_ONLY),
        ),
        offset_only: summarize(
            reference,
            estimate,
            &match_notes(reference, estimate, params, OFFSET_ONLY),
        ),
    };
    (metrics, with_offset)
}

fn summarize(
    reference: &[ScoredNote<'_>],
    estimate: &[ScoredNote<'_>],
    matches: &[Match],
) -> Metrics {
    let overlaps: Vec<f64> = matches.iter().map(|m| m.overlap_ratio).collect();
    Metrics::from_counts(reference.len(), estimate.len(), &overlaps)
}

/// Maximum matching between two note lists under `criteria`.
///
/// Returned indices refer to the caller's original input positions, and the
/// matches are ordered by reference index.
fn match_notes(
    reference: &[ScoredNote<'_>],
    estimate: &[ScoredNote<'_>],
    params: &ScoringParams,
    criteria: Criteria,
) -> Vec<Match> {
    let graph = CompatibilityGraph::build(reference.len(), estimate.len(), |r, e| {
        compatible(&reference[r], &estimate[e], params, criteria)
    });

    let mut matches: Vec<Match> = graph
        .maximum_matching()
        .into_iter()
        .map(|(r, e)| {
            let (ref_note, est_note) = (&reference[r], &estimate[e]);
            Match {
                reference: ref_note.index,
                estimate: est_note.index,
                overlap_ratio: overlap_ratio(
                    (ref_note.onset, ref_note.offset),
                    (est_note.onset, est_note.offset),
                ),
                pitch_error: est_note.pitch - ref_note.pitch,
                family_match: ref_note.family == est_note.family,
            }
        })
        .collect();
    matches.sort_by_key(|m| m.reference);
    matches
}

fn compatible(
    reference: &ScoredNote<'_>,
    estimate: &ScoredNote<'_>,
    params: &ScoringParams,
    criteria: Criteria,
) -> bool {
    if params.require_family_match && reference.family != estimate.family {
        return false;
    }
    if criteria.onset && time_distance(reference.onset, estimate.onset) > params.onset_tolerance {
        return false;
    }
    if criteria.offset {
        let duration = reference.offset - reference.onset;
        let window = params.onset_tolerance.max(params.offset_ratio * duration);
        if time_distance(reference.offset, estimate.offset) > window {
            return false;
        }
    }
    if criteria.pitch && (estimate.pitch - reference.pitch).abs() > params.pitch_tolerance {
        return false;
    }
    true
}

/// Absolute time difference rounded to [`DISTANCE_DECIMALS`]
fn time_distance(a: f64, b: f64) -> f64 {
    let scale = 10f64.powi(DISTANCE_DECIMALS);
    ((a - b).abs() * scale).round() / scale
}
