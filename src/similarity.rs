//! Instrument family similarity
//!
//! Averages a feature vector per instrument family over a labelled audio
//! corpus and compares the family means by cosine similarity. Feature
//! extraction is supplied by the caller through [`FeatureExtractor`].

use crate::error::{EvalError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Fixed-length feature vector for one waveform
pub trait FeatureExtractor {
    fn features(&self, waveform: &[f32], sample_rate: u32) -> Result<Vec<f64>>;
}

impl<F> FeatureExtractor for F
where
    F: Fn(&[f32], u32) -> Result<Vec<f64>>,
{
    fn features(&self, waveform: &[f32], sample_rate: u32) -> Result<Vec<f64>> {
        self(waveform, sample_rate)
    }
}

/// One labelled audio sample of the corpus
#[derive(Debug, Clone)]
pub struct LabeledSample {
    pub family: String,
    pub waveform: Vec<f32>,
    pub sample_rate: u32,
}

/// Precomputed features for one sample, as read from a features file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub family: String,
    pub features: Vec<f64>,
}

/// Running per-family feature sums
///
/// Partial accumulators built over disjoint parts of a corpus can be
/// combined with [`FamilyAccumulator::merge`].
#[derive(Debug, Clone, Default)]
pub struct FamilyAccumulator {
    dimension: Option<usize>,
    sums: BTreeMap<String, (Vec<f64>, usize)>,
}

impl FamilyAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one sample's features to its family's running sum
    pub fn add(&mut self, family: &str, features: &[f64]) -> Result<()> {
        self.check_dimension(features.len())?;
        if let Some(bad) = features.iter().position(|v| !v.is_finite()) {
            return Err(EvalError::Similarity(format!(
                "feature {} of a '{}' sample is not finite",
                bad, family
            )));
        }

        let (sum, count) = self
            .sums
            .entry(family.to_string())
            .or_insert_with(|| (vec![0.0; features.len()], 0));
        for (acc, value) in sum.iter_mut().zip(features) {
            *acc += value;
        }
        *count += 1;
        Ok(())
    }

    /// Fold another accumulator into this one
    pub fn merge(&mut self, other: FamilyAccumulator) -> Result<()> {
        if let Some(dimension) = other.dimension {
            self.check_dimension(dimension)?;
        }
        for (family, (other_sum, other_count)) in other.sums {
            match self.sums.get_mut(&family) {
                Some((sum, count)) => {
                    for (acc, value) in sum.iter_mut().zip(&other_sum) {
                        *acc += value;
                    }
                    *count += other_count;
                }
                None => {
                    self.sums.insert(family, (other_sum, other_count));
                }
            }
        }
        Ok(())
    }

    /// Number of samples seen per family
    pub fn counts(&self) -> BTreeMap<&str, usize> {
        self.sums
            .iter()
            .map(|(family, (_, count))| (family.as_str(), *count))
            .collect()
    }

    /// Mean feature vector per family
    pub fn means(&self) -> BTreeMap<String, Vec<f64>> {
        self.sums
            .iter()
            .map(|(family, (sum, count))| {
                let n = *count as f64;
                (family.clone(), sum.iter().map(|v| v / n).collect())
            })
            .collect()
    }

    fn check_dimension(&mut self, len: usize) -> Result<()> {
        if len == 0 {
            return Err(EvalError::Similarity("empty feature vector".to_string()));
        }
        match self.dimension {
            Some(expected) if expected != len => Err(EvalError::Similarity(format!(
                "feature vectors differ in length: expected {}, got {}",
                expected, len
            ))),
            _ => {
                self.dimension = Some(len);
                Ok(())
            }
        }
    }
}

/// Symmetric family × family cosine similarity table
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatrix {
    families: Vec<String>,
    values: Array2<f64>,
}

impl SimilarityMatrix {
    /// Pairwise cosine similarity of family mean vectors (families sorted)
    pub fn from_means(means: &BTreeMap<String, Vec<f64>>) -> Result<Self> {
        if means.is_empty() {
            return Err(EvalError::Similarity("no families to compare".to_string()));
        }
        let families: Vec<String> = means.keys().cloned().collect();
        let vectors: Vec<&Vec<f64>> = means.values().collect();
        let n = families.len();

        let mut values = Array2::<f64>::zeros((n, n));
        for i in 0..n {
            for j in i..n {
                let sim = cosine_similarity(vectors[i], vectors[j]);
                values[[i, j]] = sim;
                values[[j, i]] = sim;
            }
        }
        Ok(Self { families, values })
    }

    pub fn families(&self) -> &[String] {
        &self.families
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Similarity between two families, if both are present
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.families.iter().position(|f| f == a)?;
        let j = self.families.iter().position(|f| f == b)?;
        Some(self.values[[i, j]])
    }

    /// `family -> family -> similarity` nested mapping
    pub fn to_nested_map(&self) -> BTreeMap<String, BTreeMap<String, f64>> {
        self.families
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let cols = self
                    .families
                    .iter()
                    .enumerate()
                    .map(|(j, col)| (col.clone(), self.values[[i, j]]))
                    .collect();
                (row.clone(), cols)
            })
            .collect()
    }

    /// Write the nested mapping as pretty JSON
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.to_nested_map())?;
        std::fs::write(path.as_ref(), content)?;
        log::info!(
            "Similarity matrix for {} families saved to {}",
            self.families.len(),
            path.as_ref().display()
        );
        Ok(())
    }
}

/// Cosine of the angle between two vectors, 0 if either has zero norm
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Extract features for every sample, average per family, compare families
pub fn build_similarity<I, E>(corpus: I, extractor: &E) -> Result<SimilarityMatrix>
where
    I: IntoIterator<Item = LabeledSample>,
    E: FeatureExtractor + ?Sized,
{
    let mut accumulator = FamilyAccumulator::new();
    let mut processed = 0usize;
    for sample in corpus {
        let features = extractor.features(&sample.waveform, sample.sample_rate)?;
        accumulator.add(&sample.family, &features)?;
        processed += 1;
        if processed % 1000 == 0 {
            log::info!("Extracted features for {} samples", processed);
        }
    }
    log::debug!("Family sample counts: {:?}", accumulator.counts());
    SimilarityMatrix::from_means(&accumulator.means())
}

/// Build the matrix from already-extracted feature records
pub fn similarity_from_records<'a, I>(records: I) -> Result<SimilarityMatrix>
where
    I: IntoIterator<Item = &'a FeatureRecord>,
{
    let mut accumulator = FamilyAccumulator::new();
    for record in records {
        accumulator.add(&record.family, &record.features)?;
    }
    SimilarityMatrix::from_means(&accumulator.means())
}

/// Read a JSON array of [`FeatureRecord`]s
pub fn load_feature_records<P: AsRef<Path>>(path: P) -> Result<Vec<FeatureRecord>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        EvalError::InvalidInput(format!("cannot read {}: {}", path.display(), e))
    })?;
    let records: Vec<FeatureRecord> = serde_json::from_str(&content).map_err(|e| {
        EvalError::InvalidInput(format!("malformed feature file {}: {}", path.display(), e))
    })?;
    Ok(records)
}
