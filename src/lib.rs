//! Transcription scoring
//!
//! Scores a transcribed MIDI performance against a reference score with
//! instrument-family aware, maximum-cardinality note matching, and builds
//! instrument family similarity tables from labelled audio.

pub mod audio;
pub mod config;
pub mod error;
pub mod family;
pub mod midi;
pub mod notes;
pub mod scoring;
pub mod similarity;

pub use config::Config;
pub use error::{EvalError, Result as EvalResult};
pub use family::{FamilyTable, UNKNOWN_FAMILY};
pub use notes::{NoteEvent, NoteExtractor, NoteSet, PreparedNotes};
pub use scoring::{evaluate, evaluate_prepared, ScoreReport, ScoringParams};

use std::path::Path;

/// Comparison pipeline: MIDI files in, score report out
pub struct TranscriptionScorer {
    config: Config,
    table: FamilyTable,
}

impl TranscriptionScorer {
    /// Create a scorer, loading the family table named by the configuration
    pub fn new(config: Config) -> EvalResult<Self> {
        let table = match &config.families.table_path {
            Some(path) => FamilyTable::load(path)?,
            None => FamilyTable::general_midi(),
        };
        Ok(Self::with_table(config, table))
    }

    /// Create a scorer with an explicit family table
    pub fn with_table(config: Config, table: FamilyTable) -> Self {
        Self { config, table }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn family_table(&self) -> &FamilyTable {
        &self.table
    }

    /// Extract the family-labelled notes of one MIDI file
    pub fn extract<P: AsRef<Path>>(&self, path: P) -> EvalResult<NoteSet> {
        NoteExtractor::new(&self.table).extract_path(path)
    }

    /// Score a transcription file against a reference file
    pub fn compare<P: AsRef<Path>>(
        &self,
        reference: P,
        transcription: P,
    ) -> EvalResult<ScoreReport> {
        let reference_notes = self.extract(reference)?;
        let estimated_notes = self.extract(transcription)?;
        self.compare_notes(&reference_notes, &estimated_notes)
    }

    /// Score two already-extracted note sets
    pub fn compare_notes(
        &self,
        reference: &NoteSet,
        estimate: &NoteSet,
    ) -> EvalResult<ScoreReport> {
        let params = ScoringParams::from(&self.config.scoring);
        evaluate_prepared(&reference.prepare(), &estimate.prepare(), &params)
    }
}
