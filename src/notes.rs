//! Note events, extraction from MIDI, and preparation for scoring

use crate::error::{EvalError, Result};
use crate::family::FamilyTable;
use crate::midi::MidiFile;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

/// A note with its resolved instrument family. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    family: String,
    onset: f64,
    offset: f64,
    pitch: u8,
}

impl NoteEvent {
    /// Create a note, checking `0 <= onset <= offset` and `pitch <= 127`
    pub fn new(family: impl Into<String>, onset: f64, offset: f64, pitch: u8) -> Result<Self> {
        if !onset.is_finite() || !offset.is_finite() {
            return Err(EvalError::InvalidInput(format!(
                "note times must be finite, got [{}, {}]",
                onset, offset
            )));
        }
        if onset < 0.0 || offset < onset {
            return Err(EvalError::InvalidInput(format!(
                "note interval [{}, {}] must satisfy 0 <= onset <= offset",
                onset, offset
            )));
        }
        if pitch > 127 {
            return Err(EvalError::InvalidInput(format!(
                "MIDI pitch {} is outside 0-127",
                pitch
            )));
        }
        Ok(Self {
            family: family.into(),
            onset,
            offset,
            pitch,
        })
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn onset(&self) -> f64 {
        self.onset
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn pitch(&self) -> u8 {
        self.pitch
    }

    pub fn duration(&self) -> f64 {
        self.offset - self.onset
    }
}

/// Onset-ordered sequence of notes, fixed after construction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoteSet {
    notes: Vec<NoteEvent>,
}

impl NoteSet {
    /// Build a set, stable-sorting by onset so equal onsets keep input order
    pub fn from_events(mut notes: Vec<NoteEvent>) -> Self {
        notes.sort_by(|a, b| a.onset.total_cmp(&b.onset));
        Self { notes }
    }

    pub fn notes(&self) -> &[NoteEvent] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NoteEvent> {
        self.notes.iter()
    }

    /// Project into the parallel arrays consumed by the scorer
    pub fn prepare(&self) -> PreparedNotes {
        prepare(self)
    }
}

impl<'a> IntoIterator for &'a NoteSet {
    type Item = &'a NoteEvent;
    type IntoIter = std::slice::Iter<'a, NoteEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.notes.iter()
    }
}

/// Parallel interval / family / pitch arrays for one side of an evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedNotes {
    /// `N x 2` array of `[onset, offset]` rows in seconds
    pub intervals: Array2<f64>,
    pub families: Vec<String>,
    pub pitches: Vec<f64>,
}

impl PreparedNotes {
    pub fn len(&self) -> usize {
        self.pitches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pitches.is_empty()
    }

    /// Human-readable dump of the three arrays
    pub fn describe(&self) -> String {
        let intervals: Vec<[f64; 2]> = self
            .intervals
            .rows()
            .into_iter()
            .map(|row| [row[0], row[1]])
            .collect();
        let mut out = String::new();
        let _ = writeln!(out, "Intervals: {:?}", intervals);
        let _ = writeln!(out, "Instruments: {:?}", self.families);
        let _ = writeln!(out, "Pitches: {:?}", self.pitches);
        out
    }
}

/// Split a note set into interval, family and pitch arrays
pub fn prepare(notes: &NoteSet) -> PreparedNotes {
    let mut intervals = Array2::<f64>::zeros((notes.len(), 2));
    let mut families = Vec::with_capacity(notes.len());
    let mut pitches = Vec::with_capacity(notes.len());

    for (i, note) in notes.iter().enumerate() {
        intervals[[i, 0]] = note.onset;
        intervals[[i, 1]] = note.offset;
        families.push(note.family.clone());
        pitches.push(note.pitch as f64);
    }

    PreparedNotes {
        intervals,
        families,
        pitches,
    }
}

/// Turns MIDI containers into family-labelled note sets
#[derive(Debug, Clone)]
pub struct NoteExtractor<'t> {
    table: &'t FamilyTable,
}

impl<'t> NoteExtractor<'t> {
    pub fn new(table: &'t FamilyTable) -> Self {
        Self { table }
    }

    /// Extract every non-drum note, labelled with its instrument family
    pub fn extract(&self, midi: &MidiFile) -> Result<NoteSet> {
        let mut events = Vec::with_capacity(midi.note_count());
        let mut skipped = 0usize;

        for instrument in &midi.instruments {
            if instrument.is_drum {
                skipped += instrument.notes.len();
                continue;
            }
            let family = self.table.resolve(instrument.program);
            for note in &instrument.notes {
                events.push(NoteEvent::new(family, note.start, note.end, note.pitch)?);
            }
        }

        if skipped > 0 {
            log::debug!("Skipped {} percussion notes", skipped);
        }
        Ok(NoteSet::from_events(events))
    }

    /// Load a MIDI file and extract its notes
    pub fn extract_path<P: AsRef<Path>>(&self, path: P) -> Result<NoteSet> {
        let midi = MidiFile::load(path)?;
        self.extract(&midi)
    }
}

/// Format notes as `family, onset, offset, pitch` lines
pub fn format_note_lines(notes: &NoteSet, time_decimals: usize) -> String {
    let mut out = String::new();
    for note in notes {
        let _ = writeln!(
            out,
            "{}, {:.prec$}, {:.prec$}, {}",
            note.family,
            note.onset,
            note.offset,
            note.pitch,
            prec = time_decimals
        );
    }
    out
}
