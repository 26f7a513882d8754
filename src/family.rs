//! Instrument family resolution
//!
//! Maps General MIDI program numbers onto coarse timbral families. The table
//! is built once and then only read, so a single instance can be shared by
//! reference (or behind an `Arc`) across threads.

use crate::error::{EvalError, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Family reported for programs that no family claims
pub const UNKNOWN_FAMILY: &str = "Unknown";

/// Number of General MIDI programs
pub const PROGRAM_COUNT: usize = 128;

/// Read-only program → family lookup
#[derive(Debug, Clone)]
pub struct FamilyTable {
    families: BTreeMap<String, BTreeSet<u8>>,
    by_program: Vec<Option<String>>,
}

/// One value of the table document: a program list or a nested grouping
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FamilyEntry {
    Programs(Vec<i64>),
    Nested(BTreeMap<String, FamilyEntry>),
}

impl FamilyTable {
    /// Build a table from family → programs pairs.
    ///
    /// Fails when a program lies outside 0–127 or is claimed by two families.
    pub fn new<I, S>(families: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Vec<i64>)>,
        S: Into<String>,
    {
        let mut table = BTreeMap::new();
        let mut by_program: Vec<Option<String>> = vec![None; PROGRAM_COUNT];

        for (name, programs) in families {
            let name = name.into();
            if name.is_empty() {
                return Err(EvalError::Configuration(
                    "family names must not be empty".to_string(),
                ));
            }
            let set: &mut BTreeSet<u8> = table.entry(name.clone()).or_default();
            for program in programs {
                if !(0..PROGRAM_COUNT as i64).contains(&program) {
                    return Err(EvalError::Configuration(format!(
                        "program {} of family '{}' is outside 0-127",
                        program, name
                    )));
                }
                if let Some(owner) = &by_program[program as usize] {
                    if *owner != name {
                        return Err(EvalError::Configuration(format!(
                            "program {} is claimed by both '{}' and '{}'",
                            program, owner, name
                        )));
                    }
                }
                by_program[program as usize] = Some(name.clone());
                set.insert(program as u8);
            }
        }

        Ok(Self {
            families: table,
            by_program,
        })
    }

    /// Parse a JSON table document.
    ///
    /// Top-level keys are family names; values are program arrays or nested
    /// objects whose leaf arrays all belong to the top-level family.
    pub fn from_json_str(content: &str) -> Result<Self> {
        let document: BTreeMap<String, FamilyEntry> = serde_json::from_str(content)
            .map_err(|e| EvalError::Configuration(format!("malformed family table: {}", e)))?;
        if document.is_empty() {
            return Err(EvalError::Configuration(
                "family table defines no families".to_string(),
            ));
        }

        let families = document.into_iter().map(|(name, entry)| {
            let mut programs = Vec::new();
            entry.flatten_into(&mut programs);
            (name, programs)
        });
        Self::new(families)
    }

    /// Load a JSON table document from disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            EvalError::Configuration(format!(
                "cannot read family table {}: {}",
                path.display(),
                e
            ))
        })?;
        let table = Self::from_json_str(&content)?;
        log::debug!(
            "Loaded {} instrument families from {}",
            table.families.len(),
            path.display()
        );
        Ok(table)
    }

    /// General MIDI programs grouped into the NSynth instrument families
    pub fn general_midi() -> Self {
        let ranges: [(&str, std::ops::Range<i64>); 13] = [
            ("keyboard", 0..8),
            ("mallet", 8..16),
            ("organ", 16..24),
            ("guitar", 24..32),
            ("bass", 32..40),
            ("string", 40..46),
            ("string", 48..52),
            ("vocal", 52..55),
            ("brass", 56..64),
            ("reed", 64..72),
            ("flute", 72..80),
            ("synth_lead", 80..88),
            ("vocal", 91..92),
        ];

        // Ranges are disjoint and inside 0-127, so no validation is needed
        let mut families: BTreeMap<String, BTreeSet<u8>> = BTreeMap::new();
        let mut by_program: Vec<Option<String>> = vec![None; PROGRAM_COUNT];
        for (name, range) in ranges {
            let set = families.entry(name.to_string()).or_default();
            for program in range {
                set.insert(program as u8);
                by_program[program as usize] = Some(name.to_string());
            }
        }

        Self {
            families,
            by_program,
        }
    }

    /// Resolve a program number to its family, or [`UNKNOWN_FAMILY`]
    pub fn resolve(&self, program: u8) -> &str {
        self.by_program
            .get(program as usize)
            .and_then(|slot| slot.as_deref())
            .unwrap_or(UNKNOWN_FAMILY)
    }

    /// Family names in sorted order
    pub fn family_names(&self) -> impl Iterator<Item = &str> {
        self.families.keys().map(String::as_str)
    }

    /// Programs claimed by a family
    pub fn programs(&self, family: &str) -> Option<&BTreeSet<u8>> {
        self.families.get(family)
    }

    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }
}

impl Default for FamilyTable {
    fn default() -> Self {
        Self::general_midi()
    }
}

impl FamilyEntry {
    fn flatten_into(self, programs: &mut Vec<i64>) {
        match self {
            FamilyEntry::Programs(list) => programs.extend(list),
            FamilyEntry::Nested(children) => {
                for (_, child) in children {
                    child.flatten_into(programs);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_general_midi_lookup() {
        let table = FamilyTable::general_midi();
        assert_eq!(table.resolve(0), "keyboard");
        assert_eq!(table.resolve(33), "bass");
        assert_eq!(table.resolve(40), "string");
        assert_eq!(table.resolve(56), "brass");
        assert_eq!(table.resolve(73), "flute");
        assert_eq!(table.resolve(52), "vocal");
    }

    #[test]
    fn test_unclaimed_program_is_unknown() {
        let table = FamilyTable::general_midi();
        // Synth pads and sound effects have no family
        assert_eq!(table.resolve(88), UNKNOWN_FAMILY);
        assert_eq!(table.resolve(127), UNKNOWN_FAMILY);
        assert_eq!(table.resolve(200), UNKNOWN_FAMILY);
    }

    #[test]
    fn test_nested_json_is_flattened() {
        let json = r#"{
            "string": {"solo": [40, 41], "ensemble": {"section": [48]}},
            "keyboard": [0, 1]
        }"#;
        let table = FamilyTable::from_json_str(json).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.resolve(48), "string");
        assert_eq!(table.resolve(41), "string");
        assert_eq!(table.resolve(1), "keyboard");
        assert_eq!(table.resolve(2), UNKNOWN_FAMILY);
        let names: Vec<&str> = table.family_names().collect();
        assert_eq!(names, vec!["keyboard", "string"]);
    }

    #[test]
    fn test_duplicate_program_rejected() {
        let json = r#"{"brass": [56], "reed": [56]}"#;
        let err = FamilyTable::from_json_str(json).unwrap_err();
        assert!(matches!(err, EvalError::Configuration(_)));
    }

    #[test]
    fn test_out_of_range_program_rejected() {
        assert!(FamilyTable::from_json_str(r#"{"brass": [128]}"#).is_err());
        assert!(FamilyTable::from_json_str(r#"{"brass": [-1]}"#).is_err());
    }

    #[test]
    fn test_malformed_documents_rejected() {
        assert!(FamilyTable::from_json_str("{}").is_err());
        assert!(FamilyTable::from_json_str(r#"{"brass": "56"}"#).is_err());
        assert!(FamilyTable::from_json_str("not json").is_err());
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let err = FamilyTable::load("/nonexistent/families.json").unwrap_err();
        assert!(matches!(err, EvalError::Configuration(_)));
    }
}
