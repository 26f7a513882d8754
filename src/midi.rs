//! MIDI container reading
//!
//! Walks a Standard MIDI File parsed by `midly` and groups its notes into
//! instruments keyed by (track, channel, program), with note times converted
//! from ticks to seconds through the file's tempo map.

use crate::error::{EvalError, Result};
use midly::{Format, MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::collections::{HashMap, VecDeque};
use std::path::Path;

/// Zero-based channel reserved for percussion in General MIDI
pub const DRUM_CHANNEL: u8 = 9;

/// Default tempo before any Set Tempo event (120 BPM)
const DEFAULT_US_PER_BEAT: f64 = 500_000.0;

/// A single sounding note
#[derive(Debug, Clone, PartialEq)]
pub struct MidiNote {
    pub pitch: u8,
    pub velocity: u8,
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
}

/// Notes played by one program on one channel of one track
#[derive(Debug, Clone)]
pub struct MidiInstrument {
    pub track: usize,
    pub channel: u8,
    pub program: u8,
    pub is_drum: bool,
    pub notes: Vec<MidiNote>,
}

/// Parsed note container
#[derive(Debug, Clone, Default)]
pub struct MidiFile {
    pub instruments: Vec<MidiInstrument>,
}

impl MidiFile {
    /// Read and parse a MIDI file from disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| {
            EvalError::InvalidInput(format!("cannot read {}: {}", path.display(), e))
        })?;
        let midi = Self::parse(&data).map_err(|e| match e {
            EvalError::MidiParse(msg) => {
                EvalError::MidiParse(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })?;
        log::debug!(
            "Parsed {} instruments ({} notes) from {}",
            midi.instruments.len(),
            midi.note_count(),
            path.display()
        );
        Ok(midi)
    }

    /// Parse raw SMF bytes
    pub fn parse(data: &[u8]) -> Result<Self> {
        let smf = Smf::parse(data)?;
        let global_map = match smf.header.format {
            Format::Sequential => None,
            _ => Some(TempoMap::from_tracks(smf.header.timing, smf.tracks.iter())?),
        };

        let mut instruments = Vec::new();
        for (track_idx, track) in smf.tracks.iter().enumerate() {
            let local_map;
            let tempo_map = match &global_map {
                Some(map) => map,
                None => {
                    local_map = TempoMap::from_tracks(smf.header.timing, std::iter::once(track))?;
                    &local_map
                }
            };
            read_track(track_idx, track, tempo_map, &mut instruments);
        }

        Ok(Self { instruments })
    }

    /// Total number of notes across all instruments
    pub fn note_count(&self) -> usize {
        self.instruments.iter().map(|i| i.notes.len()).sum()
    }
}

/// Collect the notes of one track into its (channel, program) instruments
fn read_track(
    track_idx: usize,
    track: &[midly::TrackEvent<'_>],
    tempo_map: &TempoMap,
    instruments: &mut Vec<MidiInstrument>,
) {
    let mut programs = [0u8; 16];
    let mut slots: HashMap<(u8, u8), usize> = HashMap::new();
    // (channel, key) -> open notes, first in first out
    let mut open: HashMap<(u8, u8), VecDeque<(u64, u8, u8)>> = HashMap::new();
    let mut tick = 0u64;

    let close = |instruments: &mut Vec<MidiInstrument>,
                 slots: &mut HashMap<(u8, u8), usize>,
                 channel: u8,
                 key: u8,
                 start_tick: u64,
                 velocity: u8,
                 program: u8,
                 end_tick: u64| {
        let idx = *slots.entry((channel, program)).or_insert_with(|| {
            instruments.push(MidiInstrument {
                track: track_idx,
                channel,
                program,
                is_drum: channel == DRUM_CHANNEL,
                notes: Vec::new(),
            });
            instruments.len() - 1
        });
        instruments[idx].notes.push(MidiNote {
            pitch: key,
            velocity,
            start: tempo_map.seconds_at(start_tick),
            end: tempo_map.seconds_at(end_tick),
        });
    };

    for event in track {
        tick += event.delta.as_int() as u64;
        let (channel, message) = match event.kind {
            TrackEventKind::Midi { channel, message } => (channel.as_int(), message),
            _ => continue,
        };

        match message {
            MidiMessage::ProgramChange { program } => {
                programs[channel as usize] = program.as_int();
            }
            MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                open.entry((channel, key.as_int())).or_default().push_back((
                    tick,
                    vel.as_int(),
                    programs[channel as usize],
                ));
            }
            MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                let key = key.as_int();
                if let Some((start, velocity, program)) =
                    open.get_mut(&(channel, key)).and_then(|q| q.pop_front())
                {
                    close(
                        instruments,
                        &mut slots,
                        channel,
                        key,
                        start,
                        velocity,
                        program,
                        tick,
                    );
                } else {
                    log::trace!("Ignoring note-off without note-on: ch {} key {}", channel, key);
                }
            }
            _ => {}
        }
    }

    // Notes still sounding at the end of the track end there
    let mut dangling: Vec<((u8, u8), (u64, u8, u8))> = open
        .into_iter()
        .flat_map(|(k, queue)| queue.into_iter().map(move |n| (k, n)))
        .collect();
    dangling.sort_by_key(|&((channel, key), (start, _, _))| (start, channel, key));
    if !dangling.is_empty() {
        log::debug!(
            "Track {}: closing {} dangling notes at end of track",
            track_idx,
            dangling.len()
        );
    }
    for ((channel, key), (start, velocity, program)) in dangling {
        close(
            instruments,
            &mut slots,
            channel,
            key,
            start,
            velocity,
            program,
            tick,
        );
    }
}

/// Piecewise-linear tick → seconds conversion
#[derive(Debug, Clone)]
struct TempoMap {
    /// Seconds per tick when the file uses SMPTE timecode
    fixed_seconds_per_tick: Option<f64>,
    ticks_per_beat: f64,
    /// (tick, seconds at tick, microseconds per beat from tick on)
    segments: Vec<(u64, f64, f64)>,
}

impl TempoMap {
    fn from_tracks<'t, 'd: 't, I>(timing: Timing, tracks: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'t Vec<midly::TrackEvent<'d>>>,
    {
        let ticks_per_beat = match timing {
            Timing::Metrical(tpb) => {
                let tpb = tpb.as_int();
                if tpb == 0 {
                    return Err(EvalError::MidiParse(
                        "header declares zero ticks per beat".to_string(),
                    ));
                }
                tpb as f64
            }
            Timing::Timecode(fps, subframes) => {
                let frames_per_sec = match fps {
                    midly::Fps::Fps24 => 24.0,
                    midly::Fps::Fps25 => 25.0,
                    midly::Fps::Fps29 => 29.97,
                    midly::Fps::Fps30 => 30.0,
                };
                if subframes == 0 {
                    return Err(EvalError::MidiParse(
                        "header declares zero subframes per frame".to_string(),
                    ));
                }
                return Ok(Self {
                    fixed_seconds_per_tick: Some(1.0 / (frames_per_sec * subframes as f64)),
                    ticks_per_beat: 1.0,
                    segments: vec![(0, 0.0, DEFAULT_US_PER_BEAT)],
                });
            }
        };

        let mut changes: Vec<(u64, f64)> = Vec::new();
        for track in tracks {
            let mut tick = 0u64;
            for event in track {
                tick += event.delta.as_int() as u64;
                if let TrackEventKind::Meta(MetaMessage::Tempo(us)) = event.kind {
                    changes.push((tick, us.as_int() as f64));
                }
            }
        }
        changes.sort_by_key(|&(tick, _)| tick);

        let mut map = Self {
            fixed_seconds_per_tick: None,
            ticks_per_beat,
            segments: vec![(0, 0.0, DEFAULT_US_PER_BEAT)],
        };
        for (tick, us_per_beat) in changes {
            let seconds = map.seconds_at(tick);
            match map.segments.last_mut() {
                Some(last) if last.0 == tick => last.2 = us_per_beat,
                _ => map.segments.push((tick, seconds, us_per_beat)),
            }
        }
        Ok(map)
    }

    fn seconds_at(&self, tick: u64) -> f64 {
        if let Some(seconds_per_tick) = self.fixed_seconds_per_tick {
            return tick as f64 * seconds_per_tick;
        }
        let idx = self
            .segments
            .partition_point(|&(start, _, _)| start <= tick)
            .saturating_sub(1);
        let (start, seconds, us_per_beat) = self.segments[idx];
        seconds + (tick - start) as f64 / self.ticks_per_beat * us_per_beat / 1_000_000.0
    }
}
