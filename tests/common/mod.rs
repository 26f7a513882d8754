//! MIDI fixtures shared by the integration tests

use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use std::path::Path;

const TICKS_PER_BEAT: u16 = 480;

/// (channel, program, start tick, end tick, key)
pub type Spec = (u8, u8, u32, u32, u8);

/// Write a single-track file at 120 BPM: 480 ticks = 0.5 s
pub fn write_midi(path: &Path, notes: &[Spec]) {
    // (tick, order, kind); note-offs sort before note-ons at equal ticks
    let mut timeline: Vec<(u32, u8, TrackEventKind<'static>)> = Vec::new();
    let mut programs_set = std::collections::HashSet::new();
    for &(channel, program, start, end, key) in notes {
        if programs_set.insert(channel) {
            timeline.push((
                0,
                0,
                TrackEventKind::Midi {
                    channel: u4::from(channel),
                    message: MidiMessage::ProgramChange {
                        program: u7::from(program),
                    },
                },
            ));
        }
        timeline.push((
            start,
            2,
            TrackEventKind::Midi {
                channel: u4::from(channel),
                message: MidiMessage::NoteOn {
                    key: u7::from(key),
                    vel: u7::from(100),
                },
            },
        ));
        timeline.push((
            end,
            1,
            TrackEventKind::Midi {
                channel: u4::from(channel),
                message: MidiMessage::NoteOff {
                    key: u7::from(key),
                    vel: u7::from(0),
                },
            },
        ));
    }
    timeline.sort_by_key(|&(tick, order, _)| (tick, order));

    let mut track = vec![TrackEvent {
        delta: u28::from(0),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::from(500_000))),
    }];
    let mut last = 0;
    for (tick, _, kind) in timeline {
        track.push(TrackEvent {
            delta: u28::from(tick - last),
            kind,
        });
        last = tick;
    }
    track.push(TrackEvent {
        delta: u28::from(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let smf = Smf {
        header: Header::new(Format::SingleTrack, Timing::Metrical(u15::from(TICKS_PER_BEAT))),
        tracks: vec![track],
    };
    let mut bytes = Vec::new();
    smf.write(&mut bytes).unwrap();
    std::fs::write(path, bytes).unwrap();
}
