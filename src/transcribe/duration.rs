use serde::Serialize;
use std::fmt;

use crate::error::{Error, Result};

/// Rhythmic value of a note relative to the beat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoteType {
    Sixteenth,
    Eighth,
    Quarter,
    DottedQuarter,
    Half,
    DottedHalf,
    Whole,
}

/// Every rhythmic value with its length in beats, shortest first.
pub const DURATION_TABLE: [(NoteType, f32); 7] = [
    (NoteType::Sixteenth, 0.25),
    (NoteType::Eighth, 0.5),
    (NoteType::Quarter, 1.0),
    (NoteType::DottedQuarter, 1.5),
    (NoteType::Half, 2.0),
    (NoteType::DottedHalf, 3.0),
    (NoteType::Whole, 4.0),
];

impl NoteType {
    pub fn beats(self) -> f32 {
        DURATION_TABLE
            .iter()
            .find(|(t, _)| *t == self)
            .map_or(0.0, |&(_, b)| b)
    }

    pub fn label(self) -> &'static str {
        match self {
            NoteType::Sixteenth => "sixteenth",
            NoteType::Eighth => "eighth",
            NoteType::Quarter => "quarter",
            NoteType::DottedQuarter => "dotted-quarter",
            NoteType::Half => "half",
            NoteType::DottedHalf => "dotted-half",
            NoteType::Whole => "whole",
        }
    }
}

impl fmt::Display for NoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Nearest rhythmic value for `duration_secs` at `bpm`.
///
/// Exact ties go to the shorter value.
pub fn classify(duration_secs: f32, bpm: u32) -> Result<NoteType> {
    if bpm == 0 {
        return Err(Error::InvalidTempo(bpm));
    }
    let beat_secs = 60.0 / bpm as f32;
    let beats = duration_secs / beat_secs;

    let mut best = DURATION_TABLE[0];
    let mut best_diff = (best.1 - beats).abs();
    for &(note_type, value) in &DURATION_TABLE[1..] {
        let diff = (value - beats).abs();
        if diff < best_diff {
            best = (note_type, value);
            best_diff = diff;
        }
    }
    Ok(best.0)
}
