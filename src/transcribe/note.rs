use serde::Serialize;

use super::duration::NoteType;

/// One transcribed note; times are seconds from the start of the buffer.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Note {
    pub start_time: f32,
    pub end_time: f32,
    /// Note name with octave (`"A4"`) or `"Rest"`.
    pub pitch: String,
    pub note_type: NoteType,
}

impl Note {
    pub fn duration(&self) -> f32 {
        self.end_time - self.start_time
    }
}
