use crate::audio::analyzer::FrameAnalyzer;
use crate::error::{Error, Result};

use super::duration::{classify, NoteType};
use super::note::Note;
use super::pitch::note_name;

/// Type carried by a note until its successor (or the end of the buffer) fixes its length.
const PROVISIONAL: NoteType = NoteType::Sixteenth;

/// A note still accumulating pitch readings.
struct OpenNote {
    start_time: f32,
    pitch_sum: f32,
    frames: u32,
}

/// Turns per-hop onset/pitch readings into a list of notes.
///
/// Hop 0 always starts a note, whatever the analyzer says. Consecutive
/// segments that resolve to the same pitch name collapse into one note, and
/// notes shorter than `min_note_duration` are dropped at the end.
pub struct Segmenter {
    hop_size: usize,
    min_note_duration: f32,
}

impl Segmenter {
    pub fn new(hop_size: usize, min_note_duration: f32) -> Self {
        Self {
            hop_size,
            min_note_duration,
        }
    }

    /// Segment an interleaved buffer.
    ///
    /// `open_analyzer` is only called for a non-empty buffer, and the
    /// analyzer it returns is dropped before this returns on every path.
    pub fn segment<A, F>(
        &self,
        samples: &[f32],
        sample_rate: u32,
        channels: usize,
        bpm: u32,
        open_analyzer: F,
    ) -> Result<Vec<Note>>
    where
        A: FrameAnalyzer,
        F: FnOnce() -> Result<A>,
    {
        if samples.is_empty() {
            return Ok(Vec::new());
        }
        if self.hop_size == 0 || sample_rate == 0 || channels == 0 {
            return Err(Error::config(format!(
                "cannot segment with hop {}, {} Hz, {} channel(s)",
                self.hop_size, sample_rate, channels
            )));
        }
        if bpm == 0 {
            return Err(Error::InvalidTempo(bpm));
        }

        let mut analyzer = open_analyzer()?;
        let samples_per_sec = sample_rate as f64 * channels as f64;
        let time_at = |offset: usize| (offset as f64 / samples_per_sec) as f32;

        let mut notes: Vec<Note> = Vec::new();
        let mut open: Option<OpenNote> = None;

        for (index, hop) in samples.chunks(self.hop_size).enumerate() {
            let reading = analyzer.process_hop(hop);
            let now = time_at(index * self.hop_size);

            if reading.onset || index == 0 {
                if let Some(note) = open.take() {
                    close_note(&mut notes, note, now, bpm, false)?;
                }
                open = Some(OpenNote {
                    start_time: now,
                    pitch_sum: reading.pitch_hz,
                    frames: 1,
                });
            } else if let Some(note) = open.as_mut() {
                note.pitch_sum += reading.pitch_hz;
                note.frames += 1;
            }
        }

        if let Some(note) = open.take() {
            close_note(&mut notes, note, time_at(samples.len()), bpm, true)?;
        }
        drop(analyzer);

        let before = notes.len();
        notes.retain(|n| n.duration() >= self.min_note_duration);
        if notes.len() < before {
            log::debug!(
                "Dropped {} note(s) shorter than {:.3}s",
                before - notes.len(),
                self.min_note_duration
            );
        }

        Ok(notes)
    }
}

/// Close `open` at `end_time`, merging into the previous note when the
/// averaged pitch resolves to the same name.
///
/// Mid-buffer closes leave the new note provisional; `last` classifies
/// whichever note ends up holding the final segment by its own length.
fn close_note(notes: &mut Vec<Note>, open: OpenNote, end_time: f32, bpm: u32, last: bool) -> Result<()> {
    let pitch = note_name(open.pitch_sum / open.frames as f32);

    match notes.last_mut() {
        Some(prev) if prev.pitch == pitch => {
            log::debug!(
                "Merging {} ({:.3}s..{:.3}s) into note starting {:.3}s",
                pitch,
                open.start_time,
                end_time,
                prev.start_time
            );
            prev.end_time = end_time;
            if last {
                prev.note_type = classify(prev.duration(), bpm)?;
            }
            return Ok(());
        }
        Some(prev) => {
            prev.note_type = classify(prev.duration(), bpm)?;
        }
        None => {}
    }

    let note_type = if last {
        classify(end_time - open.start_time, bpm)?
    } else {
        PROVISIONAL
    };
    log::debug!(
        "Note {} {:.3}s..{:.3}s ({} frames)",
        pitch,
        open.start_time,
        end_time,
        open.frames
    );
    notes.push(Note {
        start_time: open.start_time,
        end_time,
        pitch,
        note_type,
    });
    Ok(())
}
