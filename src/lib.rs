//! Melody transcription: turns a recording of a single melodic line into
//! timed notes with pitch names and rhythmic values.
//!
//! The streaming path runs a stateful onset/pitch analyzer hop by hop and
//! segments its readings into [`Note`]s. The banded path projects a full
//! magnitude spectrogram through a constant-Q [`FilterBank`] and
//! log-compresses it.

pub mod audio;
pub mod config;
pub mod error;
pub mod transcribe;

pub use audio::filterbank::FilterBank;
pub use config::{AnalysisConfig, Config, FilterbankConfig, TempoConfig};
pub use error::{Error, Result};
pub use transcribe::{Note, NoteType};

use audio::analyzer::SpectralAnalyzer;
use audio::tempo::{FluxTempoEstimator, TempoEstimator};
use serde::Serialize;

/// Notes of one buffer and the tempo they were classified against.
#[derive(Clone, Debug, Serialize)]
pub struct Transcription {
    pub bpm: u32,
    pub notes: Vec<Note>,
}

/// Transcribe an interleaved buffer.
///
/// Uses `config.tempo.bpm` when set, otherwise estimates the tempo from the
/// buffer itself.
pub fn transcribe(samples: &[f32], sample_rate: u32, channels: usize, config: &Config) -> Result<Transcription> {
    config.validate()?;
    if samples.is_empty() {
        return Ok(Transcription {
            bpm: config.tempo.bpm.unwrap_or(config.tempo.fallback_bpm),
            notes: Vec::new(),
        });
    }

    let bpm = match config.tempo.bpm {
        Some(bpm) => bpm,
        None => FluxTempoEstimator::new(&config.tempo).estimate(samples, sample_rate, channels),
    };
    log::info!("Calculated BPM: {}", bpm);

    let analysis = &config.analysis;
    let segmenter = transcribe::Segmenter::new(analysis.hop_size, analysis.min_note_duration);
    let notes = segmenter.segment(samples, sample_rate, channels, bpm, || {
        SpectralAnalyzer::new(sample_rate, channels, analysis)
    })?;
    log::info!("Transcribed {} notes", notes.len());

    Ok(Transcription { bpm, notes })
}

/// Log-compressed constant-Q band energies, one row per STFT frame.
pub fn band_spectrogram(
    samples: &[f32],
    sample_rate: u32,
    channels: usize,
    config: &FilterbankConfig,
    hop_size: usize,
) -> Result<Vec<Vec<f32>>> {
    if channels == 0 || hop_size == 0 {
        return Err(Error::config("channels and hop size must be non-zero"));
    }
    let bins = config.fft_size / 2;
    let bank = FilterBank::new(
        bins,
        sample_rate as f64,
        config.bands,
        config.fmin,
        config.fmax,
        config.equal,
    )?;
    bank.log_nonzero();

    let mono = audio::window::downmix(samples, channels);
    let spectrogram = audio::spectrogram::magnitude_spectrogram(&mono, config.fft_size, hop_size);
    audio::preprocess::compress(&spectrogram, &bank, config.lambda)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 44100;

    fn tone(freq: f32, seconds: f32) -> Vec<f32> {
        let n = (SR as f32 * seconds).round() as usize;
        (0..n)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / SR as f32).sin())
            .collect()
    }

    fn fixed_tempo(bpm: u32) -> Config {
        let mut config = Config::default();
        config.tempo.bpm = Some(bpm);
        config
    }

    #[test]
    fn one_second_a440_is_a_quarter() {
        let result = transcribe(&tone(440.0, 1.0), SR, 1, &fixed_tempo(60)).unwrap();
        assert_eq!(result.bpm, 60);
        assert_eq!(result.notes.len(), 1);
        let note = &result.notes[0];
        assert_eq!(note.pitch, "A4");
        assert!(note.start_time.abs() < 1e-6);
        assert!((note.end_time - 1.0).abs() < 1e-3);
        assert_eq!(note.note_type, NoteType::Quarter);
    }

    #[test]
    fn two_tones_split_near_half_second() {
        let mut samples = tone(440.0, 0.5);
        samples.extend(tone(493.88, 0.5));
        let result = transcribe(&samples, SR, 1, &fixed_tempo(60)).unwrap();

        let pitches: Vec<&str> = result.notes.iter().map(|n| n.pitch.as_str()).collect();
        assert_eq!(pitches, vec!["A4", "B4"]);
        assert!((result.notes[0].end_time - 0.5).abs() < 0.05);
        assert_eq!(result.notes[0].end_time, result.notes[1].start_time);
    }

    #[test]
    fn gap_between_tones_is_a_rest() {
        let mut samples = tone(440.0, 0.5);
        samples.extend(vec![0.0; SR as usize / 2]);
        samples.extend(tone(587.33, 0.5));
        let result = transcribe(&samples, SR, 1, &fixed_tempo(60)).unwrap();

        let pitches: Vec<&str> = result.notes.iter().map(|n| n.pitch.as_str()).collect();
        assert_eq!(pitches, vec!["A4", "Rest", "D5"]);
        assert!((result.notes[1].start_time - 0.5).abs() < 0.05);
        assert!((result.notes[2].start_time - 1.0).abs() < 0.05);
    }

    #[test]
    fn trailing_silence_is_a_rest() {
        let mut samples = tone(440.0, 0.5);
        samples.extend(vec![0.0; SR as usize / 2]);
        let result = transcribe(&samples, SR, 1, &fixed_tempo(60)).unwrap();

        let pitches: Vec<&str> = result.notes.iter().map(|n| n.pitch.as_str()).collect();
        assert_eq!(pitches, vec!["A4", "Rest"]);
        assert!((result.notes[1].end_time - 1.0).abs() < 1e-3);
    }

    #[test]
    fn stereo_input_keeps_wall_clock_times() {
        let mono = tone(440.0, 1.0);
        let stereo: Vec<f32> = mono.iter().flat_map(|&s| [s, s]).collect();
        let result = transcribe(&stereo, SR, 2, &fixed_tempo(60)).unwrap();
        assert_eq!(result.notes.len(), 1);
        assert_eq!(result.notes[0].pitch, "A4");
        assert!((result.notes[0].end_time - 1.0).abs() < 1e-3);
    }

    #[test]
    fn empty_buffer_has_no_notes() {
        let result = transcribe(&[], SR, 1, &Config::default()).unwrap();
        assert!(result.notes.is_empty());
    }

    #[test]
    fn notes_serialize_with_snake_case_fields() {
        let result = transcribe(&tone(440.0, 1.0), SR, 1, &fixed_tempo(60)).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["bpm"], 60);
        assert_eq!(json["notes"][0]["pitch"], "A4");
        assert_eq!(json["notes"][0]["note_type"], "quarter");
    }

    #[test]
    fn band_spectrogram_shape() {
        let samples = tone(440.0, 0.5);
        let config = FilterbankConfig::default();
        let bands = band_spectrogram(&samples, SR, 1, &config, 512).unwrap();
        let bank = FilterBank::new(1024, SR as f64, 12, 27.5, 16000.0, false).unwrap();
        assert_eq!(bands.len(), samples.len().div_ceil(512));
        assert!(bands.iter().all(|row| row.len() == bank.num_bands()));
        assert!(bands.iter().flatten().all(|v| v.is_finite() && *v >= 0.0));
    }

    #[test]
    fn band_spectrogram_rejects_bad_range() {
        let config = FilterbankConfig {
            fmin: 5000.0,
            fmax: 1000.0,
            ..FilterbankConfig::default()
        };
        let err = band_spectrogram(&tone(440.0, 0.1), SR, 1, &config, 512);
        assert!(matches!(err, Err(Error::Configuration { .. })));
    }
}
