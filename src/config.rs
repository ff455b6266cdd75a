use serde::Deserialize;
use std::path::Path;

use crate::audio::filterbank::MAX_BANDS_PER_OCTAVE;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub tempo: TempoConfig,
    #[serde(default)]
    pub filterbank: FilterbankConfig,
}

/// Parameters of the per-hop onset/pitch scan and the note post-pass.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_hop_size")]
    pub hop_size: usize,
    #[serde(default = "default_frame_size")]
    pub frame_size: usize,
    /// Frames quieter than this (dBFS) report no pitch and no onset.
    #[serde(default = "default_silence_db")]
    pub silence_db: f32,
    /// Floor for the relative spectral flux that counts as an onset.
    #[serde(default = "default_onset_threshold")]
    pub onset_threshold: f32,
    #[serde(default = "default_onset_history")]
    pub onset_history: usize,
    #[serde(default = "default_onset_multiplier")]
    pub onset_multiplier: f32,
    #[serde(default = "default_min_onset_gap_hops")]
    pub min_onset_gap_hops: usize,
    #[serde(default = "default_pitch_min_hz")]
    pub pitch_min_hz: f32,
    #[serde(default = "default_pitch_max_hz")]
    pub pitch_max_hz: f32,
    #[serde(default = "default_yin_threshold")]
    pub yin_threshold: f32,
    /// Notes shorter than this (seconds) are dropped as detector noise.
    #[serde(default = "default_min_note_duration")]
    pub min_note_duration: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TempoConfig {
    /// Fixed tempo; skips estimation when set.
    #[serde(default)]
    pub bpm: Option<u32>,
    #[serde(default = "default_fallback_bpm")]
    pub fallback_bpm: u32,
    #[serde(default = "default_min_bpm")]
    pub min_bpm: u32,
    #[serde(default = "default_max_bpm")]
    pub max_bpm: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilterbankConfig {
    #[serde(default = "default_bands")]
    pub bands: usize,
    #[serde(default = "default_fmin")]
    pub fmin: f64,
    #[serde(default = "default_fmax")]
    pub fmax: f64,
    #[serde(default)]
    pub equal: bool,
    #[serde(default = "default_lambda")]
    pub lambda: f32,
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            hop_size: default_hop_size(),
            frame_size: default_frame_size(),
            silence_db: default_silence_db(),
            onset_threshold: default_onset_threshold(),
            onset_history: default_onset_history(),
            onset_multiplier: default_onset_multiplier(),
            min_onset_gap_hops: default_min_onset_gap_hops(),
            pitch_min_hz: default_pitch_min_hz(),
            pitch_max_hz: default_pitch_max_hz(),
            yin_threshold: default_yin_threshold(),
            min_note_duration: default_min_note_duration(),
        }
    }
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            bpm: None,
            fallback_bpm: default_fallback_bpm(),
            min_bpm: default_min_bpm(),
            max_bpm: default_max_bpm(),
        }
    }
}

impl Default for FilterbankConfig {
    fn default() -> Self {
        Self {
            bands: default_bands(),
            fmin: default_fmin(),
            fmax: default_fmax(),
            equal: false,
            lambda: default_lambda(),
            fft_size: default_fft_size(),
        }
    }
}

fn default_hop_size() -> usize { 512 }
fn default_frame_size() -> usize { 2048 }
fn default_silence_db() -> f32 { -50.0 }
fn default_onset_threshold() -> f32 { 0.15 }
fn default_onset_history() -> usize { 16 }
fn default_onset_multiplier() -> f32 { 1.5 }
fn default_min_onset_gap_hops() -> usize { 4 }
fn default_pitch_min_hz() -> f32 { 80.0 }
fn default_pitch_max_hz() -> f32 { 1600.0 }
fn default_yin_threshold() -> f32 { 0.15 }
fn default_min_note_duration() -> f32 { 0.03 }
fn default_fallback_bpm() -> u32 { 120 }
fn default_min_bpm() -> u32 { 40 }
fn default_max_bpm() -> u32 { 240 }
fn default_bands() -> usize { 12 }
fn default_fmin() -> f64 { 27.5 }
fn default_fmax() -> f64 { 16000.0 }
fn default_lambda() -> f32 { 1.0 }
fn default_fft_size() -> usize { 2048 }

impl Config {
    pub fn validate(&self) -> Result<()> {
        let a = &self.analysis;
        if a.hop_size == 0 || a.frame_size == 0 {
            return Err(Error::config("hop_size and frame_size must be non-zero"));
        }
        if a.frame_size < a.hop_size {
            return Err(Error::config(format!(
                "frame_size {} is smaller than hop_size {}",
                a.frame_size, a.hop_size
            )));
        }
        if !(a.pitch_min_hz > 0.0 && a.pitch_min_hz < a.pitch_max_hz) {
            return Err(Error::config(format!(
                "pitch range {}..{} Hz is empty",
                a.pitch_min_hz, a.pitch_max_hz
            )));
        }
        if a.min_note_duration < 0.0 {
            return Err(Error::config("min_note_duration must not be negative"));
        }

        let t = &self.tempo;
        if t.bpm == Some(0) || t.fallback_bpm == 0 || t.min_bpm == 0 || t.min_bpm > t.max_bpm {
            return Err(Error::config("tempo bounds must be positive and ordered"));
        }

        let f = &self.filterbank;
        if f.bands == 0 || f.bands > MAX_BANDS_PER_OCTAVE {
            return Err(Error::config(format!(
                "filterbank bands {} outside 1..={}",
                f.bands, MAX_BANDS_PER_OCTAVE
            )));
        }
        if f.fft_size < 4 {
            return Err(Error::config("filterbank fft_size must be at least 4"));
        }
        if !(f.lambda > 0.0 && f.lambda <= 20.0) {
            return Err(Error::config(format!(
                "lambda {} outside (0, 20]",
                f.lambda
            )));
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(cfg) => Some(cfg),
        Err(err) => {
            log::warn!("Ignoring malformed config {}: {}", path.display(), err);
            None
        }
    }
}
