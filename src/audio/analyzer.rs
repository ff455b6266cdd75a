use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::collections::VecDeque;
use std::sync::Arc;

use super::window::{downmix, hamming};
use crate::config::AnalysisConfig;
use crate::error::{Error, Result};

/// What the analyzer saw in one hop.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameReading {
    /// A note boundary starts in this hop.
    pub onset: bool,
    /// Fundamental frequency in Hz; `<= 0.0` means silence or unvoiced.
    pub pitch_hz: f32,
}

/// Stateful per-hop onset/pitch detector.
///
/// Hops must arrive in temporal order. One instance covers exactly one buffer;
/// its state goes away when it is dropped.
pub trait FrameAnalyzer {
    fn process_hop(&mut self, hop: &[f32]) -> FrameReading;
}

/// Spectral-flux onsets plus YIN pitch over a sliding mono frame.
pub struct SpectralAnalyzer {
    sample_rate: u32,
    channels: usize,
    frame: Vec<f32>,
    filled: usize,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    fft_buffer: Vec<Complex<f32>>,
    prev_spectrum: Vec<f32>,
    flux_history: VecDeque<f32>,
    history_len: usize,
    prev_flux: f32,
    hops_since_onset: usize,
    hops_seen: usize,
    silence_db: f32,
    onset_threshold: f32,
    onset_multiplier: f32,
    min_onset_gap: usize,
    min_lag: usize,
    max_lag: usize,
    yin_threshold: f32,
    yin_buffer: Vec<f32>,
}

impl SpectralAnalyzer {
    pub fn new(sample_rate: u32, channels: usize, config: &AnalysisConfig) -> Result<Self> {
        if sample_rate == 0 || channels == 0 {
            return Err(Error::AnalyzerInit(format!(
                "unusable stream: {} Hz, {} channel(s)",
                sample_rate, channels
            )));
        }
        let frame_size = config.frame_size;
        if frame_size < 8 || config.hop_size == 0 || config.hop_size > frame_size {
            return Err(Error::AnalyzerInit(format!(
                "frame size {} and hop size {} do not fit",
                frame_size, config.hop_size
            )));
        }
        if !(config.pitch_min_hz > 0.0 && config.pitch_min_hz < config.pitch_max_hz) {
            return Err(Error::AnalyzerInit(format!(
                "empty pitch range {}..{} Hz",
                config.pitch_min_hz, config.pitch_max_hz
            )));
        }

        // YIN runs over the newest half frame, so lags stop at a quarter frame.
        let lag_limit = frame_size / 4 - 1;
        let min_lag = ((sample_rate as f32 / config.pitch_max_hz).floor() as usize).max(2);
        let max_lag = ((sample_rate as f32 / config.pitch_min_hz).ceil() as usize).min(lag_limit);
        if min_lag >= max_lag {
            return Err(Error::AnalyzerInit(format!(
                "pitch range {}..{} Hz does not fit a {}-sample frame at {} Hz",
                config.pitch_min_hz, config.pitch_max_hz, frame_size, sample_rate
            )));
        }

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(frame_size);

        log::debug!(
            "Analyzer ready: frame={}, hop={}, lags {}..{}",
            frame_size,
            config.hop_size,
            min_lag,
            max_lag
        );

        Ok(Self {
            sample_rate,
            channels,
            frame: vec![0.0; frame_size],
            filled: 0,
            window: hamming(frame_size),
            fft,
            fft_buffer: vec![Complex::new(0.0, 0.0); frame_size],
            prev_spectrum: vec![0.0; frame_size / 2],
            flux_history: VecDeque::with_capacity(config.onset_history + 1),
            history_len: config.onset_history.max(1),
            prev_flux: 0.0,
            hops_since_onset: config.min_onset_gap_hops,
            hops_seen: 0,
            silence_db: config.silence_db,
            onset_threshold: config.onset_threshold,
            onset_multiplier: config.onset_multiplier,
            min_onset_gap: config.min_onset_gap_hops,
            min_lag,
            max_lag,
            yin_threshold: config.yin_threshold,
            yin_buffer: vec![0.0; lag_limit + 1],
        })
    }

    fn push_samples(&mut self, hop: &[f32]) -> bool {
        let mono = downmix(hop, self.channels);
        let size = self.frame.len();
        let n = mono.len().min(size);
        let was_full = self.filled >= size;
        self.frame.copy_within(n.., 0);
        self.frame[size - n..].copy_from_slice(&mono[mono.len() - n..]);
        self.filled = (self.filled + n).min(size);
        was_full
    }

    /// Relative positive spectral flux against the previous frame.
    fn spectral_flux(&mut self) -> f32 {
        for ((slot, &s), &w) in self.fft_buffer.iter_mut().zip(&self.frame).zip(&self.window) {
            *slot = Complex::new(s * w, 0.0);
        }
        self.fft.process(&mut self.fft_buffer);

        let mut rise = 0.0f32;
        let mut total = 0.0f32;
        for (c, prev) in self.fft_buffer.iter().zip(self.prev_spectrum.iter_mut()) {
            let mag = c.norm();
            rise += (mag - *prev).max(0.0);
            total += mag;
            *prev = mag;
        }
        if total > 1e-9 {
            rise / total
        } else {
            0.0
        }
    }

    /// Newest half frame, or less while the frame is still filling.
    fn pitch_window(&self) -> &[f32] {
        let size = self.frame.len();
        let len = self.filled.min(size / 2);
        &self.frame[size - len..]
    }

    fn yin(&mut self) -> f32 {
        let len = self.pitch_window().len();
        let half = len / 2;
        if half < 2 {
            return 0.0;
        }
        let max_lag = self.max_lag.min(half - 1);
        if max_lag <= self.min_lag {
            return 0.0;
        }

        let size = self.frame.len();
        let signal = &self.frame[size - len..];
        let d = &mut self.yin_buffer;

        // Difference function, normalized by its cumulative mean.
        d[0] = 1.0;
        let mut running = 0.0f32;
        for tau in 1..=max_lag {
            let diff: f32 = signal[..half]
                .iter()
                .zip(&signal[tau..tau + half])
                .map(|(a, b)| (a - b) * (a - b))
                .sum();
            running += diff;
            d[tau] = if running > 0.0 {
                diff * tau as f32 / running
            } else {
                1.0
            };
        }

        let mut best = None;
        let mut tau = self.min_lag;
        while tau <= max_lag {
            if d[tau] < self.yin_threshold {
                while tau < max_lag && d[tau + 1] < d[tau] {
                    tau += 1;
                }
                best = Some(tau);
                break;
            }
            tau += 1;
        }
        // No dip under the threshold: aperiodic, report unvoiced.
        let Some(tau) = best else {
            return 0.0;
        };

        let refined = if tau > 1 && tau < max_lag {
            let (s0, s1, s2) = (d[tau - 1], d[tau], d[tau + 1]);
            let denom = s0 - 2.0 * s1 + s2;
            if denom.abs() > f32::EPSILON {
                tau as f32 + 0.5 * (s0 - s2) / denom
            } else {
                tau as f32
            }
        } else {
            tau as f32
        };

        self.sample_rate as f32 / refined
    }

    fn is_silent(&self) -> bool {
        let window = self.pitch_window();
        if window.is_empty() {
            return true;
        }
        let rms = (window.iter().map(|s| s * s).sum::<f32>() / window.len() as f32).sqrt();
        20.0 * rms.max(1e-10).log10() < self.silence_db
    }

    /// True when some quarter of the pitch window is below the silence gate,
    /// i.e. a note starts or stops inside it.
    fn has_silent_gap(&self) -> bool {
        let window = self.pitch_window();
        let block = (window.len() / 4).max(1);
        window.chunks(block).any(|chunk| {
            let rms = (chunk.iter().map(|s| s * s).sum::<f32>() / chunk.len() as f32).sqrt();
            20.0 * rms.max(1e-10).log10() < self.silence_db
        })
    }

    fn flux_threshold(&self) -> f32 {
        if self.flux_history.is_empty() {
            return self.onset_threshold;
        }
        let mean = self.flux_history.iter().sum::<f32>() / self.flux_history.len() as f32;
        (mean * self.onset_multiplier).max(self.onset_threshold)
    }
}

impl FrameAnalyzer for SpectralAnalyzer {
    fn process_hop(&mut self, hop: &[f32]) -> FrameReading {
        self.hops_seen += 1;
        if hop.is_empty() {
            return FrameReading::default();
        }

        let was_full = self.push_samples(hop);
        let silent = self.is_silent();
        let flux = self.spectral_flux();
        let pitch_hz = if silent || self.has_silent_gap() {
            0.0
        } else {
            self.yin()
        };

        // The previous spectrum must cover a full frame before flux means anything.
        if !was_full {
            return FrameReading {
                onset: false,
                pitch_hz,
            };
        }

        let onset = !silent
            && flux > self.flux_threshold()
            && flux > self.prev_flux
            && self.hops_since_onset >= self.min_onset_gap;

        self.flux_history.push_back(if silent { 0.0 } else { flux });
        if self.flux_history.len() > self.history_len {
            self.flux_history.pop_front();
        }
        self.prev_flux = flux;
        self.hops_since_onset = if onset {
            0
        } else {
            self.hops_since_onset.saturating_add(1)
        };

        FrameReading { onset, pitch_hz }
    }
}

impl Drop for SpectralAnalyzer {
    fn drop(&mut self) {
        log::debug!("Analyzer released after {} hops", self.hops_seen);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 44100;

    fn sine(freq: f32, seconds: f32) -> Vec<f32> {
        let n = (SR as f32 * seconds) as usize;
        (0..n)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / SR as f32).sin())
            .collect()
    }

    fn run(samples: &[f32], channels: usize) -> Vec<FrameReading> {
        let config = AnalysisConfig::default();
        let mut analyzer = SpectralAnalyzer::new(SR, channels, &config).unwrap();
        samples
            .chunks(config.hop_size)
            .map(|hop| analyzer.process_hop(hop))
            .collect()
    }

    #[test]
    fn tracks_a440() {
        let readings = run(&sine(440.0, 0.5), 1);
        for r in &readings[1..] {
            assert!((r.pitch_hz - 440.0).abs() < 3.0, "pitch = {}", r.pitch_hz);
        }
    }

    #[test]
    fn steady_tone_has_no_onsets() {
        let readings = run(&sine(330.0, 1.0), 1);
        assert!(readings.iter().all(|r| !r.onset));
    }

    #[test]
    fn silence_reports_no_pitch() {
        let readings = run(&vec![0.0; 8192], 1);
        assert!(readings.iter().all(|r| r.pitch_hz == 0.0 && !r.onset));
    }

    #[test]
    fn pitch_change_raises_an_onset() {
        let mut samples = sine(440.0, 0.5);
        samples.extend(sine(587.33, 0.5));
        let readings = run(&samples, 1);
        let onsets: Vec<usize> = readings
            .iter()
            .enumerate()
            .filter(|(_, r)| r.onset)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(onsets.len(), 1, "onsets at {:?}", onsets);
        // 0.5s is hop 43
        assert!((42..=46).contains(&onsets[0]));
    }

    #[test]
    fn note_edges_read_unvoiced() {
        let mut samples = sine(440.0, 0.5);
        samples.extend(vec![0.0; SR as usize / 2]);
        samples.extend(sine(587.33, 0.5));
        let readings = run(&samples, 1);

        for (i, r) in readings.iter().enumerate() {
            let near = |f: f32| (r.pitch_hz - f).abs() < 3.0;
            assert!(
                r.pitch_hz == 0.0 || near(440.0) || near(587.33),
                "hop {} pitch = {}",
                i,
                r.pitch_hz
            );
        }
        // hops 43 and 44 hold the tail of the A, hop 86 the first samples of the D
        for i in (43..=85).chain([86]) {
            assert_eq!(readings[i].pitch_hz, 0.0, "hop {}", i);
        }
        assert!(readings[86].onset);
    }

    #[test]
    fn stereo_hops_are_downmixed() {
        let mono = sine(440.0, 0.25);
        let stereo: Vec<f32> = mono.iter().flat_map(|&s| [s, s]).collect();
        let readings = run(&stereo, 2);
        let last = readings.last().unwrap();
        assert!((last.pitch_hz - 440.0).abs() < 3.0);
    }

    #[test]
    fn rejects_unusable_setup() {
        let config = AnalysisConfig::default();
        assert!(matches!(
            SpectralAnalyzer::new(0, 1, &config),
            Err(Error::AnalyzerInit(_))
        ));
        let tiny = AnalysisConfig {
            frame_size: 64,
            hop_size: 32,
            ..AnalysisConfig::default()
        };
        assert!(SpectralAnalyzer::new(SR, 1, &tiny).is_err());
    }
}
