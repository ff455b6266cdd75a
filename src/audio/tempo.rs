use rustfft::{num_complex::Complex, FftPlanner};

use super::window::{downmix, hamming};
use crate::config::TempoConfig;

const FFT_SIZE: usize = 2048;
const HOP_SIZE: usize = 512;
/// Hops on each side averaged into a beat's local threshold.
const BEAT_CONTEXT_HOPS: usize = 20;
const BEAT_MULTIPLIER: f32 = 1.5;
const BEAT_FLOOR: f32 = 0.01;

/// Whole-buffer tempo estimate in beats per minute.
pub trait TempoEstimator {
    fn estimate(&mut self, samples: &[f32], sample_rate: u32, channels: usize) -> u32;
}

/// Spectral-flux beat picking followed by the median inter-beat interval.
pub struct FluxTempoEstimator {
    fallback_bpm: u32,
    min_bpm: u32,
    max_bpm: u32,
}

impl FluxTempoEstimator {
    pub fn new(config: &TempoConfig) -> Self {
        Self {
            fallback_bpm: config.fallback_bpm.max(1),
            min_bpm: config.min_bpm.max(1),
            max_bpm: config.max_bpm.max(config.min_bpm.max(1)),
        }
    }

    /// Shortest and longest beat period the configured bounds allow, in seconds.
    fn period_range(&self) -> (f32, f32) {
        (60.0 / self.max_bpm as f32, 60.0 / self.min_bpm as f32)
    }

    /// Local flux maxima that clear an adaptive threshold.
    ///
    /// Two beats closer than half the shortest allowed period are one beat.
    fn pick_beats(&self, envelope: &[(f32, f32)]) -> Vec<f32> {
        let min_gap = self.period_range().0 / 2.0;
        let mut beats: Vec<f32> = Vec::new();

        for (i, &(time, flux)) in envelope.iter().enumerate() {
            let lo = i.saturating_sub(BEAT_CONTEXT_HOPS);
            let hi = (i + BEAT_CONTEXT_HOPS + 1).min(envelope.len());
            let neighbourhood = &envelope[lo..hi];
            let local_mean =
                neighbourhood.iter().map(|&(_, f)| f).sum::<f32>() / neighbourhood.len() as f32;
            if flux <= local_mean * BEAT_MULTIPLIER + BEAT_FLOOR {
                continue;
            }

            let rising = i == 0 || flux >= envelope[i - 1].1;
            let falling = i + 1 == envelope.len() || flux >= envelope[i + 1].1;
            let spaced = beats.last().map_or(true, |&last| time - last > min_gap);
            if rising && falling && spaced {
                beats.push(time);
            }
        }

        beats
    }

    /// Median of the inter-beat intervals that fall inside the tempo bounds.
    fn median_interval(&self, beats: &[f32]) -> Option<f32> {
        let (shortest, longest) = self.period_range();
        let mut intervals: Vec<f32> = beats
            .windows(2)
            .map(|w| w[1] - w[0])
            .filter(|&i| (shortest..=longest).contains(&i))
            .collect();
        if intervals.is_empty() {
            return None;
        }
        intervals.sort_by(f32::total_cmp);
        Some(intervals[intervals.len() / 2])
    }
}

impl Default for FluxTempoEstimator {
    fn default() -> Self {
        Self::new(&TempoConfig::default())
    }
}

impl TempoEstimator for FluxTempoEstimator {
    fn estimate(&mut self, samples: &[f32], sample_rate: u32, channels: usize) -> u32 {
        if sample_rate == 0 {
            return self.fallback_bpm;
        }
        let mono = downmix(samples, channels);
        let envelope = flux_envelope(&mono, sample_rate);
        let beats = self.pick_beats(&envelope);

        let Some(interval) = self.median_interval(&beats) else {
            log::warn!(
                "Tempo: only {} usable beats, falling back to {} BPM",
                beats.len(),
                self.fallback_bpm
            );
            return self.fallback_bpm;
        };

        let bpm = ((60.0 / interval).round() as u32).clamp(self.min_bpm, self.max_bpm);
        log::info!(
            "Tempo: {} beats, median interval {:.3}s, {} BPM",
            beats.len(),
            interval,
            bpm
        );
        bpm
    }
}

/// (time, flux) per hop over the mono signal.
fn flux_envelope(samples: &[f32], sample_rate: u32) -> Vec<(f32, f32)> {
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(FFT_SIZE);
    let window = hamming(FFT_SIZE);

    let mut prev = vec![0.0f32; FFT_SIZE / 2];
    let mut buffer = vec![Complex::new(0.0f32, 0.0); FFT_SIZE];
    samples
        .windows(FFT_SIZE)
        .step_by(HOP_SIZE)
        .enumerate()
        .map(|(hop, frame)| {
            for ((slot, &s), &w) in buffer.iter_mut().zip(frame).zip(&window) {
                *slot = Complex::new(s * w, 0.0);
            }
            fft.process(&mut buffer);

            let mut flux = 0.0f32;
            for (c, last) in buffer[..FFT_SIZE / 2].iter().zip(prev.iter_mut()) {
                let mag = c.norm();
                flux += (mag - *last).max(0.0);
                *last = mag;
            }
            ((hop * HOP_SIZE) as f32 / sample_rate as f32, flux)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Short decaying 1 kHz bursts every `period` seconds.
    fn click_track(sample_rate: u32, period: f32, seconds: f32) -> Vec<f32> {
        let total = (sample_rate as f32 * seconds) as usize;
        let step = (sample_rate as f32 * period) as usize;
        let burst = sample_rate as usize / 50;
        let mut samples = vec![0.0f32; total];
        let mut start = step / 2;
        while start + burst < total {
            for i in 0..burst {
                let t = i as f32 / sample_rate as f32;
                let env = (-(i as f32) / (burst as f32 / 5.0)).exp();
                samples[start + i] = 0.8 * env * (2.0 * std::f32::consts::PI * 1000.0 * t).sin();
            }
            start += step;
        }
        samples
    }

    #[test]
    fn finds_steady_click_tempo() {
        let sr = 22050;
        let samples = click_track(sr, 0.5, 8.0);
        let bpm = FluxTempoEstimator::default().estimate(&samples, sr, 1);
        assert!((115..=125).contains(&bpm), "bpm = {}", bpm);
    }

    #[test]
    fn silence_falls_back() {
        let samples = vec![0.0f32; 44100];
        let bpm = FluxTempoEstimator::default().estimate(&samples, 44100, 1);
        assert_eq!(bpm, 120);
    }

    #[test]
    fn median_ignores_outliers() {
        let estimator = FluxTempoEstimator::default();
        let beats = [0.0, 0.5, 1.0, 1.05, 1.5, 2.0, 4.5];
        assert_eq!(estimator.median_interval(&beats), Some(0.5));
        assert_eq!(estimator.median_interval(&[1.0]), None);
    }

    #[test]
    fn tempo_bounds_shape_the_interval_window() {
        let narrow = FluxTempoEstimator::new(&TempoConfig {
            min_bpm: 100,
            max_bpm: 140,
            ..TempoConfig::default()
        });
        // 1.0s (60 BPM) falls outside 100..140 BPM
        assert_eq!(narrow.median_interval(&[0.0, 1.0, 2.0]), None);
        assert_eq!(narrow.median_interval(&[0.0, 0.5, 1.0]), Some(0.5));
    }

    #[test]
    fn close_peaks_count_once() {
        let estimator = FluxTempoEstimator::default();
        let mut envelope: Vec<(f32, f32)> = (0..200).map(|i| (i as f32 * 0.01, 0.0)).collect();
        // 30ms apart: under half of the 0.25s shortest period
        envelope[50].1 = 1.0;
        envelope[53].1 = 1.0;
        envelope[150].1 = 1.0;
        let beats = estimator.pick_beats(&envelope);
        assert_eq!(beats.len(), 2, "beats = {:?}", beats);
        assert!((beats[0] - 0.5).abs() < 1e-6);
        assert!((beats[1] - 1.5).abs() < 1e-6);
    }
}
