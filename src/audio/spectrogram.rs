use rustfft::{num_complex::Complex, FftPlanner};

use super::window::hamming;

/// Magnitude STFT of a mono signal: one row per hop, `frame_size / 2` bins per row.
///
/// Frames start at multiples of `hop_size`; the tail frame is zero-padded.
pub fn magnitude_spectrogram(samples: &[f32], frame_size: usize, hop_size: usize) -> Vec<Vec<f32>> {
    if samples.is_empty() || frame_size == 0 || hop_size == 0 {
        return Vec::new();
    }

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(frame_size);
    let window = hamming(frame_size);
    let half = frame_size / 2;

    let mut frames: Vec<Vec<f32>> = Vec::with_capacity(samples.len() / hop_size + 1);
    let mut buffer = vec![Complex::new(0.0f32, 0.0); frame_size];
    let mut pos = 0;
    while pos < samples.len() {
        let end = (pos + frame_size).min(samples.len());
        for (i, slot) in buffer.iter_mut().enumerate() {
            let s = if pos + i < end { samples[pos + i] } else { 0.0 };
            *slot = Complex::new(s * window[i], 0.0);
        }
        fft.process(&mut buffer);
        frames.push(buffer[..half].iter().map(|c| c.norm()).collect());
        pos += hop_size;
    }

    frames
}
