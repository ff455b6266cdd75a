//! Triangular band-pass filters spaced geometrically around A4 (440 Hz),
//! laid over linear FFT bins. Follows the filtered-spectrogram front end of
//! Böck et al., "Evaluating the online capabilities of onset detection methods"
//! (ISMIR 2012).

use crate::error::{Error, Result};

const REFERENCE_HZ: f64 = 440.0;

/// Finer spacing than this leaves the ladder ratio indistinguishable from 1.
pub const MAX_BANDS_PER_OCTAVE: usize = 1000;

/// Immutable bin → band weight matrix.
#[derive(Debug, Clone)]
pub struct FilterBank {
    /// `weights[bin][band]`
    weights: Vec<Vec<f32>>,
    edges: Vec<(usize, usize, usize)>,
}

impl FilterBank {
    /// Build the bank for `ffts` linear bins covering 0..`fs`/2.
    ///
    /// `bands` is the number of bands per octave. `fmax` above Nyquist is
    /// clamped; any other inconsistency is a configuration error.
    pub fn new(
        ffts: usize,
        fs: f64,
        bands: usize,
        fmin: f64,
        fmax: f64,
        equal: bool,
    ) -> Result<Self> {
        if ffts == 0 || bands == 0 {
            return Err(Error::config("filterbank needs at least one bin and one band"));
        }
        if bands > MAX_BANDS_PER_OCTAVE {
            return Err(Error::config(format!(
                "{} bands per octave exceeds the limit of {}",
                bands, MAX_BANDS_PER_OCTAVE
            )));
        }
        if !(fs.is_finite() && fs > 0.0) {
            return Err(Error::config(format!("sample rate {} is not positive", fs)));
        }
        if !(fmin.is_finite() && fmin > 0.0) {
            return Err(Error::config(format!("fmin {} must be positive", fmin)));
        }

        let nyquist = fs / 2.0;
        let fmax = if fmax > nyquist {
            log::warn!("fmax {:.1} Hz above Nyquist, clamping to {:.1} Hz", fmax, nyquist);
            nyquist
        } else {
            fmax
        };
        if fmin >= fmax {
            return Err(Error::config(format!(
                "fmin {} Hz is not below fmax {} Hz",
                fmin, fmax
            )));
        }

        let hz_per_bin = nyquist / ffts as f64;
        let mut bins: Vec<usize> = frequencies(bands, fmin, fmax)
            .into_iter()
            .map(|f| (f / hz_per_bin).round() as usize)
            .filter(|&bin| bin < ffts)
            .collect();
        bins.sort_unstable();
        bins.dedup();

        if bins.len() < 3 {
            return Err(Error::config(format!(
                "only {} distinct bins between {} and {} Hz, need at least 3",
                bins.len(),
                fmin,
                fmax
            )));
        }

        let num_bands = bins.len() - 2;
        let mut weights = vec![vec![0.0f32; num_bands]; ffts];
        let mut edges = Vec::with_capacity(num_bands);
        for (band, w) in bins.windows(3).enumerate() {
            let (start, mid, stop) = (w[0], w[1], w[2]);
            for (offset, value) in triangle(start, mid, stop, equal).into_iter().enumerate() {
                weights[start + offset][band] = value;
            }
            edges.push((start, mid, stop));
        }

        Ok(Self { weights, edges })
    }

    pub fn num_bins(&self) -> usize {
        self.weights.len()
    }

    pub fn num_bands(&self) -> usize {
        self.edges.len()
    }

    pub fn weight(&self, bin: usize, band: usize) -> f32 {
        self.weights
            .get(bin)
            .and_then(|row| row.get(band))
            .copied()
            .unwrap_or(0.0)
    }

    /// Per-bin rows of band weights.
    pub fn rows(&self) -> &[Vec<f32>] {
        &self.weights
    }

    /// `(start, mid, stop)` bins of every band; `stop` is exclusive.
    pub fn band_edges(&self) -> &[(usize, usize, usize)] {
        &self.edges
    }

    /// Dump every non-zero (bin, band, weight) triple at debug level.
    pub fn log_nonzero(&self) {
        if !log::log_enabled!(log::Level::Debug) {
            return;
        }
        for (bin, row) in self.weights.iter().enumerate() {
            for (band, &w) in row.iter().enumerate() {
                if w > 0.0 {
                    log::debug!("bin {}, band {}: {:.6}", bin, band, w);
                }
            }
        }
    }
}

/// Center frequencies one `1/bands` octave apart, anchored at 440 Hz.
///
/// Each walk stops after the first value past its bound, so the ladder
/// brackets `[fmin, fmax]`. Returned in ascending order.
pub fn frequencies(bands: usize, fmin: f64, fmax: f64) -> Vec<f64> {
    let ratio = 2f64.powf(1.0 / bands as f64);
    let mut freqs = vec![REFERENCE_HZ];

    let mut freq = REFERENCE_HZ;
    while freq <= fmax {
        freq *= ratio;
        freqs.push(freq);
    }

    freq = REFERENCE_HZ;
    while freq >= fmin {
        freq /= ratio;
        freqs.push(freq);
    }

    freqs.sort_by(f64::total_cmp);
    freqs
}

/// Triangle over bins `start..stop` peaking at `mid`.
///
/// Peak height is 1, or `2 / (stop - start)` when `equal` so every band has
/// the same area.
pub fn triangle(start: usize, mid: usize, stop: usize, equal: bool) -> Vec<f32> {
    let len = stop.saturating_sub(start);
    let mut tri = vec![0.0f32; len];
    if len == 0 {
        return tri;
    }
    let height = if equal { 2.0 / len as f32 } else { 1.0 };
    let rise = mid.saturating_sub(start).min(len);
    let fall = stop.saturating_sub(mid);

    for (i, v) in tri.iter_mut().enumerate().take(rise) {
        *v = i as f32 * height / rise as f32;
    }
    for (i, v) in tri.iter_mut().enumerate().skip(rise) {
        *v = height - (i - rise) as f32 * height / fall as f32;
    }
    tri
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_bank(equal: bool) -> FilterBank {
        FilterBank::new(1024, 44100.0, 12, 27.5, 16000.0, equal).unwrap()
    }

    #[test]
    fn ladder_is_sorted_and_brackets_range() {
        let f = frequencies(12, 100.0, 1000.0);
        assert!(f.windows(2).all(|w| w[0] < w[1]));
        assert!(f[0] < 100.0);
        assert!(*f.last().unwrap() > 1000.0);
        assert_eq!(f.iter().filter(|&&x| x == 440.0).count(), 1);
        let ratio = f[1] / f[0];
        assert!((ratio - 2f64.powf(1.0 / 12.0)).abs() < 1e-9);
    }

    #[test]
    fn triangles_rise_then_fall() {
        for equal in [false, true] {
            let bank = default_bank(equal);
            assert!(bank.num_bands() > 0);
            for (band, &(start, mid, stop)) in bank.band_edges().iter().enumerate() {
                let height = if equal { 2.0 / (stop - start) as f32 } else { 1.0 };
                assert!((bank.weight(mid, band) - height).abs() < 1e-6);
                for bin in start..mid {
                    assert!(bank.weight(bin, band) < bank.weight(bin + 1, band));
                }
                for bin in mid..stop - 1 {
                    assert!(bank.weight(bin, band) > bank.weight(bin + 1, band));
                }
                for bin in (0..start).chain(stop..bank.num_bins()) {
                    assert_eq!(bank.weight(bin, band), 0.0);
                }
            }
        }
    }

    #[test]
    fn adjacent_bands_share_edges() {
        let bank = default_bank(false);
        for pair in bank.band_edges().windows(2) {
            assert_eq!(pair[0].1, pair[1].0);
            assert_eq!(pair[0].2, pair[1].1);
        }
    }

    #[test]
    fn fmax_is_clamped_to_nyquist() {
        let bank = FilterBank::new(512, 8000.0, 12, 100.0, 20000.0, false).unwrap();
        assert_eq!(bank.num_bins(), 512);
        assert!(bank.band_edges().iter().all(|&(_, _, stop)| stop < 512));
    }

    #[test]
    fn rejects_inverted_range() {
        let err = FilterBank::new(1024, 44100.0, 12, 2000.0, 1000.0, false);
        assert!(matches!(err, Err(Error::Configuration { .. })));
    }

    #[test]
    fn rejects_too_few_bins() {
        // 16 bins of ~1.4 kHz: the 220/440/880 Hz ladder lands on bins 0 and 1
        let err = FilterBank::new(16, 44100.0, 1, 430.0, 450.0, false);
        assert!(matches!(err, Err(Error::Configuration { .. })));
    }

    #[test]
    fn rejects_absurd_band_counts() {
        let err = FilterBank::new(1024, 44100.0, 1 << 60, 27.5, 16000.0, false);
        assert!(matches!(err, Err(Error::Configuration { .. })));
        let err = FilterBank::new(1024, 44100.0, MAX_BANDS_PER_OCTAVE + 1, 27.5, 16000.0, false);
        assert!(matches!(err, Err(Error::Configuration { .. })));
        let err = FilterBank::new(1024, 44100.0, 0, 27.5, 16000.0, false);
        assert!(matches!(err, Err(Error::Configuration { .. })));
    }

    #[test]
    fn triangle_shape() {
        let tri = triangle(2, 4, 8, false);
        assert_eq!(tri, vec![0.0, 0.5, 1.0, 0.75, 0.5, 0.25]);
        let eq = triangle(2, 4, 8, true);
        assert!((eq[2] - 2.0 / 6.0).abs() < 1e-6);
    }
}
