use rayon::prelude::*;

use super::filterbank::FilterBank;
use crate::error::{Error, Result};

/// Project each spectrogram frame through `bank` and log-compress:
/// `log10(lambda * filtered + 1)`.
///
/// `spectrogram` is frames × bins and every row must have `bank.num_bins()`
/// entries. `lambda` must lie in (0, 20].
pub fn compress(spectrogram: &[Vec<f32>], bank: &FilterBank, lambda: f32) -> Result<Vec<Vec<f32>>> {
    if !(lambda > 0.0 && lambda <= 20.0) {
        return Err(Error::config(format!("lambda {} outside (0, 20]", lambda)));
    }
    let bins = bank.num_bins();
    if let Some((t, row)) = spectrogram.iter().enumerate().find(|(_, r)| r.len() != bins) {
        return Err(Error::DimensionMismatch {
            expected: format!("{} bins per frame", bins),
            got: format!("{} bins in frame {}", row.len(), t),
        });
    }

    let bands = bank.num_bands();
    let rows = bank.rows();
    let out: Vec<Vec<f32>> = spectrogram
        .par_iter()
        .map(|frame| {
            let mut filtered = vec![0.0f32; bands];
            for (&mag, weights) in frame.iter().zip(rows) {
                if mag == 0.0 {
                    continue;
                }
                for (acc, &w) in filtered.iter_mut().zip(weights) {
                    *acc += mag * w;
                }
            }
            filtered
                .into_iter()
                .map(|v| (lambda * v + 1.0).log10())
                .collect::<Vec<f32>>()
        })
        .collect();

    Ok(out)
}
