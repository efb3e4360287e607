//! Small-signal analysis for audio visualization: per-column waveform
//! envelopes and a direct DFT power spectrum.
//!
//! Windows here are short (a few thousand samples at most), so an O(n * bins)
//! DFT is plenty and avoids pulling in an FFT dependency.

/// Mix an interleaved window down to mono.
pub fn mixdown_mono(interleaved: &[f32], channels: u16) -> Vec<f32> {
    let ch = channels.max(1) as usize;
    interleaved
        .chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Min/max sample pairs, one per display column, over a mono window.
/// Columns past the end of the window report a flat (0, 0) envelope.
pub fn waveform_columns(mono: &[f32], columns: usize) -> Vec<(f32, f32)> {
    if columns == 0 {
        return Vec::new();
    }
    let per_column = (mono.len() / columns).max(1);
    (0..columns)
        .map(|c| {
            let start = c * per_column;
            if start >= mono.len() {
                return (0.0, 0.0);
            }
            let chunk = &mono[start..(start + per_column).min(mono.len())];
            let mut lo = f32::INFINITY;
            let mut hi = f32::NEG_INFINITY;
            for &s in chunk {
                lo = lo.min(s);
                hi = hi.max(s);
            }
            (lo, hi)
        })
        .collect()
}

/// Power per frequency bin of a Hann-windowed mono slice, normalized so the
/// loudest bin is 1.0. Bin `k` covers frequency `k * sample_rate / (2 * bins)`
/// up to Nyquist.
pub fn power_spectrum(mono: &[f32], bins: usize) -> Vec<f32> {
    if bins == 0 || mono.is_empty() {
        return vec![0.0; bins];
    }
    let n = mono.len();
    let windowed: Vec<f32> = mono
        .iter()
        .enumerate()
        .map(|(i, &s)| {
            let w = 0.5 - 0.5 * (std::f64::consts::TAU * i as f64 / n as f64).cos();
            s * w as f32
        })
        .collect();

    let mut powers = vec![0.0f32; bins];
    for (k, power) in powers.iter_mut().enumerate() {
        // Bin center as a fraction of Nyquist.
        let freq = (k as f64 + 0.5) / bins as f64 * 0.5;
        let mut re = 0.0f64;
        let mut im = 0.0f64;
        for (i, &s) in windowed.iter().enumerate() {
            let phase = std::f64::consts::TAU * freq * i as f64;
            re += f64::from(s) * phase.cos();
            im -= f64::from(s) * phase.sin();
        }
        *power = ((re * re + im * im) / (n as f64 * n as f64)) as f32;
    }

    let peak = powers.iter().copied().fold(0.0f32, f32::max);
    if peak > 0.0 {
        for p in &mut powers {
            *p /= peak;
        }
    }
    powers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixdown_averages_channels() {
        let stereo = [1.0, -1.0, 0.5, 0.5];
        assert_eq!(mixdown_mono(&stereo, 2), vec![0.0, 0.5]);
    }

    #[test]
    fn waveform_envelope_brackets_the_signal() {
        let mono: Vec<f32> = (0..64)
            .map(|i| (std::f32::consts::TAU * i as f32 / 16.0).sin())
            .collect();
        let cols = waveform_columns(&mono, 4);
        assert_eq!(cols.len(), 4);
        for (lo, hi) in cols {
            assert!(lo <= hi);
            assert!((-1.01..=1.01).contains(&lo));
            assert!((-1.01..=1.01).contains(&hi));
        }
    }

    #[test]
    fn waveform_flat_for_silence() {
        let cols = waveform_columns(&[0.0; 32], 8);
        assert!(cols.iter().all(|&(lo, hi)| lo == 0.0 && hi == 0.0));
    }

    #[test]
    fn spectrum_peaks_in_the_right_bin() {
        // Sine sitting exactly on the center of bin 2 of 8.
        let n = 512;
        let freq = 2.5 / 8.0 * 0.5;
        let mono: Vec<f32> = (0..n)
            .map(|i| (std::f64::consts::TAU * freq * i as f64).sin() as f32)
            .collect();
        let powers = power_spectrum(&mono, 8);
        let peak_bin = powers
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(k, _)| k)
            .unwrap();
        assert_eq!(peak_bin, 2);
        assert!((powers[peak_bin] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn spectrum_of_silence_is_zero() {
        let powers = power_spectrum(&[0.0; 128], 8);
        assert!(powers.iter().all(|&p| p == 0.0));
    }
}
