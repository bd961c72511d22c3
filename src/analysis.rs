//! Offline audio analysis helpers
//!
//! Small verification utilities used by tests and tooling: peak and RMS
//! measurement, dominant-frequency estimation via FFT, zero-crossing
//! cycle counting, and WAV export of rendered buffers.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use std::f32::consts::PI;
use std::path::Path;

pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().map(|x| x.abs()).fold(0.0, f32::max)
}

pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|x| x * x).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Peak-to-peak amplitude.
pub fn peak_to_peak(samples: &[f32]) -> f32 {
    let max = samples.iter().cloned().fold(f32::MIN, f32::max);
    let min = samples.iter().cloned().fold(f32::MAX, f32::min);
    max - min
}

pub fn has_non_finite(samples: &[f32]) -> bool {
    samples.iter().any(|x| !x.is_finite())
}

/// Estimate the dominant frequency with a Hann-windowed FFT and
/// parabolic peak interpolation.
///
/// Returns `None` for silence or too-short input.
pub fn dominant_frequency(samples: &[f32], sample_rate: u32) -> Option<f64> {
    let fft_len = samples.len().next_power_of_two() / 2;
    if fft_len < 64 {
        return None;
    }

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(fft_len);

    let mut buffer: Vec<Complex<f32>> = samples[..fft_len]
        .iter()
        .enumerate()
        .map(|(i, &x)| {
            let window = 0.5 * (1.0 - (2.0 * PI * i as f32 / fft_len as f32).cos());
            Complex::new(x * window, 0.0)
        })
        .collect();
    fft.process(&mut buffer);

    let half = fft_len / 2;
    let magnitudes: Vec<f32> = buffer[..half].iter().map(|c| c.norm()).collect();
    let (peak_bin, &peak_mag) = magnitudes
        .iter()
        .enumerate()
        .skip(1)
        .max_by(|a, b| a.1.total_cmp(b.1))?;
    if peak_mag <= 1e-6 {
        return None;
    }

    // Parabolic interpolation around the peak bin.
    let refined = if peak_bin > 0 && peak_bin + 1 < half {
        let alpha = magnitudes[peak_bin - 1].max(1e-12).ln();
        let beta = magnitudes[peak_bin].max(1e-12).ln();
        let gamma = magnitudes[peak_bin + 1].max(1e-12).ln();
        let denom = alpha - 2.0 * beta + gamma;
        if denom.abs() > 1e-12 {
            peak_bin as f32 + 0.5 * (alpha - gamma) / denom
        } else {
            peak_bin as f32
        }
    } else {
        peak_bin as f32
    };

    Some(f64::from(refined) * f64::from(sample_rate) / fft_len as f64)
}

/// Count full cycles by rising zero crossings.
pub fn count_cycles(samples: &[f32]) -> usize {
    let mut crossings = 0;
    for pair in samples.windows(2) {
        if pair[0] <= 0.0 && pair[1] > 0.0 {
            crossings += 1;
        }
    }
    crossings
}

/// Write a stereo buffer pair as a 32-bit float WAV file.
pub fn write_wav(
    path: &Path,
    left: &[f32],
    right: &[f32],
    sample_rate: u32,
) -> Result<(), String> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(|e| e.to_string())?;
    for (l, r) in left.iter().zip(right) {
        writer.write_sample(*l).map_err(|e| e.to_string())?;
        writer.write_sample(*r).map_err(|e| e.to_string())?;
    }
    writer.finalize().map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, rate: u32, frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|i| (std::f64::consts::TAU * freq * i as f64 / f64::from(rate)).sin() as f32)
            .collect()
    }

    #[test]
    fn test_dominant_frequency_of_sine() {
        let samples = sine(440.0, 48000, 16384);
        let freq = dominant_frequency(&samples, 48000).unwrap();
        assert!((freq - 440.0).abs() < 3.0, "estimated {freq}");
    }

    #[test]
    fn test_silence_has_no_peak() {
        let silence = vec![0.0f32; 8192];
        assert!(dominant_frequency(&silence, 48000).is_none());
    }

    #[test]
    fn test_cycle_count() {
        let samples = sine(100.0, 1000, 1000);
        // 100 Hz for one second.
        let cycles = count_cycles(&samples);
        assert!((99..=101).contains(&cycles), "counted {cycles}");
    }

    #[test]
    fn test_peak_to_peak() {
        let samples = sine(10.0, 1000, 1000);
        let p2p = peak_to_peak(&samples);
        assert!(p2p > 1.9 && p2p <= 2.01);
    }

    #[test]
    fn test_wav_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let left = sine(440.0, 48000, 4800);
        let right = left.clone();
        write_wav(&path, &left, &right, 48000).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 48000);
        let frames: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(frames.len(), 9600);
        assert_eq!(frames[0], left[0]);
    }
}
