//! Reference log-mel front end.
//!
//! A self-contained [`FeatureExtractor`] so the pipeline can run without the
//! vendored preprocessing model. Per window:
//!
//! 1. Scale samples to `[-1, 1)` and apply a periodic Hann window
//! 2. Zero-pad to the next power of two and take the power spectrum (direct DFT)
//! 3. Sum power into `feature_size` triangular mel bands between
//!    [`LOWER_BAND_HZ`] and [`UPPER_BAND_HZ`]
//! 4. Natural log, then map `[LOG_FLOOR, LOG_CEIL]` linearly onto `i8`
//!
//! Values are comparable between slices but not bit-compatible with the
//! vendored engine.

use core::f32::consts::PI;

use thiserror::Error;

use super::extractor::FeatureExtractor;
use crate::settings::ModelSettings;

/// Lower edge of the first mel band.
pub const LOWER_BAND_HZ: f32 = 125.0;
/// Upper edge of the last mel band.
pub const UPPER_BAND_HZ: f32 = 7500.0;

const LOG_FLOOR: f32 = -16.0;
const LOG_CEIL: f32 = 12.0;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrontendError {
    #[error("front end used before initialize()")]
    NotInitialized,
    #[error("window has {got} samples, expected {expected}")]
    WindowLength { got: usize, expected: usize },
    #[error("output has {got} values, expected {expected}")]
    OutputLength { got: usize, expected: usize },
}

#[inline]
fn hz_to_mel(hz: f32) -> f32 {
    1127.0 * libm::logf(1.0 + hz / 700.0)
}

#[inline]
fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (libm::expf(mel / 1127.0) - 1.0)
}

struct Tables {
    hann: Vec<f32>,
    /// `[n_freq * window_len]`, only the non-padded part of each basis row.
    dft_cos: Vec<f32>,
    dft_sin: Vec<f32>,
    /// `[feature_size * n_freq]`
    filters: Vec<f32>,
    band_centers: Vec<f32>,
}

/// Log-mel filterbank feature extractor.
pub struct MelFrontend {
    settings: ModelSettings,
    fft_len: usize,
    tables: Option<Tables>,
    frame: Vec<f32>,
    power: Vec<f32>,
}

impl MelFrontend {
    pub fn new(settings: ModelSettings) -> Self {
        let fft_len = settings.window_samples().next_power_of_two();
        MelFrontend {
            settings,
            fft_len,
            tables: None,
            frame: Vec::new(),
            power: Vec::new(),
        }
    }

    #[inline]
    fn n_freq(&self) -> usize {
        self.fft_len / 2 + 1
    }

    /// Center frequency of every band, once initialized.
    pub fn band_centers(&self) -> Option<&[f32]> {
        self.tables.as_ref().map(|t| t.band_centers.as_slice())
    }

    fn build_tables(&self) -> Tables {
        let n = self.settings.window_samples();
        let n_freq = self.n_freq();
        let bands = self.settings.feature_size;
        let rate = self.settings.sample_rate as f32;

        let hann = (0..n)
            .map(|i| 0.5 * (1.0 - libm::cosf(2.0 * PI * i as f32 / n as f32)))
            .collect();

        let mut dft_cos = vec![0.0f32; n_freq * n];
        let mut dft_sin = vec![0.0f32; n_freq * n];
        for k in 0..n_freq {
            for t in 0..n {
                // Reduce k*t mod fft_len first to keep the angle small.
                let phase = (k * t) % self.fft_len;
                let angle = 2.0 * PI * phase as f32 / self.fft_len as f32;
                dft_cos[k * n + t] = libm::cosf(angle);
                dft_sin[k * n + t] = libm::sinf(angle);
            }
        }

        let upper = UPPER_BAND_HZ.min(rate / 2.0);
        let mel_lo = hz_to_mel(LOWER_BAND_HZ);
        let mel_hi = hz_to_mel(upper);
        let edges: Vec<f32> = (0..bands + 2)
            .map(|i| mel_to_hz(mel_lo + (mel_hi - mel_lo) * i as f32 / (bands + 1) as f32))
            .collect();

        let mut filters = vec![0.0f32; bands * n_freq];
        for m in 0..bands {
            let (lo, mid, hi) = (edges[m], edges[m + 1], edges[m + 2]);
            for k in 0..n_freq {
                let f = k as f32 * rate / self.fft_len as f32;
                let w = if f > lo && f <= mid {
                    (f - lo) / (mid - lo)
                } else if f > mid && f < hi {
                    (hi - f) / (hi - mid)
                } else {
                    0.0
                };
                filters[m * n_freq + k] = w;
            }
        }

        Tables {
            hann,
            dft_cos,
            dft_sin,
            filters,
            band_centers: edges[1..=bands].to_vec(),
        }
    }
}

impl FeatureExtractor for MelFrontend {
    type Error = FrontendError;

    fn initialize(&mut self) -> Result<(), Self::Error> {
        if self.tables.is_none() {
            self.tables = Some(self.build_tables());
            self.frame = vec![0.0; self.settings.window_samples()];
            self.power = vec![0.0; self.n_freq()];
        }
        Ok(())
    }

    fn extract_slice(&mut self, window: &[i16], out: &mut [i8]) -> Result<(), Self::Error> {
        let n = self.settings.window_samples();
        let n_freq = self.n_freq();
        let tables = self.tables.as_ref().ok_or(FrontendError::NotInitialized)?;

        if window.len() != n {
            return Err(FrontendError::WindowLength {
                got: window.len(),
                expected: n,
            });
        }
        if out.len() != self.settings.feature_size {
            return Err(FrontendError::OutputLength {
                got: out.len(),
                expected: self.settings.feature_size,
            });
        }

        for ((dst, &s), &w) in self.frame.iter_mut().zip(window).zip(&tables.hann) {
            *dst = s as f32 / 32768.0 * w;
        }

        for (k, p) in self.power.iter_mut().enumerate() {
            let cos_row = &tables.dft_cos[k * n..(k + 1) * n];
            let sin_row = &tables.dft_sin[k * n..(k + 1) * n];
            let mut re = 0.0f32;
            let mut im = 0.0f32;
            for ((&x, &c), &s) in self.frame.iter().zip(cos_row).zip(sin_row) {
                re += x * c;
                im -= x * s;
            }
            *p = re * re + im * im;
        }

        let floor = libm::expf(LOG_FLOOR);
        let scale = 255.0 / (LOG_CEIL - LOG_FLOOR);
        for (m, value) in out.iter_mut().enumerate() {
            let row = &tables.filters[m * n_freq..(m + 1) * n_freq];
            let energy: f32 = row.iter().zip(&self.power).map(|(w, p)| w * p).sum();
            let log = libm::logf(energy.max(floor)).min(LOG_CEIL);
            let q = libm::roundf((log - LOG_FLOOR) * scale) - 128.0;
            *value = q.clamp(-128.0, 127.0) as i8;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const S: ModelSettings = ModelSettings::MICRO_SPEECH;

    fn ready() -> MelFrontend {
        let mut f = MelFrontend::new(S);
        f.initialize().unwrap();
        f
    }

    fn tone(hz: f32, amplitude: f32) -> Vec<i16> {
        (0..S.window_samples())
            .map(|i| {
                let t = i as f32 / S.sample_rate as f32;
                (amplitude * 32767.0 * libm::sinf(2.0 * PI * hz * t)) as i16
            })
            .collect()
    }

    #[test]
    fn requires_initialize() {
        let mut f = MelFrontend::new(S);
        let mut out = [0i8; 40];
        assert_eq!(
            f.extract_slice(&[0; 480], &mut out),
            Err(FrontendError::NotInitialized)
        );
    }

    #[test]
    fn rejects_wrong_lengths() {
        let mut f = ready();
        let mut out = [0i8; 40];
        assert_eq!(
            f.extract_slice(&[0; 320], &mut out),
            Err(FrontendError::WindowLength {
                got: 320,
                expected: 480
            })
        );
        let mut short = [0i8; 10];
        assert!(matches!(
            f.extract_slice(&[0; 480], &mut short),
            Err(FrontendError::OutputLength { got: 10, .. })
        ));
    }

    #[test]
    fn silence_sits_at_the_floor() {
        let mut f = ready();
        let mut out = [0i8; 40];
        f.extract_slice(&[0; 480], &mut out).unwrap();
        assert!(out.iter().all(|&v| v == -128));
    }

    #[test]
    fn tone_peaks_in_its_band() {
        let mut f = ready();
        let mut out = [0i8; 40];
        f.extract_slice(&tone(1000.0, 0.5), &mut out).unwrap();

        let (peak, _) = out
            .iter()
            .enumerate()
            .max_by_key(|&(_, v)| *v)
            .unwrap();
        let center = f.band_centers().unwrap()[peak];
        assert!(
            (center - 1000.0).abs() < 150.0,
            "peak band {peak} centered at {center} Hz"
        );
    }

    #[test]
    fn louder_input_gives_larger_features() {
        let mut f = ready();
        let mut quiet = [0i8; 40];
        let mut loud = [0i8; 40];
        f.extract_slice(&tone(2000.0, 0.01), &mut quiet).unwrap();
        f.extract_slice(&tone(2000.0, 0.8), &mut loud).unwrap();

        let sum = |v: &[i8]| v.iter().map(|&x| x as i32).sum::<i32>();
        assert!(sum(&loud) > sum(&quiet));
    }

    #[test]
    fn extraction_is_deterministic() {
        let mut f = ready();
        let input = tone(440.0, 0.3);
        let mut a = [0i8; 40];
        let mut b = [0i8; 40];
        f.extract_slice(&input, &mut a).unwrap();
        f.extract_slice(&input, &mut b).unwrap();
        assert_eq!(a, b);
    }
}
