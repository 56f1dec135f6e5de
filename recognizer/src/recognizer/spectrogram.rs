// file: src/recognizer/spectrogram.rs

use crate::recognizer::declarations::{RecognizerError, Result};
use crate::recognizer::grid::Grid;
use rustfft::{num_complex::Complex, FftPlanner};
use std::f64::consts::PI;

pub const DEFAULT_NFFT: usize = 4096;

/// Floor applied to the power before taking the logarithm.
const AMIN: f64 = 1e-10;
/// Dynamic range kept below the loudest cell when normalizing.
const TOP_DB: f64 = 80.0;

/// Intensity matrix indexed `[frequency bin][frame]`.
pub type Spectrogram = Grid<f64>;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum WindowFunction {
    #[default]
    Hann,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum PaddingMode {
    /// Pad with zeros.
    #[default]
    Constant,
}

/// Parameters of the short-time Fourier transform.
#[derive(Clone, Debug, PartialEq)]
pub struct StftParams {
    pub n_fft: usize,
    /// Defaults to a quarter of the window length.
    pub hop_length: Option<usize>,
    /// Defaults to `n_fft`.
    pub window_length: Option<usize>,
    pub window: WindowFunction,
    /// Pad the signal by `n_fft / 2` on both sides so frame `k` is centered
    /// on sample `k * hop_length`.
    pub center: bool,
    pub padding: PaddingMode,
    /// Convert magnitudes to decibels and clip to an 80 dB dynamic range.
    pub normalize: bool,
}

impl Default for StftParams {
    fn default() -> Self {
        Self::new(DEFAULT_NFFT)
    }
}

impl StftParams {
    pub fn new(n_fft: usize) -> Self {
        Self {
            n_fft,
            hop_length: None,
            window_length: None,
            window: WindowFunction::Hann,
            center: true,
            padding: PaddingMode::Constant,
            normalize: false,
        }
    }

    pub fn window_length(&self) -> usize {
        self.window_length.unwrap_or(self.n_fft)
    }

    pub fn hop_length(&self) -> usize {
        self.hop_length.unwrap_or(self.window_length() / 4).max(1)
    }

    /// Number of frequency bins kept per frame.
    pub fn n_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Number of frames produced for a signal of `n_samples` samples.
    pub fn n_frames(&self, n_samples: usize) -> usize {
        let padded = if self.center {
            n_samples + 2 * (self.n_fft / 2)
        } else {
            n_samples
        };
        if padded < self.n_fft {
            return 0;
        }
        1 + (padded - self.n_fft) / self.hop_length()
    }

    fn validate(&self, n_samples: usize) -> Result<()> {
        if n_samples == 0 {
            return Err(RecognizerError::EmptyInput);
        }
        if self.n_fft == 0 {
            return Err(RecognizerError::InvalidParameter("n_fft must be positive".into()));
        }
        if self.n_fft > n_samples {
            return Err(RecognizerError::InvalidParameter(format!(
                "n_fft ({}) is too large for an input of {} samples",
                self.n_fft, n_samples
            )));
        }
        if self.window_length() == 0 || self.window_length() > self.n_fft {
            return Err(RecognizerError::InvalidParameter(format!(
                "window length ({}) must be in 1..={}",
                self.window_length(),
                self.n_fft
            )));
        }
        if self.hop_length == Some(0) {
            return Err(RecognizerError::InvalidParameter("hop length must be positive".into()));
        }
        Ok(())
    }
}

/// Periodic Hann window of `n_points` samples.
pub fn hann(n_points: usize) -> Vec<f64> {
    (0..n_points)
        .map(|idx| {
            let theta = 2.0 * PI * idx as f64 / n_points as f64;

            0.5 - 0.5 * f64::cos(theta)
        })
        .collect()
}

pub fn get_window(window: WindowFunction, n_points: usize) -> Vec<f64> {
    match window {
        WindowFunction::Hann => hann(n_points),
    }
}

/// Pads `data` on both sides so it is `target_size` long, extra sample on the
/// right. Data already at least `target_size` long is returned unchanged.
pub fn pad_center(data: &[f64], target_size: usize, padding_mode: PaddingMode) -> Vec<f64> {
    if target_size <= data.len() {
        return data.to_vec();
    }

    let total_padding = target_size - data.len();
    let left_padding = total_padding / 2;

    pad(data, (left_padding, total_padding - left_padding), padding_mode)
}

pub fn pad(data: &[f64], (left, right): (usize, usize), padding_mode: PaddingMode) -> Vec<f64> {
    match padding_mode {
        PaddingMode::Constant => {
            let mut result = Vec::with_capacity(left + data.len() + right);
            result.resize(left, 0.0);
            result.extend_from_slice(data);
            result.resize(left + data.len() + right, 0.0);
            result
        }
    }
}

/// Copies the frame starting at `start` (a position in the virtually padded
/// signal, relative to the first real sample) into `out`.
///
/// Frames that lie entirely inside the signal are copied in one slice; only
/// the head and tail frames that overlap the padding are assembled sample by
/// sample.
fn fill_frame(samples: &[f64], start: isize, out: &mut [f64], padding_mode: PaddingMode) {
    let len = out.len() as isize;

    if start >= 0 && start + len <= samples.len() as isize {
        let start = start as usize;
        out.copy_from_slice(&samples[start..start + out.len()]);
        return;
    }

    match padding_mode {
        PaddingMode::Constant => {
            for (offset, value) in out.iter_mut().enumerate() {
                let idx = start + offset as isize;
                *value = if idx >= 0 && (idx as usize) < samples.len() {
                    samples[idx as usize]
                } else {
                    0.0
                };
            }
        }
    }
}

/// Given a mono signal, produce its magnitude spectrogram.
pub fn gen_spectrogram(samples: &[f64], params: &StftParams) -> Result<Spectrogram> {
    params.validate(samples.len())?;

    let n_fft = params.n_fft;
    let hop_length = params.hop_length();
    let n_bins = params.n_bins();
    let n_frames = params.n_frames(samples.len());

    let fft_window = pad_center(
        &get_window(params.window, params.window_length()),
        n_fft,
        PaddingMode::Constant,
    );

    let offset: isize = if params.center { (n_fft / 2) as isize } else { 0 };

    let fft = FftPlanner::<f64>::new().plan_fft_forward(n_fft);
    let mut scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
    let mut frame = vec![0.0; n_fft];
    let mut buffer = vec![Complex::new(0.0, 0.0); n_fft];

    let mut spectrogram = Grid::filled(n_bins, n_frames, 0.0);

    for frame_idx in 0..n_frames {
        let start = (frame_idx * hop_length) as isize - offset;
        fill_frame(samples, start, &mut frame, params.padding);

        for ((slot, sample), weight) in buffer.iter_mut().zip(&frame).zip(&fft_window) {
            *slot = Complex::new(sample * weight, 0.0);
        }

        fft.process_with_scratch(&mut buffer, &mut scratch);

        for (bin, value) in buffer[..n_bins].iter().enumerate() {
            spectrogram[(bin, frame_idx)] = value.norm();
        }
    }

    if params.normalize {
        amplitude_to_db(&mut spectrogram);
    }

    Ok(spectrogram)
}

/// Converts magnitudes to decibels in place, flooring every cell at
/// `max - 80 dB` and shifting so the floor sits at 0. Cells end up in
/// `[0, 80]` whatever the signal level, so landmark thresholds see a
/// non-negative surface.
pub fn amplitude_to_db(spectrogram: &mut Spectrogram) {
    let cells = spectrogram.as_mut_slice();

    for cell in cells.iter_mut() {
        *cell = 10.0 * f64::log10(f64::max(*cell * *cell, AMIN));
    }

    let max = cells.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let floor = max - TOP_DB;

    for cell in cells.iter_mut() {
        *cell = f64::max(*cell, floor) - floor;
    }
}

/// Logs the size and sum of a spectrogram; used when diagnostics are on.
pub fn log_info(spectrogram: &Spectrogram, name: &str) {
    let sum: f64 = spectrogram.as_slice().iter().sum();
    log::info!(
        "{} info:\tsize: {} x {}, sum: {}",
        name,
        spectrogram.rows(),
        spectrogram.cols(),
        sum
    );
}
