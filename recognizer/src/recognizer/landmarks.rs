// file: src/recognizer/landmarks.rs

use crate::recognizer::grid::Grid;
use crate::recognizer::spectrogram::Spectrogram;
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

/// A salient time-frequency cell of a spectrogram.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Landmark {
    pub frequency_bin: usize,
    pub time_bin: usize,
    pub intensity: f64,
}

/// Strategy used to pick landmarks out of a spectrogram.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum PeakAlgorithm {
    /// Cells equal to the maximum of their max-filter neighborhood.
    MinList,
    /// Cells strictly above every neighbor once the global threshold is
    /// subtracted from both.
    Gtn,
    /// `MinList` candidates confirmed by the `Gtn` check.
    #[default]
    MinListGtn,
}

impl FromStr for PeakAlgorithm {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "MINLIST" => Ok(PeakAlgorithm::MinList),
            "GTN" => Ok(PeakAlgorithm::Gtn),
            "MINLISTGTN" => Ok(PeakAlgorithm::MinListGtn),
            other => Err(format!("unknown peak algorithm `{}`", other)),
        }
    }
}

impl fmt::Display for PeakAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PeakAlgorithm::MinList => "MINLIST",
            PeakAlgorithm::Gtn => "GTN",
            PeakAlgorithm::MinListGtn => "MINLISTGTN",
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PeakConfig {
    pub algorithm: PeakAlgorithm,
    /// Max-filter radius along the time axis, in frames.
    pub minlist_size_x: usize,
    /// Max-filter radius along the frequency axis, in bins.
    pub minlist_size_y: usize,
    /// Radius of the strict neighborhood check.
    pub gtn_size: usize,
    /// Multiplier applied to the mean intensity to get the global threshold.
    pub gtn_threshold: f64,
}

impl Default for PeakConfig {
    fn default() -> Self {
        Self {
            algorithm: PeakAlgorithm::MinListGtn,
            minlist_size_x: 60,
            minlist_size_y: 60,
            gtn_size: 3,
            gtn_threshold: 0.5,
        }
    }
}

/// Find the landmarks of a spectrogram, ordered by frame then frequency bin.
pub fn get_peaks(spectrogram: &Spectrogram, config: &PeakConfig) -> Vec<Landmark> {
    let mut peaks = Vec::<Landmark>::new();

    if spectrogram.is_empty() {
        return peaks;
    }

    let max_filtered = match config.algorithm {
        PeakAlgorithm::MinList | PeakAlgorithm::MinListGtn => Some(max_filter(
            spectrogram,
            config.minlist_size_x,
            config.minlist_size_y,
        )),
        PeakAlgorithm::Gtn => None,
    };

    let threshold = match config.algorithm {
        PeakAlgorithm::Gtn | PeakAlgorithm::MinListGtn => {
            average_loudness(spectrogram) * config.gtn_threshold
        }
        PeakAlgorithm::MinList => 0.0,
    };

    for time_bin in 0..spectrogram.cols() {
        for frequency_bin in 0..spectrogram.rows() {
            let intensity = spectrogram[(frequency_bin, time_bin)];

            if let Some(max_filtered) = &max_filtered {
                if !passes_minlist(max_filtered[(frequency_bin, time_bin)], intensity) {
                    continue;
                }
            }

            if config.algorithm != PeakAlgorithm::MinList
                && !is_max_in_neighborhood(
                    spectrogram,
                    frequency_bin,
                    time_bin,
                    config.gtn_size,
                    threshold,
                )
            {
                continue;
            }

            peaks.push(Landmark {
                frequency_bin,
                time_bin,
                intensity,
            });
        }
    }

    peaks
}

/// A cell survives the max filter when it is the (non-zero) neighborhood
/// maximum.
fn passes_minlist(max_filtered: f64, value: f64) -> bool {
    (max_filtered - value).abs() <= f64::EPSILON && value > f64::EPSILON
}

/// Strict neighborhood check against a global threshold. Both the candidate
/// and each neighbor are measured as their excess over `threshold`, clamped at
/// zero, so a cell below the threshold can never qualify.
fn is_max_in_neighborhood(
    grid: &Grid<f64>,
    row: usize,
    col: usize,
    radius: usize,
    threshold: f64,
) -> bool {
    let excess = |value: f64| f64::max(0.0, value - threshold);
    let center = excess(grid[(row, col)]);

    let row_hi = usize::min(row + radius, grid.rows() - 1);
    let col_hi = usize::min(col + radius, grid.cols() - 1);

    for r in row.saturating_sub(radius)..=row_hi {
        for c in col.saturating_sub(radius)..=col_hi {
            if r == row && c == col {
                continue;
            }
            if excess(grid[(r, c)]) >= center {
                return false;
            }
        }
    }
    true
}

/// Mean of all cells as a running weighted average, which stays bounded on
/// large grids.
fn average_loudness(grid: &Grid<f64>) -> f64 {
    let mut average = 0.0;
    for (n, value) in grid.as_slice().iter().enumerate() {
        let n = n as f64;
        average = average * (n / (n + 1.0)) + value / (n + 1.0);
    }
    average
}

/// Separable 2-D max filter: time axis first, then frequency axis.
fn max_filter(spectrogram: &Spectrogram, radius_time: usize, radius_frequency: usize) -> Grid<f64> {
    let (rows, cols) = (spectrogram.rows(), spectrogram.cols());
    let mut filtered = Grid::filled(rows, cols, 0.0);

    for row in 0..rows {
        sliding_max(spectrogram.row(row), radius_time, filtered.row_mut(row));
    }

    let mut column = vec![0.0; rows];
    let mut column_max = vec![0.0; rows];
    for col in 0..cols {
        for row in 0..rows {
            column[row] = filtered[(row, col)];
        }
        sliding_max(&column, radius_frequency, &mut column_max);
        for row in 0..rows {
            filtered[(row, col)] = column_max[row];
        }
    }

    filtered
}

/// `output[i] = max(input[i - radius ..= i + radius])`, clipped at the ends.
/// Monotonic wedge, amortized O(1) per element.
fn sliding_max(input: &[f64], radius: usize, output: &mut [f64]) {
    debug_assert_eq!(input.len(), output.len());

    let mut wedge: VecDeque<usize> = VecDeque::with_capacity(2 * radius + 1);
    let mut read = 0;

    for write in 0..input.len() {
        let hi = usize::min(write + radius, input.len() - 1);
        while read <= hi {
            while let Some(&back) = wedge.back() {
                if input[back] <= input[read] {
                    wedge.pop_back();
                } else {
                    break;
                }
            }
            wedge.push_back(read);
            read += 1;
        }

        let lo = write.saturating_sub(radius);
        while let Some(&front) = wedge.front() {
            if front < lo {
                wedge.pop_front();
            } else {
                break;
            }
        }

        if let Some(&front) = wedge.front() {
            output[write] = input[front];
        }
    }
}
