/*
file: src/recognizer/fingerprint.rs
*/
use std::path::Path;
use std::time::Instant;

use log::{debug, warn};

use crate::recognizer::config::RecognizerConfig;
use crate::recognizer::declarations::{RecognizerError, Result};
use crate::recognizer::grid::Grid;
use crate::recognizer::landmarks::{get_peaks, Landmark};
use crate::recognizer::spectrogram::{gen_spectrogram, log_info, Spectrogram};
use crate::recognizer::wav;

const FIELD_BITS: u32 = 10;
const FIELD_MASK: u32 = (1 << FIELD_BITS) - 1;

/// A hashed landmark pair, anchored at the pivot's frame.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Fingerprint {
    pub hash: u32,
    pub anchor_time: usize,
}

/// Target zone paired with every pivot, in spectrogram cells.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HashBox {
    /// Extent along the time axis.
    pub width: usize,
    /// Extent along the frequency axis, centred on the pivot.
    pub height: usize,
    /// Frames between the pivot and the start of the box.
    pub displacement: usize,
}

impl Default for HashBox {
    fn default() -> Self {
        Self {
            width: 150,
            height: 200,
            displacement: 5,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum PivotSelection {
    /// Every landmark is a pivot.
    #[default]
    Naive,
}

/// Everything computed for one clip on the way to its fingerprints.
#[derive(Clone, Debug, PartialEq)]
pub struct Analysis {
    pub spectrogram: Spectrogram,
    pub landmarks: Vec<Landmark>,
    pub fingerprints: Vec<Fingerprint>,
}

impl Analysis {
    fn empty() -> Self {
        Self {
            spectrogram: Grid::filled(0, 0, 0.0),
            landmarks: Vec::new(),
            fingerprints: Vec::new(),
        }
    }
}

/// Read a `.wav` file and run the whole pipeline over it.
pub fn analyze_audio(
    file_path: &Path,
    config: &RecognizerConfig,
    sample_rate: Option<u32>,
) -> Result<Analysis> {
    let start = Instant::now();
    let buffer = wav::read_samples(file_path, sample_rate)?;
    debug!("Read samples in {:?}", start.elapsed());

    let name = file_path.display().to_string();
    analyze_samples(&buffer.samples, config, &name)
}

/// Generate the fingerprints of an audio file.
pub fn fingerprint_audio(
    file_path: &Path,
    config: &RecognizerConfig,
    sample_rate: Option<u32>,
) -> Result<Vec<Fingerprint>> {
    Ok(analyze_audio(file_path, config, sample_rate)?.fingerprints)
}

pub fn fingerprint_samples(samples: &[f64], config: &RecognizerConfig) -> Result<Vec<Fingerprint>> {
    Ok(analyze_samples(samples, config, "samples")?.fingerprints)
}

/// Spectrogram, landmarks and fingerprints of a mono signal. Silence in,
/// nothing out: an empty signal gives an empty analysis rather than an error.
pub fn analyze_samples(samples: &[f64], config: &RecognizerConfig, name: &str) -> Result<Analysis> {
    let start = Instant::now();
    let spectrogram = match gen_spectrogram(samples, &config.stft_params()) {
        Ok(spectrogram) => spectrogram,
        Err(RecognizerError::EmptyInput) => {
            warn!("`{}` has no samples, no fingerprints generated", name);
            return Ok(Analysis::empty());
        }
        Err(err) => return Err(err),
    };
    debug!("Generated spectrogram in {:?}", start.elapsed());

    if config.diagnostics {
        log_info(&spectrogram, name);
    }

    let start = Instant::now();
    let landmarks = get_peaks(&spectrogram, &config.peak_config());
    debug!("Found {} maxima in {:?}", landmarks.len(), start.elapsed());

    let start = Instant::now();
    let pivots = select_pivots(&landmarks, PivotSelection::Naive);
    let fingerprints = gen_fingerprints(&pivots, &landmarks, &config.hash_box());
    debug!(
        "Generated {} hashes for `{}` in {:?}",
        fingerprints.len(),
        name,
        start.elapsed()
    );

    Ok(Analysis {
        spectrogram,
        landmarks,
        fingerprints,
    })
}

pub fn select_pivots(landmarks: &[Landmark], selection: PivotSelection) -> Vec<Landmark> {
    match selection {
        PivotSelection::Naive => landmarks.to_vec(),
    }
}

/// Pair every pivot with each other landmark inside its target box.
///
/// The box spans frames `[t + displacement, t + displacement + width]` and
/// bins `[f - height/2, f + height/2]`, clipped at bin 0.
pub fn gen_fingerprints(
    pivots: &[Landmark],
    landmarks: &[Landmark],
    hash_box: &HashBox,
) -> Vec<Fingerprint> {
    let mut by_time = landmarks.to_vec();
    by_time.sort_by_key(|landmark| landmark.time_bin);

    let mut fingerprints = Vec::<Fingerprint>::new();

    for pivot in pivots {
        let time_lo = pivot.time_bin + hash_box.displacement;
        let time_hi = time_lo + hash_box.width;
        let freq_lo = pivot.frequency_bin.saturating_sub(hash_box.height / 2);
        let freq_hi = pivot.frequency_bin + hash_box.height / 2;

        let first = by_time.partition_point(|landmark| landmark.time_bin < time_lo);

        for target in by_time[first..]
            .iter()
            .take_while(|landmark| landmark.time_bin <= time_hi)
        {
            if target == pivot {
                continue;
            }
            if target.frequency_bin < freq_lo || target.frequency_bin > freq_hi {
                continue;
            }

            fingerprints.push(Fingerprint {
                hash: gen_hash(pivot, target),
                anchor_time: pivot.time_bin,
            });
        }
    }

    fingerprints
}

/// Pack pivot frequency, target frequency and time delta into 10 bits each:
/// `pivot_f << 20 | target_f << 10 | dt`.
///
/// Fields wider than 10 bits are truncated, so bins above 1023 alias onto
/// lower ones. Stored indexes depend on this exact layout.
pub fn gen_hash(pivot: &Landmark, target: &Landmark) -> u32 {
    let pivot_frequency = pivot.frequency_bin as u32 & FIELD_MASK;
    let target_frequency = target.frequency_bin as u32 & FIELD_MASK;
    let time_delta = target.time_bin.abs_diff(pivot.time_bin) as u32 & FIELD_MASK;

    (pivot_frequency << (2 * FIELD_BITS)) | (target_frequency << FIELD_BITS) | time_delta
}

/// Inverse of [`gen_hash`]: `(pivot_f, target_f, dt)`.
pub fn unpack_hash(hash: u32) -> (u32, u32, u32) {
    (
        (hash >> (2 * FIELD_BITS)) & FIELD_MASK,
        (hash >> FIELD_BITS) & FIELD_MASK,
        hash & FIELD_MASK,
    )
}

#[cfg(test)]
mod test {
    use super::*;

    fn landmark(frequency_bin: usize, time_bin: usize) -> Landmark {
        Landmark {
            frequency_bin,
            time_bin,
            intensity: 1.0,
        }
    }

    #[test]
    fn hash_packing() {
        let hash = gen_hash(&landmark(300, 10), &landmark(512, 35));
        assert_eq!(hash, (300 << 20) | (512 << 10) | 25);
        assert_eq!(unpack_hash(hash), (300, 512, 25));
    }

    #[test]
    fn hash_round_trips_at_field_boundaries() {
        let edges = [0usize, 1, 511, 1022, 1023];
        for &pivot_f in &edges {
            for &target_f in &edges {
                for &dt in &edges {
                    let hash = gen_hash(&landmark(pivot_f, 100), &landmark(target_f, 100 + dt));
                    assert_eq!(
                        unpack_hash(hash),
                        (pivot_f as u32, target_f as u32, dt as u32),
                        "({}, {}, {})",
                        pivot_f,
                        target_f,
                        dt
                    );
                }
            }
        }
    }

    #[test]
    fn hash_fields_are_truncated() {
        let hash = gen_hash(&landmark(1024 + 7, 0), &landmark(2047, 1030));
        assert_eq!(unpack_hash(hash), (7, 1023, 6));
    }

    #[test]
    fn pairs_only_inside_the_box() {
        let hash_box = HashBox {
            width: 10,
            height: 20,
            displacement: 2,
        };
        let pivot = landmark(50, 5);
        let landmarks = vec![
            pivot,
            landmark(50, 6),  // before the box
            landmark(40, 7),  // lower corner
            landmark(60, 17), // upper corner
            landmark(61, 10), // above
            landmark(39, 10), // below
            landmark(50, 18), // after
        ];

        let fingerprints = gen_fingerprints(&[pivot], &landmarks, &hash_box);
        let targets: Vec<(u32, u32, u32)> = fingerprints.iter().map(|f| unpack_hash(f.hash)).collect();

        assert_eq!(targets, vec![(50, 40, 2), (50, 60, 12)]);
        assert!(fingerprints.iter().all(|f| f.anchor_time == 5));
    }

    #[test]
    fn box_is_clipped_at_bin_zero() {
        let hash_box = HashBox {
            width: 5,
            height: 20,
            displacement: 1,
        };
        let pivot = landmark(3, 0);
        // frequency range is [0, 13]
        let landmarks = vec![pivot, landmark(0, 2), landmark(13, 2), landmark(14, 2), landmark(20, 2)];

        let fingerprints = gen_fingerprints(&[pivot], &landmarks, &hash_box);
        let targets: Vec<u32> = fingerprints.iter().map(|f| unpack_hash(f.hash).1).collect();
        assert_eq!(targets, vec![0, 13]);
    }

    #[test]
    fn odd_box_height_rounds_down_on_both_sides() {
        let hash_box = HashBox {
            width: 5,
            height: 21,
            displacement: 1,
        };
        let pivot = landmark(50, 0);
        // frequency range is [40, 60]
        let landmarks = vec![pivot, landmark(39, 2), landmark(40, 2), landmark(60, 2), landmark(61, 2)];

        let fingerprints = gen_fingerprints(&[pivot], &landmarks, &hash_box);
        let targets: Vec<u32> = fingerprints.iter().map(|f| unpack_hash(f.hash).1).collect();
        assert_eq!(targets, vec![40, 60]);
    }

    #[test]
    fn pivot_never_pairs_with_itself() {
        let hash_box = HashBox {
            width: 5,
            height: 5,
            displacement: 0,
        };
        let pivot = landmark(10, 10);
        assert!(gen_fingerprints(&[pivot], &[pivot], &hash_box).is_empty());
    }

    #[test]
    fn every_landmark_is_a_pivot() {
        let landmarks = vec![landmark(1, 1), landmark(2, 2)];
        assert_eq!(select_pivots(&landmarks, PivotSelection::Naive), landmarks);
    }

    #[test]
    fn empty_samples_give_no_fingerprints() {
        let fingerprints = fingerprint_samples(&[], &RecognizerConfig::default()).unwrap();
        assert!(fingerprints.is_empty());
    }

    #[test]
    fn short_samples_are_an_error() {
        let err = fingerprint_samples(&[0.0; 100], &RecognizerConfig::default()).unwrap_err();
        assert!(matches!(err, RecognizerError::InvalidParameter(_)));
    }
}
