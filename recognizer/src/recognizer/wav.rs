// file: src/recognizer/wav.rs

use crate::recognizer::declarations::{RecognizerError, Result};
use hound::{SampleFormat, WavReader};
use log::debug;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Mono audio scaled to `[-1, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleBuffer {
    pub samples: Vec<f64>,
    pub sample_rate: u32,
}

impl SampleBuffer {
    pub fn duration_sec(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Read a `.wav` file, down-mixing every channel to mono.
///
/// `sample_rate` is the rate the caller expects. Resampling is not
/// supported, so a file at any other rate is rejected.
pub fn read_samples(file_path: &Path, sample_rate: Option<u32>) -> Result<SampleBuffer> {
    let file = File::open(file_path)?;
    let buffer = read_from(BufReader::new(file), sample_rate)?;

    debug!(
        "Read `{}`: {} samples at {} Hz ({:.2} s)",
        file_path.display(),
        buffer.samples.len(),
        buffer.sample_rate,
        buffer.duration_sec()
    );

    Ok(buffer)
}

pub fn read_from<R: Read>(reader: R, sample_rate: Option<u32>) -> Result<SampleBuffer> {
    let mut wav_reader = WavReader::new(reader)?;
    let spec = wav_reader.spec();

    if let Some(requested) = sample_rate {
        if requested != spec.sample_rate {
            return Err(RecognizerError::UnsupportedSampleRate {
                requested,
                native: spec.sample_rate,
            });
        }
    }

    let interleaved: Vec<f64> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => wav_reader
            .samples::<f32>()
            .map(|sample| sample.map(f64::from))
            .collect::<std::result::Result<Vec<f64>, hound::Error>>()?,
        (SampleFormat::Int, bits @ (8 | 16 | 24 | 32)) => {
            let scale = (1u64 << (bits - 1)) as f64;
            wav_reader
                .samples::<i32>()
                .map(|sample| sample.map(|s| s as f64 / scale))
                .collect::<std::result::Result<Vec<f64>, hound::Error>>()?
        }
        (format, bits) => {
            return Err(RecognizerError::IncompatibleFile(format!(
                "{} bit {:?} samples are not supported",
                bits, format
            )))
        }
    };

    Ok(SampleBuffer {
        samples: downmix(&interleaved, spec.channels as usize),
        sample_rate: spec.sample_rate,
    })
}

/// Average interleaved frames into a single channel. A trailing partial
/// frame is dropped.
fn downmix(interleaved: &[f64], channels: usize) -> Vec<f64> {
    if channels <= 1 {
        return interleaved.to_vec();
    }

    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f64>() / channels as f64)
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;
    use hound::{WavSpec, WavWriter};
    use std::io::Cursor;

    fn spec(channels: u16, bits_per_sample: u16, sample_format: SampleFormat) -> WavSpec {
        WavSpec {
            channels,
            sample_rate: 8000,
            bits_per_sample,
            sample_format,
        }
    }

    fn encode_i16(spec: WavSpec, samples: &[i16]) -> Vec<u8> {
        let mut bytes = Vec::new();
        {
            let mut writer = WavWriter::new(Cursor::new(&mut bytes), spec).unwrap();
            for sample in samples {
                writer.write_sample(*sample).unwrap();
            }
            writer.finalize().unwrap();
        }
        bytes
    }

    #[test]
    fn mono_16_bit_is_scaled() {
        let bytes = encode_i16(spec(1, 16, SampleFormat::Int), &[0, 16384, -32768]);
        let buffer = read_from(Cursor::new(bytes), None).unwrap();

        assert_eq!(buffer.sample_rate, 8000);
        assert_eq!(buffer.samples, vec![0.0, 0.5, -1.0]);
    }

    #[test]
    fn stereo_is_averaged() {
        let bytes = encode_i16(
            spec(2, 16, SampleFormat::Int),
            &[16384, 0, -16384, -16384, 8192, 24576],
        );
        let buffer = read_from(Cursor::new(bytes), Some(8000)).unwrap();

        assert_eq!(buffer.samples.len(), 3);
        assert_abs_diff_eq!(buffer.samples[0], 0.25);
        assert_abs_diff_eq!(buffer.samples[1], -0.5);
        assert_abs_diff_eq!(buffer.samples[2], 0.5);
        assert_abs_diff_eq!(buffer.duration_sec(), 3.0 / 8000.0);
    }

    #[test]
    fn float_samples() {
        let mut bytes = Vec::new();
        {
            let mut writer =
                WavWriter::new(Cursor::new(&mut bytes), spec(1, 32, SampleFormat::Float)).unwrap();
            for sample in [0.25f32, -0.75] {
                writer.write_sample(sample).unwrap();
            }
            writer.finalize().unwrap();
        }

        let buffer = read_from(Cursor::new(bytes), None).unwrap();
        assert_eq!(buffer.samples, vec![0.25, -0.75]);
    }

    #[test]
    fn rejects_other_sample_rate() {
        let bytes = encode_i16(spec(1, 16, SampleFormat::Int), &[0, 1, 2]);
        let err = read_from(Cursor::new(bytes), Some(44100)).unwrap_err();

        assert!(matches!(
            err,
            RecognizerError::UnsupportedSampleRate {
                requested: 44100,
                native: 8000
            }
        ));
    }

    #[test]
    fn rejects_non_wav_data() {
        let err = read_from(Cursor::new(b"definitely not a riff header".to_vec()), None)
            .unwrap_err();
        assert!(matches!(err, RecognizerError::Wav(_)));
    }

    #[test]
    fn missing_file() {
        let path = std::env::temp_dir().join("recognizer-no-such-file.wav");
        let err = read_samples(&path, None).unwrap_err();
        assert_eq!(
            err.exit_code(),
            crate::recognizer::declarations::FILE_NOT_FOUND
        );
    }
}
