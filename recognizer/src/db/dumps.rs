// file: recognizer/src/db/dumps.rs
//
// CSV dumps of intermediate results, for plotting and comparing runs.

use crate::recognizer::declarations::Result;
use crate::recognizer::fingerprint::{Analysis, Fingerprint};
use crate::recognizer::landmarks::Landmark;
use crate::recognizer::spectrogram::Spectrogram;
use log::info;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

pub const SPECTROGRAM_DUMP: &str = "sample_spec.csv";
pub const LANDMARKS_DUMP: &str = "sample_crits.csv";
pub const HASHES_DUMP: &str = "sample_hashes.csv";

/// `rows,cols` header, then one comma-separated line per frequency bin.
pub fn write_spectrogram<W: Write>(writer: &mut W, spectrogram: &Spectrogram) -> Result<()> {
    writeln!(writer, "{},{}", spectrogram.rows(), spectrogram.cols())?;
    for row in spectrogram.iter_rows() {
        let line: Vec<String> = row.iter().map(f64::to_string).collect();
        writeln!(writer, "{}", line.join(","))?;
    }
    Ok(())
}

/// One `time,frequency,intensity` line per landmark.
pub fn write_landmarks<W: Write>(writer: &mut W, landmarks: &[Landmark]) -> Result<()> {
    for landmark in landmarks {
        writeln!(
            writer,
            "{},{},{}",
            landmark.time_bin, landmark.frequency_bin, landmark.intensity
        )?;
    }
    Ok(())
}

/// One `hash,anchor_time` line per fingerprint.
pub fn write_fingerprints<W: Write>(writer: &mut W, fingerprints: &[Fingerprint]) -> Result<()> {
    for fingerprint in fingerprints {
        writeln!(writer, "{},{}", fingerprint.hash, fingerprint.anchor_time)?;
    }
    Ok(())
}

/// Write all three dumps of `analysis` into `dump_dir`.
pub fn dump_analysis(dump_dir: &Path, analysis: &Analysis) -> Result<()> {
    fs::create_dir_all(dump_dir)?;

    let mut writer = BufWriter::new(File::create(dump_dir.join(SPECTROGRAM_DUMP))?);
    write_spectrogram(&mut writer, &analysis.spectrogram)?;
    writer.flush()?;

    let mut writer = BufWriter::new(File::create(dump_dir.join(LANDMARKS_DUMP))?);
    write_landmarks(&mut writer, &analysis.landmarks)?;
    writer.flush()?;

    let mut writer = BufWriter::new(File::create(dump_dir.join(HASHES_DUMP))?);
    write_fingerprints(&mut writer, &analysis.fingerprints)?;
    writer.flush()?;

    info!("Wrote analysis dumps to `{}`", dump_dir.display());
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::recognizer::grid::Grid;

    #[test]
    fn spectrogram_csv() {
        let spectrogram = Grid::from_vec(2, 3, vec![0.0, 1.5, 2.0, 3.0, 4.0, 0.25]).unwrap();
        let mut out = Vec::new();
        write_spectrogram(&mut out, &spectrogram).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "2,3\n0,1.5,2\n3,4,0.25\n");
    }

    #[test]
    fn spectrogram_without_frames_keeps_one_line_per_bin() {
        let spectrogram = Grid::filled(3, 0, 0.0);
        let mut out = Vec::new();
        write_spectrogram(&mut out, &spectrogram).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "3,0\n\n\n\n");
    }

    #[test]
    fn landmark_and_hash_csv() {
        let landmarks = [Landmark {
            frequency_bin: 12,
            time_bin: 4,
            intensity: 0.5,
        }];
        let mut out = Vec::new();
        write_landmarks(&mut out, &landmarks).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "4,12,0.5\n");

        let fingerprints = [Fingerprint {
            hash: 99,
            anchor_time: 4,
        }];
        let mut out = Vec::new();
        write_fingerprints(&mut out, &fingerprints).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "99,4\n");
    }
}
