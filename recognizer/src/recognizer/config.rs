// file: src/recognizer/config.rs

use crate::recognizer::declarations::{Result, BIN_SIZE};
use crate::recognizer::fingerprint::HashBox;
use crate::recognizer::landmarks::{PeakAlgorithm, PeakConfig};
use crate::recognizer::spectrogram::{StftParams, DEFAULT_NFFT};
use log::{info, warn};
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Tunables of the fingerprinting pipeline, read from a `KEY=VALUE` file.
#[derive(Clone, Debug, PartialEq)]
pub struct RecognizerConfig {
    pub fft_window: usize,
    pub hop_length: Option<usize>,
    pub minlist_size_x: usize,
    pub minlist_size_y: usize,
    pub gtn_size: usize,
    pub gtn_threshold: f64,
    pub peak_algorithm: PeakAlgorithm,
    /// Width of the target box along the time axis, in frames.
    pub hash_box_x: usize,
    /// Height of the target box along the frequency axis, in bins.
    pub hash_box_y: usize,
    pub hash_box_displacement: usize,
    pub normalize: bool,
    pub bin_size: usize,
    /// Log spectrogram statistics while fingerprinting.
    pub diagnostics: bool,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        let peaks = PeakConfig::default();
        let hash_box = HashBox::default();
        Self {
            fft_window: DEFAULT_NFFT,
            hop_length: None,
            minlist_size_x: peaks.minlist_size_x,
            minlist_size_y: peaks.minlist_size_y,
            gtn_size: peaks.gtn_size,
            gtn_threshold: peaks.gtn_threshold,
            peak_algorithm: peaks.algorithm,
            hash_box_x: hash_box.width,
            hash_box_y: hash_box.height,
            hash_box_displacement: hash_box.displacement,
            normalize: false,
            bin_size: BIN_SIZE,
            diagnostics: false,
        }
    }
}

/// A configuration line that was ignored. The default stays in effect.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("config line {line}: {message}")]
pub struct ConfigWarning {
    pub line: usize,
    pub message: String,
}

impl RecognizerConfig {
    /// Read a config file. A missing file yields the defaults; every ignored
    /// line is logged as a warning.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    "Config file `{}` not found, using defaults",
                    path.display()
                );
                return Ok(Self::default());
            }
            Err(err) => return Err(err.into()),
        };

        let (config, warnings) = Self::parse(&text);
        for warning in &warnings {
            warn!("{}: {}", path.display(), warning);
        }
        info!("Loaded config from `{}`", path.display());

        Ok(config)
    }

    /// Parse `KEY=VALUE` lines. Whitespace anywhere in a line is dropped and
    /// lines starting with `;` or `#` are comments.
    pub fn parse(text: &str) -> (Self, Vec<ConfigWarning>) {
        let mut config = Self::default();
        let mut warnings = Vec::new();

        for (index, raw) in text.lines().enumerate() {
            let line_number = index + 1;
            let line: String = raw.chars().filter(|c| !c.is_whitespace()).collect();

            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                warnings.push(ConfigWarning {
                    line: line_number,
                    message: format!("expected KEY=VALUE, got `{}`", line),
                });
                continue;
            };

            if let Err(message) = config.set(key, value) {
                warnings.push(ConfigWarning {
                    line: line_number,
                    message,
                });
            }
        }

        (config, warnings)
    }

    fn set(&mut self, key: &str, value: &str) -> std::result::Result<(), String> {
        match key {
            "FFT_WINDOW" => self.fft_window = parse_value(key, value)?,
            "HOP_LENGTH" => self.hop_length = Some(parse_value(key, value)?),
            "MINLIST_SIZEX" => self.minlist_size_x = parse_value(key, value)?,
            "MINLIST_SIZEY" => self.minlist_size_y = parse_value(key, value)?,
            "GTN_SIZE" => self.gtn_size = parse_value(key, value)?,
            "GTN_THRESHOLD" => self.gtn_threshold = parse_value(key, value)?,
            "PEAK_ALGORITHM" => self.peak_algorithm = parse_value(key, value)?,
            "HASH_BOXX" => self.hash_box_x = parse_value(key, value)?,
            "HASH_BOXY" => self.hash_box_y = parse_value(key, value)?,
            "HASH_BOX_DISPLACEMENT" => self.hash_box_displacement = parse_value(key, value)?,
            "NORMALIZE" => self.normalize = parse_bool(key, value)?,
            "BIN_SIZE" => self.bin_size = parse_value(key, value)?,
            "DIAGNOSTICS" => self.diagnostics = parse_bool(key, value)?,
            _ => return Err(format!("unknown key `{}`", key)),
        }
        Ok(())
    }

    pub fn stft_params(&self) -> StftParams {
        StftParams {
            hop_length: self.hop_length,
            normalize: self.normalize,
            ..StftParams::new(self.fft_window)
        }
    }

    pub fn peak_config(&self) -> PeakConfig {
        PeakConfig {
            algorithm: self.peak_algorithm,
            minlist_size_x: self.minlist_size_x,
            minlist_size_y: self.minlist_size_y,
            gtn_size: self.gtn_size,
            gtn_threshold: self.gtn_threshold,
        }
    }

    pub fn hash_box(&self) -> HashBox {
        HashBox {
            width: self.hash_box_x,
            height: self.hash_box_y,
            displacement: self.hash_box_displacement,
        }
    }
}

fn parse_value<T>(key: &str, value: &str) -> std::result::Result<T, String>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .parse::<T>()
        .map_err(|err| format!("bad value `{}` for {}: {}", value, key, err))
}

fn parse_bool(key: &str, value: &str) -> std::result::Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(format!("bad value `{}` for {}: expected a boolean", value, key)),
    }
}
