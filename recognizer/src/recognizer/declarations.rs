/* file: src/recognizer/declarations.rs
Shared constants, process exit codes and the crate-wide error type.
*/

use std::path::PathBuf;
use thiserror::Error;

pub const FILE_NOT_FOUND: u8 = 1;
pub const INCOMPATIBLE_FILE_ERROR: u8 = 2;
pub const NO_SONG_MATCH_ERROR: u8 = 3;
pub const SPECTROGRAM_GENERATION_FAILURE: u8 = 4;
pub const DATABASE_INSERT_ERROR: u8 = 5;
pub const DATABASE_QUERY_ERROR: u8 = 6;

pub const MATCH_SCORE_THRESHOLD: usize = 15;

/// Width of the offset window used when scoring a candidate song.
pub const BIN_SIZE: usize = 10;

pub type Result<T> = std::result::Result<T, RecognizerError>;

#[derive(Debug, Error)]
pub enum RecognizerError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("requested sample rate {requested} Hz but the audio is {native} Hz; resampling is not supported")]
    UnsupportedSampleRate { requested: u32, native: u32 },

    #[error("corrupt index `{}` at line {line}: {reason}", file.display())]
    CorruptIndex {
        file: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("empty input: no samples to analyze")]
    EmptyInput,

    #[error("incompatible audio file: {0}")]
    IncompatibleFile(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Wav(#[from] hound::Error),
}

impl RecognizerError {
    /// Process exit code reported by the binary for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            RecognizerError::InvalidParameter(_) | RecognizerError::EmptyInput => {
                SPECTROGRAM_GENERATION_FAILURE
            }
            RecognizerError::UnsupportedSampleRate { .. }
            | RecognizerError::IncompatibleFile(_)
            | RecognizerError::Wav(_) => INCOMPATIBLE_FILE_ERROR,
            RecognizerError::CorruptIndex { .. } => DATABASE_QUERY_ERROR,
            RecognizerError::Io(err) if err.kind() == std::io::ErrorKind::NotFound => {
                FILE_NOT_FOUND
            }
            RecognizerError::Io(_) => DATABASE_INSERT_ERROR,
        }
    }
}
