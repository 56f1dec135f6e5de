pub mod config;
pub mod declarations;
pub mod fingerprint;
pub mod grid;
pub mod landmarks;
pub mod shazam;
pub mod spectrogram;
pub mod wav;
