// file: recognizer/src/db/schema.rs
//
// On-disk layout of the index directory. Both files are plain text, one
// record per line, appended to on every indexing run.
//
//   hashes.csv    <hash>,<anchor_time>,<song_id>
//   songs.csv     <song_id>,"<file name>"

use std::path::{Path, PathBuf};

pub const HASHES_FILE: &str = "hashes.csv";
pub const SONGS_FILE: &str = "songs.csv";

pub const DEFAULT_INDEX_DIR: &str = "index";

pub fn hashes_path(index_dir: &Path) -> PathBuf {
    index_dir.join(HASHES_FILE)
}

pub fn songs_path(index_dir: &Path) -> PathBuf {
    index_dir.join(SONGS_FILE)
}
