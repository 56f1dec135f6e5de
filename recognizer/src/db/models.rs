// file: recognizer/src/db/models.rs
use crate::recognizer::declarations::{RecognizerError, Result};
use crate::recognizer::fingerprint::Fingerprint;
use std::collections::{BTreeMap, HashMap};

/// Where a hash occurs: the pivot frame within one indexed song.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct IndexEntry {
    pub anchor_time: usize,
    pub song_id: u32,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SongRecord {
    pub song_id: u32,
    pub file_name: String,
}

/// In-memory index: `hash -> [(anchor_time, song_id)]` plus the song names.
#[derive(Clone, Debug, Default)]
pub struct Index {
    hashes: HashMap<u32, Vec<IndexEntry>>,
    songs: BTreeMap<u32, String>,
    max_song_id: Option<u32>,
    entry_count: usize,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, hash: u32, entry: IndexEntry) {
        self.bump_song_id(entry.song_id);
        self.hashes.entry(hash).or_default().push(entry);
        self.entry_count += 1;
    }

    pub fn insert_song(&mut self, record: SongRecord) {
        self.bump_song_id(record.song_id);
        self.songs.insert(record.song_id, record.file_name);
    }

    /// Register a song together with all of its fingerprints.
    pub fn add_song(&mut self, record: SongRecord, fingerprints: &[Fingerprint]) {
        for fingerprint in fingerprints {
            self.insert(
                fingerprint.hash,
                IndexEntry {
                    anchor_time: fingerprint.anchor_time,
                    song_id: record.song_id,
                },
            );
        }
        self.insert_song(record);
    }

    pub fn lookup(&self, hash: u32) -> &[IndexEntry] {
        self.hashes.get(&hash).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn song_name(&self, song_id: u32) -> Option<&str> {
        self.songs.get(&song_id).map(String::as_str)
    }

    /// First id not used by any song or hash entry. Fails once `u32::MAX`
    /// is taken.
    pub fn next_song_id(&self) -> Result<u32> {
        match self.max_song_id {
            None => Ok(0),
            Some(id) => id.checked_add(1).ok_or_else(|| {
                RecognizerError::InvalidParameter("song id space exhausted".to_string())
            }),
        }
    }

    pub fn song_count(&self) -> usize {
        self.songs.len()
    }

    /// Number of `(hash, anchor_time, song_id)` records.
    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    fn bump_song_id(&mut self, song_id: u32) {
        self.max_song_id = Some(self.max_song_id.map_or(song_id, |id| id.max(song_id)));
    }
}
