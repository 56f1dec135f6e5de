/*
file: src/recognizer/shazam.rs
*/
use std::collections::HashMap;
use std::path::Path;

use log::{info, warn};

use crate::db::models::Index;
use crate::recognizer::fingerprint::Fingerprint;

/// A candidate song and how well the query lines up with it.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub song_id: u32,
    pub song_name: String,
    /// Size of the largest cluster of consistent time offsets.
    pub score: usize,
    pub z_score: f64,
}

/// Candidates ranked by score, with the score distribution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchReport {
    pub matches: Vec<Match>,
    pub mean: f64,
    pub std_dev: f64,
}

impl MatchReport {
    pub fn best(&self) -> Option<&Match> {
        self.matches.first()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Log the top `n` candidates and the score distribution.
    pub fn log_summary(&self, n: usize) {
        info!("{} candidate songs", self.matches.len());
        info!("Score mean {:.3}, std dev {:.3}", self.mean, self.std_dev);
        for (rank, a_match) in self.matches.iter().take(n).enumerate() {
            info!(
                "#{} {} (id {}): score {}, z-score {:.3}",
                rank + 1,
                a_match.song_name,
                a_match.song_id,
                a_match.score,
                a_match.z_score
            );
        }
    }
}

/// Match query fingerprints against the index.
///
/// Every hash shared with a song yields a `(song_time, query_time)` pair. A
/// song's score is the largest number of pairs whose offsets
/// `|song_time - query_time|` fall within `bin_size` of each other.
pub fn find_matches(query: &[Fingerprint], index: &Index, bin_size: usize) -> MatchReport {
    // songID -> [(song_time, query_time)]
    let mut matches = HashMap::<u32, Vec<(usize, usize)>>::new();

    for fingerprint in query {
        for entry in index.lookup(fingerprint.hash) {
            matches
                .entry(entry.song_id)
                .or_default()
                .push((entry.anchor_time, fingerprint.anchor_time));
        }
    }

    let mut match_list: Vec<Match> = matches
        .into_iter()
        .map(|(song_id, pairs)| {
            let mut offsets: Vec<usize> = pairs
                .iter()
                .map(|(song_time, query_time)| song_time.abs_diff(*query_time))
                .collect();

            let song_name = match index.song_name(song_id) {
                Some(name) => name.to_string(),
                None => {
                    warn!("Song {} has hashes but no name in the index", song_id);
                    format!("song #{}", song_id)
                }
            };

            Match {
                song_id,
                song_name,
                score: score_offsets(&mut offsets, bin_size),
                z_score: 0.0,
            }
        })
        .collect();

    if match_list.is_empty() {
        return MatchReport::default();
    }

    match_list.sort_by(|a, b| b.score.cmp(&a.score).then(a.song_id.cmp(&b.song_id)));

    let count = match_list.len() as f64;
    let mean = match_list.iter().map(|m| m.score as f64).sum::<f64>() / count;
    let variance = match_list
        .iter()
        .map(|m| (m.score as f64 - mean).powi(2))
        .sum::<f64>()
        / count;
    let std_dev = variance.sqrt();
    let divisor = if std_dev == 0.0 { 1.0 } else { std_dev };

    for a_match in &mut match_list {
        a_match.z_score = (a_match.score as f64 - mean) / divisor;
    }

    MatchReport {
        matches: match_list,
        mean,
        std_dev,
    }
}

/// Largest number of offsets inside any inclusive window of width
/// `bin_size`. Sorts `offsets` in place.
pub fn score_offsets(offsets: &mut [usize], bin_size: usize) -> usize {
    offsets.sort_unstable();

    let mut best = 0;
    let mut start = 0;
    for end in 0..offsets.len() {
        while offsets[end] - offsets[start] > bin_size {
            start += 1;
        }
        best = best.max(end - start + 1);
    }
    best
}

/// Name shown for an indexed file: its stem, e.g. `Song_Artist` for
/// `Song_Artist.wav`.
pub fn display_name(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string())
}
