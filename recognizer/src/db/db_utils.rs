/*
file: /src/db/db_utils.rs
Loading and appending the persisted index.
*/
use crate::db::models::{Index, IndexEntry, SongRecord};
use crate::db::schema::{hashes_path, songs_path};
use crate::recognizer::declarations::{RecognizerError, Result};
use crate::recognizer::fingerprint::Fingerprint;
use log::{info, warn};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::Path;

/// Load both index files from `index_dir`. Missing files count as empty.
pub fn load_index(index_dir: &Path) -> Result<Index> {
    let mut index = Index::new();

    let path = hashes_path(index_dir);
    if let Some(reader) = open_for_reading(&path)? {
        read_hashes(reader, &path, &mut index)?;
    }

    let path = songs_path(index_dir);
    if let Some(reader) = open_for_reading(&path)? {
        for record in read_songs(reader, &path)? {
            index.insert_song(record);
        }
    }

    info!(
        "Loaded {} hash records for {} songs from `{}`",
        index.entry_count(),
        index.song_count(),
        index_dir.display()
    );

    Ok(index)
}

fn open_for_reading(path: &Path) -> Result<Option<BufReader<File>>> {
    match File::open(path) {
        Ok(file) => Ok(Some(BufReader::new(file))),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            warn!("Index file `{}` does not exist, treating it as empty", path.display());
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

/// Parse `hash,anchor_time,song_id` lines into `index`. `path` only labels
/// errors.
pub fn read_hashes<R: BufRead>(reader: R, path: &Path, index: &mut Index) -> Result<()> {
    for (line_index, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }

        let corrupt = |reason: String| RecognizerError::CorruptIndex {
            file: path.to_path_buf(),
            line: line_index + 1,
            reason,
        };

        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != 3 {
            return Err(corrupt(format!("expected 3 fields, found {}", fields.len())));
        }

        let hash = fields[0]
            .parse::<u32>()
            .map_err(|err| corrupt(format!("bad hash `{}`: {}", fields[0], err)))?;
        let anchor_time = fields[1]
            .parse::<usize>()
            .map_err(|err| corrupt(format!("bad anchor time `{}`: {}", fields[1], err)))?;
        let song_id = fields[2]
            .parse::<u32>()
            .map_err(|err| corrupt(format!("bad song id `{}`: {}", fields[2], err)))?;

        index.insert(
            hash,
            IndexEntry {
                anchor_time,
                song_id,
            },
        );
    }
    Ok(())
}

/// Parse `song_id,"file name"` lines. Only the first comma separates the
/// fields; the name itself may contain commas.
pub fn read_songs<R: BufRead>(reader: R, path: &Path) -> Result<Vec<SongRecord>> {
    let mut records = Vec::new();

    for (line_index, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim_end_matches(&['\r', '\n'][..]);
        if line.is_empty() {
            continue;
        }

        let corrupt = |reason: String| RecognizerError::CorruptIndex {
            file: path.to_path_buf(),
            line: line_index + 1,
            reason,
        };

        let (id, quoted) = line
            .split_once(',')
            .ok_or_else(|| corrupt("missing `,` separator".to_string()))?;
        let song_id = id
            .parse::<u32>()
            .map_err(|err| corrupt(format!("bad song id `{}`: {}", id, err)))?;
        let file_name =
            unquote(quoted).ok_or_else(|| corrupt(format!("bad quoted name {}", quoted)))?;

        records.push(SongRecord { song_id, file_name });
    }

    Ok(records)
}

pub fn write_hashes<W: Write>(writer: &mut W, song_id: u32, fingerprints: &[Fingerprint]) -> Result<()> {
    for fingerprint in fingerprints {
        writeln!(writer, "{},{},{}", fingerprint.hash, fingerprint.anchor_time, song_id)?;
    }
    Ok(())
}

pub fn write_song<W: Write>(writer: &mut W, record: &SongRecord) -> Result<()> {
    writeln!(writer, "{},{}", record.song_id, quote(&record.file_name))?;
    Ok(())
}

/// Append one song and its fingerprints to the index files in `index_dir`,
/// creating the directory and files on first use.
///
/// The song row is flushed before any hash, so every stored hash has a name
/// and the song's id is already taken on reload. If writing the hashes then
/// fails, the song is named but only partly indexed.
pub fn store_song(index_dir: &Path, record: &SongRecord, fingerprints: &[Fingerprint]) -> Result<()> {
    fs::create_dir_all(index_dir)?;

    let mut songs = BufWriter::new(open_for_append(&songs_path(index_dir))?);
    write_song(&mut songs, record)?;
    songs.flush()?;

    let mut hashes = BufWriter::new(open_for_append(&hashes_path(index_dir))?);
    write_hashes(&mut hashes, record.song_id, fingerprints)?;
    hashes.flush()?;

    Ok(())
}

fn open_for_append(path: &Path) -> Result<File> {
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// Wrap in double quotes, backslash-escaping `"` and `\`.
pub fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Inverse of [`quote`]. Returns `None` unless `value` is exactly one
/// well-formed quoted string.
pub fn unquote(value: &str) -> Option<String> {
    let mut chars = value.strip_prefix('"')?.chars();
    let mut unquoted = String::with_capacity(value.len());

    loop {
        match chars.next()? {
            '\\' => unquoted.push(chars.next()?),
            '"' => break,
            c => unquoted.push(c),
        }
    }

    if chars.next().is_some() {
        return None;
    }
    Some(unquoted)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;
    use std::path::PathBuf;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("recognizer-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn quoting() {
        assert_eq!(quote("plain.wav"), "\"plain.wav\"");
        assert_eq!(quote(r#"say "hi", \o/.wav"#), r#""say \"hi\", \\o/.wav""#);
        assert_eq!(
            unquote(r#""say \"hi\", \\o/.wav""#).as_deref(),
            Some(r#"say "hi", \o/.wav"#)
        );

        assert_eq!(unquote("no quotes"), None);
        assert_eq!(unquote("\"unterminated"), None);
        assert_eq!(unquote("\"a\"trailing"), None);
    }

    #[test]
    fn reads_hashes_and_skips_blank_lines() {
        let text = "1049600,12,0\n\n5,0,1\r\n5,3,0\n";
        let mut index = Index::new();
        read_hashes(Cursor::new(text), Path::new("hashes.csv"), &mut index).unwrap();

        assert_eq!(index.entry_count(), 3);
        assert_eq!(
            index.lookup(5),
            &[
                IndexEntry {
                    anchor_time: 0,
                    song_id: 1
                },
                IndexEntry {
                    anchor_time: 3,
                    song_id: 0
                }
            ]
        );
        assert_eq!(index.next_song_id().unwrap(), 2);
    }

    #[test]
    fn malformed_hash_line_is_corrupt() {
        for (text, line) in [("1,2,3\n1,2\n", 2), ("1,2,3\n\nx,2,3\n", 3), ("1,-2,3\n", 1)] {
            let mut index = Index::new();
            let err = read_hashes(Cursor::new(text), Path::new("hashes.csv"), &mut index).unwrap_err();
            match err {
                RecognizerError::CorruptIndex { line: found, .. } => assert_eq!(found, line, "{:?}", text),
                other => panic!("unexpected error {:?}", other),
            }
        }
    }

    #[test]
    fn reads_song_names_with_commas() {
        let text = "0,\"a, b.wav\"\n7,\"c\\\"d.wav\"\n";
        let records = read_songs(Cursor::new(text), Path::new("songs.csv")).unwrap();
        assert_eq!(
            records,
            vec![
                SongRecord {
                    song_id: 0,
                    file_name: "a, b.wav".into()
                },
                SongRecord {
                    song_id: 7,
                    file_name: "c\"d.wav".into()
                }
            ]
        );
    }

    #[test]
    fn malformed_song_line_is_corrupt() {
        for text in ["0\n", "zero,\"a.wav\"\n", "0,a.wav\n"] {
            let err = read_songs(Cursor::new(text), Path::new("songs.csv")).unwrap_err();
            assert!(matches!(err, RecognizerError::CorruptIndex { line: 1, .. }), "{}", text);
        }
    }

    #[test]
    fn writes_index_lines() {
        let mut hashes = Vec::new();
        let fingerprints = [Fingerprint {
            hash: 42,
            anchor_time: 9,
        }];
        write_hashes(&mut hashes, 3, &fingerprints).unwrap();
        assert_eq!(String::from_utf8(hashes).unwrap(), "42,9,3\n");

        let mut songs = Vec::new();
        write_song(
            &mut songs,
            &SongRecord {
                song_id: 3,
                file_name: "x.wav".into(),
            },
        )
        .unwrap();
        assert_eq!(String::from_utf8(songs).unwrap(), "3,\"x.wav\"\n");
    }

    #[test]
    fn missing_index_is_empty() {
        let dir = scratch_dir("missing-index");
        let index = load_index(&dir).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.next_song_id().unwrap(), 0);
    }

    #[test]
    fn store_then_load() {
        let dir = scratch_dir("store-then-load");

        for song_id in 0..2 {
            let record = SongRecord {
                song_id,
                file_name: format!("song {}.wav", song_id),
            };
            let fingerprints = [
                Fingerprint {
                    hash: 100,
                    anchor_time: song_id as usize,
                },
                Fingerprint {
                    hash: 200 + song_id,
                    anchor_time: 5,
                },
            ];
            store_song(&dir, &record, &fingerprints).unwrap();
        }

        let index = load_index(&dir).unwrap();
        assert_eq!(index.song_count(), 2);
        assert_eq!(index.entry_count(), 4);
        assert_eq!(index.lookup(100).len(), 2);
        assert_eq!(index.song_name(1), Some("song 1.wav"));
        assert_eq!(index.next_song_id().unwrap(), 2);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn song_row_is_written_before_hashes() {
        let dir = scratch_dir("song-before-hashes");
        // a directory where the hashes file belongs makes the hash append fail
        fs::create_dir_all(hashes_path(&dir)).unwrap();

        let record = SongRecord {
            song_id: 0,
            file_name: "tune.wav".into(),
        };
        let fingerprints = [Fingerprint {
            hash: 1,
            anchor_time: 0,
        }];
        assert!(store_song(&dir, &record, &fingerprints).is_err());

        let songs = fs::read_to_string(songs_path(&dir)).unwrap();
        assert_eq!(songs, "0,\"tune.wav\"\n");

        fs::remove_dir_all(&dir).unwrap();
    }
}
