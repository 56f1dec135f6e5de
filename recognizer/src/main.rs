/* file: src/main.rs
Purpose: provides the application's external interface, allowing users to add songs to the index
 for future identification as well as identify a song based on an audio snippet.
*/

use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{debug, error, info, warn};
use recognizer::db::db_utils;
use recognizer::db::dumps;
use recognizer::db::models::SongRecord;
use recognizer::db::schema::DEFAULT_INDEX_DIR;
use recognizer::recognizer::config::RecognizerConfig;
use recognizer::recognizer::declarations::{
    RecognizerError, DATABASE_INSERT_ERROR, FILE_NOT_FOUND, MATCH_SCORE_THRESHOLD,
    NO_SONG_MATCH_ERROR,
};
use recognizer::recognizer::fingerprint;
use recognizer::recognizer::shazam;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};

// Struct for `clap` crate to handle command-line arguments.
#[derive(Parser, Debug)]
#[command(about = "Fingerprints songs into an index and identifies audio snippets against it", long_about = None)]
struct Args {
    /// Directory holding `hashes.csv` and `songs.csv`
    #[arg(long, value_name = "DIR", env = "RECOGNIZER_INDEX_DIR", default_value = DEFAULT_INDEX_DIR, global = true)]
    index_dir: PathBuf,

    /// KEY=VALUE file with fingerprinting parameters
    #[arg(short, long, value_name = "FILE", env = "RECOGNIZER_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Expected sample rate; files recorded at any other rate are rejected
    #[arg(long, value_name = "HZ", global = true)]
    sample_rate: Option<u32>,

    /// Log debug output, including per-step timings
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fingerprint every .wav file in a directory and append it to the index
    Index {
        #[arg(value_name = "DIR")]
        songs_dir: PathBuf,
    },

    /// Identify an audio snippet [.wav] against the index
    Query {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Write the snippet's spectrogram, maxima and hashes as CSV to this directory
        #[arg(long, value_name = "DIR")]
        dump_dir: Option<PathBuf>,

        /// Lowest score reported as a match
        #[arg(long, default_value_t = MATCH_SCORE_THRESHOLD)]
        min_score: usize,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // `.env` may provide RECOGNIZER_INDEX_DIR and RECOGNIZER_CONFIG
    dotenvy::dotenv().ok();

    // Parse command line arguments.
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level)).init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

async fn run(args: Args) -> Result<(), u8> {
    let config = match &args.config {
        Some(path) => RecognizerConfig::load(path).map_err(report)?,
        None => RecognizerConfig::default(),
    };

    match args.command {
        Command::Index { songs_dir } => {
            add_song_files_concurrently(&songs_dir, &args.index_dir, Arc::new(config), args.sample_rate)
                .await
        }
        Command::Query {
            file,
            dump_dir,
            min_score,
        } => identify_song(
            &file,
            &args.index_dir,
            &config,
            args.sample_rate,
            dump_dir.as_deref(),
            min_score,
        ),
    }
}

/// Log an error and turn it into the process exit code.
fn report(err: RecognizerError) -> u8 {
    error!("{}", err);
    err.exit_code()
}

/// Fingerprint every `.wav` in `songs_dir` concurrently, then append the results to the index
/// one song at a time.
async fn add_song_files_concurrently(
    songs_dir: &Path,
    index_dir: &Path,
    config: Arc<RecognizerConfig>,
    sample_rate: Option<u32>,
) -> Result<(), u8> {
    let song_files = list_wav_files(songs_dir)?;
    if song_files.is_empty() {
        warn!("No .wav files found in `{}`", songs_dir.display());
        return Ok(());
    }

    // `None` once every id up to `u32::MAX` is taken.
    let mut next_song_id = Some(
        db_utils::load_index(index_dir)
            .and_then(|index| index.next_song_id())
            .map_err(report)?,
    );

    // Fingerprinting does not touch the index; safe to be concurrent. At most
    // one decoded song per worker is held in memory at a time.
    let workers = worker_limit();
    debug!("Fingerprinting {} files on {} workers", song_files.len(), workers);
    let semaphore = Arc::new(Semaphore::new(workers));

    let mut fingerprinting_tasks = Vec::with_capacity(song_files.len());
    for song_file_path in song_files {
        let config = Arc::clone(&config);
        let file_path = song_file_path.clone();

        fingerprinting_tasks.push((
            song_file_path,
            spawn_limited(Arc::clone(&semaphore), move || {
                let start = Instant::now();
                let result = fingerprint::fingerprint_audio(&file_path, &config, sample_rate);
                debug!("Hashed `{}` in {:?}", file_path.display(), start.elapsed());
                result
            }),
        ));
    }

    // Appending happens sequentially, in song id order.
    let (mut stored, mut failed) = (0usize, 0usize);
    for (song_file_path, fingerprint_join_handle) in fingerprinting_tasks {
        let fingerprints = match fingerprint_join_handle.await.and_then(|joined| joined) {
            Ok(Ok(fingerprints)) => fingerprints,
            Ok(Err(err)) => {
                error!(
                    "Could not generate fingerprint for `{}`: {}",
                    song_file_path.display(),
                    err
                );
                failed += 1;
                continue;
            }
            Err(err) => {
                error!(
                    "Could not join fingerprinting task for `{}`: {}",
                    song_file_path.display(),
                    err
                );
                failed += 1;
                continue;
            }
        };

        let file_name = song_file_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let song_id = next_song_id.ok_or_else(|| {
            report(RecognizerError::InvalidParameter(
                "song id space exhausted".to_string(),
            ))
        })?;
        let record = SongRecord { song_id, file_name };

        let start = Instant::now();
        db_utils::store_song(index_dir, &record, &fingerprints).map_err(report)?;
        debug!("Appended to index in {:?}", start.elapsed());

        info!(
            "Indexed `{}` as song {} ({} hashes)",
            record.file_name,
            record.song_id,
            fingerprints.len()
        );
        next_song_id = song_id.checked_add(1);
        stored += 1;
    }

    info!("Indexed {} songs, {} failed", stored, failed);

    if stored == 0 {
        return Err(DATABASE_INSERT_ERROR);
    }
    Ok(())
}

/// Number of songs fingerprinted at once: one per available core.
fn worker_limit() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Run `job` on the blocking pool once `semaphore` hands out a permit. The
/// permit is released when the job returns.
fn spawn_limited<T, F>(semaphore: Arc<Semaphore>, job: F) -> JoinHandle<Result<T, JoinError>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(async move {
        let permit = semaphore.acquire_owned().await;
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await
    })
}

/// Regular files in `dir` with a `.wav` extension, sorted by name.
fn list_wav_files(dir: &Path) -> Result<Vec<PathBuf>, u8> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            error!("Cannot read directory `{}`: {}", dir.display(), err);
            return Err(FILE_NOT_FOUND);
        }
    };

    let mut song_files = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if path.extension().map_or(false, |ext| ext == "wav") {
            song_files.push(path);
        } else {
            info!("Omitting non-wav file `{}`", path.display());
        }
    }

    song_files.sort();
    Ok(song_files)
}

fn identify_song(
    file: &Path,
    index_dir: &Path,
    config: &RecognizerConfig,
    sample_rate: Option<u32>,
    dump_dir: Option<&Path>,
    min_score: usize,
) -> Result<(), u8> {
    let index = db_utils::load_index(index_dir).map_err(report)?;
    if index.is_empty() {
        warn!("The index in `{}` is empty", index_dir.display());
    }

    let analysis = fingerprint::analyze_audio(file, config, sample_rate).map_err(report)?;

    if let Some(dump_dir) = dump_dir {
        dumps::dump_analysis(dump_dir, &analysis).map_err(report)?;
    }

    let start = Instant::now();
    let match_report = shazam::find_matches(&analysis.fingerprints, &index, config.bin_size);
    debug!("Matched {} hashes in {:?}", analysis.fingerprints.len(), start.elapsed());
    match_report.log_summary(5);

    let best_match = match match_report.best() {
        Some(best_match) => best_match,
        None => {
            warn!("No matches found for `{}`!", file.display());
            println!("no match");
            return Err(NO_SONG_MATCH_ERROR);
        }
    };

    if best_match.score < min_score {
        warn!(
            "No LIKELY match found for `{}`! Best match was `{}` with score {}",
            file.display(),
            best_match.song_name,
            best_match.score
        );
        println!("no match");
        return Err(NO_SONG_MATCH_ERROR);
    }

    println!("{}", shazam::display_name(&best_match.song_name));
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn at_least_one_worker() {
        assert!(worker_limit() >= 1);
    }

    #[tokio::test]
    async fn limited_jobs_never_exceed_the_permits() {
        let semaphore = Arc::new(Semaphore::new(2));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|n| {
                let (running, peak) = (Arc::clone(&running), Arc::clone(&peak));
                spawn_limited(Arc::clone(&semaphore), move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(20));
                    running.fetch_sub(1, Ordering::SeqCst);
                    n
                })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.and_then(|joined| joined).unwrap());
        }

        assert_eq!(results, (0..8).collect::<Vec<_>>());
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(semaphore.available_permits(), 2);
    }
}
