//! Builds a catalog by downloading every species listed by the databases.
//!
//! A [`Downloader`] runs on its own thread and fans out to a fixed pool of
//! workers, so at most `concurrency` line lists are requested at a time.
//! Cancellation is cooperative: workers check the running flag before taking
//! the next species and before every retry.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::Rng;

use crate::catalog::Catalog;
use crate::client::{CatalogClient, parse_species_directory};
use crate::config::DownloaderConfig;
use crate::domain::{CatalogEntry, FrequencyRange, UNKNOWN_DEGREES_OF_FREEDOM};
use crate::error::CatsearchError;
use crate::parser::{CatLine, parse_lines};

/// Species processed so far and species still waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub remaining: usize,
}

pub trait ProgressSink: Send + Sync {
    fn event(&self, progress: Progress);
}

impl ProgressSink for Sender<Progress> {
    fn event(&self, progress: Progress) {
        let _ = self.send(progress);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    Idle,
    Running,
    Cancelled,
    Completed,
}

#[derive(Default)]
struct Results {
    entries: Vec<CatalogEntry>,
    completed: usize,
}

struct Shared<C> {
    client: Arc<C>,
    config: DownloaderConfig,
    running: AtomicBool,
    state: Mutex<DownloadState>,
    sink: Mutex<Option<Arc<dyn ProgressSink>>>,
    results: Mutex<Results>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Downloader<C: CatalogClient + 'static> {
    shared: Arc<Shared<C>>,
    handle: Option<JoinHandle<()>>,
    frequency_range: FrequencyRange,
}

impl<C: CatalogClient + 'static> Downloader<C> {
    pub fn new(client: Arc<C>, config: DownloaderConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                client,
                config,
                running: AtomicBool::new(false),
                state: Mutex::new(DownloadState::Idle),
                sink: Mutex::new(None),
                results: Mutex::new(Results::default()),
            }),
            handle: None,
            frequency_range: FrequencyRange::UNBOUNDED,
        }
    }

    /// Receive a [`Progress`] after every processed species. The sink is
    /// released when the download finishes or is stopped.
    pub fn with_progress_sink(self, sink: Arc<dyn ProgressSink>) -> Self {
        *lock(&self.shared.sink) = Some(sink);
        self
    }

    /// Start downloading in the background. Only lines within
    /// `frequency_range` are kept; `concurrency` of 0 means 1.
    pub fn start(
        &mut self,
        frequency_range: FrequencyRange,
        concurrency: usize,
    ) -> Result<(), CatsearchError> {
        {
            let mut state = lock(&self.shared.state);
            if *state != DownloadState::Idle {
                return Err(CatsearchError::AlreadyStarted);
            }
            *state = DownloadState::Running;
        }
        self.shared.running.store(true, Ordering::SeqCst);
        self.frequency_range = frequency_range;

        let shared = Arc::clone(&self.shared);
        let concurrency = concurrency.max(1);
        self.handle = Some(thread::spawn(move || {
            run(&shared, frequency_range, concurrency)
        }));
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> DownloadState {
        *lock(&self.shared.state)
    }

    pub fn frequency_range(&self) -> FrequencyRange {
        self.frequency_range
    }

    /// Request cancellation and wait up to `timeout` for the workers to
    /// return; a zero timeout waits for as long as it takes. No progress
    /// events are delivered once this returns. Returns whether the workers
    /// have finished.
    pub fn stop(&mut self, timeout: Duration) -> bool {
        self.shared.running.store(false, Ordering::SeqCst);
        {
            let mut state = lock(&self.shared.state);
            if *state == DownloadState::Running {
                *state = DownloadState::Cancelled;
            }
        }
        // Waits for an event in flight to be delivered.
        lock(&self.shared.sink).take();

        let Some(handle) = self.handle.take() else {
            return true;
        };
        let deadline = if timeout.is_zero() {
            None
        } else {
            Instant::now().checked_add(timeout)
        };
        while !handle.is_finished() {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                tracing::warn!("download workers still busy after {timeout:?}");
                self.handle = Some(handle);
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
        join(handle);
        true
    }

    /// Block until the download finishes on its own.
    pub fn wait(&mut self) -> DownloadState {
        if let Some(handle) = self.handle.take() {
            join(handle);
        }
        self.state()
    }

    /// Hand over the entries downloaded so far.
    pub fn take_catalog(&self) -> Vec<CatalogEntry> {
        std::mem::take(&mut lock(&self.shared.results).entries)
    }
}

impl<C: CatalogClient + 'static> Drop for Downloader<C> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.shared.running.store(false, Ordering::SeqCst);
            lock(&self.shared.sink).take();
        }
    }
}

fn join(handle: JoinHandle<()>) {
    if handle.join().is_err() {
        tracing::error!("download thread panicked");
    }
}

/// Settles the final state and releases the sink when the download thread
/// ends, including by a panic.
struct Finish<'a, C>(&'a Shared<C>);

impl<C> Drop for Finish<'_, C> {
    fn drop(&mut self) {
        let shared = self.0;
        let cancelled = !shared.running.swap(false, Ordering::SeqCst) || thread::panicking();
        {
            let mut state = lock(&shared.state);
            if *state == DownloadState::Running {
                *state = if cancelled {
                    DownloadState::Cancelled
                } else {
                    DownloadState::Completed
                };
            }
        }
        lock(&shared.sink).take();
    }
}

fn run<C: CatalogClient>(shared: &Shared<C>, frequency_range: FrequencyRange, concurrency: usize) {
    let _finish = Finish(shared);
    if let Some(species) = fetch_species(shared) {
        let total = species.len();
        tracing::info!("{total} species listed");
        let next = AtomicUsize::new(0);
        thread::scope(|scope| {
            for _ in 0..concurrency.min(total) {
                scope.spawn(|| worker(shared, &species, &next, frequency_range));
            }
        });
    }
}

fn fetch_species<C: CatalogClient>(shared: &Shared<C>) -> Option<Vec<CatalogEntry>> {
    let body = retrying(shared, &shared.config.species_url, || {
        shared.client.species_directory()
    });
    let body = match body {
        Ok(body) => body?,
        Err(err) => {
            tracing::error!("failed to get the species list: {err}");
            return None;
        }
    };
    match parse_species_directory(&body) {
        Ok(species) => Some(species),
        Err(err) => {
            tracing::error!("failed to read the species list: {err}");
            None
        }
    }
}

fn worker<C: CatalogClient>(
    shared: &Shared<C>,
    species: &[CatalogEntry],
    next: &AtomicUsize,
    frequency_range: FrequencyRange,
) {
    while shared.running.load(Ordering::SeqCst) {
        let Some(entry) = species.get(next.fetch_add(1, Ordering::SeqCst)) else {
            return;
        };
        let downloaded = download_entry(shared, entry, frequency_range);
        if !shared.running.load(Ordering::SeqCst) {
            return;
        }

        let mut results = lock(&shared.results);
        results.completed += 1;
        if let Some(downloaded) = downloaded {
            results.entries.push(downloaded);
        }
        let progress = Progress {
            completed: results.completed,
            remaining: species.len() - results.completed,
        };
        // Still under the results lock, so events arrive in order.
        if let Some(sink) = lock(&shared.sink).as_ref() {
            sink.event(progress);
        }
    }
}

fn download_entry<C: CatalogClient>(
    shared: &Shared<C>,
    entry: &CatalogEntry,
    frequency_range: FrequencyRange,
) -> Option<CatalogEntry> {
    let tag = entry.species_tag;
    let Some(url) = shared.config.entry_url(tag) else {
        tracing::debug!("species {tag} is published within another entry");
        return None;
    };

    let text = match retrying(shared, &url, || shared.client.entry_file(&url)) {
        Ok(text) => text?,
        Err(err) => {
            tracing::warn!("skipping species {tag}: {err}");
            return None;
        }
    };

    let lines = parse_lines(&text);
    let mut downloaded = entry.clone();
    downloaded.degrees_of_freedom = lines
        .first()
        .map_or(UNKNOWN_DEGREES_OF_FREEDOM, |line| line.degrees_of_freedom);
    downloaded.lines = lines
        .iter()
        .filter(|line| frequency_range.contains(line.frequency))
        .map(CatLine::to_line)
        .collect();
    if downloaded.lines.is_empty() {
        tracing::debug!("species {tag} has no lines in {frequency_range}");
        return None;
    }
    Some(downloaded)
}

/// Repeat `request` while it fails transiently and the download is running.
/// `Ok(None)` means the download was cancelled.
fn retrying<C, T, F>(shared: &Shared<C>, url: &str, mut request: F) -> Result<Option<T>, CatsearchError>
where
    F: FnMut() -> Result<T, CatsearchError>,
{
    loop {
        if !shared.running.load(Ordering::SeqCst) {
            return Ok(None);
        }
        match request() {
            Ok(value) => return Ok(Some(value)),
            Err(err) if err.is_transient() => {
                tracing::debug!("retrying {url}: {err}");
                thread::sleep(Duration::from_secs_f64(rand::thread_rng().gen_range(0.0..1.0)));
            }
            Err(err) => return Err(err),
        }
    }
}

/// Download the whole catalog, logging progress, and wait for it.
pub fn get_catalog<C: CatalogClient + 'static>(
    client: Arc<C>,
    config: &DownloaderConfig,
    frequency_range: FrequencyRange,
) -> Result<Vec<CatalogEntry>, CatsearchError> {
    let (sender, receiver) = std::sync::mpsc::channel();
    let mut downloader =
        Downloader::new(client, config.clone()).with_progress_sink(Arc::new(sender));
    downloader.start(frequency_range, config.concurrency)?;
    for progress in receiver {
        tracing::info!(
            "{} species processed, {} remaining",
            progress.completed,
            progress.remaining
        );
    }
    downloader.wait();
    Ok(downloader.take_catalog())
}

/// Download the catalog and save it to `path`.
pub fn save_catalog<C: CatalogClient + 'static>(
    path: &Path,
    client: Arc<C>,
    config: &DownloaderConfig,
    frequency_range: FrequencyRange,
) -> Result<Catalog, CatsearchError> {
    let entries = get_catalog(client, config, frequency_range)?;
    let catalog = Catalog::from_entries(entries, frequency_range);
    Catalog::save(path, catalog.catalog(), frequency_range, Some(Utc::now()))?;
    tracing::info!("saved {} species to {}", catalog.entries_count(), path.display());
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::mpsc;

    use assert_matches::assert_matches;

    use super::*;

    const CO_LINES: &str = concat!(
        "  115271.2018  0.0005 -5.0105 2    0.0000  3 -2850317 101 1       0\n",
        "  230538.0000  0.0005 -4.1197 2    3.8450  5 -2850317 101 2       1\n",
        "  345795.9899  0.0005 -3.6118 2   11.5350  7 -2850317 101 3       2\n",
    );

    #[derive(Default)]
    struct MockClient {
        species: Vec<i64>,
        files: HashMap<String, String>,
        transient_failures: AtomicUsize,
        delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        requests: AtomicUsize,
    }

    impl MockClient {
        fn with_species(species: &[i64]) -> Self {
            let config = DownloaderConfig::default();
            let files = species
                .iter()
                .filter_map(|tag| config.entry_url(*tag))
                .map(|url| (url, CO_LINES.to_string()))
                .collect();
            Self {
                species: species.to_vec(),
                files,
                ..Self::default()
            }
        }
    }

    impl CatalogClient for MockClient {
        fn species_directory(&self) -> Result<String, CatsearchError> {
            let species: Vec<String> = self
                .species
                .iter()
                .map(|tag| format!(r#"{{"speciestag": {tag}, "name": "species {tag}"}}"#))
                .collect();
            Ok(format!(r#"{{"species": [{}]}}"#, species.join(",")))
        }

        fn entry_file(&self, url: &str) -> Result<String, CatsearchError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            thread::sleep(self.delay);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let failures = self.transient_failures.load(Ordering::SeqCst);
            if failures > 0 {
                self.transient_failures.store(failures - 1, Ordering::SeqCst);
                return Err(CatsearchError::Connection {
                    url: url.to_string(),
                    message: "connection reset".to_string(),
                });
            }
            self.files
                .get(url)
                .cloned()
                .ok_or_else(|| CatsearchError::HttpStatus {
                    status: 404,
                    url: url.to_string(),
                })
        }
    }

    fn tags(entries: &[CatalogEntry]) -> Vec<i64> {
        let mut tags: Vec<i64> = entries.iter().map(|entry| entry.species_tag).collect();
        tags.sort();
        tags
    }

    #[test]
    fn fixture_records_keep_their_columns() {
        let lines = parse_lines(CO_LINES);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].frequency, 115271.2018);
        assert_eq!(lines[0].intensity, -5.0105);
    }

    #[test]
    fn downloads_listed_species() {
        let client = Arc::new(MockClient::with_species(&[28503, 28001, 44009]));
        let (sender, receiver) = mpsc::channel();
        let mut downloader = Downloader::new(Arc::clone(&client), DownloaderConfig::default())
            .with_progress_sink(Arc::new(sender));
        downloader
            .start(FrequencyRange::new(100000.0, 300000.0), 2)
            .unwrap();

        let events: Vec<Progress> = receiver.into_iter().collect();
        assert_eq!(downloader.wait(), DownloadState::Completed);
        assert!(!downloader.is_running());

        let entries = downloader.take_catalog();
        assert_eq!(tags(&entries), vec![28001, 28503]);
        for entry in &entries {
            assert_eq!(entry.degrees_of_freedom, 2);
            assert_eq!(entry.lines.len(), 2);
        }
        // The skipped tag never reaches the network.
        assert_eq!(client.requests.load(Ordering::SeqCst), 2);

        let completed: Vec<usize> = events.iter().map(|event| event.completed).collect();
        assert_eq!(completed, vec![1, 2, 3]);
        assert!(events.iter().all(|event| event.completed + event.remaining == 3));
    }

    #[test]
    fn entries_without_lines_in_range_are_dropped() {
        let client = Arc::new(MockClient::with_species(&[28503]));
        let entries = get_catalog(
            client,
            &DownloaderConfig::default(),
            FrequencyRange::new(1.0, 2.0),
        )
        .unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn missing_files_are_skipped() {
        let mut client = MockClient::with_species(&[28503, 18003]);
        client
            .files
            .retain(|url, _| !url.ends_with("c018003.cat"));
        let entries = get_catalog(
            Arc::new(client),
            &DownloaderConfig::default(),
            FrequencyRange::UNBOUNDED,
        )
        .unwrap();
        assert_eq!(tags(&entries), vec![28503]);
    }

    #[test]
    fn transient_failures_are_retried() {
        let client = MockClient::with_species(&[28503]);
        client.transient_failures.store(2, Ordering::SeqCst);
        let client = Arc::new(client);
        let entries = get_catalog(
            Arc::clone(&client),
            &DownloaderConfig::default(),
            FrequencyRange::UNBOUNDED,
        )
        .unwrap();
        assert_eq!(tags(&entries), vec![28503]);
        assert_eq!(entries[0].lines.len(), 3);
        assert_eq!(client.requests.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn concurrency_is_bounded() {
        let species: Vec<i64> = (1..=12).map(|n| 28000 + n).collect();
        let mut client = MockClient::with_species(&species);
        client.delay = Duration::from_millis(20);
        let client = Arc::new(client);

        let mut downloader = Downloader::new(Arc::clone(&client), DownloaderConfig::default());
        downloader.start(FrequencyRange::UNBOUNDED, 3).unwrap();
        downloader.wait();

        assert_eq!(downloader.take_catalog().len(), 12);
        let max = client.max_in_flight.load(Ordering::SeqCst);
        assert!((1..=3).contains(&max), "{max} requests in flight");
    }

    #[test]
    fn no_progress_after_stop() {
        let species: Vec<i64> = (1..=200).map(|n| 28000 + n).collect();
        let mut client = MockClient::with_species(&species);
        client.delay = Duration::from_millis(10);

        let (sender, receiver) = mpsc::channel();
        let mut downloader = Downloader::new(Arc::new(client), DownloaderConfig::default())
            .with_progress_sink(Arc::new(sender));
        downloader.start(FrequencyRange::UNBOUNDED, 2).unwrap();

        assert!(receiver.recv_timeout(Duration::from_secs(5)).is_ok());
        assert!(downloader.stop(Duration::from_secs(5)));
        assert!(!downloader.is_running());
        assert_eq!(downloader.state(), DownloadState::Cancelled);

        let delivered: Vec<Progress> = receiver.try_iter().collect();
        thread::sleep(Duration::from_millis(50));
        // The sender is gone, so the channel is closed and drained.
        assert_matches!(
            receiver.try_recv(),
            Err(mpsc::TryRecvError::Disconnected)
        );
        assert!(delivered.iter().all(|event| event.completed < 200));
        assert!(downloader.take_catalog().len() < 200);
    }

    #[test]
    fn start_twice_is_rejected() {
        let client = Arc::new(MockClient::with_species(&[]));
        let mut downloader = Downloader::new(client, DownloaderConfig::default());
        downloader.start(FrequencyRange::UNBOUNDED, 1).unwrap();
        assert_matches!(
            downloader.start(FrequencyRange::UNBOUNDED, 1),
            Err(CatsearchError::AlreadyStarted)
        );
        assert_eq!(downloader.wait(), DownloadState::Completed);
        assert!(downloader.take_catalog().is_empty());
    }

    #[test]
    fn save_catalog_writes_a_loadable_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("catalog.json.gz");
        let client = Arc::new(MockClient::with_species(&[28503, 18003]));
        let range = FrequencyRange::new(200000.0, 400000.0);

        let saved = save_catalog(&path, client, &DownloaderConfig::default(), range).unwrap();
        assert_eq!(saved.entries_count(), 2);

        let loaded = Catalog::load(&[&path]);
        assert_eq!(loaded.catalog(), saved.catalog());
        assert_eq!(loaded.frequency_limits(), &[range]);
    }
}
