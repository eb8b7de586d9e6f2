use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::walker::{scan_entries, test_extraction_rules};
use super::{
    ScanCompletedData, ScanError, ScanProgressData, ScanQueue, ScannerDefinition,
    ScannerRegistry, SkippedScan,
};
use crate::events::{EventBus, LibraryEvent};
use crate::extractor::{EntityEntry, ExtractionTestResult, NameExtractionRule};
use crate::library::{AddOptions, Adder, ExistingReason};
use crate::metrics;
use crate::phash::{PhashConfig, PhashInput, PhashMatcher};
use crate::scraper::{ContentType, GetMetadataOptions, ScraperLookup, Scrapers};

const ICON_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "bmp", "gif", "ico", "webp"];

/// Collaborators a scan needs.
#[derive(Clone)]
pub struct ScanContext {
    pub registry: Arc<ScannerRegistry>,
    pub scrapers: Arc<Scrapers>,
    pub adder: Arc<Adder>,
    pub matcher: Arc<PhashMatcher>,
    pub events: EventBus,
    pub phash: PhashConfig,
}

/// Result of scanning every registered scanner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanAllReport {
    pub completed: BTreeMap<String, ScanCompletedData>,
    /// Scanners whose run failed as a whole, with the error message.
    pub errors: BTreeMap<String, String>,
}

enum CandidateOutcome {
    Added(String),
    Existing { reason: ExistingReason, id: String },
}

/// Executes scans; owned by the worker.
struct ScanRunner {
    ctx: ScanContext,
    active: RwLock<BTreeMap<String, ScanProgressData>>,
}

impl ScanRunner {
    async fn run(&self, scanner_id: &str) -> Result<ScanCompletedData, ScanError> {
        let Some(definition) = self.ctx.registry.get(scanner_id).await else {
            let err = ScanError::ScannerNotFound(scanner_id.to_string());
            self.ctx.events.emit(LibraryEvent::ScannerError {
                scanner_id: scanner_id.to_string(),
                error: err.to_string(),
            });
            return Err(err);
        };

        let started_at = Utc::now();
        let timer = Instant::now();
        info!(scanner_id = %scanner_id, path = %definition.path.display(), "Scan started");
        self.active.write().await.insert(
            scanner_id.to_string(),
            ScanProgressData::new(scanner_id, started_at),
        );
        self.ctx.events.emit(LibraryEvent::ScannerStarted {
            scanner_id: scanner_id.to_string(),
            started_at,
        });

        let result = self.scan(&definition, started_at).await;

        self.active.write().await.remove(scanner_id);
        metrics::SCAN_DURATION
            .with_label_values(&[scanner_id])
            .observe(timer.elapsed().as_secs_f64());

        match &result {
            Ok(done) => {
                metrics::SCANS_TOTAL.with_label_values(&["completed"]).inc();
                info!(
                    scanner_id = %scanner_id,
                    processed = done.processed_count,
                    new = done.new_count,
                    skipped = done.skipped_count,
                    failed = done.failed_count,
                    "Scan completed"
                );
                self.ctx
                    .events
                    .emit(LibraryEvent::ScannerCompleted(done.clone()));
            }
            Err(e) => {
                metrics::SCANS_TOTAL.with_label_values(&["failed"]).inc();
                error!(scanner_id = %scanner_id, error = %e, "Scan failed");
                self.ctx.events.emit(LibraryEvent::ScannerError {
                    scanner_id: scanner_id.to_string(),
                    error: e.to_string(),
                });
            }
        }
        result
    }

    async fn scan(
        &self,
        definition: &ScannerDefinition,
        started_at: DateTime<Utc>,
    ) -> Result<ScanCompletedData, ScanError> {
        let root = definition.path.clone();
        let options = definition.options();
        let items = tokio::task::spawn_blocking(move || {
            scan_entries(&root, &options).map(|entries| entries.collect::<Vec<_>>())
        })
        .await
        .map_err(|e| ScanError::Io {
            path: definition.path.display().to_string(),
            reason: e.to_string(),
        })??;

        let mut progress = ScanProgressData::new(&definition.id, started_at);
        progress.total_count = items.len();
        self.publish(&progress).await;

        let mut new_ids = Vec::new();
        for item in items {
            let entry = match item {
                Ok(entry) => entry,
                Err(e) => {
                    let path = match &e {
                        ScanError::Io { path, .. } => path.clone(),
                        _ => definition.path.display().to_string(),
                    };
                    warn!(scanner_id = %definition.id, path = %path, error = %e, "Walk error");
                    metrics::SCAN_CANDIDATES.with_label_values(&["failed"]).inc();
                    progress.record_failed(path, e.to_string());
                    self.publish(&progress).await;
                    continue;
                }
            };

            let path = entry.path.display().to_string();
            progress.current_path = Some(path.clone());
            match self.process_candidate(definition, &entry).await {
                Ok(CandidateOutcome::Added(id)) => {
                    metrics::SCAN_CANDIDATES.with_label_values(&["new"]).inc();
                    progress.record_new();
                    new_ids.push(id);
                }
                Ok(CandidateOutcome::Existing { reason, id }) => {
                    metrics::SCAN_CANDIDATES.with_label_values(&["skipped"]).inc();
                    debug!(path = %path, reason = reason.as_str(), id = %id, "Candidate already in library");
                    progress.record_skipped(SkippedScan {
                        path,
                        name: entry.extracted_name.clone(),
                        reason,
                        existing_id: id,
                    });
                }
                Err(e) => {
                    metrics::SCAN_CANDIDATES.with_label_values(&["failed"]).inc();
                    warn!(path = %path, error = %e, "Candidate failed");
                    progress.record_failed(path, e.to_string());
                }
            }
            self.publish(&progress).await;
        }

        progress.current_path = None;
        Ok(progress.complete(new_ids, Utc::now()))
    }

    async fn publish(&self, progress: &ScanProgressData) {
        self.active
            .write()
            .await
            .insert(progress.scanner_id.clone(), progress.clone());
        self.ctx
            .events
            .emit(LibraryEvent::ScannerProgress(progress.clone()));
    }

    async fn process_candidate(
        &self,
        definition: &ScannerDefinition,
        entry: &EntityEntry,
    ) -> Result<CandidateOutcome, ScanError> {
        let library = self.ctx.adder.library();
        if let Some(id) = library.find_game_by_path(&entry.path)? {
            return Ok(CandidateOutcome::Existing {
                reason: ExistingReason::Path,
                id,
            });
        }

        let mut lookup = ScraperLookup::by_name(entry.extracted_name.trim());
        let spec = self.ctx.phash.index_spec(ContentType::Game);
        let mut icon_hash = None;
        if definition.icon_match && entry.is_dir {
            let icons = icon_candidates(&entry.path).await?;
            if !icons.is_empty() {
                let batch = self
                    .ctx
                    .matcher
                    .find_best_match(&spec, icons, definition.max_phash_distance)
                    .await?;
                for failure in &batch.failures {
                    debug!(file = %failure.file_path, error = %failure.error, "Icon not hashed");
                }
                match batch.best {
                    Some(best) => {
                        icon_hash = Some(best.input_phash);
                        for (source, value) in best.record.external_ids {
                            lookup.known_ids.entry(source).or_insert(value);
                        }
                        if lookup.name.is_empty() {
                            lookup.name = best.record.name;
                        }
                    }
                    None => icon_hash = batch.hashes.first().map(|h| h.hash),
                }
            }
        }

        if !lookup.known_ids.is_empty() {
            if let Some(id) = library.find_by_external_ids(ContentType::Game, &lookup.known_ids)? {
                return Ok(CandidateOutcome::Existing {
                    reason: ExistingReason::ExternalId,
                    id,
                });
            }
        }

        if lookup.name.is_empty() {
            return Err(ScanError::NoMatch(entry.original_name.clone()));
        }

        let metadata = self
            .ctx
            .scrapers
            .resolver(ContentType::Game)
            .get_metadata(&definition.profile_id, &lookup, &GetMetadataOptions::default())
            .await?
            .ok_or_else(|| ScanError::NoMatch(lookup.name.clone()))?;

        let options = AddOptions {
            path: Some(entry.path.clone()),
            icon_phash: icon_hash,
            download_assets: true,
        };
        let result = self.ctx.adder.add_game(&metadata, &options).await?;
        if result.is_new {
            if icon_hash.is_some() {
                self.ctx.matcher.invalidate(&spec.name).await;
            }
            return Ok(CandidateOutcome::Added(result.id));
        }
        Ok(CandidateOutcome::Existing {
            reason: result.existing_reason.unwrap_or(ExistingReason::Name),
            id: result.id,
        })
    }
}

/// Image files directly inside `dir`, in name order.
async fn icon_candidates(dir: &Path) -> Result<Vec<PhashInput>, ScanError> {
    let io_error = |e: std::io::Error| ScanError::Io {
        path: dir.display().to_string(),
        reason: e.to_string(),
    };
    let mut read_dir = tokio::fs::read_dir(dir).await.map_err(io_error)?;
    let mut paths: Vec<PathBuf> = Vec::new();
    while let Some(item) = read_dir.next_entry().await.map_err(io_error)? {
        let path = item.path();
        let is_image = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| ICON_EXTENSIONS.contains(&ext.as_str()));
        if is_image && item.file_type().await.map_err(io_error)?.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths.into_iter().map(PhashInput::Path).collect())
}

/// Runs scans one at a time and schedules periodic ones.
pub struct ScannerService {
    runner: Arc<ScanRunner>,
    queue: Arc<ScanQueue>,
    schedules: Mutex<HashMap<String, JoinHandle<()>>>,
    running: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl ScannerService {
    pub fn new(ctx: ScanContext, queue_capacity: usize) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            runner: Arc::new(ScanRunner {
                ctx,
                active: RwLock::new(BTreeMap::new()),
            }),
            queue: Arc::new(ScanQueue::new(queue_capacity)),
            schedules: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    pub fn registry(&self) -> &Arc<ScannerRegistry> {
        &self.runner.ctx.registry
    }

    /// Spawn the scan worker.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Scan worker already running");
            return;
        }
        let Some(mut rx) = self.queue.take_receiver() else {
            self.running.store(false, Ordering::SeqCst);
            warn!("Scan worker cannot be restarted");
            return;
        };

        let runner = Arc::clone(&self.runner);
        let queue = Arc::clone(&self.queue);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Scan worker started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Scan worker received shutdown signal");
                        break;
                    }
                    request = rx.recv() => {
                        let Some(request) = request else {
                            break;
                        };
                        queue.mark_started(&request.scanner_id);
                        let result = runner.run(&request.scanner_id).await;
                        if let Some(reply) = request.reply {
                            let _ = reply.send(result);
                        }
                    }
                }
            }
            info!("Scan worker stopped");
        });
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the worker and every schedule. A running scan finishes first.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(());
        for (_, handle) in self.schedules.lock().unwrap().drain() {
            handle.abort();
        }
    }

    /// Queue a scan and wait for its result.
    pub async fn scan_scanner(&self, scanner_id: &str) -> Result<ScanCompletedData, ScanError> {
        if self.registry().get(scanner_id).await.is_none() {
            return Err(ScanError::ScannerNotFound(scanner_id.to_string()));
        }
        self.queue.request(scanner_id).await
    }

    /// Queue every scanner in id order and wait for all of them.
    pub async fn scan_all(&self) -> ScanAllReport {
        let ids = self.registry().ids().await;
        let results = join_all(ids.iter().map(|id| self.queue.request(id))).await;

        let mut report = ScanAllReport::default();
        for (id, result) in ids.into_iter().zip(results) {
            match result {
                Ok(done) => {
                    report.completed.insert(id, done);
                }
                Err(e) => {
                    report.errors.insert(id, e.to_string());
                }
            }
        }
        report
    }

    /// Start the periodic timer for a scanner. Returns false when its
    /// interval is 0, which also clears any existing timer.
    pub async fn schedule(&self, scanner_id: &str) -> Result<bool, ScanError> {
        let definition = self
            .registry()
            .get(scanner_id)
            .await
            .ok_or_else(|| ScanError::ScannerNotFound(scanner_id.to_string()))?;

        self.unschedule(scanner_id);
        if definition.interval_minutes == 0 {
            debug!(scanner_id = %scanner_id, "Scheduling disabled");
            return Ok(false);
        }

        let secs = definition.interval_minutes.checked_mul(60).ok_or_else(|| {
            ScanError::InvalidDefinition(format!(
                "scanner '{}' interval is too large",
                scanner_id
            ))
        })?;
        let period = Duration::from_secs(secs);
        let queue = Arc::clone(&self.queue);
        let id = scanner_id.to_string();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match queue.request_scheduled(&id).await {
                    Ok(true) => debug!(scanner_id = %id, "Scheduled scan queued"),
                    Ok(false) => {}
                    Err(e) => {
                        warn!(scanner_id = %id, error = %e, "Stopping schedule");
                        break;
                    }
                }
            }
        });

        self.schedules
            .lock()
            .unwrap()
            .insert(scanner_id.to_string(), handle);
        info!(scanner_id = %scanner_id, minutes = definition.interval_minutes, "Scanner scheduled");
        Ok(true)
    }

    /// Cancel a scanner's timer. Returns whether one existed.
    pub fn unschedule(&self, scanner_id: &str) -> bool {
        match self.schedules.lock().unwrap().remove(scanner_id) {
            Some(handle) => {
                handle.abort();
                info!(scanner_id = %scanner_id, "Scanner unscheduled");
                true
            }
            None => false,
        }
    }

    pub fn scheduled_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.schedules.lock().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Schedule every scanner with a non-zero interval.
    pub async fn schedule_all(&self) -> Result<usize, ScanError> {
        let mut count = 0;
        for id in self.registry().ids().await {
            if self.schedule(&id).await? {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Latest snapshot of every running scan.
    pub async fn get_active_scans(&self) -> Vec<ScanProgressData> {
        self.runner.active.read().await.values().cloned().collect()
    }

    pub fn queued_scans(&self) -> Vec<String> {
        self.queue.queued_ids()
    }

    /// Insert or replace a scanner, re-arming its timer if it had one.
    pub async fn upsert_scanner(&self, definition: ScannerDefinition) -> Result<bool, ScanError> {
        let id = definition.id.clone();
        let replaced = self.registry().upsert(definition).await?;
        if self.unschedule(&id) {
            self.schedule(&id).await?;
        }
        Ok(replaced)
    }

    pub async fn remove_scanner(&self, scanner_id: &str) -> Option<ScannerDefinition> {
        self.unschedule(scanner_id);
        self.registry().remove(scanner_id).await
    }

    pub async fn test_extraction_rules(
        &self,
        path: PathBuf,
        entity_depth: usize,
        rules: Vec<NameExtractionRule>,
    ) -> Result<Vec<ExtractionTestResult>, ScanError> {
        let display = path.display().to_string();
        tokio::task::spawn_blocking(move || test_extraction_rules(&path, entity_depth, &rules))
            .await
            .map_err(|e| ScanError::Io {
                path: display,
                reason: e.to_string(),
            })?
    }
}

impl Drop for ScannerService {
    fn drop(&mut self) {
        if let Ok(mut schedules) = self.schedules.lock() {
            for (_, handle) in schedules.drain() {
                handle.abort();
            }
        }
    }
}
