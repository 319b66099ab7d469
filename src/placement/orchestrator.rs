//! Batch placement orchestrator
//!
//! Requests are grouped, ordered by priority and processed in windows of
//! `max_concurrent`. Each window is searched in parallel against the index as
//! it stood at the start of the window; results are then committed one at a
//! time, re-checked against the live index and searched again on conflict.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use rayon::prelude::*;
use tokio::sync::mpsc;

use super::config::PlacementConfig;
use super::observer::{ChannelObserver, PlacementEvent, PlacementObserver};
use super::provider::{ModelHandle, ModelProvider};
use super::report::{BatchReport, PlacementStats};
use super::request::{ObjectBounds, PlacedObjectRecord, PlacementRequest, group_requests};
use super::rules::RuleSet;
use super::search::{PlacedTransform, PlacementSearch, SearchOutcome, request_rng};
use super::spatial::{MIN_CELL_SIZE, SpatialEntry, SpatialIndex};
use crate::core::Error;
use crate::core::types::Result;
use crate::terrain::TerrainQuery;

/// Offsets separating RNG streams of conflict re-searches and single placements
/// from first searches
const RETRY_STREAM: u64 = 1 << 32;
const SINGLE_STREAM: u64 = 2 << 32;

/// Cooperative cancellation flag shared with whoever drives a batch
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Result of one [`BatchRun::step`]
#[derive(Clone, Debug, PartialEq)]
pub enum StepStatus {
    Pending { processed: usize, remaining: usize },
    Complete(BatchReport),
}

#[derive(Clone, Debug)]
struct QueuedRequest {
    /// Position in priority order; seeds the request's RNG
    seq: u64,
    request: PlacementRequest,
    bounds: ObjectBounds,
    provider_failure: Option<String>,
}

/// A batch in progress, advanced with [`BatchRun::step`]
#[derive(Debug)]
pub struct BatchRun {
    queue: VecDeque<QueuedRequest>,
    report: BatchReport,
    records_start: usize,
    started: Instant,
    deadline: Option<Instant>,
    cancel: CancelToken,
    seed: u64,
    done: bool,
}

impl BatchRun {
    /// Process up to `yield_every` requests
    pub fn step<T: TerrainQuery>(
        &mut self,
        orchestrator: &mut PlacementOrchestrator<T>,
        observer: &mut dyn PlacementObserver,
    ) -> StepStatus {
        orchestrator.step_run(self, observer)
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    pub fn report(&self) -> &BatchReport {
        &self.report
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Stop on cancellation or timeout, abandoning whatever is still queued
    fn interrupted(&mut self) -> bool {
        if self.report.cancelled || self.report.timed_out {
            return true;
        }
        if self.cancel.is_cancelled() {
            log::warn!("Placement batch cancelled with {} requests left", self.queue.len());
            self.report.cancelled = true;
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            log::warn!("Placement batch timed out with {} requests left", self.queue.len());
            self.report.timed_out = true;
        } else {
            return false;
        }
        self.report.abandoned += self.queue.len();
        self.queue.clear();
        true
    }
}

fn search_queued(search: &PlacementSearch<'_>, seed: u64, queued: &QueuedRequest) -> SearchOutcome {
    if let Some(reason) = &queued.provider_failure {
        return SearchOutcome::failed(Error::ProviderFailure {
            object_type: queued.request.object_type.clone(),
            reason: reason.clone(),
        });
    }
    if let Err(e) = queued.request.validate() {
        return SearchOutcome::failed(e);
    }
    search.search(&queued.request, queued.bounds, &mut request_rng(seed, queued.seq))
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Owns the placement state for one terrain
pub struct PlacementOrchestrator<T: TerrainQuery> {
    terrain: T,
    rules: RuleSet,
    config: PlacementConfig,
    index: SpatialIndex,
    records: Vec<PlacedObjectRecord>,
    stats: PlacementStats,
    next_id: u64,
}

impl<T: TerrainQuery> PlacementOrchestrator<T> {
    /// Create an orchestrator; the index cell size comes from the config or the terrain extent
    pub fn new(terrain: T, rules: RuleSet, config: PlacementConfig) -> Self {
        let index = match config.cell_size {
            Some(size) => SpatialIndex::new(size),
            None => terrain
                .extent()
                .map(SpatialIndex::for_extent)
                .unwrap_or_else(|| SpatialIndex::new(MIN_CELL_SIZE)),
        };
        log::debug!("Placement index cell size {:.1}", index.cell_size());
        Self {
            terrain,
            rules,
            config,
            index,
            records: Vec::new(),
            stats: PlacementStats::default(),
            next_id: 1,
        }
    }

    pub fn terrain(&self) -> &T {
        &self.terrain
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn config(&self) -> &PlacementConfig {
        &self.config
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    /// Every object placed since creation or the last `clear`
    pub fn records(&self) -> &[PlacedObjectRecord] {
        &self.records
    }

    pub fn stats(&self) -> &PlacementStats {
        &self.stats
    }

    /// Forget all placed objects and statistics
    pub fn clear(&mut self) {
        self.records.clear();
        self.index.clear();
        self.stats.clear();
    }

    /// Place one object right away, outside any batch.
    ///
    /// Unlike batch placement, a desired position off the terrain is rejected
    /// up front instead of being searched around.
    pub fn place_one(&mut self, request: PlacementRequest) -> Result<PlacedObjectRecord> {
        request.validate()?;
        let p = request.desired_position;
        if !self.terrain.is_within_bounds(p) {
            return Err(Error::OutOfBounds { x: p.x, z: p.y });
        }

        let bounds = request.bounds;
        let outcome = {
            let search = PlacementSearch::new(&self.terrain, &self.index, &self.rules, &self.config);
            search.search(&request, bounds, &mut request_rng(self.config.seed, self.next_id.wrapping_add(SINGLE_STREAM)))
        };
        self.stats.total_attempts += outcome.attempts as u64;
        match outcome.result {
            Ok(transform) => Ok(self.insert_record(request, bounds, &transform, outcome.attempts).clone()),
            Err(e) => {
                self.stats.record_failed(&request.object_type);
                Err(e)
            }
        }
    }

    /// Group, order and queue `requests`
    pub fn start_batch(&mut self, requests: Vec<PlacementRequest>, cancel: CancelToken) -> BatchRun {
        let total = requests.len();
        let groups = group_requests(requests);
        log::debug!("Queued {} placement requests in {} groups", total, groups.len());

        let queue = groups
            .into_iter()
            .flat_map(|g| g.members)
            .enumerate()
            .map(|(seq, request)| QueuedRequest {
                seq: seq as u64,
                bounds: request.bounds,
                request,
                provider_failure: None,
            })
            .collect();

        let started = Instant::now();
        BatchRun {
            queue,
            report: BatchReport::new(total),
            records_start: self.records.len(),
            started,
            deadline: self.config.batch_timeout().map(|t| started + t),
            cancel,
            seed: self.config.seed,
            done: false,
        }
    }

    /// Place a whole batch synchronously
    pub fn place_batch(&mut self, requests: Vec<PlacementRequest>, observer: &mut dyn PlacementObserver) -> BatchReport {
        let mut run = self.start_batch(requests, CancelToken::new());
        loop {
            if let StepStatus::Complete(report) = run.step(self, &mut *observer) {
                return report;
            }
        }
    }

    /// Place a batch, yielding to the runtime between steps
    pub async fn place_batch_async<O: PlacementObserver + Send>(
        &mut self,
        requests: Vec<PlacementRequest>,
        observer: &mut O,
        cancel: CancelToken,
    ) -> BatchReport {
        let run = self.start_batch(requests, cancel);
        self.drive(run, observer).await
    }

    /// Resolve a model for each distinct object type, then place the batch.
    ///
    /// Model bounds replace request bounds. A failed lookup fails every request
    /// of that type.
    pub async fn place_batch_with_provider<P: ModelProvider, O: PlacementObserver + Send>(
        &mut self,
        requests: Vec<PlacementRequest>,
        provider: &P,
        observer: &mut O,
        cancel: CancelToken,
    ) -> BatchReport {
        let mut models: HashMap<String, std::result::Result<ModelHandle, String>> = HashMap::new();
        for request in &requests {
            if cancel.is_cancelled() {
                break;
            }
            if models.contains_key(&request.object_type) {
                continue;
            }
            let resolved = provider
                .model_for(&request.object_type, &request.description)
                .await
                .map_err(|e| match e {
                    Error::ProviderFailure { reason, .. } => reason,
                    other => other.to_string(),
                });
            match &resolved {
                Ok(handle) => log::debug!("Resolved '{}' to model {} ({})", request.object_type, handle.id, handle.name),
                Err(reason) => log::warn!("Model lookup for '{}' failed: {}", request.object_type, reason),
            }
            models.insert(request.object_type.clone(), resolved);
        }

        let mut run = self.start_batch(requests, cancel);
        for queued in run.queue.iter_mut() {
            match models.get(&queued.request.object_type) {
                Some(Ok(handle)) => {
                    if let Some(bounds) = handle.bounds {
                        queued.bounds = bounds;
                    }
                }
                Some(Err(reason)) => queued.provider_failure = Some(reason.clone()),
                None => {}
            }
        }
        self.drive(run, observer).await
    }

    async fn drive<O: PlacementObserver + Send>(&mut self, mut run: BatchRun, observer: &mut O) -> BatchReport {
        loop {
            match run.step(self, &mut *observer) {
                StepStatus::Complete(report) => return report,
                StepStatus::Pending { .. } => tokio::task::yield_now().await,
            }
        }
    }

    fn step_run(&mut self, run: &mut BatchRun, observer: &mut dyn PlacementObserver) -> StepStatus {
        if run.done {
            return StepStatus::Complete(run.report.clone());
        }

        let budget = self.config.yield_every.max(1);
        let window_size = self.config.max_concurrent.max(1);
        let mut processed = 0;

        while processed < budget && !run.queue.is_empty() {
            if run.interrupted() {
                break;
            }
            let take = window_size.min(budget - processed).min(run.queue.len());
            let window: Vec<QueuedRequest> = run.queue.drain(..take).collect();

            let outcomes: Vec<SearchOutcome> = {
                let search = PlacementSearch::new(&self.terrain, &self.index, &self.rules, &self.config);
                let seed = run.seed;
                window.par_iter().map(|q| search_queued(&search, seed, q)).collect()
            };

            let mut pending = window.into_iter().zip(outcomes);
            while let Some((queued, outcome)) = pending.next() {
                self.commit(run, queued, outcome, observer);
                processed += 1;
                if run.interrupted() {
                    run.report.abandoned += pending.count();
                    break;
                }
            }
        }

        if run.queue.is_empty() || run.report.cancelled || run.report.timed_out {
            self.finish_run(run, observer);
            StepStatus::Complete(run.report.clone())
        } else {
            StepStatus::Pending { processed, remaining: run.queue.len() }
        }
    }

    fn commit(
        &mut self,
        run: &mut BatchRun,
        queued: QueuedRequest,
        outcome: SearchOutcome,
        observer: &mut dyn PlacementObserver,
    ) {
        let (result, attempts) = {
            let search = PlacementSearch::new(&self.terrain, &self.index, &self.rules, &self.config);
            let conflict = match &outcome.result {
                Ok(transform) => !search.still_valid(&queued.request, queued.bounds, transform),
                Err(_) => false,
            };
            if conflict {
                log::debug!("'{}' conflicts with an object placed in the same window, searching again",
                    queued.request.object_type);
                let mut rng = request_rng(run.seed, queued.seq.wrapping_add(RETRY_STREAM));
                let retry = search.search(&queued.request, queued.bounds, &mut rng);
                (retry.result, outcome.attempts + retry.attempts)
            } else {
                (outcome.result, outcome.attempts)
            }
        };

        run.report.total_attempts += attempts as u64;
        self.stats.total_attempts += attempts as u64;
        let request = queued.request;

        match result {
            Ok(transform) => {
                let record = self.insert_record(request, queued.bounds, &transform, attempts);
                run.report.placed += 1;
                observer.on_object_placed(record);
                observer.on_progress(run.report.placed, run.report.total);
            }
            Err(err) => {
                log::debug!("Failed to place '{}': {}", request.object_type, err);
                run.report.record_failure(&request.object_type, err.kind());
                self.stats.record_failed(&request.object_type);
                observer.on_placement_failed(&request.object_type, &err);
            }
        }
    }

    fn insert_record(
        &mut self,
        request: PlacementRequest,
        bounds: ObjectBounds,
        transform: &PlacedTransform,
        attempts: u32,
    ) -> &PlacedObjectRecord {
        let record = PlacedObjectRecord {
            id: self.next_id,
            object_type: request.object_type,
            world_position: transform.position,
            rotation: transform.rotation,
            scale: transform.scale,
            bounds_extents: bounds.half_extents * transform.scale,
            confidence: request.confidence,
            group_id: request.group_id,
            attempts,
            placed_at_ms: unix_millis(),
        };
        self.next_id += 1;
        log::debug!("Placed '{}' #{} at ({:.1}, {:.1}, {:.1}) after {} attempts",
            record.object_type, record.id,
            record.world_position.x, record.world_position.y, record.world_position.z,
            attempts);

        self.index.insert(SpatialEntry::from(&record));
        self.stats.record_placed(&record.object_type);
        self.records.push(record);
        &self.records[self.records.len() - 1]
    }

    fn finish_run(&mut self, run: &mut BatchRun, observer: &mut dyn PlacementObserver) {
        run.done = true;
        run.report.finish(run.started.elapsed());
        self.stats.batches += 1;

        let report = &run.report;
        log::info!(
            "Placed {}/{} objects in {:.1}ms ({} failed, {} abandoned, {:.2} attempts per success)",
            report.placed,
            report.total,
            report.elapsed.as_secs_f64() * 1000.0,
            report.failed,
            report.abandoned,
            report.attempts_per_success,
        );
        for (object_type, count) in &report.failures_by_type {
            log::info!("  {}: {} failed", object_type, count);
        }

        let records = self.records.get(run.records_start..).unwrap_or(&[]);
        observer.on_batch_complete(records, report);
    }
}

impl<T: TerrainQuery + 'static> PlacementOrchestrator<T> {
    /// Run a batch on the tokio runtime, streaming events over a channel.
    ///
    /// The orchestrator is handed back with the report when the task finishes.
    pub fn spawn_batch(
        mut self,
        requests: Vec<PlacementRequest>,
        cancel: CancelToken,
    ) -> (tokio::task::JoinHandle<(Self, BatchReport)>, mpsc::UnboundedReceiver<PlacementEvent>) {
        let (mut observer, rx) = ChannelObserver::channel();
        let handle = tokio::spawn(async move {
            let report = self.place_batch_async(requests, &mut observer, cancel).await;
            (self, report)
        });
        (handle, rx)
    }
}
