//! Fixtures shared by the application tests: in-memory adapters, a real
//! filesystem store in a temp dir and an encoder driven by a script.

use super::cleanup::CleanupService;
use super::delivery::DeliveryService;
use super::ingest::IngestionService;
use super::worker::{WorkerService, WorkerSettings};
use crate::adapters::local::auth::TokenAuthenticator;
use crate::adapters::local::events::hub::EventHub;
use crate::adapters::local::fs::FsStore;
use crate::adapters::memory::{InMemoryCatalog, InMemoryJobQueue, InMemoryStatusTracker};
use crate::domain::addressing::{segment_name, MANIFEST_NAME};
use crate::domain::hls::{Manifest, SegmentRef};
use crate::domain::jobs::RetryPolicy;
use crate::domain::ladder::{LadderEntry, ResolutionLadder};
use crate::domain::video::{Category, NewVideo};
use crate::ports::encoder::{EncodeError, Encoder, EncodingFailure};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;

pub const VIEWER_TOKEN: &str = "viewer-token";

pub enum Step {
    Succeed,
    Fail(i32),
    MissingSource,
    /// Signal `started`, wait for `release`, then succeed.
    Block {
        started: Arc<Notify>,
        release: Arc<Notify>,
    },
}

/// Encoder that writes `segments` fake segments per rendition unless a
/// scripted step for that rendition says otherwise.
pub struct ScriptedEncoder {
    segments: u32,
    script: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedEncoder {
    pub fn new(segments: u32) -> Self {
        Self {
            segments,
            script: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, resolution: &str, step: Step) {
        self.script
            .lock()
            .unwrap()
            .entry(resolution.to_string())
            .or_default()
            .push_back(step);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn next_step(&self, resolution: &str) -> Step {
        self.script
            .lock()
            .unwrap()
            .get_mut(resolution)
            .and_then(|steps| steps.pop_front())
            .unwrap_or(Step::Succeed)
    }

    async fn write_outputs(&self, entry: &LadderEntry, output_dir: &Path) -> Manifest {
        let mut segments = Vec::new();
        for i in 0..self.segments {
            let bytes = format!("{}:{}", entry.name, i).repeat(64);
            tokio::fs::write(output_dir.join(segment_name(i)), bytes)
                .await
                .unwrap();
            let duration = if i + 1 == self.segments { 4.5 } else { 10.0 };
            segments.push(SegmentRef { index: i, duration });
        }
        let manifest = Manifest::vod(segments);
        manifest.write_to(&output_dir.join(MANIFEST_NAME)).await.unwrap();
        manifest
    }
}

#[async_trait]
impl Encoder for ScriptedEncoder {
    async fn encode(
        &self,
        source: &Path,
        entry: &LadderEntry,
        output_dir: &Path,
    ) -> Result<Manifest, EncodeError> {
        self.calls.lock().unwrap().push(entry.name.clone());
        match self.next_step(&entry.name) {
            Step::Succeed => Ok(self.write_outputs(entry, output_dir).await),
            Step::Fail(code) => Err(EncodeError::Failed(EncodingFailure {
                resolution: entry.name.clone(),
                exit_code: Some(code),
                captured_stderr: "Conversion failed!".to_string(),
            })),
            Step::MissingSource => Err(EncodeError::MissingSourceFile(source.to_path_buf())),
            Step::Block { started, release } => {
                started.notify_one();
                release.notified().await;
                Ok(self.write_outputs(entry, output_dir).await)
            }
        }
    }
}

pub struct Harness {
    pub root: TempDir,
    pub catalog: Arc<InMemoryCatalog>,
    pub tracker: Arc<InMemoryStatusTracker>,
    pub queue: Arc<InMemoryJobQueue>,
    pub store: Arc<FsStore>,
    pub hub: Arc<EventHub>,
    pub encoder: Arc<ScriptedEncoder>,
    pub ladder: Arc<ResolutionLadder>,
    pub ingest: Arc<IngestionService>,
    pub worker: Arc<WorkerService>,
    pub delivery: Arc<DeliveryService>,
    pub cleanup: Arc<CleanupService>,
}

impl Harness {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let catalog = Arc::new(InMemoryCatalog::new());
        let tracker = Arc::new(InMemoryStatusTracker::new());
        let queue = Arc::new(InMemoryJobQueue::new(Duration::from_secs(300)));
        let store = Arc::new(FsStore::new(root.path()));
        let hub = Arc::new(EventHub::new());
        let encoder = Arc::new(ScriptedEncoder::new(3));
        let ladder = Arc::new(ResolutionLadder::default());
        let auth = Arc::new(TokenAuthenticator::new([VIEWER_TOKEN]));

        let ingest = Arc::new(IngestionService::new(
            catalog.clone(),
            tracker.clone(),
            queue.clone(),
            hub.clone(),
            ladder.clone(),
        ));
        let settings = WorkerSettings {
            retry: RetryPolicy {
                max_attempts: 3,
                backoff: vec![],
            },
            poll_timeout: Duration::from_millis(10),
            heartbeat_interval: Duration::from_secs(100),
        };
        let worker = Arc::new(WorkerService::new(
            queue.clone(),
            tracker.clone(),
            store.clone(),
            encoder.clone(),
            hub.clone(),
            ladder.clone(),
            settings,
        ));
        let delivery = Arc::new(DeliveryService::new(
            auth,
            catalog.clone(),
            tracker.clone(),
            store.clone(),
            ladder.clone(),
        ));
        let cleanup = Arc::new(CleanupService::new(
            catalog.clone(),
            tracker.clone(),
            queue.clone(),
            store.clone(),
        ));

        Self {
            root,
            catalog,
            tracker,
            queue,
            store,
            hub,
            encoder,
            ladder,
            ingest,
            worker,
            delivery,
            cleanup,
        }
    }

    /// A record whose source file exists under `{root}/sources`.
    pub fn new_video(&self, file_name: &str) -> NewVideo {
        let sources = self.root.path().join("sources");
        std::fs::create_dir_all(&sources).unwrap();
        let source_path = sources.join(file_name);
        std::fs::write(&source_path, b"not really a video").unwrap();
        NewVideo {
            title: file_name.to_string(),
            description: "test upload".to_string(),
            category: Category::Documentary,
            source_path,
            thumbnail_path: None,
        }
    }

    /// Process jobs until the queue has nothing visible.
    pub async fn drain(&self) -> usize {
        let mut processed = 0;
        while self.worker.run_once(0).await.unwrap() {
            processed += 1;
        }
        processed
    }
}
