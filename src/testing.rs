// Test doubles shared by unit tests

use crate::cache::{CacheBackend, CacheFuture, ResultCache};
use crate::error::EngineError;
use crate::models::input::TaskType;
use crate::models::model_info::{ModelCard, ModelDescriptor, OutputType};
use crate::models::performance::ResourceSnapshot;
use crate::models::plan::{Chunk, ChunkResult};
use crate::models::settings::EngineSettings;
use crate::performance::ResourceSampler;
use crate::pipeline::Engine;
use crate::process_manager::{ChunkOutput, HeavyBlock, InvocationContext, ModelRunner};
use crate::utils::BundleLayout;
use crate::AppState;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Runner that answers `out-<item>` under a `value` header after a per-chunk delay.
/// Heavy requests get each item's character count as int64 under a `length` dim.
#[derive(Default)]
pub struct MockRunner {
    latencies: Vec<u64>,
    failing: HashSet<String>,
    fail_all: bool,
    invocations: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    seen: Mutex<Vec<String>>,
    contexts: Mutex<Vec<InvocationContext>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay in milliseconds by chunk index, cycling when shorter than the plan
    pub fn with_latencies(mut self, latencies: Vec<u64>) -> Self {
        self.latencies = latencies;
        self
    }

    pub fn failing_on(mut self, tag: &str) -> Self {
        self.failing.insert(tag.to_string());
        self
    }

    pub fn failing_always(mut self) -> Self {
        self.fail_all = true;
        self
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Invocations currently running
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Every item handed to the model so far
    pub fn seen_items(&self) -> Vec<String> {
        self.seen.lock().clone()
    }

    pub fn contexts(&self) -> Vec<InvocationContext> {
        self.contexts.lock().clone()
    }
}

impl ModelRunner for MockRunner {
    async fn run(&self, chunk: &Chunk, ctx: InvocationContext) -> Result<ChunkOutput, EngineError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().extend(chunk.items.iter().cloned());
        self.contexts.lock().push(ctx);
        let _active = ActiveGuard::enter(&self.active, &self.max_active);

        let latency = if self.latencies.is_empty() {
            0
        } else {
            self.latencies[chunk.index % self.latencies.len()]
        };
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.fail_all || self.failing.contains(&chunk.tag) {
            return Err(EngineError::subprocess(&chunk.tag, "model exited with code 1"));
        }

        match ctx.task_type {
            TaskType::Simple => Ok(ChunkOutput::Rows(ChunkResult {
                rows: chunk.items.iter().map(|item| vec![format!("out-{}", item)]).collect(),
                header: vec!["value".to_string()],
            })),
            TaskType::Heavy => {
                let lengths: Vec<i64> = chunk.items.iter().map(|item| item.chars().count() as i64).collect();
                HeavyBlock::from_values(vec!["length".to_string()], 1, &lengths).map(ChunkOutput::Heavy)
            }
        }
    }
}

/// Counts an invocation as running until dropped, including when it is abandoned mid-flight
struct ActiveGuard<'a> {
    active: &'a AtomicUsize,
}

impl<'a> ActiveGuard<'a> {
    fn enter(active: &'a AtomicUsize, max_active: &AtomicUsize) -> Self {
        let now_active = active.fetch_add(1, Ordering::SeqCst) + 1;
        max_active.fetch_max(now_active, Ordering::SeqCst);
        Self { active }
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory key-value store that can be switched off
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
    reachable: AtomicBool,
    last_ttl: Mutex<Option<Duration>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            reachable: AtomicBool::new(true),
            last_ttl: Mutex::new(None),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn insert(&self, key: &str, value: &str) {
        self.entries.lock().insert(key.to_string(), value.to_string());
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn last_ttl(&self) -> Option<Duration> {
        *self.last_ttl.lock()
    }

    fn check(&self) -> Result<(), EngineError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(EngineError::CacheUnavailable("connection refused".to_string()))
        }
    }
}

impl CacheBackend for MemoryBackend {
    fn ping(&self) -> CacheFuture<'_, ()> {
        Box::pin(async move { self.check() })
    }

    fn get_many<'a>(&'a self, keys: &'a [String]) -> CacheFuture<'a, Vec<Option<String>>> {
        Box::pin(async move {
            self.check()?;
            let entries = self.entries.lock();
            Ok(keys.iter().map(|key| entries.get(key).cloned()).collect())
        })
    }

    fn set_many<'a>(&'a self, entries: &'a [(String, String)], ttl: Duration) -> CacheFuture<'a, ()> {
        Box::pin(async move {
            self.check()?;
            self.entries.lock().extend(entries.iter().cloned());
            *self.last_ttl.lock() = Some(ttl);
            Ok(())
        })
    }
}

/// Sampler that always reports the same figures
pub struct FixedSampler(pub ResourceSnapshot);

impl ResourceSampler for FixedSampler {
    fn snapshot(&self) -> ResourceSnapshot {
        self.0
    }
}

/// Roomy machine well under every admission ceiling
pub fn idle_snapshot() -> ResourceSnapshot {
    ResourceSnapshot {
        available_memory: 32 * 1024 * 1024 * 1024,
        total_memory: 64 * 1024 * 1024 * 1024,
        physical_cpus: 8,
        cpu_percent: 5.0,
        memory_percent: 40.0,
    }
}

pub fn descriptor(identifier: &str, output_type: OutputType, is_variable: bool) -> ModelDescriptor {
    ModelDescriptor {
        identifier: identifier.to_string(),
        output_types: vec![output_type],
        is_variable,
        on_disk_bytes: 1024 * 1024,
    }
}

/// A served model backed by the mock runner and in-memory cache
pub struct TestBundle {
    pub dir: tempfile::TempDir,
    pub runner: Arc<MockRunner>,
    pub backend: Arc<MemoryBackend>,
    pub state: Arc<AppState<MockRunner>>,
}

pub const EXAMPLE_INPUT: &str = "input\nCCO\nCCN\n";
pub const EXAMPLE_OUTPUT: &str = "input,value\nCCO,1.5\nCCN,\n";

pub fn test_bundle(output_type: &str) -> TestBundle {
    test_bundle_with(output_type, EngineSettings::default())
}

pub fn test_bundle_with(output_type: &str, settings: EngineSettings) -> TestBundle {
    test_bundle_with_runner(output_type, settings, MockRunner::new())
}

pub fn test_bundle_with_runner(output_type: &str, settings: EngineSettings, runner: MockRunner) -> TestBundle {
    let dir = tempfile::tempdir().unwrap();
    let layout = BundleLayout::new(dir.path());
    let examples = layout.example_output_path();
    std::fs::create_dir_all(examples.parent().unwrap()).unwrap();
    std::fs::write(layout.example_input_path(), EXAMPLE_INPUT).unwrap();
    std::fs::write(&examples, EXAMPLE_OUTPUT).unwrap();

    let card: ModelCard = serde_json::from_value(serde_json::json!({
        "Identifier": "eos-test",
        "Slug": "test-model",
        "Output Type": [output_type],
    }))
    .unwrap();

    let runner = Arc::new(runner);
    let backend = Arc::new(MemoryBackend::new());
    let engine = Engine::new(
        settings.clone(),
        ModelDescriptor::from_card(&card, 1024),
        runner.clone(),
        ResultCache::new(backend.clone(), settings.cache_ttl()),
        Arc::new(FixedSampler(idle_snapshot())),
        examples,
    );
    let state = Arc::new(AppState::new(settings, layout, card, engine));

    TestBundle {
        dir,
        runner,
        backend,
        state,
    }
}
