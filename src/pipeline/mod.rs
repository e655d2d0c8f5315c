// Prediction pipeline shared by the synchronous and job paths:
// cache lookup -> admission check -> plan -> dispatch -> cache write-back

use crate::cache::{CacheLookup, ResultCache};
use crate::dispatcher::Dispatcher;
use crate::error::EngineError;
use crate::file_manager::read_csv_table;
use crate::models::input::{InputItem, PipelineOptions, TaskType};
use crate::models::model_info::ModelDescriptor;
use crate::models::performance::ResourceSnapshot;
use crate::models::plan::{ChunkResult, Prediction, Row};
use crate::models::settings::EngineSettings;
use crate::performance::ResourceSampler;
use crate::planner::{PlannerThresholds, ResourcePlanner, WorkerBounds};
use crate::process_manager::{ChunkOutput, HeavyBlock, ModelRunner};
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct Engine<R: ModelRunner> {
    settings: EngineSettings,
    descriptor: ModelDescriptor,
    planner: ResourcePlanner,
    dispatcher: Dispatcher<R>,
    cache: ResultCache,
    sampler: Arc<dyn ResourceSampler>,
    example_output: PathBuf,
}

impl<R: ModelRunner> Engine<R> {
    pub fn new(
        settings: EngineSettings,
        descriptor: ModelDescriptor,
        runner: Arc<R>,
        cache: ResultCache,
        sampler: Arc<dyn ResourceSampler>,
        example_output: PathBuf,
    ) -> Self {
        let planner = ResourcePlanner::new(PlannerThresholds::from(&settings));
        let dispatcher = Dispatcher::new(runner);
        Self {
            settings,
            descriptor,
            planner,
            dispatcher,
            cache,
            sampler,
            example_output,
        }
    }

    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn snapshot(&self) -> ResourceSnapshot {
        self.sampler.snapshot()
    }

    /// Reject new work while CPU or memory usage is above the configured ceilings
    pub fn check_resources(&self, snapshot: &ResourceSnapshot) -> Result<(), EngineError> {
        if snapshot.cpu_percent > self.settings.max_cpu_percent
            || snapshot.memory_percent > self.settings.max_mem_percent
        {
            warn!(
                "Rejecting batch: cpu {:.1}%, memory {:.1}%",
                snapshot.cpu_percent, snapshot.memory_percent
            );
            return Err(EngineError::ResourceExhausted {
                cpu_percent: snapshot.cpu_percent,
                memory_percent: snapshot.memory_percent,
            });
        }
        Ok(())
    }

    /// Admission check, plan and dispatch; the output holds one row per value
    async fn execute(
        &self,
        values: Vec<String>,
        tag: &str,
        opts: &PipelineOptions,
        task_type: TaskType,
    ) -> Result<ChunkOutput, EngineError> {
        let snapshot = self.sampler.snapshot();
        self.check_resources(&snapshot)?;

        let expected = values.len();
        let bounds = WorkerBounds::new(opts.min_workers, opts.max_workers);
        let plan = self.planner.plan(values, tag, bounds, &self.descriptor, &snapshot);
        let timeout = opts
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.settings.timeout());

        let output = self.dispatcher.dispatch(plan, task_type, Some(timeout)).await?;

        if output.row_count() != expected {
            return Err(EngineError::Codec(format!(
                "model returned {} rows for {} inputs",
                output.row_count(),
                expected
            )));
        }
        Ok(output)
    }

    /// Run the model over `values`; row i of the result belongs to `values[i]`
    pub async fn compute(
        &self,
        values: Vec<String>,
        tag: &str,
        opts: &PipelineOptions,
    ) -> Result<ChunkResult, EngineError> {
        if values.is_empty() {
            return Ok(ChunkResult::default());
        }

        match self.execute(values, tag, opts, TaskType::Simple).await? {
            ChunkOutput::Rows(result) => Ok(result),
            ChunkOutput::Heavy(_) => Err(EngineError::Codec(
                "model returned a heavy buffer for a simple request".to_string(),
            )),
        }
    }

    /// Heavy pipeline: every item is computed and the model's buffer is returned as written.
    /// Heavy results never touch the cache.
    pub async fn predict_heavy(
        &self,
        items: &[InputItem],
        tag: &str,
        opts: &PipelineOptions,
    ) -> Result<HeavyBlock, EngineError> {
        if items.is_empty() {
            return Err(EngineError::EmptyData);
        }
        if opts.cache_only {
            return Err(EngineError::InvalidRequest(
                "cache-only requests cannot use heavy output".to_string(),
            ));
        }

        let started = Instant::now();
        let values = items.iter().map(|item| item.value().to_string()).collect();
        let block = match self.execute(values, tag, opts, TaskType::Heavy).await? {
            ChunkOutput::Heavy(block) => block,
            ChunkOutput::Rows(_) => {
                return Err(EngineError::Codec(
                    "model returned text rows for a heavy request".to_string(),
                ))
            }
        };
        info!(
            "Execution time for {} ({} items, heavy): {:.6}s",
            tag,
            items.len(),
            started.elapsed().as_secs_f64()
        );
        Ok(block)
    }

    /// Full pipeline: serve what the cache holds, compute the rest, merge in input order
    pub async fn predict(
        &self,
        items: &[InputItem],
        tag: &str,
        opts: &PipelineOptions,
    ) -> Result<Prediction, EngineError> {
        if items.is_empty() {
            return Err(EngineError::EmptyData);
        }

        let started = Instant::now();
        let prediction = self.predict_inner(items, tag, opts).await?;
        info!(
            "Execution time for {} ({} items): {:.6}s",
            tag,
            items.len(),
            started.elapsed().as_secs_f64()
        );
        Ok(prediction)
    }

    async fn predict_inner(
        &self,
        items: &[InputItem],
        tag: &str,
        opts: &PipelineOptions,
    ) -> Result<Prediction, EngineError> {
        let model_id = self.descriptor.identifier.as_str();
        let wants_cache =
            !self.descriptor.is_variable && (opts.fetch_cache || opts.save_cache || opts.cache_only);

        let lookup = if !wants_cache {
            None
        } else if opts.fetch_cache || opts.cache_only {
            match self.cache.lookup(model_id, items).await {
                Ok(lookup) => Some(lookup),
                Err(e) => {
                    warn!("Cache lookup failed, computing all {} items: {}", items.len(), e);
                    None
                }
            }
        } else if self.cache.is_available().await {
            Some(CacheLookup::all_misses(items.len()))
        } else {
            None
        };

        let Some(lookup) = lookup else {
            if opts.cache_only {
                debug!("Cache-only request for {} without a usable cache", tag);
                return Ok(Prediction {
                    rows: vec![None; items.len()],
                    header: self.resolve_header(None, false).await?,
                });
            }
            let values = items.iter().map(|item| item.value().to_string()).collect();
            let computed = self.compute(values, tag, opts).await?;
            let header = self.resolve_header(Some(computed.header), false).await?;
            return Ok(Prediction {
                rows: computed.rows.into_iter().map(Some).collect(),
                header,
            });
        };

        debug!(
            "Request {}: {} cached, {} to compute",
            tag,
            lookup.hits.len(),
            lookup.misses.len()
        );

        let mut rows: Vec<Option<Row>> = vec![None; items.len()];
        for (index, row) in lookup.hits {
            rows[index] = Some(row);
        }

        let mut computed_header = None;
        if !lookup.misses.is_empty() && !opts.cache_only {
            let values = lookup
                .misses
                .iter()
                .map(|&i| items[i].value().to_string())
                .collect();
            let computed = self.compute(values, tag, opts).await?;

            if opts.save_cache {
                let missed: Vec<&InputItem> = lookup.misses.iter().map(|&i| &items[i]).collect();
                if let Err(e) = self.cache.store(model_id, &missed, &computed.rows).await {
                    warn!("Failed to cache {} rows: {}", computed.rows.len(), e);
                }
            }

            for (&index, row) in lookup.misses.iter().zip(computed.rows) {
                rows[index] = Some(row);
            }
            computed_header = Some(computed.header);
        }

        let header = self.resolve_header(computed_header, opts.save_cache).await?;
        Ok(Prediction { rows, header })
    }

    /// Header precedence: computed, then cached, then the bundle's example output
    async fn resolve_header(&self, computed: Option<Vec<String>>, save: bool) -> Result<Vec<String>, EngineError> {
        let model_id = self.descriptor.identifier.as_str();
        let use_cache = !self.descriptor.is_variable;

        if let Some(header) = computed.filter(|h| !h.is_empty()) {
            if use_cache && save {
                if let Err(e) = self.cache.get_or_compute_header(model_id, Some(header.as_slice())).await {
                    warn!("Failed to cache header: {}", e);
                }
            }
            return Ok(header);
        }

        if use_cache {
            match self.cache.get_or_compute_header(model_id, None).await {
                Ok(Some(header)) => return Ok(header),
                Ok(None) => {}
                Err(e) => debug!("Cached header unavailable: {}", e),
            }
        }

        self.example_header()
    }

    fn example_header(&self) -> Result<Vec<String>, EngineError> {
        if !self.example_output.exists() {
            return Err(EngineError::Config(format!(
                "No output header available and example output {:?} is missing",
                self.example_output
            )));
        }
        let (header, _) = read_csv_table(&self.example_output)?;
        Ok(header)
    }
}
