// Chunk dispatch and ordered aggregation
// Results are placed by chunk index, never by completion order

use crate::error::EngineError;
use crate::models::input::TaskType;
use crate::models::plan::{Chunk, ChunkResult, ExecutionMode, ExecutionPlan};
use crate::process_manager::{ChunkOutput, InvocationContext, ModelRunner};
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub struct Dispatcher<R: ModelRunner> {
    runner: Arc<R>,
}

impl<R: ModelRunner> Dispatcher<R> {
    pub fn new(runner: Arc<R>) -> Self {
        Self { runner }
    }

    /// Execute every chunk of the plan and concatenate results in chunk order.
    /// `timeout` bounds the whole aggregation; on expiry every in-flight invocation is dropped,
    /// which kills its model process.
    pub async fn dispatch(
        &self,
        plan: ExecutionPlan,
        task_type: TaskType,
        timeout: Option<Duration>,
    ) -> Result<ChunkOutput, EngineError> {
        let chunk_count = plan.chunks.len();
        let mode = plan.mode;
        let work = self.run_chunks(plan, task_type);

        let outputs = match timeout {
            Some(bound) => tokio::time::timeout(bound, work).await.map_err(|_| {
                warn!("Aggregation timed out after {:?}, abandoning in-flight chunks", bound);
                EngineError::Timeout(bound)
            })??,
            None => work.await?,
        };

        debug!("Dispatched {} chunks in {:?} mode", chunk_count, mode);
        merge_chunk_outputs(outputs)
    }

    async fn run_chunks(&self, plan: ExecutionPlan, task_type: TaskType) -> Result<Vec<ChunkOutput>, EngineError> {
        let ctx = InvocationContext {
            worker_count: plan.worker_count,
            task_type,
            mode: plan.mode,
        };

        match plan.mode {
            ExecutionMode::Sequential => {
                let mut outputs = Vec::with_capacity(plan.chunks.len());
                for chunk in &plan.chunks {
                    outputs.push(self.runner.run(chunk, ctx).await?);
                }
                Ok(outputs)
            }
            ExecutionMode::Thread | ExecutionMode::Process => self.run_pool(plan.chunks, plan.worker_count, ctx).await,
        }
    }

    /// One task per chunk, at most `worker_count` of them holding a permit at a time.
    /// Returning early drops the set, which aborts every remaining task.
    async fn run_pool(
        &self,
        chunks: Vec<Chunk>,
        worker_count: usize,
        ctx: InvocationContext,
    ) -> Result<Vec<ChunkOutput>, EngineError> {
        let total = chunks.len();
        let permits = Arc::new(Semaphore::new(worker_count.max(1)));
        let mut tasks = JoinSet::new();

        for (slot, chunk) in chunks.into_iter().enumerate() {
            let runner = Arc::clone(&self.runner);
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let result = async {
                    let _permit = permits.acquire_owned().await.map_err(|_| pool_error("worker pool closed"))?;
                    runner.run(&chunk, ctx).await
                }
                .await;
                (slot, result)
            });
        }

        let mut slots: Vec<Option<ChunkOutput>> = vec![None; total];
        while let Some(joined) = tasks.join_next().await {
            let (slot, result) = joined.map_err(|e| pool_error(&format!("chunk task failed: {}", e)))?;
            match result {
                Ok(output) => slots[slot] = Some(output),
                Err(e) => {
                    warn!("Chunk {} failed, aborting batch: {}", slot, e);
                    return Err(e);
                }
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| slot.ok_or_else(|| EngineError::Codec(format!("chunk {} produced no result", index))))
            .collect()
    }
}

fn pool_error(message: &str) -> EngineError {
    EngineError::Io(std::io::Error::new(std::io::ErrorKind::Other, message.to_string()))
}

/// Join chunk outputs in order. Text and heavy outputs never mix within one request.
pub fn merge_chunk_outputs(outputs: Vec<ChunkOutput>) -> Result<ChunkOutput, EngineError> {
    let mut iter = outputs.into_iter();
    let Some(first) = iter.next() else {
        return Ok(ChunkOutput::Rows(ChunkResult::default()));
    };

    match first {
        ChunkOutput::Rows(first) => {
            let mut results = vec![first];
            for (offset, output) in iter.enumerate() {
                match output {
                    ChunkOutput::Rows(result) => results.push(result),
                    ChunkOutput::Heavy(_) => return Err(mixed_outputs(offset + 1)),
                }
            }
            merge_chunk_results(results).map(ChunkOutput::Rows)
        }
        ChunkOutput::Heavy(mut merged) => {
            for (offset, output) in iter.enumerate() {
                match output {
                    ChunkOutput::Heavy(block) => merged.append(block, offset + 1)?,
                    ChunkOutput::Rows(_) => return Err(mixed_outputs(offset + 1)),
                }
            }
            Ok(ChunkOutput::Heavy(merged))
        }
    }
}

fn mixed_outputs(chunk: usize) -> EngineError {
    EngineError::Codec(format!("chunk {} returned a different output kind than chunk 0", chunk))
}

/// Concatenate in chunk order. Chunk 0's header is canonical; any other non-empty header
/// must match it.
pub fn merge_chunk_results(results: Vec<ChunkResult>) -> Result<ChunkResult, EngineError> {
    let mut iter = results.into_iter();
    let Some(first) = iter.next() else {
        return Ok(ChunkResult::default());
    };

    let mut merged = first;
    for (offset, chunk) in iter.enumerate() {
        if !chunk.header.is_empty() && !merged.header.is_empty() && chunk.header != merged.header {
            return Err(EngineError::InconsistentHeader { chunk: offset + 1 });
        }
        if merged.header.is_empty() {
            merged.header = chunk.header;
        }
        merged.rows.extend(chunk.rows);
    }
    Ok(merged)
}
