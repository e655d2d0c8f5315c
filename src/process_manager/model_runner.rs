// Model subprocess management
// Spawns the bundle's run script once per chunk and reads its output back

use super::codec::{codec_for, ChunkCodec, ChunkOutput};
use crate::error::EngineError;
use crate::models::input::TaskType;
use crate::models::plan::{Chunk, ExecutionMode};
use crate::utils::BundleLayout;
use log::{debug, warn};
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x08000000;

/// Trailing stderr lines carried into a failure reason
const STDERR_TAIL_LINES: usize = 5;

/// Per-request facts every invocation of a plan shares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvocationContext {
    pub worker_count: usize,
    pub task_type: TaskType,
    pub mode: ExecutionMode,
}

/// Something that can run the model on one chunk
pub trait ModelRunner: Send + Sync + 'static {
    /// Dropping the returned future abandons the invocation; any process it started is killed.
    fn run(&self, chunk: &Chunk, ctx: InvocationContext) -> impl Future<Output = Result<ChunkOutput, EngineError>> + Send;
}

/// Input/output scratch paths of one chunk, removed when dropped
struct ScratchFiles {
    input: PathBuf,
    output: PathBuf,
}

impl ScratchFiles {
    fn new(dir: &Path, tag: &str, codec: &dyn ChunkCodec) -> Self {
        Self {
            input: dir.join(format!("input-{}.{}", tag, codec.input_extension())),
            output: dir.join(format!("output-{}.{}", tag, codec.output_extension())),
        }
    }
}

impl Drop for ScratchFiles {
    fn drop(&mut self) {
        for path in [&self.input, &self.output] {
            if path.exists() {
                if let Err(e) = fs::remove_file(path) {
                    warn!("Failed to remove scratch file {:?}: {}", path, e);
                }
            }
        }
    }
}

/// Runs `bash <script> <frameworkDir> <inputFile> <outputFile> <appRoot>`
#[derive(Debug, Clone)]
pub struct SubprocessRunner {
    script: PathBuf,
    framework_dir: PathBuf,
    app_root: PathBuf,
    scratch_dir: PathBuf,
    worker_env_var: String,
}

impl SubprocessRunner {
    pub fn new(layout: &BundleLayout, scratch_dir: impl Into<PathBuf>, worker_env_var: impl Into<String>) -> Self {
        Self {
            script: layout.run_script(),
            framework_dir: layout.framework_dir(),
            app_root: layout.app_root(),
            scratch_dir: scratch_dir.into(),
            worker_env_var: worker_env_var.into(),
        }
    }

    fn command(&self, scratch: &ScratchFiles, worker_count: usize) -> Command {
        let mut cmd = Command::new("bash");
        cmd.arg(&self.script)
            .arg(&self.framework_dir)
            .arg(&scratch.input)
            .arg(&scratch.output)
            .arg(&self.app_root)
            .env(&self.worker_env_var, worker_count.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        cmd
    }
}

impl ModelRunner for SubprocessRunner {
    async fn run(&self, chunk: &Chunk, ctx: InvocationContext) -> Result<ChunkOutput, EngineError> {
        let codec = codec_for(ctx.task_type);
        let scratch = ScratchFiles::new(&self.scratch_dir, &chunk.tag, codec);

        // Process mode keeps file encoding and decoding off the async workers
        let offload = ctx.mode == ExecutionMode::Process;

        if offload {
            let items = chunk.items.clone();
            let input = scratch.input.clone();
            on_blocking_pool(&chunk.tag, move || codec.encode(&items, &input)).await?;
        } else {
            codec.encode(&chunk.items, &scratch.input)?;
        }

        let child = self
            .command(&scratch, ctx.worker_count)
            .spawn()
            .map_err(|e| EngineError::subprocess(&chunk.tag, format!("Failed to spawn model process: {}", e)))?;

        debug!(
            "Started model for chunk {} ({} items, pid {:?})",
            chunk.tag,
            chunk.items.len(),
            child.id()
        );

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| EngineError::subprocess(&chunk.tag, format!("Failed to wait for model process: {}", e)))?;

        let exit_code = output.status.code().unwrap_or(-1);
        debug!("Model for chunk {} exited with code: {}", chunk.tag, exit_code);
        for line in tail_lines(&output.stdout, STDERR_TAIL_LINES) {
            debug!("[model {}] {}", chunk.tag, line);
        }

        if !output.status.success() {
            return Err(failure(
                &chunk.tag,
                format!("model exited with code {}", exit_code),
                &output.stderr,
            ));
        }

        if !scratch.output.exists() {
            return Err(failure(&chunk.tag, "output file is missing".to_string(), &output.stderr));
        }

        if offload {
            let path = scratch.output.clone();
            on_blocking_pool(&chunk.tag, move || codec.decode(&path)).await
        } else {
            codec.decode(&scratch.output)
        }
    }
}

async fn on_blocking_pool<T, F>(tag: &str, work: F) -> Result<T, EngineError>
where
    F: FnOnce() -> Result<T, EngineError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| EngineError::subprocess(tag, format!("Codec task failed: {}", e)))?
}

/// Failure reason followed by the last lines the model wrote to stderr
fn failure(tag: &str, mut reason: String, stderr: &[u8]) -> EngineError {
    let tail = tail_lines(stderr, STDERR_TAIL_LINES);
    if !tail.is_empty() {
        reason.push_str(": ");
        reason.push_str(&tail.join(" | "));
    }
    EngineError::subprocess(tag, reason)
}

fn tail_lines(raw: &[u8], count: usize) -> Vec<String> {
    let text = String::from_utf8_lossy(raw);
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|line| !line.is_empty()).collect();
    let skip = lines.len().saturating_sub(count);
    lines[skip..].iter().map(|line| line.to_string()).collect()
}
