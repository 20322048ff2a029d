//! Compiler invoker: writes LaTeX into a per-job scratch directory and runs
//! `pdflatex` against it.
//!
//! Jobs are isolated by directory. Ids are `<unix millis>-<9 hex chars>`; two
//! jobs drawing the same id would collide, so the job directory is created
//! non-recursively and a collision fails the second job instead of sharing.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

/// Fixed source filename inside every job directory.
pub const SOURCE_FILE_NAME: &str = "resume.tex";
/// Output the compiler writes next to the source on success.
pub const OUTPUT_FILE_NAME: &str = "resume.pdf";

const DEFAULT_EXECUTABLE: &str = "pdflatex";
const COMPILER_BINARY: &str = if cfg!(windows) {
    "pdflatex.exe"
} else {
    "pdflatex"
};
/// Bytes kept from each of stdout and stderr; the rest is read and discarded.
const MAX_OUTPUT_BYTES: usize = 1024 * 1024;

static TEX_LINE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^l\.(\d+)").expect("Invalid TeX line marker regex"));
static LINE_PHRASE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bline (\d+)\b").expect("Invalid line phrase regex"));

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Failed to start LaTeX compiler '{executable}': {source}")]
    Spawn {
        executable: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Scratch directory error: {0}")]
    Io(#[from] std::io::Error),

    #[error("LaTeX compilation failed:\n{log}")]
    Failed { log: String, line: Option<u32> },

    #[error("LaTeX compilation timed out after {}s", .0.as_secs())]
    TimedOut(Duration),
}

/// One compilation request and the scratch directory it exclusively owns.
#[derive(Debug, Clone)]
pub struct CompilationJob {
    pub id: String,
    pub work_dir: PathBuf,
    pub source_latex: String,
}

/// Result of a successful compiler run.
#[derive(Debug, Clone, Serialize)]
pub struct CompilationOutcome {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub pdf_path: Option<PathBuf>,
}

impl CompilationJob {
    /// Timestamp plus a short random suffix. Unlikely, not guaranteed, to be unique.
    pub fn new_id() -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("{}-{}", Utc::now().timestamp_millis(), &suffix[..9])
    }

    /// Creates `scratch_root/<id>` and writes the source file into it.
    pub async fn prepare(
        scratch_root: &Path,
        id: String,
        source_latex: String,
    ) -> Result<Self, CompileError> {
        tokio::fs::create_dir_all(scratch_root).await?;
        let work_dir = scratch_root.join(&id);
        tokio::fs::create_dir(&work_dir).await?;
        tokio::fs::write(work_dir.join(SOURCE_FILE_NAME), source_latex.as_bytes()).await?;
        debug!("Prepared compilation job {id} in {}", work_dir.display());

        Ok(Self {
            id,
            work_dir,
            source_latex,
        })
    }

    pub fn pdf_path(&self) -> PathBuf {
        self.work_dir.join(OUTPUT_FILE_NAME)
    }

    /// Removes the scratch directory. Failures are logged, not returned.
    pub async fn discard(self) {
        if let Err(e) = tokio::fs::remove_dir_all(&self.work_dir).await {
            warn!(
                "Failed to remove scratch directory {}: {e}",
                self.work_dir.display()
            );
        }
    }
}

/// Invokes the external LaTeX compiler. Cheap to clone.
#[derive(Debug, Clone)]
pub struct LatexCompiler {
    executable: PathBuf,
    timeout: Duration,
}

impl LatexCompiler {
    pub fn new(executable: &str, timeout: Duration) -> Self {
        Self {
            executable: normalize_executable(executable),
            timeout,
        }
    }

    /// Runs `<exe> -interaction=nonstopmode -halt-on-error resume.tex` in the
    /// job directory. Only a zero exit status with a PDF on disk is success;
    /// anything else is `CompileError::Failed` carrying the combined log.
    pub async fn compile(&self, job: &CompilationJob) -> Result<CompilationOutcome, CompileError> {
        let mut child = Command::new(&self.executable)
            .arg("-interaction=nonstopmode")
            .arg("-halt-on-error")
            .arg(SOURCE_FILE_NAME)
            .current_dir(&job.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CompileError::Spawn {
                executable: self.executable.display().to_string(),
                source,
            })?;

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let run = async {
            let (stdout, stderr, status) = tokio::join!(
                read_capped(stdout_pipe),
                read_capped(stderr_pipe),
                child.wait()
            );
            Ok::<_, std::io::Error>((stdout?, stderr?, status?))
        };

        // On timeout the child is dropped on return, which kills it.
        let (stdout, stderr, status) = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| CompileError::TimedOut(self.timeout))??;

        if !status.success() {
            let log = combined_log(&stdout, &stderr);
            let line = extract_error_line(&log);
            warn!(
                "Compilation of job {} failed (status {:?}, line {:?})",
                job.id,
                status.code(),
                line
            );
            return Err(CompileError::Failed { log, line });
        }

        let pdf_path = job.pdf_path();
        if !tokio::fs::try_exists(&pdf_path).await.unwrap_or(false) {
            let mut log = combined_log(&stdout, &stderr);
            log.push_str("\nCompiler exited successfully but produced no PDF.");
            return Err(CompileError::Failed { log, line: None });
        }

        debug!("Compiled job {} to {}", job.id, pdf_path.display());
        Ok(CompilationOutcome {
            success: true,
            stdout,
            stderr,
            pdf_path: Some(pdf_path),
        })
    }
}

/// Tolerates quoted paths and directory paths in the configured executable.
fn normalize_executable(raw: &str) -> PathBuf {
    let trimmed = raw.trim().trim_matches(|c| c == '"' || c == '\'').trim();
    if trimmed.is_empty() {
        return PathBuf::from(DEFAULT_EXECUTABLE);
    }
    let path = PathBuf::from(trimmed);
    if trimmed.ends_with('/') || trimmed.ends_with('\\') || path.is_dir() {
        path.join(COMPILER_BINARY)
    } else {
        path
    }
}

/// Keeps the first `MAX_OUTPUT_BYTES` of a pipe and drains the rest, so the
/// compiler never blocks on a full pipe.
async fn read_capped<R>(pipe: Option<R>) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let Some(mut pipe) = pipe else {
        return Ok(String::new());
    };
    let mut kept = Vec::new();
    (&mut pipe)
        .take(MAX_OUTPUT_BYTES as u64)
        .read_to_end(&mut kept)
        .await?;
    tokio::io::copy(&mut pipe, &mut tokio::io::sink()).await?;
    Ok(String::from_utf8_lossy(&kept).into_owned())
}

fn combined_log(stdout: &str, stderr: &str) -> String {
    match (stdout.trim().is_empty(), stderr.trim().is_empty()) {
        (false, false) => format!("{}\n{}", stdout.trim_end(), stderr.trim_end()),
        (false, true) => stdout.trim_end().to_string(),
        (true, false) => stderr.trim_end().to_string(),
        (true, true) => "Compiler produced no output".to_string(),
    }
}

/// First `l.<n>` marker TeX prints, else the first "line <n>" phrase.
pub fn extract_error_line(log: &str) -> Option<u32> {
    TEX_LINE_MARKER
        .captures(log)
        .or_else(|| LINE_PHRASE.captures(log))
        .and_then(|caps| caps[1].parse().ok())
}
