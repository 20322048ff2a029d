//! Résumé pipeline: wires the components together.
//!
//! Upload:    extract text → generation chain → sanitize → compile → publish
//! Recompile: sanitize user-edited LaTeX → compile → publish
//!
//! Each request gets its own scratch directory, removed when the request
//! finishes. Nothing here is shared between requests except the stores.

use std::path::PathBuf;

use tracing::info;

use crate::errors::AppError;
use crate::extraction::extract_text;
use crate::generation::{GenerationChain, Provider};
use crate::identity::Identity;
use crate::latex::{sanitize_latex, CompilationJob, LatexCompiler};
use crate::storage::{ArtifactPublisher, CleanupQueue, PublishedArtifact};

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub job_id: String,
    pub latex: String,
    /// `None` for recompiles, which never touch a provider.
    pub provider: Option<Provider>,
    pub artifact: PublishedArtifact,
}

#[derive(Clone)]
pub struct ResumePipeline {
    chain: GenerationChain,
    compiler: LatexCompiler,
    publisher: ArtifactPublisher,
    cleanup: CleanupQueue,
    scratch_root: PathBuf,
}

impl ResumePipeline {
    pub fn new(
        chain: GenerationChain,
        compiler: LatexCompiler,
        publisher: ArtifactPublisher,
        cleanup: CleanupQueue,
        scratch_root: PathBuf,
    ) -> Self {
        Self {
            chain,
            compiler,
            publisher,
            cleanup,
            scratch_root,
        }
    }

    pub async fn generate_from_pdf(
        &self,
        pdf: Vec<u8>,
        identity: &Identity,
    ) -> Result<PipelineOutput, AppError> {
        let text = extract_text(pdf).await?;
        let generation = self.chain.generate(&text).await;
        self.compile_and_publish(&generation.latex, Some(generation.provider), identity)
            .await
    }

    pub async fn recompile(
        &self,
        latex: &str,
        identity: &Identity,
    ) -> Result<PipelineOutput, AppError> {
        if latex.trim().is_empty() {
            return Err(AppError::Validation("latex cannot be empty".to_string()));
        }
        self.compile_and_publish(latex, None, identity).await
    }

    async fn compile_and_publish(
        &self,
        latex: &str,
        provider: Option<Provider>,
        identity: &Identity,
    ) -> Result<PipelineOutput, AppError> {
        let latex = sanitize_latex(latex);
        if latex.trim().is_empty() {
            return Err(AppError::Validation(
                "latex is empty after sanitization".to_string(),
            ));
        }

        let job = CompilationJob::prepare(&self.scratch_root, CompilationJob::new_id(), latex)
            .await
            .map_err(|e| AppError::from_compile(e, None))?;
        let published = self.compile_job(&job, identity).await;
        let job_id = job.id.clone();
        let latex = job.source_latex.clone();
        job.discard().await;

        let artifact = published?;
        if identity.user_id().is_some() {
            self.cleanup.enqueue(identity.storage_prefix(&job_id));
        }
        info!(
            "Job {job_id} published to {} (provider: {})",
            artifact.storage_path,
            provider.map_or("none", |p| p.as_str())
        );

        Ok(PipelineOutput {
            job_id,
            latex,
            provider,
            artifact,
        })
    }

    async fn compile_job(
        &self,
        job: &CompilationJob,
        identity: &Identity,
    ) -> Result<PublishedArtifact, AppError> {
        let outcome = self
            .compiler
            .compile(job)
            .await
            .map_err(|e| AppError::from_compile(e, Some(job.source_latex.clone())))?;
        let pdf_path = outcome.pdf_path.unwrap_or_else(|| job.pdf_path());

        Ok(self
            .publisher
            .publish(&pdf_path, &identity.storage_prefix(&job.id))
            .await?)
    }
}
