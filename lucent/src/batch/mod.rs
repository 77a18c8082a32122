//! Batch processing: governor checks, per-image pipeline, persistence and stitching.
//!
//! A batch runs sequentially inside the worker's rayon pool: every image finishes its
//! whole pipeline and is persisted before the next one is decoded, so peak memory is
//! one image's working set plus the retained outputs for stitching. Stitching is a
//! barrier after the last image.


mod report;
mod worker;

pub use report::{
    BatchReport, FailureKind, ItemFailure, ItemReport, PanoramaReport, ProcessedReport,
};
pub use worker::{WorkerBudget, build_thread_pool};

use std::collections::HashSet;
use std::path::Path;
use std::time::{Duration, Instant};

use image::RgbImage;

use crate::codec::{OutputFormat, encode};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::governor::ResourceGovernor;
use crate::pipeline::{Deadline, ImagePipeline, ProcessedImage};
use crate::session::{SessionId, SessionStore, validate_entry_name};
use crate::stitch::{PanoramaOutcome, Stitcher};

/// Session entry name of a stitched panorama.
pub const PANORAMA_ENTRY: &str = "panorama.jpg";

/// One uploaded file: its original name and encoded bytes.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Reads `path`, keeping only its final component as the name.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(name, std::fs::read(path)?))
    }
}

pub struct BatchProcessor<S: SessionStore> {
    config: Config,
    pipeline: ImagePipeline,
    stitcher: Stitcher,
    store: S,
    budget: WorkerBudget,
    pool: rayon::ThreadPool,
}

impl<S: SessionStore> BatchProcessor<S> {
    pub fn new(config: Config, store: S) -> Result<Self> {
        config.validate();
        let governor = ResourceGovernor::new(config.governor.clone());
        let pipeline = ImagePipeline::new(config.pipeline.clone(), governor);
        let stitcher = Stitcher::new(config.stitch.clone());
        let budget = WorkerBudget::new(&config.worker);
        let pool = build_thread_pool(config.worker.threads)?;

        tracing::info!(
            threads = pool.current_num_threads(),
            max_operations = ?budget.limit(),
            denoise = %config.pipeline.denoise,
            contrast = %config.pipeline.contrast,
            "Batch processor ready"
        );

        Ok(Self {
            config,
            pipeline,
            stitcher,
            store,
            budget,
            pool,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn budget(&self) -> &WorkerBudget {
        &self.budget
    }

    /// Processes `files` as one batch under a fresh session.
    ///
    /// Per-image decode, memory and naming failures are reported in the returned
    /// [`BatchReport`]; capacity, timeout, worker, store and encoding failures abort
    /// the batch. On timeout, outputs persisted so far stay in the store.
    pub fn process_batch(&self, files: &[UploadedFile]) -> Result<BatchReport> {
        self.process_batch_with_timeout(files, self.config.worker.request_timeout())
    }

    /// [`process_batch`](Self::process_batch) with a request-specific time limit.
    pub fn process_batch_with_timeout(
        &self,
        files: &[UploadedFile],
        timeout: Option<Duration>,
    ) -> Result<BatchReport> {
        self.pipeline.governor().check_batch(files.len())?;
        self.budget.acquire()?;

        let session = self.store.create_session()?;
        let deadline = Deadline::new(session.clone(), timeout);
        tracing::info!(session = %session, files = files.len(), "Batch started");

        let mut persisted = 0usize;
        let result = self
            .pool
            .install(|| self.run(&session, files, &deadline, &mut persisted));

        result.map_err(|err| match err {
            Error::Timeout {
                session,
                elapsed,
                limit,
                ..
            } => {
                tracing::error!(
                    session = %session,
                    elapsed_ms = elapsed.as_millis() as u64,
                    limit_ms = limit.as_millis() as u64,
                    persisted,
                    "Batch timed out"
                );
                Error::Timeout {
                    session,
                    elapsed,
                    limit,
                    persisted,
                }
            }
            other => other,
        })
    }

    fn run(
        &self,
        session: &SessionId,
        files: &[UploadedFile],
        deadline: &Deadline,
        persisted: &mut usize,
    ) -> Result<BatchReport> {
        let start = Instant::now();
        let mut items = Vec::with_capacity(files.len());
        let mut processed: Vec<ProcessedImage> = Vec::with_capacity(files.len());
        let mut outputs: HashSet<String> = HashSet::from([PANORAMA_ENTRY.to_string()]);

        for file in files {
            deadline.check()?;
            let result = match self.claim_output(&file.name, &mut outputs) {
                Err(failure) => Err(failure),
                Ok(output) => match self.pipeline.process(&file.name, &file.bytes, deadline) {
                    Ok(image) => Ok((image, output)),
                    Err(err) => match ItemFailure::from_error(&file.name, &err) {
                        Some(failure) => Err(failure),
                        None => return Err(err),
                    },
                },
            };
            match result {
                Ok((image, output)) => {
                    self.persist_image(session, &image, &output)?;
                    *persisted += 1;
                    items.push(ItemReport::Processed(ProcessedReport::new(&image, output)));
                    processed.push(image);
                }
                Err(failure) => {
                    tracing::warn!(
                        session = %session,
                        image = %file.name,
                        kind = %failure.kind,
                        error = %failure.message,
                        "Image failed"
                    );
                    items.push(ItemReport::Failed(failure));
                }
            }
        }

        let images: Vec<&RgbImage> = processed.iter().map(|p| &p.pixels).collect();
        let outcome = self.stitcher.stitch(&images, deadline)?;
        let panorama = self.persist_panorama(session, outcome)?;
        if matches!(panorama, PanoramaReport::Stitched { .. }) {
            *persisted += 1;
        }

        let report = BatchReport {
            session: session.clone(),
            items,
            panorama,
            elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
        };
        tracing::info!(
            session = %session,
            processed = report.processed().count(),
            failed = report.failures().count(),
            panorama_attempted = report.panorama.is_attempted(),
            panorama_stitched = report.panorama.is_stitched(),
            elapsed_ms = report.elapsed_ms,
            "Batch complete"
        );
        Ok(report)
    }

    /// Reserves the session entry for upload `name`.
    ///
    /// Names that are not plain file names, or whose entry is already taken by an
    /// earlier upload of this batch, fail the item before any decoding.
    fn claim_output(
        &self,
        name: &str,
        outputs: &mut HashSet<String>,
    ) -> std::result::Result<String, ItemFailure> {
        let output = format!("{}{}", self.config.output_prefix, name);
        if let Err(err) = validate_entry_name(name).and_then(|()| validate_entry_name(&output)) {
            return Err(ItemFailure::rejected(name, FailureKind::InvalidName, err.to_string()));
        }
        if !outputs.insert(output.clone()) {
            return Err(ItemFailure::rejected(
                name,
                FailureKind::DuplicateName,
                format!("Entry '{output}' is already used by another file of this batch"),
            ));
        }
        Ok(output)
    }

    fn persist_image(
        &self,
        session: &SessionId,
        image: &ProcessedImage,
        output: &str,
    ) -> Result<()> {
        let format = OutputFormat::for_name(&image.name);
        let bytes = encode(&image.pixels, format).map_err(|e| Error::Encode {
            name: image.name.clone(),
            reason: e.to_string(),
        })?;
        self.store.write(session, output, &bytes)?;
        Ok(())
    }

    fn persist_panorama(
        &self,
        session: &SessionId,
        outcome: PanoramaOutcome,
    ) -> Result<PanoramaReport> {
        match outcome {
            PanoramaOutcome::Stitched(panorama) => {
                let bytes = encode(&panorama.pixels, OutputFormat::Jpeg).map_err(|e| {
                    Error::Encode {
                        name: PANORAMA_ENTRY.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                self.store.write(session, PANORAMA_ENTRY, &bytes)?;
                tracing::info!(
                    session = %session,
                    width = panorama.pixels.width(),
                    height = panorama.pixels.height(),
                    "Panorama stitched"
                );
                Ok(PanoramaReport::Stitched {
                    output: PANORAMA_ENTRY.to_string(),
                    width: panorama.pixels.width(),
                    height: panorama.pixels.height(),
                    pair_inliers: panorama.pair_inliers,
                })
            }
            PanoramaOutcome::RegistrationFailed(failure) => {
                tracing::warn!(
                    session = %session,
                    reason = %failure,
                    "Panorama registration failed"
                );
                Ok(PanoramaReport::Failed {
                    message: failure.to_string(),
                    failure,
                })
            }
            PanoramaOutcome::NotAttempted(reason) => {
                tracing::info!(session = %session, reason = ?reason, "Panorama not attempted");
                Ok(PanoramaReport::NotAttempted(reason))
            }
        }
    }
}
