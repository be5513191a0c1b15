//! End-to-end orchestration: edits, then annotations, then compaction
//!
//! `run` never fails. Each stage either advances the document or leaves the
//! last good bytes in place and marks the outcome degraded.

use serde::Serialize;
use tracing::{info, warn};

use crate::annotations::{apply_annotations, RectRegistry};
use crate::compositor::Compositor;
use crate::config::PipelineConfig;
use crate::edits::apply_edits;
use crate::engine::{LopdfEngine, RenderEngine};
use crate::types::{Annotations, DocumentState, EditRequest, ItemOutcome};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    /// Every item was applied.
    Success,
    /// A stage failed or at least one item was skipped or only partly drawn.
    Degraded,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Success => "success",
            PipelineStatus::Degraded => "degraded",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub document: DocumentState,
    pub status: PipelineStatus,
    pub edits: Vec<ItemOutcome>,
    pub annotations: Vec<ItemOutcome>,
}

impl PipelineOutcome {
    pub fn is_degraded(&self) -> bool {
        self.status == PipelineStatus::Degraded
    }
}

pub struct EditPipeline<E = LopdfEngine> {
    engine: E,
    config: PipelineConfig,
    registry: RectRegistry,
}

impl Default for EditPipeline<LopdfEngine> {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl EditPipeline<LopdfEngine> {
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_engine(LopdfEngine::new(), config)
    }
}

impl<E: RenderEngine> EditPipeline<E> {
    pub fn with_engine(engine: E, config: PipelineConfig) -> Self {
        Self {
            engine,
            config,
            registry: RectRegistry::default(),
        }
    }

    pub fn with_registry(mut self, registry: RectRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Apply `edits` and then `annotations` to `original`.
    pub fn run(
        &self,
        original: &[u8],
        edits: &[EditRequest],
        annotations: &Annotations,
    ) -> PipelineOutcome {
        let compositor = Compositor::new(&self.engine);
        info!(
            "Running pipeline: {} bytes, {} edits, {} rectangle and {} text annotations",
            original.len(),
            edits.len(),
            annotations.rects.len(),
            annotations.texts.len()
        );

        let (document, edit_outcomes) = if edits.is_empty() {
            (original.to_vec(), Vec::new())
        } else {
            match apply_edits(&compositor, &self.config, original, edits) {
                Ok(out) => (out.document, out.outcomes),
                Err(e) => {
                    warn!("Edit stage failed, returning the original document: {}", e);
                    let reason = e.to_string();
                    return PipelineOutcome {
                        document: self.finish(original.to_vec()),
                        status: PipelineStatus::Degraded,
                        edits: skip_all(edits.iter().map(|edit| edit.id.as_str()), &reason),
                        annotations: skip_all(annotation_ids(annotations), "edit stage failed"),
                    };
                }
            }
        };

        let mut stage_failed = false;
        let (document, annotation_outcomes) = if annotations.is_empty() {
            (document, Vec::new())
        } else {
            match apply_annotations(
                &compositor,
                &self.registry,
                &self.config,
                &document,
                annotations,
            ) {
                Ok(out) => (out.document, out.outcomes),
                Err(e) => {
                    warn!("Annotation stage failed, keeping edited document: {}", e);
                    stage_failed = true;
                    let outcomes = skip_all(annotation_ids(annotations), &e.to_string());
                    (document, outcomes)
                }
            }
        };

        let degraded = stage_failed
            || edit_outcomes
                .iter()
                .chain(&annotation_outcomes)
                .any(|o| !o.is_applied());
        let status = if degraded {
            PipelineStatus::Degraded
        } else {
            PipelineStatus::Success
        };
        info!("Pipeline finished: {}", status.as_str());

        PipelineOutcome {
            document: self.finish(document),
            status,
            edits: edit_outcomes,
            annotations: annotation_outcomes,
        }
    }

    /// Final compaction. Best effort: on failure the input is returned as is.
    fn finish(&self, document: Vec<u8>) -> Vec<u8> {
        if !self.config.reserialize {
            return document;
        }
        match self.engine.reserialize(&document) {
            Ok(compacted) => compacted,
            Err(e) => {
                warn!("Reserialize failed, returning uncompacted bytes: {}", e);
                document
            }
        }
    }
}

fn annotation_ids(annotations: &Annotations) -> impl Iterator<Item = &str> {
    annotations
        .rects
        .iter()
        .map(|r| r.id.as_str())
        .chain(annotations.texts.iter().map(|t| t.id.as_str()))
}

fn skip_all<'a>(ids: impl Iterator<Item = &'a str>, reason: &str) -> Vec<ItemOutcome> {
    ids.map(|id| ItemOutcome::skipped(id, reason)).collect()
}

/// Run the default `lopdf` pipeline and return only the document.
pub fn run_pipeline(original: &[u8], edits: &[EditRequest], annotations: &Annotations) -> Vec<u8> {
    EditPipeline::default()
        .run(original, edits, annotations)
        .document
}
