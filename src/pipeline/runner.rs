//! Document-level driver: chunk, extract concurrently, validate, merge,
//! derate at export.
//!
//! Worker completion order is immaterial (the merge is order-independent)
//! and a failed chunk contributes zero items plus one document flag
//! without disturbing its siblings.

use std::sync::Arc;

use tokio::task::JoinSet;
use uuid::Uuid;

use super::chunker::Chunker;
use super::client::InstructionSet;
use super::merge::merge_chunk;
use super::orchestrator::ExtractionOrchestrator;
use super::usage::UsageSnapshot;
use super::validator::{validate_response, ValidatedChunk};
use crate::derating::{annotate_export, ServiceConditions};
use crate::models::bom::{AssumptionFlag, BillOfMaterials, BomExport};
use crate::models::document::Document;
use crate::models::enums::FlagSeverity;

/// Takeoff output for one document.
#[derive(Debug, Clone)]
pub struct DocumentTakeoff {
    pub document_id: Uuid,
    pub document_title: String,
    /// The running merge target, kept for session-level accumulation.
    pub bom: BillOfMaterials,
    /// The rendering-layer contract, with derating attached.
    pub export: BomExport,
    /// Orchestrator usage totals at completion time.
    pub usage: UsageSnapshot,
}

/// Drives the full pipeline for one document at a time.
pub struct PipelineRunner {
    orchestrator: Arc<ExtractionOrchestrator>,
    chunker: Chunker,
    instructions: InstructionSet,
    conditions: ServiceConditions,
}

impl PipelineRunner {
    pub fn new(
        orchestrator: Arc<ExtractionOrchestrator>,
        chunker: Chunker,
        instructions: InstructionSet,
        conditions: ServiceConditions,
    ) -> Self {
        Self {
            orchestrator,
            chunker,
            instructions,
            conditions,
        }
    }

    pub fn conditions(&self) -> &ServiceConditions {
        &self.conditions
    }

    /// Run the whole extraction pipeline over one document.
    pub async fn process_document(&self, document: &Document) -> DocumentTakeoff {
        let chunks: Vec<_> = self.chunker.chunks(&document.text).collect();
        tracing::info!(
            document = %document.title,
            chunk_count = chunks.len(),
            "starting takeoff"
        );

        let mut tasks = JoinSet::new();
        for chunk in chunks {
            let orchestrator = Arc::clone(&self.orchestrator);
            let instructions = self.instructions.clone();
            tasks.spawn(async move {
                let index = chunk.index;
                match orchestrator.extract(&instructions, &chunk).await {
                    Ok(payload) => match validate_response(index, &payload) {
                        Ok(validated) => validated,
                        Err(err) => failed_chunk(index, "response", &err.to_string()),
                    },
                    Err(err) => failed_chunk(index, "extraction", &err.to_string()),
                }
            });
        }

        let mut bom = BillOfMaterials::new();
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(validated) => bom = merge_chunk(bom, validated),
                Err(err) => {
                    tracing::error!(error = %err, "chunk worker task failed");
                }
            }
        }

        let mut export = bom.export();
        annotate_export(&mut export, &self.conditions);

        tracing::info!(
            document = %document.title,
            items = bom.item_count(),
            flags = export.flags.len(),
            "takeoff complete"
        );

        DocumentTakeoff {
            document_id: document.id,
            document_title: document.title.clone(),
            bom,
            export,
            usage: self.orchestrator.usage().snapshot(),
        }
    }
}

/// The zero-item contribution of a chunk whose extraction or validation
/// terminally failed.
fn failed_chunk(index: usize, stage: &str, detail: &str) -> ValidatedChunk {
    ValidatedChunk {
        chunk_index: index,
        flags: vec![AssumptionFlag::new(
            stage,
            Some(detail.to_string()),
            FlagSeverity::High,
            "Chunk contributed no items; review this region of the source document",
        )],
        ..Default::default()
    }
}
