//! Strongly-typed estimate session: the state container the surrounding
//! application holds while takeoffs accumulate across documents.
//!
//! The session owns a running bill of materials and serializes through
//! `snapshot()` at its boundary; the core never persists it to disk.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::derating::{annotate_export, ServiceConditions};
use crate::models::bom::{BillOfMaterials, BomExport};
use crate::pipeline::merge::merge_bom;
use crate::pipeline::runner::DocumentTakeoff;
use crate::pipeline::usage::UsageSnapshot;

/// Per-document summary kept for the session record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDocument {
    pub id: Uuid,
    pub title: String,
    pub item_count: usize,
    pub flag_count: usize,
}

/// An in-memory estimate session.
#[derive(Debug, Clone)]
pub struct EstimateSession {
    id: Uuid,
    name: String,
    created_at: NaiveDateTime,
    conditions: ServiceConditions,
    documents: Vec<SessionDocument>,
    bom: BillOfMaterials,
    usage: UsageSnapshot,
}

impl EstimateSession {
    pub fn new(name: &str, conditions: ServiceConditions) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: chrono::Utc::now().naive_utc(),
            conditions,
            documents: Vec::new(),
            bom: BillOfMaterials::new(),
            usage: UsageSnapshot::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    pub fn usage(&self) -> UsageSnapshot {
        self.usage
    }

    /// Change the service conditions; the next export re-derates under
    /// the new values.
    pub fn set_conditions(&mut self, conditions: ServiceConditions) {
        self.conditions = conditions;
    }

    /// Fold one document's takeoff into the running bill.
    pub fn add_takeoff(&mut self, takeoff: DocumentTakeoff) {
        self.documents.push(SessionDocument {
            id: takeoff.document_id,
            title: takeoff.document_title.clone(),
            item_count: takeoff.bom.item_count(),
            flag_count: takeoff.export.flags.len(),
        });
        self.bom = merge_bom(std::mem::take(&mut self.bom), takeoff.bom);
        self.usage = takeoff.usage;
    }

    /// Export the combined bill with derating computed fresh under the
    /// session's current conditions.
    pub fn export(&self) -> BomExport {
        let mut export = self.bom.export();
        annotate_export(&mut export, &self.conditions);
        export
    }

    /// Serializable view of the whole session.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            name: self.name.clone(),
            created_at: self.created_at,
            conditions: self.conditions,
            documents: self.documents.clone(),
            bom: self.export(),
            usage: self.usage,
        }
    }
}

/// The serialized session boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub name: String,
    pub created_at: NaiveDateTime,
    pub conditions: ServiceConditions,
    pub documents: Vec<SessionDocument>,
    pub bom: BomExport,
    pub usage: UsageSnapshot,
}
