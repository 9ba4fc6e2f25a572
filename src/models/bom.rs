//! Bill-of-materials line items and the running merge target.
//!
//! Each item type defines its own merge key (the identity-defining field
//! tuple used to detect duplicate detections across chunks). The running
//! `BillOfMaterials` is keyed by those tuples in ordered maps so that the
//! exported record lists are identical regardless of the order results
//! arrived in.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::enums::{
    ConductorMaterial, ConduitMaterial, ConfidenceLevel, FlagSeverity, InsulationType,
};
use crate::derating::DeratingResult;

// ═══════════════════════════════════════════════════════════
// Flags and provenance
// ═══════════════════════════════════════════════════════════

/// A structured record of an uncertain, assumed, rejected, or
/// non-compliant value. Always attached to the item (or document) whose
/// value triggered it; never silently dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssumptionFlag {
    /// Field the flag refers to (e.g. "gauge", "ampacity").
    pub field: String,
    /// The assumed value, or the raw value that was rejected.
    pub value: Option<String>,
    pub severity: FlagSeverity,
    /// Recommended reviewer action.
    pub action: String,
}

impl AssumptionFlag {
    pub fn new(
        field: &str,
        value: Option<String>,
        severity: FlagSeverity,
        action: &str,
    ) -> Self {
        Self {
            field: field.to_string(),
            value,
            severity,
            action: action.to_string(),
        }
    }
}

/// Position of a detection in the pipeline run: chunk sequence index plus
/// the item's ordinal within that chunk's response. Total order, fixed by
/// document position rather than worker completion time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ItemOrigin {
    pub chunk: usize,
    pub ordinal: usize,
}

impl ItemOrigin {
    pub fn new(chunk: usize, ordinal: usize) -> Self {
        Self { chunk, ordinal }
    }
}

/// The detection that currently owns an item's non-summable fields: its
/// confidence at detection time plus its origin. An item's displayed
/// confidence degrades pessimistically on merge, so ownership is tracked
/// separately; comparing detection ranks keeps the merge independent of
/// grouping and arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    pub confidence: ConfidenceLevel,
    pub origin: ItemOrigin,
}

impl Detection {
    pub fn new(confidence: ConfidenceLevel, chunk: usize, ordinal: usize) -> Self {
        Self {
            confidence,
            origin: ItemOrigin::new(chunk, ordinal),
        }
    }

    /// Whether this detection outranks `other` for field ownership:
    /// higher confidence wins, ties go to the earlier origin.
    pub fn outranks(&self, other: &Self) -> bool {
        match self.confidence.cmp(&other.confidence) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => self.origin <= other.origin,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Line items + merge keys
// ═══════════════════════════════════════════════════════════

/// Wire/cable line item. Lengths are in feet as taken off the drawings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConductorItem {
    /// Canonical size token: "14".."1", "1/0".."4/0", "250".."500" (kcmil).
    pub gauge: String,
    pub material: Option<ConductorMaterial>,
    pub insulation: Option<InsulationType>,
    /// Rated voltage, e.g. 600.
    pub voltage_rating: Option<u32>,
    pub length_ft: f64,
    /// Number of parallel conductors of this kind.
    pub count: u32,
    /// Connected load, when the source document states one (motor lists do).
    pub load_amps: Option<f64>,
    /// Load expected to run three hours or more.
    pub continuous: bool,
    pub confidence: ConfidenceLevel,
    pub detection: Detection,
    pub flags: Vec<AssumptionFlag>,
}

/// Identity tuple for a conductor: gauge + insulation + rated voltage.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ConductorKey {
    pub gauge: String,
    pub insulation: Option<InsulationType>,
    pub voltage: Option<u32>,
}

impl ConductorItem {
    pub fn merge_key(&self) -> ConductorKey {
        ConductorKey {
            gauge: self.gauge.clone(),
            insulation: self.insulation,
            voltage: self.voltage_rating,
        }
    }
}

/// Raceway line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConduitItem {
    /// Trade size, e.g. "3/4", "1", "1-1/4".
    pub trade_size: String,
    pub material: Option<ConduitMaterial>,
    pub length_ft: f64,
    pub confidence: ConfidenceLevel,
    pub detection: Detection,
    pub flags: Vec<AssumptionFlag>,
}

/// Identity tuple for a raceway: trade size + material.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ConduitKey {
    pub trade_size: String,
    pub material: Option<ConduitMaterial>,
}

impl ConduitItem {
    pub fn merge_key(&self) -> ConduitKey {
        ConduitKey {
            trade_size: self.trade_size.clone(),
            material: self.material,
        }
    }
}

/// One breaker position on a panel schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitItem {
    pub number: u32,
    pub description: Option<String>,
    pub breaker_amps: Option<u32>,
    pub poles: Option<u8>,
    pub continuous: bool,
    pub confidence: ConfidenceLevel,
    pub detection: Detection,
    pub flags: Vec<AssumptionFlag>,
}

/// Panelboard with its nested circuit list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelItem {
    /// Designation as labeled on the schedule (e.g. "LP-1").
    pub name: String,
    pub voltage: Option<String>,
    pub phases: Option<u8>,
    pub main_amps: Option<u32>,
    pub circuits: BTreeMap<u32, CircuitItem>,
    pub confidence: ConfidenceLevel,
    pub detection: Detection,
    pub flags: Vec<AssumptionFlag>,
}

impl PanelItem {
    /// Panels merge by designation, case- and whitespace-insensitively.
    pub fn merge_key(&self) -> String {
        self.name.trim().to_ascii_uppercase()
    }
}

/// Lighting fixture line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureItem {
    /// Fixture type designation from the schedule (e.g. "A1").
    pub type_code: String,
    pub description: Option<String>,
    pub count: u32,
    pub confidence: ConfidenceLevel,
    pub detection: Detection,
    pub flags: Vec<AssumptionFlag>,
}

impl FixtureItem {
    pub fn merge_key(&self) -> String {
        self.type_code.trim().to_ascii_uppercase()
    }
}

// ═══════════════════════════════════════════════════════════
// Running bill of materials
// ═══════════════════════════════════════════════════════════

/// The accumulating merge target: best-known item per merge key, plus all
/// document-level flags. Chunk failure flags are keyed by chunk index so
/// the exported flag list is independent of worker completion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BillOfMaterials {
    pub conductors: BTreeMap<ConductorKey, ConductorItem>,
    pub conduits: BTreeMap<ConduitKey, ConduitItem>,
    pub panels: BTreeMap<String, PanelItem>,
    pub fixtures: BTreeMap<String, FixtureItem>,
    pub document_flags: BTreeMap<usize, Vec<AssumptionFlag>>,
}

impl BillOfMaterials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn item_count(&self) -> usize {
        self.conductors.len() + self.conduits.len() + self.panels.len() + self.fixtures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.item_count() == 0 && self.document_flags.is_empty()
    }

    /// Record a document-level flag against the chunk that produced it.
    pub fn add_document_flag(&mut self, chunk_index: usize, flag: AssumptionFlag) {
        self.document_flags.entry(chunk_index).or_default().push(flag);
    }

    /// Produce the ordered export contract consumed by the rendering layer.
    /// Derating results are attached afterwards by the derating engine;
    /// they are derived values, recomputed on every export.
    pub fn export(&self) -> BomExport {
        BomExport {
            conductors: self
                .conductors
                .values()
                .map(|item| ConductorExport {
                    item: item.clone(),
                    derating: None,
                })
                .collect(),
            conduits: self.conduits.values().cloned().collect(),
            panels: self
                .panels
                .values()
                .map(|p| PanelExport {
                    name: p.name.clone(),
                    voltage: p.voltage.clone(),
                    phases: p.phases,
                    main_amps: p.main_amps,
                    circuits: p.circuits.values().cloned().collect(),
                    confidence: p.confidence,
                    flags: p.flags.clone(),
                })
                .collect(),
            fixtures: self.fixtures.values().cloned().collect(),
            flags: self
                .document_flags
                .values()
                .flat_map(|flags| flags.iter().cloned())
                .collect(),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Export contract
// ═══════════════════════════════════════════════════════════

/// A conductor record as exported, with its freshly computed derating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConductorExport {
    #[serde(flatten)]
    pub item: ConductorItem,
    pub derating: Option<DeratingResult>,
}

/// A panel record as exported: circuits flattened to an ordered list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelExport {
    pub name: String,
    pub voltage: Option<String>,
    pub phases: Option<u8>,
    pub main_amps: Option<u32>,
    pub circuits: Vec<CircuitItem>,
    pub confidence: ConfidenceLevel,
    pub flags: Vec<AssumptionFlag>,
}

/// Ordered, per-type record lists: the only surface the rendering layer
/// consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BomExport {
    pub conductors: Vec<ConductorExport>,
    pub conduits: Vec<ConduitItem>,
    pub panels: Vec<PanelExport>,
    pub fixtures: Vec<FixtureItem>,
    /// Document-level flags (chunk failures), in chunk order.
    pub flags: Vec<AssumptionFlag>,
}
