//! Validates and normalizes raw extraction payloads into typed records.
//!
//! The payload is untrusted: enum fields arrive with case variance,
//! numeric identifiers arrive as numbers or numeral-bearing text, and
//! numeric-optional fields carry sentinel not-applicable tokens. Every
//! legal raw variant maps to exactly one canonical value. Anything else is
//! dropped to absent and flagged; only a response with no recoverable
//! JSON object at all is an error.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use super::merge::merge_circuit;
use crate::models::bom::{
    AssumptionFlag, CircuitItem, ConductorItem, ConduitItem, Detection, FixtureItem, PanelItem,
};
use crate::models::enums::{
    ConductorMaterial, ConduitMaterial, ConfidenceLevel, FlagSeverity, InsulationType,
};

#[derive(Debug, Clone, Error)]
pub enum ValidateError {
    #[error("response is not structured data: {0}")]
    Unstructured(String),
}

/// Typed, normalized output for one chunk.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidatedChunk {
    pub chunk_index: usize,
    pub conductors: Vec<ConductorItem>,
    pub conduits: Vec<ConduitItem>,
    pub panels: Vec<PanelItem>,
    pub fixtures: Vec<FixtureItem>,
    /// Chunk-level flags not attached to any surviving item.
    pub flags: Vec<AssumptionFlag>,
}

/// Parse and normalize one raw response. Fails only when no well-formed
/// JSON object can be recovered from the payload.
pub fn validate_response(chunk_index: usize, raw: &str) -> Result<ValidatedChunk, ValidateError> {
    let value = parse_json_payload(raw)?;
    let obj = value
        .as_object()
        .ok_or_else(|| ValidateError::Unstructured("top level is not an object".into()))?;

    let mut out = ValidatedChunk {
        chunk_index,
        ..Default::default()
    };
    // Ordinals are assigned in response order, giving every detection a
    // stable position for the merge tie-break.
    let mut ordinal = 0usize;

    for value in list_entries(obj, "wires", &mut out.flags) {
        match parse_conductor(chunk_index, ordinal, value) {
            Ok(item) => out.conductors.push(item),
            Err(flag) => out.flags.push(flag),
        }
        ordinal += 1;
    }

    for value in list_entries(obj, "conduits", &mut out.flags) {
        match parse_conduit(chunk_index, ordinal, value) {
            Ok(item) => out.conduits.push(item),
            Err(flag) => out.flags.push(flag),
        }
        ordinal += 1;
    }

    for value in list_entries(obj, "panels", &mut out.flags) {
        match parse_panel(chunk_index, &mut ordinal, value) {
            Ok(item) => out.panels.push(item),
            Err(flag) => out.flags.push(flag),
        }
        ordinal += 1;
    }

    for value in list_entries(obj, "fixtures", &mut out.flags) {
        match parse_fixture(chunk_index, ordinal, value) {
            Ok(item) => out.fixtures.push(item),
            Err(flag) => out.flags.push(flag),
        }
        ordinal += 1;
    }

    if !out.flags.is_empty() {
        tracing::warn!(
            chunk = chunk_index,
            flag_count = out.flags.len(),
            "validation dropped or flagged fields"
        );
    }

    Ok(out)
}

/// Recover the JSON object from a payload that may be fenced or wrapped
/// in prose.
fn parse_json_payload(raw: &str) -> Result<Value, ValidateError> {
    let candidate = if let Some(fence_start) = raw.find("```json") {
        let body = &raw[fence_start + 7..];
        match body.find("```") {
            Some(fence_end) => &body[..fence_end],
            None => body,
        }
    } else {
        raw
    };

    if let Ok(value) = serde_json::from_str(candidate.trim()) {
        return Ok(value);
    }

    // Last resort: the outermost brace span.
    if let (Some(open), Some(close)) = (candidate.find('{'), candidate.rfind('}')) {
        if open < close {
            if let Ok(value) = serde_json::from_str(candidate[open..=close].trim()) {
                return Ok(value);
            }
        }
    }

    Err(ValidateError::Unstructured(
        "no JSON object found in payload".into(),
    ))
}

/// Entries of a top-level list field; a present-but-not-a-list field is
/// flagged and skipped.
fn list_entries<'a>(
    obj: &'a serde_json::Map<String, Value>,
    key: &str,
    flags: &mut Vec<AssumptionFlag>,
) -> Vec<&'a Value> {
    match obj.get(key) {
        None => Vec::new(),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(other) => {
            flags.push(AssumptionFlag::new(
                key,
                Some(summarize(other)),
                FlagSeverity::Medium,
                "Field was not a list; its items were skipped",
            ));
            Vec::new()
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Field normalization: explicit and total
// ═══════════════════════════════════════════════════════════

/// Outcome of normalizing one raw field.
#[derive(Debug, Clone, PartialEq)]
enum Norm<T> {
    Value(T),
    Absent,
    Rejected(String),
}

/// Sentinel tokens meaning "not applicable" in numeric-optional fields.
fn is_sentinel(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "" | "n/a" | "na" | "none" | "unknown" | "tbd" | "-" | "--" | "?"
    )
}

fn summarize(value: &Value) -> String {
    let s = value.to_string();
    if s.chars().count() > 60 {
        let mut short: String = s.chars().take(60).collect();
        short.push('…');
        short
    } else {
        s
    }
}

fn gauge_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^#?\s*(\d{1,3}(?:/0)?)\s*(?:AWG|KCMIL|MCM)?$").unwrap()
    })
}

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)").unwrap())
}

/// Conductor size → canonical token ("12", "1/0", "250").
fn norm_gauge(value: Option<&Value>) -> Norm<String> {
    match value {
        None => Norm::Absent,
        Some(Value::Number(n)) => match n.as_u64() {
            Some(v) => Norm::Value(v.to_string()),
            None => Norm::Rejected(n.to_string()),
        },
        Some(Value::String(s)) if is_sentinel(s) => Norm::Absent,
        Some(Value::String(s)) => {
            let upper = s.trim().to_ascii_uppercase();
            match gauge_re().captures(&upper) {
                Some(caps) => Norm::Value(caps[1].to_string()),
                None => Norm::Rejected(s.trim().to_string()),
            }
        }
        Some(other) => Norm::Rejected(summarize(other)),
    }
}

/// Rated voltage → canonical volts ("600V", "600 V", 600).
fn norm_voltage(value: Option<&Value>) -> Norm<u32> {
    match value {
        None => Norm::Absent,
        Some(Value::Number(n)) => match n.as_u64() {
            Some(v) if v > 0 && v <= 35_000 => Norm::Value(v as u32),
            _ => Norm::Rejected(n.to_string()),
        },
        Some(Value::String(s)) if is_sentinel(s) => Norm::Absent,
        Some(Value::String(s)) => {
            let trimmed = s
                .trim()
                .trim_end_matches(|c: char| c.is_ascii_alphabetic())
                .trim();
            match trimmed.parse::<u32>() {
                Ok(v) if v > 0 && v <= 35_000 => Norm::Value(v),
                _ => Norm::Rejected(s.trim().to_string()),
            }
        }
        Some(other) => Norm::Rejected(summarize(other)),
    }
}

/// Non-negative quantity, accepting unit-suffixed text ("100 ft").
fn norm_quantity(value: Option<&Value>) -> Norm<f64> {
    match value {
        None => Norm::Absent,
        Some(Value::Number(n)) => match n.as_f64() {
            Some(v) if v.is_finite() && v >= 0.0 => Norm::Value(v),
            _ => Norm::Rejected(n.to_string()),
        },
        Some(Value::String(s)) if is_sentinel(s) => Norm::Absent,
        Some(Value::String(s)) => match number_re().captures(s.trim()) {
            Some(caps) => match caps[1].parse::<f64>() {
                Ok(v) => Norm::Value(v),
                Err(_) => Norm::Rejected(s.trim().to_string()),
            },
            None => Norm::Rejected(s.trim().to_string()),
        },
        Some(other) => Norm::Rejected(summarize(other)),
    }
}

/// Positive integer identifier or rating, accepting numeral-bearing text
/// ("Ckt 7", "20A").
fn norm_integer(value: Option<&Value>) -> Norm<u32> {
    match value {
        None => Norm::Absent,
        Some(Value::Number(n)) => match n.as_u64() {
            Some(v) if v > 0 && v <= u32::MAX as u64 => Norm::Value(v as u32),
            _ => Norm::Rejected(n.to_string()),
        },
        Some(Value::String(s)) if is_sentinel(s) => Norm::Absent,
        Some(Value::String(s)) => {
            static RE: OnceLock<Regex> = OnceLock::new();
            let re = RE.get_or_init(|| Regex::new(r"(\d+)").unwrap());
            match re.captures(s) {
                Some(caps) => match caps[1].parse::<u32>() {
                    Ok(v) if v > 0 => Norm::Value(v),
                    _ => Norm::Rejected(s.trim().to_string()),
                },
                None => Norm::Rejected(s.trim().to_string()),
            }
        }
        Some(other) => Norm::Rejected(summarize(other)),
    }
}

/// Descriptive text; anything non-string is rejected.
fn norm_text(value: Option<&Value>) -> Norm<String> {
    match value {
        None => Norm::Absent,
        Some(Value::String(s)) if is_sentinel(s) => Norm::Absent,
        Some(Value::String(s)) => Norm::Value(s.trim().to_string()),
        Some(other) => Norm::Rejected(summarize(other)),
    }
}

fn norm_bool(value: Option<&Value>) -> Norm<bool> {
    match value {
        None => Norm::Absent,
        Some(Value::Bool(b)) => Norm::Value(*b),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "continuous" => Norm::Value(true),
            "false" | "no" | "n" => Norm::Value(false),
            other if is_sentinel(other) => Norm::Absent,
            _ => Norm::Rejected(s.trim().to_string()),
        },
        Some(other) => Norm::Rejected(summarize(other)),
    }
}

/// Conductor metal, case-insensitive with common long forms.
fn norm_material(value: Option<&Value>) -> Norm<ConductorMaterial> {
    match value {
        None => Norm::Absent,
        Some(Value::String(s)) if is_sentinel(s) => Norm::Absent,
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "cu" | "copper" => Norm::Value(ConductorMaterial::Copper),
            "al" | "alum" | "aluminum" | "aluminium" => Norm::Value(ConductorMaterial::Aluminum),
            _ => Norm::Rejected(s.trim().to_string()),
        },
        Some(other) => Norm::Rejected(summarize(other)),
    }
}

/// Insulation type, case-insensitive, tolerating missing hyphens.
fn norm_insulation(value: Option<&Value>) -> Norm<InsulationType> {
    match value {
        None => Norm::Absent,
        Some(Value::String(s)) if is_sentinel(s) => Norm::Absent,
        Some(Value::String(s)) => {
            let canon = match s.trim().to_ascii_uppercase().as_str() {
                "THWN2" => "THWN-2".to_string(),
                "XHHW2" => "XHHW-2".to_string(),
                other => other.to_string(),
            };
            match InsulationType::from_str(&canon) {
                Ok(v) => Norm::Value(v),
                Err(_) => Norm::Rejected(s.trim().to_string()),
            }
        }
        Some(other) => Norm::Rejected(summarize(other)),
    }
}

/// Raceway type, case-insensitive with common synonyms.
fn norm_conduit_material(value: Option<&Value>) -> Norm<ConduitMaterial> {
    match value {
        None => Norm::Absent,
        Some(Value::String(s)) if is_sentinel(s) => Norm::Absent,
        Some(Value::String(s)) => {
            let canon = match s.trim().to_ascii_uppercase().as_str() {
                "GRC" | "RIGID" => "RMC".to_string(),
                other => other.to_string(),
            };
            match ConduitMaterial::from_str(&canon) {
                Ok(v) => Norm::Value(v),
                Err(_) => Norm::Rejected(s.trim().to_string()),
            }
        }
        Some(other) => Norm::Rejected(summarize(other)),
    }
}

/// Conduit trade size → canonical fraction token ("3/4", "1-1/4").
fn norm_trade_size(value: Option<&Value>) -> Norm<String> {
    const DECIMAL_SIZES: &[(f64, &str)] = &[
        (0.5, "1/2"),
        (0.75, "3/4"),
        (1.0, "1"),
        (1.25, "1-1/4"),
        (1.5, "1-1/2"),
        (2.0, "2"),
        (2.5, "2-1/2"),
        (3.0, "3"),
        (3.5, "3-1/2"),
        (4.0, "4"),
    ];

    match value {
        None => Norm::Absent,
        Some(Value::Number(n)) => match n.as_f64() {
            Some(v) => DECIMAL_SIZES
                .iter()
                .find(|(size, _)| (v - size).abs() < 1e-6)
                .map(|(_, token)| Norm::Value(token.to_string()))
                .unwrap_or_else(|| Norm::Rejected(n.to_string())),
            None => Norm::Rejected(n.to_string()),
        },
        Some(Value::String(s)) if is_sentinel(s) => Norm::Absent,
        Some(Value::String(s)) => {
            let token = s
                .trim()
                .trim_end_matches('"')
                .trim_end_matches("in.")
                .trim_end_matches("in")
                .trim()
                .to_string();
            if token.is_empty() {
                Norm::Absent
            } else {
                Norm::Value(token)
            }
        }
        Some(other) => Norm::Rejected(summarize(other)),
    }
}

/// Confidence label, case-insensitive.
fn norm_confidence(value: Option<&Value>) -> Norm<ConfidenceLevel> {
    match value {
        None => Norm::Absent,
        Some(Value::String(s)) if is_sentinel(s) => Norm::Absent,
        Some(Value::String(s)) => {
            match ConfidenceLevel::from_str(s.trim().to_ascii_lowercase().as_str()) {
                Ok(v) => Norm::Value(v),
                Err(_) => Norm::Rejected(s.trim().to_string()),
            }
        }
        Some(other) => Norm::Rejected(summarize(other)),
    }
}

// ═══════════════════════════════════════════════════════════
// Per-item parsing
// ═══════════════════════════════════════════════════════════

/// Collects field flags for one item and tracks the worst rejection so
/// the item's confidence can be degraded accordingly.
#[derive(Default)]
struct FieldAudit {
    flags: Vec<AssumptionFlag>,
    worst: Option<FlagSeverity>,
}

impl FieldAudit {
    fn reject(&mut self, field: &str, raw: &str, severity: FlagSeverity, action: &str) {
        self.flags.push(AssumptionFlag::new(
            field,
            Some(raw.to_string()),
            severity,
            action,
        ));
        self.worst = Some(self.worst.map_or(severity, |w| w.max(severity)));
    }

    fn assume(&mut self, field: &str, value: Option<String>, action: &str) {
        self.flags
            .push(AssumptionFlag::new(field, value, FlagSeverity::Low, action));
    }

    /// Declared confidence, degraded by the worst rejected field: a High
    /// rejection forces Assumed, lesser rejections cap at Estimated.
    fn degraded(&self, declared: ConfidenceLevel) -> ConfidenceLevel {
        match self.worst {
            None => declared,
            Some(FlagSeverity::High) => ConfidenceLevel::Assumed,
            Some(_) => declared.min(ConfidenceLevel::Estimated),
        }
    }
}

fn item_confidence(obj: &serde_json::Map<String, Value>, audit: &mut FieldAudit) -> ConfidenceLevel {
    match norm_confidence(obj.get("confidence")) {
        Norm::Value(c) => c,
        Norm::Absent => {
            audit.assume(
                "confidence",
                Some("assumed".into()),
                "No confidence label supplied; treated as assumed",
            );
            ConfidenceLevel::Assumed
        }
        Norm::Rejected(raw) => {
            audit.reject(
                "confidence",
                &raw,
                FlagSeverity::Low,
                "Unrecognized confidence label; treated as assumed",
            );
            ConfidenceLevel::Assumed
        }
    }
}

fn dropped_item_flag(kind: &str, field: &str, raw: Option<String>) -> AssumptionFlag {
    AssumptionFlag::new(
        field,
        raw,
        FlagSeverity::High,
        &format!("A {kind} entry had no usable {field} and was dropped; re-check the source"),
    )
}

fn parse_conductor(
    chunk_index: usize,
    ordinal: usize,
    value: &Value,
) -> Result<ConductorItem, AssumptionFlag> {
    let obj = value
        .as_object()
        .ok_or_else(|| dropped_item_flag("wire", "entry", Some(summarize(value))))?;

    let mut audit = FieldAudit::default();
    let declared = item_confidence(obj, &mut audit);

    let gauge = match norm_gauge(obj.get("gauge")) {
        Norm::Value(g) => g,
        Norm::Absent => return Err(dropped_item_flag("wire", "gauge", None)),
        Norm::Rejected(raw) => return Err(dropped_item_flag("wire", "gauge", Some(raw))),
    };

    let material = match norm_material(obj.get("material")) {
        Norm::Value(m) => Some(m),
        Norm::Absent => None,
        Norm::Rejected(raw) => {
            audit.reject(
                "material",
                &raw,
                FlagSeverity::High,
                "Unrecognized conductor metal; confirm on source drawing",
            );
            None
        }
    };

    let insulation = match norm_insulation(obj.get("insulation")) {
        Norm::Value(i) => Some(i),
        Norm::Absent => None,
        Norm::Rejected(raw) => {
            audit.reject(
                "insulation",
                &raw,
                FlagSeverity::High,
                "Unrecognized insulation type; confirm on source drawing",
            );
            None
        }
    };

    let voltage_rating = match norm_voltage(obj.get("voltage")) {
        Norm::Value(v) => Some(v),
        Norm::Absent => None,
        Norm::Rejected(raw) => {
            audit.reject(
                "voltage",
                &raw,
                FlagSeverity::High,
                "Unrecognized voltage rating; confirm on source drawing",
            );
            None
        }
    };

    let length_ft = match norm_quantity(obj.get("length_ft")) {
        Norm::Value(v) => v,
        Norm::Absent => {
            audit.assume(
                "length_ft",
                Some("0".into()),
                "No footage given; quantity recorded as zero",
            );
            0.0
        }
        Norm::Rejected(raw) => {
            audit.reject(
                "length_ft",
                &raw,
                FlagSeverity::Medium,
                "Unreadable footage; quantity recorded as zero",
            );
            0.0
        }
    };

    let count = match norm_integer(obj.get("count")) {
        Norm::Value(v) => v,
        Norm::Absent => 1,
        Norm::Rejected(raw) => {
            audit.reject(
                "count",
                &raw,
                FlagSeverity::Medium,
                "Unreadable conductor count; assumed 1",
            );
            1
        }
    };

    let load_amps = match norm_quantity(obj.get("load_amps")) {
        Norm::Value(v) => Some(v),
        Norm::Absent => None,
        Norm::Rejected(raw) => {
            audit.reject(
                "load_amps",
                &raw,
                FlagSeverity::Medium,
                "Unreadable load; compliance check skipped for this item",
            );
            None
        }
    };

    let continuous = match norm_bool(obj.get("continuous")) {
        Norm::Value(v) => v,
        Norm::Absent => false,
        Norm::Rejected(raw) => {
            audit.reject(
                "continuous",
                &raw,
                FlagSeverity::Low,
                "Unreadable continuous-load marker; assumed non-continuous",
            );
            false
        }
    };

    let confidence = audit.degraded(declared);
    Ok(ConductorItem {
        gauge,
        material,
        insulation,
        voltage_rating,
        length_ft,
        count,
        load_amps,
        continuous,
        confidence,
        detection: Detection::new(confidence, chunk_index, ordinal),
        flags: audit.flags,
    })
}

fn parse_conduit(
    chunk_index: usize,
    ordinal: usize,
    value: &Value,
) -> Result<ConduitItem, AssumptionFlag> {
    let obj = value
        .as_object()
        .ok_or_else(|| dropped_item_flag("conduit", "entry", Some(summarize(value))))?;

    let mut audit = FieldAudit::default();
    let declared = item_confidence(obj, &mut audit);

    let trade_size = match norm_trade_size(obj.get("trade_size")) {
        Norm::Value(v) => v,
        Norm::Absent => return Err(dropped_item_flag("conduit", "trade_size", None)),
        Norm::Rejected(raw) => {
            return Err(dropped_item_flag("conduit", "trade_size", Some(raw)))
        }
    };

    let material = match norm_conduit_material(obj.get("material")) {
        Norm::Value(m) => Some(m),
        Norm::Absent => None,
        Norm::Rejected(raw) => {
            audit.reject(
                "material",
                &raw,
                FlagSeverity::Medium,
                "Unrecognized raceway type; confirm on source drawing",
            );
            None
        }
    };

    let length_ft = match norm_quantity(obj.get("length_ft")) {
        Norm::Value(v) => v,
        Norm::Absent => {
            audit.assume(
                "length_ft",
                Some("0".into()),
                "No footage given; quantity recorded as zero",
            );
            0.0
        }
        Norm::Rejected(raw) => {
            audit.reject(
                "length_ft",
                &raw,
                FlagSeverity::Medium,
                "Unreadable footage; quantity recorded as zero",
            );
            0.0
        }
    };

    let confidence = audit.degraded(declared);
    Ok(ConduitItem {
        trade_size,
        material,
        length_ft,
        confidence,
        detection: Detection::new(confidence, chunk_index, ordinal),
        flags: audit.flags,
    })
}

fn parse_fixture(
    chunk_index: usize,
    ordinal: usize,
    value: &Value,
) -> Result<FixtureItem, AssumptionFlag> {
    let obj = value
        .as_object()
        .ok_or_else(|| dropped_item_flag("fixture", "entry", Some(summarize(value))))?;

    let mut audit = FieldAudit::default();
    let declared = item_confidence(obj, &mut audit);

    let type_code = match norm_text(obj.get("type_code")) {
        Norm::Value(v) => v,
        Norm::Absent => return Err(dropped_item_flag("fixture", "type_code", None)),
        Norm::Rejected(raw) => {
            return Err(dropped_item_flag("fixture", "type_code", Some(raw)))
        }
    };

    let description = match norm_text(obj.get("description")) {
        Norm::Value(v) => Some(v),
        Norm::Absent => None,
        Norm::Rejected(raw) => {
            audit.reject(
                "description",
                &raw,
                FlagSeverity::Low,
                "Unreadable fixture description dropped",
            );
            None
        }
    };

    let count = match norm_integer(obj.get("count")) {
        Norm::Value(v) => v,
        Norm::Absent => {
            audit.assume("count", Some("1".into()), "No count given; assumed 1");
            1
        }
        Norm::Rejected(raw) => {
            audit.reject(
                "count",
                &raw,
                FlagSeverity::Medium,
                "Unreadable fixture count; assumed 1",
            );
            1
        }
    };

    let confidence = audit.degraded(declared);
    Ok(FixtureItem {
        type_code,
        description,
        count,
        confidence,
        detection: Detection::new(confidence, chunk_index, ordinal),
        flags: audit.flags,
    })
}

fn parse_panel(
    chunk_index: usize,
    ordinal: &mut usize,
    value: &Value,
) -> Result<PanelItem, AssumptionFlag> {
    let obj = value
        .as_object()
        .ok_or_else(|| dropped_item_flag("panel", "entry", Some(summarize(value))))?;

    let mut audit = FieldAudit::default();
    let declared = item_confidence(obj, &mut audit);

    let name = match norm_text(obj.get("name")) {
        Norm::Value(v) => v,
        Norm::Absent => return Err(dropped_item_flag("panel", "name", None)),
        Norm::Rejected(raw) => return Err(dropped_item_flag("panel", "name", Some(raw))),
    };

    let voltage = match norm_text(obj.get("voltage")) {
        Norm::Value(v) => Some(v),
        Norm::Absent => None,
        Norm::Rejected(raw) => {
            audit.reject(
                "voltage",
                &raw,
                FlagSeverity::Medium,
                "Unreadable panel voltage; confirm on schedule",
            );
            None
        }
    };

    let phases = match norm_integer(obj.get("phases")) {
        Norm::Value(v) if v <= 3 => Some(v as u8),
        Norm::Value(v) => {
            audit.reject(
                "phases",
                &v.to_string(),
                FlagSeverity::Medium,
                "Implausible phase count dropped",
            );
            None
        }
        Norm::Absent => None,
        Norm::Rejected(raw) => {
            audit.reject(
                "phases",
                &raw,
                FlagSeverity::Medium,
                "Unreadable phase count dropped",
            );
            None
        }
    };

    let main_amps = match norm_integer(obj.get("main_amps")) {
        Norm::Value(v) => Some(v),
        Norm::Absent => None,
        Norm::Rejected(raw) => {
            audit.reject(
                "main_amps",
                &raw,
                FlagSeverity::Medium,
                "Unreadable main rating dropped",
            );
            None
        }
    };

    let panel_ordinal = *ordinal;
    let mut circuits: BTreeMap<u32, CircuitItem> = BTreeMap::new();
    if let Some(Value::Array(raw_circuits)) = obj.get("circuits") {
        for raw_circuit in raw_circuits {
            *ordinal += 1;
            match parse_circuit(chunk_index, *ordinal, raw_circuit) {
                Ok(circuit) => match circuits.remove(&circuit.number) {
                    // Same position listed twice in one response: resolve
                    // exactly like a cross-chunk duplicate.
                    Some(existing) => {
                        let number = circuit.number;
                        circuits.insert(number, merge_circuit(existing, circuit));
                    }
                    None => {
                        circuits.insert(circuit.number, circuit);
                    }
                },
                Err(flag) => audit.flags.push(flag),
            }
        }
    } else if let Some(other) = obj.get("circuits") {
        audit.reject(
            "circuits",
            &summarize(other),
            FlagSeverity::Medium,
            "Circuit list was not a list; circuits skipped",
        );
    }

    let confidence = audit.degraded(declared);
    Ok(PanelItem {
        name,
        voltage,
        phases,
        main_amps,
        circuits,
        confidence,
        detection: Detection::new(confidence, chunk_index, panel_ordinal),
        flags: audit.flags,
    })
}

fn parse_circuit(
    chunk_index: usize,
    ordinal: usize,
    value: &Value,
) -> Result<CircuitItem, AssumptionFlag> {
    let obj = value
        .as_object()
        .ok_or_else(|| dropped_item_flag("circuit", "entry", Some(summarize(value))))?;

    let mut audit = FieldAudit::default();
    let declared = item_confidence(obj, &mut audit);

    let number = match norm_integer(obj.get("number")) {
        Norm::Value(v) => v,
        Norm::Absent => return Err(dropped_item_flag("circuit", "number", None)),
        Norm::Rejected(raw) => return Err(dropped_item_flag("circuit", "number", Some(raw))),
    };

    let description = match norm_text(obj.get("description")) {
        Norm::Value(v) => Some(v),
        Norm::Absent => None,
        Norm::Rejected(raw) => {
            audit.reject(
                "description",
                &raw,
                FlagSeverity::Low,
                "Unreadable circuit description dropped",
            );
            None
        }
    };

    let breaker_amps = match norm_integer(obj.get("breaker_amps")) {
        Norm::Value(v) => Some(v),
        Norm::Absent => None,
        Norm::Rejected(raw) => {
            audit.reject(
                "breaker_amps",
                &raw,
                FlagSeverity::Medium,
                "Unreadable breaker rating dropped",
            );
            None
        }
    };

    let poles = match norm_integer(obj.get("poles")) {
        Norm::Value(v) if v <= 3 => Some(v as u8),
        Norm::Value(v) => {
            audit.reject(
                "poles",
                &v.to_string(),
                FlagSeverity::Low,
                "Implausible pole count dropped",
            );
            None
        }
        Norm::Absent => None,
        Norm::Rejected(raw) => {
            audit.reject(
                "poles",
                &raw,
                FlagSeverity::Low,
                "Unreadable pole count dropped",
            );
            None
        }
    };

    let continuous = match norm_bool(obj.get("continuous")) {
        Norm::Value(v) => v,
        Norm::Absent => false,
        Norm::Rejected(raw) => {
            audit.reject(
                "continuous",
                &raw,
                FlagSeverity::Low,
                "Unreadable continuous-load marker; assumed non-continuous",
            );
            false
        }
    };

    let confidence = audit.degraded(declared);
    Ok(CircuitItem {
        number,
        description,
        breaker_amps,
        poles,
        continuous,
        confidence,
        detection: Detection::new(confidence, chunk_index, ordinal),
        flags: audit.flags,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire_json(fields: &str) -> String {
        format!(r#"{{"wires": [{{{fields}}}]}}"#)
    }

    #[test]
    fn full_response_parses() {
        let raw = r#"{
            "wires": [
                {"gauge": "12", "material": "Cu", "insulation": "THHN",
                 "voltage": "600V", "length_ft": 100, "count": 3,
                 "confidence": "confirmed"}
            ],
            "conduits": [
                {"trade_size": "3/4", "material": "EMT", "length_ft": "50 ft",
                 "confidence": "estimated"}
            ],
            "panels": [
                {"name": "LP-1", "voltage": "208Y/120", "phases": 3,
                 "main_amps": 225, "confidence": "confirmed",
                 "circuits": [
                    {"number": 1, "description": "Lighting", "breaker_amps": 20,
                     "poles": 1, "continuous": true, "confidence": "confirmed"}
                 ]}
            ],
            "fixtures": [
                {"type_code": "A1", "description": "2x4 LED troffer",
                 "count": 24, "confidence": "estimated"}
            ]
        }"#;

        let out = validate_response(0, raw).unwrap();
        assert_eq!(out.conductors.len(), 1);
        assert_eq!(out.conduits.len(), 1);
        assert_eq!(out.panels.len(), 1);
        assert_eq!(out.fixtures.len(), 1);
        assert!(out.flags.is_empty());

        let wire = &out.conductors[0];
        assert_eq!(wire.gauge, "12");
        assert_eq!(wire.material, Some(ConductorMaterial::Copper));
        assert_eq!(wire.insulation, Some(InsulationType::Thhn));
        assert_eq!(wire.voltage_rating, Some(600));
        assert_eq!(wire.length_ft, 100.0);
        assert_eq!(wire.count, 3);
        assert_eq!(wire.confidence, ConfidenceLevel::Confirmed);
        assert!(wire.flags.is_empty());

        let panel = &out.panels[0];
        assert_eq!(panel.circuits.len(), 1);
        assert!(panel.circuits[&1].continuous);
    }

    #[test]
    fn fenced_payload_is_unwrapped() {
        let raw = "Here is the takeoff:\n```json\n{\"wires\": []}\n```\nDone.";
        assert!(validate_response(0, raw).is_ok());
    }

    #[test]
    fn brace_span_recovery() {
        let raw = "Sure! {\"wires\": []} Hope this helps.";
        assert!(validate_response(0, raw).is_ok());
    }

    #[test]
    fn unstructured_payload_is_an_error() {
        let result = validate_response(0, "no json here at all");
        assert!(matches!(result, Err(ValidateError::Unstructured(_))));
    }

    #[test]
    fn top_level_array_is_an_error() {
        let result = validate_response(0, "[1, 2, 3]");
        assert!(matches!(result, Err(ValidateError::Unstructured(_))));
    }

    #[test]
    fn empty_object_yields_empty_chunk() {
        let out = validate_response(2, "{}").unwrap();
        assert_eq!(out.chunk_index, 2);
        assert!(out.conductors.is_empty());
        assert!(out.flags.is_empty());
    }

    #[test]
    fn enum_matching_is_case_insensitive() {
        let raw = wire_json(
            r#""gauge": "12", "material": "copper", "insulation": "thhn",
               "voltage": 600, "confidence": "CONFIRMED""#,
        );
        let out = validate_response(0, &raw).unwrap();
        let wire = &out.conductors[0];
        assert_eq!(wire.material, Some(ConductorMaterial::Copper));
        assert_eq!(wire.insulation, Some(InsulationType::Thhn));
        assert_eq!(wire.confidence, ConfidenceLevel::Confirmed);
    }

    #[test]
    fn gauge_accepts_number_and_numeral_text() {
        for (raw, expect) in [
            (r#""gauge": 12"#, "12"),
            (r##""gauge": "#12 AWG""##, "12"),
            (r#""gauge": "1/0""#, "1/0"),
            (r#""gauge": "250 MCM""#, "250"),
            (r#""gauge": "250 kcmil""#, "250"),
        ] {
            let out = validate_response(0, &wire_json(&format!(
                r#"{raw}, "confidence": "confirmed""#
            )))
            .unwrap();
            assert_eq!(out.conductors[0].gauge, expect, "raw was {raw}");
        }
    }

    #[test]
    fn sentinel_voltage_coerces_to_absent_without_rejection() {
        let raw = wire_json(r#""gauge": "12", "voltage": "N/A", "confidence": "confirmed""#);
        let out = validate_response(0, &raw).unwrap();
        let wire = &out.conductors[0];
        assert_eq!(wire.voltage_rating, None);
        // Sentinel is a legal variant, not a rejection: confidence holds.
        assert_eq!(wire.confidence, ConfidenceLevel::Confirmed);
        assert!(wire.flags.iter().all(|f| f.field != "voltage"));
    }

    #[test]
    fn unknown_material_is_flagged_high_and_degrades_confidence() {
        let raw = wire_json(
            r#""gauge": "12", "material": "unobtainium", "confidence": "confirmed""#,
        );
        let out = validate_response(0, &raw).unwrap();
        let wire = &out.conductors[0];
        assert_eq!(wire.material, None);
        assert_eq!(wire.confidence, ConfidenceLevel::Assumed);
        let flag = wire.flags.iter().find(|f| f.field == "material").unwrap();
        assert_eq!(flag.severity, FlagSeverity::High);
        assert_eq!(flag.value.as_deref(), Some("unobtainium"));
    }

    #[test]
    fn unreadable_footage_is_flagged_medium() {
        let raw = wire_json(
            r#""gauge": "12", "length_ft": "a few hundred", "confidence": "confirmed""#,
        );
        let out = validate_response(0, &raw).unwrap();
        let wire = &out.conductors[0];
        assert_eq!(wire.length_ft, 0.0);
        assert_eq!(wire.confidence, ConfidenceLevel::Estimated);
        let flag = wire.flags.iter().find(|f| f.field == "length_ft").unwrap();
        assert_eq!(flag.severity, FlagSeverity::Medium);
    }

    #[test]
    fn missing_confidence_defaults_to_assumed_with_flag() {
        let raw = wire_json(r#""gauge": "12""#);
        let out = validate_response(0, &raw).unwrap();
        let wire = &out.conductors[0];
        assert_eq!(wire.confidence, ConfidenceLevel::Assumed);
        assert!(wire.flags.iter().any(|f| f.field == "confidence"));
    }

    #[test]
    fn wire_without_gauge_is_dropped_with_chunk_flag() {
        let raw = r#"{"wires": [{"material": "Cu", "confidence": "confirmed"}]}"#;
        let out = validate_response(0, raw).unwrap();
        assert!(out.conductors.is_empty());
        let flag = out.flags.iter().find(|f| f.field == "gauge").unwrap();
        assert_eq!(flag.severity, FlagSeverity::High);
    }

    #[test]
    fn non_object_item_is_dropped_with_chunk_flag() {
        let raw = r#"{"wires": ["12 AWG THHN"]}"#;
        let out = validate_response(0, raw).unwrap();
        assert!(out.conductors.is_empty());
        assert_eq!(out.flags.len(), 1);
    }

    #[test]
    fn wires_field_not_a_list_is_flagged() {
        let raw = r#"{"wires": "none"}"#;
        let out = validate_response(0, raw).unwrap();
        assert!(out.conductors.is_empty());
        assert!(out.flags.iter().any(|f| f.field == "wires"));
    }

    #[test]
    fn circuit_number_from_numeral_text() {
        let raw = r#"{"panels": [{"name": "LP-1", "confidence": "confirmed",
            "circuits": [{"number": "Ckt 7", "confidence": "confirmed"}]}]}"#;
        let out = validate_response(0, raw).unwrap();
        assert!(out.panels[0].circuits.contains_key(&7));
    }

    #[test]
    fn duplicate_circuit_numbers_merge_within_one_response() {
        let raw = r#"{"panels": [{"name": "LP-1", "confidence": "confirmed",
            "circuits": [
                {"number": 1, "description": "Lighting", "confidence": "confirmed"},
                {"number": 1, "description": "Lights (dup)", "confidence": "assumed"}
            ]}]}"#;
        let out = validate_response(0, raw).unwrap();
        let panel = &out.panels[0];
        assert_eq!(panel.circuits.len(), 1);
        let circuit = &panel.circuits[&1];
        // Confirmed detection owns the description; confidence is pessimistic.
        assert_eq!(circuit.description.as_deref(), Some("Lighting"));
        assert_eq!(circuit.confidence, ConfidenceLevel::Assumed);
    }

    #[test]
    fn circuit_without_number_flags_panel() {
        let raw = r#"{"panels": [{"name": "LP-1", "confidence": "confirmed",
            "circuits": [{"description": "Spare", "confidence": "assumed"}]}]}"#;
        let out = validate_response(0, raw).unwrap();
        let panel = &out.panels[0];
        assert!(panel.circuits.is_empty());
        assert!(panel.flags.iter().any(|f| f.field == "number"));
    }

    #[test]
    fn trade_size_from_decimal_number() {
        let raw = r#"{"conduits": [{"trade_size": 0.75, "confidence": "confirmed"}]}"#;
        let out = validate_response(0, raw).unwrap();
        assert_eq!(out.conduits[0].trade_size, "3/4");
    }

    #[test]
    fn conduit_synonym_grc_maps_to_rmc() {
        let raw = r#"{"conduits": [{"trade_size": "1", "material": "GRC",
            "confidence": "confirmed"}]}"#;
        let out = validate_response(0, raw).unwrap();
        assert_eq!(out.conduits[0].material, Some(ConduitMaterial::Rmc));
    }

    #[test]
    fn ordinals_are_assigned_in_response_order() {
        let raw = r#"{
            "wires": [
                {"gauge": "12", "confidence": "confirmed"},
                {"gauge": "10", "confidence": "confirmed"}
            ],
            "fixtures": [{"type_code": "A1", "confidence": "confirmed"}]
        }"#;
        let out = validate_response(3, raw).unwrap();
        assert_eq!(out.conductors[0].detection.origin.chunk, 3);
        assert_eq!(out.conductors[0].detection.origin.ordinal, 0);
        assert_eq!(out.conductors[1].detection.origin.ordinal, 1);
        assert_eq!(out.fixtures[0].detection.origin.ordinal, 2);
    }
}
