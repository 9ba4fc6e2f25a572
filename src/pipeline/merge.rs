//! Confidence-aware accumulation of validated results into the running
//! bill of materials.
//!
//! The merge is commutative and associative over the validated result
//! set: chunk overlap produces duplicate detections and workers complete
//! out of order, so any permutation or partition of the same results must
//! fold to an identical bill. Three rules make that hold:
//! - summable quantities add;
//! - non-summable fields belong to the highest-ranked detection
//!   (`Detection::outranks`), which is a fold of max and therefore
//!   grouping-independent;
//! - merged confidence is the pessimistic minimum, and flag lists combine
//!   into a canonically sorted multiset.

use crate::models::bom::{
    AssumptionFlag, BillOfMaterials, CircuitItem, ConductorItem, ConduitItem, FixtureItem,
    PanelItem,
};

use super::validator::ValidatedChunk;

/// Fold one chunk's validated results into the bill.
pub fn merge_chunk(mut bom: BillOfMaterials, chunk: ValidatedChunk) -> BillOfMaterials {
    let chunk_index = chunk.chunk_index;

    for item in chunk.conductors {
        let key = item.merge_key();
        let merged = match bom.conductors.remove(&key) {
            Some(existing) => merge_conductor(existing, item),
            None => item,
        };
        bom.conductors.insert(key, merged);
    }

    for item in chunk.conduits {
        let key = item.merge_key();
        let merged = match bom.conduits.remove(&key) {
            Some(existing) => merge_conduit(existing, item),
            None => item,
        };
        bom.conduits.insert(key, merged);
    }

    for item in chunk.panels {
        let key = item.merge_key();
        let merged = match bom.panels.remove(&key) {
            Some(existing) => merge_panel(existing, item),
            None => item,
        };
        bom.panels.insert(key, merged);
    }

    for item in chunk.fixtures {
        let key = item.merge_key();
        let merged = match bom.fixtures.remove(&key) {
            Some(existing) => merge_fixture(existing, item),
            None => item,
        };
        bom.fixtures.insert(key, merged);
    }

    for flag in chunk.flags {
        bom.add_document_flag(chunk_index, flag);
    }

    bom
}

/// Fold a whole bill into another (session-level accumulation across
/// documents). Items combine under the same per-type rules; document
/// flags combine per chunk index.
pub fn merge_bom(mut a: BillOfMaterials, b: BillOfMaterials) -> BillOfMaterials {
    for (key, item) in b.conductors {
        let merged = match a.conductors.remove(&key) {
            Some(existing) => merge_conductor(existing, item),
            None => item,
        };
        a.conductors.insert(key, merged);
    }
    for (key, item) in b.conduits {
        let merged = match a.conduits.remove(&key) {
            Some(existing) => merge_conduit(existing, item),
            None => item,
        };
        a.conduits.insert(key, merged);
    }
    for (key, item) in b.panels {
        let merged = match a.panels.remove(&key) {
            Some(existing) => merge_panel(existing, item),
            None => item,
        };
        a.panels.insert(key, merged);
    }
    for (key, item) in b.fixtures {
        let merged = match a.fixtures.remove(&key) {
            Some(existing) => merge_fixture(existing, item),
            None => item,
        };
        a.fixtures.insert(key, merged);
    }
    for (chunk, flags) in b.document_flags {
        a.document_flags.entry(chunk).or_default().extend(flags);
    }
    a
}

/// Canonical flag order: worst severity first, then by content. Sorting
/// makes the combined list a multiset, independent of merge grouping.
fn merge_flags(mut a: Vec<AssumptionFlag>, b: Vec<AssumptionFlag>) -> Vec<AssumptionFlag> {
    a.extend(b);
    a.sort_by(|x, y| {
        y.severity
            .cmp(&x.severity)
            .then_with(|| x.field.cmp(&y.field))
            .then_with(|| x.value.cmp(&y.value))
            .then_with(|| x.action.cmp(&y.action))
    });
    a
}

/// Merge two conductor detections with equal merge keys.
pub fn merge_conductor(a: ConductorItem, b: ConductorItem) -> ConductorItem {
    debug_assert_eq!(a.merge_key(), b.merge_key());
    let confidence = a.confidence.min(b.confidence);
    let (owner, other) = if a.detection.outranks(&b.detection) {
        (a, b)
    } else {
        (b, a)
    };

    ConductorItem {
        gauge: owner.gauge,
        material: owner.material,
        insulation: owner.insulation,
        voltage_rating: owner.voltage_rating,
        length_ft: owner.length_ft + other.length_ft,
        count: owner.count + other.count,
        load_amps: owner.load_amps,
        continuous: owner.continuous,
        confidence,
        detection: owner.detection,
        flags: merge_flags(owner.flags, other.flags),
    }
}

/// Merge two conduit detections with equal merge keys.
pub fn merge_conduit(a: ConduitItem, b: ConduitItem) -> ConduitItem {
    debug_assert_eq!(a.merge_key(), b.merge_key());
    let confidence = a.confidence.min(b.confidence);
    let (owner, other) = if a.detection.outranks(&b.detection) {
        (a, b)
    } else {
        (b, a)
    };

    ConduitItem {
        trade_size: owner.trade_size,
        material: owner.material,
        length_ft: owner.length_ft + other.length_ft,
        confidence,
        detection: owner.detection,
        flags: merge_flags(owner.flags, other.flags),
    }
}

/// Merge two detections of the same circuit position.
pub fn merge_circuit(a: CircuitItem, b: CircuitItem) -> CircuitItem {
    debug_assert_eq!(a.number, b.number);
    let confidence = a.confidence.min(b.confidence);
    let (owner, other) = if a.detection.outranks(&b.detection) {
        (a, b)
    } else {
        (b, a)
    };

    CircuitItem {
        number: owner.number,
        description: owner.description,
        breaker_amps: owner.breaker_amps,
        poles: owner.poles,
        continuous: owner.continuous,
        confidence,
        detection: owner.detection,
        flags: merge_flags(owner.flags, other.flags),
    }
}

/// Merge two panel detections; circuit lists merge recursively by
/// circuit number.
pub fn merge_panel(a: PanelItem, b: PanelItem) -> PanelItem {
    debug_assert_eq!(a.merge_key(), b.merge_key());
    let confidence = a.confidence.min(b.confidence);
    let (owner, other) = if a.detection.outranks(&b.detection) {
        (a, b)
    } else {
        (b, a)
    };

    let mut circuits = owner.circuits;
    for (number, circuit) in other.circuits {
        let merged = match circuits.remove(&number) {
            Some(existing) => merge_circuit(existing, circuit),
            None => circuit,
        };
        circuits.insert(number, merged);
    }

    PanelItem {
        name: owner.name,
        voltage: owner.voltage,
        phases: owner.phases,
        main_amps: owner.main_amps,
        circuits,
        confidence,
        detection: owner.detection,
        flags: merge_flags(owner.flags, other.flags),
    }
}

/// Merge two fixture detections with equal merge keys.
pub fn merge_fixture(a: FixtureItem, b: FixtureItem) -> FixtureItem {
    debug_assert_eq!(a.merge_key(), b.merge_key());
    let confidence = a.confidence.min(b.confidence);
    let (owner, other) = if a.detection.outranks(&b.detection) {
        (a, b)
    } else {
        (b, a)
    };

    FixtureItem {
        type_code: owner.type_code,
        description: owner.description,
        count: owner.count + other.count,
        confidence,
        detection: owner.detection,
        flags: merge_flags(owner.flags, other.flags),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::bom::Detection;
    use crate::models::enums::{
        ConductorMaterial, ConfidenceLevel, FlagSeverity, InsulationType,
    };

    fn conductor(
        length: f64,
        confidence: ConfidenceLevel,
        chunk: usize,
        ordinal: usize,
    ) -> ConductorItem {
        ConductorItem {
            gauge: "12".into(),
            material: Some(ConductorMaterial::Copper),
            insulation: Some(InsulationType::Thhn),
            voltage_rating: Some(600),
            length_ft: length,
            count: 1,
            load_amps: None,
            continuous: false,
            confidence,
            detection: Detection::new(confidence, chunk, ordinal),
            flags: vec![],
        }
    }

    fn chunk_with_conductor(chunk_index: usize, item: ConductorItem) -> ValidatedChunk {
        ValidatedChunk {
            chunk_index,
            conductors: vec![item],
            ..Default::default()
        }
    }

    #[test]
    fn duplicate_detection_sums_footage_and_downgrades_confidence() {
        // Two chunks both see the same 12 AWG THHN 600V run: one Confirmed
        // at 100 ft, one Estimated at 150 ft.
        let a = conductor(100.0, ConfidenceLevel::Confirmed, 0, 0);
        let b = conductor(150.0, ConfidenceLevel::Estimated, 1, 0);

        let bom = merge_chunk(
            merge_chunk(BillOfMaterials::new(), chunk_with_conductor(0, a)),
            chunk_with_conductor(1, b),
        );

        assert_eq!(bom.conductors.len(), 1);
        let merged = bom.conductors.values().next().unwrap();
        assert_eq!(merged.length_ft, 250.0);
        assert_eq!(merged.count, 2);
        assert_eq!(merged.confidence, ConfidenceLevel::Estimated);
    }

    #[test]
    fn confirmed_plus_assumed_is_assumed() {
        let a = conductor(10.0, ConfidenceLevel::Confirmed, 0, 0);
        let b = conductor(20.0, ConfidenceLevel::Assumed, 1, 0);
        let merged = merge_conductor(a, b);
        assert_eq!(merged.confidence, ConfidenceLevel::Assumed);
    }

    #[test]
    fn higher_confidence_owns_non_summable_fields() {
        let mut a = conductor(10.0, ConfidenceLevel::Assumed, 0, 0);
        a.load_amps = Some(16.0);
        let mut b = conductor(20.0, ConfidenceLevel::Confirmed, 5, 0);
        b.load_amps = Some(20.0);

        // Ownership does not depend on argument order.
        assert_eq!(merge_conductor(a.clone(), b.clone()).load_amps, Some(20.0));
        assert_eq!(merge_conductor(b, a).load_amps, Some(20.0));
    }

    #[test]
    fn equal_confidence_earlier_detection_wins() {
        let mut a = conductor(10.0, ConfidenceLevel::Estimated, 2, 0);
        a.material = Some(ConductorMaterial::Copper);
        let mut b = conductor(20.0, ConfidenceLevel::Estimated, 4, 0);
        b.material = Some(ConductorMaterial::Aluminum);

        let merged = merge_conductor(b.clone(), a.clone());
        assert_eq!(merged.material, Some(ConductorMaterial::Copper));
        assert_eq!(merged.detection.origin.chunk, 2);
    }

    #[test]
    fn merge_is_commutative_and_associative() {
        // Three detections with conflicting non-summable values; the
        // Confirmed one has no load listed, so the merged item must end
        // with no load regardless of grouping or order.
        let x = conductor(10.0, ConfidenceLevel::Confirmed, 0, 0);
        let mut y = conductor(20.0, ConfidenceLevel::Assumed, 1, 0);
        y.load_amps = Some(15.0);
        let mut z = conductor(30.0, ConfidenceLevel::Estimated, 2, 0);
        z.load_amps = Some(18.0);

        let chunks = [
            chunk_with_conductor(0, x),
            chunk_with_conductor(1, y),
            chunk_with_conductor(2, z),
        ];

        let orders: &[[usize; 3]] = &[
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];

        let mut exports = Vec::new();
        for order in orders {
            let mut bom = BillOfMaterials::new();
            for &i in order {
                bom = merge_chunk(bom, chunks[i].clone());
            }
            exports.push(serde_json::to_string(&bom.export()).unwrap());
        }

        for export in &exports[1..] {
            assert_eq!(export, &exports[0]);
        }

        let mut bom = BillOfMaterials::new();
        for chunk in chunks {
            bom = merge_chunk(bom, chunk);
        }
        let merged = bom.conductors.values().next().unwrap();
        assert_eq!(merged.length_ft, 60.0);
        assert_eq!(merged.load_amps, None);
        assert_eq!(merged.confidence, ConfidenceLevel::Assumed);
    }

    #[test]
    fn flag_lists_concatenate_without_dedup() {
        let mut a = conductor(10.0, ConfidenceLevel::Estimated, 0, 0);
        a.flags.push(AssumptionFlag::new(
            "material",
            Some("cu?".into()),
            FlagSeverity::High,
            "check",
        ));
        let mut b = conductor(20.0, ConfidenceLevel::Estimated, 1, 0);
        b.flags.push(AssumptionFlag::new(
            "material",
            Some("cu?".into()),
            FlagSeverity::High,
            "check",
        ));
        b.flags.push(AssumptionFlag::new(
            "length_ft",
            None,
            FlagSeverity::Low,
            "measure",
        ));

        let merged = merge_conductor(a, b);
        assert_eq!(merged.flags.len(), 3);
        // Canonical order: worst severity first.
        assert_eq!(merged.flags[0].severity, FlagSeverity::High);
        assert_eq!(merged.flags[2].severity, FlagSeverity::Low);
    }

    #[test]
    fn panels_merge_circuits_by_number() {
        use std::collections::BTreeMap;

        let circuit = |number: u32, desc: &str, conf: ConfidenceLevel, chunk: usize| CircuitItem {
            number,
            description: Some(desc.into()),
            breaker_amps: Some(20),
            poles: Some(1),
            continuous: false,
            confidence: conf,
            detection: Detection::new(conf, chunk, number as usize),
            flags: vec![],
        };

        let panel = |chunk: usize, circuits: Vec<CircuitItem>, conf: ConfidenceLevel| {
            let map: BTreeMap<u32, CircuitItem> =
                circuits.into_iter().map(|c| (c.number, c)).collect();
            PanelItem {
                name: "LP-1".into(),
                voltage: Some("208Y/120".into()),
                phases: Some(3),
                main_amps: Some(225),
                circuits: map,
                confidence: conf,
                detection: Detection::new(conf, chunk, 0),
                flags: vec![],
            }
        };

        // Chunk 0 saw circuits 1-2; chunk 1 saw circuits 2-3 (overlap).
        let a = panel(
            0,
            vec![
                circuit(1, "Lighting", ConfidenceLevel::Confirmed, 0),
                circuit(2, "Receptacles", ConfidenceLevel::Confirmed, 0),
            ],
            ConfidenceLevel::Confirmed,
        );
        let b = panel(
            1,
            vec![
                circuit(2, "Recepts", ConfidenceLevel::Estimated, 1),
                circuit(3, "HVAC", ConfidenceLevel::Estimated, 1),
            ],
            ConfidenceLevel::Estimated,
        );

        let merged = merge_panel(a, b);
        assert_eq!(merged.circuits.len(), 3);
        // Circuit 2: the Confirmed detection owns the description, the
        // confidence is the pessimistic minimum.
        assert_eq!(merged.circuits[&2].description.as_deref(), Some("Receptacles"));
        assert_eq!(merged.circuits[&2].confidence, ConfidenceLevel::Estimated);
        assert_eq!(merged.confidence, ConfidenceLevel::Estimated);
    }

    #[test]
    fn fixture_counts_add() {
        let fixture = |count: u32, conf: ConfidenceLevel, chunk: usize| FixtureItem {
            type_code: "A1".into(),
            description: Some("2x4 LED troffer".into()),
            count,
            confidence: conf,
            detection: Detection::new(conf, chunk, 0),
            flags: vec![],
        };

        let merged = merge_fixture(
            fixture(24, ConfidenceLevel::Confirmed, 0),
            fixture(12, ConfidenceLevel::Confirmed, 1),
        );
        assert_eq!(merged.count, 36);
    }

    #[test]
    fn chunk_flags_land_in_document_flags() {
        let chunk = ValidatedChunk {
            chunk_index: 7,
            flags: vec![AssumptionFlag::new(
                "gauge",
                None,
                FlagSeverity::High,
                "dropped a wire entry",
            )],
            ..Default::default()
        };
        let bom = merge_chunk(BillOfMaterials::new(), chunk);
        assert_eq!(bom.document_flags[&7].len(), 1);
    }
}
