//! Code tables backing the derating engine: allowable ampacities,
//! ambient-temperature correction factors, bundling adjustment factors,
//! and the standard ampacity steps.
//!
//! Ampacity rows for 14–10 AWG carry the small-conductor overcurrent caps
//! folded in, so every temperature column reads the enforceable value
//! (e.g. 12 AWG copper is 20 A in all three columns).

/// Allowable ampacity per temperature-rating column for one conductor size.
pub(crate) struct AmpacityRow {
    pub gauge: &'static str,
    pub c60: f64,
    pub c75: f64,
    pub c90: f64,
}

pub(crate) const COPPER_AMPACITY: &[AmpacityRow] = &[
    AmpacityRow { gauge: "14", c60: 15.0, c75: 15.0, c90: 15.0 },
    AmpacityRow { gauge: "12", c60: 20.0, c75: 20.0, c90: 20.0 },
    AmpacityRow { gauge: "10", c60: 30.0, c75: 30.0, c90: 30.0 },
    AmpacityRow { gauge: "8", c60: 40.0, c75: 50.0, c90: 55.0 },
    AmpacityRow { gauge: "6", c60: 55.0, c75: 65.0, c90: 75.0 },
    AmpacityRow { gauge: "4", c60: 70.0, c75: 85.0, c90: 95.0 },
    AmpacityRow { gauge: "3", c60: 85.0, c75: 100.0, c90: 110.0 },
    AmpacityRow { gauge: "2", c60: 95.0, c75: 115.0, c90: 130.0 },
    AmpacityRow { gauge: "1", c60: 110.0, c75: 130.0, c90: 145.0 },
    AmpacityRow { gauge: "1/0", c60: 125.0, c75: 150.0, c90: 170.0 },
    AmpacityRow { gauge: "2/0", c60: 145.0, c75: 175.0, c90: 195.0 },
    AmpacityRow { gauge: "3/0", c60: 165.0, c75: 200.0, c90: 225.0 },
    AmpacityRow { gauge: "4/0", c60: 195.0, c75: 230.0, c90: 260.0 },
    AmpacityRow { gauge: "250", c60: 215.0, c75: 255.0, c90: 290.0 },
    AmpacityRow { gauge: "300", c60: 240.0, c75: 285.0, c90: 320.0 },
    AmpacityRow { gauge: "350", c60: 260.0, c75: 310.0, c90: 350.0 },
    AmpacityRow { gauge: "400", c60: 280.0, c75: 335.0, c90: 380.0 },
    AmpacityRow { gauge: "500", c60: 320.0, c75: 380.0, c90: 430.0 },
];

// No 14 AWG aluminum row: not a listed size.
pub(crate) const ALUMINUM_AMPACITY: &[AmpacityRow] = &[
    AmpacityRow { gauge: "12", c60: 15.0, c75: 15.0, c90: 15.0 },
    AmpacityRow { gauge: "10", c60: 25.0, c75: 25.0, c90: 25.0 },
    AmpacityRow { gauge: "8", c60: 30.0, c75: 40.0, c90: 45.0 },
    AmpacityRow { gauge: "6", c60: 40.0, c75: 50.0, c90: 60.0 },
    AmpacityRow { gauge: "4", c60: 55.0, c75: 65.0, c90: 75.0 },
    AmpacityRow { gauge: "3", c60: 65.0, c75: 75.0, c90: 85.0 },
    AmpacityRow { gauge: "2", c60: 75.0, c75: 90.0, c90: 100.0 },
    AmpacityRow { gauge: "1", c60: 85.0, c75: 100.0, c90: 115.0 },
    AmpacityRow { gauge: "1/0", c60: 100.0, c75: 120.0, c90: 135.0 },
    AmpacityRow { gauge: "2/0", c60: 115.0, c75: 135.0, c90: 150.0 },
    AmpacityRow { gauge: "3/0", c60: 130.0, c75: 155.0, c90: 175.0 },
    AmpacityRow { gauge: "4/0", c60: 150.0, c75: 180.0, c90: 205.0 },
    AmpacityRow { gauge: "250", c60: 170.0, c75: 205.0, c90: 230.0 },
    AmpacityRow { gauge: "300", c60: 195.0, c75: 230.0, c90: 260.0 },
    AmpacityRow { gauge: "350", c60: 210.0, c75: 250.0, c90: 280.0 },
    AmpacityRow { gauge: "400", c60: 225.0, c75: 270.0, c90: 305.0 },
    AmpacityRow { gauge: "500", c60: 260.0, c75: 310.0, c90: 350.0 },
];

/// Ambient-temperature correction band. `max_c` is the inclusive upper
/// bound of the band; the 26–30 °C band is the 1.00 baseline. A `None`
/// cell means conductors of that rating are not permitted at that ambient.
pub(crate) struct AmbientBand {
    pub max_c: f64,
    pub c60: Option<f64>,
    pub c75: Option<f64>,
    pub c90: Option<f64>,
}

pub(crate) const AMBIENT_CORRECTION: &[AmbientBand] = &[
    AmbientBand { max_c: 10.0, c60: Some(1.29), c75: Some(1.20), c90: Some(1.15) },
    AmbientBand { max_c: 15.0, c60: Some(1.22), c75: Some(1.15), c90: Some(1.12) },
    AmbientBand { max_c: 20.0, c60: Some(1.15), c75: Some(1.11), c90: Some(1.08) },
    AmbientBand { max_c: 25.0, c60: Some(1.08), c75: Some(1.05), c90: Some(1.04) },
    AmbientBand { max_c: 30.0, c60: Some(1.00), c75: Some(1.00), c90: Some(1.00) },
    AmbientBand { max_c: 35.0, c60: Some(0.91), c75: Some(0.94), c90: Some(0.96) },
    AmbientBand { max_c: 40.0, c60: Some(0.82), c75: Some(0.88), c90: Some(0.91) },
    AmbientBand { max_c: 45.0, c60: Some(0.71), c75: Some(0.82), c90: Some(0.87) },
    AmbientBand { max_c: 50.0, c60: Some(0.58), c75: Some(0.75), c90: Some(0.82) },
    AmbientBand { max_c: 55.0, c60: Some(0.41), c75: Some(0.67), c90: Some(0.76) },
    AmbientBand { max_c: 60.0, c60: None, c75: Some(0.58), c90: Some(0.71) },
    AmbientBand { max_c: 65.0, c60: None, c75: Some(0.47), c90: Some(0.65) },
    AmbientBand { max_c: 70.0, c60: None, c75: None, c90: Some(0.58) },
    AmbientBand { max_c: 75.0, c60: None, c75: None, c90: Some(0.50) },
    AmbientBand { max_c: 80.0, c60: None, c75: None, c90: Some(0.41) },
    AmbientBand { max_c: 85.0, c60: None, c75: None, c90: Some(0.29) },
];

/// Adjustment factor per current-carrying-conductor count band.
/// Entries are (inclusive upper bound, factor); the last band is open.
pub(crate) const BUNDLING_CORRECTION: &[(u32, f64)] = &[
    (3, 1.00),
    (6, 0.80),
    (9, 0.70),
    (20, 0.50),
    (30, 0.45),
    (40, 0.40),
    (u32::MAX, 0.35),
];

/// Standard ampacity ratings, including the small fuse steps.
pub(crate) const STANDARD_AMPACITY_STEPS: &[u32] = &[
    1, 3, 6, 10, 15, 20, 25, 30, 35, 40, 45, 50, 60, 70, 80, 90, 100, 110, 125, 150, 175,
    200, 225, 250, 300, 350, 400, 450, 500, 600, 700, 800, 1000, 1200, 1600, 2000,
];
