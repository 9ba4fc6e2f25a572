use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error for a string that matches no canonical enum value.
#[derive(Debug, Clone, Error)]
#[error("Invalid {field} value: {value}")]
pub struct InvalidEnumValue {
    pub field: String,
    pub value: String,
}

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// FromStr matches the canonical spelling only; lenient coercion of raw
/// extraction output lives in the validator.
macro_rules! str_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = InvalidEnumValue;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(InvalidEnumValue {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }
    };
}

str_enum!(
    /// Conductor metal. Canonical form is the chemical-symbol shorthand
    /// used on drawings ("Cu", "Al").
    ConductorMaterial {
        Copper => "Cu",
        Aluminum => "Al",
    }
);

str_enum!(
    /// Conductor insulation type, canonical uppercase trade designation.
    InsulationType {
        Tw => "TW",
        Thw => "THW",
        Thwn => "THWN",
        Thhn => "THHN",
        Thwn2 => "THWN-2",
        Xhhw => "XHHW",
        Xhhw2 => "XHHW-2",
        Use => "USE",
    }
);

str_enum!(
    /// Insulation temperature rating column.
    TempRating {
        C60 => "60C",
        C75 => "75C",
        C90 => "90C",
    }
);

str_enum!(
    /// Raceway type, canonical uppercase trade abbreviation.
    ConduitMaterial {
        Emt => "EMT",
        Imc => "IMC",
        Rmc => "RMC",
        Pvc => "PVC",
        Fmc => "FMC",
        Lfmc => "LFMC",
    }
);

str_enum!(
    /// Provenance label on every extracted value.
    /// Variant order is the merge order: Assumed < Estimated < Confirmed,
    /// and a merged item keeps the minimum (most pessimistic) level.
    ConfidenceLevel {
        Assumed => "assumed",
        Estimated => "estimated",
        Confirmed => "confirmed",
    }
);

str_enum!(
    /// How much an assumption or rejection matters downstream.
    FlagSeverity {
        Low => "low",
        Medium => "medium",
        High => "high",
    }
);

str_enum!(
    /// Source file format of an ingested document.
    SourceFormat {
        Pdf => "pdf",
        Docx => "docx",
        Xlsx => "xlsx",
        Image => "image",
        CadText => "cad_text",
        PlainText => "plain_text",
    }
);

impl InsulationType {
    /// Temperature rating column for this insulation.
    pub fn temp_rating(&self) -> TempRating {
        match self {
            Self::Tw => TempRating::C60,
            Self::Thw | Self::Thwn | Self::Use => TempRating::C75,
            Self::Thhn | Self::Thwn2 | Self::Xhhw | Self::Xhhw2 => TempRating::C90,
        }
    }
}

impl TempRating {
    /// Rating in degrees Celsius.
    pub fn degrees(&self) -> u32 {
        match self {
            Self::C60 => 60,
            Self::C75 => 75,
            Self::C90 => 90,
        }
    }
}

impl SourceFormat {
    /// Guess the format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Self::Pdf,
            "docx" | "doc" => Self::Docx,
            "xlsx" | "xls" | "csv" => Self::Xlsx,
            "png" | "jpg" | "jpeg" | "tif" | "tiff" => Self::Image,
            "dxf" | "dwg" => Self::CadText,
            _ => Self::PlainText,
        }
    }
}
