pub mod bom;
pub mod document;
pub mod enums;

pub use bom::*;
pub use document::*;
pub use enums::*;
