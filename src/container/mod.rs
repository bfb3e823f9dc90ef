//! # Preservation Containers
//!
//! Track-level container formats, as opposed to the sector-level
//! [`crate::fs`] engines above them: IPF/CAPS (§4.3) and DFI (§4.4).

pub mod dfi;
pub mod ipf;
