//! The ways in which register allocation can fail.
//!
//! None of these are recoverable from the allocator's point of view: either a complete allocation
//! map is produced, or compilation of the unit is aborted.

use crate::reg::VReg;
use thiserror::Error;

/// A failure to allocate registers for a compiled unit.
#[derive(Error, Debug, PartialEq)]
pub enum AllocError {
    /// The compilation context asked for something the hardware (or this allocator) does not
    /// support, e.g. a SIMD width other than 8 or 16. Well formed input never triggers this.
    #[error("Unsupported configuration: {0}")]
    UnsupportedConfig(String),
    /// The register file was exhausted: even after every expirable interval was reclaimed, no
    /// block of `size` bytes aligned to `align` could be found for `vreg`. There is no spill path,
    /// so this ends compilation.
    #[error("Register allocation failed: no {size} byte block (alignment {align}) for {vreg}")]
    Exhausted { vreg: VReg, size: u32, align: u32 },
    /// Something went wrong that is almost certainly the result of a bug in this crate or one of
    /// its collaborators.
    #[error("Internal error: {0}")]
    Internal(String),
}
