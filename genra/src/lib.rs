//! A register allocator for Gen-style GPU register files.
//!
//! Given the output of instruction selection (a [Selection]), the live-out sets of its blocks (a
//! [LiveOut]), the layout of the kernel's dispatch payload (a [Kernel]) and a source of register
//! file space (a [RegFileAllocator]), [allocate_registers] gives every used virtual register a
//! physical location, honouring the contiguity requirements of vector operands. The resulting
//! [RegAllocation] translates selection operands into physical operands for the encoder.
//!
//! The debug environment variables `GENRAD_LOG`, `GENRAD_LOG_IR` (with the `genrad` feature) and
//! `GENRAD_LOG_STATS` are read by [Config::new].

#![allow(clippy::upper_case_acronyms)]

pub mod config;
pub mod errors;
pub mod liveness;
mod log;
pub mod payload;
pub mod phys;
pub mod reg;
pub mod regalloc;
pub mod regfile;
pub mod selection;

pub use self::config::{Config, SimdWidth};
pub use self::errors::AllocError;
pub use self::liveness::LiveOut;
pub use self::log::stats::Stats;
pub use self::payload::Kernel;
pub use self::regalloc::{allocate_registers, RegAllocation};
pub use self::regfile::{FreeList, RegFileAllocator};
pub use self::selection::Selection;
