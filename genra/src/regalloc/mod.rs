//! The register allocator.
//!
//! Allocation of a [Selection] proceeds in phases:
//!
//!   1. [coalesce]: decide which block each vector member will live in, inserting copies into the
//!      selection where a register can't be part of a vector.
//!   2. [fixed]: give registers provided by the hardware or the payload their fixed locations.
//!   3. [extend]: compute the live interval of every register.
//!   4. [linear_scan]: give every other used register a location, reclaiming the locations of
//!      registers whose intervals have ended.
//!
//! The result is a [RegAllocation], which [RegAllocation::gen_reg] then uses to turn each
//! selection operand into a physical operand during encoding.
//!
//! Running out of registers is fatal: there is no spilling.

use crate::{
    config::Config,
    errors::AllocError,
    liveness::LiveOut,
    log::{log_ir, should_log_ir, stats::Stats, IRPhase, Verbosity},
    payload::Kernel,
    phys::PhysReg,
    reg::VReg,
    regfile::RegFileAllocator,
    selection::Selection,
};
use index_vec::IndexVec;
use std::fmt;

mod coalesce;
mod extend;
mod fixed;
mod interval;
mod linear_scan;
mod translate;
#[cfg(any(debug_assertions, test))]
mod well_formed;

pub use interval::Span;

/// The location of each register, if it has one.
pub(crate) type RegMap = IndexVec<VReg, Option<PhysReg>>;

/// The result of register allocation.
#[derive(Debug)]
pub struct RegAllocation {
    map: RegMap,
    stats: Stats,
}

impl RegAllocation {
    /// The location of `vreg`, if it was given one.
    pub fn get(&self, vreg: VReg) -> Option<&PhysReg> {
        self.map.get(vreg).and_then(|x| x.as_ref())
    }

    /// Iterate over every register that was given a location.
    pub fn iter(&self) -> impl Iterator<Item = (VReg, &PhysReg)> + '_ {
        self.map
            .iter_enumerated()
            .filter_map(|(vreg, x)| x.as_ref().map(|x| (vreg, x)))
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }
}

impl fmt::Display for RegAllocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (vreg, reg) in self.iter() {
            writeln!(f, "{vreg}: {reg}")?;
        }
        Ok(())
    }
}

/// Allocate registers for `sel`, whose blocks have the live-out sets `live_out`, taking space from
/// `regfile`. Copies needed to satisfy vector constraints are inserted into `sel`.
///
/// Either every used register is given a location or an error is returned: if the register file
/// runs out of space, the result is [AllocError::Exhausted].
pub fn allocate_registers<A: RegFileAllocator>(
    sel: &mut Selection,
    live_out: &LiveOut,
    kernel: &Kernel,
    regfile: &mut A,
    mut cfg: Config,
) -> Result<RegAllocation, AllocError> {
    if cfg.simd_width != sel.simd_width() {
        return Err(AllocError::UnsupportedConfig(format!(
            "allocating a {}-lane selection with a {}-lane configuration",
            sel.simd_width().lanes(),
            cfg.simd_width.lanes()
        )));
    }

    if should_log_ir(IRPhase::PreCoalesce) {
        log_ir(&format!(
            "--- Begin sel-pre-coalesce ---\n{sel}--- End sel-pre-coalesce ---\n"
        ));
    }

    cfg.log.log(Verbosity::Phase, "coalescing vectors");
    let vmap = coalesce::coalesce_vectors(sel, kernel, &mut cfg);

    if should_log_ir(IRPhase::PostCoalesce) {
        log_ir(&format!(
            "--- Begin sel-post-coalesce ---\n{sel}--- End sel-post-coalesce ---\n"
        ));
    }

    cfg.log.log(Verbosity::Phase, "assigning fixed registers");
    let mut map: RegMap = IndexVec::from_vec(vec![None; sel.regs_len()]);
    let fixed = fixed::assign_fixed(sel, kernel, cfg.simd_width, &mut map)?;

    cfg.log.log(Verbosity::Phase, "computing intervals");
    let intervals = extend::compute_intervals(sel, live_out, &vmap, &fixed);

    if should_log_ir(IRPhase::Intervals) {
        let mut s = String::from("--- Begin intervals ---\n");
        for (vreg, iv) in intervals.iter_enumerated() {
            if let Some(span) = iv.span() {
                s.push_str(&format!("{vreg}: {span}\n"));
            }
        }
        s.push_str("--- End intervals ---\n");
        log_ir(&s);
    }

    cfg.log.log(Verbosity::Phase, "linear scan");
    linear_scan::LinearScan::new(sel, &vmap, &intervals, &fixed, regfile, &mut cfg, &mut map)
        .run()?;

    #[cfg(any(debug_assertions, test))]
    well_formed::assert_well_formed(sel, &vmap, &intervals, &fixed, &map, cfg.simd_width);

    cfg.log.log(Verbosity::Phase, "allocation complete");
    cfg.stats.output();
    let ra = RegAllocation {
        map,
        stats: cfg.stats,
    };
    if should_log_ir(IRPhase::RA) {
        log_ir(&format!("--- Begin ra ---\n{ra}--- End ra ---\n"));
    }
    Ok(ra)
}
