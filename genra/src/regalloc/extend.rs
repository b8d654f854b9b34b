//! Computing live intervals.
//!
//! Every instruction is given a position: positions increase monotonically through the blocks in
//! order. A register's interval runs from the first to the last position at which it is read or
//! written, extended to the end of every block it is live out of. This is coarser than true
//! liveness, but never frees a register that is still needed.

use super::{coalesce::VectorMap, interval::Interval};
use crate::{
    liveness::LiveOut,
    reg::{SpecialReg, VReg},
    selection::Selection,
};
use index_vec::IndexVec;
use vob::Vob;

/// Compute the interval of every register in `sel`. Registers in `fixed` are live from the start
/// of the kernel. Every member of a vector in `vmap` receives the union of the intervals of all
/// the vector's members.
pub(crate) fn compute_intervals(
    sel: &Selection,
    live_out: &LiveOut,
    vmap: &VectorMap,
    fixed: &Vob,
) -> IndexVec<VReg, Interval> {
    let mut intervals: IndexVec<VReg, Interval> =
        IndexVec::from_vec(vec![Interval::default(); sel.regs_len()]);

    let mut pos = 0;
    for bidx in sel.block_idxs() {
        let mut last = pos;
        for (_, inst) in sel.block_insts(bidx) {
            // The group ids live in bank 0, which is never allocated.
            for vreg in inst.vregs().filter(|x| !SpecialReg::is_group_id(*x)) {
                intervals[vreg].touch(pos);
            }
            last = pos;
            pos += 1;
        }
        for vreg in live_out.live_out(bidx) {
            if !SpecialReg::is_group_id(*vreg) {
                intervals[*vreg].touch(last);
            }
        }
    }

    for vreg in fixed.iter_set_bits(..).map(VReg::from_usize) {
        intervals[vreg].pin_start();
    }

    for vidx in vmap.owners() {
        let members = (0..sel.vector(vidx).len)
            .filter_map(|slot| sel.vector_vreg(vidx, slot))
            .collect::<Vec<_>>();
        let mut union = Interval::default();
        for vreg in &members {
            if let Some(span) = intervals[*vreg].span() {
                union.cover(span);
            }
        }
        if let Some(span) = union.span() {
            for vreg in &members {
                intervals[*vreg].cover(span);
            }
        }
    }

    intervals
}
