//! Vector coalescing.
//!
//! Every register which is part of a vector must end up in exactly one block of consecutive
//! registers. A register can only sit in one such block, so when a vector wants to use a register
//! that is already part of another vector (or that can't be part of a vector at all, e.g. because
//! it's a scalar or lives at a fixed location), we copy it into a fresh temporary and put that in
//! the vector instead.
//!
//! Sometimes a vector doesn't need a block of its own at all: if its registers are exactly a run of
//! another vector's registers, the other vector's block will do. Such a vector is said to be
//! "satisfied by" the other vector.

use crate::{
    config::Config,
    log::{stats::Event, Verbosity},
    payload::Kernel,
    reg::VReg,
    selection::{Selection, VectorIdx, VectorSide},
};
use std::{cmp::Reverse, collections::HashMap};

/// Where a register sits within a vector.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Membership {
    pub(crate) vector: VectorIdx,
    pub(crate) slot: usize,
}

/// The vector membership of registers. A register is a member of at most one vector.
#[derive(Debug, Default)]
pub(crate) struct VectorMap {
    members: HashMap<VReg, Membership>,
    /// The vectors which own a block of their own, in the order they were coalesced.
    owners: Vec<VectorIdx>,
}

impl VectorMap {
    /// If `vreg` is part of a vector, return its membership.
    pub(crate) fn get(&self, vreg: VReg) -> Option<Membership> {
        self.members.get(&vreg).copied()
    }

    /// Iterate over the vectors which own a block of their own.
    pub(crate) fn owners(&self) -> impl Iterator<Item = VectorIdx> + '_ {
        self.owners.iter().copied()
    }

    fn insert(&mut self, vreg: VReg, m: Membership) {
        let prev = self.members.insert(vreg, m);
        assert!(prev.is_none(), "{vreg} is a member of two vectors");
    }

    /// Is `vidx` satisfied by an already coalesced vector? That is true if `vidx`'s first register
    /// sits at slot `p` of a vector `v` and `vidx`'s registers are exactly those in `v` starting at
    /// slot `p`.
    pub(crate) fn is_satisfied_by(&self, sel: &Selection, vidx: VectorIdx) -> bool {
        let len = sel.vector(vidx).len;
        let Some(first) = sel.vector_vreg(vidx, 0) else {
            return false;
        };
        let Some(Membership { vector, slot }) = self.get(first) else {
            return false;
        };
        if len > sel.vector(vector).len - slot {
            return false;
        }
        (1..len).all(|i| sel.vector_vreg(vidx, i) == sel.vector_vreg(vector, slot + i))
    }

    /// Make `vidx` the owner of each of its registers, replacing any register that can't be owned
    /// with a copy.
    fn coalesce(&mut self, sel: &mut Selection, kernel: &Kernel, cfg: &mut Config, vidx: VectorIdx) {
        let v = *sel.vector(vidx);
        for slot in 0..v.len {
            let vreg = match sel.vector_vreg(vidx, slot) {
                Some(vreg)
                    if self.get(vreg).is_none()
                        && !sel.is_scalar_or_bool(vreg)
                        && !kernel.is_reserved(vreg) =>
                {
                    vreg
                }
                _ => {
                    let tmp = match v.side {
                        VectorSide::Src => sel.replace_src(v.inst, v.first + slot),
                        VectorSide::Dst => sel.replace_dst(v.inst, v.first + slot),
                    };
                    cfg.stats.count(Event::CopyInserted);
                    if cfg.log.enabled(Verbosity::Event) {
                        cfg.log.log(
                            Verbosity::Event,
                            &format!(
                                "vector {}: slot {slot} copied into {tmp}",
                                usize::from(vidx)
                            ),
                        );
                    }
                    tmp
                }
            };
            self.insert(vreg, Membership { vector: vidx, slot });
        }
        self.owners.push(vidx);
    }
}

/// Coalesce every vector in `sel`, inserting copies where necessary. Longer vectors are coalesced
/// first, since they're the hardest to find space for later.
pub(crate) fn coalesce_vectors(sel: &mut Selection, kernel: &Kernel, cfg: &mut Config) -> VectorMap {
    let mut order = sel.vectors().map(|(vidx, _)| vidx).collect::<Vec<_>>();
    order.sort_by_key(|vidx| Reverse(sel.vector(*vidx).len));
    let mut vmap = VectorMap::default();
    for vidx in order {
        cfg.stats.count(Event::Vector);
        if vmap.is_satisfied_by(sel, vidx) {
            cfg.stats.count(Event::VectorSatisfied);
        } else {
            vmap.coalesce(sel, kernel, cfg, vidx);
        }
    }
    vmap
}
