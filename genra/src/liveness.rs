//! The result of liveness analysis that the allocator consumes: for each block, the set of
//! registers that are live when the block exits.

use crate::{
    reg::VReg,
    selection::{BlockIdx, Selection},
};
use index_vec::IndexVec;
use std::collections::HashSet;

pub struct LiveOut {
    sets: IndexVec<BlockIdx, HashSet<VReg>>,
}

impl LiveOut {
    /// Create empty live-out sets for every block in `sel`.
    pub fn for_selection(sel: &Selection) -> Self {
        Self {
            sets: sel.block_idxs().map(|_| HashSet::new()).collect(),
        }
    }

    /// Record that `vreg` is live on exit from `block`.
    pub fn insert(&mut self, block: BlockIdx, vreg: VReg) {
        self.sets[block].insert(vreg);
    }

    /// The registers live on exit from `block`.
    ///
    /// # Panics
    ///
    /// If `block` was not a block of the selection these sets were created for.
    pub fn live_out(&self, block: BlockIdx) -> &HashSet<VReg> {
        &self.sets[block]
    }
}
