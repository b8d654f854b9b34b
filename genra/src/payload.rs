//! The layout of a kernel's dispatch payload.
//!
//! When a kernel is dispatched, the hardware (and the runtime) place a number of values (local
//! ids, sizes, kernel arguments...) in a constant buffer ("curbe") which is loaded into the
//! register file starting at [crate::phys::PAYLOAD_BASE]. [Kernel] records where, relative to the
//! start of the payload, each value the kernel references lives.

use crate::reg::{SpecialReg, VReg};
use std::collections::HashMap;
use strum::Display;

/// A kind of payload value.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
#[strum(serialize_all = "snake_case")]
pub enum PayloadKind {
    /// Per-lane local ids. Sub-value: the dimension.
    LocalId,
    /// Sub-value: the dimension.
    LocalSize,
    /// Sub-value: the dimension.
    GlobalSize,
    /// Sub-value: the dimension.
    GlobalOffset,
    /// The number of groups. Sub-value: the dimension.
    GroupNum,
    StackPointer,
    /// The per-lane block IP mask.
    BlockIp,
    /// Sub-value: the argument index.
    KernelArg,
}

impl PayloadKind {
    /// If `sr` is loaded from the payload, which slot is it loaded from?
    pub fn for_special(sr: SpecialReg) -> Option<(PayloadKind, u32)> {
        use SpecialReg::*;
        let slot = match sr {
            Lid0 => (Self::LocalId, 0),
            Lid1 => (Self::LocalId, 1),
            Lid2 => (Self::LocalId, 2),
            Lsize0 => (Self::LocalSize, 0),
            Lsize1 => (Self::LocalSize, 1),
            Lsize2 => (Self::LocalSize, 2),
            Gsize0 => (Self::GlobalSize, 0),
            Gsize1 => (Self::GlobalSize, 1),
            Gsize2 => (Self::GlobalSize, 2),
            Goffset0 => (Self::GlobalOffset, 0),
            Goffset1 => (Self::GlobalOffset, 1),
            Goffset2 => (Self::GlobalOffset, 2),
            Numgroup0 => (Self::GroupNum, 0),
            Numgroup1 => (Self::GroupNum, 1),
            Numgroup2 => (Self::GroupNum, 2),
            Stackptr => (Self::StackPointer, 0),
            Blockip => (Self::BlockIp, 0),
            Groupid0 | Groupid1 | Groupid2 => return None,
        };
        Some(slot)
    }
}

/// A value from inside a structure argument which the runtime pushes into the payload directly.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PushedArg {
    pub vreg: VReg,
    /// The index of the structure argument.
    pub arg: u32,
    /// The byte offset of the value within the argument's payload slot.
    pub offset: u32,
}

#[derive(Debug, Default)]
pub struct Kernel {
    /// Byte offsets, relative to the start of the payload, of each slot the kernel references.
    offsets: HashMap<(PayloadKind, u32), u32>,
    /// The register holding argument `i` is `args[i]`.
    args: Vec<VReg>,
    pushed: Vec<PushedArg>,
    /// The total size in bytes of the payload.
    curbe_size: u32,
}

impl Kernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `(kind, sub)` lives at byte offset `off` of the payload.
    pub fn set_offset(&mut self, kind: PayloadKind, sub: u32, off: u32) {
        self.offsets.insert((kind, sub), off);
    }

    /// The byte offset of `(kind, sub)` within the payload, or `None` if the kernel does not
    /// reference that value.
    pub fn offset(&self, kind: PayloadKind, sub: u32) -> Option<u32> {
        self.offsets.get(&(kind, sub)).copied()
    }

    /// Add a kernel argument held in `vreg`, returning its index.
    pub fn push_arg(&mut self, vreg: VReg) -> u32 {
        self.args.push(vreg);
        u32::try_from(self.args.len() - 1).unwrap()
    }

    pub fn args(&self) -> &[VReg] {
        &self.args
    }

    /// Record that `vreg` is pushed from byte `offset` of structure argument `arg`.
    pub fn push_pushed(&mut self, vreg: VReg, arg: u32, offset: u32) {
        self.pushed.push(PushedArg { vreg, arg, offset });
    }

    pub fn pushed(&self) -> &[PushedArg] {
        &self.pushed
    }

    pub fn set_curbe_size(&mut self, size: u32) {
        self.curbe_size = size;
    }

    pub fn curbe_size(&self) -> u32 {
        self.curbe_size
    }

    /// Is `vreg` reserved, i.e. provided by the hardware or the payload rather than computed by the
    /// kernel? Reserved registers have fixed locations and so can never be moved into a vector.
    pub fn is_reserved(&self, vreg: VReg) -> bool {
        vreg.special().is_some()
            || self.args.contains(&vreg)
            || self.pushed.iter().any(|x| x.vreg == vreg)
    }
}
