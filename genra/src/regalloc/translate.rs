//! Translating selection operands into physical operands.

use super::RegAllocation;
use crate::{
    phys::{PhysReg, RegFile},
    selection::{SelReg, Storage},
};

impl RegAllocation {
    /// Turn the operand `op` into the physical operand the encoder needs. Virtual registers are
    /// replaced by their allocated location; `op`'s type, region and modifiers are carried over
    /// unchanged. Operands at fixed locations are passed through as-is.
    ///
    /// # Panics
    ///
    /// If `op` is a virtual register that was not allocated a location.
    pub fn gen_reg(&self, op: &SelReg) -> PhysReg {
        match op.storage {
            Storage::Virtual(vreg) => {
                let Some(loc) = self.get(vreg) else {
                    panic!("{vreg} has no location");
                };
                let reg = PhysReg {
                    file: RegFile::General,
                    nr: loc.nr,
                    subnr: loc.subnr,
                    ty: op.ty,
                    region: op.region,
                    negation: op.negation,
                    absolute: op.absolute,
                    imm: op.imm,
                };
                if op.quarter != 0 {
                    reg.quarter(op.quarter)
                } else {
                    reg
                }
            }
            Storage::Fixed { file, nr, subnr } => PhysReg {
                file,
                nr,
                subnr,
                ty: op.ty,
                region: op.region,
                negation: op.negation,
                absolute: op.absolute,
                imm: op.imm,
            },
        }
    }
}
