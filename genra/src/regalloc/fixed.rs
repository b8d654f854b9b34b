//! Pre-assignment of registers whose values the hardware or the dispatch payload provide.
//!
//! These registers never take part in linear scan and are never expired: their locations are
//! reserved for the whole of the kernel.

use super::RegMap;
use crate::{
    config::SimdWidth,
    errors::AllocError,
    payload::{Kernel, PayloadKind},
    phys::{DataType, PhysReg, RegWidth, BANK_SIZE, PAYLOAD_BASE},
    reg::{SpecialReg, VReg},
    selection::Selection,
};
use strum::IntoEnumIterator;
use vob::Vob;

/// The dword element of bank 0 holding each group id.
const GROUP_ID_ELEMS: [u32; 3] = [1, 6, 7];

/// Assign every payload register `kernel` references (and the group ids) its fixed location in
/// `ra`. Returns the set of registers so assigned.
pub(crate) fn assign_fixed(
    sel: &Selection,
    kernel: &Kernel,
    simd_width: SimdWidth,
    ra: &mut RegMap,
) -> Result<Vob, AllocError> {
    let mut fixed = Vob::from_elem(false, ra.len());
    let mut insert = |vreg: VReg, reg: PhysReg| {
        ra[vreg] = Some(reg);
        fixed.set(vreg.index(), true);
    };
    let ty = |vreg: VReg| sel.reg_data(vreg).data_type();
    let width = |vreg: VReg| {
        if sel.is_scalar_or_bool(vreg) {
            RegWidth::Scalar
        } else {
            simd_width.reg_width()
        }
    };

    for (sr, elem) in SpecialReg::GROUP_IDS.iter().zip(GROUP_ID_ELEMS) {
        insert(
            sr.vreg(),
            PhysReg::grf_elem(0, elem, DataType::F, RegWidth::Scalar),
        );
    }

    if kernel.offset(PayloadKind::BlockIp, 0).is_none() && uses(sel, SpecialReg::Blockip.vreg()) {
        return Err(AllocError::UnsupportedConfig(
            "block IP is used but the payload has no block IP offset".to_owned(),
        ));
    }

    for sr in SpecialReg::iter() {
        let Some((kind, sub)) = PayloadKind::for_special(sr) else {
            continue;
        };
        let Some(off) = kernel.offset(kind, sub) else {
            continue;
        };
        let off = PAYLOAD_BASE + off;
        let rw = if sr == SpecialReg::Blockip {
            if off % BANK_SIZE != 0 {
                return Err(AllocError::UnsupportedConfig(format!(
                    "block IP payload offset {off} is not bank aligned"
                )));
            }
            simd_width.reg_width()
        } else {
            width(sr.vreg())
        };
        insert(sr.vreg(), PhysReg::grf(off, ty(sr.vreg()), rw));
    }

    for (i, vreg) in kernel.args().iter().enumerate() {
        let i = u32::try_from(i).unwrap();
        if let Some(off) = kernel.offset(PayloadKind::KernelArg, i) {
            insert(*vreg, PhysReg::grf(PAYLOAD_BASE + off, ty(*vreg), width(*vreg)));
        }
    }

    for p in kernel.pushed() {
        if let Some(off) = kernel.offset(PayloadKind::KernelArg, p.arg) {
            insert(
                p.vreg,
                PhysReg::grf(PAYLOAD_BASE + off + p.offset, ty(p.vreg), width(p.vreg)),
            );
        }
    }

    Ok(fixed)
}

/// Does any instruction in `sel` read or write `vreg`?
fn uses(sel: &Selection, vreg: VReg) -> bool {
    sel.block_idxs()
        .any(|b| sel.block_insts(b).any(|(_, inst)| inst.vregs().any(|x| x == vreg)))
}
