//! Checking that an allocation is well-formed:
//!
//!   1. Every used register has a location.
//!   2. No two registers allocated by linear scan whose intervals overlap share any bytes.
//!   3. Every vector's members are laid out contiguously, one stride apart, from a stride aligned
//!      base.

use super::{coalesce::VectorMap, interval::Interval, RegMap};
use crate::{config::SimdWidth, reg::VReg, selection::Selection};
use index_vec::IndexVec;
use vob::Vob;

/// Check that `ra` is a well-formed allocation, panicking if it is not.
pub(crate) fn assert_well_formed(
    sel: &Selection,
    vmap: &VectorMap,
    intervals: &IndexVec<VReg, Interval>,
    fixed: &Vob,
    ra: &RegMap,
    simd_width: SimdWidth,
) {
    let stride = simd_width.vector_stride();
    let mut ranges = Vec::new();
    for (vreg, iv) in intervals.iter_enumerated() {
        let Some(span) = iv.span() else {
            continue;
        };
        let Some(reg) = ra[vreg] else {
            panic!("{vreg} is used but has no location");
        };
        if fixed.get(vreg.index()) == Some(true) {
            continue;
        }
        let size = match vmap.get(vreg) {
            Some(_) => stride,
            None => simd_width.lanes() * sel.reg_data(vreg).byte_width(),
        };
        let off = reg.byte_offset();
        ranges.push((vreg, span, off..off + size));
    }

    for (i, (vreg1, span1, r1)) in ranges.iter().enumerate() {
        for (vreg2, span2, r2) in ranges.iter().skip(i + 1) {
            if span1.overlaps(span2) && r1.start < r2.end && r2.start < r1.end {
                panic!(
                    "{vreg1} {span1} and {vreg2} {span2} are live together but share bytes {r1:?} and {r2:?}"
                );
            }
        }
    }

    for vidx in vmap.owners() {
        let v = sel.vector(vidx);
        let mut base = None;
        for slot in 0..v.len {
            let Some(off) = sel
                .vector_vreg(vidx, slot)
                .and_then(|x| ra[x])
                .map(|x| x.byte_offset())
            else {
                panic!("Slot {slot} of vector {} has no location", usize::from(vidx));
            };
            let base = *base.get_or_insert(off);
            assert_eq!(base % stride, 0, "Vector {} is misaligned", usize::from(vidx));
            assert_eq!(
                off,
                base + u32::try_from(slot).unwrap() * stride,
                "Slot {slot} of vector {} is not contiguous",
                usize::from(vidx)
            );
        }
    }
}
