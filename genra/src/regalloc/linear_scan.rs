//! Linear scan allocation.
//!
//! Intervals are considered in order of ascending start. Each register that doesn't yet have a
//! location is given space by the [RegFileAllocator]: a vector member causes its whole vector to
//! be given one block. When the register file is full, we expire the interval that ends earliest
//! (provided it ends before the current interval starts) and try again. If nothing more can be
//! expired, allocation fails: there is no spilling.

use super::{coalesce::VectorMap, interval::Interval, RegMap};
use crate::{
    config::Config,
    errors::AllocError,
    log::{stats::Event, Verbosity},
    phys::{DataType, PhysReg, RegWidth},
    reg::VReg,
    regfile::RegFileAllocator,
    selection::{Selection, VectorIdx},
};
use index_vec::IndexVec;
use std::collections::HashMap;
use vob::Vob;

pub(crate) struct LinearScan<'a, A> {
    sel: &'a Selection,
    vmap: &'a VectorMap,
    intervals: &'a IndexVec<VReg, Interval>,
    /// Registers whose locations were fixed before linear scan: these are never expired.
    fixed: &'a Vob,
    regfile: &'a mut A,
    cfg: &'a mut Config,
    ra: &'a mut RegMap,
    /// Used registers in order of ascending interval end.
    by_end: Vec<VReg>,
    /// The index in `by_end` of the next register to consider for expiration.
    expire_cursor: usize,
    /// The vectors whose blocks have already been expired.
    expired: Vob,
    /// The size of each block we've been given by `regfile`, indexed by offset.
    sizes: HashMap<u32, u32>,
}

impl<'a, A: RegFileAllocator> LinearScan<'a, A> {
    pub(crate) fn new(
        sel: &'a Selection,
        vmap: &'a VectorMap,
        intervals: &'a IndexVec<VReg, Interval>,
        fixed: &'a Vob,
        regfile: &'a mut A,
        cfg: &'a mut Config,
        ra: &'a mut RegMap,
    ) -> Self {
        Self {
            sel,
            vmap,
            intervals,
            fixed,
            regfile,
            cfg,
            ra,
            by_end: Vec::new(),
            expire_cursor: 0,
            expired: Vob::from_elem(false, sel.vectors_len()),
            sizes: HashMap::new(),
        }
    }

    /// Give every used register without a location a location.
    pub(crate) fn run(mut self) -> Result<(), AllocError> {
        let used = self
            .intervals
            .iter_enumerated()
            .filter_map(|(vreg, iv)| iv.span().map(|span| (vreg, span)))
            .collect::<Vec<_>>();
        let mut by_start = used.clone();
        by_start.sort_by_key(|(_, span)| span.start);
        let mut by_end = used;
        by_end.sort_by_key(|(_, span)| span.end);
        self.by_end = by_end.into_iter().map(|(vreg, _)| vreg).collect();

        for (vreg, _) in by_start {
            if self.ra[vreg].is_some() {
                continue;
            }
            match self.vmap.get(vreg) {
                Some(m) => self.alloc_vector(vreg, m.vector)?,
                None => self.alloc_single(vreg)?,
            }
        }
        Ok(())
    }

    /// Allocate a block for the whole of vector `vidx`, which `vreg` is a member of.
    fn alloc_vector(&mut self, vreg: VReg, vidx: VectorIdx) -> Result<(), AllocError> {
        let simd_width = self.cfg.simd_width;
        let stride = simd_width.vector_stride();
        let len = u32::try_from(self.sel.vector(vidx).len).unwrap();
        let base = self.alloc(vreg, len * stride, stride)?;
        for slot in 0..len {
            let member = self
                .sel
                .vector_vreg(vidx, usize::try_from(slot).unwrap())
                .ok_or_else(|| {
                    AllocError::Internal(format!(
                        "slot {slot} of vector {} is not a virtual register",
                        usize::from(vidx)
                    ))
                })?;
            self.ra[member] = Some(PhysReg::grf(
                base + slot * stride,
                DataType::F,
                simd_width.reg_width(),
            ));
        }
        self.cfg.stats.count(Event::VectorAlloc);
        if self.cfg.log.enabled(Verbosity::Event) {
            self.cfg.log.log(
                Verbosity::Event,
                &format!(
                    "vector {}: {len} registers at byte {base}",
                    usize::from(vidx)
                ),
            );
        }
        Ok(())
    }

    /// Allocate a location for `vreg` on its own.
    fn alloc_single(&mut self, vreg: VReg) -> Result<(), AllocError> {
        let simd_width = self.cfg.simd_width;
        let data = self.sel.reg_data(vreg);
        let size = simd_width.lanes() * data.byte_width();
        let off = self.alloc(vreg, size, size)?;
        let ty = data.data_type();
        let width = if data.is_scalar_or_bool() {
            RegWidth::Scalar
        } else {
            simd_width.reg_width()
        };
        let reg = PhysReg::grf(off, ty, width);
        self.ra[vreg] = Some(reg);
        self.cfg.stats.count(Event::SingleAlloc);
        if self.cfg.log.enabled(Verbosity::Event) {
            self.cfg
                .log
                .log(Verbosity::Event, &format!("{vreg}: {reg}"));
        }
        Ok(())
    }

    /// Ask the register file for `size` bytes aligned to `align` on behalf of `vreg`, expiring
    /// intervals until the request can be met.
    fn alloc(&mut self, vreg: VReg, size: u32, align: u32) -> Result<u32, AllocError> {
        let start = match self.intervals[vreg].span() {
            Some(x) => x.start,
            None => {
                return Err(AllocError::Internal(format!(
                    "allocating unused register {vreg}"
                )))
            }
        };
        loop {
            if let Some(off) = self.regfile.allocate(size, align) {
                self.sizes.insert(off, size);
                self.cfg.stats.grew(size);
                return Ok(off);
            }
            if !self.expire(start)? {
                if self.cfg.log.enabled(Verbosity::Error) {
                    self.cfg.log.log(
                        Verbosity::Error,
                        &format!("out of registers allocating {size} bytes for {vreg}"),
                    );
                }
                return Err(AllocError::Exhausted { vreg, size, align });
            }
        }
    }

    /// Try to free the block of the earliest ending interval which ends strictly before `start`.
    /// Returns `Ok(true)` if a block was freed.
    fn expire(&mut self, start: u32) -> Result<bool, AllocError> {
        while let Some(vreg) = self.by_end.get(self.expire_cursor).copied() {
            // `by_end` only contains used registers.
            let end = self.intervals[vreg].span().map(|x| x.end).unwrap_or(0);
            if end >= start {
                return Ok(false);
            }
            self.expire_cursor += 1;
            if self.fixed.get(vreg.index()) == Some(true) {
                continue;
            }
            let owner = match self.vmap.get(vreg) {
                Some(m) => {
                    if self.expired.get(m.vector.index()) == Some(true) {
                        continue;
                    }
                    self.expired.set(m.vector.index(), true);
                    self.sel.vector_vreg(m.vector, 0).unwrap_or(vreg)
                }
                None => vreg,
            };
            let off = self.ra[owner]
                .map(|x| x.byte_offset())
                .ok_or_else(|| {
                    AllocError::Internal(format!("expiring {owner}, which has no location"))
                })?;
            let size = self.sizes.remove(&off).ok_or_else(|| {
                AllocError::Internal(format!("expiring {owner}, which was not allocated"))
            })?;
            self.regfile.deallocate(off);
            self.cfg.stats.shrank(size);
            self.cfg.stats.count(Event::Expiration);
            if self.cfg.log.enabled(Verbosity::Event) {
                self.cfg.log.log(
                    Verbosity::Event,
                    &format!("expired {vreg}: {size} bytes at byte {off}"),
                );
            }
            return Ok(true);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::SimdWidth,
        liveness::LiveOut,
        payload::Kernel,
        phys::{Region, BANK_SIZE},
        regalloc::{coalesce::coalesce_vectors, extend::compute_intervals},
        regfile::FreeList,
    };

    /// A register file which records every deallocation.
    struct Recording {
        inner: FreeList,
        freed: Vec<u32>,
    }

    impl RegFileAllocator for Recording {
        fn allocate(&mut self, size: u32, align: u32) -> Option<u32> {
            self.inner.allocate(size, align)
        }

        fn deallocate(&mut self, offset: u32) {
            self.freed.push(offset);
            self.inner.deallocate(offset);
        }
    }

    fn scan(
        src: &str,
        banks: u32,
    ) -> (
        Selection,
        IndexVec<VReg, Interval>,
        Result<RegMap, AllocError>,
        Recording,
        Config,
    ) {
        let (mut sel, lo): (Selection, LiveOut) = Selection::from_str(SimdWidth::Simd8, src);
        let mut cfg = Config::quiet(8).unwrap();
        let vmap = coalesce_vectors(&mut sel, &Kernel::new(), &mut cfg);
        let fixed = Vob::from_elem(false, sel.regs_len());
        let ivs = compute_intervals(&sel, &lo, &vmap, &fixed);
        let mut rf = Recording {
            inner: FreeList::new(BANK_SIZE, banks * BANK_SIZE),
            freed: Vec::new(),
        };
        let mut ra: RegMap = IndexVec::from_vec(vec![None; sel.regs_len()]);
        let r = LinearScan::new(&sel, &vmap, &ivs, &fixed, &mut rf, &mut cfg, &mut ra).run();
        let r = r.map(|_| ra);
        (sel, ivs, r, rf, cfg)
    }

    fn off(ra: &RegMap, i: usize) -> u32 {
        ra[VReg::new(i)].unwrap().byte_offset()
    }

    #[test]
    fn reuse_after_expiry() {
        // Intervals: %20 [0, 2], %21 [1, 3], %22 [4, 5].
        let (_, _, ra, rf, cfg) = scan(
            "
            %22: dword scalar
            %20: dword scalar
            %21: dword scalar
            bb0:
              %20 = mov 0x0:D
              %21 = mov 0x1:D
              mov %20
              mov %21
              %22 = mov 0x2:D
              mov %22
            ",
            2,
        );
        let ra = ra.unwrap();
        assert_ne!(off(&ra, 20), off(&ra, 21));
        assert_eq!(off(&ra, 22), off(&ra, 20));
        assert_eq!(rf.freed, vec![off(&ra, 20)]);
        assert_eq!(cfg.stats.expirations(), 1);
        assert_eq!(cfg.stats.peak_bytes(), u64::from(2 * BANK_SIZE));
    }

    #[test]
    fn no_premature_reclaim() {
        // %22 starts at 2 while %20 and %21 are still live: nothing may be expired.
        let (_, ivs, ra, rf, _) = scan(
            "
            %22: dword scalar
            %20: dword scalar
            %21: dword scalar
            bb0:
              %20 = mov 0x0:D
              %21 = mov 0x1:D
              %22 = add %20, %21
            ",
            2,
        );
        assert!(matches!(
            ra,
            Err(AllocError::Exhausted { vreg, size: 32, align: 32 }) if vreg == VReg::new(22)
        ));
        assert!(rf.freed.is_empty());
        assert_eq!(ivs[VReg::new(20)].span().unwrap().end, 2);
    }

    #[test]
    fn vector_block() {
        let (sel, _, ra, _, cfg) = scan(
            "
            %23: dword
            bb0:
              %20 = mov 0x0:D
              send {%21, %22, %23}
            ",
            8,
        );
        let ra = ra.unwrap();
        let stride = SimdWidth::Simd8.vector_stride();
        let base = off(&ra, 21);
        assert_eq!(base % stride, 0);
        for (i, vreg) in (21..=23).enumerate() {
            assert_eq!(off(&ra, vreg), base + u32::try_from(i).unwrap() * stride);
            assert_eq!(ra[VReg::new(vreg)].unwrap().ty, DataType::F);
        }
        assert_eq!(cfg.stats.vector_allocs(), 1);
        assert_eq!(cfg.stats.single_allocs(), 1);
        assert_eq!(sel.vectors_len(), 1);
    }

    #[test]
    fn bool_is_scalar() {
        let (_, _, ra, _, _) = scan(
            "
            %20: bool
            %21: word
            bb0:
              %20 = cmp 0x0:D, 0x1:D
              %21 = mov 0x2:W
              mov %20
              mov %21
            ",
            2,
        );
        let ra = ra.unwrap();
        let b = ra[VReg::new(20)].unwrap();
        assert_eq!((b.ty, b.region), (DataType::UW, Region::SCALAR));
        let w = ra[VReg::new(21)].unwrap();
        assert_eq!((w.ty, w.region), (DataType::UW, Region::new(8, 8, 1)));
        assert_ne!(off(&ra, 20), off(&ra, 21));
    }

    #[test]
    fn vector_expired_once() {
        // All three members of the first vector end together: its block must be handed back
        // exactly once, after which there is room for the second vector.
        let (_, _, ra, rf, cfg) = scan(
            "
            %24: dword
            bb0:
              send {%20, %21, %22}
              %23 = mov 0x0:D
              %24 = mov 0x1:D
              send {%23, %24, %24}
            ",
            4,
        );
        let ra = ra.unwrap();
        assert_eq!(rf.freed, vec![off(&ra, 20)]);
        assert_eq!(cfg.stats.expirations(), 1);
    }

    #[test]
    fn vector_too_big() {
        let (_, _, ra, rf, _) = scan(
            "
            %23: dword
            bb0:
              send {%20, %21, %22, %23}
            ",
            3,
        );
        assert!(matches!(
            ra,
            Err(AllocError::Exhausted { size: 128, align: 32, .. })
        ));
        assert!(rf.freed.is_empty());
    }
}
