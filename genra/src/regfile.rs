//! Allocation of space in the general register file.
//!
//! The register allocator only needs to be able to ask for (and hand back) blocks of bytes: it
//! does so via [RegFileAllocator]. [FreeList] is a simple first-fit implementation.

use crate::{
    payload::Kernel,
    phys::{BANK_COUNT, BANK_SIZE, PAYLOAD_BASE},
};
use std::collections::{BTreeMap, HashMap};

pub trait RegFileAllocator {
    /// Allocate `size` bytes aligned to `align` bytes, returning the byte offset of the block or
    /// `None` if no suitable block is free. `align` must be a power of two.
    fn allocate(&mut self, size: u32, align: u32) -> Option<u32>;

    /// Free the block previously returned by `allocate` at `offset`.
    fn deallocate(&mut self, offset: u32);
}

/// A first-fit free list over a contiguous range of the register file.
#[derive(Debug)]
pub struct FreeList {
    /// The free blocks as `offset -> size`. Adjacent free blocks are always merged.
    free: BTreeMap<u32, u32>,
    /// The allocated blocks as `offset -> size`.
    used: HashMap<u32, u32>,
}

impl FreeList {
    /// Create a free list managing the `size` bytes starting at byte offset `base`.
    pub fn new(base: u32, size: u32) -> Self {
        let mut free = BTreeMap::new();
        if size > 0 {
            free.insert(base, size);
        }
        Self {
            free,
            used: HashMap::new(),
        }
    }

    /// Create a free list managing all of the register file after `kernel`'s payload.
    pub fn for_kernel(kernel: &Kernel) -> Self {
        let base = (PAYLOAD_BASE + kernel.curbe_size()).next_multiple_of(BANK_SIZE);
        Self::new(base, (BANK_COUNT * BANK_SIZE).saturating_sub(base))
    }

    /// How many bytes are currently free?
    pub fn free_bytes(&self) -> u32 {
        self.free.values().sum()
    }
}

impl RegFileAllocator for FreeList {
    fn allocate(&mut self, size: u32, align: u32) -> Option<u32> {
        debug_assert!(size > 0 && align.is_power_of_two());
        let (blk_off, blk_size, off) = self.free.iter().find_map(|(blk_off, blk_size)| {
            let off = blk_off.next_multiple_of(align);
            if off + size <= blk_off + blk_size {
                Some((*blk_off, *blk_size, off))
            } else {
                None
            }
        })?;
        self.free.remove(&blk_off);
        if off > blk_off {
            self.free.insert(blk_off, off - blk_off);
        }
        if off + size < blk_off + blk_size {
            self.free.insert(off + size, blk_off + blk_size - (off + size));
        }
        self.used.insert(off, size);
        Some(off)
    }

    /// # Panics
    ///
    /// If `offset` is not the start of an allocated block.
    fn deallocate(&mut self, offset: u32) {
        let mut size = self
            .used
            .remove(&offset)
            .unwrap_or_else(|| panic!("Deallocating unallocated offset {offset}"));
        let mut offset = offset;
        if let Some(next_size) = self.free.remove(&(offset + size)) {
            size += next_size;
        }
        if let Some((prev_off, prev_size)) = self.free.range(..offset).next_back() {
            if prev_off + prev_size == offset {
                offset = *prev_off;
                size += prev_size;
            }
        }
        self.free.insert(offset, size);
    }
}
