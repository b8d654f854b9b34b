//! The output of instruction selection, as seen by the register allocator.
//!
//! A [Selection] is an ordered sequence of blocks, each an ordered sequence of instructions whose
//! operands are [SelReg]s. Instructions are stored in an arena and blocks record the order in which
//! their instructions execute, so that [InstIdx]s stay stable when copies are inserted.
//!
//! Some instructions need a run of their source or destination operands to live in consecutive,
//! equally strided physical registers (e.g. the payload of a `send`). Instruction selection
//! records each such run as a [SelVector].
//!
//! The register allocator never owns the instruction stream: the only mutation it performs is via
//! [Selection::replace_src] and [Selection::replace_dst], which insert a copy into a fresh
//! temporary before or after an instruction.

use crate::{
    config::SimdWidth,
    phys::{DataType, RegFile, Region},
    reg::{RegData, RegFamily, SpecialReg, VReg},
};
use index_vec::IndexVec;
use smallvec::{smallvec, SmallVec};
use std::{collections::HashMap, fmt};
use strum::{Display, EnumString};

#[cfg(test)]
pub(crate) mod parser;

index_vec::define_index_type! {
    pub struct BlockIdx = u32;
}

index_vec::define_index_type! {
    pub struct InstIdx = u32;
}

index_vec::define_index_type! {
    pub struct VectorIdx = u32;
}

#[derive(Clone, Copy, Debug, Display, EnumString, Eq, PartialEq)]
#[strum(serialize_all = "lowercase")]
pub enum Opcode {
    Mov,
    Add,
    Mul,
    Mad,
    Cmp,
    Sel,
    Send,
    Jmpi,
    Eot,
}

/// Where an operand's value lives.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Storage {
    /// A virtual register in the general register file: the allocator decides where this lives.
    Virtual(VReg),
    /// A location fixed by instruction selection (an architecture register, an explicit general
    /// register, or an immediate). `subnr` is a byte offset.
    Fixed { file: RegFile, nr: u32, subnr: u32 },
}

/// An operand of a selected instruction: a storage location plus the modifiers that apply to this
/// particular use of it.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SelReg {
    pub storage: Storage,
    pub ty: DataType,
    pub negation: bool,
    pub absolute: bool,
    pub region: Region,
    /// The immediate payload. Only meaningful for [RegFile::Immediate] storage.
    pub imm: u32,
    /// When non-zero, this operand refers to the `quarter`th group of 8 lanes of its register
    /// (used when a SIMD16 instruction is split into two SIMD8 halves).
    pub quarter: u8,
}

impl SelReg {
    /// A use of virtual register `vreg` with type `ty` and region `region`.
    pub fn vreg(vreg: VReg, ty: DataType, region: Region) -> Self {
        Self {
            storage: Storage::Virtual(vreg),
            ty,
            negation: false,
            absolute: false,
            region,
            imm: 0,
            quarter: 0,
        }
    }

    /// A use of the fixed location `nr.subnr` (`subnr` in bytes) in `file`.
    pub fn fixed(file: RegFile, nr: u32, subnr: u32, ty: DataType, region: Region) -> Self {
        Self {
            storage: Storage::Fixed { file, nr, subnr },
            ty,
            negation: false,
            absolute: false,
            region,
            imm: 0,
            quarter: 0,
        }
    }

    /// The immediate `imm` of type `ty`.
    pub fn imm(imm: u32, ty: DataType) -> Self {
        Self {
            imm,
            ..Self::fixed(RegFile::Immediate, 0, 0, ty, Region::SCALAR)
        }
    }

    /// If this operand is a virtual register, return it.
    pub fn virt(&self) -> Option<VReg> {
        match self.storage {
            Storage::Virtual(vreg) => Some(vreg),
            Storage::Fixed { .. } => None,
        }
    }
}

impl fmt::Display for SelReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negation {
            write!(f, "-")?;
        }
        if self.absolute {
            write!(f, "(abs)")?;
        }
        match self.storage {
            Storage::Virtual(vreg) => write!(f, "{vreg}")?,
            Storage::Fixed {
                file: RegFile::Immediate,
                ..
            } => write!(f, "0x{:x}", self.imm)?,
            Storage::Fixed {
                file: RegFile::General,
                nr,
                subnr,
            } => write!(f, "r{nr}.{}", subnr / self.ty.byte_size())?,
            Storage::Fixed {
                file: RegFile::Arch,
                nr,
                subnr,
            } => write!(f, "a{nr}.{}", subnr / self.ty.byte_size())?,
        }
        if self.ty != DataType::F {
            write!(f, ":{}", self.ty)?;
        }
        if self.quarter != 0 {
            write!(f, ".q{}", self.quarter)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct SelInst {
    pub opcode: Opcode,
    pub dsts: SmallVec<[SelReg; 2]>,
    pub srcs: SmallVec<[SelReg; 4]>,
    /// The block this instruction belongs to.
    pub block: BlockIdx,
}

impl SelInst {
    /// Iterate over the virtual registers this instruction reads or writes.
    pub fn vregs(&self) -> impl Iterator<Item = VReg> + '_ {
        self.srcs
            .iter()
            .chain(self.dsts.iter())
            .filter_map(|x| x.virt())
    }
}

/// Which of its instruction's operand lists does a [SelVector] cover?
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum VectorSide {
    Src,
    Dst,
}

/// A run of `len` operands, starting at operand `first` of `side` of instruction `inst`, which
/// must be allocated to consecutive, equally strided physical registers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SelVector {
    pub inst: InstIdx,
    pub side: VectorSide,
    pub first: usize,
    pub len: usize,
}

#[derive(Debug, Default)]
struct SelBlock {
    /// This block's instructions in execution order.
    insts: Vec<InstIdx>,
}

pub struct Selection {
    simd_width: SimdWidth,
    regs: IndexVec<VReg, RegData>,
    insts: IndexVec<InstIdx, SelInst>,
    blocks: IndexVec<BlockIdx, SelBlock>,
    vectors: IndexVec<VectorIdx, SelVector>,
}

impl Selection {
    /// Create an empty selection for a unit compiled `simd_width` lanes wide. The special registers
    /// are implicitly defined.
    pub fn new(simd_width: SimdWidth) -> Self {
        Self {
            simd_width,
            regs: SpecialReg::all_reg_data().collect(),
            insts: IndexVec::new(),
            blocks: IndexVec::new(),
            vectors: IndexVec::new(),
        }
    }

    pub fn simd_width(&self) -> SimdWidth {
        self.simd_width
    }

    /// The region a full-width (i.e. one value per lane) register is accessed with by default.
    pub fn default_region(&self) -> Region {
        match self.simd_width {
            SimdWidth::Simd8 => Region::new(8, 8, 1),
            SimdWidth::Simd16 => Region::new(16, 16, 1),
        }
    }

    /// Create a new virtual register.
    pub fn new_reg(&mut self, data: RegData) -> VReg {
        self.regs.push(data)
    }

    /// How many virtual registers (including special registers) are there?
    pub fn regs_len(&self) -> usize {
        self.regs.len()
    }

    /// Return the [RegData] for `vreg`.
    ///
    /// # Panics
    ///
    /// If `vreg` does not exist.
    pub fn reg_data(&self, vreg: VReg) -> RegData {
        self.regs[vreg]
    }

    /// Is `vreg` a scalar or boolean register?
    pub fn is_scalar_or_bool(&self, vreg: VReg) -> bool {
        self.regs[vreg].is_scalar_or_bool()
    }

    /// Append an empty block.
    pub fn push_block(&mut self) -> BlockIdx {
        self.blocks.push(SelBlock::default())
    }

    /// Append an instruction to the end of block `block`.
    pub fn push_inst(
        &mut self,
        block: BlockIdx,
        opcode: Opcode,
        dsts: &[SelReg],
        srcs: &[SelReg],
    ) -> InstIdx {
        let iidx = self.insts.push(SelInst {
            opcode,
            dsts: SmallVec::from_slice(dsts),
            srcs: SmallVec::from_slice(srcs),
            block,
        });
        self.blocks[block].insts.push(iidx);
        iidx
    }

    /// Record that operands `first..first + len` of `side` of `inst` form a vector.
    ///
    /// # Panics
    ///
    /// If the vector is empty or extends beyond the instruction's operands.
    pub fn push_vector(
        &mut self,
        inst: InstIdx,
        side: VectorSide,
        first: usize,
        len: usize,
    ) -> VectorIdx {
        let ops = match side {
            VectorSide::Src => self.insts[inst].srcs.len(),
            VectorSide::Dst => self.insts[inst].dsts.len(),
        };
        assert!(len > 0 && first + len <= ops);
        self.vectors.push(SelVector {
            inst,
            side,
            first,
            len,
        })
    }

    pub fn blocks_len(&self) -> usize {
        self.blocks.len()
    }

    /// Iterate over all blocks in order.
    pub fn block_idxs(&self) -> impl Iterator<Item = BlockIdx> {
        self.blocks.indices()
    }

    /// Iterate over the instructions of block `block` in execution order.
    pub fn block_insts(&self, block: BlockIdx) -> impl Iterator<Item = (InstIdx, &SelInst)> + '_ {
        self.blocks[block]
            .insts
            .iter()
            .map(|iidx| (*iidx, &self.insts[*iidx]))
    }

    pub fn inst(&self, iidx: InstIdx) -> &SelInst {
        &self.insts[iidx]
    }

    pub fn vectors_len(&self) -> usize {
        self.vectors.len()
    }

    /// Iterate over all vectors, in the order they were recorded.
    pub fn vectors(&self) -> impl Iterator<Item = (VectorIdx, &SelVector)> + '_ {
        self.vectors.iter_enumerated()
    }

    pub fn vector(&self, vidx: VectorIdx) -> &SelVector {
        &self.vectors[vidx]
    }

    /// The operand in slot `slot` of vector `vidx`.
    pub fn vector_op(&self, vidx: VectorIdx, slot: usize) -> &SelReg {
        let v = &self.vectors[vidx];
        debug_assert!(slot < v.len);
        let inst = &self.insts[v.inst];
        match v.side {
            VectorSide::Src => &inst.srcs[v.first + slot],
            VectorSide::Dst => &inst.dsts[v.first + slot],
        }
    }

    /// The virtual register in slot `slot` of vector `vidx`, if that slot holds one.
    pub fn vector_vreg(&self, vidx: VectorIdx, slot: usize) -> Option<VReg> {
        self.vector_op(vidx, slot).virt()
    }

    /// Create a fresh per-lane dword temporary register.
    fn new_tmp(&mut self) -> VReg {
        self.new_reg(RegData::new(RegFamily::Dword, false))
    }

    /// Insert `new` into `inst`'s block immediately before (`after == false`) or after
    /// (`after == true`) `inst`.
    fn insert_near(&mut self, inst: InstIdx, new: SelInst, after: bool) -> InstIdx {
        let block = self.insts[inst].block;
        let new = self.insts.push(new);
        let order = &mut self.blocks[block].insts;
        // An instruction not being in its own block is a bug in whoever built this selection.
        let pos = order.iter().position(|x| *x == inst).unwrap();
        order.insert(if after { pos + 1 } else { pos }, new);
        new
    }

    /// Replace source operand `slot` of `inst` with a fresh temporary, inserting a `mov` of the
    /// original operand into the temporary immediately before `inst`. Returns the temporary.
    pub fn replace_src(&mut self, inst: InstIdx, slot: usize) -> VReg {
        let tmp = self.new_tmp();
        let tmp_op = SelReg::vreg(tmp, DataType::F, self.default_region());
        let old = self.insts[inst].srcs[slot];
        let mov = SelInst {
            opcode: Opcode::Mov,
            dsts: smallvec![tmp_op],
            srcs: smallvec![old],
            block: self.insts[inst].block,
        };
        self.insert_near(inst, mov, false);
        self.insts[inst].srcs[slot] = tmp_op;
        tmp
    }

    /// Replace destination operand `slot` of `inst` with a fresh temporary, inserting a `mov` of
    /// the temporary into the original operand immediately after `inst`. Returns the temporary.
    pub fn replace_dst(&mut self, inst: InstIdx, slot: usize) -> VReg {
        let tmp = self.new_tmp();
        let tmp_op = SelReg::vreg(tmp, DataType::F, self.default_region());
        let old = self.insts[inst].dsts[slot];
        let mov = SelInst {
            opcode: Opcode::Mov,
            dsts: smallvec![old],
            srcs: smallvec![tmp_op],
            block: self.insts[inst].block,
        };
        self.insert_near(inst, mov, true);
        self.insts[inst].dsts[slot] = tmp_op;
        tmp
    }

    /// Format `ops`, wrapping each vector in `groups` (pairs of `(first, len)`) in braces.
    fn fmt_ops(
        f: &mut fmt::Formatter<'_>,
        ops: &[SelReg],
        groups: Option<&Vec<(usize, usize)>>,
    ) -> fmt::Result {
        let mut i = 0;
        while i < ops.len() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match groups.and_then(|g| g.iter().find(|(first, _)| *first == i)) {
                Some((first, len)) => {
                    let items = ops[*first..first + len]
                        .iter()
                        .map(|x| x.to_string())
                        .collect::<Vec<_>>();
                    write!(f, "{{{}}}", items.join(", "))?;
                    i += len;
                }
                None => {
                    write!(f, "{}", ops[i])?;
                    i += 1;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut groups: HashMap<(InstIdx, VectorSide), Vec<(usize, usize)>> = HashMap::new();
        for v in self.vectors.iter() {
            groups
                .entry((v.inst, v.side))
                .or_default()
                .push((v.first, v.len));
        }
        for (vreg, data) in self.regs.iter_enumerated().skip(VReg::FIRST_USER.index()) {
            write!(f, "{vreg}: {}", data.family)?;
            if data.is_scalar {
                write!(f, " scalar")?;
            }
            writeln!(f)?;
        }
        for (bidx, b) in self.blocks.iter_enumerated() {
            writeln!(f, "bb{}:", bidx.index())?;
            for iidx in &b.insts {
                let inst = &self.insts[*iidx];
                write!(f, "  ")?;
                if !inst.dsts.is_empty() {
                    Self::fmt_ops(f, &inst.dsts, groups.get(&(*iidx, VectorSide::Dst)))?;
                    write!(f, " = ")?;
                }
                write!(f, "{}", inst.opcode)?;
                if !inst.srcs.is_empty() {
                    write!(f, " ")?;
                    Self::fmt_ops(f, &inst.srcs, groups.get(&(*iidx, VectorSide::Src)))?;
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sel_with_send() -> (Selection, [VReg; 3], InstIdx) {
        let mut sel = Selection::new(SimdWidth::Simd8);
        let r = sel.default_region();
        let a = sel.new_reg(RegData::new(RegFamily::Dword, false));
        let b = sel.new_reg(RegData::new(RegFamily::Dword, false));
        let c = sel.new_reg(RegData::new(RegFamily::Dword, false));
        let bb = sel.push_block();
        sel.push_inst(
            bb,
            Opcode::Add,
            &[SelReg::vreg(a, DataType::F, r)],
            &[SelReg::vreg(b, DataType::F, r), SelReg::imm(1, DataType::D)],
        );
        let send = sel.push_inst(
            bb,
            Opcode::Send,
            &[SelReg::vreg(c, DataType::F, r)],
            &[SelReg::vreg(a, DataType::F, r), SelReg::vreg(b, DataType::F, r)],
        );
        sel.push_vector(send, VectorSide::Src, 0, 2);
        (sel, [a, b, c], send)
    }

    #[test]
    fn display() {
        let (sel, _, _) = sel_with_send();
        let u = VReg::FIRST_USER.index();
        assert_eq!(
            sel.to_string(),
            format!(
                "%{u}: dword\n%{}: dword\n%{}: dword\nbb0:\n  %{u} = add %{}, 0x1:D\n  %{} = send {{%{u}, %{}}}\n",
                u + 1,
                u + 2,
                u + 1,
                u + 2,
                u + 1
            )
        );
    }

    #[test]
    fn replace_src_inserts_before() {
        let (mut sel, [a, _, _], send) = sel_with_send();
        let tmp = sel.replace_src(send, 0);
        assert_ne!(tmp, a);
        let insts = sel
            .block_insts(BlockIdx::new(0))
            .map(|(_, x)| x.clone())
            .collect::<Vec<_>>();
        assert_eq!(insts.len(), 3);
        assert_eq!(insts[1].opcode, Opcode::Mov);
        assert_eq!(insts[1].dsts[0].virt(), Some(tmp));
        assert_eq!(insts[1].srcs[0].virt(), Some(a));
        assert_eq!(insts[2].srcs[0].virt(), Some(tmp));
        assert_eq!(sel.vector_vreg(VectorIdx::new(0), 0), Some(tmp));
        assert_eq!(sel.reg_data(tmp), RegData::new(RegFamily::Dword, false));
    }

    #[test]
    fn replace_dst_inserts_after() {
        let (mut sel, [_, _, c], send) = sel_with_send();
        let tmp = sel.replace_dst(send, 0);
        let insts = sel
            .block_insts(BlockIdx::new(0))
            .map(|(iidx, x)| (iidx, x.clone()))
            .collect::<Vec<_>>();
        assert_eq!(insts.len(), 3);
        assert_eq!(insts[1].0, send);
        assert_eq!(insts[1].1.dsts[0].virt(), Some(tmp));
        assert_eq!(insts[2].1.opcode, Opcode::Mov);
        assert_eq!(insts[2].1.dsts[0].virt(), Some(c));
        assert_eq!(insts[2].1.srcs[0].virt(), Some(tmp));
    }

    #[test]
    #[should_panic]
    fn vector_out_of_range() {
        let (mut sel, _, send) = sel_with_send();
        sel.push_vector(send, VectorSide::Src, 1, 2);
    }
}
