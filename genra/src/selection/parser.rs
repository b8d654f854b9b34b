//! Parse the textual form of a [Selection], so that tests can be written in concrete syntax.
//!
//! The format is that produced by `Display for Selection`, plus optional `live_out` lines at the
//! end of a block:
//!
//! ```text
//! %20: dword
//! %21: dword scalar
//! bb0:
//!   %20 = add %lid0, 0x1:D
//!   %21 = send {%20, %lid1}
//!   live_out %20
//! ```
//!
//! Virtual registers must be declared before the first block. Undeclared gaps in the numbering are
//! filled with (unused) per-lane dword registers.

use super::{Opcode, SelReg, Selection, VectorSide};
use crate::{
    config::SimdWidth,
    liveness::LiveOut,
    phys::{DataType, RegFile, Region},
    reg::{RegData, RegFamily, SpecialReg, VReg},
};
use regex::Regex;
use std::{collections::HashMap, str::FromStr, sync::OnceLock};

static DECL_RE: OnceLock<Regex> = OnceLock::new();
static INST_RE: OnceLock<Regex> = OnceLock::new();
static OP_RE: OnceLock<Regex> = OnceLock::new();

/// An operand list: the operands themselves plus the `(first, len)` of each braced vector.
type Ops = (Vec<SelReg>, Vec<(usize, usize)>);

impl Selection {
    /// Parse `s` into a selection for a unit `simd_width` lanes wide, and the live-out sets of its
    /// blocks.
    ///
    /// # Panics
    ///
    /// On any syntax error.
    pub(crate) fn from_str(simd_width: SimdWidth, s: &str) -> (Selection, LiveOut) {
        let decl_re = DECL_RE
            .get_or_init(|| Regex::new(r"^%(\d+):\s*([a-z]+)(\s+scalar)?$").unwrap());
        let inst_re = INST_RE.get_or_init(|| {
            Regex::new(r"^(?:(?P<dsts>.+?) = )?(?P<op>[a-z]+)(?: (?P<srcs>.+))?$").unwrap()
        });

        let mut sel = Selection::new(simd_width);
        let mut decls = HashMap::new();
        let mut live_outs = Vec::new();
        let mut in_body = false;
        for line in s.lines().map(|x| x.trim()).filter(|x| !x.is_empty()) {
            if let Some(caps) = decl_re.captures(line) {
                assert!(!in_body, "Declaration after first block: {line}");
                let idx = caps[1].parse::<usize>().unwrap();
                assert!(
                    idx >= VReg::FIRST_USER.index(),
                    "%{idx} clashes with a special register"
                );
                let family = RegFamily::from_str(&caps[2])
                    .unwrap_or_else(|_| panic!("Unknown family: {}", &caps[2]));
                decls.insert(idx, RegData::new(family, caps.get(3).is_some()));
                continue;
            }
            if !in_body {
                in_body = true;
                let max = decls.keys().max().copied().unwrap_or(0);
                for idx in VReg::FIRST_USER.index()..=max {
                    let data = decls
                        .get(&idx)
                        .copied()
                        .unwrap_or(RegData::new(RegFamily::Dword, false));
                    sel.new_reg(data);
                }
            }
            if let Some(n) = line.strip_prefix("bb").and_then(|x| x.strip_suffix(':')) {
                let bidx = sel.push_block();
                assert_eq!(n.parse::<usize>().unwrap(), bidx.index(), "Blocks out of order");
                continue;
            }
            let bidx = sel
                .block_idxs()
                .last()
                .unwrap_or_else(|| panic!("Instruction outside a block: {line}"));
            if let Some(regs) = line.strip_prefix("live_out ") {
                for x in split_items(regs) {
                    let op = sel.parse_op(x);
                    live_outs.push((bidx, op.virt().unwrap()));
                }
                continue;
            }
            let caps = inst_re
                .captures(line)
                .unwrap_or_else(|| panic!("Can't parse instruction: {line}"));
            let opcode = Opcode::from_str(&caps["op"])
                .unwrap_or_else(|_| panic!("Unknown opcode: {}", &caps["op"]));
            let (dsts, dst_vecs) = caps
                .name("dsts")
                .map(|x| sel.parse_ops(x.as_str()))
                .unwrap_or_default();
            let (srcs, src_vecs) = caps
                .name("srcs")
                .map(|x| sel.parse_ops(x.as_str()))
                .unwrap_or_default();
            let iidx = sel.push_inst(bidx, opcode, &dsts, &srcs);
            for (first, len) in dst_vecs {
                sel.push_vector(iidx, VectorSide::Dst, first, len);
            }
            for (first, len) in src_vecs {
                sel.push_vector(iidx, VectorSide::Src, first, len);
            }
        }

        let mut lo = LiveOut::for_selection(&sel);
        for (bidx, vreg) in live_outs {
            lo.insert(bidx, vreg);
        }
        (sel, lo)
    }

    /// Parse a comma separated operand list, where `{...}` marks a vector.
    fn parse_ops(&self, s: &str) -> Ops {
        let mut ops = Vec::new();
        let mut vecs = Vec::new();
        for item in split_items(s) {
            match item.strip_prefix('{').and_then(|x| x.strip_suffix('}')) {
                Some(inner) => {
                    let first = ops.len();
                    for x in split_items(inner) {
                        ops.push(self.parse_op(x));
                    }
                    vecs.push((first, ops.len() - first));
                }
                None => ops.push(self.parse_op(item)),
            }
        }
        (ops, vecs)
    }

    fn parse_op(&self, s: &str) -> SelReg {
        let op_re = OP_RE.get_or_init(|| {
            Regex::new(concat!(
                r"^(?P<neg>-)?(?P<abs>\(abs\))?",
                r"(?:%(?P<vreg>[a-z0-9]+)|r(?P<rnr>\d+)\.(?P<rsub>\d+)",
                r"|a(?P<anr>\d+)\.(?P<asub>\d+)|0x(?P<imm>[0-9a-f]+))",
                r"(?::(?P<ty>[A-Z]+))?(?:\.q(?P<q>\d))?$"
            ))
            .unwrap()
        });
        let caps = op_re
            .captures(s)
            .unwrap_or_else(|| panic!("Can't parse operand: {s}"));
        let ty = caps
            .name("ty")
            .map(|x| DataType::from_str(x.as_str()).unwrap())
            .unwrap_or_default();
        let num = |n: &str| caps.name(n).unwrap().as_str().parse::<u32>().unwrap();
        let mut op = if let Some(x) = caps.name("vreg") {
            let vreg = match x.as_str().parse::<usize>() {
                Ok(i) => VReg::from_usize(i),
                Err(_) => SpecialReg::from_str(x.as_str())
                    .unwrap_or_else(|_| panic!("Unknown register: {s}"))
                    .vreg(),
            };
            assert!(vreg.index() < self.regs_len(), "Undeclared register: {s}");
            let region = if self.is_scalar_or_bool(vreg) {
                Region::SCALAR
            } else {
                self.default_region()
            };
            SelReg::vreg(vreg, ty, region)
        } else if caps.name("rnr").is_some() {
            SelReg::fixed(
                RegFile::General,
                num("rnr"),
                num("rsub") * ty.byte_size(),
                ty,
                Region::SCALAR,
            )
        } else if caps.name("anr").is_some() {
            SelReg::fixed(
                RegFile::Arch,
                num("anr"),
                num("asub") * ty.byte_size(),
                ty,
                Region::SCALAR,
            )
        } else {
            let imm = u32::from_str_radix(caps.name("imm").unwrap().as_str(), 16).unwrap();
            SelReg::imm(imm, ty)
        };
        op.negation = caps.name("neg").is_some();
        op.absolute = caps.name("abs").is_some();
        if caps.name("q").is_some() {
            op.quarter = u8::try_from(num("q")).unwrap();
        }
        op
    }
}

/// Split `s` on top-level commas (i.e. those not inside braces).
fn split_items(s: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut depth = 0;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth -= 1,
            ',' if depth == 0 => {
                items.push(s[start..i].trim());
                start = i + 1;
            }
            _ => (),
        }
    }
    let last = s[start..].trim();
    if !last.is_empty() {
        items.push(last);
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::{BlockIdx, Storage, VectorIdx};

    #[test]
    fn round_trip() {
        let src = "%20: dword
%21: dword scalar
%22: word
bb0:
  %20 = add %lid0, 0x1:D
  %22:UW = mov -(abs)%20.q1
bb1:
  {%20, %22}, r0.1 = send %21, {%lid1, %20}
";
        let (sel, _) = Selection::from_str(SimdWidth::Simd8, src);
        assert_eq!(sel.to_string(), src);
    }

    #[test]
    fn operands() {
        let (sel, lo) = Selection::from_str(
            SimdWidth::Simd16,
            "
            %20: dword
            %21: byte scalar
            bb0:
              %20 = mov %21:UB
              eot r2.3:UD, a0.1:UW
              live_out %20
            ",
        );
        let insts = sel
            .block_insts(BlockIdx::new(0))
            .map(|(_, x)| x.clone())
            .collect::<Vec<_>>();
        assert_eq!(insts[0].dsts[0].region, Region::new(16, 16, 1));
        assert_eq!(insts[0].srcs[0].region, Region::SCALAR);
        assert_eq!(insts[0].srcs[0].ty, DataType::UB);
        assert_eq!(
            insts[1].srcs[0].storage,
            Storage::Fixed {
                file: RegFile::General,
                nr: 2,
                subnr: 12
            }
        );
        assert_eq!(
            insts[1].srcs[1].storage,
            Storage::Fixed {
                file: RegFile::Arch,
                nr: 0,
                subnr: 2
            }
        );
        assert!(lo.live_out(BlockIdx::new(0)).contains(&VReg::new(20)));
        assert_eq!(sel.vectors_len(), 0);
    }

    #[test]
    fn vectors() {
        let (sel, _) = Selection::from_str(
            SimdWidth::Simd8,
            "
            %23: dword
            bb0:
              {%20, %21} = send 0x0:UD, {%22, %23, %lid0}
            ",
        );
        assert_eq!(sel.regs_len(), 24);
        assert_eq!(sel.vectors_len(), 2);
        let v = sel.vector(VectorIdx::new(0));
        assert_eq!((v.side, v.first, v.len), (VectorSide::Dst, 0, 2));
        let v = sel.vector(VectorIdx::new(1));
        assert_eq!((v.side, v.first, v.len), (VectorSide::Src, 1, 3));
        assert_eq!(
            sel.vector_vreg(VectorIdx::new(1), 2),
            Some(SpecialReg::Lid0.vreg())
        );
    }

    #[test]
    #[should_panic]
    fn undeclared() {
        Selection::from_str(SimdWidth::Simd8, "%20: dword\nbb0:\n  %20 = mov %25\n");
    }
}
