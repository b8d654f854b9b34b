//! Virtual registers.
//!
//! Virtual registers are handed to us by instruction selection. The first [SpecialReg::COUNT]
//! registers are reserved for values the hardware (or the dispatch ABI) provides: these never take
//! part in linear scan.

use crate::phys::DataType;
use std::fmt;
use strum::{Display, EnumCount, EnumIter, EnumString, FromRepr, IntoEnumIterator};

index_vec::define_index_type! {
    /// A virtual register.
    pub struct VReg = u32;
}

impl VReg {
    /// The first register which is not a [SpecialReg].
    pub const FIRST_USER: VReg = VReg::from_raw_unchecked(SpecialReg::COUNT as u32);

    /// If this is a special register, which one?
    pub fn special(self) -> Option<SpecialReg> {
        SpecialReg::from_repr(self.raw())
    }
}

impl fmt::Display for VReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.special() {
            Some(x) => write!(f, "%{x}"),
            None => write!(f, "%{}", self.raw()),
        }
    }
}

/// The family of a virtual register: the kind of value each lane holds. The order of the variants
/// is fixed.
#[derive(Clone, Copy, Debug, Display, EnumCount, EnumIter, EnumString, Eq, Hash, PartialEq)]
#[strum(serialize_all = "lowercase")]
pub enum RegFamily {
    Bool,
    Word,
    Byte,
    Dword,
}

/// Bytes per lane for each [RegFamily] as `(vector, scalar)`. Byte registers use two bytes per
/// byte so that they can be interleaved.
static FAMILY_WIDTHS: [(u32, u32); RegFamily::COUNT] = [(2, 2), (2, 2), (2, 2), (8, 4)];

impl RegFamily {
    /// How many bytes does one lane of this family occupy? `is_scalar` selects between the scalar
    /// (one value) and vector (one value per SIMD lane) widths.
    pub fn byte_width(self, is_scalar: bool) -> u32 {
        let (vector, scalar) = FAMILY_WIDTHS[self as usize];
        if is_scalar {
            scalar
        } else {
            vector
        }
    }
}

/// What instruction selection tells us about a virtual register.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RegData {
    pub family: RegFamily,
    /// Does this register hold one value for all lanes?
    pub is_scalar: bool,
}

impl RegData {
    pub fn new(family: RegFamily, is_scalar: bool) -> Self {
        Self { family, is_scalar }
    }

    /// Is this register a scalar or a boolean? Such registers can never be part of a vector.
    pub fn is_scalar_or_bool(&self) -> bool {
        self.is_scalar || self.family == RegFamily::Bool
    }

    /// The number of bytes per lane this register needs.
    pub fn byte_width(&self) -> u32 {
        self.family.byte_width(self.is_scalar)
    }

    /// The type this register is accessed as when it is given a location on its own.
    pub fn data_type(&self) -> DataType {
        match self.family {
            RegFamily::Bool | RegFamily::Word => DataType::UW,
            RegFamily::Byte => DataType::UB,
            RegFamily::Dword => DataType::F,
        }
    }
}

/// Registers whose values are provided by the hardware or the dispatch ABI.
///
/// Note: the discriminants double up as the raw values of the corresponding [VReg]s, so new
/// variants must not be given explicit discriminants.
#[repr(u32)]
#[derive(
    Clone, Copy, Debug, Display, EnumCount, EnumIter, EnumString, Eq, FromRepr, Hash, PartialEq,
)]
#[strum(serialize_all = "lowercase")]
pub enum SpecialReg {
    Lid0,
    Lid1,
    Lid2,
    Groupid0,
    Groupid1,
    Groupid2,
    Lsize0,
    Lsize1,
    Lsize2,
    Gsize0,
    Gsize1,
    Gsize2,
    Goffset0,
    Goffset1,
    Goffset2,
    Numgroup0,
    Numgroup1,
    Numgroup2,
    Stackptr,
    Blockip,
}

impl SpecialReg {
    /// The group identifier registers. The hardware writes these into the very first bank and
    /// they are never considered by linear scan.
    pub const GROUP_IDS: [SpecialReg; 3] =
        [SpecialReg::Groupid0, SpecialReg::Groupid1, SpecialReg::Groupid2];

    /// The virtual register for this special register.
    pub fn vreg(self) -> VReg {
        VReg::from_raw_unchecked(self as u32)
    }

    /// The register data instruction selection associates with this special register.
    pub fn reg_data(self) -> RegData {
        match self {
            Self::Lid0 | Self::Lid1 | Self::Lid2 => RegData::new(RegFamily::Dword, false),
            Self::Blockip => RegData::new(RegFamily::Word, false),
            _ => RegData::new(RegFamily::Dword, true),
        }
    }

    /// Is `vreg` one of the group identifier registers?
    pub fn is_group_id(vreg: VReg) -> bool {
        matches!(
            vreg.special(),
            Some(Self::Groupid0 | Self::Groupid1 | Self::Groupid2)
        )
    }

    /// Iterate over the [RegData] of every special register, in [VReg] order.
    pub(crate) fn all_reg_data() -> impl Iterator<Item = RegData> {
        Self::iter().map(|x| x.reg_data())
    }
}
