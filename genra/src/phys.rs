//! Physical register descriptors.
//!
//! The general register file is a byte addressable space made up of [BANK_SIZE] byte banks. A
//! [PhysReg] names a location in that space as a bank number (`nr`) plus a byte offset within the
//! bank (`subnr`), together with the region and type information the encoder needs.

use static_assertions::const_assert;
use std::fmt;
use strum::{Display, EnumString};

/// The size in bytes of one bank of the general register file.
pub const BANK_SIZE: u32 = 32;
const_assert!(BANK_SIZE.is_power_of_two());

/// The number of banks in the general register file.
pub const BANK_COUNT: u32 = 128;

/// The byte offset of the dispatch payload. Bank 0 holds the thread header (including the group
/// identifiers), so the payload starts at bank 1.
pub const PAYLOAD_BASE: u32 = BANK_SIZE;

/// Encoded operand data types.
#[derive(Clone, Copy, Debug, Default, Display, EnumString, Eq, Hash, PartialEq)]
pub enum DataType {
    UD,
    D,
    UW,
    W,
    UB,
    B,
    #[default]
    F,
}

impl DataType {
    /// How many bytes does one element of this type occupy?
    pub fn byte_size(self) -> u32 {
        match self {
            Self::UD | Self::D | Self::F => 4,
            Self::UW | Self::W => 2,
            Self::UB | Self::B => 1,
        }
    }
}

/// Which register file does an operand live in?
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum RegFile {
    /// Architecture registers (null, accumulators, flags, ...).
    Arch,
    /// The general register file: the only file the allocator manages.
    #[default]
    General,
    /// An immediate value encoded in the instruction itself.
    Immediate,
}

/// How many lanes does an allocated register cover?
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RegWidth {
    /// One value broadcast to every lane.
    Scalar,
    Simd8,
    Simd16,
}

/// A register region: `<vstride;width,hstride>`, all in elements.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Region {
    pub vstride: u8,
    pub width: u8,
    pub hstride: u8,
}

impl Region {
    pub const SCALAR: Region = Region::new(0, 1, 0);

    pub const fn new(vstride: u8, width: u8, hstride: u8) -> Self {
        Self {
            vstride,
            width,
            hstride,
        }
    }

    fn for_width(w: RegWidth) -> Self {
        match w {
            RegWidth::Scalar => Self::SCALAR,
            RegWidth::Simd8 => Self::new(8, 8, 1),
            RegWidth::Simd16 => Self::new(16, 16, 1),
        }
    }
}

impl Default for Region {
    fn default() -> Self {
        Self::new(8, 8, 1)
    }
}

/// A physical register operand, ready for encoding.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct PhysReg {
    pub file: RegFile,
    /// The bank number.
    pub nr: u32,
    /// The byte offset within bank `nr`.
    pub subnr: u32,
    pub ty: DataType,
    pub region: Region,
    pub negation: bool,
    pub absolute: bool,
    /// The immediate payload, only meaningful for [RegFile::Immediate].
    pub imm: u32,
}

impl PhysReg {
    /// Create a general register file descriptor at byte offset `off` covering `width` lanes of
    /// type `ty`.
    pub fn grf(off: u32, ty: DataType, width: RegWidth) -> Self {
        Self {
            file: RegFile::General,
            nr: off / BANK_SIZE,
            subnr: off % BANK_SIZE,
            ty,
            region: Region::for_width(width),
            negation: false,
            absolute: false,
            imm: 0,
        }
    }

    /// Create a general register file descriptor for element `elem` (counted in units of `ty`) of
    /// bank `nr`.
    pub fn grf_elem(nr: u32, elem: u32, ty: DataType, width: RegWidth) -> Self {
        Self::grf(nr * BANK_SIZE + elem * ty.byte_size(), ty, width)
    }

    /// The absolute byte offset of this register within its register file.
    pub fn byte_offset(&self) -> u32 {
        self.nr * BANK_SIZE + self.subnr
    }

    /// Select quarter `quarter` of this register: i.e. the register as seen by the `quarter`th
    /// group of 8 lanes. Scalar regions are the same in every quarter.
    pub fn quarter(self, quarter: u8) -> Self {
        if self.region.hstride == 0 {
            return self;
        }
        let off = self.byte_offset()
            + self.ty.byte_size() * u32::from(self.region.hstride) * 8 * u32::from(quarter);
        Self {
            nr: off / BANK_SIZE,
            subnr: off % BANK_SIZE,
            ..self
        }
    }
}

impl fmt::Display for PhysReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negation {
            write!(f, "-")?;
        }
        if self.absolute {
            write!(f, "(abs)")?;
        }
        let Region {
            vstride,
            width,
            hstride,
        } = self.region;
        match self.file {
            RegFile::General => write!(
                f,
                "r{}.{}<{vstride};{width},{hstride}>:{}",
                self.nr,
                self.subnr / self.ty.byte_size(),
                self.ty
            ),
            RegFile::Arch => write!(
                f,
                "a{}.{}<{vstride};{width},{hstride}>:{}",
                self.nr,
                self.subnr / self.ty.byte_size(),
                self.ty
            ),
            RegFile::Immediate => write!(f, "0x{:x}:{}", self.imm, self.ty),
        }
    }
}
