//! Per compiled unit configuration.

use crate::{
    errors::AllocError,
    log::{check_log_ir, stats::Stats, Log},
    phys::RegWidth,
};

/// The number of lanes a compiled unit executes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SimdWidth {
    Simd8,
    Simd16,
}

impl SimdWidth {
    /// The number of lanes.
    pub fn lanes(self) -> u32 {
        match self {
            Self::Simd8 => 8,
            Self::Simd16 => 16,
        }
    }

    /// The region width of a per-lane register at this SIMD width.
    pub fn reg_width(self) -> RegWidth {
        match self {
            Self::Simd8 => RegWidth::Simd8,
            Self::Simd16 => RegWidth::Simd16,
        }
    }

    /// The distance in bytes between consecutive members of a vector: one dword per lane.
    pub fn vector_stride(self) -> u32 {
        self.lanes() * 4
    }
}

impl TryFrom<u32> for SimdWidth {
    type Error = AllocError;

    fn try_from(lanes: u32) -> Result<Self, Self::Error> {
        match lanes {
            8 => Ok(Self::Simd8),
            16 => Ok(Self::Simd16),
            _ => Err(AllocError::UnsupportedConfig(format!(
                "SIMD width {lanes} (only 8 and 16 are supported)"
            ))),
        }
    }
}

/// The configuration of one run of the register allocator.
pub struct Config {
    pub simd_width: SimdWidth,
    pub(crate) log: Log,
    pub(crate) stats: Stats,
}

impl Config {
    /// Create a configuration for a unit compiled `simd_width` lanes wide, picking up logging and
    /// statistics settings from the `GENRAD_LOG*` environment variables.
    pub fn new(simd_width: u32) -> Result<Self, AllocError> {
        let simd_width = SimdWidth::try_from(simd_width)?;
        let log = Log::new().map_err(|e| AllocError::UnsupportedConfig(e.to_string()))?;
        check_log_ir().map_err(|e| AllocError::UnsupportedConfig(e.to_string()))?;
        Ok(Self {
            simd_width,
            log,
            stats: Stats::new(),
        })
    }

    /// Create a configuration with logging and statistics output disabled, regardless of the
    /// environment.
    pub fn quiet(simd_width: u32) -> Result<Self, AllocError> {
        Ok(Self {
            simd_width: SimdWidth::try_from(simd_width)?,
            log: Log::disabled(),
            stats: Stats::new_silent(),
        })
    }
}
