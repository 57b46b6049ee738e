//! Lookup tables for liquid and ice optical properties.
//!
//! The host supplies each table as (`num_bands`, `num_bins`). They are stored
//! transposed as (`num_bins`, `num_bands`) so that a single size bin is a
//! contiguous run of bands, which is the order the engines read them in.

use std::sync::OnceLock;

use log::debug;
use ndarray::{Array2, ArrayView2};
use smallvec::SmallVec;

use super::aggregate::REFERENCE_SW_BAND;
use crate::error::OpticsError;

/// Per-band values interpolated from a table at a single size.
pub(crate) type BandValues = SmallVec<[f32; 16]>;

/// An evenly spaced particle size axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeAxis {
    /// Size of the first bin, in µm.
    pub lower: f32,
    /// Spacing between bins, in µm.
    pub spacing: f32,
    /// Number of bins.
    pub num_bins: usize,
}

/// Liquid effective radius axis: 2.5 to 59.5 µm.
pub const LIQUID_RADIUS_AXIS: SizeAxis = SizeAxis {
    lower: 2.5,
    spacing: 1.0,
    num_bins: 58,
};

/// Ice generalized effective size axis: 5 to 140 µm.
pub const ICE_SIZE_AXIS: SizeAxis = SizeAxis {
    lower: 5.0,
    spacing: 3.0,
    num_bins: 46,
};

/// Location on a size axis: the lower bin and the weight of the upper bin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct BinWeight {
    /// Zero-based index of the lower bin. The upper bin is `lower + 1`.
    pub lower: usize,
    /// Weight of the upper bin, in [0, 1].
    pub frac: f32,
}

impl SizeAxis {
    /// Size of the last bin, in µm.
    pub fn upper(&self) -> f32 {
        self.lower + self.spacing * (self.num_bins - 1) as f32
    }

    /// Find the bracketing bins for `size`.
    ///
    /// Sizes outside the axis are pinned to the first or last bin pair with
    /// the weight clamped to [0, 1], so they take the edge bin value.
    pub(crate) fn locate(&self, size: f32) -> BinWeight {
        // One-based fractional position, so that bin 1 is `lower`
        let position = (size - (self.lower - self.spacing)) / self.spacing;
        let index = position.floor().max(1.).min((self.num_bins - 1) as f32);
        let frac = (position - index).clamp(0., 1.);

        BinWeight {
            lower: index as usize - 1,
            frac,
        }
    }
}

/// Linearly interpolate every band of a (`num_bins`, `num_bands`) table.
pub(crate) fn interpolate(table: &Array2<f32>, at: BinWeight) -> BandValues {
    let lo = table.row(at.lower);
    let hi = table.row(at.lower + 1);
    lo.iter()
        .zip(hi.iter())
        .map(|(lo, hi)| (1. - at.frac) * lo + at.frac * hi)
        .collect()
}

/// Convert a host (`num_bands`, `num_bins`) table to (`num_bins`, `num_bands`).
fn band_major(host: ArrayView2<'_, f32>) -> Array2<f32> {
    host.t().as_standard_layout().into_owned()
}

/// Liquid tables as supplied by the host, each (`num_bands`, `num_bins`).
#[derive(Debug, Clone, Copy)]
pub struct HostLiquidTables<'a> {
    /// Longwave specific absorption.
    pub absorption_lw: ArrayView2<'a, f32>,
    /// Shortwave specific extinction.
    pub extinction_sw: ArrayView2<'a, f32>,
    /// Shortwave single-scattering albedo.
    pub ssa_sw: ArrayView2<'a, f32>,
    /// Shortwave asymmetry parameter.
    pub asymmetry_sw: ArrayView2<'a, f32>,
}

/// Ice tables as supplied by the host, each (`num_bands`, `num_bins`).
#[derive(Debug, Clone, Copy)]
pub struct HostIceTables<'a> {
    /// Longwave specific absorption.
    pub absorption_lw: ArrayView2<'a, f32>,
    /// Shortwave specific extinction.
    pub extinction_sw: ArrayView2<'a, f32>,
    /// Shortwave single-scattering albedo.
    pub ssa_sw: ArrayView2<'a, f32>,
    /// Shortwave asymmetry parameter.
    pub asymmetry_sw: ArrayView2<'a, f32>,
    /// Shortwave forward-scattering delta.
    pub forward_delta_sw: ArrayView2<'a, f32>,
}

/// Liquid tables indexed by effective radius, each (`num_bins`, `num_bands`).
#[derive(Debug, Clone)]
pub struct LiquidTables {
    pub(crate) absorption_lw: Array2<f32>,
    pub(crate) extinction_sw: Array2<f32>,
    pub(crate) ssa_sw: Array2<f32>,
    pub(crate) asymmetry_sw: Array2<f32>,
}

/// Ice tables indexed by generalized effective size, each (`num_bins`,
/// `num_bands`).
#[derive(Debug, Clone)]
pub struct IceTables {
    pub(crate) absorption_lw: Array2<f32>,
    pub(crate) extinction_sw: Array2<f32>,
    pub(crate) ssa_sw: Array2<f32>,
    pub(crate) asymmetry_sw: Array2<f32>,
    pub(crate) forward_delta_sw: Array2<f32>,
}

/// All the lookup tables. Immutable once built.
#[derive(Debug, Clone)]
pub struct TableStore {
    pub(crate) liquid: LiquidTables,
    pub(crate) ice: IceTables,
    num_lw: usize,
    num_sw: usize,
}

/// Process-wide tables, built by the first call to [`TableStore::initialize`].
static TABLES: OnceLock<TableStore> = OnceLock::new();

impl TableStore {
    /// Build the tables from the host layout.
    ///
    /// Only the shapes are checked: every table must have the bin count of its
    /// size axis, and all longwave (or shortwave) tables must agree on the
    /// number of bands.
    pub fn new(liquid: HostLiquidTables<'_>, ice: HostIceTables<'_>) -> Result<Self, OpticsError> {
        let num_lw = liquid.absorption_lw.nrows();
        let num_sw = liquid.extinction_sw.nrows();

        let liquid_shapes = [
            (liquid.absorption_lw.dim(), num_lw),
            (liquid.extinction_sw.dim(), num_sw),
            (liquid.ssa_sw.dim(), num_sw),
            (liquid.asymmetry_sw.dim(), num_sw),
        ];
        let ice_shapes = [
            (ice.absorption_lw.dim(), num_lw),
            (ice.extinction_sw.dim(), num_sw),
            (ice.ssa_sw.dim(), num_sw),
            (ice.asymmetry_sw.dim(), num_sw),
            (ice.forward_delta_sw.dim(), num_sw),
        ];

        if liquid_shapes
            .iter()
            .any(|&(dim, bands)| dim != (bands, LIQUID_RADIUS_AXIS.num_bins))
        {
            return Err(OpticsError::InconsistentInputs);
        }
        if ice_shapes
            .iter()
            .any(|&(dim, bands)| dim != (bands, ICE_SIZE_AXIS.num_bins))
        {
            return Err(OpticsError::InconsistentInputs);
        }
        if num_lw == 0 || num_sw <= REFERENCE_SW_BAND {
            return Err(OpticsError::InconsistentInputs);
        }
        debug!("building cloud optics tables for {num_lw} longwave and {num_sw} shortwave bands");

        Ok(Self {
            liquid: LiquidTables {
                absorption_lw: band_major(liquid.absorption_lw),
                extinction_sw: band_major(liquid.extinction_sw),
                ssa_sw: band_major(liquid.ssa_sw),
                asymmetry_sw: band_major(liquid.asymmetry_sw),
            },
            ice: IceTables {
                absorption_lw: band_major(ice.absorption_lw),
                extinction_sw: band_major(ice.extinction_sw),
                ssa_sw: band_major(ice.ssa_sw),
                asymmetry_sw: band_major(ice.asymmetry_sw),
                forward_delta_sw: band_major(ice.forward_delta_sw),
            },
            num_lw,
            num_sw,
        })
    }

    /// Build the process-wide tables, once.
    ///
    /// The first successful call stores the tables; every later call ignores
    /// its arguments and returns the stored tables.
    pub fn initialize(
        liquid: HostLiquidTables<'_>,
        ice: HostIceTables<'_>,
    ) -> Result<&'static TableStore, OpticsError> {
        if let Some(tables) = TABLES.get() {
            debug!("cloud optics tables already initialized");
            return Ok(tables);
        }
        let tables = Self::new(liquid, ice)?;
        Ok(TABLES.get_or_init(|| tables))
    }

    /// The process-wide tables, if [`TableStore::initialize`] has been called.
    pub fn get() -> Result<&'static TableStore, OpticsError> {
        TABLES.get().ok_or(OpticsError::TablesNotInitialized)
    }

    /// Number of longwave bands.
    pub fn num_lw(&self) -> usize {
        self.num_lw
    }

    /// Number of shortwave bands.
    pub fn num_sw(&self) -> usize {
        self.num_sw
    }

    /// The liquid tables.
    pub fn liquid(&self) -> &LiquidTables {
        &self.liquid
    }

    /// The ice tables.
    pub fn ice(&self) -> &IceTables {
        &self.ice
    }
}
