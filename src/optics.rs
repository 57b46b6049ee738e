//! Cloud optical properties for a radiative transfer solver

mod aggregate;
mod batch;
mod ice;
mod liquid;
mod tables;


use ndarray::{Array3, ArrayView2, Zip};

pub use self::aggregate::{CloudOptics, IceCategory, SliceInputs, ICE_SIZE_FILL, REFERENCE_SW_BAND};
pub use self::batch::{thread_pool, BatchProgress};
pub use self::ice::IceOpticsEngine;
pub use self::liquid::{LiquidInputs, LiquidOpticsEngine};
pub use self::tables::{
    HostIceTables, HostLiquidTables, IceTables, LiquidTables, SizeAxis, TableStore,
    ICE_SIZE_AXIS, LIQUID_RADIUS_AXIS,
};

/// Which size metric the microphysics scheme supplies for ice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IceSizeMetric {
    /// Generalized effective size, used as-is
    #[default]
    GeneralizedEffectiveDiameter,
    /// Effective radius, converted with a fixed geometric factor
    EffectiveRadius,
}

impl IceSizeMetric {
    /// Factor converting the supplied ice size to generalized effective size.
    pub fn to_generalized_size(self) -> f32 {
        match self {
            IceSizeMetric::GeneralizedEffectiveDiameter => 1.0,
            IceSizeMetric::EffectiveRadius => 2.0 / 3.0_f32.sqrt(),
        }
    }
}

/// Input parameters for the cloud optics that are constant over a run.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpticsParameters {
    /// Size metric of the ice effective sizes.
    pub ice_size_metric: IceSizeMetric,
}

impl OpticsParameters {
    /// Create parameters for the given ice size metric.
    pub fn new(ice_size_metric: IceSizeMetric) -> Self {
        Self { ice_size_metric }
    }
}

/// Running totals of the additive optical quantities.
///
/// Each array is dimensioned as (`num_columns`, `num_levels`, `num_bands`).
/// These are only ever added to; dividing out the intensive quantities happens
/// once all species have been accumulated.
#[derive(Debug, Clone, PartialEq)]
pub struct OpticsAccumulator {
    /// Longwave absorption optical thickness.
    pub tau_lw: Array3<f32>,
    /// Shortwave extinction optical thickness.
    pub tau_sw: Array3<f32>,
    /// Shortwave tau·ssa.
    pub tau_ssa: Array3<f32>,
    /// Shortwave tau·ssa·g.
    pub tau_ssa_g: Array3<f32>,
    /// Shortwave tau·ssa·f.
    pub tau_ssa_f: Array3<f32>,
}

impl OpticsAccumulator {
    /// Zeroed accumulators for a slice.
    pub fn zeros(num_columns: usize, num_levels: usize, num_lw: usize, num_sw: usize) -> Self {
        Self {
            tau_lw: Array3::zeros([num_columns, num_levels, num_lw]),
            tau_sw: Array3::zeros([num_columns, num_levels, num_sw]),
            tau_ssa: Array3::zeros([num_columns, num_levels, num_sw]),
            tau_ssa_g: Array3::zeros([num_columns, num_levels, num_sw]),
            tau_ssa_f: Array3::zeros([num_columns, num_levels, num_sw]),
        }
    }

    /// Shape of a single cell-indexed plane, (`num_columns`, `num_levels`).
    pub fn cell_shape(&self) -> (usize, usize) {
        let (columns, levels, _) = self.tau_sw.dim();
        (columns, levels)
    }
}

/// Collect the (column, level) indices of cells that need a table lookup.
///
/// A cell is active when its water path is positive and `size_ok` accepts its
/// size. NaN water paths are never active.
pub(crate) fn active_cells(
    water_path: ArrayView2<'_, f32>,
    size: ArrayView2<'_, f32>,
    size_ok: impl Fn(f32) -> bool,
) -> Vec<(usize, usize)> {
    let mut active = Vec::new();
    Zip::indexed(water_path)
        .and(size)
        .for_each(|(column, level), &wp, &s| {
            if wp > 0. && size_ok(s) {
                active.push((column, level));
            }
        });
    active
}
