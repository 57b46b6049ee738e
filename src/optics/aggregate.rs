//! Combine liquid and ice contributions and normalize them.

use log::debug;
use ndarray::{Array2, Array3, ArrayView2, Axis, Zip};

use super::ice::IceOpticsEngine;
use super::liquid::{LiquidInputs, LiquidOpticsEngine};
use super::tables::TableStore;
use super::{OpticsAccumulator, OpticsParameters};
use crate::error::OpticsError;

/// Zero-based shortwave band whose optical thickness weights the diagnostic
/// ice effective size.
pub const REFERENCE_SW_BAND: usize = 8;

/// Diagnostic ice effective size for cells with no ice optical depth, in µm.
pub const ICE_SIZE_FILL: f32 = 25.0;

/// A single ice (or snow) category, each (`num_columns`, `num_levels`).
#[derive(Debug, Clone, Copy)]
pub struct IceCategory<'a> {
    /// Ice water path in g/m².
    pub water_path: ArrayView2<'a, f32>,
    /// Effective size in µm, in the metric given by [`OpticsParameters`].
    pub effective_size: ArrayView2<'a, f32>,
}

/// All the microphysical inputs for one latitude slice.
#[derive(Debug, Clone)]
pub struct SliceInputs<'a> {
    /// Liquid cloud water.
    pub liquid: LiquidInputs<'a>,
    /// Ice categories, processed in order.
    pub ice: Vec<IceCategory<'a>>,
}

/// Cloud optical properties for one latitude slice.
///
/// Band-resolved arrays are (`num_columns`, `num_levels`, `num_bands`) and the
/// rest are (`num_columns`, `num_levels`).
#[derive(Debug, Clone, PartialEq)]
pub struct CloudOptics {
    /// Longwave absorption optical thickness.
    pub tau_lw: Array3<f32>,
    /// Shortwave optical thickness.
    pub tau_sw: Array3<f32>,
    /// Shortwave single-scattering albedo.
    pub ssa_sw: Array3<f32>,
    /// Shortwave asymmetry parameter.
    pub asymmetry_sw: Array3<f32>,
    /// Shortwave forward-scattering factor.
    pub forward_sw: Array3<f32>,
    /// Shortwave optical thickness from liquid only.
    pub tau_sw_liquid: Array3<f32>,
    /// Shortwave optical thickness from all ice categories.
    pub tau_sw_ice: Array3<f32>,
    /// Optical-depth-weighted ice effective size, in the input size metric.
    pub ice_effective_size: Array2<f32>,
    /// 1 where there is any condensate, 0 elsewhere.
    pub cloud_fraction: Array2<f32>,
}

/// Running state while folding over the ice categories.
struct IceFold {
    acc: OpticsAccumulator,
    /// Reference band optical thickness before the current category.
    snapshot: Array2<f32>,
    /// Sum over categories of marginal optical thickness times size.
    size_weighted: Array2<f32>,
}

impl IceFold {
    fn new(acc: OpticsAccumulator) -> Self {
        let snapshot = acc.tau_sw.index_axis(Axis(2), REFERENCE_SW_BAND).to_owned();
        let size_weighted = Array2::zeros(snapshot.raw_dim());
        Self {
            acc,
            snapshot,
            size_weighted,
        }
    }

    /// Add a category and weight its marginal optical thickness by `size`.
    fn step(
        self,
        engine: &IceOpticsEngine<'_>,
        category: usize,
        water_path: ArrayView2<'_, f32>,
        size: ArrayView2<'_, f32>,
    ) -> Result<Self, OpticsError> {
        let Self {
            acc,
            snapshot,
            mut size_weighted,
        } = self;
        let acc = engine.add(acc, category, water_path, size)?;

        let current = acc.tau_sw.index_axis(Axis(2), REFERENCE_SW_BAND).to_owned();
        Zip::from(&mut size_weighted)
            .and(&current)
            .and(&snapshot)
            .and(size)
            .for_each(|weighted, &current, &previous, &size| {
                *weighted += (current - previous) * size;
            });

        Ok(Self {
            acc,
            snapshot: current,
            size_weighted,
        })
    }
}

impl TableStore {
    /// Compute the cloud optical properties for one latitude slice.
    ///
    /// The liquid contribution is computed first and each ice category is then
    /// added in order. The accumulated products are only divided out at the
    /// end, so the order of the ice categories doesn't change the intensive
    /// quantities beyond rounding.
    pub fn compute(
        &self,
        parameters: &OpticsParameters,
        inputs: &SliceInputs<'_>,
    ) -> Result<CloudOptics, OpticsError> {
        let cell_shape = inputs.liquid.water_path.dim();
        if inputs.ice.iter().any(|category| {
            category.water_path.dim() != cell_shape || category.effective_size.dim() != cell_shape
        }) {
            return Err(OpticsError::InconsistentInputs);
        }
        debug!(
            "cloud optics for {} columns, {} levels, {} ice categories",
            cell_shape.0,
            cell_shape.1,
            inputs.ice.len()
        );

        let acc = LiquidOpticsEngine::new(&self.liquid).compute(inputs.liquid)?;
        let tau_sw_liquid = acc.tau_sw.clone();

        let to_dge = parameters.ice_size_metric.to_generalized_size();
        let engine = IceOpticsEngine::new(&self.ice);
        let IceFold {
            acc,
            size_weighted,
            ..
        } = inputs.ice.iter().enumerate().try_fold(
            IceFold::new(acc),
            |fold, (category, ice)| {
                let dge = ice.effective_size.mapv(|size| size * to_dge);
                fold.step(&engine, category, ice.water_path, dge.view())
            },
        )?;

        let tau_sw_ice = &acc.tau_sw - &tau_sw_liquid;

        let ice_effective_size = Zip::from(&size_weighted)
            .and(&tau_sw_ice.index_axis(Axis(2), REFERENCE_SW_BAND))
            .map_collect(|&weighted, &tau| {
                if tau > 0. {
                    weighted / tau / to_dge
                } else {
                    ICE_SIZE_FILL
                }
            });

        let mut total_water_path = inputs.liquid.water_path.to_owned();
        for category in &inputs.ice {
            total_water_path += &category.water_path;
        }
        let cloud_fraction = total_water_path.mapv(|wp| if wp > 0. { 1. } else { 0. });

        let OpticsAccumulator {
            tau_lw,
            tau_sw,
            tau_ssa,
            tau_ssa_g,
            tau_ssa_f,
        } = acc;

        let ssa_sw = Zip::from(&tau_ssa)
            .and(&tau_sw)
            .map_collect(|&tau_ssa, &tau| if tau > 0. { tau_ssa / tau } else { 0. });
        let asymmetry_sw = Zip::from(&tau_ssa_g)
            .and(&tau_ssa)
            .map_collect(|&tau_ssa_g, &tau_ssa| {
                if tau_ssa > 0. {
                    tau_ssa_g / tau_ssa
                } else {
                    0.
                }
            });
        let forward_sw = Zip::from(&tau_ssa_f)
            .and(&tau_ssa)
            .map_collect(|&tau_ssa_f, &tau_ssa| {
                if tau_ssa > 0. {
                    tau_ssa_f / tau_ssa
                } else {
                    0.
                }
            });

        Ok(CloudOptics {
            tau_lw,
            tau_sw,
            ssa_sw,
            asymmetry_sw,
            forward_sw,
            tau_sw_liquid,
            tau_sw_ice,
            ice_effective_size,
            cloud_fraction,
        })
    }
}
