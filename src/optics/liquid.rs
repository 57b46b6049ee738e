//! Liquid cloud optical properties.

use log::debug;
use ndarray::{s, ArrayView2};

use super::tables::{interpolate, LiquidTables, LIQUID_RADIUS_AXIS};
use super::{active_cells, OpticsAccumulator};
use crate::error::OpticsError;

/// Smallest effective radius accepted, in µm.
const MIN_RADIUS: f32 = 2.5;
/// Largest effective radius accepted, in µm.
const MAX_RADIUS: f32 = 60.0;
/// Accepted radii are clipped to this range before the table lookup.
const CLIP_RADIUS: (f32, f32) = (2.51, 59.99);

/// Liquid water inputs for a slice, each (`num_columns`, `num_levels`).
#[derive(Debug, Clone, Copy)]
pub struct LiquidInputs<'a> {
    /// Liquid water path in g/m².
    pub water_path: ArrayView2<'a, f32>,
    /// Effective radius in µm.
    pub effective_radius: ArrayView2<'a, f32>,
}

/// Optical properties of liquid cloud droplets.
#[derive(Debug, Clone, Copy)]
pub struct LiquidOpticsEngine<'t> {
    tables: &'t LiquidTables,
}

impl<'t> LiquidOpticsEngine<'t> {
    /// Create an engine reading from `tables`.
    pub fn new(tables: &'t LiquidTables) -> Self {
        Self { tables }
    }

    /// Compute the liquid contribution for every cell of a slice.
    ///
    /// The returned accumulator holds the longwave absorption optical depth
    /// and the shortwave tau, tau·ssa, tau·ssa·g, and tau·ssa·g² (the
    /// delta-Eddington forward fraction for droplets is g²). Cells with no
    /// liquid are zero.
    pub fn compute(&self, inputs: LiquidInputs<'_>) -> Result<OpticsAccumulator, OpticsError> {
        let LiquidInputs {
            water_path,
            effective_radius,
        } = inputs;
        if water_path.dim() != effective_radius.dim() {
            return Err(OpticsError::InconsistentInputs);
        }

        let (num_columns, num_levels) = water_path.dim();
        let mut acc = OpticsAccumulator::zeros(
            num_columns,
            num_levels,
            self.tables.absorption_lw.ncols(),
            self.tables.extinction_sw.ncols(),
        );

        let active = active_cells(water_path, effective_radius, |_| true);
        debug!(
            "liquid optics for {} of {} cells",
            active.len(),
            water_path.len()
        );

        for (column, level) in active {
            let wp = water_path[[column, level]];
            let radius = effective_radius[[column, level]];
            if !(MIN_RADIUS..=MAX_RADIUS).contains(&radius) {
                return Err(OpticsError::LiquidRadiusOutOfBounds {
                    column,
                    level,
                    radius,
                    water_path: wp,
                });
            }

            let at = LIQUID_RADIUS_AXIS.locate(radius.clamp(CLIP_RADIUS.0, CLIP_RADIUS.1));

            let absorption = interpolate(&self.tables.absorption_lw, at);
            for (tau, abs) in acc
                .tau_lw
                .slice_mut(s![column, level, ..])
                .iter_mut()
                .zip(&absorption)
            {
                *tau = abs * wp;
            }

            let extinction = interpolate(&self.tables.extinction_sw, at);
            let ssa = interpolate(&self.tables.ssa_sw, at);
            let asymmetry = interpolate(&self.tables.asymmetry_sw, at);
            for (band, ((ext, ssa), g)) in extinction.iter().zip(&ssa).zip(&asymmetry).enumerate() {
                let tau = ext * wp;
                let tau_ssa = tau * ssa;
                acc.tau_sw[[column, level, band]] = tau;
                acc.tau_ssa[[column, level, band]] = tau_ssa;
                acc.tau_ssa_g[[column, level, band]] = tau_ssa * g;
                acc.tau_ssa_f[[column, level, band]] = tau_ssa * g * g;
            }
        }

        Ok(acc)
    }
}
