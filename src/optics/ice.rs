//! Ice (and snow) optical properties, accumulated one category at a time.

use log::debug;
use ndarray::ArrayView2;

use super::tables::{interpolate, IceTables, ICE_SIZE_AXIS};
use super::{active_cells, OpticsAccumulator};
use crate::error::{OpticsError, TableQuantity};

/// Smallest generalized effective size accepted, in µm.
const MIN_SIZE: f32 = 5.0;

/// Factor applied to extinction and absorption for a generalized effective
/// size `size` in µm.
///
/// Above the largest tabulated size the extinction is scaled down so the
/// optical depth keeps falling off as 1/size, while the other quantities stay
/// at the top-bin values.
pub(crate) fn extinction_scale(size: f32) -> f32 {
    (ICE_SIZE_AXIS.upper() / size.max(f32::EPSILON)).min(1.)
}

/// Check an interpolated value against its allowed range.
fn check(
    quantity: TableQuantity,
    value: f32,
    band: usize,
    size: f32,
) -> Result<f32, OpticsError> {
    let ok = match quantity {
        TableQuantity::Extinction => value >= 0.,
        _ => (0. ..=1.).contains(&value),
    };
    if ok {
        Ok(value)
    } else {
        Err(OpticsError::TableValueOutOfBounds {
            quantity,
            band,
            size,
            value,
        })
    }
}

/// Optical properties of an ice category.
#[derive(Debug, Clone, Copy)]
pub struct IceOpticsEngine<'t> {
    tables: &'t IceTables,
}

impl<'t> IceOpticsEngine<'t> {
    /// Create an engine reading from `tables`.
    pub fn new(tables: &'t IceTables) -> Self {
        Self { tables }
    }

    /// Add one ice category into the running totals.
    ///
    /// `water_path` is in g/m² and `size` is the generalized effective size in
    /// µm, both (`num_columns`, `num_levels`). Cells without ice (zero water
    /// path or zero size) are left untouched. `category` is only used for error
    /// reporting.
    pub fn add(
        &self,
        mut acc: OpticsAccumulator,
        category: usize,
        water_path: ArrayView2<'_, f32>,
        size: ArrayView2<'_, f32>,
    ) -> Result<OpticsAccumulator, OpticsError> {
        if water_path.dim() != size.dim() || water_path.dim() != acc.cell_shape() {
            return Err(OpticsError::InconsistentInputs);
        }

        let active = active_cells(water_path, size, |s| s > 0.);
        debug!(
            "ice optics for category {category}: {} of {} cells",
            active.len(),
            water_path.len()
        );

        for (column, level) in active {
            let wp = water_path[[column, level]];
            let dge = size[[column, level]];
            if dge < MIN_SIZE {
                return Err(OpticsError::IceSizeOutOfBounds {
                    category,
                    column,
                    level,
                    size: dge,
                    water_path: wp,
                });
            }

            let scale = extinction_scale(dge);
            let at = ICE_SIZE_AXIS.locate(dge);

            let absorption = interpolate(&self.tables.absorption_lw, at);
            for (band, abs) in absorption.iter().enumerate() {
                acc.tau_lw[[column, level, band]] += abs * scale * wp;
            }

            let forward_delta = interpolate(&self.tables.forward_delta_sw, at);
            let extinction = interpolate(&self.tables.extinction_sw, at);
            let ssa = interpolate(&self.tables.ssa_sw, at);
            let asymmetry = interpolate(&self.tables.asymmetry_sw, at);
            for band in 0..extinction.len() {
                let fdelta = check(TableQuantity::ForwardDelta, forward_delta[band], band, dge)?;
                let ext = check(TableQuantity::Extinction, extinction[band], band, dge)?;
                let ssa = check(TableQuantity::SingleScatteringAlbedo, ssa[band], band, dge)?;
                let g = check(TableQuantity::Asymmetry, asymmetry[band], band, dge)?;

                // The forward-scattering fraction can't exceed the asymmetry
                let forward = (fdelta + 0.5 / ssa).min(g);

                let tau = ext * scale * wp;
                let tau_ssa = tau * ssa;
                acc.tau_sw[[column, level, band]] += tau;
                acc.tau_ssa[[column, level, band]] += tau_ssa;
                acc.tau_ssa_g[[column, level, band]] += tau_ssa * g;
                acc.tau_ssa_f[[column, level, band]] += tau_ssa * forward;
            }
        }

        Ok(acc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optics::tests::{host_tables, OwnedIceTables, NUM_LW, NUM_SW};
    use crate::optics::TableStore;
    use approx::assert_relative_eq;
    use ndarray::{s, Array2};

    fn store_with(ice: &OwnedIceTables) -> TableStore {
        let (liquid, _) = host_tables();
        TableStore::new(liquid.view(), ice.view()).unwrap()
    }

    fn single_cell(
        store: &TableStore,
        water_path: f32,
        size: f32,
    ) -> Result<OpticsAccumulator, OpticsError> {
        let engine = IceOpticsEngine::new(store.ice());
        let acc = OpticsAccumulator::zeros(1, 1, NUM_LW, NUM_SW);
        let water_path = Array2::from_elem([1, 1], water_path);
        let size = Array2::from_elem([1, 1], size);
        engine.add(acc, 0, water_path.view(), size.view())
    }

    #[test]
    fn scale_factor() {
        assert_eq!(extinction_scale(5.0), 1.0);
        assert_eq!(extinction_scale(140.0), 1.0);
        assert_relative_eq!(extinction_scale(200.0), 0.7, max_relative = 1e-6);

        // Keeps shrinking but never hits zero
        let mut previous = 1.0;
        for size in [280.0, 1.0e3, 1.0e5, 1.0e9, f32::MAX] {
            let scale = extinction_scale(size);
            assert!(scale < previous);
            assert!(scale > 0.0);
            previous = scale;
        }
    }

    #[test]
    fn inactive_cells_untouched() {
        let (_, ice) = host_tables();
        let store = store_with(&ice);
        let engine = IceOpticsEngine::new(store.ice());

        let mut acc = OpticsAccumulator::zeros(2, 2, NUM_LW, NUM_SW);
        acc.tau_sw.fill(1.0);
        acc.tau_lw.fill(2.0);
        let before = acc.clone();

        // Zero water path, zero size (even with ice present), or both
        let water_path = Array2::from_shape_vec([2, 2], vec![0.0, 10.0, 0.0, -1.0]).unwrap();
        let size = Array2::from_shape_vec([2, 2], vec![50.0, 0.0, 0.0, 50.0]).unwrap();
        let acc = engine.add(acc, 0, water_path.view(), size.view()).unwrap();
        assert_eq!(acc, before);
    }

    #[test]
    fn adds_into_totals() {
        let (_, ice) = host_tables();
        let store = store_with(&ice);
        let engine = IceOpticsEngine::new(store.ice());

        let water_path = Array2::from_elem([1, 1], 20.0);
        let size = Array2::from_elem([1, 1], 9.5);
        let once = engine
            .add(
                OpticsAccumulator::zeros(1, 1, NUM_LW, NUM_SW),
                0,
                water_path.view(),
                size.view(),
            )
            .unwrap();
        let twice = engine
            .add(once.clone(), 1, water_path.view(), size.view())
            .unwrap();

        for band in 0..NUM_SW {
            let ext = 0.5 * (ice.extinction_sw[[band, 1]] + ice.extinction_sw[[band, 2]]);
            assert_relative_eq!(once.tau_sw[[0, 0, band]], 20.0 * ext, max_relative = 1e-5);
            assert_relative_eq!(
                twice.tau_sw[[0, 0, band]],
                2.0 * once.tau_sw[[0, 0, band]],
                max_relative = 1e-6
            );
            assert_relative_eq!(
                twice.tau_ssa_f[[0, 0, band]],
                2.0 * once.tau_ssa_f[[0, 0, band]],
                max_relative = 1e-6
            );
        }
        for band in 0..NUM_LW {
            let abs = 0.5 * (ice.absorption_lw[[band, 1]] + ice.absorption_lw[[band, 2]]);
            assert_relative_eq!(once.tau_lw[[0, 0, band]], 20.0 * abs, max_relative = 1e-5);
        }
    }

    #[test]
    fn oversized_particles_scale_extinction_only() {
        let (_, ice) = host_tables();
        let store = store_with(&ice);
        let top = ICE_SIZE_AXIS.num_bins - 1;

        let acc = single_cell(&store, 10.0, 200.0).unwrap();
        let at_top = single_cell(&store, 10.0, 140.0).unwrap();
        for band in 0..NUM_SW {
            let ext = ice.extinction_sw[[band, top]];
            let ssa = ice.ssa_sw[[band, top]];
            let g = ice.asymmetry_sw[[band, top]];
            let tau = acc.tau_sw[[0, 0, band]];

            assert_relative_eq!(tau, 0.7 * 10.0 * ext, max_relative = 1e-5);
            assert!(tau < at_top.tau_sw[[0, 0, band]]);

            // Intensive quantities are the top-bin values
            assert_relative_eq!(acc.tau_ssa[[0, 0, band]] / tau, ssa, max_relative = 1e-5);
            assert_relative_eq!(
                acc.tau_ssa_g[[0, 0, band]] / acc.tau_ssa[[0, 0, band]],
                g,
                max_relative = 1e-5
            );
            assert_relative_eq!(
                acc.tau_ssa_f[[0, 0, band]] / acc.tau_ssa[[0, 0, band]],
                at_top.tau_ssa_f[[0, 0, band]] / at_top.tau_ssa[[0, 0, band]],
                max_relative = 1e-5
            );
        }
        for band in 0..NUM_LW {
            let abs = ice.absorption_lw[[band, top]];
            assert_relative_eq!(acc.tau_lw[[0, 0, band]], 0.7 * 10.0 * abs, max_relative = 1e-5);
        }
    }

    #[test]
    fn forward_never_exceeds_asymmetry() {
        let (_, ice) = host_tables();
        let store = store_with(&ice);
        for size in [5.0, 20.0, 77.7, 140.0, 500.0] {
            let acc = single_cell(&store, 3.0, size).unwrap();
            for band in 0..NUM_SW {
                assert!(acc.tau_ssa_f[[0, 0, band]] <= acc.tau_ssa_g[[0, 0, band]]);
            }
        }
    }

    #[test]
    fn forward_from_delta() {
        // Small ssa pushes fdelta + 0.5/ssa above g, large ssa keeps it below
        let (_, mut ice) = host_tables();
        ice.ssa_sw.fill(1.0);
        ice.asymmetry_sw.fill(0.9);
        ice.forward_delta_sw.fill(0.1);
        let store = store_with(&ice);
        let acc = single_cell(&store, 1.0, 50.0).unwrap();
        let f = acc.tau_ssa_f[[0, 0, 0]] / acc.tau_ssa[[0, 0, 0]];
        assert_relative_eq!(f, 0.6, max_relative = 1e-6);

        ice.ssa_sw.fill(0.5);
        let store = store_with(&ice);
        let acc = single_cell(&store, 1.0, 50.0).unwrap();
        let f = acc.tau_ssa_f[[0, 0, 0]] / acc.tau_ssa[[0, 0, 0]];
        assert_relative_eq!(f, 0.9, max_relative = 1e-6);
    }

    #[test]
    fn undersized_ice() {
        let (_, ice) = host_tables();
        let store = store_with(&ice);
        let engine = IceOpticsEngine::new(store.ice());

        let water_path = Array2::from_elem([2, 2], 5.0);
        let mut size = Array2::from_elem([2, 2], 30.0);
        size[[0, 1]] = 4.0;
        let err = engine
            .add(
                OpticsAccumulator::zeros(2, 2, NUM_LW, NUM_SW),
                3,
                water_path.view(),
                size.view(),
            )
            .unwrap_err();

        assert!(err.is_input_bounds());
        assert_eq!(
            err,
            OpticsError::IceSizeOutOfBounds {
                category: 3,
                column: 0,
                level: 1,
                size: 4.0,
                water_path: 5.0,
            }
        );
    }

    #[test]
    fn corrupted_tables() {
        let cases: [(TableQuantity, fn(&mut OwnedIceTables)); 4] = [
            (TableQuantity::ForwardDelta, |t: &mut OwnedIceTables| {
                t.forward_delta_sw.fill(1.5)
            }),
            (TableQuantity::Extinction, |t: &mut OwnedIceTables| {
                t.extinction_sw.fill(-0.1)
            }),
            (TableQuantity::SingleScatteringAlbedo, |t: &mut OwnedIceTables| {
                t.ssa_sw.fill(1.01)
            }),
            (TableQuantity::Asymmetry, |t: &mut OwnedIceTables| {
                t.asymmetry_sw.fill(-0.2)
            }),
        ];

        for (expected, corrupt) in cases {
            let (_, mut ice) = host_tables();
            corrupt(&mut ice);
            let store = store_with(&ice);
            let err = single_cell(&store, 1.0, 30.0).unwrap_err();
            assert!(err.is_table_bounds());
            match err {
                OpticsError::TableValueOutOfBounds { quantity, band, .. } => {
                    assert_eq!(quantity, expected);
                    assert_eq!(band, 0);
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn corrupted_single_band() {
        let (_, mut ice) = host_tables();
        ice.ssa_sw.slice_mut(s![5, ..]).fill(2.0);
        let store = store_with(&ice);
        // 50 µm falls exactly on a bin
        let err = single_cell(&store, 1.0, 50.0).unwrap_err();
        assert_eq!(
            err,
            OpticsError::TableValueOutOfBounds {
                quantity: TableQuantity::SingleScatteringAlbedo,
                band: 5,
                size: 50.0,
                value: 2.0,
            }
        );
    }
}
