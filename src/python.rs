//! Python extension module.
//!
//! NOTE: this module is intended for the interface between Rust and Python. The
//! real work happens in the other modules, and they do not use `pyo3`, its
//! only used here.

use std::time::Duration;

use log::{debug, info};
use ndarray::{s, Array3, Array4, Axis};
use numpy::{PyArray3, PyArray4, PyReadonlyArray2, PyReadonlyArray3, PyReadonlyArray4, ToPyArray};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use crate::error::OpticsError;
use crate::optics::{
    thread_pool, BatchProgress, CloudOptics, HostIceTables, HostLiquidTables, IceCategory,
    IceSizeMetric, LiquidInputs, OpticsParameters, SliceInputs, TableStore,
};

impl From<OpticsError> for PyErr {
    fn from(e: OpticsError) -> Self {
        match e {
            OpticsError::TablesNotInitialized | OpticsError::ThreadPool(_) => {
                PyRuntimeError::new_err(e.to_string())
            }
            _ => PyValueError::new_err(e.to_string()),
        }
    }
}

/// Cloud optical properties for a batch of latitude slices.
///
/// Band-resolved arrays are dimensioned as (`num_slices`, `num_columns`,
/// `num_levels`, `num_bands`) and the rest as (`num_slices`, `num_columns`,
/// `num_levels`).
#[pyclass]
struct CloudOpticsResult {
    tau_lw: Array4<f32>,
    tau_sw: Array4<f32>,
    ssa_sw: Array4<f32>,
    asymmetry_sw: Array4<f32>,
    forward_sw: Array4<f32>,
    tau_sw_liquid: Array4<f32>,
    tau_sw_ice: Array4<f32>,
    ice_effective_size: Array3<f32>,
    cloud_fraction: Array3<f32>,
}

/// Implement all the "getters" for the Python properties
#[pymethods]
impl CloudOpticsResult {
    #[getter]
    fn tau_lw<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray4<f32>> {
        self.tau_lw.to_pyarray(py)
    }

    #[getter]
    fn tau_sw<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray4<f32>> {
        self.tau_sw.to_pyarray(py)
    }

    #[getter]
    fn ssa_sw<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray4<f32>> {
        self.ssa_sw.to_pyarray(py)
    }

    #[getter]
    fn asymmetry_sw<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray4<f32>> {
        self.asymmetry_sw.to_pyarray(py)
    }

    #[getter]
    fn forward_sw<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray4<f32>> {
        self.forward_sw.to_pyarray(py)
    }

    #[getter]
    fn tau_sw_liquid<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray4<f32>> {
        self.tau_sw_liquid.to_pyarray(py)
    }

    #[getter]
    fn tau_sw_ice<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray4<f32>> {
        self.tau_sw_ice.to_pyarray(py)
    }

    #[getter]
    fn ice_effective_size<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray3<f32>> {
        self.ice_effective_size.to_pyarray(py)
    }

    #[getter]
    fn cloud_fraction<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray3<f32>> {
        self.cloud_fraction.to_pyarray(py)
    }
}

impl CloudOpticsResult {
    fn new(
        num_slices: usize,
        num_columns: usize,
        num_levels: usize,
        num_lw: usize,
        num_sw: usize,
    ) -> Self {
        let lw = [num_slices, num_columns, num_levels, num_lw];
        let sw = [num_slices, num_columns, num_levels, num_sw];
        let cells = [num_slices, num_columns, num_levels];
        Self {
            tau_lw: Array4::zeros(lw),
            tau_sw: Array4::zeros(sw),
            ssa_sw: Array4::zeros(sw),
            asymmetry_sw: Array4::zeros(sw),
            forward_sw: Array4::zeros(sw),
            tau_sw_liquid: Array4::zeros(sw),
            tau_sw_ice: Array4::zeros(sw),
            ice_effective_size: Array3::zeros(cells),
            cloud_fraction: Array3::zeros(cells),
        }
    }

    /// Copy the output of slice `index` into place.
    fn store(&mut self, index: usize, optics: &CloudOptics) {
        let band_resolved = [
            (&mut self.tau_lw, &optics.tau_lw),
            (&mut self.tau_sw, &optics.tau_sw),
            (&mut self.ssa_sw, &optics.ssa_sw),
            (&mut self.asymmetry_sw, &optics.asymmetry_sw),
            (&mut self.forward_sw, &optics.forward_sw),
            (&mut self.tau_sw_liquid, &optics.tau_sw_liquid),
            (&mut self.tau_sw_ice, &optics.tau_sw_ice),
        ];
        for (output, rhs) in band_resolved {
            output.index_axis_mut(Axis(0), index).assign(rhs);
        }

        self.ice_effective_size
            .index_axis_mut(Axis(0), index)
            .assign(&optics.ice_effective_size);
        self.cloud_fraction
            .index_axis_mut(Axis(0), index)
            .assign(&optics.cloud_fraction);
    }
}

/// Build the shared lookup tables.
///
/// Each table is dimensioned as (`num_bands`, `num_bins`). The liquid tables
/// have 58 effective radius bins (2.5 to 59.5 µm) and the ice tables have 46
/// generalized effective size bins (5 to 140 µm). Only the first call has any
/// effect.
#[pyfunction]
#[pyo3(signature = (liquid_absorption_lw, liquid_extinction_sw, liquid_ssa_sw, liquid_asymmetry_sw, ice_absorption_lw, ice_extinction_sw, ice_ssa_sw, ice_asymmetry_sw, ice_forward_delta_sw))]
#[allow(clippy::too_many_arguments)]
fn initialize_tables(
    liquid_absorption_lw: PyReadonlyArray2<'_, f32>,
    liquid_extinction_sw: PyReadonlyArray2<'_, f32>,
    liquid_ssa_sw: PyReadonlyArray2<'_, f32>,
    liquid_asymmetry_sw: PyReadonlyArray2<'_, f32>,
    ice_absorption_lw: PyReadonlyArray2<'_, f32>,
    ice_extinction_sw: PyReadonlyArray2<'_, f32>,
    ice_ssa_sw: PyReadonlyArray2<'_, f32>,
    ice_asymmetry_sw: PyReadonlyArray2<'_, f32>,
    ice_forward_delta_sw: PyReadonlyArray2<'_, f32>,
) -> PyResult<()> {
    let liquid = HostLiquidTables {
        absorption_lw: liquid_absorption_lw.as_array(),
        extinction_sw: liquid_extinction_sw.as_array(),
        ssa_sw: liquid_ssa_sw.as_array(),
        asymmetry_sw: liquid_asymmetry_sw.as_array(),
    };
    let ice = HostIceTables {
        absorption_lw: ice_absorption_lw.as_array(),
        extinction_sw: ice_extinction_sw.as_array(),
        ssa_sw: ice_ssa_sw.as_array(),
        asymmetry_sw: ice_asymmetry_sw.as_array(),
        forward_delta_sw: ice_forward_delta_sw.as_array(),
    };

    let tables = TableStore::initialize(liquid, ice)?;
    info!(
        "Cloud optics tables ready with {} longwave and {} shortwave bands",
        tables.num_lw(),
        tables.num_sw()
    );
    Ok(())
}

/// Compute cloud optical properties for a batch of latitude slices.
///
/// The tables must already be built with `initialize_tables`.
///
/// The liquid inputs have shape (`num_slices`, `num_columns`, `num_levels`):
///
/// `liquid_water_path`: liquid water path in g/m²
///
/// `liquid_radius`: liquid effective radius in µm
///
/// The ice inputs have shape (`num_slices`, `num_categories`, `num_columns`,
/// `num_levels`):
///
/// `ice_water_path`: ice water path in g/m² for each category
///
/// `ice_size`: ice generalized effective size in µm for each category, or
/// effective radius if `ice_size_is_radius` is true
///
/// The number of worker threads is controlled by `num_threads`. It must be a
/// positive integer, or `None` to automatically choose the number of threads.
#[pyfunction]
#[pyo3(signature = (liquid_water_path, liquid_radius, ice_water_path, ice_size, ice_size_is_radius=false, num_threads=None))]
fn compute_cloud_optics(
    py: Python<'_>,
    liquid_water_path: PyReadonlyArray3<'_, f32>,
    liquid_radius: PyReadonlyArray3<'_, f32>,
    ice_water_path: PyReadonlyArray4<'_, f32>,
    ice_size: PyReadonlyArray4<'_, f32>,
    ice_size_is_radius: bool,
    num_threads: Option<usize>,
) -> PyResult<CloudOpticsResult> {
    let tables = TableStore::get()?;

    let liquid_water_path = liquid_water_path.as_array();
    let liquid_radius = liquid_radius.as_array();
    let ice_water_path = ice_water_path.as_array();
    let ice_size = ice_size.as_array();

    let (num_slices, num_columns, num_levels) = liquid_water_path.dim();
    let num_categories = ice_water_path.shape()[1];

    // Check shapes of all inputs
    if liquid_radius.dim() != liquid_water_path.dim()
        || ice_water_path.dim() != (num_slices, num_categories, num_columns, num_levels)
        || ice_size.dim() != ice_water_path.dim()
    {
        return Err(OpticsError::InconsistentInputs.into());
    }
    debug!("input shapes are consistent");

    let parameters = OpticsParameters::new(if ice_size_is_radius {
        IceSizeMetric::EffectiveRadius
    } else {
        IceSizeMetric::GeneralizedEffectiveDiameter
    });

    let slices: Vec<SliceInputs<'_>> = (0..num_slices)
        .map(|slice| SliceInputs {
            liquid: LiquidInputs {
                water_path: liquid_water_path.index_axis(Axis(0), slice),
                effective_radius: liquid_radius.index_axis(Axis(0), slice),
            },
            ice: (0..num_categories)
                .map(|category| IceCategory {
                    water_path: ice_water_path.slice(s![slice, category, .., ..]),
                    effective_size: ice_size.slice(s![slice, category, .., ..]),
                })
                .collect(),
        })
        .collect();

    let pool = thread_pool(num_threads)?;

    // Tracks how many slices have finished and whether it's time to cancel
    let progress = BatchProgress::default();
    let mut results = Vec::new();

    info!(
        "Processing cloud optics for {num_slices} slices with {num_categories} ice categories"
    );

    pool.in_place_scope(|s| -> Result<(), PyErr> {
        s.spawn(|_| {
            results = tables.compute_slices_with_progress(&parameters, &slices, &progress);
        });

        // The work is done in the thread pool, but back here in the main
        // thread, handle progress reporting and checking for early
        // cancellation
        while !progress.is_cancelled() {
            if let Err(e) = py.check_signals() {
                progress.cancel();
                return Err(e);
            }

            let num_completed = progress.completed();
            let percent = num_completed as f32 / num_slices.max(1) as f32 * 100.;
            info!("Completed cloud optics for {num_completed}/{num_slices} slices ({percent:0.2}%)");

            // All finished without cancelling early
            if num_completed == num_slices {
                break;
            }

            py.allow_threads(|| {
                std::thread::sleep(Duration::from_secs(1));
            });
        }

        Ok(())
    })?;

    // Copy the per-slice results to the output arrays
    debug!("copying cloud optics output");
    let mut output = CloudOpticsResult::new(
        num_slices,
        num_columns,
        num_levels,
        tables.num_lw(),
        tables.num_sw(),
    );
    results
        .into_iter()
        .enumerate()
        .try_for_each(|(index, optics)| -> Result<_, OpticsError> {
            output.store(index, &optics?);
            Ok(())
        })?;

    Ok(output)
}

/// A Python module implemented in Rust.
#[pymodule]
fn cloud_optics(m: &Bound<'_, PyModule>) -> PyResult<()> {
    pyo3_log::init();

    m.add_function(wrap_pyfunction!(initialize_tables, m)?)?;
    m.add_function(wrap_pyfunction!(compute_cloud_optics, m)?)?;
    m.add_class::<CloudOpticsResult>()?;
    Ok(())
}
