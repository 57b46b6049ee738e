//! Cloud optical properties for radiative transfer.
//!
//! Converts cloud liquid and ice microphysics (water paths and effective
//! sizes) into band-resolved longwave optical thickness and shortwave optical
//! thickness, single-scattering albedo, asymmetry parameter, and
//! forward-scattering factor, one latitude slice at a time.
//!
//! The lookup tables are built once into a [`TableStore`], either owned by the
//! caller or shared through [`TableStore::initialize`]. Each slice is then
//! computed with [`TableStore::compute`], or many slices in parallel with
//! [`TableStore::compute_slices`].
//!
//! With the `python` feature the crate also builds as a Python extension module
//! with `initialize_tables` and `compute_cloud_optics` functions.

pub mod error;
pub mod optics;

#[cfg(feature = "python")]
mod python;

pub use error::{OpticsError, TableQuantity};
pub use optics::{
    CloudOptics, HostIceTables, HostLiquidTables, IceCategory, IceSizeMetric, LiquidInputs,
    OpticsParameters, SliceInputs, TableStore,
};
