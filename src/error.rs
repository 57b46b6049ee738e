//! Error types for the cloud optics.

/// Interpolated table quantities that are checked against physical bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableQuantity {
    /// Forward-scattering delta, must be within [0, 1]
    ForwardDelta,
    /// Specific extinction, must be non-negative
    Extinction,
    /// Single-scattering albedo, must be within [0, 1]
    SingleScatteringAlbedo,
    /// Asymmetry parameter, must be within [0, 1]
    Asymmetry,
}

impl std::fmt::Display for TableQuantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TableQuantity::ForwardDelta => "forward-scattering delta",
            TableQuantity::Extinction => "extinction",
            TableQuantity::SingleScatteringAlbedo => "single-scattering albedo",
            TableQuantity::Asymmetry => "asymmetry parameter",
        };
        f.write_str(name)
    }
}

/// Possible cloud optics errors.
#[derive(Debug, Clone, PartialEq)]
pub enum OpticsError {
    /// The inputs or tables don't have the expected shape(s)
    InconsistentInputs,
    /// A cloudy cell has a liquid effective radius outside the supported range
    LiquidRadiusOutOfBounds {
        /// Column index of the cell
        column: usize,
        /// Level index of the cell
        level: usize,
        /// Effective radius in µm
        radius: f32,
        /// Liquid water path of the cell
        water_path: f32,
    },
    /// A cloudy cell has an ice effective size below the smallest table bin
    IceSizeOutOfBounds {
        /// Ice category index
        category: usize,
        /// Column index of the cell
        column: usize,
        /// Level index of the cell
        level: usize,
        /// Generalized effective size in µm
        size: f32,
        /// Ice water path of the cell
        water_path: f32,
    },
    /// An interpolated table value is outside its physical range
    TableValueOutOfBounds {
        /// The quantity that failed the check
        quantity: TableQuantity,
        /// Shortwave band index
        band: usize,
        /// Generalized effective size used for the lookup, in µm
        size: f32,
        /// The interpolated value
        value: f32,
    },
    /// The shared tables were used before being initialized
    TablesNotInitialized,
    /// The worker thread pool could not be created
    ThreadPool(String),
    /// The operation was aborted early
    Cancelled,
}

impl OpticsError {
    /// Whether this error is caused by out-of-range microphysical inputs.
    pub fn is_input_bounds(&self) -> bool {
        matches!(
            self,
            OpticsError::LiquidRadiusOutOfBounds { .. } | OpticsError::IceSizeOutOfBounds { .. }
        )
    }

    /// Whether this error is caused by an out-of-range interpolated table value.
    pub fn is_table_bounds(&self) -> bool {
        matches!(self, OpticsError::TableValueOutOfBounds { .. })
    }
}

impl std::fmt::Display for OpticsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpticsError::InconsistentInputs => {
                write!(f, "inputs to cloud optics have the wrong shape")
            }
            OpticsError::LiquidRadiusOutOfBounds {
                column,
                level,
                radius,
                water_path,
            } => write!(
                f,
                "liquid effective radius {radius} µm out of bounds at column {column}, level {level} (water path {water_path})"
            ),
            OpticsError::IceSizeOutOfBounds {
                category,
                column,
                level,
                size,
                water_path,
            } => write!(
                f,
                "ice effective size {size} µm out of bounds for category {category} at column {column}, level {level} (water path {water_path})"
            ),
            OpticsError::TableValueOutOfBounds {
                quantity,
                band,
                size,
                value,
            } => write!(
                f,
                "interpolated ice {quantity} {value} out of bounds in band {band} (size {size} µm)"
            ),
            OpticsError::TablesNotInitialized => {
                write!(f, "cloud optics tables are not initialized")
            }
            OpticsError::ThreadPool(e) => write!(f, "couldn't build thread pool: {e}"),
            OpticsError::Cancelled => write!(f, "operation cancelled early"),
        }
    }
}

impl std::error::Error for OpticsError {}
