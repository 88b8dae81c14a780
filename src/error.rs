//! Error types.
//!
//! Configuration errors ([`CatalogError`], [`TopologyError`]) fail fast before
//! any search starts. [`Contradiction`] and [`AttemptFailure`] are the expected
//! signals that drive backtracking and retries; the only search failure a caller
//! ever sees is [`GenerationError::RetryBudgetExhausted`].

use thiserror::Error;

use crate::geometry::Direction;
use crate::grid::Coord;
use crate::modules::{Label, ModuleId};

/// Problems building a module catalog.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("catalog contains no modules")]
    Empty,
    #[error("module id {0} appears more than once")]
    DuplicateId(ModuleId),
    #[error("module id {0} is not in the catalog")]
    UnknownModule(ModuleId),
    #[error("module '{name}' asks for {rotations} rotations (expected 1..=4)")]
    InvalidRotations { name: String, rotations: u8 },
    #[error("manual cell at {coord:?} lists no modules")]
    EmptySubset { coord: Coord },
    #[error("malformed catalog file: {0}")]
    Parse(String),
}

/// Problems with the grid shape or with coordinates pointing outside it.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TopologyError {
    #[error("grid dimensions must be positive, got {x}x{y}x{z}")]
    InvalidDimensions { x: i32, y: i32, z: i32 },
    #[error("coordinate {coord:?} lies outside the grid")]
    OutOfRange { coord: Coord },
}

/// A propagation step that cannot be satisfied.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum Contradiction {
    /// The cell's possibility set would become empty.
    #[error("cell {coord:?} ran out of possible modules")]
    EmptyDomain { coord: Coord },
    /// A committed module does not fit an already decided neighbour.
    #[error("cell {coord:?} does not fit its decided neighbour towards {direction}")]
    NeighborMismatch { coord: Coord, direction: Direction },
}

/// Why a single generation attempt stopped without a full assignment.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum AttemptFailure {
    #[error(transparent)]
    Contradiction(#[from] Contradiction),
    /// The greedy strategy saw the same cell with the same domain size twice in a row.
    #[error("search revisited cell {coord:?} with {domain_len} candidates")]
    InfiniteLoopDetected { coord: Coord, domain_len: usize },
    #[error("search gave up after {steps} steps")]
    StepBudgetExhausted { steps: u64 },
}

/// Errors returned from [`crate::Generator::generate`] and its builders.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("no consistent assignment found in {attempts} attempts")]
    RetryBudgetExhausted { attempts: usize },
    #[error("invalid topology: {0}")]
    InvalidTopology(#[from] TopologyError),
    #[error("invalid catalog: {0}")]
    InvalidCatalog(#[from] CatalogError),
}

/// A boundary constraint that no module in the catalog can satisfy.
///
/// Reported at declaration time only; it becomes fatal when applying it
/// actually empties a domain.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("no module exposes label {label} towards {direction}")]
pub struct InconsistentBoundaryConstraint {
    pub direction: Direction,
    pub label: Label,
}
