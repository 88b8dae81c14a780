//! Modular 3D Wave Function Collapse
//!
//! Fills a 3D grid with modules from a catalog so that every pair of touching
//! modules shows matching connector labels on the shared face. Domains shrink
//! through arc-consistency propagation; a minimum-remaining-values heap picks
//! the next cell to collapse and a backtracking search (or a greedy one)
//! drives the grid to a full assignment, retrying with fresh seeds on failure.

pub mod assignment;
pub mod cell;
pub mod constraints;
pub mod error;
pub mod generator;
pub mod geometry;
pub mod grid;
mod heap;
pub mod modules;
pub mod persistence;
pub mod solver;
pub mod wave;

pub use assignment::{check_adjacency, format_assignment, Assignment};
pub use constraints::{BorderConstraint, GenerationConstraint, SetModuleConstraint};
pub use error::{
    AttemptFailure, CatalogError, Contradiction, GenerationError, InconsistentBoundaryConstraint,
    TopologyError,
};
pub use generator::{Generation, Generator, ManualCell, DEFAULT_RETRY_COUNT};
pub use geometry::Direction;
pub use grid::{Coord, Dimensions, Grid, Placement};
pub use modules::{pipes, Catalog, Label, Module, ModuleId, ModuleTemplate};
pub use solver::{Backtracking, Greedy, SearchStrategy, StepBudget, Strategy};
pub use wave::{Decision, DecisionKind, DecisionRecord, Wave};
