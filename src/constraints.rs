//! Declarative restrictions applied around the main search loop.
//!
//! Constraints run in order. A failing constraint is logged and the rest
//! still run; the attempt as a whole is then treated as contradicted.

use tracing::{debug, warn};

use crate::error::{CatalogError, Contradiction, GenerationError, InconsistentBoundaryConstraint};
use crate::geometry::Direction;
use crate::grid::{Coord, Grid};
use crate::modules::{Catalog, Label, ModuleId};
use crate::wave::Wave;

/// A restriction on the wave applied before or after collapse.
pub trait GenerationConstraint {
    /// Short name used in log messages.
    fn name(&self) -> &'static str;

    /// Applies the constraint, returning the first contradiction it ran into.
    fn apply(&self, wave: &mut Wave<'_>) -> Result<(), Contradiction>;

    /// Rejects a constraint that can never apply to this grid and catalog.
    /// Runs once when the constraint is declared.
    fn validate(&self, _grid: &Grid, _catalog: &Catalog) -> Result<(), GenerationError> {
        Ok(())
    }

    /// Declaration-time sanity check against the catalog. Findings are
    /// advisory.
    fn check(&self, _catalog: &Catalog) -> Vec<InconsistentBoundaryConstraint> {
        Vec::new()
    }
}

/// Pins connector labels on the outward faces of the grid.
///
/// For each direction with a label, every cell on the grid face pointing
/// that way may only hold modules showing that label towards it. With
/// `Direction::Down => Some(1)` the floor layer has to expose `1` downwards.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BorderConstraint {
    labels: [Option<Label>; 6],
}

impl BorderConstraint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the constraint from `(direction, label)` pairs; a `None` label
    /// leaves that face open. Later pairs override earlier ones.
    pub fn from_faces(faces: &[(Direction, Option<Label>)]) -> Self {
        let mut constraint = Self::new();
        for &(direction, label) in faces {
            constraint.labels[direction.index()] = label;
        }
        constraint
    }

    /// The same label on all six faces.
    pub fn uniform(label: Label) -> Self {
        Self {
            labels: [Some(label); 6],
        }
    }

    pub fn with_face(mut self, direction: Direction, label: Label) -> Self {
        self.labels[direction.index()] = Some(label);
        self
    }

    pub fn label(&self, direction: Direction) -> Option<Label> {
        self.labels[direction.index()]
    }
}

impl GenerationConstraint for BorderConstraint {
    fn name(&self) -> &'static str {
        "border"
    }

    fn apply(&self, wave: &mut Wave<'_>) -> Result<(), Contradiction> {
        let grid = wave.grid();
        let mut first_failure = None;

        for direction in Direction::ALL {
            let Some(label) = self.label(direction) else {
                continue;
            };
            debug!(%direction, label, "applying border");
            for cell in grid.boundary(direction) {
                if let Err(contradiction) = restrict_face(wave, cell, direction, label) {
                    debug!(
                        %direction,
                        label,
                        coord = ?grid.coord_of(cell),
                        "border constraint could not be resolved: {contradiction}"
                    );
                    first_failure.get_or_insert(contradiction);
                }
            }
        }

        first_failure.map_or(Ok(()), Err)
    }

    fn check(&self, catalog: &Catalog) -> Vec<InconsistentBoundaryConstraint> {
        Direction::ALL
            .into_iter()
            .filter_map(|direction| {
                let label = self.label(direction)?;
                catalog.check_face(direction, label).err()
            })
            .collect()
    }
}

/// Filters `cell` towards the label on `face`. A cell already down to one
/// module is checked instead, since filtering leaves it alone.
fn restrict_face(
    wave: &mut Wave<'_>,
    cell: usize,
    face: Direction,
    label: Label,
) -> Result<(), Contradiction> {
    let Some(module) = wave.cell(cell).domain().first() else {
        return Err(Contradiction::EmptyDomain {
            coord: wave.grid().coord_of(cell),
        });
    };
    if wave.domain_len(cell) > 1 {
        return wave.filter(cell, face, label, true);
    }
    if wave.catalog().module(module).face(face) == label {
        Ok(())
    } else {
        Err(Contradiction::EmptyDomain {
            coord: wave.grid().coord_of(cell),
        })
    }
}

/// Commits one coordinate to one module.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SetModuleConstraint {
    pub coord: Coord,
    pub module: ModuleId,
}

impl SetModuleConstraint {
    pub fn new(coord: Coord, module: ModuleId) -> Self {
        Self { coord, module }
    }
}

impl GenerationConstraint for SetModuleConstraint {
    fn name(&self) -> &'static str {
        "set-module"
    }

    fn validate(&self, grid: &Grid, catalog: &Catalog) -> Result<(), GenerationError> {
        grid.index_of(self.coord)?;
        catalog
            .position(self.module)
            .ok_or(CatalogError::UnknownModule(self.module))?;
        Ok(())
    }

    fn apply(&self, wave: &mut Wave<'_>) -> Result<(), Contradiction> {
        let contradiction = Contradiction::EmptyDomain { coord: self.coord };
        let Ok(cell) = wave.grid().index_of(self.coord) else {
            return Err(contradiction);
        };
        let Some(module) = wave.catalog().position(self.module) else {
            return Err(contradiction);
        };
        wave.commit(cell, module).inspect_err(|e| {
            debug!(coord = ?self.coord, module = %self.module, "could not set module: {e}");
        })
    }
}

/// Runs `constraints` in order; logs every failure and reports the first.
pub(crate) fn apply_all(
    constraints: &[Box<dyn GenerationConstraint>],
    wave: &mut Wave<'_>,
    stage: &str,
) -> Result<(), Contradiction> {
    let mut first_failure = None;
    for constraint in constraints {
        debug!(stage, constraint = constraint.name(), "applying constraint");
        if let Err(contradiction) = constraint.apply(wave) {
            warn!(stage, constraint = constraint.name(), "constraint failed: {contradiction}");
            first_failure.get_or_insert(contradiction);
        }
    }
    first_failure.map_or(Ok(()), Err)
}
