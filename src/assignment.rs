//! Solved assignments: one module id per grid cell.

use crate::geometry::Direction;
use crate::grid::{Coord, Dimensions};
use crate::modules::{Catalog, ModuleId};

/// Dense coordinate to module id mapping, in grid index order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Assignment {
    dimensions: Dimensions,
    modules: Vec<ModuleId>,
}

impl Assignment {
    /// `None` when `modules` does not hold exactly one id per cell.
    pub fn new(dimensions: Dimensions, modules: Vec<ModuleId>) -> Option<Self> {
        let valid = dimensions.cell_count() == Some(modules.len());
        valid.then_some(Self {
            dimensions,
            modules,
        })
    }

    /// Wraps ids already laid out in grid index order.
    pub(crate) fn from_grid_order(dimensions: Dimensions, modules: Vec<ModuleId>) -> Self {
        debug_assert_eq!(Some(modules.len()), dimensions.cell_count());
        Self {
            dimensions,
            modules,
        }
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    pub fn modules(&self) -> &[ModuleId] {
        &self.modules
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn get(&self, coord: Coord) -> Option<ModuleId> {
        self.dimensions
            .contains(coord)
            .then(|| self.modules[self.dimensions.coord_to_idx(coord)])
    }

    pub fn iter(&self) -> impl Iterator<Item = (Coord, ModuleId)> + '_ {
        self.modules
            .iter()
            .enumerate()
            .map(|(idx, &module)| (self.dimensions.idx_to_coord(idx), module))
    }
}

/// Every pair of touching cells whose connectors disagree.
///
/// Each adjacency is visited once, from the cell on the negative side. A cell
/// holding an id the catalog does not know mismatches all its neighbours.
pub fn check_adjacency(catalog: &Catalog, assignment: &Assignment) -> Vec<(Coord, Coord)> {
    let mut violations = Vec::new();

    for (coord, id) in assignment.iter() {
        for direction in Direction::POSITIVE {
            let (dx, dy, dz) = direction.offset();
            let other = (coord.0 + dx, coord.1 + dy, coord.2 + dz);
            let Some(other_id) = assignment.get(other) else {
                continue;
            };
            let fits = match (catalog.by_id(id), catalog.by_id(other_id)) {
                (Some(module), Some(neighbor)) => module.fits(direction, neighbor),
                _ => false,
            };
            if !fits {
                violations.push((coord, other));
            }
        }
    }

    violations
}

/// One character per module id: `0-9`, then `a-z`, then `#`.
fn module_char(id: ModuleId) -> char {
    char::from_digit(id.0, 36).unwrap_or('#')
}

/// Renders the assignment as z-slices side by side, top layer first.
///
/// Each slice shows one character per cell with x growing to the right.
/// Ids are written in base 36, and every id from 36 upwards shows as `#`;
/// use [`Assignment::iter`] to tell those modules apart.
pub fn format_assignment(assignment: &Assignment) -> String {
    let dims = assignment.dimensions();
    let labels: Vec<String> = (0..dims.z).map(|z| format!("z={z}")).collect();
    let width = labels
        .iter()
        .map(String::len)
        .max()
        .unwrap_or(0)
        .max(dims.x as usize);

    let mut output = String::new();
    for (z, label) in labels.iter().enumerate() {
        if z > 0 {
            output.push_str("  ");
        }
        if z + 1 < labels.len() {
            output.push_str(&format!("{label:<width$}"));
        } else {
            output.push_str(label);
        }
    }
    output.push('\n');

    // rows from top (y = DY - 1) to bottom
    for y in (0..dims.y).rev() {
        for z in 0..dims.z {
            if z > 0 {
                output.push_str("  ");
            }
            let row: String = (0..dims.x)
                .filter_map(|x| assignment.get((x, y, z)))
                .map(module_char)
                .collect();
            if z + 1 < dims.z {
                output.push_str(&format!("{row:<width$}"));
            } else {
                output.push_str(&row);
            }
        }
        output.push('\n');
    }

    output
}
