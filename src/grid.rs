//! Grid topology: a flat arena of cells with fixed six-neighbour wiring.
//!
//! Cells are addressed by a linear index in x-major order
//! (`idx = (x * DY + y) * DZ + z`). Each cell stores the indices of its six
//! neighbours in [`Direction::ALL`] order, `None` at the grid boundary, so the
//! cyclic neighbour graph never owns anything.

use crate::error::TopologyError;
use crate::geometry::Direction;

/// A 3D grid coordinate.
pub type Coord = (i32, i32, i32);

/// Cell counts along each axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Dimensions {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Dimensions {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn validate(self) -> Result<Self, TopologyError> {
        self.cell_count()
            .map(|_| self)
            .ok_or(TopologyError::InvalidDimensions {
                x: self.x,
                y: self.y,
                z: self.z,
            })
    }

    /// Total number of cells. `None` unless every extent is positive and the
    /// product fits in `usize`.
    pub fn cell_count(self) -> Option<usize> {
        if self.x <= 0 || self.y <= 0 || self.z <= 0 {
            return None;
        }
        (self.x as usize)
            .checked_mul(self.y as usize)?
            .checked_mul(self.z as usize)
    }

    #[inline]
    pub fn contains(self, (x, y, z): Coord) -> bool {
        (0..self.x).contains(&x) && (0..self.y).contains(&y) && (0..self.z).contains(&z)
    }

    /// Converts (x, y, z) coordinates to a linear cell index.
    #[inline(always)]
    pub fn coord_to_idx(self, (x, y, z): Coord) -> usize {
        ((x as usize) * self.y as usize + y as usize) * self.z as usize + z as usize
    }

    /// Converts a linear cell index to (x, y, z) coordinates.
    #[inline(always)]
    pub fn idx_to_coord(self, cell_index: usize) -> Coord {
        let dy = self.y as usize;
        let dz = self.z as usize;
        (
            (cell_index / (dy * dz)) as i32,
            ((cell_index / dz) % dy) as i32,
            (cell_index % dz) as i32,
        )
    }

    /// Index of the cell one step from `cell_index` towards `direction`.
    pub fn step(self, cell_index: usize, direction: Direction) -> Option<usize> {
        let (x, y, z) = self.idx_to_coord(cell_index);
        let (dx, dy, dz) = direction.offset();
        let next = (x + dx, y + dy, z + dz);
        self.contains(next).then(|| self.coord_to_idx(next))
    }
}

/// World-space placement of the grid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    /// Size of one cell along each axis.
    pub cell_size: [f32; 3],
    /// Centre of the grid's floor.
    pub origin: [f32; 3],
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            cell_size: [1.0; 3],
            origin: [0.0; 3],
        }
    }
}

/// The neighbour-wired cell arena.
#[derive(Clone, Debug)]
pub struct Grid {
    dimensions: Dimensions,
    placement: Placement,
    neighbors: Vec<[Option<usize>; 6]>,
}

impl Grid {
    /// Builds the grid and wires every cell to its (up to) six neighbours.
    pub fn new(dimensions: Dimensions, placement: Placement) -> Result<Self, TopologyError> {
        let cell_count = dimensions.validate()?.cell_count().unwrap_or_default();

        let neighbors = (0..cell_count)
            .map(|cell_index| Direction::ALL.map(|dir| dimensions.step(cell_index, dir)))
            .collect();

        Ok(Self {
            dimensions,
            placement,
            neighbors,
        })
    }

    /// A grid of unit cells centred on the origin.
    pub fn with_unit_cells(dimensions: Dimensions) -> Result<Self, TopologyError> {
        Self::new(dimensions, Placement::default())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }

    /// Linear index of `coord`, or an error if it lies outside the grid.
    pub fn index_of(&self, coord: Coord) -> Result<usize, TopologyError> {
        if self.dimensions.contains(coord) {
            Ok(self.dimensions.coord_to_idx(coord))
        } else {
            Err(TopologyError::OutOfRange { coord })
        }
    }

    #[inline(always)]
    pub fn coord_of(&self, cell_index: usize) -> Coord {
        self.dimensions.idx_to_coord(cell_index)
    }

    #[inline(always)]
    pub fn neighbor(&self, cell_index: usize, direction: Direction) -> Option<usize> {
        self.neighbors[cell_index][direction.index()]
    }

    pub fn neighbors(&self, cell_index: usize) -> &[Option<usize>; 6] {
        &self.neighbors[cell_index]
    }

    /// Cells lying on the grid face that points towards `direction`,
    /// i.e. the cells with no neighbour in that direction.
    pub fn boundary(&self, direction: Direction) -> impl Iterator<Item = usize> + '_ {
        (0..self.len()).filter(move |&cell_index| self.neighbor(cell_index, direction).is_none())
    }

    /// Centre of a cell in world space.
    ///
    /// The grid is centred on the origin in X and Z and sits on it in Y.
    pub fn world_position(&self, cell_index: usize) -> [f32; 3] {
        let (x, y, z) = self.coord_of(cell_index);
        let [sx, sy, sz] = self.placement.cell_size;
        let [ox, oy, oz] = self.placement.origin;
        let dims = self.dimensions;

        let corner_x = ox - dims.x as f32 * sx / 2.0 + sx / 2.0;
        let corner_z = oz - dims.z as f32 * sz / 2.0 + sz / 2.0;
        [
            corner_x + x as f32 * sx,
            oy + y as f32 * sy,
            corner_z + z as f32 * sz,
        ]
    }
}
