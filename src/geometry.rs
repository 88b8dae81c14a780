//! Axis-aligned directions and quarter-turn rotations about the vertical axis.
//!
//! Direction indices follow the connector order used by every module:
//! +Z, +Y, +X, -Z, -Y, -X. The opposite of direction `d` is `(d + 3) % 6`,
//! which is what every adjacency check routes through.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An integer offset in grid space.
pub type Offset = (i32, i32, i32);

/// One of the six axis-aligned faces of a cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// +Z
    Forward = 0,
    /// +Y
    Up = 1,
    /// +X
    Right = 2,
    /// -Z
    Back = 3,
    /// -Y
    Down = 4,
    /// -X
    Left = 5,
}

impl Direction {
    /// All directions in connector order.
    pub const ALL: [Direction; 6] = [
        Direction::Forward,
        Direction::Up,
        Direction::Right,
        Direction::Back,
        Direction::Down,
        Direction::Left,
    ];

    /// The three positive directions. Visiting only these from every cell
    /// touches each adjacent pair exactly once.
    pub const POSITIVE: [Direction; 3] = [Direction::Forward, Direction::Up, Direction::Right];

    /// Position of this direction in a module's connector array.
    #[inline(always)]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Direction for a connector index, wrapping modulo 6.
    #[inline(always)]
    pub const fn from_index(index: usize) -> Direction {
        Self::ALL[index % 6]
    }

    #[inline(always)]
    pub const fn opposite(self) -> Direction {
        Self::from_index(self.index() + 3)
    }

    /// Unit step in grid space.
    pub const fn offset(self) -> Offset {
        match self {
            Direction::Forward => (0, 0, 1),
            Direction::Up => (0, 1, 0),
            Direction::Right => (1, 0, 0),
            Direction::Back => (0, 0, -1),
            Direction::Down => (0, -1, 0),
            Direction::Left => (-1, 0, 0),
        }
    }

    /// Inverse of [`Direction::offset`].
    pub fn from_offset(offset: Offset) -> Option<Direction> {
        Self::ALL.into_iter().find(|dir| dir.offset() == offset)
    }

    /// Rotates this direction by `quarter_turns` clockwise turns about +Y
    /// (viewed from above). Up and Down are fixed points.
    pub fn rotated(self, quarter_turns: usize) -> Direction {
        let rotate = Y_ROTATIONS[quarter_turns % Y_ROTATIONS.len()];
        // rotations of unit vectors stay unit vectors
        Self::from_offset(rotate(self.offset())).unwrap_or(self)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Up => "up",
            Direction::Right => "right",
            Direction::Back => "back",
            Direction::Down => "down",
            Direction::Left => "left",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forward" | "+z" => Ok(Direction::Forward),
            "up" | "+y" | "ceiling" => Ok(Direction::Up),
            "right" | "+x" => Ok(Direction::Right),
            "back" | "-z" => Ok(Direction::Back),
            "down" | "-y" | "floor" => Ok(Direction::Down),
            "left" | "-x" => Ok(Direction::Left),
            other => Err(format!("unknown direction '{other}'")),
        }
    }
}

/// The four rotations of grid space about the Y axis.
///
/// Index `n` turns +Z towards +X `n` times, so
/// `Y_ROTATIONS[1]((0, 0, 1)) == (1, 0, 0)`.
pub const Y_ROTATIONS: [fn(Offset) -> Offset; 4] = [
    |(x, y, z)| (x, y, z),   // 0 degrees
    |(x, y, z)| (z, y, -x),  // 90 degrees
    |(x, y, z)| (-x, y, -z), // 180 degrees
    |(x, y, z)| (-z, y, x),  // 270 degrees
];

/// Rotates a connector array: the label facing `d` ends up facing
/// `d.rotated(quarter_turns)`.
pub fn rotate_faces<T: Copy>(faces: [T; 6], quarter_turns: usize) -> [T; 6] {
    let mut rotated = faces;
    for dir in Direction::ALL {
        rotated[dir.rotated(quarter_turns).index()] = faces[dir.index()];
    }
    rotated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opposite_is_involution() {
        for dir in Direction::ALL {
            assert_ne!(dir, dir.opposite());
            assert_eq!(dir, dir.opposite().opposite());
            assert_eq!(dir.opposite().index(), (dir.index() + 3) % 6);
        }
    }

    #[test]
    fn test_opposite_offsets_cancel() {
        for dir in Direction::ALL {
            let (ax, ay, az) = dir.offset();
            let (bx, by, bz) = dir.opposite().offset();
            assert_eq!((ax + bx, ay + by, az + bz), (0, 0, 0));
        }
    }

    #[test]
    fn test_quarter_turn_cycles_horizontal_faces() {
        assert_eq!(Direction::Forward.rotated(1), Direction::Right);
        assert_eq!(Direction::Right.rotated(1), Direction::Back);
        assert_eq!(Direction::Back.rotated(1), Direction::Left);
        assert_eq!(Direction::Left.rotated(1), Direction::Forward);
        assert_eq!(Direction::Up.rotated(3), Direction::Up);
        assert_eq!(Direction::Down.rotated(2), Direction::Down);
    }

    #[test]
    fn test_four_turns_are_identity() {
        for dir in Direction::ALL {
            assert_eq!(dir.rotated(4), dir);
            assert_eq!(dir.rotated(1).rotated(3), dir);
        }
    }

    #[test]
    fn test_rotate_faces_moves_labels() {
        // straight piece along Z becomes a straight piece along X
        let straight_z = [1, 0, 0, 1, 0, 0];
        assert_eq!(rotate_faces(straight_z, 1), [0, 0, 1, 0, 0, 1]);

        // corner +Z/+X turns into +X/-Z
        let corner = [1, 0, 1, 0, 0, 0];
        assert_eq!(rotate_faces(corner, 1), [0, 0, 1, 1, 0, 0]);
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!("floor".parse::<Direction>(), Ok(Direction::Down));
        assert_eq!("+X".parse::<Direction>(), Ok(Direction::Right));
        assert_eq!(" back ".parse::<Direction>(), Ok(Direction::Back));
        assert!("sideways".parse::<Direction>().is_err());
    }
}
