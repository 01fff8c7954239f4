//! QuadKey type definitions

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Deepest level accepted by [`QuadKey::is_valid`].
///
/// Morton codes for this level still fit in 53 bits, which is what the
/// backend's JSON numbers can carry without rounding.
pub const MAX_LEVEL: u8 = 26;

/// Deepest level a 64-bit Morton code can represent.
pub const MAX_MORTON_LEVEL: u8 = 31;

/// String form of the root key.
pub const ROOT_QUADKEY_STRING: &str = "-";

/// Address of a node in the quad-tree tiling scheme.
///
/// The root tile is level 0, row 0, column 0. Each level doubles the number
/// of rows and columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QuadKey {
    /// Y coordinate (north-south)
    pub row: u32,
    /// X coordinate (east-west)
    pub column: u32,
    /// Level in the tree, 0 at the root
    pub level: u8,
}

impl QuadKey {
    /// The root of the tree.
    pub const ROOT: QuadKey = QuadKey {
        row: 0,
        column: 0,
        level: 0,
    };

    /// Creates a key without range checks.
    #[inline]
    pub const fn new(row: u32, column: u32, level: u8) -> Self {
        Self { row, column, level }
    }

    /// Creates a key, rejecting levels above [`MAX_LEVEL`] and rows or
    /// columns outside `[0, 2^level)`.
    pub fn try_new(row: u32, column: u32, level: u8) -> Result<Self, QuadKeyError> {
        let key = Self::new(row, column, level);
        if key.is_valid() {
            Ok(key)
        } else {
            Err(QuadKeyError::OutOfRange { row, column, level })
        }
    }

    /// Returns true when the level is within `[0, MAX_LEVEL]` and both row
    /// and column are within `[0, 2^level)`.
    #[inline]
    pub fn is_valid(&self) -> bool {
        if self.level > MAX_LEVEL {
            return false;
        }
        let side = 1u32 << self.level;
        self.row < side && self.column < side
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.level == 0
    }

    /// Morton code of this key. See [`super::to_morton`].
    #[inline]
    pub fn morton(&self) -> u64 {
        super::to_morton(self)
    }

    /// The key one level up. The root is its own parent.
    #[inline]
    pub fn parent(&self) -> QuadKey {
        super::compute_parent_key(self, 1)
    }

    /// The child in the given quadrant.
    ///
    /// The quadrant uses the same digit encoding as quadkey strings:
    /// bit 0 selects the column, bit 1 selects the row. Returns `None` for
    /// digits above 3 and when the level cannot grow.
    pub fn child(&self, quadrant: u8) -> Option<QuadKey> {
        if quadrant > 3 {
            return None;
        }
        Some(QuadKey {
            row: (self.row << 1) | u32::from(quadrant >> 1),
            column: (self.column << 1) | u32::from(quadrant & 1),
            level: self.level.checked_add(1)?,
        })
    }

    /// All four children in quadrant order, or `None` when the level cannot
    /// grow.
    pub fn children(&self) -> Option<[QuadKey; 4]> {
        let row = self.row << 1;
        let column = self.column << 1;
        let level = self.level.checked_add(1)?;
        Some([
            QuadKey::new(row, column, level),
            QuadKey::new(row, column | 1, level),
            QuadKey::new(row | 1, column, level),
            QuadKey::new(row | 1, column | 1, level),
        ])
    }

    /// Returns true if `self` is `other` or one of its ancestors.
    pub fn is_ancestor_of(&self, other: &QuadKey) -> bool {
        if self.level > other.level {
            return false;
        }
        super::compute_parent_key(other, other.level - self.level) == *self
    }

    /// Expresses `self` relative to `ancestor`.
    ///
    /// This is the inverse of [`super::add_quadkeys`]: the result `sub`
    /// satisfies `add_quadkeys(ancestor, sub) == self`. Returns `None` when
    /// `ancestor` does not contain `self`.
    pub fn relative_to(&self, ancestor: &QuadKey) -> Option<QuadKey> {
        if !ancestor.is_ancestor_of(self) {
            return None;
        }
        let depth = self.level - ancestor.level;
        let mask = if depth >= 32 {
            u32::MAX
        } else {
            (1u32 << depth) - 1
        };
        Some(QuadKey {
            row: self.row & mask,
            column: self.column & mask,
            level: depth,
        })
    }
}

impl fmt::Display for QuadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&super::to_quadkey_string(self))
    }
}

impl FromStr for QuadKey {
    type Err = QuadKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        super::from_quadkey_string(s)
    }
}

/// Errors produced by the QuadKey codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuadKeyError {
    /// Row, column or level outside the supported range
    #[error(
        "quadkey out of range: row {row}, column {column}, level {level} (level must be <= {max} and row/column < 2^level)",
        max = MAX_LEVEL
    )]
    OutOfRange { row: u32, column: u32, level: u8 },

    /// Quadkey string contains characters other than 0-3, or is too long
    #[error("invalid quadkey string: '{0}' (expected '-' or up to {max} digits 0-3)", max = MAX_LEVEL)]
    InvalidQuadkeyString(String),

    /// Morton code has no level sentinel in an even bit position
    #[error("invalid morton code: {0}")]
    InvalidMortonCode(u64),

    /// Morton code text is not a decimal integer
    #[error("invalid morton code string: '{0}'")]
    InvalidMortonString(String),
}
