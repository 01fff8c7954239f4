//! QuadKey codec
//!
//! Converts between the structured (row, column, level) address of a
//! quad-tree node, its single-integer Morton code and its base-4 quadkey
//! string, and provides the parent/sub-key arithmetic used by the index
//! resolver.
//!
//! # Morton codes
//!
//! A Morton code interleaves the bits of row and column (column bit first)
//! and prefixes a level sentinel `4^level`:
//!
//! ```text
//! code = 4^level | interleave(row, column)
//! ```
//!
//! Codes grow strictly with level, and codes on one level are ordered by the
//! interleaved (row, column) value. The root encodes as `1`.

mod types;

pub use types::{QuadKey, QuadKeyError, MAX_LEVEL, MAX_MORTON_LEVEL, ROOT_QUADKEY_STRING};

/// Spreads the 32 bits of `value` into the even bit positions of a `u64`.
#[inline]
fn spread_bits(value: u32) -> u64 {
    let mut x = u64::from(value);
    x = (x | (x << 16)) & 0x0000_FFFF_0000_FFFF;
    x = (x | (x << 8)) & 0x00FF_00FF_00FF_00FF;
    x = (x | (x << 4)) & 0x0F0F_0F0F_0F0F_0F0F;
    x = (x | (x << 2)) & 0x3333_3333_3333_3333;
    x = (x | (x << 1)) & 0x5555_5555_5555_5555;
    x
}

/// Gathers the even bit positions of `value` back into a `u32`.
#[inline]
fn compact_bits(value: u64) -> u32 {
    let mut x = value & 0x5555_5555_5555_5555;
    x = (x | (x >> 1)) & 0x3333_3333_3333_3333;
    x = (x | (x >> 2)) & 0x0F0F_0F0F_0F0F_0F0F;
    x = (x | (x >> 4)) & 0x00FF_00FF_00FF_00FF;
    x = (x | (x >> 8)) & 0x0000_FFFF_0000_FFFF;
    x = (x | (x >> 16)) & 0x0000_0000_FFFF_FFFF;
    x as u32
}

/// Encodes a key as its Morton code.
///
/// The key is expected to satisfy [`QuadKey::is_valid`]. Levels above
/// [`MAX_MORTON_LEVEL`] lose the sentinel and rows/columns wider than the
/// level bleed into it; neither case is reported.
#[inline]
pub fn to_morton(key: &QuadKey) -> u64 {
    let sentinel = 1u64.checked_shl(2 * u32::from(key.level)).unwrap_or(0);
    sentinel | (spread_bits(key.row) << 1) | spread_bits(key.column)
}

/// Decodes a Morton code.
///
/// The level is the position of the highest set bit divided by two. A code
/// of zero, or one whose highest set bit sits at an odd position, carries no
/// sentinel and is rejected.
pub fn from_morton(code: u64) -> Result<QuadKey, QuadKeyError> {
    if code == 0 {
        return Err(QuadKeyError::InvalidMortonCode(code));
    }
    let msb = 63 - code.leading_zeros();
    if msb % 2 != 0 {
        return Err(QuadKeyError::InvalidMortonCode(code));
    }
    let bits = code ^ (1u64 << msb);
    Ok(QuadKey {
        row: compact_bits(bits >> 1),
        column: compact_bits(bits),
        level: (msb / 2) as u8,
    })
}

/// Decodes a Morton code given as decimal text, as the backend reports
/// sub-quad keys and partition ids.
pub fn from_morton_str(code: &str) -> Result<QuadKey, QuadKeyError> {
    let value = code
        .trim()
        .parse::<u64>()
        .map_err(|_| QuadKeyError::InvalidMortonString(code.to_string()))?;
    from_morton(value)
}

/// Parses a base-4 quadkey string.
///
/// Digits run from the root-adjacent level down to the key's own level.
/// In each digit bit 0 is the column bit and bit 1 is the row bit. The
/// string `"-"` is the root.
pub fn from_quadkey_string(s: &str) -> Result<QuadKey, QuadKeyError> {
    if s == ROOT_QUADKEY_STRING {
        return Ok(QuadKey::ROOT);
    }
    if s.is_empty() || s.len() > usize::from(MAX_LEVEL) {
        return Err(QuadKeyError::InvalidQuadkeyString(s.to_string()));
    }

    let mut row = 0u32;
    let mut column = 0u32;
    for c in s.chars() {
        let digit = match c {
            '0'..='3' => c as u32 - '0' as u32,
            _ => return Err(QuadKeyError::InvalidQuadkeyString(s.to_string())),
        };
        row = (row << 1) | (digit >> 1);
        column = (column << 1) | (digit & 1);
    }

    Ok(QuadKey {
        row,
        column,
        level: s.len() as u8,
    })
}

/// Formats a key as a base-4 quadkey string, `"-"` for the root.
pub fn to_quadkey_string(key: &QuadKey) -> String {
    if key.level == 0 {
        return ROOT_QUADKEY_STRING.to_string();
    }

    let mut out = String::with_capacity(usize::from(key.level));
    for shift in (0..u32::from(key.level)).rev() {
        let row_bit = key.row.checked_shr(shift).unwrap_or(0) & 1;
        let column_bit = key.column.checked_shr(shift).unwrap_or(0) & 1;
        let digit = (row_bit << 1) | column_bit;
        out.push(char::from(b'0' + digit as u8));
    }
    out
}

/// Composes a root key with a key expressed relative to it.
///
/// Used to turn the fragment-relative sub-keys reported by the backend into
/// absolute tile addresses. Inputs whose sum exceeds the supported range
/// produce a key that fails [`is_valid`].
#[inline]
pub fn add_quadkeys(root: &QuadKey, sub: &QuadKey) -> QuadKey {
    let shift = u32::from(sub.level);
    QuadKey {
        row: root.row.checked_shl(shift).unwrap_or(0).wrapping_add(sub.row),
        column: root.column.checked_shl(shift).unwrap_or(0).wrapping_add(sub.column),
        level: root.level.saturating_add(sub.level),
    }
}

/// Returns the ancestor `delta` levels above `key`.
///
/// Asking for an ancestor above the root yields the root.
#[inline]
pub fn compute_parent_key(key: &QuadKey, delta: u8) -> QuadKey {
    if delta >= key.level {
        return QuadKey::ROOT;
    }
    QuadKey {
        row: key.row >> delta,
        column: key.column >> delta,
        level: key.level - delta,
    }
}

/// Returns true for keys with a supported level and in-range row/column.
#[inline]
pub fn is_valid(key: &QuadKey) -> bool {
    key.is_valid()
}
