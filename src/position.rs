//! Word positions and the packed wire format used by the fulltext index.
//!
//! The canonical position is an integer. Compound-word components (§4.3) get
//! an auxiliary fractional position: if the parent is `p` and the component
//! is the k-th (1-indexed), the synthetic position is `p + 0.001*k`. Rather
//! than carry that around as a decimal-string-encoded float, it's modeled
//! here as a tagged enum and flattened to the decimal string only when
//! persisting, so the on-disk format is unchanged from a string-keyed
//! reference implementation.

use std::fmt;

/// A position key before packing. `Synthetic` components are always
/// attached to an integer parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Position {
    Integer(i32),
    Synthetic { parent: i32, component: u8 },
}

impl Position {
    /// The integer position ranking/snippet lookups see: the parent for
    /// synthetic positions, itself for integer ones.
    pub fn truncated(&self) -> i32 {
        match self {
            Position::Integer(p) => *p,
            Position::Synthetic { parent, .. } => *parent,
        }
    }

    /// Decimal-string wire form, e.g. `10` or `10.001`.
    pub fn to_wire_key(&self) -> String {
        match self {
            Position::Integer(p) => p.to_string(),
            Position::Synthetic { parent, component } => format!("{}.{:03}", parent, component),
        }
    }

    /// Parse a decimal-string wire key back into a `Position`.
    pub fn from_wire_key(s: &str) -> Option<Position> {
        if let Some((parent, frac)) = s.split_once('.') {
            let parent: i32 = parent.parse().ok()?;
            let component: u8 = frac.parse().ok()?;
            Some(Position::Synthetic { parent, component })
        } else {
            s.parse().ok().map(Position::Integer)
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_wire_key())
    }
}

/// Which field a position belongs to, encoded as a one-character (or none)
/// prefix in the packed fulltext-index string: `t<int>` title, `k<int>`
/// keyword, bare `<int>` content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Title,
    Keyword,
    Content,
}

impl Field {
    fn prefix(self) -> &'static str {
        match self {
            Field::Title => "t",
            Field::Keyword => "k",
            Field::Content => "",
        }
    }
}

/// Pack a field's integer positions into `positions` column format, e.g.
/// title `[1, 2]` -> `"t1,t2"`.
pub fn pack_positions(field: Field, positions: &[i32]) -> String {
    positions
        .iter()
        .map(|p| format!("{}{}", field.prefix(), p))
        .collect::<Vec<_>>()
        .join(",")
}

/// Merge already-packed per-field strings into one row value, e.g.
/// `("t1,t2", "k3", "4,5")` -> `"t1,t2,k3,4,5"`.
pub fn merge_packed(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(",")
}

/// Split a packed `positions` column value into (title, keyword, content)
/// integer position lists. Inverse of [`pack_positions`] composed with
/// [`merge_packed`].
pub fn unpack_positions(packed: &str) -> (Vec<i32>, Vec<i32>, Vec<i32>) {
    let mut title = Vec::new();
    let mut keyword = Vec::new();
    let mut content = Vec::new();

    for token in packed.split(',').filter(|t| !t.is_empty()) {
        if let Some(rest) = token.strip_prefix('t') {
            if let Ok(p) = rest.parse() {
                title.push(p);
            }
        } else if let Some(rest) = token.strip_prefix('k') {
            if let Ok(p) = rest.parse() {
                keyword.push(p);
            }
        } else if let Ok(p) = token.parse() {
            content.push(p);
        }
    }

    (title, keyword, content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_key_roundtrip_integer() {
        let p = Position::Integer(42);
        assert_eq!(p.to_wire_key(), "42");
        assert_eq!(Position::from_wire_key("42"), Some(p));
    }

    #[test]
    fn wire_key_roundtrip_synthetic() {
        let p = Position::Synthetic {
            parent: 10,
            component: 2,
        };
        assert_eq!(p.to_wire_key(), "10.002");
        assert_eq!(Position::from_wire_key("10.002"), Some(p));
    }

    #[test]
    fn truncated_collapses_synthetic_to_parent() {
        let p = Position::Synthetic {
            parent: 10,
            component: 1,
        };
        assert_eq!(p.truncated(), 10);
    }

    #[test]
    fn pack_and_unpack_roundtrip_non_overlapping_sets() {
        let title = pack_positions(Field::Title, &[1, 5]);
        let keyword = pack_positions(Field::Keyword, &[9]);
        let content = pack_positions(Field::Content, &[20, 21, 22]);
        let merged = merge_packed(&[&title, &keyword, &content]);

        let (t, k, c) = unpack_positions(&merged);
        assert_eq!(t, vec![1, 5]);
        assert_eq!(k, vec![9]);
        assert_eq!(c, vec![20, 21, 22]);
    }

    #[test]
    fn unpack_handles_missing_fields() {
        let (t, k, c) = unpack_positions("");
        assert!(t.is_empty() && k.is_empty() && c.is_empty());
    }
}
