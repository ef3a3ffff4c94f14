//! Breadcrumb paths for addressing nodes within a model tree
//!
//! Provides [`Breadcrumb`] for naming a node's structural location, used by
//! diagnostics and validation reports.

use std::fmt::{self, Display, Formatter};

/// Index part of a path segment
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SegmentIndex {
    /// Member of a keyed collection or a map entry
    Key(String),

    /// Position within an unkeyed sequence
    Position(usize),
}

impl Display for SegmentIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => write!(f, "[{key}]"),
            Self::Position(pos) => write!(f, "[{pos}]"),
        }
    }
}

/// One step from a container into one of its fields
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Segment {
    /// Field name in the container
    pub field: String,

    /// Element index when the field is a collection or map
    pub index: Option<SegmentIndex>,
}

impl Display for Segment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.field)?;
        if let Some(index) = &self.index {
            write!(f, "{index}")?;
        }
        Ok(())
    }
}

/// Structural location of a node within its tree
///
/// The root's path is empty; each child appends one segment.
///
/// # Examples
/// - root → ``
/// - `server.listeners[http]` → `/listeners[http]`
/// - second unkeyed element of `rules` under `policy` → `/policy/rules[1]`
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Breadcrumb(Vec<Segment>);

impl Breadcrumb {
    /// Empty path (root)
    #[inline]
    #[must_use]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Get number of segments
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if path is empty (root)
    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Path of a single-valued field below this one
    #[inline]
    #[must_use]
    pub fn field(&self, field: impl Into<String>) -> Self {
        self.push(Segment {
            field: field.into(),
            index: None,
        })
    }

    /// Path of a keyed member below this one
    #[inline]
    #[must_use]
    pub fn keyed(&self, field: impl Into<String>, key: impl Into<String>) -> Self {
        self.push(Segment {
            field: field.into(),
            index: Some(SegmentIndex::Key(key.into())),
        })
    }

    /// Path of a positional member below this one
    #[inline]
    #[must_use]
    pub fn indexed(&self, field: impl Into<String>, position: usize) -> Self {
        self.push(Segment {
            field: field.into(),
            index: Some(SegmentIndex::Position(position)),
        })
    }

    /// Human readable label, `<root>` for the empty path
    #[must_use]
    pub fn label(&self) -> String {
        if self.is_root() {
            "<root>".to_string()
        } else {
            self.to_string()
        }
    }

    fn push(&self, segment: Segment) -> Self {
        let mut new = self.clone();
        new.0.push(segment);
        new
    }
}

impl Display for Breadcrumb {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for segment in &self.0 {
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}
