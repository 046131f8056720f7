//! Hierarchical actor paths.
//!
//! A path names an actor's position in the supervision tree: the system
//! root's name followed by one segment per ancestor. Paths are immutable;
//! a child path is always derived from its parent's.

use std::fmt;
use std::sync::Arc;

/// The hierarchical name of an actor in the tree.
///
/// Cheap to clone — segments are shared behind an `Arc`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ActorPath {
    segments: Arc<Vec<String>>,
}

impl ActorPath {
    pub(crate) fn root(system_name: &str) -> Self {
        Self {
            segments: Arc::new(vec![system_name.to_string()]),
        }
    }

    /// This path extended by one child segment.
    pub(crate) fn child(&self, name: &str) -> Self {
        let mut segments = (*self.segments).clone();
        segments.push(name.to_string());
        Self {
            segments: Arc::new(segments),
        }
    }

    /// The final segment — the actor's name among its siblings.
    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    /// All segments, root first.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// True for the system root's own path.
    pub fn is_root(&self) -> bool {
        self.segments.len() == 1
    }
}

impl fmt::Display for ActorPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in self.segments.iter() {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ActorPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorPath({self})")
    }
}
