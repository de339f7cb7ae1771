//! Breakpoint bookkeeping for the controller.

use serde::{Deserialize, Serialize};

use crate::path::paths_equal;

/// A line breakpoint supplied by the collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakpoint {
    /// Editor-local file path.
    pub path: String,
    /// Line number (0-based).
    pub line: u32,
    /// Engine-assigned id once `breakpoint_set` was acknowledged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
}

impl Breakpoint {
    /// Create a breakpoint the engine has not seen yet.
    pub fn new(path: impl Into<String>, line: u32) -> Self {
        Self {
            path: path.into(),
            line,
            server_id: None,
        }
    }

    /// Whether this breakpoint sits at `path`:`line`.
    pub fn is_at(&self, path: &str, line: u32) -> bool {
        self.line == line && paths_equal(&self.path, path)
    }
}

/// Ordered set of breakpoints; at most one per file and line.
#[derive(Debug, Clone, Default)]
pub struct BreakpointStore {
    breakpoints: Vec<Breakpoint>,
}

impl BreakpointStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a breakpoint. Returns false if one already exists at that spot.
    pub fn add(&mut self, bp: Breakpoint) -> bool {
        if self.find(&bp.path, bp.line).is_some() {
            return false;
        }
        self.breakpoints.push(bp);
        true
    }

    /// Remove and return the breakpoint at `path`:`line`.
    pub fn remove(&mut self, path: &str, line: u32) -> Option<Breakpoint> {
        let index = self.breakpoints.iter().position(|bp| bp.is_at(path, line))?;
        Some(self.breakpoints.remove(index))
    }

    /// Find the breakpoint at `path`:`line`.
    pub fn find(&self, path: &str, line: u32) -> Option<&Breakpoint> {
        self.breakpoints.iter().find(|bp| bp.is_at(path, line))
    }

    /// Record the engine id for the breakpoint at `path`:`line`.
    pub fn set_server_id(&mut self, path: &str, line: u32, server_id: impl Into<String>) -> bool {
        match self.breakpoints.iter_mut().find(|bp| bp.is_at(path, line)) {
            Some(bp) => {
                bp.server_id = Some(server_id.into());
                true
            }
            None => false,
        }
    }

    /// Forget every engine id, e.g. after the session ended.
    pub fn clear_server_ids(&mut self) {
        for bp in &mut self.breakpoints {
            bp.server_id = None;
        }
    }

    /// All breakpoints in insertion order.
    pub fn all(&self) -> &[Breakpoint] {
        &self.breakpoints
    }

    /// Number of breakpoints.
    pub fn len(&self) -> usize {
        self.breakpoints.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }
}

impl FromIterator<Breakpoint> for BreakpointStore {
    fn from_iter<I: IntoIterator<Item = Breakpoint>>(iter: I) -> Self {
        let mut store = Self::new();
        for bp in iter {
            store.add(bp);
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breakpoint_add_and_find() {
        let mut store = BreakpointStore::new();
        assert!(store.add(Breakpoint::new("/src/a.php", 4)));
        assert_eq!(store.len(), 1);

        let bp = store.find("/src/a.php", 4).unwrap();
        assert_eq!(bp.server_id, None);
        assert!(store.find("/src/a.php", 5).is_none());
    }

    #[test]
    fn breakpoint_duplicate_rejected() {
        let mut store = BreakpointStore::new();
        assert!(store.add(Breakpoint::new("/src/a.php", 4)));
        assert!(!store.add(Breakpoint::new("file:///src/a.php", 4)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn breakpoint_remove_matches_uri_form() {
        let mut store = BreakpointStore::new();
        store.add(Breakpoint::new("/src/a.php", 4));
        store.add(Breakpoint::new("/src/a.php", 9));

        let removed = store.remove("file:///src/a.php", 4).unwrap();
        assert_eq!(removed.line, 4);
        assert_eq!(store.all(), &[Breakpoint::new("/src/a.php", 9)]);
        assert!(store.remove("/src/a.php", 4).is_none());
    }

    #[test]
    fn breakpoint_server_ids() {
        let mut store = BreakpointStore::new();
        store.add(Breakpoint::new("/src/a.php", 1));
        assert!(store.set_server_id("/src/a.php", 1, "1001"));
        assert!(!store.set_server_id("/src/b.php", 1, "1002"));
        assert_eq!(store.all()[0].server_id.as_deref(), Some("1001"));

        store.clear_server_ids();
        assert_eq!(store.all()[0].server_id, None);
    }

    #[test]
    fn breakpoint_store_keeps_insertion_order() {
        let store: BreakpointStore = [
            Breakpoint::new("/b.php", 2),
            Breakpoint::new("/a.php", 1),
            Breakpoint::new("/b.php", 2),
        ]
        .into_iter()
        .collect();
        let lines: Vec<u32> = store.all().iter().map(|bp| bp.line).collect();
        assert_eq!(lines, vec![2, 1]);
        assert!(!store.is_empty());
    }
}
