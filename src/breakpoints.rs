use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Breakpoint {
    pub id: u32,
    /// Zero-based.
    pub line: u32,
    pub verified: bool,
}

/// Source breakpoints per file, in the order they were set.
#[derive(Debug)]
pub struct BreakpointStore {
    breakpoints: FxHashMap<PathBuf, Vec<Breakpoint>>,
    next_id: u32,
    data_breakpoints: FxHashSet<String>,
}

impl Default for BreakpointStore {
    fn default() -> Self {
        BreakpointStore {
            breakpoints: FxHashMap::default(),
            next_id: 1,
            data_breakpoints: FxHashSet::default(),
        }
    }
}

impl BreakpointStore {
    pub fn add(&mut self, path: &Path, line: u32) -> Breakpoint {
        let breakpoint = Breakpoint {
            id: self.next_id,
            line,
            verified: false,
        };
        self.next_id += 1;
        self.breakpoints
            .entry(path.to_path_buf())
            .or_default()
            .push(breakpoint.clone());
        breakpoint
    }

    pub fn remove(&mut self, path: &Path, line: u32) -> Option<Breakpoint> {
        let breakpoints = self.breakpoints.get_mut(path)?;
        let index = breakpoints.iter().position(|it| it.line == line)?;
        let breakpoint = breakpoints.remove(index);
        if breakpoints.is_empty() {
            self.breakpoints.remove(path);
        }
        Some(breakpoint)
    }

    /// One `delete` command covering every breakpoint of `path`.
    ///
    /// The range spans from the first to the last id of `path`. If breakpoints
    /// of other files were set in between, `mdd` deletes those too while this
    /// store keeps them.
    pub fn delete_command(&self, path: &Path) -> Option<String> {
        let breakpoints = self.breakpoints.get(path)?;
        let (first, last) = (breakpoints.first()?, breakpoints.last()?);
        Some(if first.id == last.id {
            format!("delete {}", last.id)
        } else {
            format!("delete {}-{}", first.id, last.id)
        })
    }

    pub fn clear(&mut self, path: &Path) -> Vec<Breakpoint> {
        self.breakpoints.remove(path).unwrap_or_default()
    }

    /// Marks every breakpoint of `path` as verified and returns them.
    pub fn verify(&mut self, path: &Path) -> Vec<Breakpoint> {
        let Some(breakpoints) = self.breakpoints.get_mut(path) else {
            return vec![];
        };
        for breakpoint in breakpoints.iter_mut() {
            breakpoint.verified = true;
        }
        breakpoints.clone()
    }

    pub fn get(&self, path: &Path) -> &[Breakpoint] {
        self.breakpoints
            .get(path)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn at(&self, path: &Path, line: u32) -> Option<&Breakpoint> {
        self.get(path).iter().find(|it| it.line == line)
    }

    pub fn set_data_breakpoint(&mut self, address: &str) -> bool {
        if address.is_empty() {
            return false;
        }
        self.data_breakpoints.insert(address.to_string());
        true
    }
    pub fn clear_data_breakpoints(&mut self) {
        self.data_breakpoints.clear();
    }
    pub fn data_breakpoints(&self) -> impl Iterator<Item = &str> {
        self.data_breakpoints.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_then_remove_restores_store() {
        let mut store = BreakpointStore::default();
        let path = Path::new("/project/source/a.mc");
        let breakpoint = store.add(path, 10);
        assert_eq!(store.get(path), &[breakpoint.clone()]);

        assert_eq!(store.remove(path, 10), Some(breakpoint));
        assert!(store.get(path).is_empty());
        assert_eq!(store.delete_command(path), None);
        assert_eq!(store.remove(path, 10), None);
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut store = BreakpointStore::default();
        let path = Path::new("a.mc");
        let first = store.add(path, 1);
        store.remove(path, 1);
        let second = store.add(path, 1);
        let third = store.add(Path::new("b.mc"), 4);
        assert!(first.id < second.id && second.id < third.id);
    }

    #[test]
    fn test_consolidated_delete() {
        let mut store = BreakpointStore::default();
        let path = Path::new("a.mc");
        store.add(path, 3);
        assert_eq!(store.delete_command(path).as_deref(), Some("delete 1"));
        store.add(path, 7);
        store.add(path, 9);
        assert_eq!(store.delete_command(path).as_deref(), Some("delete 1-3"));
        assert_eq!(store.clear(path).len(), 3);
        assert!(store.get(path).is_empty());
    }

    #[test]
    fn test_delete_range_spans_interleaved_files() {
        let mut store = BreakpointStore::default();
        let (a, b) = (Path::new("a.mc"), Path::new("b.mc"));
        store.add(a, 3);
        store.add(b, 5);
        store.add(a, 8);
        assert_eq!(store.delete_command(a).as_deref(), Some("delete 1-3"));
        assert_eq!(store.clear(a).len(), 2);
        assert_eq!(store.get(b).len(), 1);
    }

    #[test]
    fn test_verify() {
        let mut store = BreakpointStore::default();
        let path = Path::new("a.mc");
        store.add(path, 3);
        assert!(!store.at(path, 3).unwrap().verified);
        assert_eq!(store.verify(path).len(), 1);
        assert!(store.at(path, 3).unwrap().verified);
        assert!(store.verify(Path::new("b.mc")).is_empty());
    }

    #[test]
    fn test_data_breakpoints() {
        let mut store = BreakpointStore::default();
        assert!(!store.set_data_breakpoint(""));
        assert!(store.set_data_breakpoint("0x12"));
        assert_eq!(store.data_breakpoints().count(), 1);
        store.clear_data_breakpoints();
        assert_eq!(store.data_breakpoints().count(), 0);
    }
}
