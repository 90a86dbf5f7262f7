//! The import maps loaded for one project.

use crate::import_map::{is_html_document, ImportMap};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Import maps keyed by their source document.
///
/// HTML documents apply to files under their own directory. Standalone JSON
/// import maps apply project-wide and are consulted after every HTML map.
#[derive(Debug, Default)]
pub struct ImportMapSet {
    documents: BTreeMap<PathBuf, ImportMap>,
}

impl ImportMapSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the map for `path`. Returns `true` if the mappings changed.
    pub fn insert(&mut self, path: PathBuf, map: ImportMap) -> bool {
        match self.documents.get(&path) {
            Some(previous) if previous.is_same(&map) => false,
            // A blank map replacing nothing changes nothing
            None if map.is_blank() => {
                self.documents.insert(path, map);
                false
            }
            _ => {
                self.documents.insert(path, map);
                true
            }
        }
    }

    /// Forget the map for `path`. Returns `true` if it had any entries.
    pub fn remove(&mut self, path: &Path) -> bool {
        self.documents
            .remove(path)
            .is_some_and(|map| !map.is_blank())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Maps to consult for a file, in order.
    ///
    /// With a local `containing` file: HTML maps whose directory contains it,
    /// deepest first, then project-wide maps. For remote files (`None`) every
    /// map is returned in the same HTML-then-project order.
    #[must_use]
    pub fn in_scope(&self, containing: Option<&Path>) -> Vec<&ImportMap> {
        let mut scoped: Vec<(usize, &ImportMap)> = Vec::new();
        let mut project_wide: Vec<&ImportMap> = Vec::new();

        for (path, map) in &self.documents {
            if map.is_blank() {
                continue;
            }
            if !is_html_document(path) {
                project_wide.push(map);
                continue;
            }
            let Some(dir) = path.parent() else { continue };
            match containing {
                Some(file) if !file.starts_with(dir) => {}
                _ => scoped.push((dir.components().count(), map)),
            }
        }

        scoped.sort_by(|a, b| b.0.cmp(&a.0));
        scoped
            .into_iter()
            .map(|(_, map)| map)
            .chain(project_wide)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn map(path: &str, specifier: &str, target: &str) -> ImportMap {
        ImportMap::blank(Url::from_file_path(path).unwrap())
            .with_import(specifier, target)
            .with_source_id(path)
    }

    #[test]
    fn test_insert_reports_changes() {
        let mut set = ImportMapSet::new();
        let path = PathBuf::from("/p/index.html");
        assert!(set.insert(path.clone(), map("/p/index.html", "react", "https://esm.sh/react@18")));
        assert!(!set.insert(path.clone(), map("/p/index.html", "react", "https://esm.sh/react@18")));
        assert!(set.insert(path.clone(), map("/p/index.html", "react", "https://esm.sh/react@17")));
        assert!(set.remove(&path));
        assert!(!set.remove(&path));
        assert!(set.is_empty());
    }

    #[test]
    fn test_blank_document_is_not_a_change() {
        let mut set = ImportMapSet::new();
        let blank = ImportMap::blank(Url::from_file_path("/p/index.html").unwrap());
        assert!(!set.insert(PathBuf::from("/p/index.html"), blank));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_in_scope_order() {
        let mut set = ImportMapSet::new();
        set.insert(PathBuf::from("/p/importmap.json"), map("/p/importmap.json", "a", "https://x/json"));
        set.insert(PathBuf::from("/p/index.html"), map("/p/index.html", "a", "https://x/root"));
        set.insert(PathBuf::from("/p/admin/index.html"), map("/p/admin/index.html", "a", "https://x/admin"));
        set.insert(PathBuf::from("/p/blog/index.html"), map("/p/blog/index.html", "a", "https://x/blog"));

        let ids: Vec<_> = set
            .in_scope(Some(Path::new("/p/admin/src/main.ts")))
            .iter()
            .filter_map(|m| m.source_id())
            .collect();
        assert_eq!(ids, ["/p/admin/index.html", "/p/index.html", "/p/importmap.json"]);

        assert_eq!(set.in_scope(None).len(), 4);
        assert_eq!(set.in_scope(Some(Path::new("/elsewhere/a.ts"))).len(), 1);
    }
}
