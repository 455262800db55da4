//! The import graph.
//!
//! One [`Import`] entry exists per real file path; re-importing returns the
//! existing entry, so cyclic imports are legal. Packages map names to other
//! packages, and `@import("name")` tries the package table before falling
//! back to a path relative to the package's source root.

use std::path::{Path, PathBuf};

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{ast::NodeId, intern::StringId, scope::ScopeId, span::LineOffsets};

/// Handle into the import table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImportId(u32);

impl ImportId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// A fixed id for tests that build AST nodes without a real import.
    pub fn for_tests() -> Self {
        ImportId(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PackageId(u32);

impl PackageId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug)]
pub struct Package {
    pub root_src_dir: PathBuf,
    pub root_src_path: PathBuf,
    pub package_table: IndexMap<StringId, PackageId>,
}

#[derive(Debug)]
pub struct Import {
    pub package: PackageId,
    pub absolute_path: PathBuf,
    pub source: String,
    pub line_offsets: LineOffsets,
    /// Root AST node; set once the file is parsed.
    pub root: Option<NodeId>,
    /// Top-level scope of this import.
    pub scope: Option<ScopeId>,
    /// Set when any `@import` inside this file failed; unresolved-name
    /// errors are suppressed in tainted imports to avoid cascades.
    pub any_imports_failed: bool,
}

impl Import {
    pub fn display_path(&self) -> String {
        self.absolute_path.display().to_string()
    }
}

/// Central registry of packages and imports.
#[derive(Debug, Default)]
pub struct Imports {
    imports: Vec<Import>,
    by_path: AHashMap<PathBuf, ImportId>,
    packages: Vec<Package>,
}

impl Imports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_package(&mut self, root_src_dir: PathBuf, root_src_path: PathBuf) -> PackageId {
        let id = PackageId(u32::try_from(self.packages.len()).expect("package table overflow"));
        self.packages.push(Package {
            root_src_dir,
            root_src_path,
            package_table: IndexMap::new(),
        });
        id
    }

    pub fn package(&self, id: PackageId) -> &Package {
        &self.packages[id.index()]
    }

    pub fn package_mut(&mut self, id: PackageId) -> &mut Package {
        &mut self.packages[id.index()]
    }

    /// Registers a source file, returning the existing entry for an
    /// already-seen absolute path.
    pub fn add_import(
        &mut self,
        package: PackageId,
        absolute_path: PathBuf,
        source: String,
    ) -> (ImportId, bool) {
        if let Some(&id) = self.by_path.get(&absolute_path) {
            return (id, false);
        }
        let id = ImportId(u32::try_from(self.imports.len()).expect("import table overflow"));
        let line_offsets = LineOffsets::new(&source);
        self.imports.push(Import {
            package,
            absolute_path: absolute_path.clone(),
            source,
            line_offsets,
            root: None,
            scope: None,
            any_imports_failed: false,
        });
        self.by_path.insert(absolute_path, id);
        (id, true)
    }

    pub fn lookup_path(&self, path: &Path) -> Option<ImportId> {
        self.by_path.get(path).copied()
    }

    pub fn get(&self, id: ImportId) -> &Import {
        &self.imports[id.index()]
    }

    pub fn get_mut(&mut self, id: ImportId) -> &mut Import {
        &mut self.imports[id.index()]
    }

    pub fn iter_ids(&self) -> impl Iterator<Item = ImportId> {
        (0..self.imports.len()).map(|i| ImportId(i as u32))
    }

    pub fn len(&self) -> usize {
        self.imports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.imports.is_empty()
    }
}
