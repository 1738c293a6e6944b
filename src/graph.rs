//! Class relocation graph.
//!
//! `ClassGraph` is the registry every scanned class passes through. The first
//! time a class name is seen it is classified against the keep / unshaded /
//! ignore patterns and its relocated name is fixed; later lookups return the
//! same node. Edges are recorded by the scanner with [`ClassGraph::add_dependency`].
//!
//! Once scanning is done the graph is turned into a [`SealedGraph`], which only
//! allows marking nodes as visited. No edges or nodes can be added after that.

use indexmap::map::Entry;
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use std::path::PathBuf;

use crate::patterns::{PackagePatterns, PatternStats};
use crate::reachability::Reachability;

/// Handle to a node owned by a graph. Equal handles mean the same class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(usize);

#[derive(Debug, Clone)]
pub struct ClassDetails {
    class_name: String,
    output_class_name: String,
    dependencies: IndexSet<ClassId>,
    visited: bool,
}

impl ClassDetails {
    fn new(class_name: String, output_class_name: String) -> Self {
        Self {
            class_name,
            output_class_name,
            dependencies: IndexSet::new(),
            visited: false,
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn output_class_name(&self) -> &str {
        &self.output_class_name
    }

    pub fn output_class_filename(&self) -> String {
        format!("{}.class", self.output_class_name)
    }

    pub fn is_relocated(&self) -> bool {
        self.output_class_name != self.class_name
    }

    pub fn dependencies(&self) -> impl Iterator<Item = ClassId> + '_ {
        self.dependencies.iter().copied()
    }

    pub fn is_visited(&self) -> bool {
        self.visited
    }
}

/// Where a class or resource came from on disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceFile {
    File { path: PathBuf },
    JarEntry { jar: PathBuf, entry: String },
}

impl SourceFile {
    pub fn describe(&self) -> String {
        match self {
            SourceFile::File { path } => path.display().to_string(),
            SourceFile::JarEntry { jar, entry } => format!("{}!/{entry}", jar.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceDetails {
    pub resource_name: String,
    pub source_file: SourceFile,
}

impl ResourceDetails {
    pub fn new(resource_name: impl Into<String>, source_file: SourceFile) -> Self {
        Self {
            resource_name: resource_name.into(),
            source_file,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct GraphPatternStats {
    pub keep: PatternStats,
    pub unshaded: PatternStats,
    pub ignore: PatternStats,
}

#[derive(Debug)]
pub struct ClassGraph {
    keep_packages: PackagePatterns,
    unshaded_packages: PackagePatterns,
    ignore_packages: PackagePatterns,
    shadow_package_prefix: String,
    classes: IndexMap<String, ClassDetails>,
    entry_points: IndexSet<ClassId>,
    resources: Vec<ResourceDetails>,
    manifest: Option<ResourceDetails>,
}

impl ClassGraph {
    pub fn new(
        keep_packages: PackagePatterns,
        unshaded_packages: PackagePatterns,
        ignore_packages: PackagePatterns,
        shadow_package: &str,
    ) -> Self {
        let shadow_package_prefix = if shadow_package.is_empty() {
            String::new()
        } else {
            format!("{}/", shadow_package.replace('.', "/"))
        };

        Self {
            keep_packages,
            unshaded_packages,
            ignore_packages,
            shadow_package_prefix,
            classes: IndexMap::new(),
            entry_points: IndexSet::new(),
            resources: Vec::new(),
            manifest: None,
        }
    }

    /// Returns the node for `class_name`, creating and classifying it on first sight.
    ///
    /// Classification runs exactly once per name: later calls return the same
    /// handle without consulting the patterns again.
    pub fn get(&mut self, class_name: &str) -> ClassId {
        match self.classes.entry(class_name.to_string()) {
            Entry::Occupied(entry) => ClassId(entry.index()),
            Entry::Vacant(entry) => {
                let id = ClassId(entry.index());
                let output_class_name = if self.unshaded_packages.matches(class_name) {
                    class_name.to_string()
                } else {
                    format!("{}{class_name}", self.shadow_package_prefix)
                };
                entry.insert(ClassDetails::new(class_name.to_string(), output_class_name));

                if self.keep_packages.matches(class_name)
                    && !self.ignore_packages.matches(class_name)
                {
                    self.entry_points.insert(id);
                }
                id
            }
        }
    }

    /// Records that `from` references `to`. Repeated edges are stored once.
    pub fn add_dependency(&mut self, from: ClassId, to: ClassId) -> bool {
        match self.classes.get_index_mut(from.0) {
            Some((_, details)) => details.dependencies.insert(to),
            None => false,
        }
    }

    pub fn add_resource(&mut self, resource: ResourceDetails) {
        self.resources.push(resource);
    }

    pub fn set_manifest(&mut self, manifest: ResourceDetails) {
        self.manifest = Some(manifest);
    }

    pub fn lookup(&self, class_name: &str) -> Option<ClassId> {
        self.classes.get_index_of(class_name).map(ClassId)
    }

    pub fn details(&self, id: ClassId) -> Option<&ClassDetails> {
        self.classes.get_index(id.0).map(|(_, d)| d)
    }

    pub fn classes(&self) -> impl Iterator<Item = (ClassId, &ClassDetails)> + '_ {
        self.classes
            .values()
            .enumerate()
            .map(|(idx, d)| (ClassId(idx), d))
    }

    pub fn entry_points(&self) -> impl Iterator<Item = ClassId> + '_ {
        self.entry_points.iter().copied()
    }

    pub fn is_entry_point(&self, id: ClassId) -> bool {
        self.entry_points.contains(&id)
    }

    pub fn resources(&self) -> &[ResourceDetails] {
        &self.resources
    }

    pub fn manifest(&self) -> Option<&ResourceDetails> {
        self.manifest.as_ref()
    }

    pub fn shadow_package_prefix(&self) -> &str {
        &self.shadow_package_prefix
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn unshaded_packages(&self) -> &PackagePatterns {
        &self.unshaded_packages
    }

    pub fn pattern_stats(&self) -> GraphPatternStats {
        GraphPatternStats {
            keep: self.keep_packages.stats(),
            unshaded: self.unshaded_packages.stats(),
            ignore: self.ignore_packages.stats(),
        }
    }

    /// Ends the construction phase.
    pub fn seal(self) -> SealedGraph {
        SealedGraph { inner: self }
    }
}

/// A graph whose nodes and edges are frozen; only `visited` flags change.
#[derive(Debug)]
pub struct SealedGraph {
    inner: ClassGraph,
}

impl SealedGraph {
    pub fn lookup(&self, class_name: &str) -> Option<ClassId> {
        self.inner.lookup(class_name)
    }

    pub fn details(&self, id: ClassId) -> Option<&ClassDetails> {
        self.inner.details(id)
    }

    pub fn classes(&self) -> impl Iterator<Item = (ClassId, &ClassDetails)> + '_ {
        self.inner.classes()
    }

    pub fn visited_classes(&self) -> impl Iterator<Item = (ClassId, &ClassDetails)> + '_ {
        self.inner.classes().filter(|(_, d)| d.visited)
    }

    pub fn entry_points(&self) -> impl Iterator<Item = ClassId> + '_ {
        self.inner.entry_points()
    }

    pub fn is_entry_point(&self, id: ClassId) -> bool {
        self.inner.is_entry_point(id)
    }

    pub fn resources(&self) -> &[ResourceDetails] {
        self.inner.resources()
    }

    pub fn manifest(&self) -> Option<&ResourceDetails> {
        self.inner.manifest()
    }

    pub fn shadow_package_prefix(&self) -> &str {
        self.inner.shadow_package_prefix()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn pattern_stats(&self) -> GraphPatternStats {
        self.inner.pattern_stats()
    }
}

impl Reachability for SealedGraph {
    fn roots(&self) -> impl Iterator<Item = ClassId> + '_ {
        self.inner.entry_points()
    }

    fn neighbors(&self, id: ClassId) -> impl Iterator<Item = ClassId> + '_ {
        self.inner
            .details(id)
            .into_iter()
            .flat_map(|d| d.dependencies())
    }

    fn mark_visited(&mut self, id: ClassId) -> bool {
        match self.inner.classes.get_index_mut(id.0) {
            Some((_, details)) if !details.visited => {
                details.visited = true;
                true
            }
            _ => false,
        }
    }

    fn is_visited(&self, id: ClassId) -> bool {
        self.inner.details(id).is_some_and(|d| d.visited)
    }
}
