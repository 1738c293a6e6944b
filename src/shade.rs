//! Scan, mark and plan.
//!
//! Class files are parsed in parallel, then fed one by one into a
//! [`ClassGraph`] in input order. The graph is never touched from more than
//! one thread.

use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;

use crate::classfile::{content_hash, read_class_file};
use crate::config::ShadeConfig;
use crate::graph::{
    ClassGraph, ClassId, GraphPatternStats, ResourceDetails, SealedGraph, SourceFile,
};
use crate::input::{EntryKind, InputEntry};
use crate::reachability::mark_reachable;

#[derive(Debug, Clone)]
pub struct ClassOrigin {
    pub entry_name: String,
    pub source: SourceFile,
    pub content_hash: String,
    /// Class file major version, e.g. 52 for Java 8.
    pub class_version: u16,
}

enum Scanned {
    Class {
        class_name: String,
        references: Vec<String>,
        origin: ClassOrigin,
    },
    Manifest(ResourceDetails),
    Resource(ResourceDetails),
}

fn scan_entry(entry: InputEntry) -> Scanned {
    match entry.kind() {
        EntryKind::Manifest => Scanned::Manifest(ResourceDetails::new(entry.name, entry.source)),
        EntryKind::Resource => Scanned::Resource(ResourceDetails::new(entry.name, entry.source)),
        EntryKind::Class => match read_class_file(&entry.bytes) {
            Ok(class) => {
                let expected = entry.name.trim_end_matches(".class");
                if class.class_name != expected {
                    tracing::warn!(
                        entry = %entry.source.describe(),
                        class = %class.class_name,
                        "class file name does not match its declared class"
                    );
                }
                Scanned::Class {
                    class_name: class.class_name,
                    references: class.references,
                    origin: ClassOrigin {
                        content_hash: content_hash(&entry.bytes),
                        class_version: class.major_version,
                        entry_name: entry.name,
                        source: entry.source,
                    },
                }
            }
            Err(err) => {
                tracing::warn!(
                    entry = %entry.source.describe(),
                    error = %err,
                    "unreadable class file, copying it as a resource"
                );
                Scanned::Resource(ResourceDetails::new(entry.name, entry.source))
            }
        },
    }
}

#[derive(Debug)]
pub struct ShadeSession {
    graph: SealedGraph,
    origins: HashMap<ClassId, ClassOrigin>,
    marked: usize,
}

impl ShadeSession {
    pub fn scan(config: &ShadeConfig, entries: Vec<InputEntry>) -> Self {
        let scanned: Vec<Scanned> = entries.into_par_iter().map(scan_entry).collect();
        Self::from_scanned(config.class_graph(), scanned)
    }

    fn from_scanned(mut graph: ClassGraph, scanned: Vec<Scanned>) -> Self {
        let mut origins: HashMap<ClassId, ClassOrigin> = HashMap::new();

        for item in scanned {
            match item {
                Scanned::Class {
                    class_name,
                    references,
                    origin,
                } => {
                    let id = graph.get(&class_name);
                    if let Some(first) = origins.get(&id) {
                        tracing::warn!(
                            class = %class_name,
                            kept = %first.source.describe(),
                            skipped = %origin.source.describe(),
                            "duplicate class, keeping the first one"
                        );
                        continue;
                    }
                    for reference in &references {
                        let dep = graph.get(reference);
                        graph.add_dependency(id, dep);
                    }
                    origins.insert(id, origin);
                }
                Scanned::Manifest(manifest) => graph.set_manifest(manifest),
                Scanned::Resource(resource) => graph.add_resource(resource),
            }
        }

        let mut graph = graph.seal();
        let marked = mark_reachable(&mut graph);

        let stats = graph.pattern_stats();
        tracing::info!(
            classes = graph.len(),
            scanned = origins.len(),
            entry_points = graph.entry_points().count(),
            reachable = marked,
            resources = graph.resources().len(),
            "scanned inputs"
        );
        tracing::debug!(
            keep_queries = stats.keep.queries,
            unshaded_queries = stats.unshaded.queries,
            unshaded_cache_hits = stats.unshaded.exact_hits,
            ignore_queries = stats.ignore.queries,
            "package pattern usage"
        );

        Self {
            graph,
            origins,
            marked,
        }
    }

    pub fn graph(&self) -> &SealedGraph {
        &self.graph
    }

    pub fn origin(&self, id: ClassId) -> Option<&ClassOrigin> {
        self.origins.get(&id)
    }

    pub fn reachable(&self) -> usize {
        self.marked
    }

    pub fn plan(&self) -> ShadePlan {
        let mut retained = Vec::new();
        let mut dropped = Vec::new();
        let mut external = 0usize;

        for (id, details) in self.graph.classes() {
            match (self.origins.get(&id), details.is_visited()) {
                (Some(origin), true) => retained.push(PlannedClass {
                    class_name: details.class_name().to_string(),
                    output_path: details.output_class_filename(),
                    source: origin.source.clone(),
                    content_hash: origin.content_hash.clone(),
                    class_version: origin.class_version,
                }),
                (Some(_), false) => dropped.push(details.class_name().to_string()),
                (None, true) => external += 1,
                (None, false) => {}
            }
        }

        let entry_points: Vec<String> = self
            .graph
            .entry_points()
            .filter_map(|id| self.graph.details(id))
            .map(|d| d.class_name().to_string())
            .collect();

        ShadePlan {
            shadow_package_prefix: self.graph.shadow_package_prefix().to_string(),
            summary: PlanSummary {
                classes_known: self.graph.len(),
                classes_scanned: self.origins.len(),
                entry_points: entry_points.len(),
                retained: retained.len(),
                dropped: dropped.len(),
                external_references: external,
                resources: self.graph.resources().len(),
                has_manifest: self.graph.manifest().is_some(),
            },
            entry_points,
            retained,
            dropped,
            resources: self.graph.resources().to_vec(),
            manifest: self.graph.manifest().cloned(),
            pattern_stats: self.graph.pattern_stats(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedClass {
    pub class_name: String,
    pub output_path: String,
    pub source: SourceFile,
    pub content_hash: String,
    pub class_version: u16,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanSummary {
    pub classes_known: usize,
    pub classes_scanned: usize,
    pub entry_points: usize,
    pub retained: usize,
    pub dropped: usize,
    /// Reachable classes that no input provides, e.g. JDK classes.
    pub external_references: usize,
    pub resources: usize,
    pub has_manifest: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShadePlan {
    pub shadow_package_prefix: String,
    pub summary: PlanSummary,
    pub entry_points: Vec<String>,
    pub retained: Vec<PlannedClass>,
    pub dropped: Vec<String>,
    pub resources: Vec<ResourceDetails>,
    pub manifest: Option<ResourceDetails>,
    pub pattern_stats: GraphPatternStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub class_name: String,
    pub output_class_name: String,
    pub output_class_filename: String,
    pub entry_point: bool,
    pub relocated: bool,
}

/// Accepts `com.acme.Foo`, `com/acme/Foo` or `com/acme/Foo.class`.
pub fn to_internal_name(raw: &str) -> String {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_suffix(".class").unwrap_or(trimmed);
    trimmed.replace('.', "/")
}

pub fn classify_names(config: &ShadeConfig, names: &[String]) -> Vec<Classification> {
    let mut graph = config.class_graph();
    names
        .iter()
        .filter_map(|raw| {
            let id = graph.get(&to_internal_name(raw));
            let entry_point = graph.is_entry_point(id);
            graph.details(id).map(|details| Classification {
                class_name: details.class_name().to_string(),
                output_class_name: details.output_class_name().to_string(),
                output_class_filename: details.output_class_filename(),
                entry_point,
                relocated: details.is_relocated(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::test_support::simple_class;
    use std::path::PathBuf;

    fn class_entry(name: &str, refs: &[&str]) -> InputEntry {
        InputEntry {
            name: format!("{name}.class"),
            bytes: simple_class(name, refs),
            source: SourceFile::JarEntry {
                jar: PathBuf::from("/in/lib.jar"),
                entry: format!("{name}.class"),
            },
        }
    }

    fn file_entry(name: &str, bytes: &[u8]) -> InputEntry {
        InputEntry {
            name: name.to_string(),
            bytes: bytes.to_vec(),
            source: SourceFile::File {
                path: PathBuf::from(format!("/in/dir/{name}")),
            },
        }
    }

    fn config() -> ShadeConfig {
        ShadeConfig {
            keep_packages: ["com.app".to_string()].into(),
            unshaded_packages: ["com.app.api".to_string()].into(),
            ignore_packages: ["com.app.internal".to_string()].into(),
            shadow_package: "shadow".to_string(),
        }
    }

    #[test]
    fn plan_keeps_reachable_classes_and_all_resources() {
        let entries = vec![
            class_entry("com/app/api/Foo", &["org/lib/Used"]),
            class_entry("com/app/internal/Bar", &["org/lib/OnlyFromIgnored"]),
            class_entry("org/lib/Used", &["org/lib/Transitive"]),
            class_entry("org/lib/Transitive", &[]),
            class_entry("org/lib/OnlyFromIgnored", &[]),
            class_entry("org/lib/Unused", &[]),
            file_entry("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\n"),
            file_entry("org/lib/messages.properties", b"a=b"),
        ];

        let session = ShadeSession::scan(&config(), entries);
        let plan = session.plan();

        let retained: Vec<_> = plan
            .retained
            .iter()
            .map(|c| (c.class_name.as_str(), c.output_path.as_str()))
            .collect();
        assert_eq!(
            retained,
            vec![
                ("com/app/api/Foo", "com/app/api/Foo.class"),
                ("org/lib/Used", "shadow/org/lib/Used.class"),
                ("org/lib/Transitive", "shadow/org/lib/Transitive.class"),
            ]
        );

        let mut dropped = plan.dropped.clone();
        dropped.sort();
        assert_eq!(
            dropped,
            vec!["com/app/internal/Bar", "org/lib/OnlyFromIgnored", "org/lib/Unused"]
        );

        assert!(plan.retained.iter().all(|c| c.class_version == 52));
        assert_eq!(plan.entry_points, vec!["com/app/api/Foo"]);
        assert_eq!(plan.summary.external_references, 1);
        assert_eq!(plan.summary.resources, 1);
        assert!(plan.summary.has_manifest);
        assert_eq!(
            plan.manifest.as_ref().map(|m| m.resource_name.as_str()),
            Some("META-INF/MANIFEST.MF")
        );
    }

    #[test]
    fn unreadable_classes_become_resources() {
        let entries = vec![file_entry("com/app/Broken.class", b"not a class")];
        let session = ShadeSession::scan(&config(), entries);

        assert!(session.graph().is_empty());
        assert_eq!(session.graph().resources().len(), 1);
        assert_eq!(
            session.graph().resources()[0].resource_name,
            "com/app/Broken.class"
        );
    }

    #[test]
    fn first_duplicate_class_wins() {
        let mut second = class_entry("com/app/Dup", &["org/lib/FromSecond"]);
        second.source = SourceFile::File {
            path: PathBuf::from("/in/second/com/app/Dup.class"),
        };
        let entries = vec![class_entry("com/app/Dup", &[]), second];

        let session = ShadeSession::scan(&config(), entries);
        let id = session.graph().lookup("com/app/Dup").unwrap();
        let origin = session.origin(id).unwrap();

        assert!(matches!(origin.source, SourceFile::JarEntry { .. }));
        assert!(session.graph().lookup("org/lib/FromSecond").is_none());
    }

    #[test]
    fn classify_accepts_dotted_names() {
        let names = vec![
            "com.app.api.Foo".to_string(),
            "com/app/internal/Bar.class".to_string(),
            "org.other.Baz".to_string(),
        ];
        let result = classify_names(&config(), &names);

        assert_eq!(result[0].class_name, "com/app/api/Foo");
        assert!(result[0].entry_point);
        assert!(!result[0].relocated);

        assert!(!result[1].entry_point);
        assert_eq!(result[1].output_class_name, "shadow/com/app/internal/Bar");
        assert_eq!(
            result[1].output_class_filename,
            "shadow/com/app/internal/Bar.class"
        );

        assert!(!result[2].entry_point);
        assert!(result[2].relocated);
    }
}
