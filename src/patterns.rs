//! Package pattern matching for class classification.
//!
//! A `PackagePatterns` answers "is this internal class name inside one of the
//! configured packages (or exactly one of the configured names)". The configured
//! rules never change after construction; names that matched through a prefix
//! are remembered in a separate cache so the next query for the same name skips
//! the prefix scan.

use std::collections::HashSet;

/// Immutable rule set derived from configured dotted names.
#[derive(Debug, Clone, Default)]
pub struct PackageRules {
    names: HashSet<String>,
    prefixes: Vec<String>,
}

impl PackageRules {
    pub fn new<I, S>(dotted_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names = HashSet::new();
        let mut prefixes = Vec::new();
        for name in dotted_names {
            let internal = name.as_ref().replace('.', "/");
            let prefix = format!("{internal}/");
            if !prefixes.contains(&prefix) {
                prefixes.push(prefix);
            }
            names.insert(internal);
        }
        Self { names, prefixes }
    }

    pub fn is_exact(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn matches_prefix(&self, name: &str) -> bool {
        self.prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }

    /// Side-effect free match against the configured rules only.
    pub fn matches(&self, name: &str) -> bool {
        self.is_exact(name) || self.matches_prefix(name)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct PatternStats {
    pub queries: u64,
    pub exact_hits: u64,
    pub prefix_hits: u64,
    pub misses: u64,
}

#[derive(Debug, Clone, Default)]
pub struct PackagePatterns {
    rules: PackageRules,
    learned: HashSet<String>,
    stats: PatternStats,
}

impl PackagePatterns {
    pub fn new<I, S>(dotted_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            rules: PackageRules::new(dotted_names),
            learned: HashSet::new(),
            stats: PatternStats::default(),
        }
    }

    /// Tests `name` against the rules, remembering names that matched by prefix.
    ///
    /// Misses are not cached: only positive matches ever grow the cache.
    pub fn matches(&mut self, name: &str) -> bool {
        self.stats.queries += 1;

        if self.rules.is_exact(name) || self.learned.contains(name) {
            self.stats.exact_hits += 1;
            return true;
        }

        if self.rules.matches_prefix(name) {
            self.learned.insert(name.to_string());
            self.stats.prefix_hits += 1;
            return true;
        }

        self.stats.misses += 1;
        false
    }

    pub fn rules(&self) -> &PackageRules {
        &self.rules
    }

    pub fn is_cached(&self, name: &str) -> bool {
        self.learned.contains(name)
    }

    pub fn cached_len(&self) -> usize {
        self.learned.len()
    }

    pub fn stats(&self) -> PatternStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_exact_name_and_children_but_not_siblings() {
        let mut patterns = PackagePatterns::new(["a.b"]);

        assert!(patterns.matches("a/b"));
        assert!(patterns.matches("a/b/C"));
        assert!(patterns.matches("a/b/c/D"));
        assert!(!patterns.matches("a/bc"));
        assert!(!patterns.matches("a/bc/D"));
        assert!(!patterns.matches("a"));
    }

    #[test]
    fn prefix_match_is_cached_and_stays_true() {
        let mut patterns = PackagePatterns::new(["a.b"]);

        assert!(!patterns.is_cached("a/b/C"));
        assert!(patterns.matches("a/b/C"));
        assert!(patterns.is_cached("a/b/C"));

        assert!(patterns.matches("a/b/C"));
        let stats = patterns.stats();
        assert_eq!(stats.queries, 2);
        assert_eq!(stats.prefix_hits, 1);
        assert_eq!(stats.exact_hits, 1);
    }

    #[test]
    fn misses_are_not_cached() {
        let mut patterns = PackagePatterns::new(["a.b"]);

        assert!(!patterns.matches("x/Y"));
        assert!(!patterns.matches("x/Y"));
        assert_eq!(patterns.cached_len(), 0);
        assert_eq!(patterns.stats().misses, 2);
    }

    #[test]
    fn configured_exact_names_are_not_copied_into_the_cache() {
        let mut patterns = PackagePatterns::new(["com.acme.Main"]);

        assert!(patterns.matches("com/acme/Main"));
        assert_eq!(patterns.cached_len(), 0);
        assert!(!patterns.matches("com/acme/Other"));
    }

    #[test]
    fn root_package_class_only_matches_exactly() {
        let mut patterns = PackagePatterns::new(["Main"]);

        assert!(patterns.matches("Main"));
        assert!(!patterns.matches("MainHelper"));
        assert!(patterns.matches("Main/Inner"));
    }

    #[test]
    fn empty_rules_match_nothing() {
        let mut patterns = PackagePatterns::new(Vec::<String>::new());

        assert!(patterns.rules().is_empty());
        assert!(!patterns.matches("a/B"));
        assert!(!patterns.matches(""));
    }

    #[test]
    fn rules_match_is_pure() {
        let patterns = PackagePatterns::new(["org.example", "com.other"]);

        assert!(patterns.rules().matches("com/other/X"));
        assert!(patterns.rules().matches("org/example"));
        assert!(!patterns.rules().matches("org/examples/X"));
        assert_eq!(patterns.cached_len(), 0);
        assert_eq!(patterns.stats(), PatternStats::default());
        assert_eq!(patterns.rules().prefixes().len(), 2);
    }
}
