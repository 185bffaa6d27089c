//! Bucket aggregation
//!
//! Merges the modules of one bucket into a single intermediate archive.
//! Entries are taken in module declaration order and, inside a module, in
//! path order. Relocation is applied on the way in; path collisions are
//! resolved by the duplicate policy of the original path.

use crate::archive::{read_module, Archive, ArchiveEntry};
use crate::classfile::remap_class;
use crate::classifier::Bucket;
use crate::error::{BuildError, BuildResult};
use crate::module::Module;
use crate::relocation::{has_path_prefix, RelocationRuleSet, SERVICES_DIR};
use agentpack_config::DuplicatePolicy;
use glob::{MatchOptions, Pattern};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

/// Metadata dropped from every bucket
const ALWAYS_DROPPED: &[&str] = &[
    "META-INF/MANIFEST.MF",
    "META-INF/INDEX.LIST",
    "META-INF/*.SF",
    "META-INF/*.DSA",
    "META-INF/*.RSA",
];

const MODULE_INFO: &str = "module-info.class";

fn match_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    }
}

fn compile(pattern: &str) -> BuildResult<Pattern> {
    Pattern::new(pattern).map_err(|e| BuildError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// Path-pattern table deciding how colliding entries are handled.
///
/// Configured overrides are consulted first, so they can tighten or relax
/// any built-in rule. Paths no rule covers fail on collision.
#[derive(Debug, Clone)]
pub struct DuplicateRules {
    builtin: Vec<(Pattern, DuplicatePolicy)>,
    overrides: Vec<(Pattern, DuplicatePolicy)>,
}

impl DuplicateRules {
    /// Built-in drop and merge rules plus configured overrides
    pub fn new(overrides: &BTreeMap<String, DuplicatePolicy>) -> BuildResult<Self> {
        let mut builtin = ALWAYS_DROPPED
            .iter()
            .map(|p| Ok((compile(p)?, DuplicatePolicy::Drop)))
            .collect::<BuildResult<Vec<_>>>()?;
        builtin.push((
            compile(&format!("{}*", SERVICES_DIR))?,
            DuplicatePolicy::Merge,
        ));

        let overrides = overrides
            .iter()
            .map(|(pattern, policy)| Ok((compile(pattern)?, *policy)))
            .collect::<BuildResult<Vec<_>>>()?;

        Ok(Self { builtin, overrides })
    }

    /// Built-in rules only
    pub fn builtin() -> BuildResult<Self> {
        Self::new(&BTreeMap::new())
    }

    /// Policy for a path; `None` means collisions fail
    pub fn policy(&self, path: &str) -> Option<DuplicatePolicy> {
        let options = match_options();
        let find = |rules: &[(Pattern, DuplicatePolicy)]| {
            rules
                .iter()
                .find(|(pattern, _)| pattern.matches_with(path, options))
                .map(|(_, policy)| *policy)
        };

        if let Some(policy) = find(self.overrides.as_slice()) {
            return Some(policy);
        }
        if path == MODULE_INFO || path.ends_with(&format!("/{}", MODULE_INFO)) {
            return Some(DuplicatePolicy::Drop);
        }
        find(self.builtin.as_slice())
    }
}

/// Counters of one aggregation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregationStats {
    pub entries: usize,
    pub relocated: usize,
    pub merged: usize,
    pub dropped: usize,
    /// Bootstrap-visible entries moved between layers
    pub routed: usize,
}

/// Aggregated contents of one bucket
#[derive(Debug, Clone)]
pub struct IntermediateArchive {
    pub bucket: Bucket,
    pub archive: Archive,
    /// Contributing module identifiers, in declaration order
    pub modules: Vec<String>,
    pub stats: AggregationStats,
}

/// A module with its entries read into memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedModule {
    pub id: String,
    pub entries: Vec<ArchiveEntry>,
}

impl LoadedModule {
    /// Read a module's archive and resources
    pub fn load(module: &Module) -> BuildResult<Self> {
        let entries = read_module(module)?;
        debug!("Loaded {} ({} entries)", module.id, entries.len());
        Ok(Self {
            id: module.id.clone(),
            entries,
        })
    }
}

/// Merges modules into intermediate archives
#[derive(Debug, Clone)]
pub struct Aggregator<'a> {
    rules: &'a RelocationRuleSet,
    duplicates: &'a DuplicateRules,
    /// Bootstrap-visible prefixes in slash form
    bootstrap_visible: Vec<String>,
}

impl<'a> Aggregator<'a> {
    pub fn new(
        rules: &'a RelocationRuleSet,
        duplicates: &'a DuplicateRules,
        bootstrap_visible: &'a [String],
    ) -> Self {
        Self {
            rules,
            duplicates,
            bootstrap_visible: bootstrap_visible.iter().map(|p| p.replace('.', "/")).collect(),
        }
    }

    /// Whether an entry of an agent-bound module belongs on the bootstrap class path
    pub fn is_bootstrap_visible(&self, path: &str) -> bool {
        if self.bootstrap_visible.is_empty() || path.starts_with("META-INF/") {
            return false;
        }
        let (name, inner_class) = match path.strip_suffix(".class") {
            Some(class) => (class, true),
            None => match path.rsplit_once('/') {
                Some((dir, _)) => (dir, false),
                None => return false,
            },
        };
        self.bootstrap_visible
            .iter()
            .any(|p| has_path_prefix(name, p, inner_class))
    }

    /// Aggregate one bucket.
    ///
    /// For the bootstrap bucket, `routed_from` holds the agent-bound modules
    /// whose bootstrap-visible entries are appended after the bootstrap
    /// modules' own entries. Agent buckets leave those entries out.
    pub fn aggregate(
        &self,
        bucket: Bucket,
        modules: &[&LoadedModule],
        routed_from: &[&LoadedModule],
    ) -> BuildResult<IntermediateArchive> {
        let mut archive = Archive::new();
        let mut stats = AggregationStats::default();
        let mut contributors: Vec<String> = Vec::new();

        for module in modules {
            contributors.push(module.id.clone());
            for entry in &module.entries {
                if bucket.is_isolated() && self.is_bootstrap_visible(&entry.path) {
                    debug!("{}: routing {} to bootstrap", bucket, entry.path);
                    stats.routed += 1;
                    continue;
                }
                self.add(&mut archive, entry, &mut stats)?;
            }
        }

        if bucket == Bucket::Bootstrap {
            for module in routed_from {
                for entry in module
                    .entries
                    .iter()
                    .filter(|e| self.is_bootstrap_visible(&e.path))
                {
                    self.add(&mut archive, entry, &mut stats)?;
                    stats.routed += 1;
                    if !contributors.contains(&module.id) {
                        contributors.push(module.id.clone());
                    }
                }
            }
        }

        stats.entries = archive.len();
        info!(
            "Aggregated {} from {} modules: {} entries ({} relocated, {} merged, {} dropped)",
            bucket,
            contributors.len(),
            stats.entries,
            stats.relocated,
            stats.merged,
            stats.dropped
        );

        Ok(IntermediateArchive {
            bucket,
            archive,
            modules: contributors,
            stats,
        })
    }

    fn add(
        &self,
        archive: &mut Archive,
        entry: &ArchiveEntry,
        stats: &mut AggregationStats,
    ) -> BuildResult<()> {
        let policy = self.duplicates.policy(&entry.path);
        if policy == Some(DuplicatePolicy::Drop) {
            debug!("Dropping {} from {}", entry.path, entry.origin);
            stats.dropped += 1;
            return Ok(());
        }

        let relocated = self.relocate(entry)?;
        if relocated.path != entry.path || relocated.data != entry.data {
            debug!("Relocated {} -> {}", entry.path, relocated.path);
            stats.relocated += 1;
        }

        let rejected = match archive.push(relocated) {
            Ok(()) => return Ok(()),
            Err(rejected) => rejected,
        };

        let existing = archive
            .get_mut(&rejected.path)
            .ok_or_else(|| BuildError::BuildFailed(format!("lost entry {}", rejected.path)))?;

        if policy == Some(DuplicatePolicy::Merge) {
            debug!(
                "Merging {} from {} into {}",
                rejected.path, rejected.origin, existing.origin
            );
            existing.data = merge_lines(&existing.data, &rejected.data);
            stats.merged += 1;
            Ok(())
        } else {
            Err(BuildError::duplicate(
                rejected.path,
                existing.origin.clone(),
                rejected.origin,
            ))
        }
    }

    fn relocate(&self, entry: &ArchiveEntry) -> BuildResult<ArchiveEntry> {
        let path = self
            .rules
            .relocate_path(&entry.path)?
            .unwrap_or_else(|| entry.path.clone());

        let data = if entry.is_class() {
            remap_class(&entry.path, &entry.data, self.rules)?
        } else if is_service_file(&path) {
            self.rules.relocate_service_lines(&entry.data)?
        } else {
            None
        };

        Ok(ArchiveEntry::new(
            path,
            data.unwrap_or_else(|| entry.data.clone()),
            entry.origin.clone(),
        ))
    }
}

fn is_service_file(path: &str) -> bool {
    path.strip_prefix(SERVICES_DIR)
        .is_some_and(|name| !name.is_empty() && !name.contains('/'))
}

/// Concatenate two text files line-wise, keeping the first occurrence of each line
pub fn merge_lines(first: &[u8], second: &[u8]) -> Vec<u8> {
    let text = [first, second]
        .iter()
        .map(|b| String::from_utf8_lossy(b).into_owned())
        .collect::<Vec<_>>();

    let mut seen = HashSet::new();
    let mut out = String::new();
    for line in text.iter().flat_map(|t| t.lines()) {
        let line = line.trim_end();
        if line.is_empty() || !seen.insert(line.to_string()) {
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relocation::RelocationRule;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn loaded(id: &str, files: &[(&str, &str)]) -> LoadedModule {
        LoadedModule {
            id: id.to_string(),
            entries: files
                .iter()
                .map(|(p, d)| ArchiveEntry::new(*p, d.as_bytes().to_vec(), id))
                .collect(),
        }
    }

    fn text(archive: &Archive, path: &str) -> String {
        String::from_utf8(archive.get(path).unwrap().data.clone()).unwrap()
    }

    #[rstest]
    #[case("META-INF/MANIFEST.MF", Some(DuplicatePolicy::Drop))]
    #[case("META-INF/SIGNER.SF", Some(DuplicatePolicy::Drop))]
    #[case("META-INF/SIGNER.RSA", Some(DuplicatePolicy::Drop))]
    #[case("module-info.class", Some(DuplicatePolicy::Drop))]
    #[case("META-INF/versions/9/module-info.class", Some(DuplicatePolicy::Drop))]
    #[case("META-INF/services/a.Spi", Some(DuplicatePolicy::Merge))]
    #[case("META-INF/services/nested/a.Spi", None)]
    #[case("software/amazon/awssdk/global/handlers/execution.interceptors", None)]
    #[case("pkg/A.class", None)]
    fn test_builtin_policies(#[case] path: &str, #[case] expected: Option<DuplicatePolicy>) {
        assert_eq!(DuplicateRules::builtin().unwrap().policy(path), expected);
    }

    #[test]
    fn test_override_policies() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "software/amazon/awssdk/global/handlers/*".to_string(),
            DuplicatePolicy::Merge,
        );
        overrides.insert("META-INF/LICENSE*".to_string(), DuplicatePolicy::Drop);
        let rules = DuplicateRules::new(&overrides).unwrap();

        assert_eq!(
            rules.policy("software/amazon/awssdk/global/handlers/execution.interceptors"),
            Some(DuplicatePolicy::Merge)
        );
        assert_eq!(
            rules.policy("META-INF/LICENSE.txt"),
            Some(DuplicatePolicy::Drop)
        );
    }

    #[test]
    fn test_overrides_take_precedence_over_builtin() {
        let mut overrides = BTreeMap::new();
        overrides.insert("META-INF/services/*".to_string(), DuplicatePolicy::Fail);
        overrides.insert("META-INF/INDEX.LIST".to_string(), DuplicatePolicy::Merge);
        overrides.insert("module-info.class".to_string(), DuplicatePolicy::Fail);
        let rules = DuplicateRules::new(&overrides).unwrap();

        assert_eq!(
            rules.policy("META-INF/services/a.Spi"),
            Some(DuplicatePolicy::Fail)
        );
        assert_eq!(
            rules.policy("META-INF/INDEX.LIST"),
            Some(DuplicatePolicy::Merge)
        );
        assert_eq!(rules.policy("module-info.class"), Some(DuplicatePolicy::Fail));
        // untouched built-ins still apply
        assert_eq!(
            rules.policy("META-INF/MANIFEST.MF"),
            Some(DuplicatePolicy::Drop)
        );
    }

    #[test]
    fn test_fail_override_on_service_file_aborts() {
        let rules = RelocationRuleSet::default();
        let mut overrides = BTreeMap::new();
        overrides.insert("META-INF/services/*".to_string(), DuplicatePolicy::Fail);
        let duplicates = DuplicateRules::new(&overrides).unwrap();
        let aggregator = Aggregator::new(&rules, &duplicates, &[]);

        let a = loaded("a", &[("META-INF/services/x.Spi", "impl.A\n")]);
        let b = loaded("b", &[("META-INF/services/x.Spi", "impl.B\n")]);
        assert!(matches!(
            aggregator.aggregate(Bucket::FullAgent, &[&a, &b], &[]),
            Err(BuildError::DuplicatePathConflict { .. })
        ));
    }

    #[rstest]
    #[case("agent/bootstrap/Hook.class", true)]
    #[case("agent/bootstrap/Hook$1.class", true)]
    #[case("agent/bootstrap/res/hook.properties", true)]
    #[case("agent/bootstrap.v2/hook.properties", false)]
    #[case("agent/bootstrapper/Other.class", false)]
    #[case("META-INF/services/agent.bootstrap.Spi", false)]
    fn test_bootstrap_visible_matching(#[case] path: &str, #[case] expected: bool) {
        let rules = RelocationRuleSet::default();
        let duplicates = DuplicateRules::builtin().unwrap();
        let visible = vec!["agent.bootstrap".to_string()];
        let aggregator = Aggregator::new(&rules, &duplicates, &visible);
        assert_eq!(aggregator.is_bootstrap_visible(path), expected);
    }

    #[test]
    fn test_service_files_merge_line_sets() {
        let rules = RelocationRuleSet::default();
        let duplicates = DuplicateRules::builtin().unwrap();
        let aggregator = Aggregator::new(&rules, &duplicates, &[]);

        let a = loaded("a", &[("META-INF/services/x.Spi", "impl.A\nimpl.Common\n")]);
        let b = loaded("b", &[("META-INF/services/x.Spi", "impl.Common\nimpl.B\n")]);
        let result = aggregator
            .aggregate(Bucket::FullAgent, &[&a, &b], &[])
            .unwrap();

        assert_eq!(
            text(&result.archive, "META-INF/services/x.Spi"),
            "impl.A\nimpl.Common\nimpl.B\n"
        );
        assert_eq!(result.stats.merged, 1);
    }

    #[test]
    fn test_non_service_collision_fails() {
        let rules = RelocationRuleSet::default();
        let duplicates = DuplicateRules::builtin().unwrap();
        let aggregator = Aggregator::new(&rules, &duplicates, &[]);

        let a = loaded("a", &[("pkg/Same.class", "one")]);
        let b = loaded("b", &[("pkg/Same.class", "two")]);

        match aggregator.aggregate(Bucket::BaseAgent, &[&a, &b], &[]) {
            Err(BuildError::DuplicatePathConflict {
                path,
                first,
                second,
            }) => {
                assert_eq!(path, "pkg/Same.class");
                assert_eq!(first, "a");
                assert_eq!(second, "b");
            }
            other => panic!("Expected DuplicatePathConflict, got {:?}", other),
        }
    }

    #[test]
    fn test_metadata_dropped() {
        let rules = RelocationRuleSet::default();
        let duplicates = DuplicateRules::builtin().unwrap();
        let aggregator = Aggregator::new(&rules, &duplicates, &[]);

        let a = loaded(
            "a",
            &[
                ("META-INF/MANIFEST.MF", "Manifest-Version: 1.0\n"),
                ("META-INF/INDEX.LIST", "x"),
                ("readme.txt", "hi"),
            ],
        );
        let b = loaded("b", &[("META-INF/MANIFEST.MF", "Manifest-Version: 1.0\n")]);
        let result = aggregator
            .aggregate(Bucket::Bootstrap, &[&a, &b], &[])
            .unwrap();

        assert_eq!(result.archive.paths().collect::<Vec<_>>(), vec!["readme.txt"]);
        assert_eq!(result.stats.dropped, 3);
    }

    #[test]
    fn test_service_file_relocated_before_merge() {
        let rules = RelocationRuleSet::new(vec![RelocationRule::new("lib", "shaded.lib")]);
        let duplicates = DuplicateRules::builtin().unwrap();
        let aggregator = Aggregator::new(&rules, &duplicates, &[]);

        let a = loaded("a", &[("META-INF/services/lib.Spi", "lib.Impl\n")]);
        let b = loaded("b", &[("META-INF/services/shaded.lib.Spi", "other.Impl\n")]);
        let result = aggregator
            .aggregate(Bucket::FullAgent, &[&a, &b], &[])
            .unwrap();

        assert_eq!(
            text(&result.archive, "META-INF/services/shaded.lib.Spi"),
            "shaded.lib.Impl\nother.Impl\n"
        );
    }

    #[test]
    fn test_bootstrap_visible_entries_are_routed() {
        let rules = RelocationRuleSet::default();
        let duplicates = DuplicateRules::builtin().unwrap();
        let visible = vec!["agent.bootstrap".to_string()];
        let aggregator = Aggregator::new(&rules, &duplicates, &visible);

        let api = loaded("api", &[("api/Api.class", "api")]);
        let tooling = loaded(
            "tooling",
            &[
                ("agent/bootstrap/Hook.class", "hook"),
                ("agent/tooling/Installer.class", "installer"),
            ],
        );

        let agent = aggregator
            .aggregate(Bucket::BaseAgent, &[&tooling], &[])
            .unwrap();
        assert_eq!(
            agent.archive.paths().collect::<Vec<_>>(),
            vec!["agent/tooling/Installer.class"]
        );
        assert_eq!(agent.stats.routed, 1);

        let bootstrap = aggregator
            .aggregate(Bucket::Bootstrap, &[&api], &[&tooling])
            .unwrap();
        assert_eq!(
            bootstrap.archive.paths().collect::<Vec<_>>(),
            vec!["api/Api.class", "agent/bootstrap/Hook.class"]
        );
        assert_eq!(bootstrap.modules, vec!["api", "tooling"]);
    }

    #[test]
    fn test_merge_lines_skips_blank_and_repeated() {
        let merged = merge_lines(b"a\r\n\nb\n", b"b\nc");
        assert_eq!(merged, b"a\nb\nc\n");
    }
}
