//! Package relocation rules
//!
//! Rules rename a package prefix to a shaded prefix. Matching is
//! segment-aware: `a.b` matches `a.b`, `a.b.C` and `a.b$Inner` but never
//! `a.bc`. Internal names and resource paths are matched in slash form on
//! `/` boundaries. A small allow-list of packages is never relocated and is
//! checked before any rule.

use crate::error::{BuildError, BuildResult};
use agentpack_config::defaults::PASS_THROUGH_PACKAGES;
use agentpack_config::RelocationConfig;

/// Service-registration directory
pub const SERVICES_DIR: &str = "META-INF/services/";

/// Whether `name` starts with `prefix` on a name-segment boundary
pub(crate) fn has_prefix(name: &str, prefix: &str) -> bool {
    name.starts_with(prefix)
        && matches!(
            name.as_bytes().get(prefix.len()),
            None | Some(b'.') | Some(b'$') | Some(b'/')
        )
}

/// Whether a slash-separated `path` starts with `prefix` on a `/` boundary.
///
/// Dots inside path segments are ordinary characters here, so
/// `pkg/sub.v2` does not start with `pkg/sub`.
pub(crate) fn has_path_prefix(path: &str, prefix: &str, inner_class: bool) -> bool {
    path.starts_with(prefix)
        && match path.as_bytes().get(prefix.len()) {
            None | Some(b'/') => true,
            Some(b'$') => inner_class,
            Some(_) => false,
        }
}

/// Slash form of a dotted package name
fn slashed(name: &str) -> String {
    name.replace('.', "/")
}

/// A single package rename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocationRule {
    source: String,
    target: String,
    exclude: Vec<String>,
    source_path: String,
    target_path: String,
    exclude_paths: Vec<String>,
}

impl RelocationRule {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            source_path: slashed(&source),
            target_path: slashed(&target),
            source,
            target,
            exclude: Vec::new(),
            exclude_paths: Vec::new(),
        }
    }

    pub fn with_exclude(mut self, exclude: Vec<String>) -> Self {
        self.exclude_paths = exclude.iter().map(|e| slashed(e)).collect();
        self.exclude = exclude;
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Whether the rule applies to a dotted name once exclusions are taken out
    pub fn matches(&self, name: &str) -> bool {
        has_prefix(name, &self.source) && !self.exclude.iter().any(|e| has_prefix(name, e))
    }

    /// Whether the rule applies to a slash-separated name
    fn matches_path(&self, path: &str, inner_class: bool) -> bool {
        has_path_prefix(path, &self.source_path, inner_class)
            && !self
                .exclude_paths
                .iter()
                .any(|e| has_path_prefix(path, e, inner_class))
    }

    /// Rename a dotted name the rule matches
    fn apply(&self, name: &str) -> String {
        format!("{}{}", self.target, &name[self.source.len()..])
    }

    /// Rename a slash-separated name the rule matches, keeping the tail as is
    fn apply_path(&self, path: &str) -> String {
        format!("{}{}", self.target_path, &path[self.source_path.len()..])
    }

    /// Short description used in error messages
    pub fn label(&self) -> String {
        format!("{} -> {}", self.source, self.target)
    }
}

impl From<&RelocationConfig> for RelocationRule {
    fn from(config: &RelocationConfig) -> Self {
        Self::new(config.from.clone(), config.to.clone()).with_exclude(config.exclude.clone())
    }
}

/// Ordered relocation table plus the pass-through allow-list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocationRuleSet {
    rules: Vec<RelocationRule>,
    pass_through: Vec<String>,
    pass_through_paths: Vec<String>,
}

impl Default for RelocationRuleSet {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl RelocationRuleSet {
    /// Build a rule set; the pass-through packages are always in force
    pub fn new(rules: Vec<RelocationRule>) -> Self {
        Self {
            rules,
            pass_through: PASS_THROUGH_PACKAGES.iter().map(|p| p.to_string()).collect(),
            pass_through_paths: PASS_THROUGH_PACKAGES.iter().map(|p| slashed(p)).collect(),
        }
    }

    /// Build a rule set from configured rules, validating each
    pub fn from_config(rules: &[RelocationConfig]) -> BuildResult<Self> {
        let mut table = Vec::with_capacity(rules.len());
        for rule in rules {
            rule.validate()?;
            table.push(RelocationRule::from(rule));
        }
        Ok(Self::new(table))
    }

    /// The built-in relocation table
    pub fn with_defaults() -> Self {
        let defaults = agentpack_config::defaults::relocations();
        Self::new(defaults.iter().map(RelocationRule::from).collect())
    }

    pub fn rules(&self) -> &[RelocationRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether a dotted name sits in a package that is never relocated
    pub fn is_pass_through(&self, name: &str) -> bool {
        self.pass_through.iter().any(|p| has_prefix(name, p))
    }

    /// The single rule matching `name`, or an ambiguity error naming all of them
    fn select<'r>(
        &'r self,
        name: &str,
        matches: impl Fn(&RelocationRule) -> bool,
    ) -> BuildResult<Option<&'r RelocationRule>> {
        let mut matching = self.rules.iter().filter(|rule| matches(*rule));
        let Some(first) = matching.next() else {
            return Ok(None);
        };

        let others: Vec<&RelocationRule> = matching.collect();
        if !others.is_empty() {
            return Err(BuildError::RelocationAmbiguity {
                class: name.to_string(),
                rules: std::iter::once(first)
                    .chain(others)
                    .map(RelocationRule::label)
                    .collect(),
            });
        }

        Ok(Some(first))
    }

    /// Relocate a dotted class or package name.
    ///
    /// Returns `None` when no rule applies.
    pub fn relocate_class_name(&self, name: &str) -> BuildResult<Option<String>> {
        if self.is_pass_through(name) {
            return Ok(None);
        }
        Ok(self
            .select(name, |rule| rule.matches(name))?
            .map(|rule| rule.apply(name)))
    }

    /// Relocate a slash-separated internal name (`a/b/C`)
    pub fn relocate_internal_name(&self, name: &str) -> BuildResult<Option<String>> {
        self.relocate_slashed(name, true)
    }

    /// Relocate a resource path by its directory.
    ///
    /// Only whole `/` segments are compared, the rest of the path is kept
    /// byte for byte.
    pub fn relocate_resource_path(&self, path: &str) -> BuildResult<Option<String>> {
        let Some((dir, file)) = path.rsplit_once('/') else {
            return Ok(None);
        };
        Ok(self
            .relocate_slashed(dir, false)?
            .map(|relocated| format!("{}/{}", relocated, file)))
    }

    fn relocate_slashed(&self, path: &str, inner_class: bool) -> BuildResult<Option<String>> {
        if self
            .pass_through_paths
            .iter()
            .any(|p| has_path_prefix(path, p, inner_class))
        {
            return Ok(None);
        }
        Ok(self
            .select(path, |rule| rule.matches_path(path, inner_class))?
            .map(|rule| rule.apply_path(path)))
    }

    /// Relocate an archive entry path.
    ///
    /// Class files are relocated by class name, service files by the
    /// service interface in their file name, everything else by directory.
    pub fn relocate_path(&self, path: &str) -> BuildResult<Option<String>> {
        if let Some(service) = path.strip_prefix(SERVICES_DIR) {
            if service.contains('/') {
                return Ok(None);
            }
            return Ok(self
                .relocate_class_name(service)?
                .map(|relocated| format!("{}{}", SERVICES_DIR, relocated)));
        }

        if let Some(internal) = path.strip_suffix(".class") {
            return Ok(self
                .relocate_internal_name(internal)?
                .map(|relocated| format!("{}.class", relocated)));
        }

        self.relocate_resource_path(path)
    }

    /// Relocate the provider lines of a service-registration file.
    ///
    /// Comments and blank lines are kept as they are. Returns `None` when
    /// nothing changed.
    pub fn relocate_service_lines(&self, content: &[u8]) -> BuildResult<Option<Vec<u8>>> {
        let Ok(text) = std::str::from_utf8(content) else {
            return Ok(None);
        };

        let mut changed = false;
        let mut out = String::with_capacity(text.len());
        for line in text.split_inclusive('\n') {
            let body = line.trim_end_matches(['\n', '\r']);
            let ending = &line[body.len()..];
            let provider = body.split('#').next().unwrap_or("").trim();

            match self.relocate_class_name(provider)? {
                Some(relocated) if !provider.is_empty() => {
                    changed = true;
                    out.push_str(&body.replacen(provider, &relocated, 1));
                }
                _ => out.push_str(body),
            }
            out.push_str(ending);
        }

        Ok(changed.then(|| out.into_bytes()))
    }
}
