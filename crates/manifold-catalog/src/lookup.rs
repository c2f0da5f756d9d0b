//! Name validation and resolution against a catalog.
//!
//! Lookup order for a requested name:
//! 1. the name itself
//! 2. its alias target
//! 3. the name with each configured prefix stripped (`bmad-analyst` → `analyst`)
//! 4. the alias target of the stripped name
//!
//! The first candidate with at least one match decides the result. A leading
//! `*` asks for a workflow; a bare name prefers the agent when one module
//! holds several kinds of that name. Matches in several modules are returned
//! as [`Resolution::Ambiguous`]; ranking is the caller's job.

use std::sync::LazyLock;

use manifold_core::{CatalogEntry, CatalogError, EntryKind, Result};
use manifold_settings::LookupSettings;
use regex::Regex;
use similar::TextDiff;
use tracing::debug;

use crate::aggregator::Catalog;

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").unwrap());

/// Shortest accepted name.
pub const MIN_NAME_LEN: usize = 2;

/// Longest accepted name.
pub const MAX_NAME_LEN: usize = 50;

/// Characters with shell meaning.
const DANGEROUS_CHARS: [char; 11] = [';', '&', '|', '$', '`', '<', '>', '(', ')', '\n', '\r'];

/// Outcome of a successful lookup.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    /// Exactly one entry matched.
    Unique(CatalogEntry),
    /// Several modules provide the name; in key order, unranked.
    Ambiguous(Vec<CatalogEntry>),
}

/// A validated request: optional module qualifier, bare name and kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NameQuery {
    /// Module from a `module/name` request.
    pub module: Option<String>,
    /// Bare name.
    pub name: String,
    /// Kind implied by the request (`*name` selects a workflow).
    pub kind: Option<EntryKind>,
}

/// Resolves requested names using lookup settings.
#[derive(Clone, Debug, Default)]
pub struct NameResolver {
    settings: LookupSettings,
}

impl NameResolver {
    /// Resolver with `settings`.
    pub fn new(settings: LookupSettings) -> Self {
        Self { settings }
    }

    /// Lookup settings.
    pub fn settings(&self) -> &LookupSettings {
        &self.settings
    }

    /// Validate `raw` and split off a module qualifier.
    ///
    /// `*name` selects a workflow; `**name` and a lone `*` are rejected. An
    /// empty request falls back to the configured default agent.
    pub fn parse(&self, raw: &str) -> Result<NameQuery> {
        let mut requested = raw.trim();
        let mut kind = None;
        if let Some(rest) = requested.strip_prefix('*') {
            if rest.starts_with('*') {
                let bare = rest.trim_start_matches('*');
                return Err(invalid(raw, &format!("use a single '*' to select a workflow ('*{bare}')")));
            }
            if rest.is_empty() {
                return Err(invalid(raw, "workflow name missing after '*'"));
            }
            requested = rest;
            kind = Some(EntryKind::Workflow);
        } else if requested.is_empty() {
            requested = match self.settings.default_agent.as_deref() {
                Some(default) => default,
                None => return Err(invalid(raw, "name is empty and no default agent is configured")),
            };
        }

        let (module, name) = match requested.split_once('/') {
            Some((module, name)) => {
                validate_name(module)?;
                (Some(module.to_string()), name)
            }
            None => (None, requested),
        };
        validate_name(name)?;
        Ok(NameQuery {
            module,
            name: name.to_string(),
            kind,
        })
    }

    /// Resolve `raw` in `catalog`.
    ///
    /// An explicit `module` takes precedence over a `module/name` qualifier,
    /// and an explicit `kind` over one implied by `*`.
    pub fn resolve(
        &self,
        catalog: &Catalog,
        raw: &str,
        module: Option<&str>,
        kind: Option<EntryKind>,
    ) -> Result<Resolution> {
        let query = self.parse(raw)?;
        let module = module.or(query.module.as_deref());
        let kind = kind.or(query.kind);

        for candidate in self.candidates(&query.name) {
            let found = catalog.find(&candidate, module, kind);
            if found.is_empty() {
                continue;
            }
            if candidate != query.name {
                debug!(requested = %query.name, resolved = %candidate, "name normalized");
            }
            let mut picked = one_per_module(found);
            return Ok(if picked.len() == 1 {
                Resolution::Unique(picked.remove(0))
            } else {
                Resolution::Ambiguous(picked)
            });
        }

        Err(CatalogError::NotFound {
            name: match module {
                Some(m) => format!("{m}/{}", query.name),
                None => query.name.clone(),
            },
            kind,
            suggestion: self.suggest(catalog, &query.name, kind),
        })
    }

    /// Names to try, in order, without repeats.
    fn candidates(&self, name: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let mut push = |n: &str| {
            if !n.is_empty() && !out.iter().any(|o| o == n) {
                out.push(n.to_string());
            }
        };

        push(name);
        if let Some(target) = self.alias(name) {
            push(target);
        }
        for prefix in &self.settings.strip_prefixes {
            if let Some(stripped) = name.strip_prefix(prefix.as_str()) {
                push(stripped);
                if let Some(target) = self.alias(stripped) {
                    push(target);
                }
            }
        }
        out
    }

    fn alias(&self, name: &str) -> Option<&str> {
        self.settings
            .aliases
            .get(name)
            .or_else(|| self.settings.aliases.get(&name.to_lowercase()))
            .map(String::as_str)
    }

    /// Nearest known name: a case-only difference first, then the best
    /// character-level similarity at or above the threshold.
    pub fn suggest(&self, catalog: &Catalog, name: &str, kind: Option<EntryKind>) -> Option<String> {
        let names = catalog.names(kind);
        if let Some(exact) = names.iter().find(|n| n.eq_ignore_ascii_case(name)) {
            return Some((*exact).to_string());
        }

        let lowered = name.to_lowercase();
        let mut best: Option<(f32, &str)> = None;
        for candidate in names {
            let ratio = TextDiff::from_chars(lowered.as_str(), candidate.to_lowercase().as_str()).ratio();
            if f64::from(ratio) < self.settings.suggestion_threshold {
                continue;
            }
            if best.is_none_or(|(score, _)| ratio > score) {
                best = Some((ratio, candidate));
            }
        }
        best.map(|(_, n)| n.to_string())
    }
}

/// First match of each module. `found` is in key order, so within a module
/// an agent wins over a workflow of the same name.
fn one_per_module(found: Vec<&CatalogEntry>) -> Vec<CatalogEntry> {
    let mut picked: Vec<CatalogEntry> = Vec::with_capacity(found.len());
    for entry in found {
        if !picked.iter().any(|p| p.module == entry.module) {
            picked.push(entry.clone());
        }
    }
    picked
}

/// Check a requested name against the accepted shape.
pub fn validate_name(name: &str) -> Result<()> {
    let len = name.chars().count();
    if !(MIN_NAME_LEN..=MAX_NAME_LEN).contains(&len) {
        return Err(invalid(
            name,
            &format!("length must be {MIN_NAME_LEN}-{MAX_NAME_LEN} characters"),
        ));
    }
    if !name.is_ascii() {
        return Err(invalid(name, "only ASCII characters are allowed"));
    }
    if let Some(c) = name.chars().find(|c| DANGEROUS_CHARS.contains(c)) {
        return Err(invalid(name, &format!("forbidden character {c:?}")));
    }
    if !NAME_RE.is_match(name) {
        return Err(invalid(
            name,
            "must start with a letter or digit and contain only letters, digits, '.', '_' or '-'",
        ));
    }
    Ok(())
}

fn invalid(name: &str, reason: &str) -> CatalogError {
    CatalogError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use manifold_core::{DiscoveryMode, EntryMetadata, SourceKind};
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn entry(module: Option<&str>, name: &str, kind: EntryKind) -> CatalogEntry {
        CatalogEntry {
            name: name.into(),
            module: module.map(String::from),
            kind,
            metadata: EntryMetadata::default(),
            path: PathBuf::from(format!("/src/{name}.md")),
            source_root: PathBuf::from("/src"),
            source_kind: SourceKind::Project,
            priority: 1,
            additional_files: Vec::new(),
            customization: None,
        }
    }

    fn catalog() -> Catalog {
        Catalog::new(
            [
                entry(Some("bmm"), "analyst", EntryKind::Agent),
                entry(Some("bmm"), "dev", EntryKind::Agent),
                entry(Some("core"), "dev", EntryKind::Agent),
                entry(Some("core"), "bmad-master", EntryKind::Agent),
                entry(Some("core"), "party-mode", EntryKind::Workflow),
                entry(Some("bmm"), "dev", EntryKind::Workflow),
            ],
            Vec::new(),
            DiscoveryMode::All,
        )
    }

    fn resolver() -> NameResolver {
        NameResolver::new(LookupSettings {
            default_agent: Some("bmad-master".into()),
            aliases: HashMap::from([("ba".to_string(), "analyst".to_string())]),
            strip_prefixes: vec!["bmad-".into()],
            suggestion_threshold: 0.70,
        })
    }

    #[test]
    fn validate_rejects_bad_names() {
        assert!(validate_name("analyst").is_ok());
        assert!(validate_name("x").is_err());
        assert!(validate_name(&"a".repeat(51)).is_err());
        assert!(validate_name("dev;rm").is_err());
        assert!(validate_name("dev$(x)").is_err());
        assert!(validate_name("анализ").is_err());
        assert!(validate_name("-dev").is_err());
        assert_matches!(
            validate_name("a|b"),
            Err(CatalogError::InvalidName { reason, .. }) if reason.contains("forbidden")
        );
    }

    #[test]
    fn unique_and_ambiguous() {
        let c = catalog();
        let r = resolver();
        assert_matches!(r.resolve(&c, "analyst", None, None), Ok(Resolution::Unique(e)) if e.name == "analyst");
        assert_matches!(
            r.resolve(&c, "dev", None, None),
            Ok(Resolution::Ambiguous(all)) if all.len() == 2
        );
        assert_matches!(
            r.resolve(&c, "dev", Some("core"), None),
            Ok(Resolution::Unique(e)) if e.module.as_deref() == Some("core")
        );
        assert_matches!(
            r.resolve(&c, "bmm/dev", None, None),
            Ok(Resolution::Unique(e)) if e.module.as_deref() == Some("bmm")
        );
    }

    #[test]
    fn aliases_prefixes_and_default() {
        let c = catalog();
        let r = resolver();
        assert_matches!(r.resolve(&c, "ba", None, None), Ok(Resolution::Unique(e)) if e.name == "analyst");
        assert_matches!(r.resolve(&c, "bmad-analyst", None, None), Ok(Resolution::Unique(e)) if e.name == "analyst");
        assert_matches!(r.resolve(&c, "bmad-master", None, None), Ok(Resolution::Unique(e)) if e.name == "bmad-master");
        assert_matches!(r.resolve(&c, "", None, None), Ok(Resolution::Unique(e)) if e.name == "bmad-master");
        assert_matches!(
            NameResolver::default().resolve(&c, "  ", None, None),
            Err(CatalogError::InvalidName { .. })
        );
    }

    #[test]
    fn one_module_with_agent_and_workflow_is_not_ambiguous() {
        let c = catalog();
        let r = resolver();
        assert_matches!(
            r.resolve(&c, "dev", Some("bmm"), None),
            Ok(Resolution::Unique(e)) if e.kind == EntryKind::Agent && e.module.as_deref() == Some("bmm")
        );
        assert_matches!(
            r.resolve(&c, "dev", None, None),
            Ok(Resolution::Ambiguous(all)) if all.iter().all(|e| e.kind == EntryKind::Agent)
        );
        assert_matches!(
            r.resolve(&c, "dev", Some("bmm"), Some(EntryKind::Workflow)),
            Ok(Resolution::Unique(e)) if e.kind == EntryKind::Workflow
        );
    }

    #[test]
    fn asterisk_selects_workflow() {
        let c = catalog();
        let r = resolver();
        assert_eq!(r.parse("*party-mode").unwrap().kind, Some(EntryKind::Workflow));
        assert_eq!(r.parse("party-mode").unwrap().kind, None);
        assert_matches!(
            r.resolve(&c, "*dev", None, None),
            Ok(Resolution::Unique(e)) if e.kind == EntryKind::Workflow && e.module.as_deref() == Some("bmm")
        );
        assert_matches!(
            r.resolve(&c, "*bmm/dev", None, None),
            Ok(Resolution::Unique(e)) if e.kind == EntryKind::Workflow
        );
        assert_matches!(
            r.resolve(&c, "*analyst", None, None),
            Err(CatalogError::NotFound { kind: Some(EntryKind::Workflow), .. })
        );
        assert_matches!(
            r.resolve(&c, "*dev", None, Some(EntryKind::Agent)),
            Ok(Resolution::Ambiguous(all)) if all.len() == 2
        );
    }

    #[test]
    fn malformed_asterisks_are_rejected() {
        let r = resolver();
        assert_matches!(
            r.parse("**party-mode"),
            Err(CatalogError::InvalidName { reason, .. }) if reason.contains("'*party-mode'")
        );
        assert_matches!(
            r.parse("*"),
            Err(CatalogError::InvalidName { reason, .. }) if reason.contains("missing")
        );
    }

    #[test]
    fn kind_narrows() {
        let c = catalog();
        assert_matches!(
            resolver().resolve(&c, "party-mode", None, Some(EntryKind::Agent)),
            Err(CatalogError::NotFound { kind: Some(EntryKind::Agent), .. })
        );
    }

    #[test]
    fn suggestions() {
        let c = catalog();
        let r = resolver();
        let err = r.resolve(&c, "analist", None, Some(EntryKind::Agent)).unwrap_err();
        assert_eq!(err.suggestion(), Some("analyst"));
        assert_eq!(err.to_string(), "agent not found: analist (did you mean 'analyst'?)");

        let err = r.resolve(&c, "Analyst", None, None).unwrap_err();
        assert_eq!(err.suggestion(), Some("analyst"));

        let err = r.resolve(&c, "zzzzzz", None, None).unwrap_err();
        assert_eq!(err.suggestion(), None);
    }
}
