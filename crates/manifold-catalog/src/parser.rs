//! Descriptive metadata extraction.
//!
//! Reads only `name`, `title`/`displayName`, `description`, `capabilities`
//! and `priority` from:
//! - Markdown YAML frontmatter delimited by `---`
//! - top-level keys of YAML workflow files
//! - the attributes of an `<agent ...>` tag in XML-flavoured agent files
//! - a sibling `<stem>.meta.json` descriptor
//!
//! Content is never validated or interpreted beyond these fields. The YAML
//! reader is a small subset parser (key-value pairs, quoted strings, inline
//! and dash-list arrays); anything else is ignored.

use std::sync::LazyLock;

use manifold_core::EntryMetadata;
use regex::Regex;
use serde::Deserialize;

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").unwrap());

static AGENT_TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<agent\b([^>]*)>").unwrap());

static ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([A-Za-z][A-Za-z0-9_-]*)\s*=\s*"([^"]*)""#).unwrap());

/// Metadata read from one header or descriptor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedHeader {
    /// Declared identifier, only when it is usable as an entry name.
    pub name: Option<String>,
    /// Descriptive fields.
    pub metadata: EntryMetadata,
}

impl ParsedHeader {
    /// Fill unset fields from `other`.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self {
            name: self.name.or(other.name),
            metadata: self.metadata.or(other.metadata),
        }
    }
}

/// Parse the header of an entry file according to its extension.
pub fn parse_entry_header(content: &str, extension: &str) -> ParsedHeader {
    match extension {
        "yaml" | "yml" => parse_simple_yaml(content, true),
        "md" | "txt" => match extract_frontmatter(content) {
            Some(yaml) => parse_simple_yaml(yaml, false),
            None => parse_agent_tag(content),
        },
        "xml" => parse_agent_tag(content),
        _ => ParsedHeader::default(),
    }
}

/// Parse a `<stem>.meta.json` descriptor.
pub fn parse_sidecar(content: &str) -> Result<ParsedHeader, serde_json::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Capabilities {
        List(Vec<String>),
        Joined(String),
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Sidecar {
        name: Option<String>,
        #[serde(alias = "displayName")]
        title: Option<String>,
        description: Option<String>,
        capabilities: Option<Capabilities>,
        priority: Option<f64>,
    }

    let raw: Sidecar = serde_json::from_str(content)?;
    let capabilities = match raw.capabilities {
        Some(Capabilities::List(items)) => items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Capabilities::Joined(joined)) => split_capabilities(&joined),
        None => Vec::new(),
    };

    let mut header = ParsedHeader {
        name: None,
        metadata: EntryMetadata {
            title: raw.title.filter(|s| !s.trim().is_empty()),
            description: raw.description.filter(|s| !s.trim().is_empty()),
            capabilities,
            priority: raw.priority.map(clamp_priority),
        },
    };
    apply_name(&mut header, raw.name.as_deref());
    Ok(header)
}

/// Extract the YAML between leading `---` fences.
pub fn extract_frontmatter(content: &str) -> Option<&str> {
    let trimmed = content.trim_start_matches('\u{feff}').trim_start();
    let after_first = trimmed.strip_prefix("---")?;
    let after_first = after_first
        .strip_prefix("\r\n")
        .or_else(|| after_first.strip_prefix('\n'))?;
    let end = after_first.find("\n---")?;
    Some(&after_first[..end])
}

/// Split a `;`- or `,`-separated capability list.
pub fn split_capabilities(joined: &str) -> Vec<String> {
    joined
        .split([';', ','])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Parse a declared priority, clamped to 0–100.
pub fn parse_priority(value: &str) -> Option<u8> {
    unquote(value).parse::<f64>().ok().map(clamp_priority)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clamp_priority(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

/// Parse the YAML subset. With `top_level_only`, indented lines are skipped
/// so nested keys of a workflow file cannot shadow top-level ones.
fn parse_simple_yaml(yaml: &str, top_level_only: bool) -> ParsedHeader {
    let mut header = ParsedHeader::default();
    let mut declared_name = None;
    let lines: Vec<&str> = yaml.lines().collect();
    let mut i = 0;

    while i < lines.len() {
        let raw = lines[i];
        i += 1;

        if top_level_only && raw.starts_with([' ', '\t']) {
            continue;
        }
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line == "---" {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = strip_comment(value.trim());
        let meta = &mut header.metadata;

        match key.trim() {
            "name" | "id" if declared_name.is_none() => declared_name = non_empty(value),
            "title" | "displayName" | "display_name" => {
                if meta.title.is_none() {
                    meta.title = non_empty(value);
                }
            }
            "description" => {
                if meta.description.is_none() {
                    meta.description = non_empty(value);
                }
            }
            "capabilities" => meta.capabilities = parse_array_value(value, &lines, &mut i),
            "priority" => meta.priority = parse_priority(value),
            _ => {}
        }
    }

    apply_name(&mut header, declared_name.as_deref());
    header
}

/// Attributes of the first `<agent ...>` tag.
fn parse_agent_tag(content: &str) -> ParsedHeader {
    let mut header = ParsedHeader::default();
    let Some(caps) = AGENT_TAG_RE.captures(content) else {
        return header;
    };
    let mut persona = None;
    for attr in ATTR_RE.captures_iter(&caps[1]) {
        let value = attr[2].trim();
        match &attr[1] {
            "title" => header.metadata.title = non_empty(value),
            "name" => persona = non_empty(value),
            "description" => header.metadata.description = non_empty(value),
            "capabilities" => header.metadata.capabilities = split_capabilities(value),
            "priority" => header.metadata.priority = parse_priority(value),
            _ => {}
        }
    }
    // The tag's `name` is a persona name, not an identifier.
    if header.metadata.title.is_none() {
        header.metadata.title = persona;
    }
    header
}

/// A declared name that is a usable identifier becomes the entry name;
/// anything else (e.g. `Mary`, `My Agent`) is kept as a title fallback.
fn apply_name(header: &mut ParsedHeader, declared: Option<&str>) {
    let Some(name) = declared.map(str::trim).filter(|s| !s.is_empty()) else {
        return;
    };
    if NAME_RE.is_match(name) {
        header.name = Some(name.to_string());
    } else if header.metadata.title.is_none() {
        header.metadata.title = Some(name.to_string());
    }
}

/// Parse an array value, either inline `[a, b]` or multi-line `- item`.
fn parse_array_value(value: &str, lines: &[&str], i: &mut usize) -> Vec<String> {
    if value.starts_with('[') {
        return parse_inline_array(value);
    }
    if !value.is_empty() {
        return split_capabilities(&unquote(value));
    }

    let mut items = Vec::new();
    while *i < lines.len() {
        let trimmed = lines[*i].trim();
        let Some(item) = trimmed.strip_prefix('-') else {
            break;
        };
        let item = unquote(item.trim());
        if !item.is_empty() {
            items.push(item);
        }
        *i += 1;
    }
    items
}

fn parse_inline_array(value: &str) -> Vec<String> {
    let inner = value.trim_start_matches('[').trim_end_matches(']').trim();
    if inner.is_empty() {
        return Vec::new();
    }
    inner
        .split(',')
        .map(|s| unquote(s.trim()))
        .filter(|s| !s.is_empty())
        .collect()
}

fn strip_comment(value: &str) -> &str {
    if value.starts_with(['"', '\'']) {
        return value;
    }
    value.split_once(" #").map_or(value, |(v, _)| v.trim_end())
}

fn non_empty(value: &str) -> Option<String> {
    let v = unquote(value);
    (!v.is_empty() && v != "|" && v != ">").then_some(v)
}

/// Remove surrounding quotes from a string value.
fn unquote(s: &str) -> String {
    let trimmed = s.trim();
    if trimmed.len() >= 2
        && ((trimmed.starts_with('"') && trimmed.ends_with('"'))
            || (trimmed.starts_with('\'') && trimmed.ends_with('\'')))
    {
        trimmed[1..trimmed.len() - 1].to_string()
    } else {
        trimmed.to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
