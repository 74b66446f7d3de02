//! Minimal RPM spec header parsing for the native export tool.
//!
//! Only the preamble is read: `Name`, `Version`, `Release` and the first
//! source tag, plus `%define`/`%global` macros used to expand them. Parsing
//! stops at the first section marker.

use std::collections::BTreeMap;

const MAX_EXPANSION_DEPTH: usize = 16;

const SECTIONS: &[&str] = &[
    "%description",
    "%package",
    "%prep",
    "%build",
    "%install",
    "%check",
    "%files",
    "%changelog",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecHeader {
    pub name: String,
    pub version: String,
    pub release: Option<String>,
    pub source0: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpecParseError {
    #[error("spec file has no {0} tag")]
    MissingTag(&'static str),
    #[error("{0} tag expands to an empty value")]
    EmptyTag(&'static str),
}

impl SpecHeader {
    pub fn parse(content: &str) -> Result<Self, SpecParseError> {
        let mut macros: BTreeMap<String, String> = BTreeMap::new();
        let mut tags: BTreeMap<&'static str, String> = BTreeMap::new();

        for raw in content.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let first_word = line.split_whitespace().next().unwrap_or_default();
            if SECTIONS.contains(&first_word) {
                break;
            }
            if first_word == "%define" || first_word == "%global" {
                let mut rest = line[first_word.len()..].trim_start().splitn(2, char::is_whitespace);
                if let (Some(name), Some(value)) = (rest.next(), rest.next()) {
                    macros.insert(name.to_owned(), value.trim().to_owned());
                }
                continue;
            }
            let Some((tag, value)) = line.split_once(':') else {
                continue;
            };
            let key = match tag.trim().to_ascii_lowercase().as_str() {
                "name" => "name",
                "version" => "version",
                "release" => "release",
                "source" | "source0" => "source0",
                _ => continue,
            };
            tags.entry(key).or_insert_with(|| value.trim().to_owned());
        }

        for key in ["name", "version", "release"] {
            if let Some(value) = tags.get(key) {
                macros
                    .entry(key.to_owned())
                    .or_insert_with(|| value.clone());
            }
        }

        let expanded = |key: &'static str| tags.get(key).map(|v| expand(v, &macros, 0));

        let name = expanded("name").ok_or(SpecParseError::MissingTag("Name"))?;
        if name.is_empty() {
            return Err(SpecParseError::EmptyTag("Name"));
        }
        let version = expanded("version").ok_or(SpecParseError::MissingTag("Version"))?;
        if version.is_empty() {
            return Err(SpecParseError::EmptyTag("Version"));
        }
        let release = expanded("release").filter(|r| !r.is_empty());
        let source0 = expanded("source0").filter(|s| !s.is_empty());

        Ok(Self {
            name,
            version,
            release,
            source0,
        })
    }

    /// `<name>-<version>`, the top-level directory inside the source archive.
    pub fn archive_prefix(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    /// `<name>-<version>[-<release>]`, the export subdirectory name.
    pub fn export_dir_name(&self) -> String {
        match &self.release {
            Some(release) => format!("{}-{}-{release}", self.name, self.version),
            None => self.archive_prefix(),
        }
    }

    /// Final path segment of the source tag, if any.
    pub fn source_basename(&self) -> Option<&str> {
        self.source0
            .as_deref()
            .map(|s| s.rsplit('/').next().unwrap_or(s))
            .filter(|s| !s.is_empty())
    }
}

/// Expand `%{name}`, `%name`, `%{?name}`, `%{?name:text}`, `%{!?name:text}`
/// and `%%`. Undefined plain macros are left untouched.
pub fn expand(input: &str, macros: &BTreeMap<String, String>, depth: usize) -> String {
    if depth > MAX_EXPANSION_DEPTH || !input.contains('%') {
        return input.to_owned();
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(tail) = after.strip_prefix('%') {
            out.push('%');
            rest = tail;
            continue;
        }

        if let Some(body) = after.strip_prefix('{') {
            let Some(end) = matching_brace(body) else {
                out.push_str(&rest[pos..]);
                return out;
            };
            out.push_str(&expand_braced(&body[..end], macros, depth));
            rest = &body[end + 1..];
            continue;
        }

        let ident_len = after
            .char_indices()
            .find(|&(i, c)| {
                !(c == '_' || c.is_ascii_alphanumeric()) || (i == 0 && c.is_ascii_digit())
            })
            .map_or(after.len(), |(i, _)| i);
        let ident = &after[..ident_len];
        match macros.get(ident) {
            Some(value) if !ident.is_empty() => out.push_str(&expand(value, macros, depth + 1)),
            _ => {
                out.push('%');
                out.push_str(ident);
            }
        }
        rest = &after[ident_len..];
    }
    out.push_str(rest);
    out
}

fn expand_braced(inner: &str, macros: &BTreeMap<String, String>, depth: usize) -> String {
    let (negated, conditional, name) = if let Some(n) = inner.strip_prefix("!?") {
        (true, true, n)
    } else if let Some(n) = inner.strip_prefix('?') {
        (false, true, n)
    } else {
        (false, false, inner)
    };

    if !conditional {
        return match macros.get(name) {
            Some(value) => expand(value, macros, depth + 1),
            None => format!("%{{{inner}}}"),
        };
    }

    let (name, alternative) = match name.split_once(':') {
        Some((n, alt)) => (n, Some(alt)),
        None => (name, None),
    };
    let defined = macros.get(name);
    match (negated, defined, alternative) {
        (false, Some(_), Some(alt)) | (true, None, Some(alt)) => expand(alt, macros, depth + 1),
        (false, Some(value), None) => expand(value, macros, depth + 1),
        _ => String::new(),
    }
}

/// Byte offset of the `}` closing a `%{` whose body starts at `s`.
fn matching_brace(s: &str) -> Option<usize> {
    let mut level = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '{' => level += 1,
            '}' if level == 0 => return Some(i),
            '}' => level -= 1,
            _ => {}
        }
    }
    None
}
