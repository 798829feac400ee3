//! In-place edits of YAML text
//!
//! Nodes are located with tree-sitter and only their byte ranges are
//! replaced, so comments, quoting and layout of everything else survive a
//! rewrite.

use std::ops::Range;

use serde_yaml::Value;
use thiserror::Error;
use tracing::warn;
use tree_sitter::{Node, Tree};

/// Node kinds a search for a mapping or sequence may descend through
const CONTAINER_KINDS: &[&str] = &["stream", "document", "block_node", "block_sequence_item"];

#[derive(Debug, Error)]
pub enum EditError {
    #[error("Tree-sitter error: {0}")]
    TreeSitter(String),

    #[error("Failed to parse YAML")]
    ParseFailed,

    #[error("No mapping at '{0}'")]
    MissingMapping(String),

    #[error("No item {index} in sequence '{sequence}'")]
    MissingItem { sequence: String, index: usize },
}

/// Byte range to replace and its replacement
type Edit = (Range<usize>, String);

/// YAML source text with structure-aware edits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YamlDocument {
    text: String,
}

impl YamlDocument {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    fn parse(&self) -> Result<Tree, EditError> {
        let mut parser = tree_sitter::Parser::new();
        let language = tree_sitter_yaml::LANGUAGE;
        parser.set_language(&language.into()).map_err(|e| {
            warn!("Failed to set YAML language for tree-sitter: {}", e);
            EditError::TreeSitter(e.to_string())
        })?;
        parser.parse(&self.text, None).ok_or(EditError::ParseFailed)
    }

    /// Parse, let `locate` compute at most one edit, apply it.
    fn apply<F>(&mut self, locate: F) -> Result<bool, EditError>
    where
        F: FnOnce(Node<'_>, &str) -> Result<Option<Edit>, EditError>,
    {
        let tree = self.parse()?;
        match locate(tree.root_node(), &self.text)? {
            Some((range, replacement)) => {
                self.text.replace_range(range, &replacement);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Set `key` to the scalar `value` in the mapping reached through `path`
    /// (an empty path is the document's top-level mapping). A missing key is
    /// appended after the mapping's last entry.
    pub fn set(&mut self, path: &[&str], key: &str, value: &str) -> Result<(), EditError> {
        self.apply(|root, text| {
            let mapping = mapping_at(root, path, text)
                .ok_or_else(|| EditError::MissingMapping(path.join(".")))?;
            Ok(Some(set_edit(mapping, text, key, value)))
        })?;
        Ok(())
    }

    /// Set `key` in the mapping that is item `index` of the top-level
    /// sequence `sequence`
    pub fn set_in_item(
        &mut self,
        sequence: &str,
        index: usize,
        key: &str,
        value: &str,
    ) -> Result<(), EditError> {
        self.apply(|root, text| {
            let mapping = item_mapping(root, sequence, index, text)?;
            Ok(Some(set_edit(mapping, text, key, value)))
        })?;
        Ok(())
    }

    /// Remove `key` and its value from item `index` of `sequence`.
    ///
    /// Returns whether the key was present.
    pub fn remove_from_item(
        &mut self,
        sequence: &str,
        index: usize,
        key: &str,
    ) -> Result<bool, EditError> {
        self.apply(|root, text| {
            let mapping = item_mapping(root, sequence, index, text)?;
            Ok(find_pair(mapping, key, text).map(|pair| remove_pair_edit(mapping, pair, text)))
        })
    }

    /// Remove every item of `sequence` whose `key` is `value`
    pub fn remove_items_where(
        &mut self,
        sequence: &str,
        key: &str,
        value: &str,
    ) -> Result<usize, EditError> {
        let mut removed = 0;
        while self.apply(|root, text| {
            let item = sequence_items(root, sequence, text).into_iter().find(|item| {
                find_kind(*item, "block_mapping")
                    .and_then(|mapping| find_pair(mapping, key, text))
                    .and_then(|pair| pair.child_by_field_name("value"))
                    .is_some_and(|v| unquote(&text[v.byte_range()]) == value)
            });
            Ok(item.map(|item| {
                let range = line_start(text, item.start_byte())..line_end(text, item.end_byte());
                (range, String::new())
            }))
        })? {
            removed += 1;
        }
        Ok(removed)
    }
}

/// First node of `kind` at or below `node`, only descending through containers
fn find_kind<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    if node.kind() == kind {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'t>> = node.named_children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|child| child.kind() == kind || CONTAINER_KINDS.contains(&child.kind()))
        .find_map(|child| find_kind(child, kind))
}

fn pairs<'t>(mapping: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = mapping.walk();
    let pairs: Vec<Node<'t>> = mapping
        .named_children(&mut cursor)
        .filter(|child| child.kind() == "block_mapping_pair")
        .collect();
    pairs
}

fn find_pair<'t>(mapping: Node<'t>, key: &str, text: &str) -> Option<Node<'t>> {
    pairs(mapping).into_iter().find(|pair| {
        pair.child_by_field_name("key")
            .is_some_and(|k| unquote(&text[k.byte_range()]) == key)
    })
}

fn mapping_at<'t>(root: Node<'t>, path: &[&str], text: &str) -> Option<Node<'t>> {
    let mut mapping = find_kind(root, "block_mapping")?;
    for segment in path {
        let value = find_pair(mapping, segment, text)?.child_by_field_name("value")?;
        mapping = find_kind(value, "block_mapping")?;
    }
    Some(mapping)
}

fn sequence_items<'t>(root: Node<'t>, sequence: &str, text: &str) -> Vec<Node<'t>> {
    let Some(seq) = mapping_at(root, &[], text)
        .and_then(|top| find_pair(top, sequence, text))
        .and_then(|pair| pair.child_by_field_name("value"))
        .and_then(|value| find_kind(value, "block_sequence"))
    else {
        return Vec::new();
    };
    let mut cursor = seq.walk();
    let items: Vec<Node<'t>> = seq
        .named_children(&mut cursor)
        .filter(|child| child.kind() == "block_sequence_item")
        .collect();
    items
}

fn item_mapping<'t>(
    root: Node<'t>,
    sequence: &str,
    index: usize,
    text: &str,
) -> Result<Node<'t>, EditError> {
    sequence_items(root, sequence, text)
        .get(index)
        .and_then(|item| find_kind(*item, "block_mapping"))
        .ok_or_else(|| EditError::MissingItem {
            sequence: sequence.to_string(),
            index,
        })
}

fn set_edit(mapping: Node<'_>, text: &str, key: &str, value: &str) -> Edit {
    let Some(pair) = find_pair(mapping, key, text) else {
        let indent = pairs(mapping)
            .first()
            .map_or(0, |first| first.start_position().column);
        let at = line_end(text, mapping.end_byte());
        let newline = if text[..at].ends_with('\n') || at == 0 { "" } else { "\n" };
        let line = format!(
            "{}{}{}: {}\n",
            newline,
            " ".repeat(indent),
            key,
            scalar(value, None)
        );
        return (at..at, line);
    };

    match pair.child_by_field_name("value") {
        Some(old) if old.kind() == "flow_node" => {
            (old.byte_range(), scalar(value, Some(&text[old.byte_range()])))
        }
        // empty or block value
        _ => {
            let key_end = pair
                .child_by_field_name("key")
                .map_or(pair.start_byte(), |k| k.end_byte());
            (key_end..pair.end_byte(), format!(": {}", scalar(value, None)))
        }
    }
}

fn remove_pair_edit(mapping: Node<'_>, pair: Node<'_>, text: &str) -> Edit {
    let start = line_start(text, pair.start_byte());
    if text[start..pair.start_byte()].trim().is_empty() {
        return (start..line_end(text, pair.end_byte()), String::new());
    }

    // `- key: value` shares its line with the sequence dash: pull the next
    // entry up instead of deleting the line
    match pairs(mapping)
        .into_iter()
        .find(|p| p.start_byte() > pair.start_byte())
    {
        Some(next) => (pair.start_byte()..next.start_byte(), String::new()),
        None => (pair.byte_range(), "{}".to_string()),
    }
}

fn line_start(text: &str, pos: usize) -> usize {
    text[..pos].rfind('\n').map_or(0, |i| i + 1)
}

/// Offset just past the newline ending the line that contains `pos - 1`
fn line_end(text: &str, pos: usize) -> usize {
    if pos > 0 && text.as_bytes()[pos - 1] == b'\n' {
        return pos;
    }
    text[pos..].find('\n').map_or(text.len(), |i| pos + i + 1)
}

fn unquote(raw: &str) -> &str {
    let raw = raw.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = raw
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    raw
}

/// Render `value` as a scalar, keeping the quote style of `old`
fn scalar(value: &str, old: Option<&str>) -> String {
    match old.map(str::trim).and_then(|o| o.chars().next()) {
        Some('"') => format!(
            "\"{}\"",
            value.replace('\\', "\\\\").replace('"', "\\\"")
        ),
        Some('\'') => single_quoted(value),
        _ if reads_back_as_string(value) => value.to_string(),
        _ => single_quoted(value),
    }
}

fn single_quoted(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `3.30` or `true` written plain would not come back as the same string
fn reads_back_as_string(value: &str) -> bool {
    matches!(serde_yaml::from_str::<Value>(value), Ok(Value::String(s)) if s == value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const ELEMENT: &str = r#"# Copyright header
kind: meson
sources:
# upstream tag
- kind: git_tag
  url: gnome:glib.git
  track: main  # follow main
  submodules:
    subprojects/gvdb:
      checkout: true
  ref: "2.58"
- kind: cargo
  ref: []
- kind: patch
  path: patches/fix.patch
depends:
- zlib.bst
"#;

    #[test]
    fn set_in_item_replaces_value_only() {
        let mut doc = YamlDocument::new(ELEMENT);
        doc.set_in_item("sources", 0, "kind", "tar").unwrap();
        assert_eq!(doc.as_str(), ELEMENT.replace("kind: git_tag", "kind: tar"));
    }

    #[test]
    fn set_in_item_appends_missing_key_with_item_indent() {
        let mut doc = YamlDocument::new("sources:\n- kind: tar\n  url: x\n- kind: patch\n");
        doc.set_in_item("sources", 0, "ref", "abc123").unwrap();
        assert_eq!(
            doc.as_str(),
            "sources:\n- kind: tar\n  url: x\n  ref: abc123\n- kind: patch\n"
        );
    }

    #[test]
    fn remove_from_item_drops_nested_block() {
        let mut doc = YamlDocument::new(ELEMENT);
        assert!(doc.remove_from_item("sources", 0, "submodules").unwrap());
        assert!(!doc.as_str().contains("gvdb"));
        assert!(doc.as_str().contains("  ref: \"2.58\"\n"));
        assert!(!doc.remove_from_item("sources", 0, "submodules").unwrap());
    }

    #[test]
    fn remove_from_item_pulls_next_key_onto_dash_line() {
        let mut doc = YamlDocument::new("sources:\n- track: main\n  kind: git\n");
        doc.remove_from_item("sources", 0, "track").unwrap();
        assert_eq!(doc.as_str(), "sources:\n- kind: git\n");
    }

    #[test]
    fn remove_items_where_removes_matching_items() {
        let mut doc = YamlDocument::new(ELEMENT);
        assert_eq!(doc.remove_items_where("sources", "kind", "cargo").unwrap(), 1);
        assert!(!doc.as_str().contains("cargo"));
        assert!(doc.as_str().contains("- kind: patch\n"));
        assert!(doc.as_str().contains("# Copyright header\n"));
    }

    #[test]
    fn set_nested_mapping_and_top_level() {
        let mut doc = YamlDocument::new(
            "# CI\nvariables:\n  # branch to publish\n  FLATPAK_BRANCH: master\nstages: [build]\n",
        );
        doc.set(&["variables"], "FLATPAK_BRANCH", "3.30").unwrap();
        doc.set(&[], "ref-storage", "inline").unwrap();
        assert_eq!(
            doc.as_str(),
            "# CI\nvariables:\n  # branch to publish\n  FLATPAK_BRANCH: '3.30'\nstages: [build]\nref-storage: inline\n"
        );
    }

    #[test]
    fn set_fails_for_missing_mapping() {
        let mut doc = YamlDocument::new("name: gnome\n");
        assert!(matches!(
            doc.set(&["variables"], "branch", "3.30"),
            Err(EditError::MissingMapping(_))
        ));
    }

    #[rstest]
    #[case("inline", None, "inline")]
    #[case("3.30", None, "'3.30'")]
    #[case("true", None, "'true'")]
    #[case("it's", Some("'x'"), "'it''s'")]
    #[case("2.60", Some("\"2.58\""), "\"2.60\"")]
    #[case("gnome_downloads:glib/glib-2.58.3.tar.xz", None, "gnome_downloads:glib/glib-2.58.3.tar.xz")]
    fn scalar_returns_expected(#[case] value: &str, #[case] old: Option<&str>, #[case] expected: &str) {
        assert_eq!(scalar(value, old), expected);
    }
}
