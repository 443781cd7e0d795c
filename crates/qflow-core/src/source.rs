#![forbid(unsafe_code)]

//! Question sources.
//!
//! A [`QuestionSource`] yields the ordered, immutable item list once, when
//! the flow is built. Two sources are provided:
//!
//! - [`StaticSource`]: items constructed in code.
//! - [`JsonSource`]: a JSON array of item objects, from text, a reader, or a file.
//!
//! # JSON shape
//!
//! ```json
//! [
//!   { "id": "q1", "text": "...", "options": [ { "value": "A" } ] },
//!   { "id": "q25", "inner_q": "...", "outer_q": "...",
//!     "options": { "inner": [], "outer": [] } }
//! ]
//! ```
//!
//! Each object needs a string `id`. An optional `kind` (`"single"` or
//! `"dual"`) overrides inference; otherwise [`ItemKind::infer`] decides. The
//! whole object becomes the item payload and ordinals follow array order.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::item::{Item, ItemId, ItemKind};

/// Errors raised while loading items.
#[derive(Debug)]
pub enum SourceError {
    /// Reading the source failed.
    Io(std::io::Error),
    /// The source is not valid JSON or not an array.
    Parse(String),
    /// An element could not be turned into an item.
    InvalidItem {
        /// Position of the offending element.
        index: usize,
        /// What was wrong with it.
        reason: String,
    },
    /// Two items share an id.
    DuplicateId(ItemId),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Io(e) => write!(f, "I/O error: {e}"),
            SourceError::Parse(msg) => write!(f, "parse error: {msg}"),
            SourceError::InvalidItem { index, reason } => {
                write!(f, "invalid item at index {index}: {reason}")
            }
            SourceError::DuplicateId(id) => write!(f, "duplicate item id: {id}"),
        }
    }
}

impl std::error::Error for SourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SourceError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SourceError {
    fn from(e: std::io::Error) -> Self {
        SourceError::Io(e)
    }
}

/// Supplies the ordered item list of a flow.
pub trait QuestionSource {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Load every item, in flow order.
    fn load_items(&self) -> Result<Vec<Item>, SourceError>;
}

/// Renumber ordinals by position and reject duplicate ids.
fn finalize(mut items: Vec<Item>) -> Result<Vec<Item>, SourceError> {
    let mut seen = HashSet::with_capacity(items.len());
    for (ordinal, item) in items.iter_mut().enumerate() {
        if !seen.insert(item.id.clone()) {
            return Err(SourceError::DuplicateId(item.id.clone()));
        }
        item.ordinal = ordinal;
    }
    Ok(items)
}

// ─────────────────────────────────────────────────────────────────────────────
// Static source
// ─────────────────────────────────────────────────────────────────────────────

/// Items defined in code.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    items: Vec<Item>,
}

impl StaticSource {
    /// Wrap an item list.
    #[must_use]
    pub fn new(items: Vec<Item>) -> Self {
        Self { items }
    }

    /// `singles` single-choice items followed by `duals` dual-choice items,
    /// with ids `q1`, `q2`, ...
    #[must_use]
    pub fn numbered(singles: usize, duals: usize) -> Self {
        let items = (0..singles + duals)
            .map(|i| {
                let kind = if i < singles {
                    ItemKind::SingleChoice
                } else {
                    ItemKind::DualChoice
                };
                Item::new(format!("q{}", i + 1), i, kind)
            })
            .collect();
        Self { items }
    }
}

impl QuestionSource for StaticSource {
    fn name(&self) -> &str {
        "StaticSource"
    }

    fn load_items(&self) -> Result<Vec<Item>, SourceError> {
        finalize(self.items.clone())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// JSON source
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum JsonOrigin {
    Text(String),
    File(PathBuf),
}

/// Items parsed from a JSON array.
#[derive(Debug, Clone)]
pub struct JsonSource {
    origin: JsonOrigin,
}

impl JsonSource {
    /// Parse items from in-memory JSON text.
    #[must_use]
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            origin: JsonOrigin::Text(text.into()),
        }
    }

    /// Read items from a JSON file when loaded.
    #[must_use]
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        Self {
            origin: JsonOrigin::File(path.as_ref().to_path_buf()),
        }
    }

    /// Read JSON text from `reader` now; parsing happens when loaded.
    pub fn from_reader(mut reader: impl std::io::Read) -> Result<Self, SourceError> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Ok(Self::from_text(text))
    }

    /// Convert a parsed JSON value into items.
    pub fn parse_value(root: Value) -> Result<Vec<Item>, SourceError> {
        let Value::Array(elements) = root else {
            return Err(SourceError::Parse("expected a JSON array of items".into()));
        };

        let mut items = Vec::with_capacity(elements.len());
        for (index, element) in elements.into_iter().enumerate() {
            let id = match element.get("id") {
                Some(Value::String(id)) if !id.is_empty() => ItemId::new(id),
                _ => {
                    return Err(SourceError::InvalidItem {
                        index,
                        reason: "missing string `id`".into(),
                    });
                }
            };
            let kind = match element.get("kind") {
                None | Some(Value::Null) => ItemKind::infer(&element),
                Some(Value::String(tag)) => {
                    ItemKind::from_tag(tag).ok_or_else(|| SourceError::InvalidItem {
                        index,
                        reason: format!("unknown kind `{tag}`"),
                    })?
                }
                Some(other) => {
                    return Err(SourceError::InvalidItem {
                        index,
                        reason: format!("`kind` must be a string, got {other}"),
                    });
                }
            };
            items.push(Item::new(id, index, kind).with_payload(element));
        }
        finalize(items)
    }
}

impl QuestionSource for JsonSource {
    fn name(&self) -> &str {
        match self.origin {
            JsonOrigin::Text(_) => "JsonSource(text)",
            JsonOrigin::File(_) => "JsonSource(file)",
        }
    }

    fn load_items(&self) -> Result<Vec<Item>, SourceError> {
        let root: Value = match &self.origin {
            JsonOrigin::Text(text) => {
                serde_json::from_str(text).map_err(|e| SourceError::Parse(e.to_string()))?
            }
            JsonOrigin::File(path) => {
                let file = std::fs::File::open(path)?;
                serde_json::from_reader(std::io::BufReader::new(file))
                    .map_err(|e| SourceError::Parse(e.to_string()))?
            }
        };
        let items = Self::parse_value(root)?;
        crate::debug!(source = self.name(), count = items.len(), "loaded items");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_source_matches_layout() {
        let items = StaticSource::numbered(24, 6).load_items().unwrap();
        assert_eq!(items.len(), 30);
        assert_eq!(items[0].id.as_str(), "q1");
        assert_eq!(items[23].kind, ItemKind::SingleChoice);
        assert_eq!(items[24].kind, ItemKind::DualChoice);
        assert_eq!(items[29].ordinal, 29);
    }

    #[test]
    fn static_source_renumbers_ordinals() {
        let source = StaticSource::new(vec![
            Item::new("b", 7, ItemKind::SingleChoice),
            Item::new("a", 3, ItemKind::SingleChoice),
        ]);
        let items = source.load_items().unwrap();
        assert_eq!(items[0].ordinal, 0);
        assert_eq!(items[1].ordinal, 1);
    }

    #[test]
    fn static_source_rejects_duplicates() {
        let source = StaticSource::new(vec![
            Item::new("q1", 0, ItemKind::SingleChoice),
            Item::new("q1", 1, ItemKind::SingleChoice),
        ]);
        assert!(matches!(
            source.load_items(),
            Err(SourceError::DuplicateId(id)) if id.as_str() == "q1"
        ));
    }

    #[test]
    fn json_source_infers_and_honors_kind() {
        let text = r#"[
            {"id": "q1", "options": [{"value": "A"}]},
            {"id": "q2", "options": {"inner": [], "outer": []}},
            {"id": "q3", "kind": "dual"}
        ]"#;
        let items = JsonSource::from_text(text).load_items().unwrap();
        assert_eq!(items[0].kind, ItemKind::SingleChoice);
        assert_eq!(items[1].kind, ItemKind::DualChoice);
        assert_eq!(items[2].kind, ItemKind::DualChoice);
        assert_eq!(items[1].payload["id"], "q2");
    }

    #[test]
    fn json_source_rejects_non_array() {
        let err = JsonSource::from_text(r#"{"id": "q1"}"#).load_items().unwrap_err();
        assert!(matches!(err, SourceError::Parse(_)));
    }

    #[test]
    fn json_source_rejects_missing_id_and_bad_kind() {
        let err = JsonSource::from_text(r#"[{"text": "no id"}]"#)
            .load_items()
            .unwrap_err();
        assert!(matches!(err, SourceError::InvalidItem { index: 0, .. }));

        let err = JsonSource::from_text(r#"[{"id": "q1"}, {"id": "q2", "kind": "triple"}]"#)
            .load_items()
            .unwrap_err();
        assert!(matches!(err, SourceError::InvalidItem { index: 1, .. }));
    }

    #[test]
    fn json_source_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.json");
        std::fs::write(&path, r#"[{"id": "q1"}, {"id": "q2"}]"#).unwrap();

        let items = JsonSource::from_path(&path).load_items().unwrap();
        assert_eq!(items.len(), 2);

        let missing = JsonSource::from_path(dir.path().join("nope.json")).load_items();
        assert!(matches!(missing, Err(SourceError::Io(_))));
    }

    #[test]
    fn json_source_reads_from_reader() {
        let bytes: &[u8] = br#"[{"id": "q1", "scenario": "At home"}]"#;
        let items = JsonSource::from_reader(bytes).unwrap().load_items().unwrap();
        assert_eq!(items[0].kind, ItemKind::DualChoice);
    }
}
