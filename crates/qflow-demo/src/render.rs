#![forbid(unsafe_code)]

//! Text renderer for terminal slots.
//!
//! Item payloads follow the JSON source shape: single-choice items carry a
//! `text` prompt and an `options` array; dual-choice items carry a
//! `scenario`, `inner_q` and `outer_q` prompts, and an `options` object with
//! `inner` and `outer` arrays. Each option is `{ "value", "label", "scoring" }`
//! where `scoring` maps tag keys to weights.

use qflow::{
    AnswerListener, AnswerRecord, AnswerValue, Choice, ConstructionError, Extent, Item, ItemKind,
    ItemRendererFactory, ScoringTag, SlotHandle, VisibilityStyle,
};
use serde_json::Value;

/// Option keys, in display order. Lowercase selects single or inner,
/// uppercase selects outer.
pub const OPTION_KEYS: [char; 4] = ['a', 'b', 'c', 'd'];

/// One selectable option.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayOption {
    /// What gets recorded.
    pub choice: Choice,
    /// What gets shown.
    pub label: String,
}

/// Prompts and options parsed from an item payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemOptions {
    /// Main prompt (single text or dual scenario).
    pub prompt: String,
    /// Prompt above the primary options of a dual item.
    pub inner_prompt: Option<String>,
    /// Prompt above the outer options of a dual item.
    pub outer_prompt: Option<String>,
    /// Single options, or inner options of a dual item.
    pub primary: Vec<DisplayOption>,
    /// Outer options of a dual item.
    pub outer: Vec<DisplayOption>,
}

fn text_field(payload: &Value, key: &str) -> Option<String> {
    payload.get(key).and_then(Value::as_str).map(str::to_string)
}

fn parse_options(list: Option<&Value>) -> Vec<DisplayOption> {
    let Some(Value::Array(entries)) = list else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let value = entry.get("value").and_then(Value::as_str)?;
            let label = entry
                .get("label")
                .and_then(Value::as_str)
                .unwrap_or(value)
                .to_string();
            let tags = match entry.get("scoring") {
                Some(Value::Object(map)) => map
                    .iter()
                    .filter_map(|(key, weight)| weight.as_f64().map(|w| ScoringTag::new(key, w)))
                    .collect(),
                _ => Vec::new(),
            };
            Some(DisplayOption {
                choice: Choice::new(value).with_tags(tags),
                label,
            })
        })
        .collect()
}

impl ItemOptions {
    /// Read prompts and options from `item.payload`.
    #[must_use]
    pub fn from_item(item: &Item) -> Self {
        let payload = &item.payload;
        match item.kind {
            ItemKind::SingleChoice => Self {
                prompt: text_field(payload, "text").unwrap_or_else(|| item.id.to_string()),
                inner_prompt: None,
                outer_prompt: None,
                primary: parse_options(payload.get("options")),
                outer: Vec::new(),
            },
            ItemKind::DualChoice => {
                let options = payload.get("options");
                Self {
                    prompt: text_field(payload, "scenario")
                        .or_else(|| text_field(payload, "text"))
                        .unwrap_or_else(|| item.id.to_string()),
                    inner_prompt: text_field(payload, "inner_q"),
                    outer_prompt: text_field(payload, "outer_q"),
                    primary: parse_options(options.and_then(|o| o.get("inner"))),
                    outer: parse_options(options.and_then(|o| o.get("outer"))),
                }
            }
        }
    }

    /// The value recorded when option `index` is picked. `outer` selects the
    /// outer half of a dual item.
    #[must_use]
    pub fn value_for(&self, kind: ItemKind, index: usize, outer: bool) -> Option<AnswerValue> {
        match (kind, outer) {
            (ItemKind::SingleChoice, false) => {
                self.primary.get(index).map(|o| AnswerValue::Single(o.choice.clone()))
            }
            (ItemKind::DualChoice, false) => {
                self.primary.get(index).map(|o| AnswerValue::Inner(o.choice.clone()))
            }
            (ItemKind::DualChoice, true) => {
                self.outer.get(index).map(|o| AnswerValue::Outer(o.choice.clone()))
            }
            (ItemKind::SingleChoice, true) => None,
        }
    }

    fn offers(&self, value: &AnswerValue) -> bool {
        let list = match value {
            AnswerValue::Single(_) | AnswerValue::Inner(_) => &self.primary,
            AnswerValue::Outer(_) => &self.outer,
        };
        list.iter().any(|o| o.choice.value == value.choice().value)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handle
// ─────────────────────────────────────────────────────────────────────────────

/// A slot rendered as lines of text.
#[derive(Debug)]
pub struct TextHandle {
    kind: ItemKind,
    options: ItemOptions,
    listener: AnswerListener,
    style: VisibilityStyle,
    primary: Option<String>,
    outer: Option<String>,
}

impl TextHandle {
    fn option_lines(out: &mut Vec<String>, options: &[DisplayOption], upper: bool, selected: Option<&str>) {
        for (key, option) in OPTION_KEYS.iter().zip(options) {
            let key = if upper { key.to_ascii_uppercase() } else { *key };
            let mark = if selected == Some(option.choice.value.as_str()) { "*" } else { " " };
            out.push(format!("  {mark} ({key}) {}", option.label));
        }
    }
}

impl SlotHandle for TextHandle {
    fn has_content(&self) -> bool {
        !self.options.primary.is_empty()
            && (self.kind == ItemKind::SingleChoice || !self.options.outer.is_empty())
    }

    fn extent(&self) -> Extent {
        if self.style == VisibilityStyle::Hidden {
            return Extent::ZERO;
        }
        let lines = self.lines();
        let width = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
        Extent::new(
            u16::try_from(width).unwrap_or(u16::MAX),
            u16::try_from(lines.len()).unwrap_or(u16::MAX),
        )
    }

    fn is_hidden(&self) -> bool {
        self.style == VisibilityStyle::Hidden
    }

    fn apply_style(&mut self, style: VisibilityStyle) {
        self.style = style;
    }

    fn restore(&mut self, record: &AnswerRecord) -> bool {
        self.primary = record
            .single_value
            .clone()
            .or_else(|| record.inner_value.as_ref().map(|c| c.value.clone()));
        self.outer = record.outer_value.as_ref().map(|c| c.value.clone());
        true
    }

    fn input(&mut self, value: AnswerValue) -> bool {
        if !value.fits(self.kind) || !self.options.offers(&value) {
            return false;
        }
        let picked = Some(value.choice().value.clone());
        match value {
            AnswerValue::Single(_) | AnswerValue::Inner(_) => self.primary = picked,
            AnswerValue::Outer(_) => self.outer = picked,
        }
        self.listener.answer_changed(value)
    }

    fn lines(&self) -> Vec<String> {
        let mut out = vec![self.options.prompt.clone(), String::new()];
        match self.kind {
            ItemKind::SingleChoice => {
                Self::option_lines(&mut out, &self.options.primary, false, self.primary.as_deref());
            }
            ItemKind::DualChoice => {
                if let Some(prompt) = &self.options.inner_prompt {
                    out.push(prompt.clone());
                }
                Self::option_lines(&mut out, &self.options.primary, false, self.primary.as_deref());
                out.push(String::new());
                if let Some(prompt) = &self.options.outer_prompt {
                    out.push(prompt.clone());
                }
                Self::option_lines(&mut out, &self.options.outer, true, self.outer.as_deref());
            }
        }
        out
    }
}

/// Builds a [`TextHandle`] per item. Items without options fail to build
/// and are shown through the flow's fallback slot.
#[derive(Debug, Default)]
pub struct TextFactory;

impl ItemRendererFactory for TextFactory {
    fn create(
        &mut self,
        item: &Item,
        listener: AnswerListener,
    ) -> Result<Box<dyn SlotHandle>, ConstructionError> {
        let options = ItemOptions::from_item(item);
        if options.primary.is_empty() {
            return Err(ConstructionError::Failed(format!("{} has no options", item.id)));
        }
        Ok(Box::new(TextHandle {
            kind: item.kind,
            options,
            listener,
            style: VisibilityStyle::Hidden,
            primary: None,
            outer: None,
        }))
    }
}
