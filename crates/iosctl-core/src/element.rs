//! UI element model and hierarchy normalization.
//!
//! Backends emit their UI hierarchy as loosely-structured JSON whose key names
//! and bounds formats differ between tools. [`parse_hierarchy`] normalizes any
//! of them into a tree of [`UIElement`]s:
//!
//! - the label is the first non-empty of `text`, `label`, `name`, `AXLabel`;
//! - bounds are read from `bounds`, then `frame`, then `rect`;
//! - children are read from `children`, then `elements`;
//! - a top-level array is treated as a list of root elements.
//!
//! Accepted bounds formats:
//!
//! | Format | Example | Interpretation |
//! |---|---|---|
//! | origin + size object | `{"x": 10, "y": 20, "width": 100, "height": 44}` | as-is |
//! | edge object | `{"left": 10, "top": 20, "right": 110, "bottom": 64}` | width = right - left |
//! | edge array | `[10, 20, 110, 64]` | `[left, top, right, bottom]` |
//! | frame string | `"{{10, 20}, {100, 44}}"` | `{{x, y}, {width, height}}` |
//!
//! Elements whose bounds are missing or unreadable keep `frame: None` and are
//! never selected as tap targets.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{IosError, Result};

const LABEL_KEYS: [&str; 4] = ["text", "label", "name", "AXLabel"];
const BOUNDS_KEYS: [&str; 3] = ["bounds", "frame", "rect"];
const CHILDREN_KEYS: [&str; 2] = ["children", "elements"];

/// A UI element parsed from a hierarchy dump.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UIElement {
    /// The user-visible text of the element.
    pub label: Option<String>,
    /// Position and size in screen points.
    pub frame: Option<ElementFrame>,
    /// Nested elements, in hierarchy order.
    pub children: Vec<UIElement>,
}

/// The frame of a UI element, origin at the top-left of the screen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ElementFrame {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ElementFrame {
    /// Build a frame from edge coordinates.
    pub fn from_edges(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        }
    }

    /// Tap target: `(x + width/2, y + height/2)`, truncated to whole points.
    pub fn center(&self) -> (i32, i32) {
        (
            (self.x + self.width / 2.0) as i32,
            (self.y + self.height / 2.0) as i32,
        )
    }
}

impl UIElement {
    /// A leaf element with a label and frame.
    pub fn new(label: impl Into<String>, frame: ElementFrame) -> Self {
        Self {
            label: Some(label.into()),
            frame: Some(frame),
            children: Vec::new(),
        }
    }

    /// Whether this element's label matches `text`.
    ///
    /// Exact matching compares for equality; otherwise the match is a
    /// case-insensitive substring test.
    pub fn matches_text(&self, text: &str, exact: bool) -> bool {
        match self.label.as_deref() {
            Some(label) if exact => label == text,
            Some(label) => label.to_lowercase().contains(&text.to_lowercase()),
            None => false,
        }
    }
}

/// Parse raw backend output into root elements.
pub fn parse_hierarchy(raw: &str) -> Result<Vec<UIElement>> {
    let value: Value = serde_json::from_str(raw.trim())
        .map_err(|e| IosError::Parse(format!("UI hierarchy is not valid JSON: {}", e)))?;
    Ok(elements_from_value(&value))
}

/// Normalize an already-decoded hierarchy value.
pub fn elements_from_value(value: &Value) -> Vec<UIElement> {
    match value {
        Value::Array(items) => items.iter().flat_map(elements_from_value).collect(),
        Value::Object(map) => vec![element_from_object(map)],
        _ => Vec::new(),
    }
}

fn element_from_object(map: &Map<String, Value>) -> UIElement {
    let label = LABEL_KEYS
        .iter()
        .filter_map(|key| map.get(*key).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .map(String::from);

    let frame = BOUNDS_KEYS
        .iter()
        .find_map(|key| map.get(*key).filter(|v| !v.is_null()))
        .and_then(parse_bounds);

    let children = CHILDREN_KEYS
        .iter()
        .filter_map(|key| map.get(*key))
        .find(|v| v.as_array().map_or(false, |a| !a.is_empty()))
        .map(elements_from_value)
        .unwrap_or_default();

    UIElement { label, frame, children }
}

/// Interpret one of the supported bounds formats.
pub fn parse_bounds(value: &Value) -> Option<ElementFrame> {
    match value {
        Value::Object(map) => {
            let num = |key: &str| map.get(key).and_then(Value::as_f64);
            if let (Some(x), Some(y), Some(width), Some(height)) =
                (num("x"), num("y"), num("width"), num("height"))
            {
                return Some(ElementFrame { x, y, width, height });
            }
            if let (Some(left), Some(top), Some(right), Some(bottom)) =
                (num("left"), num("top"), num("right"), num("bottom"))
            {
                return Some(ElementFrame::from_edges(left, top, right, bottom));
            }
            None
        }
        Value::Array(items) if items.len() >= 4 => {
            let nums: Option<Vec<f64>> = items[..4].iter().map(Value::as_f64).collect();
            nums.map(|n| ElementFrame::from_edges(n[0], n[1], n[2], n[3]))
        }
        Value::String(s) => parse_frame_string(s),
        _ => None,
    }
}

/// Parse `"{{x, y}, {width, height}}"`.
fn parse_frame_string(s: &str) -> Option<ElementFrame> {
    let nums: Vec<f64> = s
        .split(|c: char| c == '{' || c == '}' || c == ',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::parse::<f64>)
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    match nums.as_slice() {
        [x, y, width, height] => Some(ElementFrame {
            x: *x,
            y: *y,
            width: *width,
            height: *height,
        }),
        _ => None,
    }
}

/// Preorder search for the first element with a frame whose label matches.
pub fn find_by_text<'a>(elements: &'a [UIElement], text: &str, exact: bool) -> Option<&'a UIElement> {
    for element in elements {
        if element.frame.is_some() && element.matches_text(text, exact) {
            return Some(element);
        }
        if let Some(found) = find_by_text(&element.children, text, exact) {
            return Some(found);
        }
    }
    None
}
