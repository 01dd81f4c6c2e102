//! Conversion of raw solver steps into [`CanonicalStep`] trees.
//!
//! Input may be a single step, a sequence, or a string carrying either a
//! plain equation or JSON for one of those. Substeps are resolved before
//! their parent's own text, and a node that fails to render only blanks
//! the field it belongs to.

use log::debug;
use serde_json::Value;

use crate::render::{humanize, render_expression, render_or_empty};
use crate::step::{CanonicalStep, RawStep, StructuredStep};

/// Normalize whatever the solver (or the store) handed back.
///
/// # Examples
/// ```
/// use serde_json::json;
/// use stepwise::normalize::normalize_value;
///
/// let steps = normalize_value(&json!(["x = 1"]));
/// assert_eq!(steps[0].to_text, "x = 1");
/// assert_eq!(steps[0].label, "");
/// ```
pub fn normalize_value(value: &Value) -> Vec<CanonicalStep> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => {
            let raw: Vec<RawStep> = items.iter().map(RawStep::from_element).collect();
            normalize(&raw)
        }
        other => normalize(&[RawStep::from_value(other)]),
    }
}

/// Normalize an ordered sequence of raw steps, numbering siblings from 1.
///
/// A serialized step expands in place into the steps it encodes.
pub fn normalize(raw: &[RawStep]) -> Vec<CanonicalStep> {
    let mut out = Vec::with_capacity(raw.len());
    for step in raw {
        match step {
            RawStep::Serialized(text) => match serde_json::from_str::<Value>(text) {
                Ok(parsed) => out.extend(expand_serialized(&parsed)),
                Err(e) => {
                    debug!("step text is not JSON, keeping it verbatim: {}", e);
                    out.push(legacy(text.clone()));
                }
            },
            RawStep::Legacy(text) => out.push(legacy(text.clone())),
            RawStep::Structured(structured) => out.push(normalize_structured(structured)),
            RawStep::Other(value) => out.push(legacy(render_expression(value))),
        }
    }

    for (i, step) in out.iter_mut().enumerate() {
        step.index = i + 1;
    }
    out
}

/// Normalize stored step text. JSON text is decoded; anything else becomes
/// a single legacy step.
pub fn normalize_str(text: &str) -> Vec<CanonicalStep> {
    normalize(&[RawStep::from_value(&Value::String(text.to_string()))])
}

// A decoded payload is never checked for a second layer of encoding.
fn expand_serialized(parsed: &Value) -> Vec<CanonicalStep> {
    match parsed {
        Value::Array(items) => {
            let raw: Vec<RawStep> = items.iter().map(RawStep::from_element).collect();
            normalize(&raw)
        }
        Value::Null => Vec::new(),
        other => normalize(&[RawStep::from_element(other)]),
    }
}

fn normalize_structured(step: &StructuredStep) -> CanonicalStep {
    let substeps = normalize(&step.substeps);

    CanonicalStep {
        index: 0,
        change_type: step.change_type.clone(),
        label: humanize(&step.change_type),
        from_text: render_or_empty(&step.old_equation),
        to_text: render_or_empty(&step.new_equation),
        substeps,
    }
}

fn legacy(text: String) -> CanonicalStep {
    CanonicalStep {
        index: 0,
        change_type: String::new(),
        label: String::new(),
        from_text: String::new(),
        to_text: text,
        substeps: Vec::new(),
    }
}

/// The persisted form of a step sequence.
///
/// Feeding the result back into [`normalize_value`] reproduces the same
/// change types, labels and texts.
pub fn to_persisted(steps: &[CanonicalStep]) -> Value {
    serde_json::to_value(steps).unwrap_or(Value::Array(Vec::new()))
}
