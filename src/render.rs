use log::debug;
use serde::Serialize;
use serde_json::Value;

use crate::error::RenderError;
use crate::step::{CanonicalStep, ExpressionNode, OperationArg};

/// Render any solver node to text.
///
/// Never fails: a node that cannot be rendered yields an empty string.
///
/// # Examples
/// ```
/// use serde_json::json;
/// use stepwise::render::render_expression;
///
/// let node = json!({"leftNode": {"value": "x"}, "rightNode": {"value": "1"}, "comparator": "="});
/// assert_eq!(render_expression(&node), "x = 1");
/// ```
pub fn render_expression(value: &Value) -> String {
    render_or_empty(&ExpressionNode::from_value(value))
}

/// Render a classified node, degrading to an empty string on failure.
pub fn render_or_empty(node: &ExpressionNode) -> String {
    match render_node(node) {
        Ok(text) => text,
        Err(e) => {
            debug!("expression degraded to empty text: {}", e);
            String::new()
        }
    }
}

/// Render a classified node, reporting the first failure.
pub fn render_node(node: &ExpressionNode) -> Result<String, RenderError> {
    match node {
        ExpressionNode::Empty => Ok(String::new()),
        ExpressionNode::Text(s) | ExpressionNode::Value(s) | ExpressionNode::Name(s) => {
            Ok(s.clone())
        }
        ExpressionNode::List(items) => {
            let rendered = items
                .iter()
                .map(render_node)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rendered.join(", "))
        }
        ExpressionNode::Operation { op, args } => {
            let mut rendered = Vec::with_capacity(args.len());
            for arg in args {
                rendered.push(match arg {
                    OperationArg::Plain(node) => render_node(node)?,
                    OperationArg::Parenthesized(node) => format!("({})", render_node(node)?),
                });
            }
            Ok(rendered.join(&format!(" {} ", operator_symbol(op))))
        }
        ExpressionNode::Comparison {
            left,
            right,
            comparator,
        } => Ok(format!(
            "{} {} {}",
            render_node(left)?,
            comparator,
            render_node(right)?
        )),
        ExpressionNode::Opaque(value) => Ok(serde_json::to_string(value)?),
        ExpressionNode::Unrenderable => Err(RenderError::TooDeep),
    }
}

/// Display symbol for an operator. Only multiplication is rewritten.
pub fn operator_symbol(op: &str) -> &str {
    match op {
        "*" => "×",
        other => other,
    }
}

/// Turn a machine change type such as `ADD_CONSTANT` into `Add Constant`.
pub fn humanize(change_type: &str) -> String {
    if change_type.is_empty() {
        return String::new();
    }

    change_type
        .split('_')
        .map(title_case)
        .collect::<Vec<_>>()
        .join(" ")
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// One displayable row of a step tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepLine {
    /// Nesting level, 0 for top-level steps
    pub depth: usize,
    pub index: usize,
    pub label: String,
    pub text: String,
}

/// Flatten a step tree into rows in pre-order (each step before its substeps).
pub fn flatten(steps: &[CanonicalStep]) -> Vec<StepLine> {
    let mut lines = Vec::new();
    flatten_into(steps, 0, &mut lines);
    lines
}

fn flatten_into(steps: &[CanonicalStep], depth: usize, lines: &mut Vec<StepLine>) {
    for step in steps {
        lines.push(StepLine {
            depth,
            index: step.index,
            label: step.label.clone(),
            text: step_text(step),
        });
        flatten_into(&step.substeps, depth + 1, lines);
    }
}

/// The equation text shown for a step: the new state, prefixed with the
/// old one when there is a distinct old state.
pub fn step_text(step: &CanonicalStep) -> String {
    if step.from_text.is_empty() || step.from_text == step.to_text {
        step.to_text.clone()
    } else {
        format!("{} → {}", step.from_text, step.to_text)
    }
}

/// Render a step tree as plain text lines, two spaces of indent per level.
pub fn render_lines(steps: &[CanonicalStep]) -> Vec<String> {
    let mut out = Vec::new();
    for line in flatten(steps) {
        let indent = "  ".repeat(line.depth);
        if line.label.is_empty() {
            out.push(format!("{}Step {}", indent, line.index));
        } else {
            out.push(format!("{}Step {}: {}", indent, line.index, line.label));
        }
        out.push(format!("{}  {}", indent, line.text));
    }
    out
}
