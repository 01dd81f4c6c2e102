use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Deepest expression nesting that is classified. Anything below this
/// level becomes [`ExpressionNode::Unrenderable`].
pub const MAX_DEPTH: usize = 256;

/// One unit of solver output, classified by shape.
///
/// The solver never tags its steps, so [`RawStep::from_value`] decides the
/// variant from the structure of the JSON it was handed.
#[derive(Debug, Clone, PartialEq)]
pub enum RawStep {
    /// A plain string that already is a complete equation state.
    Legacy(String),

    /// A change-type record with both equation sides and nested substeps.
    Structured(StructuredStep),

    /// A string holding a JSON-encoded step sequence, parsed on demand.
    Serialized(String),

    /// Any other value. Rendered as a single expression.
    Other(Value),
}

/// A solver step with its transformation kind and both equation states.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredStep {
    pub change_type: String,
    pub old_equation: ExpressionNode,
    pub new_equation: ExpressionNode,
    pub substeps: Vec<RawStep>,
}

/// One side of an equation or a sub-expression.
///
/// Variants are listed in the order [`ExpressionNode::from_value`] checks
/// for them; a node that fits several shapes takes the first.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionNode {
    Empty,
    Text(String),
    Value(String),
    Name(String),
    List(Vec<ExpressionNode>),
    Operation {
        op: String,
        args: Vec<OperationArg>,
    },
    Comparison {
        left: Box<ExpressionNode>,
        right: Box<ExpressionNode>,
        comparator: String,
    },
    /// No known shape; rendered as compact JSON.
    Opaque(Value),
    /// Nested past [`MAX_DEPTH`].
    Unrenderable,
}

/// An operand of an [`ExpressionNode::Operation`].
#[derive(Debug, Clone, PartialEq)]
pub enum OperationArg {
    Plain(ExpressionNode),
    /// The operand carried a `content` node and renders inside parentheses.
    Parenthesized(ExpressionNode),
}

/// A normalized, render-ready solve step.
///
/// The serialized form doubles as a structured step (`changeType`,
/// `oldEquation`, `newEquation`, `substeps`), so a persisted sequence can
/// be fed straight back through the normalizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalStep {
    /// 1-based position among its siblings
    pub index: usize,

    /// Raw machine-readable change type, empty for legacy steps
    #[serde(rename = "changeType", default)]
    pub change_type: String,

    /// Humanized change type
    #[serde(default)]
    pub label: String,

    #[serde(rename = "oldEquation", default)]
    pub from_text: String,

    #[serde(rename = "newEquation", default)]
    pub to_text: String,

    #[serde(default)]
    pub substeps: Vec<CanonicalStep>,
}

/// Result of one solve request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SolveOutcome {
    Solved {
        #[serde(rename = "finalText")]
        final_text: String,
        steps: Vec<CanonicalStep>,
    },
    Failed {
        reason: String,
    },
}

impl SolveOutcome {
    /// The line shown after "Solution:".
    pub fn solution_text(&self) -> &str {
        match self {
            SolveOutcome::Solved { final_text, .. } => final_text,
            SolveOutcome::Failed { reason } => reason,
        }
    }

    pub fn steps(&self) -> &[CanonicalStep] {
        match self {
            SolveOutcome::Solved { steps, .. } => steps,
            SolveOutcome::Failed { .. } => &[],
        }
    }

    pub fn is_solved(&self) -> bool {
        matches!(self, SolveOutcome::Solved { .. })
    }
}

impl RawStep {
    /// Classify a single step value.
    ///
    /// A string whose trimmed form starts with `[` or `{` is treated as a
    /// serialized sequence; use [`RawStep::from_element`] for members of a
    /// sequence, where strings are always legacy steps.
    pub fn from_value(value: &Value) -> RawStep {
        match value {
            Value::String(s) if looks_serialized(s) => RawStep::Serialized(s.clone()),
            other => RawStep::from_element(other),
        }
    }

    /// Classify one member of a step sequence.
    pub fn from_element(value: &Value) -> RawStep {
        match value {
            Value::String(s) => RawStep::Legacy(s.clone()),
            Value::Object(map) if is_structured(map) => {
                RawStep::Structured(StructuredStep::from_map(map))
            }
            other => RawStep::Other(other.clone()),
        }
    }
}

impl StructuredStep {
    fn from_map(map: &Map<String, Value>) -> StructuredStep {
        let change_type = match map.get("changeType") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };

        let substeps = match map.get("substeps") {
            Some(Value::Array(items)) => items.iter().map(RawStep::from_element).collect(),
            _ => Vec::new(),
        };

        StructuredStep {
            change_type,
            old_equation: map
                .get("oldEquation")
                .map_or(ExpressionNode::Empty, ExpressionNode::from_value),
            new_equation: map
                .get("newEquation")
                .map_or(ExpressionNode::Empty, ExpressionNode::from_value),
            substeps,
        }
    }
}

impl ExpressionNode {
    /// Classify a JSON node in the fixed priority order: null, string,
    /// `value`, `name`, `items`, `implicit` + `op`, `leftNode` + `rightNode`,
    /// then anything else.
    pub fn from_value(value: &Value) -> ExpressionNode {
        Self::classify(value, 0)
    }

    fn classify(value: &Value, depth: usize) -> ExpressionNode {
        if depth > MAX_DEPTH {
            return ExpressionNode::Unrenderable;
        }

        let map = match value {
            Value::Null => return ExpressionNode::Empty,
            Value::String(s) => return ExpressionNode::Text(s.clone()),
            Value::Object(map) => map,
            other => return ExpressionNode::Opaque(other.clone()),
        };

        if let Some(v) = field(map, "value") {
            return ExpressionNode::Value(text_form(v));
        }
        if let Some(name) = field(map, "name") {
            return ExpressionNode::Name(text_form(name));
        }
        if let Some(Value::Array(items)) = field(map, "items") {
            return ExpressionNode::List(
                items
                    .iter()
                    .map(|item| Self::classify(item, depth + 1))
                    .collect(),
            );
        }
        if let (Some(_), Some(op)) = (field(map, "implicit"), field(map, "op")) {
            let args = match field(map, "args") {
                Some(Value::Array(args)) => args
                    .iter()
                    .map(|arg| OperationArg::classify(arg, depth + 1))
                    .collect(),
                _ => Vec::new(),
            };
            return ExpressionNode::Operation {
                op: text_form(op),
                args,
            };
        }
        if let (Some(left), Some(right)) = (field(map, "leftNode"), field(map, "rightNode")) {
            let comparator = field(map, "comparator")
                .map(text_form)
                .unwrap_or_else(|| "=".to_string());
            return ExpressionNode::Comparison {
                left: Box::new(Self::classify(left, depth + 1)),
                right: Box::new(Self::classify(right, depth + 1)),
                comparator,
            };
        }

        ExpressionNode::Opaque(value.clone())
    }
}

impl OperationArg {
    fn classify(value: &Value, depth: usize) -> OperationArg {
        match value {
            Value::Object(map) => match field(map, "content") {
                Some(content) => {
                    OperationArg::Parenthesized(ExpressionNode::classify(content, depth + 1))
                }
                None => OperationArg::Plain(ExpressionNode::classify(value, depth)),
            },
            _ => OperationArg::Plain(ExpressionNode::classify(value, depth)),
        }
    }
}

/// A field counts as present only when it is set to something other than null.
fn field<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    map.get(key).filter(|v| !v.is_null())
}

fn text_form(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_structured(map: &Map<String, Value>) -> bool {
    ["changeType", "oldEquation", "newEquation"]
        .iter()
        .all(|key| field(map, key).is_some())
}

pub(crate) fn looks_serialized(s: &str) -> bool {
    let trimmed = s.trim_start();
    trimmed.starts_with('[') || trimmed.starts_with('{')
}
