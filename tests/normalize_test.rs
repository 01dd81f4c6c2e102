use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use stepwise::error::SolverError;
use stepwise::session::{INVALID_EQUATION, solve};
use stepwise::{
    CanonicalStep, SolveOutcome, humanize, normalize_str, normalize_value, render_expression,
    render_lines, to_persisted,
};

fn comparison(left: &str, right: &str) -> Value {
    json!({
        "leftNode": { "value": left },
        "rightNode": { "value": right },
        "comparator": "=",
    })
}

fn step(change_type: &str, from: Value, to: Value) -> Value {
    json!({
        "changeType": change_type,
        "oldEquation": from,
        "newEquation": to,
        "substeps": [],
    })
}

/// (label, fromText, toText) for every step, depth-first.
fn texts(steps: &[CanonicalStep]) -> Vec<(String, String, String)> {
    let mut out = Vec::new();
    for s in steps {
        out.push((s.label.clone(), s.from_text.clone(), s.to_text.clone()));
        out.extend(texts(&s.substeps));
    }
    out
}

#[test]
fn legacy_strings_become_bare_steps() {
    for text in ["x = 1", "2x + 3 = 5", "", "not an equation at all"] {
        let steps = normalize_value(&json!([text]));
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].label, "");
        assert_eq!(steps[0].from_text, "");
        assert_eq!(steps[0].to_text, text);
        assert_eq!(steps[0].index, 1);
    }
}

#[test]
fn change_types_are_humanized() {
    assert_eq!(humanize("ADD_CONSTANT"), "Add Constant");
    assert_eq!(humanize("SIMPLIFY_LEFT_SIDE"), "Simplify Left Side");
    assert_eq!(humanize(""), "");

    let steps = normalize_value(&json!([step(
        "ADD_CONSTANT",
        comparison("x", "1"),
        comparison("x", "2")
    )]));
    assert_eq!(steps[0].label, "Add Constant");
    assert_eq!(steps[0].change_type, "ADD_CONSTANT");
}

#[test]
fn comparison_and_operation_render() {
    assert_eq!(render_expression(&comparison("x", "1")), "x = 1");

    let product = json!({
        "op": "*",
        "implicit": true,
        "args": [{ "value": "2" }, { "value": "x" }],
    });
    assert_eq!(render_expression(&product), "2 × x");
}

#[test]
fn nested_equation_renders_in_full() {
    let equation = json!({
        "leftNode": {
            "op": "+",
            "implicit": false,
            "args": [
                { "op": "*", "implicit": true, "args": [{ "value": 2 }, { "name": "x" }] },
                { "content": { "op": "-", "implicit": false, "args": [{ "value": 3 }, { "name": "y" }] } },
            ],
        },
        "rightNode": { "value": 7 },
        "comparator": ">=",
    });
    assert_eq!(render_expression(&equation), "2 × x + (3 - y) >= 7");
}

#[test]
fn persisted_steps_normalize_back_to_the_same_text() {
    let raw = json!([
        "x + 1 = 2",
        {
            "changeType": "SUBTRACT_FROM_BOTH_SIDES",
            "oldEquation": comparison("x + 1", "2"),
            "newEquation": comparison("x + 1 - 1", "2 - 1"),
            "substeps": [
                step("SIMPLIFY_LEFT_SIDE", comparison("x + 1 - 1", "2 - 1"), comparison("x", "2 - 1")),
                step("SIMPLIFY_RIGHT_SIDE", comparison("x", "2 - 1"), comparison("x", "1")),
            ],
        },
        step("SOLVE_EQUATION", "".into(), comparison("x", "1")),
    ]);

    let first = normalize_value(&raw);
    let stored = to_persisted(&first);
    let second = normalize_value(&stored);
    assert_eq!(texts(&second), texts(&first));
    assert_eq!(second, first);

    // Stores hand steps back as text too.
    let third = normalize_str(&stored.to_string());
    assert_eq!(third, first);
}

#[test]
fn normalizing_twice_gives_identical_steps() {
    let raw = json!([
        step("ADD_CONSTANT", comparison("x", "1"), comparison("x + 1", "2")),
        42,
        { "unexpected": true },
    ]);
    assert_eq!(normalize_value(&raw), normalize_value(&raw));
}

#[test]
fn substeps_number_from_one_at_every_level() {
    let raw = json!([
        "x + 1 = 2",
        {
            "changeType": "SUBTRACT_FROM_BOTH_SIDES",
            "oldEquation": comparison("x + 1", "2"),
            "newEquation": comparison("x", "1"),
            "substeps": [
                step("SIMPLIFY_LEFT_SIDE", comparison("x + 1 - 1", "2 - 1"), comparison("x", "2 - 1")),
                step("SIMPLIFY_RIGHT_SIDE", comparison("x", "2 - 1"), comparison("x", "1")),
            ],
        },
    ]);

    let steps = normalize_value(&raw);
    assert_eq!(steps[1].index, 2);
    assert_eq!(steps[1].substeps.len(), 2);
    assert_eq!(steps[1].substeps[0].index, 1);
    assert_eq!(steps[1].substeps[1].index, 2);
    assert_eq!(steps[1].substeps[1].label, "Simplify Right Side");
}

#[test]
fn broken_node_only_blanks_its_own_field() {
    let mut deep = json!({ "value": "x" });
    for _ in 0..300 {
        deep = json!({ "items": [deep] });
    }
    let raw = json!([
        step("ADD_CONSTANT", deep, comparison("x", "1")),
        "x = 1",
    ]);

    let steps = normalize_value(&raw);
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].from_text, "");
    assert_eq!(steps[0].to_text, "x = 1");
    assert_eq!(steps[0].label, "Add Constant");
}

#[tokio::test]
async fn solving_a_single_step_equation() {
    let solver = |equation: &str| -> Result<Value, SolverError> {
        assert_eq!(equation, "x + 1 = 2");
        Ok(json!([step(
            "SOLVE_EQUATION",
            comparison("x + 1", "2"),
            comparison("x", "1")
        )]))
    };

    let outcome = solve(&solver, "x + 1 = 2").await;
    let SolveOutcome::Solved { final_text, steps } = outcome else {
        panic!("expected a solution");
    };
    assert_eq!(final_text, "x = 1");
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].index, 1);
    assert_eq!(steps[0].label, "Solve Equation");
    assert_eq!(steps[0].to_text, "x = 1");
}

#[tokio::test]
async fn solver_failure_hides_its_detail() {
    let solver = |_: &str| -> Result<Value, SolverError> {
        Err(SolverError::Rejected("SyntaxError: unexpected token".into()))
    };
    assert_eq!(
        solve(&solver, "invalid equation").await,
        SolveOutcome::Failed {
            reason: INVALID_EQUATION.to_string()
        }
    );
}

#[tokio::test]
async fn two_step_solution_is_numbered_and_labelled() {
    let solver = |_: &str| -> Result<Value, SolverError> {
        Ok(json!([
            step("ADD_CONSTANT", "".into(), "x + 1 = 2".into()),
            step("SOLVE_EQUATION", "".into(), "x = 1".into()),
        ]))
    };

    let outcome = solve(&solver, "x + 1 = 2").await;
    let steps = outcome.steps();
    assert_eq!(steps.len(), 2);
    assert_eq!((steps[0].index, steps[0].label.as_str()), (1, "Add Constant"));
    assert_eq!((steps[1].index, steps[1].label.as_str()), (2, "Solve Equation"));
    assert_eq!(outcome.solution_text(), "x = 1");
}

#[tokio::test]
async fn solver_json_string_is_decoded() {
    let payload = json!([step("SOLVE_EQUATION", "".into(), comparison("x", "1"))]).to_string();
    let solver = move |_: &str| -> Result<Value, SolverError> { Ok(Value::String(payload.clone())) };

    assert_eq!(solve(&solver, "x + 1 = 2").await.solution_text(), "x = 1");
}

#[test]
fn text_layout_indents_substeps() {
    let raw = json!([{
        "changeType": "SUBTRACT_FROM_BOTH_SIDES",
        "oldEquation": comparison("x + 1", "2"),
        "newEquation": comparison("x", "1"),
        "substeps": ["x + 1 - 1 = 2 - 1"],
    }]);

    assert_eq!(
        render_lines(&normalize_value(&raw)),
        vec![
            "Step 1: Subtract From Both Sides",
            "  x + 1 = 2 → x = 1",
            "  Step 1",
            "    x + 1 - 1 = 2 - 1",
        ]
    );
}
