use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use handlebars::{Handlebars, TemplateError};
use log::error;
use serde::Serialize;

use crate::identity::UserData;
use crate::render::{StepLine, flatten};
use crate::step::CanonicalStep;

/// Equations offered on the dashboard as one-click examples.
pub const EXAMPLE_EQUATIONS: [&str; 5] = [
    "x + 1 = 2",
    "2x - 3 = 7",
    "x^2 - 4 = 0",
    "3x + 2 = 11",
    "5x - 15 = 0",
];

const TEMPLATES: [(&str, &str); 7] = [
    ("landing", include_str!("./static/landing.hbs")),
    ("login", include_str!("./static/login.hbs")),
    ("register", include_str!("./static/register.hbs")),
    ("dashboard", include_str!("./static/dashboard.hbs")),
    ("study_guides", include_str!("./static/study_guides.hbs")),
    ("study_guide", include_str!("./static/study_guide.hbs")),
    ("profile", include_str!("./static/profile.hbs")),
];

const PARTIALS: [(&str, &str); 3] = [
    ("header", include_str!("./static/header.hbs")),
    ("footer", include_str!("./static/footer.hbs")),
    ("steps", include_str!("./static/steps.hbs")),
];

/// Server-rendered HTML pages.
pub struct Pages {
    registry: Handlebars<'static>,
}

impl Pages {
    /// Compile every page template.
    pub fn new() -> Result<Self, TemplateError> {
        let mut registry = Handlebars::new();
        for (name, source) in PARTIALS {
            registry.register_partial(name, source)?;
        }
        for (name, source) in TEMPLATES {
            registry.register_template_string(name, source)?;
        }
        Ok(Pages { registry })
    }

    /// Render a page, or a bare 500 if the template fails.
    pub fn render<T: Serialize>(&self, name: &str, data: &T) -> Response {
        match self.registry.render(name, data) {
            Ok(html) => Html(html).into_response(),
            Err(e) => {
                error!("failed to render {}: {}", name, e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to render page").into_response()
            }
        }
    }
}

/// A step row as the templates display it.
#[derive(Debug, Serialize)]
pub struct StepView {
    pub indent: usize,
    pub index: usize,
    pub label: String,
    pub text: String,
}

impl From<StepLine> for StepView {
    fn from(line: StepLine) -> Self {
        StepView {
            indent: line.depth * 2,
            index: line.index,
            label: line.label,
            text: line.text,
        }
    }
}

pub fn step_views(steps: &[CanonicalStep]) -> Vec<StepView> {
    flatten(steps).into_iter().map(StepView::from).collect()
}

/// Fields every page's header needs.
#[derive(Debug, Serialize)]
pub struct Chrome<'a> {
    pub user: Option<&'a UserData>,
    pub notice: Option<&'a str>,
    pub error: Option<&'a str>,
}
