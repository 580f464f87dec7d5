//! HTML for the single-page UI, rendered from an embedded tera template.

use facematch_core::MatchScore;
use serde::Serialize;
use tera::{Context, Tera};

const TEMPLATE_NAME: &str = "index.html";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct Banner {
    pub level: Level,
    pub text: String,
}

impl Banner {
    pub fn success(text: impl Into<String>) -> Self {
        Self { level: Level::Success, text: text.into() }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self { level: Level::Warning, text: text.into() }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self { level: Level::Error, text: text.into() }
    }
}

/// An image shown in the result columns.
#[derive(Debug, Clone, Serialize)]
pub struct Figure {
    pub src: String,
    pub caption: String,
}

/// Everything the page shows below the form.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultView {
    pub banners: Vec<Banner>,
    #[serde(skip)]
    pub score: Option<MatchScore>,
    pub figures: Vec<Figure>,
}

impl ResultView {
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            banners: vec![Banner::error(text)],
            ..Self::default()
        }
    }
}

#[derive(Serialize)]
struct PageContext<'a> {
    database: &'a str,
    result: Option<&'a ResultView>,
    breakdown: Option<Breakdown>,
}

/// Feature percentages formatted to two decimals.
#[derive(Serialize)]
struct Breakdown {
    nose: String,
    eyes: String,
    mouth: String,
}

impl From<&MatchScore> for Breakdown {
    fn from(score: &MatchScore) -> Self {
        let f = &score.features;
        Self {
            nose: format!("{:.2}", f.nose),
            eyes: format!("{:.2}", f.eyes),
            mouth: format!("{:.2}", f.mouth),
        }
    }
}

/// Render the full page: upload form, then the result of the last submission.
///
/// The template name ends in `.html`, so tera escapes every interpolated value.
pub fn render(database: &str, result: Option<&ResultView>) -> Result<String, tera::Error> {
    let mut tera = Tera::default();
    tera.add_raw_template(TEMPLATE_NAME, include_str!("../templates/index.html.tera"))?;

    let page = PageContext {
        database,
        result,
        breakdown: result.and_then(|r| r.score.as_ref()).map(Breakdown::from),
    };
    let context = Context::from_serialize(&page)?;
    tera.render(TEMPLATE_NAME, &context)
}
