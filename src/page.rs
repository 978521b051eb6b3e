use std::sync::LazyLock;

use deck_media::{CompressOptions, Preset};
use minijinja::{Environment, context};

use crate::workspace::ALLOWED_EXTENSION;

const INDEX_TEMPLATE: &str = include_str!("../templates/index.html");

static TEMPLATES: LazyLock<Environment<'static>> = LazyLock::new(Environment::new);

/// Upload form, optionally with an error banner.
pub(crate) fn index(error: Option<&str>) -> anyhow::Result<String> {
    // The .html name turns on auto-escaping.
    let template = TEMPLATES.template_from_named_str("index.html", INDEX_TEMPLATE)?;
    let html = template.render(context! {
        error => error,
        allowed => ALLOWED_EXTENSION,
        defaults => CompressOptions::default(),
        presets => Preset::ALL.map(|p| p.as_str()),
    })?;
    Ok(html)
}
