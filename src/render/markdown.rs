use std::path::Path;
use std::sync::OnceLock;

use minijinja::{Environment, context};

use crate::entities::medicine::TagStats;
use crate::entities::search::SearchView;
use crate::error::RefMedError;
use crate::utils::settings::Settings;

static ENV: OnceLock<Environment<'static>> = OnceLock::new();

const WIKI_BASE: &str = "https://zh.wikipedia.org/wiki/";

/// Chinese Wikipedia link for a drug name, percent-encoded as one path segment.
pub fn wiki_url(name: &str) -> String {
    let Ok(mut url) = reqwest::Url::parse(WIKI_BASE) else {
        return WIKI_BASE.to_string();
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push(name.trim());
    }
    url.to_string()
}

fn env() -> Result<&'static Environment<'static>, RefMedError> {
    if let Some(env) = ENV.get() {
        return Ok(env);
    }

    let mut env = Environment::new();
    env.add_filter("wiki_url", |name: String| -> String { wiki_url(&name) });
    env.add_template("search.md.j2", include_str!("../../templates/search.md.j2"))?;
    env.add_template("tags.md.j2", include_str!("../../templates/tags.md.j2"))?;
    env.add_template(
        "categories.md.j2",
        include_str!("../../templates/categories.md.j2"),
    )?;
    env.add_template(
        "keywords.md.j2",
        include_str!("../../templates/keywords.md.j2"),
    )?;
    env.add_template(
        "settings.md.j2",
        include_str!("../../templates/settings.md.j2"),
    )?;

    Ok(ENV.get_or_init(|| env))
}

/// Renders the status line, tag cloud, and result cards.
///
/// `limit` caps the number of cards only; counts always describe the full result.
pub fn search_markdown(view: &SearchView<'_>, limit: Option<usize>) -> Result<String, RefMedError> {
    let tmpl = env()?.get_template("search.md.j2")?;
    let shown = view.shown;
    let listed = view.results.len();
    let cards = match limit {
        Some(n) => &view.results[..listed.min(n)],
        None => &view.results[..],
    };
    Ok(tmpl.render(context! {
        query => view.query.trim(),
        ai => view.ai,
        keywords => &view.keywords,
        active_tag => &view.active_tag,
        shown => shown,
        total => view.total,
        tags => &view.tags,
        cards => cards,
        hidden => shown - cards.len(),
    })?)
}

pub fn tags_markdown(query: &str, tags: &[TagStats]) -> Result<String, RefMedError> {
    let tmpl = env()?.get_template("tags.md.j2")?;
    Ok(tmpl.render(context! {
        query => query.trim(),
        tags => tags,
    })?)
}

pub fn categories_markdown(categories: &[String]) -> Result<String, RefMedError> {
    let tmpl = env()?.get_template("categories.md.j2")?;
    Ok(tmpl.render(context! { categories => categories })?)
}

pub fn keywords_markdown(query: &str, keywords: &[String]) -> Result<String, RefMedError> {
    let tmpl = env()?.get_template("keywords.md.j2")?;
    let fallback = keywords.len() == 1 && keywords[0] == query;
    Ok(tmpl.render(context! {
        query => query,
        keywords => keywords,
        fallback => fallback,
    })?)
}

pub fn settings_markdown(settings: &Settings, path: &Path) -> Result<String, RefMedError> {
    let tmpl = env()?.get_template("settings.md.j2")?;
    Ok(tmpl.render(context! {
        api_key => settings.masked_api_key(),
        base_url => &settings.base_url,
        path => path.display().to_string(),
        ai_available => settings.ai_available(),
    })?)
}
