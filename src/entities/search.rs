//! Two-stage catalog filtering: query (strict or AI keywords), then tag.

use serde::Serialize;

use crate::entities::medicine::{Medicine, TagStats, extract_tags};

/// What the caller currently has on screen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchState {
    pub query: String,
    pub ai: bool,
    pub active_tag: Option<String>,
    /// Keywords from the last applied expansion (or its fallback).
    pub keywords: Vec<String>,
}

impl SearchState {
    pub fn uses_keywords(&self) -> bool {
        self.ai && !self.keywords.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchView<'a> {
    pub query: String,
    pub ai: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_tag: Option<String>,
    /// Size of the full catalog.
    pub total: usize,
    /// Records passing the query stage, before the tag filter.
    pub query_matches: usize,
    /// Records passing both stages; unaffected by [`SearchView::truncate_results`].
    pub shown: usize,
    pub results: Vec<&'a Medicine>,
    /// Tag facet over the query stage, independent of the active tag.
    pub tags: Vec<TagStats>,
}

impl SearchView<'_> {
    /// Caps the listed records at `limit`, keeping every count intact.
    pub fn truncate_results(&mut self, limit: Option<usize>) {
        if let Some(n) = limit {
            self.results.truncate(n);
        }
    }
}

fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

fn matches_literal(medicine: &Medicine, query_lower: &str) -> bool {
    contains_ci(&medicine.generic_name, query_lower)
        || contains_ci(&medicine.brand_name, query_lower)
        || contains_ci(&medicine.company, query_lower)
        || contains_ci(&medicine.category, query_lower)
        || medicine.tags.iter().any(|t| contains_ci(t, query_lower))
}

fn matches_any_keyword(medicine: &Medicine, keywords_lower: &[String]) -> bool {
    let text = format!(
        "{} {} {} {} {} {}",
        medicine.generic_name,
        medicine.brand_name,
        medicine.category,
        medicine.company,
        medicine.specification,
        medicine.tags.join(" ")
    )
    .to_lowercase();
    keywords_lower.iter().any(|k| text.contains(k.as_str()))
}

/// Stage A: filters the full catalog by the query.
pub fn filter_by_query<'a>(medicines: &'a [Medicine], state: &SearchState) -> Vec<&'a Medicine> {
    if state.query.trim().is_empty() {
        return medicines.iter().collect();
    }

    if state.uses_keywords() {
        let keywords: Vec<String> = state.keywords.iter().map(|k| k.to_lowercase()).collect();
        return medicines
            .iter()
            .filter(|m| matches_any_keyword(m, &keywords))
            .collect();
    }

    let query = state.query.to_lowercase();
    medicines
        .iter()
        .filter(|m| matches_literal(m, &query))
        .collect()
}

/// Stage B: keeps records carrying `tag` exactly.
pub fn filter_by_tag<'a>(medicines: &[&'a Medicine], tag: Option<&str>) -> Vec<&'a Medicine> {
    match tag {
        Some(tag) => medicines.iter().copied().filter(|m| m.has_tag(tag)).collect(),
        None => medicines.to_vec(),
    }
}

/// Runs both stages and recomputes the tag facet from stage A.
pub fn run<'a>(medicines: &'a [Medicine], state: &SearchState) -> SearchView<'a> {
    let by_query = filter_by_query(medicines, state);
    let tags = extract_tags(by_query.iter().copied());
    let results = filter_by_tag(&by_query, state.active_tag.as_deref());

    SearchView {
        query: state.query.clone(),
        ai: state.ai,
        keywords: if state.ai {
            state.keywords.clone()
        } else {
            Vec::new()
        },
        active_tag: state.active_tag.clone(),
        total: medicines.len(),
        query_matches: by_query.len(),
        shown: results.len(),
        results,
        tags,
    }
}

/// A search submission awaiting (or not needing) keyword expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub generation: u64,
    pub query: String,
    pub needs_expansion: bool,
}

/// Owns the [`SearchState`] and applies expansion results last-submitted-wins.
#[derive(Debug, Default)]
pub struct SearchSession {
    state: SearchState,
    generation: u64,
}

impl SearchSession {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn state(&self) -> &SearchState {
        &self.state
    }

    /// Records a new query, superseding any expansion still in flight.
    ///
    /// When AI mode is requested but unavailable the literal query becomes
    /// the sole keyword immediately.
    pub fn submit(&mut self, query: &str, ai: bool, ai_available: bool) -> Submission {
        self.generation += 1;
        self.state.query = query.to_string();
        self.state.ai = ai;
        self.state.keywords.clear();

        let needs_expansion = if query.trim().is_empty() || !ai {
            false
        } else if !ai_available {
            self.state.keywords = vec![query.to_string()];
            false
        } else {
            true
        };

        Submission {
            generation: self.generation,
            query: query.to_string(),
            needs_expansion,
        }
    }

    /// Applies keywords for `generation`; returns `false` and changes nothing when a newer query exists.
    pub fn apply_expansion(&mut self, generation: u64, keywords: Vec<String>) -> bool {
        if generation != self.generation {
            return false;
        }
        self.state.keywords = keywords;
        true
    }

    pub fn select_tag(&mut self, tag: Option<&str>) {
        self.state.active_tag = tag.map(str::to_string);
    }

    pub fn view<'a>(&self, medicines: &'a [Medicine]) -> SearchView<'a> {
        run(medicines, &self.state)
    }
}
