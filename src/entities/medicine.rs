use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use icu_collator::{Collator, CollatorOptions};
use icu_locid::locale;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::RefMedError;
use crate::sources::catalog::CatalogClient;
use crate::transform;

pub const UNKNOWN_GENERIC_NAME: &str = "未知名称";
pub const UNKNOWN_COMPANY: &str = "未知厂商";
/// Category assigned when the feed record names none; never listed as a facet.
pub const UNCATEGORIZED: &str = "未分类";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medicine {
    pub id: String,
    pub generic_name: String,
    pub brand_name: String,
    pub company: String,
    pub specification: String,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_num: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_country: Option<String>,
    #[serde(default)]
    pub original_data: serde_json::Value,
}

impl Medicine {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagStats {
    pub name: String,
    pub count: usize,
}

/// Downloads and normalizes the full catalog.
pub async fn load_catalog(url: Option<&str>) -> Result<Vec<Medicine>, RefMedError> {
    let client = CatalogClient::new(url)?;
    let records = client.fetch_records().await?;
    let medicines = transform::medicine::normalize_all(records);
    debug!(url = client.url(), count = medicines.len(), "Catalog loaded");
    Ok(medicines)
}

fn zh_collator() -> Option<Collator> {
    match Collator::try_new(&locale!("zh").into(), CollatorOptions::new()) {
        Ok(collator) => Some(collator),
        Err(err) => {
            warn!("Chinese collation unavailable, falling back to code point order: {err}");
            None
        }
    }
}

/// Distinct categories in pinyin order, without the placeholder.
pub fn extract_categories(medicines: &[Medicine]) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut out: Vec<String> = medicines
        .iter()
        .map(|m| m.category.as_str())
        .filter(|c| !c.is_empty() && *c != UNCATEGORIZED)
        .filter(|c| seen.insert(*c))
        .map(str::to_string)
        .collect();

    let collator = zh_collator();
    out.sort_by(|a, b| {
        let primary = collator
            .as_ref()
            .map_or(Ordering::Equal, |c| c.compare(a, b));
        primary.then_with(|| a.cmp(b))
    });
    out
}

/// Tag frequencies, most frequent first; equal counts keep first-seen order.
///
/// A record listing the same tag twice counts twice.
pub fn extract_tags<'a, I>(medicines: I) -> Vec<TagStats>
where
    I: IntoIterator<Item = &'a Medicine>,
{
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut stats: Vec<TagStats> = Vec::new();

    for tag in medicines.into_iter().flat_map(|m| m.tags.iter()) {
        if tag.is_empty() {
            continue;
        }
        match index.get(tag.as_str()) {
            Some(&pos) => stats[pos].count += 1,
            None => {
                index.insert(tag.as_str(), stats.len());
                stats.push(TagStats {
                    name: tag.clone(),
                    count: 1,
                });
            }
        }
    }

    stats.sort_by(|a, b| b.count.cmp(&a.count));
    stats
}
