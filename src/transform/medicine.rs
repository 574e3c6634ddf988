use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::entities::medicine::{Medicine, UNCATEGORIZED, UNKNOWN_COMPANY, UNKNOWN_GENERIC_NAME};

/// Candidate source keys for one target field, most specific first.
struct Field {
    keys: &'static [&'static str],
    default: &'static str,
}

const GENERIC_NAME: Field = Field {
    keys: &["通用名", "commonName", "name", "名称"],
    default: UNKNOWN_GENERIC_NAME,
};
const BRAND_NAME: Field = Field {
    keys: &["商品名", "brandName", "tradeName"],
    default: "",
};
const COMPANY: Field = Field {
    keys: &["生产厂家", "company", "manufacturer", "厂家"],
    default: UNKNOWN_COMPANY,
};
const SPECIFICATION: Field = Field {
    keys: &["规格", "specification", "spec"],
    default: "",
};
const CATEGORY: Field = Field {
    keys: &["治疗类别", "category", "class", "分类"],
    default: UNCATEGORIZED,
};
const REGISTRATION_NUM_KEYS: &[&str] = &["注册证号", "approvalNumber", "licenseNumber"];
const SOURCE_COUNTRY_KEYS: &[&str] = &["产地", "source", "country"];
const TAG_KEYS: &[&str] = &["tags", "标签", "tag"];

fn tag_separator() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[,，\s]+").expect("valid regex"))
}

/// Feed values count as absent when null, false, zero, or an empty string.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn first_present<'a>(record: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| record.get(*key))
        .find(|value| is_present(value))
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items.iter().map(stringify).collect::<Vec<_>>().join(","),
        Value::Object(_) => value.to_string(),
    }
}

fn resolve_optional(record: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    first_present(record, keys)
        .map(|v| stringify(v).trim().to_string())
        .filter(|v| !v.is_empty())
}

fn resolve(record: &Map<String, Value>, field: &Field) -> String {
    resolve_optional(record, field.keys).unwrap_or_else(|| field.default.to_string())
}

/// Splits a feed tag value into trimmed, non-empty tags.
///
/// Lists keep one tag per element; strings split on ASCII or full-width
/// commas and whitespace runs. Any other shape carries no tags.
pub fn parse_tags(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| stringify(item).trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        Some(Value::String(s)) => tag_separator()
            .split(s)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Maps one feed record onto a [`Medicine`]. Never fails: every field falls back independently.
pub fn normalize(raw: Value, index: usize) -> Medicine {
    let empty = Map::new();
    let record = raw.as_object().unwrap_or(&empty);

    let generic_name = resolve(record, &GENERIC_NAME);
    let brand_name = resolve(record, &BRAND_NAME);
    let company = resolve(record, &COMPANY);
    let specification = resolve(record, &SPECIFICATION);
    let category = resolve(record, &CATEGORY);
    let tags = parse_tags(first_present(record, TAG_KEYS));
    let registration_num = resolve_optional(record, REGISTRATION_NUM_KEYS);
    let source_country = resolve_optional(record, SOURCE_COUNTRY_KEYS);

    Medicine {
        id: format!("med-{index}"),
        generic_name,
        brand_name,
        company,
        specification,
        category,
        tags,
        registration_num,
        source_country,
        original_data: raw,
    }
}

pub fn normalize_all(records: Vec<Value>) -> Vec<Medicine> {
    records
        .into_iter()
        .enumerate()
        .map(|(index, raw)| normalize(raw, index))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_prefers_chinese_keys_then_english() {
        let med = normalize(
            json!({
                "通用名": " 奥美拉唑肠溶胶囊 ",
                "name": "omeprazole",
                "brandName": "洛赛克",
                "生产厂家": "阿斯利康",
                "spec": "20mg",
                "category": "消化系统",
                "注册证号": "H20140000",
                "country": "瑞典"
            }),
            3,
        );
        assert_eq!(med.id, "med-3");
        assert_eq!(med.generic_name, "奥美拉唑肠溶胶囊");
        assert_eq!(med.brand_name, "洛赛克");
        assert_eq!(med.company, "阿斯利康");
        assert_eq!(med.specification, "20mg");
        assert_eq!(med.category, "消化系统");
        assert_eq!(med.registration_num.as_deref(), Some("H20140000"));
        assert_eq!(med.source_country.as_deref(), Some("瑞典"));
    }

    #[test]
    fn normalize_defaults_every_missing_field() {
        let raw = json!({"unrelated": "value"});
        let med = normalize(raw.clone(), 0);
        assert_eq!(med.generic_name, UNKNOWN_GENERIC_NAME);
        assert_eq!(med.brand_name, "");
        assert_eq!(med.company, UNKNOWN_COMPANY);
        assert_eq!(med.specification, "");
        assert_eq!(med.category, UNCATEGORIZED);
        assert!(med.tags.is_empty());
        assert!(med.registration_num.is_none());
        assert!(med.source_country.is_none());
        assert_eq!(med.original_data, raw);
    }

    #[test]
    fn normalize_tolerates_non_object_records() {
        let med = normalize(json!("just a string"), 7);
        assert_eq!(med.id, "med-7");
        assert_eq!(med.category, UNCATEGORIZED);
        assert_eq!(med.original_data, json!("just a string"));
    }

    #[test]
    fn normalize_skips_falsy_candidates_and_stringifies_scalars() {
        let med = normalize(
            json!({
                "通用名": "",
                "commonName": null,
                "name": "阿司匹林",
                "规格": 100,
                "治疗类别": false,
                "class": "解热镇痛",
                "注册证号": 0,
                "approvalNumber": "  "
            }),
            1,
        );
        assert_eq!(med.generic_name, "阿司匹林");
        assert_eq!(med.specification, "100");
        assert_eq!(med.category, "解热镇痛");
        assert!(med.registration_num.is_none());
    }

    #[test]
    fn structured_scalar_fields_join_arrays_and_keep_object_json() {
        let med = normalize(
            json!({
                "规格": ["10mg", 20, ["5ml"]],
                "产地": {"country": "德国"}
            }),
            0,
        );
        assert_eq!(med.specification, "10mg,20,5ml");
        assert_eq!(med.source_country.as_deref(), Some(r#"{"country":"德国"}"#));
    }

    #[test]
    fn whitespace_only_category_falls_back_to_placeholder() {
        let med = normalize(json!({"治疗类别": "   "}), 0);
        assert_eq!(med.category, UNCATEGORIZED);
    }

    #[test]
    fn parse_tags_splits_mixed_separators() {
        let tags = parse_tags(Some(&json!("a, b  c，d")));
        assert_eq!(tags, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn parse_tags_handles_full_width_space_and_edges() {
        let tags = parse_tags(Some(&json!("，原研\u{3000}进口 ,")));
        assert_eq!(tags, vec!["原研", "进口"]);
    }

    #[test]
    fn parse_tags_trims_list_elements_and_drops_empties() {
        let tags = parse_tags(Some(&json!([" 抗生素 ", "", 3, null, "口服"])));
        assert_eq!(tags, vec!["抗生素", "3", "口服"]);
    }

    #[test]
    fn parse_tags_keeps_duplicates() {
        let tags = parse_tags(Some(&json!("进口,进口")));
        assert_eq!(tags, vec!["进口", "进口"]);
    }

    #[test]
    fn parse_tags_ignores_other_shapes() {
        assert!(parse_tags(Some(&json!(42))).is_empty());
        assert!(parse_tags(Some(&json!({"a": 1}))).is_empty());
        assert!(parse_tags(None).is_empty());
    }

    #[test]
    fn normalize_reads_tags_from_alternate_keys() {
        let med = normalize(json!({"标签": "原研 进口"}), 0);
        assert_eq!(med.tags, vec!["原研", "进口"]);
    }

    #[test]
    fn normalize_all_assigns_ingestion_order_ids() {
        let meds = normalize_all(vec![json!({"name": "a"}), json!({"name": "a"})]);
        let ids: Vec<&str> = meds.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["med-0", "med-1"]);
    }
}
