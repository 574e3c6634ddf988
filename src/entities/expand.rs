//! AI query expansion: turn a free-text complaint into catalog keywords.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::RefMedError;
use crate::sources::gemini::{GeminiClient, Transport};

/// Categories offered to the model as vocabulary hints.
pub const CATEGORY_SAMPLE_LIMIT: usize = 50;

/// API key plus the transport it travels over.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub api_key: String,
    pub transport: Transport,
}

impl Credentials {
    /// Returns `None` for a blank key, which makes AI mode unavailable.
    pub fn new(api_key: &str, base_url: Option<&str>) -> Option<Self> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return None;
        }
        Some(Self {
            api_key: api_key.to_string(),
            transport: Transport::with_alternate_base(base_url),
        })
    }
}

/// Anything that can answer a keyword prompt.
#[async_trait]
pub trait QueryExpander: Send + Sync {
    async fn keywords(&self, prompt: &str) -> Result<Vec<String>, RefMedError>;
}

#[async_trait]
impl QueryExpander for GeminiClient {
    async fn keywords(&self, prompt: &str) -> Result<Vec<String>, RefMedError> {
        self.generate_keywords(prompt).await
    }
}

pub fn build_prompt(query: &str, categories: &[String]) -> String {
    let sample = categories
        .iter()
        .take(CATEGORY_SAMPLE_LIMIT)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("、");

    format!(
        "你是一个专业的医药搜索助手。用户正在查询“原研药（参比制剂）”数据库。\n\
         \n\
         用户输入: \"{query}\"\n\
         \n\
         数据库包含的分类示例: {sample}\n\
         \n\
         任务:\n\
         1. 分析用户查询的医疗意图（例如：如果用户输入“胃痛”，意图可能是“胃炎”、“溃疡”、“抑酸药”、“质子泵抑制剂”）。\n\
         2. 返回 5-10 个关键词，这些关键词可能出现在药品的“通用名”、“商品名”、“分类”、“生产厂家”、“规格”或“标签”字段中。\n\
         3. **必须至少包含一个中文关键词**，如果适用也可以包含英文通用名。\n\
         4. 如果查询暗示了特定的分类，请包含该分类名称。\n\
         \n\
         输出 JSON 格式:\n\
         {{\"keywords\": [\"关键词1\", \"关键词2\"]}}\n"
    )
}

/// Puts the literal query at the front unless the model already returned it.
fn with_literal_query(query: &str, mut keywords: Vec<String>) -> Vec<String> {
    if !keywords.iter().any(|k| k == query) {
        keywords.insert(0, query.to_string());
    }
    keywords
}

/// Expands `query` through `source`, degrading to `[query]` on any failure.
pub async fn expand_with(
    source: &dyn QueryExpander,
    query: &str,
    categories: &[String],
) -> Vec<String> {
    let prompt = build_prompt(query, categories);
    match source.keywords(&prompt).await {
        Ok(keywords) => {
            let keywords = with_literal_query(query, keywords);
            debug!(query = %query, count = keywords.len(), "Query expanded");
            keywords
        }
        Err(err) => {
            warn!(query = %query, "Keyword expansion failed, using literal query: {err}");
            vec![query.to_string()]
        }
    }
}

/// Expands `query` with the configured model.
///
/// Never fails: a missing credential, transport error, or malformed reply
/// all yield the single-element fallback `[query]`.
pub async fn expand(
    query: &str,
    categories: &[String],
    credentials: Option<&Credentials>,
) -> Vec<String> {
    if query.trim().is_empty() {
        return vec![query.to_string()];
    }
    let Some(credentials) = credentials else {
        warn!("No Gemini API key configured; skipping keyword expansion");
        return vec![query.to_string()];
    };
    let client = match GeminiClient::new(&credentials.api_key, credentials.transport.clone()) {
        Ok(client) => client,
        Err(err) => {
            warn!("Gemini client unavailable: {err}");
            return vec![query.to_string()];
        }
    };
    expand_with(&client, query, categories).await
}
