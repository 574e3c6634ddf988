use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::RefMedError;

pub(crate) const GEMINI_API: &str = "gemini";
pub(crate) const GEMINI_DEFAULT_BASE: &str = "https://generativelanguage.googleapis.com";
pub(crate) const GEMINI_DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub(crate) const GEMINI_MODEL_ENV: &str = "REFMED_GEMINI_MODEL";
pub(crate) const GEMINI_KEY_DOCS: &str = "https://aistudio.google.com/app/apikey";
const GEMINI_API_VERSION: &str = "v1beta";
const GEMINI_KEY_HEADER: &str = "x-goog-api-key";
const GEMINI_KEY_PARAM: &str = "key";

/// How the API key travels to the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialPlacement {
    Header,
    HeaderAndQuery,
}

/// Where generation requests go and how they authenticate.
///
/// Requests keep their path (`v1beta/models/...`) and only swap the origin,
/// so a reverse proxy configured as the alternate base sees the same request
/// the official host would.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transport {
    base: String,
    placement: CredentialPlacement,
}

impl Transport {
    pub fn official() -> Self {
        Self {
            base: GEMINI_DEFAULT_BASE.to_string(),
            placement: CredentialPlacement::Header,
        }
    }

    /// Resolves a user-configured alternate base; blank or absent keeps the official host.
    ///
    /// Proxies differ in whether they forward the `x-goog-api-key` header or
    /// read the `key` query parameter, so alternate hosts receive both.
    pub fn with_alternate_base(base: Option<&str>) -> Self {
        let base = base
            .map(str::trim)
            .map(|v| v.trim_end_matches('/'))
            .filter(|v| !v.is_empty());
        match base {
            Some(v) if v != GEMINI_DEFAULT_BASE => Self {
                base: v.to_string(),
                placement: CredentialPlacement::HeaderAndQuery,
            },
            _ => Self::official(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    #[cfg(test)]
    pub fn placement(&self) -> CredentialPlacement {
        self.placement
    }

    fn generate_url(&self, model: &str) -> String {
        crate::sources::join_endpoint(
            &self.base,
            &format!("{GEMINI_API_VERSION}/models/{model}:generateContent"),
        )
    }

    fn authorize(
        &self,
        req: reqwest_middleware::RequestBuilder,
        api_key: &str,
    ) -> reqwest_middleware::RequestBuilder {
        let req = req.header(GEMINI_KEY_HEADER, api_key);
        match self.placement {
            CredentialPlacement::Header => req,
            CredentialPlacement::HeaderAndQuery => req.query(&[(GEMINI_KEY_PARAM, api_key)]),
        }
    }
}

pub struct GeminiClient {
    client: reqwest_middleware::ClientWithMiddleware,
    transport: Transport,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: &str, transport: Transport) -> Result<Self, RefMedError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(RefMedError::ApiKeyRequired {
                api: GEMINI_API.to_string(),
                env_var: crate::utils::settings::GEMINI_API_KEY_ENV.to_string(),
                docs_url: GEMINI_KEY_DOCS.to_string(),
            });
        }
        let model = crate::sources::env_value(GEMINI_MODEL_ENV)
            .unwrap_or_else(|| GEMINI_DEFAULT_MODEL.to_string());
        Ok(Self {
            client: crate::sources::shared_client()?,
            transport,
            api_key: api_key.to_string(),
            model,
        })
    }

    /// Asks the model for a `{"keywords": [...]}` object and returns the trimmed, non-empty entries.
    pub async fn generate_keywords(&self, prompt: &str) -> Result<Vec<String>, RefMedError> {
        let url = self.transport.generate_url(&self.model);
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "OBJECT",
                    "properties": {
                        "keywords": { "type": "ARRAY", "items": { "type": "STRING" } }
                    }
                }
            }
        });
        debug!(model = %self.model, base = %self.transport.base(), "Requesting keyword expansion");

        let req = self
            .transport
            .authorize(self.client.post(&url), &self.api_key)
            .json(&body);
        let resp: GenerateContentResponse = crate::sources::send_json(req, GEMINI_API).await?;

        let text = resp.text().ok_or_else(|| RefMedError::Api {
            api: GEMINI_API.to_string(),
            message: "Response contained no candidate text".into(),
        })?;
        parse_keywords(&text)
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateContentResponse {
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        if text.trim().is_empty() { None } else { Some(text) }
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KeywordsPayload {
    #[serde(default)]
    keywords: Vec<String>,
}

fn strip_code_fence(text: &str) -> &str {
    let t = text.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

pub(crate) fn parse_keywords(text: &str) -> Result<Vec<String>, RefMedError> {
    let payload: KeywordsPayload =
        serde_json::from_str(strip_code_fence(text)).map_err(|source| RefMedError::ApiJson {
            api: GEMINI_API.to_string(),
            source,
        })?;
    Ok(payload
        .keywords
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect())
}
