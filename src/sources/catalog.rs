use std::borrow::Cow;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::RefMedError;

const CATALOG_URL: &str = "https://cdn.jsdelivr.net/gh/lvwzhen/medicine@develop/data/tableData.json";
const CATALOG_API: &str = "catalog";
const CATALOG_URL_ENV: &str = "REFMED_DATA_URL";

/// Fetches the reference-drug dataset feed.
pub struct CatalogClient {
    client: reqwest_middleware::ClientWithMiddleware,
    url: Cow<'static, str>,
}

impl CatalogClient {
    /// Builds a client for `url`, or for `REFMED_DATA_URL` / the public feed when `None`.
    pub fn new(url: Option<&str>) -> Result<Self, RefMedError> {
        let url = match url.map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) => Cow::Owned(v.to_string()),
            None => crate::sources::env_base(CATALOG_URL, CATALOG_URL_ENV),
        };
        Ok(Self {
            client: crate::sources::shared_client()?,
            url,
        })
    }

    #[cfg(test)]
    fn new_for_test(url: String) -> Result<Self, RefMedError> {
        Ok(Self {
            client: crate::sources::shared_client()?,
            url: Cow::Owned(url),
        })
    }

    pub fn url(&self) -> &str {
        self.url.as_ref()
    }

    /// Downloads the feed and returns its records as raw JSON values.
    ///
    /// Transport failures, non-2xx statuses, and bodies that are not JSON are
    /// errors. A JSON document of any other shape than those accepted by
    /// [`records_from_document`] yields an empty list.
    pub async fn fetch_records(&self) -> Result<Vec<Value>, RefMedError> {
        debug!(url = %self.url, "Fetching catalog feed");
        let doc: Value =
            crate::sources::send_json(self.client.get(self.url.as_ref()), CATALOG_API).await?;
        let records = records_from_document(doc);
        debug!(count = records.len(), "Catalog feed decoded");
        Ok(records)
    }
}

/// Unwraps a feed document into its record list.
///
/// Accepts a top-level array, or an object whose first array-valued property
/// (in document order) holds the records.
pub fn records_from_document(doc: Value) -> Vec<Value> {
    match doc {
        Value::Array(items) => items,
        Value::Object(map) => {
            let found = map.into_iter().find_map(|(key, value)| match value {
                Value::Array(items) => {
                    debug!(property = %key, "Using wrapped record array");
                    Some(items)
                }
                _ => None,
            });
            found.unwrap_or_else(|| {
                warn!("Catalog document has no array-valued property");
                Vec::new()
            })
        }
        _ => {
            warn!("Catalog document is neither an array nor an object");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn records_from_top_level_array() {
        let records = records_from_document(json!([{"通用名": "A"}, {"通用名": "B"}]));
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn records_from_first_array_property() {
        let doc: Value = serde_json::from_str(
            r#"{"meta": {"v": 1}, "data": [{"name": "x"}], "other": [{}, {}]}"#,
        )
        .unwrap();
        let records = records_from_document(doc);
        assert_eq!(records, vec![json!({"name": "x"})]);
    }

    #[test]
    fn records_from_unrecognized_shape_is_empty() {
        assert!(records_from_document(json!({"meta": {"v": 1}})).is_empty());
        assert!(records_from_document(json!("text")).is_empty());
        assert!(records_from_document(Value::Null).is_empty());
    }

    #[tokio::test]
    async fn fetch_records_unwraps_wrapped_feed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tableData.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "list": [{"通用名": "奥美拉唑"}, {"通用名": "阿托伐他汀"}]
            })))
            .mount(&server)
            .await;

        let client = CatalogClient::new_for_test(format!("{}/tableData.json", server.uri())).unwrap();
        let records = client.fetch_records().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["通用名"], "奥美拉唑");
    }

    #[tokio::test]
    async fn fetch_records_surfaces_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.json"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let client = CatalogClient::new_for_test(format!("{}/missing.json", server.uri())).unwrap();
        let err = client.fetch_records().await.unwrap_err();
        assert!(matches!(err, RefMedError::Api { .. }));
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn fetch_records_rejects_non_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/broken.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{oops"))
            .mount(&server)
            .await;

        let client = CatalogClient::new_for_test(format!("{}/broken.json", server.uri())).unwrap();
        let err = client.fetch_records().await.unwrap_err();
        assert!(matches!(err, RefMedError::ApiJson { .. }));
    }
}
