// src/source/rest.rs

//! PostgREST-style catalog API client.
//!
//! Every list request filters with `{identifier}=gt.{cursor}`. With no cursor
//! the empty string is used, which also excludes null and empty identifiers.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{Map, Value};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{
    CatalogEntity, Credentials, HierarchyRow, Scope, SourceConfig, parse_last_modified,
};
use crate::source::CatalogSource;

type Row = Map<String, Value>;

/// Catalog source backed by a hosted relational data API.
pub struct RestCatalogSource {
    client: Client,
    endpoint: Url,
    api_key: String,
    columns: SourceConfig,
}

impl RestCatalogSource {
    /// Create a source for `credentials.api_url`, querying `columns.table`.
    pub fn new(credentials: &Credentials, columns: &SourceConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("catalog-sitemap/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(columns.timeout_secs))
            .build()?;

        let mut endpoint = Url::parse(&credentials.api_url)?;
        endpoint
            .path_segments_mut()
            .map_err(|_| AppError::config("catalog API URL cannot be a base"))?
            .pop_if_empty()
            .extend(["rest", "v1", columns.table.as_str()]);

        Ok(Self {
            client,
            endpoint,
            api_key: credentials.api_key.clone(),
            columns: columns.clone(),
        })
    }

    /// Full table endpoint, e.g. `https://db.example.com/rest/v1/parts`.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Accept", "application/json")
    }

    /// `column=eq.value` filters for a scope.
    fn scope_filters(&self, scope: &Scope) -> Vec<(String, String)> {
        let mut filters = vec![(
            self.columns.manufacturer_column.clone(),
            format!("eq.{}", scope.manufacturer),
        )];
        if let Some(category) = &scope.category {
            filters.push((self.columns.category_column.clone(), format!("eq.{category}")));
        }
        if let Some(subcategory) = &scope.subcategory {
            filters.push((
                self.columns.subcategory_column.clone(),
                format!("eq.{subcategory}"),
            ));
        }
        filters
    }

    fn page_params(&self, select: String, after: Option<&str>, limit: usize) -> Vec<(String, String)> {
        let id = &self.columns.identifier_column;
        vec![
            ("select".to_string(), select),
            (id.clone(), format!("gt.{}", after.unwrap_or(""))),
            ("order".to_string(), format!("{id}.asc")),
            ("limit".to_string(), limit.to_string()),
        ]
    }

    async fn get_rows(&self, params: Vec<(String, String)>) -> Result<Vec<Row>> {
        let response = self
            .authorized(self.client.get(self.endpoint.clone()))
            .query(&params)
            .send()
            .await?;
        let bytes = check_status(response).await?.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn text(&self, row: &Row, column: &str) -> String {
        match row.get(column) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }

    fn to_entity(&self, row: &Row) -> Result<CatalogEntity> {
        let last_modified = self
            .columns
            .last_modified_column
            .as_deref()
            .and_then(|column| parse_last_modified(&self.text(row, column)));
        CatalogEntity::new(
            self.text(row, &self.columns.identifier_column),
            self.text(row, &self.columns.category_column),
            self.text(row, &self.columns.subcategory_column),
            last_modified,
        )
    }
}

#[async_trait]
impl CatalogSource for RestCatalogSource {
    async fn fetch_entities(
        &self,
        scope: &Scope,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<CatalogEntity>> {
        let mut select = vec![
            self.columns.identifier_column.as_str(),
            self.columns.category_column.as_str(),
            self.columns.subcategory_column.as_str(),
        ];
        if let Some(column) = &self.columns.last_modified_column {
            select.push(column);
        }

        let mut params = self.scope_filters(scope);
        params.extend(self.page_params(select.join(","), after, limit));

        let rows = self.get_rows(params).await?;
        rows.iter().map(|row| self.to_entity(row)).collect()
    }

    async fn fetch_hierarchy_rows(
        &self,
        manufacturer: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<HierarchyRow>> {
        let select = [
            self.columns.identifier_column.as_str(),
            self.columns.category_column.as_str(),
            self.columns.subcategory_column.as_str(),
        ]
        .join(",");

        let mut params = self.scope_filters(&Scope::manufacturer(manufacturer));
        params.extend(self.page_params(select, after, limit));

        let rows = self.get_rows(params).await?;
        Ok(rows
            .iter()
            .map(|row| HierarchyRow {
                identifier: self.text(row, &self.columns.identifier_column),
                category: self.text(row, &self.columns.category_column),
                subcategory: self.text(row, &self.columns.subcategory_column),
            })
            .collect())
    }

    async fn count(&self, scope: &Scope) -> Result<Option<u64>> {
        let mut params = self.scope_filters(scope);
        params.push(("select".to_string(), self.columns.identifier_column.clone()));

        let response = self
            .authorized(self.client.head(self.endpoint.clone()))
            .header("Prefer", "count=exact")
            .query(&params)
            .send()
            .await?;
        let response = check_status(response).await?;

        Ok(response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total))
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message: String = body.chars().take(200).collect();
    Err(AppError::Upstream {
        status: status.as_u16(),
        message: if message.is_empty() {
            status.to_string()
        } else {
            message
        },
    })
}

/// Total from a `Content-Range` header such as `0-24/3573` or `*/3573`.
fn parse_content_range_total(header: &str) -> Option<u64> {
    header.rsplit_once('/')?.1.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source_for(server: &MockServer) -> RestCatalogSource {
        let credentials = Credentials {
            api_url: server.uri(),
            api_key: "test-key".into(),
        };
        RestCatalogSource::new(&credentials, &SourceConfig::default()).unwrap()
    }

    #[test]
    fn test_content_range_total() {
        assert_eq!(parse_content_range_total("0-24/3573"), Some(3573));
        assert_eq!(parse_content_range_total("*/42"), Some(42));
        assert_eq!(parse_content_range_total("0-24/*"), None);
        assert_eq!(parse_content_range_total("garbage"), None);
    }

    #[test]
    fn test_endpoint_includes_table() {
        let credentials = Credentials {
            api_url: "https://db.example.com/".into(),
            api_key: "k".into(),
        };
        let source = RestCatalogSource::new(&credentials, &SourceConfig::default()).unwrap();
        assert_eq!(source.endpoint().as_str(), "https://db.example.com/rest/v1/parts");
    }

    #[tokio::test]
    async fn test_fetch_entities_sends_cursor_filters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/parts"))
            .and(header("apikey", "test-key"))
            .and(query_param("manufacturer", "eq.Amatom"))
            .and(query_param("category", "eq.Standoffs"))
            .and(query_param("subcategory", "eq.Nylon Standoffs"))
            .and(query_param("part_number", "gt.9907"))
            .and(query_param("order", "part_number.asc"))
            .and(query_param("limit", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {
                    "part_number": "9908-NY",
                    "category": "Standoffs",
                    "subcategory": "Nylon Standoffs",
                    "updated_at": "2025-02-01T10:00:00+00:00"
                },
                {
                    "part_number": 9909,
                    "category": "Standoffs",
                    "subcategory": "Nylon Standoffs",
                    "updated_at": null
                }
            ])))
            .mount(&server)
            .await;

        let source = source_for(&server);
        let scope = Scope::subcategory("Amatom", "Standoffs", "Nylon Standoffs");
        let entities = source.fetch_entities(&scope, Some("9907"), 3).await.unwrap();

        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].identifier, "9908-NY");
        assert_eq!(
            entities[0].last_modified,
            chrono::NaiveDate::from_ymd_opt(2025, 2, 1)
        );
        assert_eq!(entities[1].identifier, "9909");
        assert_eq!(entities[1].last_modified, None);
    }

    #[tokio::test]
    async fn test_first_page_uses_empty_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/parts"))
            .and(query_param("part_number", "gt."))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"part_number": "A1", "category": " Washers ", "subcategory": null}
            ])))
            .mount(&server)
            .await;

        let source = source_for(&server);
        let rows = source.fetch_hierarchy_rows("Amatom", None, 10).await.unwrap();
        assert_eq!(
            rows,
            vec![HierarchyRow {
                identifier: "A1".into(),
                category: " Washers ".into(),
                subcategory: String::new(),
            }]
        );
    }

    #[tokio::test]
    async fn test_padded_names_are_filtered_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/parts"))
            .and(query_param("subcategory", "eq.Brass Standoffs "))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"part_number": "B-ZZZ", "category": "Standoffs", "subcategory": "Brass Standoffs "}
            ])))
            .mount(&server)
            .await;

        let source = source_for(&server);
        let scope = Scope::subcategory("Amatom", "Standoffs", "Brass Standoffs ");
        let entities = source.fetch_entities(&scope, None, 10).await.unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].subcategory, "Brass Standoffs ");
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let source = source_for(&server);
        let err = source
            .fetch_entities(&Scope::manufacturer("Amatom"), None, 10)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Upstream { status: 503, .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_count_reads_content_range() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/rest/v1/parts"))
            .and(header("Prefer", "count=exact"))
            .and(query_param("subcategory", "eq.Brass Standoffs"))
            .respond_with(ResponseTemplate::new(200).insert_header("Content-Range", "*/122484"))
            .mount(&server)
            .await;

        let source = source_for(&server);
        let scope = Scope::subcategory("Amatom", "Standoffs", "Brass Standoffs");
        assert_eq!(source.count(&scope).await.unwrap(), Some(122_484));
    }
}
