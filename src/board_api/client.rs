//! Paginated client for the board API `/Office` endpoint.
//!
//! Pages are requested strictly in sequence with a fixed `top`. `skip`
//! advances by the requested page size, and the walk ends on the first page
//! that returns fewer rows than requested. A dataset that is an exact
//! multiple of the page size therefore costs one extra (empty) request.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use super::models::{parse_office_page, ApiOffice};
use super::token::TokenProvider;
use super::FetchError;
use crate::types::{Config, FetchedOffices, OfficeFilter, OfficeRecord, OfficeStatus};

const OFFICE_PATH: &str = "Office";

/// Anything that can produce office batches for the sync orchestrator.
#[async_trait]
pub trait OfficeSource: Send + Sync {
    async fn fetch_offices(&self, filter: &OfficeFilter) -> Result<FetchedOffices, FetchError>;
}

pub struct BoardApiClient {
    http: reqwest::Client,
    base_url: String,
    tokens: TokenProvider,
    page_size: u32,
    region: Option<String>,
}

impl BoardApiClient {
    /// Build a client from configuration. Every request carries the configured timeout.
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()?;
        let tokens = TokenProvider::new(
            http.clone(),
            &config.token_url,
            config.client_id.clone(),
            config.client_secret.clone(),
        );

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            tokens,
            page_size: config.page_size.max(1),
            region: config.region(),
        })
    }

    fn office_url(&self) -> Result<url::Url, FetchError> {
        Ok(url::Url::parse(&format!("{}/{}", self.base_url, OFFICE_PATH))?)
    }

    /// Fetch one page of offices.
    async fn fetch_page(
        &self,
        token: &str,
        filter: &OfficeFilter,
        region: Option<&str>,
        skip: u64,
    ) -> Result<Vec<ApiOffice>, FetchError> {
        let mut query: Vec<(&str, String)> = vec![
            ("skip", skip.to_string()),
            ("top", self.page_size.to_string()),
        ];
        if let Some(since) = filter.since.as_deref() {
            query.push(("modificationTimestamp", since.to_string()));
        }
        if let Some(region) = region {
            query.push(("officeAOR", region.to_string()));
        }
        query.push(("officeStatus", filter.status.as_str().to_string()));

        let resp = self
            .http
            .get(self.office_url()?)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&query)
            .send()
            .await?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.text().await?;
        parse_office_page(&body)
    }

    /// Walk every page matching `filter`, returning enriched Firm records
    /// (Active) or bare ids (Inactive). Any page failure aborts the walk.
    pub async fn fetch_all(&self, filter: &OfficeFilter) -> Result<FetchedOffices, FetchError> {
        let token = self.tokens.get_valid_token().await?;
        let region = filter.region.clone().or_else(|| self.region.clone());

        let mut active: Vec<OfficeRecord> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut inactive: Vec<String> = Vec::new();
        let mut skip: u64 = 0;
        let mut pages = 0u32;

        loop {
            let page = match self
                .fetch_page(&token, filter, region.as_deref(), skip)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    // A revoked token would otherwise be reused until its expiry.
                    if matches!(e, FetchError::Status { status: 401, .. }) {
                        self.tokens.invalidate().await;
                    }
                    log::warn!(
                        "Office fetch ({}) failed at skip={} after {} page(s): {}",
                        filter.status.as_str(),
                        skip,
                        pages,
                        e
                    );
                    return Err(e);
                }
            };
            pages += 1;
            let returned = page.len();

            for office in page {
                match filter.status {
                    OfficeStatus::Active => {
                        if !office.is_firm() {
                            log::debug!(
                                "Skipping office {:?} with type {:?}",
                                office.office_national_association_id,
                                office.office_type
                            );
                            continue;
                        }
                        let Some(record) = office.into_record() else {
                            log::warn!("Skipping Firm office without a national association id");
                            continue;
                        };
                        match index.get(&record.national_association_id) {
                            Some(&pos) => active[pos] = record,
                            None => {
                                index.insert(record.national_association_id.clone(), active.len());
                                active.push(record);
                            }
                        }
                    }
                    OfficeStatus::Inactive => {
                        if let Some(id) = office
                            .office_national_association_id
                            .filter(|id| !id.trim().is_empty())
                        {
                            inactive.push(id);
                        }
                    }
                }
            }

            log::debug!(
                "Office fetch ({}): page {} returned {} row(s) at skip={}",
                filter.status.as_str(),
                pages,
                returned,
                skip
            );

            if returned < self.page_size as usize {
                break;
            }
            skip += u64::from(self.page_size);
        }

        Ok(match filter.status {
            OfficeStatus::Active => FetchedOffices::Active(active),
            OfficeStatus::Inactive => FetchedOffices::Inactive(inactive),
        })
    }
}

#[async_trait]
impl OfficeSource for BoardApiClient {
    async fn fetch_offices(&self, filter: &OfficeFilter) -> Result<FetchedOffices, FetchError> {
        self.fetch_all(filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board_api::AuthError;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server: &MockServer, page_size: u32) -> Config {
        Config {
            client_id: Some("client".to_string()),
            client_secret: Some("secret".to_string()),
            api_base_url: server.uri(),
            token_url: format!("{}/connect/token", server.uri()),
            page_size,
            request_timeout_secs: 1,
            ..Config::default()
        }
    }

    async fn mount_token(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/connect/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "test-token",
                "expires_in": 3600
            })))
            .mount(server)
            .await;
    }

    fn make_offices(count: usize, offset: usize, office_type: &str) -> Vec<serde_json::Value> {
        (0..count)
            .map(|i| {
                serde_json::json!({
                    "OfficeNationalAssociationId": format!("NA{}", i + offset),
                    "OfficeName": format!("Office {}", i + offset),
                    "OfficePhone": "(555) 123-4567",
                    "OfficeType": office_type,
                    "OfficeSocialMedia": [
                        { "SocialMediaType": "Website", "SocialMediaUrlOrId": format!("https://o{}.example", i + offset) }
                    ]
                })
            })
            .collect()
    }

    fn page(offices: Vec<serde_json::Value>) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": offices,
            "pagination": { "total": 0 }
        }))
    }

    #[tokio::test]
    async fn test_fetch_1500_firms_over_two_pages() {
        let server = MockServer::start().await;
        mount_token(&server).await;

        Mock::given(method("GET"))
            .and(path("/Office"))
            .and(query_param("skip", "0"))
            .and(query_param("top", "1000"))
            .and(query_param("officeStatus", "Active"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(page(make_offices(1000, 0, "Firm")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/Office"))
            .and(query_param("skip", "1000"))
            .respond_with(page(make_offices(500, 1000, "Firm")))
            .expect(1)
            .mount(&server)
            .await;

        let client = BoardApiClient::new(&test_config(&server, 1000)).unwrap();
        let FetchedOffices::Active(records) = client.fetch_all(&OfficeFilter::active()).await.unwrap()
        else {
            panic!("expected active batch");
        };
        assert_eq!(records.len(), 1500);
        assert_eq!(records[0].phone_normalized, "5551234567");
        assert_eq!(records[1499].website_url, "https://o1499.example");
    }

    #[tokio::test]
    async fn test_exact_multiple_costs_one_empty_page() {
        let server = MockServer::start().await;
        mount_token(&server).await;

        for (skip, count) in [(0, 2), (2, 2), (4, 0)] {
            Mock::given(method("GET"))
                .and(path("/Office"))
                .and(query_param("skip", skip.to_string()))
                .respond_with(page(make_offices(count, skip, "Firm")))
                .expect(1)
                .mount(&server)
                .await;
        }

        let client = BoardApiClient::new(&test_config(&server, 2)).unwrap();
        let fetched = client.fetch_all(&OfficeFilter::active()).await.unwrap();
        assert_eq!(fetched.len(), 4);
    }

    #[tokio::test]
    async fn test_non_firm_offices_are_dropped() {
        let server = MockServer::start().await;
        mount_token(&server).await;

        let mut offices = make_offices(3, 0, "Firm");
        offices.extend(make_offices(2, 100, "Branch"));
        offices.push(serde_json::json!({ "OfficeNationalAssociationId": "NOTYPE" }));
        Mock::given(method("GET"))
            .and(path("/Office"))
            .respond_with(ResponseTemplate::new(200).set_body_json(offices))
            .mount(&server)
            .await;

        let client = BoardApiClient::new(&test_config(&server, 1000)).unwrap();
        let FetchedOffices::Active(records) = client.fetch_all(&OfficeFilter::active()).await.unwrap()
        else {
            panic!("expected active batch");
        };
        let ids: Vec<&str> = records
            .iter()
            .map(|r| r.national_association_id.as_str())
            .collect();
        assert_eq!(ids, vec!["NA0", "NA1", "NA2"]);
    }

    #[tokio::test]
    async fn test_duplicate_ids_keep_latest_values() {
        let server = MockServer::start().await;
        mount_token(&server).await;

        let offices = vec![
            serde_json::json!({ "OfficeNationalAssociationId": "A", "OfficeName": "Old", "OfficeType": "Firm" }),
            serde_json::json!({ "OfficeNationalAssociationId": "B", "OfficeName": "Other", "OfficeType": "Firm" }),
            serde_json::json!({ "OfficeNationalAssociationId": "A", "OfficeName": "New", "OfficeType": "Firm" }),
        ];
        Mock::given(method("GET"))
            .and(path("/Office"))
            .respond_with(page(offices))
            .mount(&server)
            .await;

        let client = BoardApiClient::new(&test_config(&server, 1000)).unwrap();
        let FetchedOffices::Active(records) = client.fetch_all(&OfficeFilter::active()).await.unwrap()
        else {
            panic!("expected active batch");
        };
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "New");
        assert_eq!(records[1].name, "Other");
    }

    #[tokio::test]
    async fn test_inactive_fetch_returns_ids_with_since_and_region() {
        let server = MockServer::start().await;
        mount_token(&server).await;

        Mock::given(method("GET"))
            .and(path("/Office"))
            .and(query_param("officeStatus", "Inactive"))
            .and(query_param("modificationTimestamp", "2024-01-01T00:00:00Z"))
            .and(query_param("officeAOR", "Cornerstone"))
            .respond_with(page(make_offices(3, 0, "Branch")))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = test_config(&server, 1000);
        config.region_filter = Some("Cornerstone".to_string());
        let client = BoardApiClient::new(&config).unwrap();

        let fetched = client
            .fetch_all(&OfficeFilter::inactive_since("2024-01-01T00:00:00Z"))
            .await
            .unwrap();
        assert_eq!(
            fetched,
            FetchedOffices::Inactive(vec!["NA0".into(), "NA1".into(), "NA2".into()])
        );
    }

    #[tokio::test]
    async fn test_mid_pagination_failure_aborts() {
        let server = MockServer::start().await;
        mount_token(&server).await;

        Mock::given(method("GET"))
            .and(path("/Office"))
            .and(query_param("skip", "0"))
            .respond_with(page(make_offices(2, 0, "Firm")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/Office"))
            .and(query_param("skip", "2"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let client = BoardApiClient::new(&test_config(&server, 2)).unwrap();
        let err = client.fetch_all(&OfficeFilter::active()).await.unwrap_err();
        match &err {
            FetchError::Status { status, body } => {
                assert_eq!(*status, 503);
                assert_eq!(body, "maintenance");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_auth_failure_skips_office_requests() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/connect/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_client"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/Office"))
            .respond_with(page(vec![]))
            .expect(0)
            .mount(&server)
            .await;

        let client = BoardApiClient::new(&test_config(&server, 1000)).unwrap();
        let err = client.fetch_all(&OfficeFilter::active()).await.unwrap_err();
        assert!(matches!(err, FetchError::Auth(AuthError::Rejected { status: 400, .. })));
    }

    #[tokio::test]
    async fn test_unauthorized_page_drops_cached_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/connect/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "revoked",
                "expires_in": 3600
            })))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/Office"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = BoardApiClient::new(&test_config(&server, 1000)).unwrap();
        for _ in 0..2 {
            let err = client.fetch_all(&OfficeFilter::active()).await.unwrap_err();
            assert!(matches!(err, FetchError::Status { status: 401, .. }));
        }
    }

    #[tokio::test]
    async fn test_page_timeout_aborts() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/Office"))
            .respond_with(page(vec![]).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let client = BoardApiClient::new(&test_config(&server, 1000)).unwrap();
        let err = client.fetch_all(&OfficeFilter::active()).await.unwrap_err();
        assert!(matches!(&err, FetchError::Http(e) if e.is_timeout()));
        assert!(err.is_transient());
    }
}
