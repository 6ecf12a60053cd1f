//! PostgREST-style data endpoint (`<base_url>/rest/v1/<table>`), used both as
//! a row-by-row sink and as a verification source.

use std::fmt;

use log::{debug, info};
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};

use crate::error::{ConfigurationError, PersistenceError, VerificationQueryError};
use crate::order::OrderFixture;
use crate::rows::{Cleanup, RowStore};
use crate::script::validate_table;
use crate::verify::{OrderFilter, PayoutRecord, RecordSource};

const SELECTED_COLUMNS: &str =
    "order_no,status,payment_method,amount,commission,created_at,expires_at";

/// Where the REST endpoint lives and how to authenticate. Supplied by the
/// caller; the key never appears in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct RestConfig {
    pub base_url: String,
    pub api_key: String,
    pub table: String,
}

impl fmt::Debug for RestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("table", &self.table)
            .finish()
    }
}

pub struct RestClient {
    client: Client,
    endpoint: String,
}

impl RestClient {
    /// # Errors
    /// Errors when the table name or API key is unusable, or the HTTP client
    /// cannot be built
    pub fn new(config: &RestConfig) -> Result<Self, PersistenceError> {
        validate_table(&config.table)?;
        let client = Client::builder()
            .default_headers(auth_headers(&config.api_key)?)
            .build()?;
        Ok(RestClient {
            client,
            endpoint: endpoint(&config.base_url, &config.table),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn auth_headers(api_key: &str) -> Result<HeaderMap, ConfigurationError> {
    let sensitive = |value: String| {
        HeaderValue::from_str(&value)
            .map(|mut header| {
                header.set_sensitive(true);
                header
            })
            .map_err(|_| ConfigurationError::InvalidApiKey)
    };
    let mut headers = HeaderMap::new();
    headers.insert("apikey", sensitive(api_key.to_owned())?);
    headers.insert(AUTHORIZATION, sensitive(format!("Bearer {}", api_key))?);
    headers.insert("accept-profile", HeaderValue::from_static("public"));
    headers.insert("content-profile", HeaderValue::from_static("public"));
    Ok(headers)
}

pub(crate) fn endpoint(base_url: &str, table: &str) -> String {
    format!("{}/rest/v1/{}", base_url.trim_end_matches('/'), table)
}

/// Row filters in PostgREST syntax, shared by reads and deletes
pub(crate) fn filter_params(filter: &OrderFilter) -> Vec<(&'static str, String)> {
    let mut params = vec![("type", format!("eq.{}", filter.type_tag))];
    if let Some(prefix) = &filter.order_no_prefix {
        params.push(("order_no", format!("like.{}*", prefix)));
    }
    params
}

pub(crate) fn select_params(filter: &OrderFilter) -> Vec<(&'static str, String)> {
    let mut params = vec![("select", SELECTED_COLUMNS.to_owned())];
    params.extend(filter_params(filter));
    params
}

/// Splits off non-success responses, keeping the body for the error message.
fn check_status(response: Response) -> Result<Response, (u16, String)> {
    if response.status().is_success() {
        Ok(response)
    } else {
        let status = response.status().as_u16();
        Err((status, response.text().unwrap_or_default()))
    }
}

impl RowStore for RestClient {
    // Every POST is its own unit of work, there is nothing to open or commit.
    fn begin_batch(&mut self) -> Result<(), PersistenceError> {
        Ok(())
    }

    fn insert_row(&mut self, fixture: &OrderFixture) -> Result<(), PersistenceError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Prefer", "return=minimal")
            .json(fixture)
            .send()?;
        check_status(response)
            .map(|_| ())
            .map_err(|(status, body)| PersistenceError::Status { status, body })
    }

    fn commit_batch(&mut self) -> Result<(), PersistenceError> {
        Ok(())
    }
}

impl Cleanup for RestClient {
    fn delete_matching(&mut self, filter: &OrderFilter) -> Result<usize, PersistenceError> {
        let params = filter_params(filter);
        debug!("DELETE {} {:?}", self.endpoint, params);
        let response = self
            .client
            .delete(&self.endpoint)
            .query(&params)
            .query(&[("select", "order_no")])
            .header("Prefer", "return=representation")
            .send()?;
        let body = check_status(response)
            .map_err(|(status, body)| PersistenceError::Status { status, body })?
            .text()?;
        let deleted: Vec<serde_json::Value> = serde_json::from_str(&body)?;
        info!(
            "Deleted {} `{}` rows from {} (prefix {:?})",
            deleted.len(),
            filter.type_tag,
            self.endpoint,
            filter.order_no_prefix
        );
        Ok(deleted.len())
    }
}

impl RecordSource for RestClient {
    fn fetch(&self, filter: &OrderFilter) -> Result<Vec<PayoutRecord>, VerificationQueryError> {
        let params = select_params(filter);
        debug!("GET {} {:?}", self.endpoint, params);
        let response = self.client.get(&self.endpoint).query(&params).send()?;
        let body = check_status(response)
            .map_err(|(status, body)| VerificationQueryError::Status { status, body })?
            .text()?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RestConfig {
        RestConfig {
            base_url: "https://example.test/".to_owned(),
            api_key: "secret-key".to_owned(),
            table: "orders".to_owned(),
        }
    }

    #[test]
    fn test_debug_redacts_key() {
        let text = format!("{:?}", config());
        assert!(text.contains("https://example.test/"));
        assert!(!text.contains("secret-key"));
        assert!(text.contains("<redacted>"));
    }

    #[test]
    fn test_endpoint() {
        assert_eq!(
            endpoint("https://example.test/", "orders"),
            "https://example.test/rest/v1/orders"
        );
        assert_eq!(
            endpoint("http://localhost:54321", "orders"),
            "http://localhost:54321/rest/v1/orders"
        );
        let client = RestClient::new(&config()).unwrap();
        assert_eq!(client.endpoint(), "https://example.test/rest/v1/orders");
    }

    #[test]
    fn test_select_params() {
        let params = select_params(&OrderFilter::default());
        assert_eq!(
            params,
            vec![
                ("select", SELECTED_COLUMNS.to_owned()),
                ("type", "eq.payout".to_owned()),
            ]
        );
        let params = select_params(&OrderFilter::default().with_prefix("ORD1771"));
        assert_eq!(params[2], ("order_no", "like.ORD1771*".to_owned()));
    }

    #[test]
    fn test_delete_filter_params() {
        assert_eq!(
            filter_params(&OrderFilter::default()),
            vec![("type", "eq.payout".to_owned())]
        );
        let filter = OrderFilter {
            type_tag: "payout".to_owned(),
            order_no_prefix: Some("ORD".to_owned()),
        };
        assert_eq!(
            filter_params(&filter),
            vec![
                ("type", "eq.payout".to_owned()),
                ("order_no", "like.ORD*".to_owned()),
            ]
        );
    }

    #[test]
    fn test_auth_headers_are_sensitive() {
        let headers = auth_headers("secret-key").unwrap();
        assert!(headers["apikey"].is_sensitive());
        assert!(headers[AUTHORIZATION].is_sensitive());
        assert_eq!(headers[AUTHORIZATION], "Bearer secret-key");
        assert_eq!(headers["accept-profile"], "public");
    }

    #[test]
    fn test_invalid_config() {
        let bad_key = RestConfig {
            api_key: "line\nbreak".to_owned(),
            ..config()
        };
        assert!(matches!(
            RestClient::new(&bad_key),
            Err(PersistenceError::Configuration(
                ConfigurationError::InvalidApiKey
            ))
        ));
        let bad_table = RestConfig {
            table: "orders?select=*".to_owned(),
            ..config()
        };
        assert!(matches!(
            RestClient::new(&bad_table),
            Err(PersistenceError::Configuration(
                ConfigurationError::InvalidTable(_)
            ))
        ));
    }
}
