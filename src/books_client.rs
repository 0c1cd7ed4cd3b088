use reqwest::blocking::{Client, Response};
use reqwest::header::AUTHORIZATION;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{BookError, Result};
use crate::models::{BookSummary, PageResponse, Volume, VolumesResponse};

const USER_AGENT: &str = concat!("BookAtlas/", env!("CARGO_PKG_VERSION"));
// Google's fixed "Favorites" shelf
const FAVORITES_SHELF: u32 = 0;

/// Anything the pagination controller can pull pages from.
pub trait PageSource {
    fn fetch_page(&self, query: &str, offset: usize, page_size: usize) -> Result<PageResponse>;
}

fn build_http(config: &Config) -> Result<Client> {
    let client = Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .user_agent(USER_AGENT)
        .build()?;
    Ok(client)
}

/// Turns a non-2xx response into an error, keeping the body for the log.
fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(BookError::from_status(status, body))
}

fn parse_volumes(response: Response) -> Result<PageResponse> {
    let text = response.text()?;
    let volumes: VolumesResponse = serde_json::from_str(&text)?;
    Ok(volumes.into())
}

/// Unauthenticated search against the public volumes endpoint.
#[derive(Clone)]
pub struct CatalogClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl CatalogClient {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            http: build_http(config)?,
            base_url: config.catalog_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn search(&self, query: &str, offset: usize, page_size: usize) -> Result<PageResponse> {
        let url = format!("{}/books/v1/volumes", self.base_url);
        debug!(%url, query, offset, page_size, "fetching catalog page");

        let mut params = vec![
            ("q", format!("intitle:{}", query)),
            ("startIndex", offset.to_string()),
            ("maxResults", page_size.to_string()),
        ];
        if let Some(key) = &self.api_key {
            params.push(("key", key.clone()));
        }

        let response = self.http.get(&url).query(&params).send()?;
        let page = parse_volumes(ensure_success(response)?)?;

        debug!(items = page.items.len(), total = page.total_count, "catalog page received");
        Ok(page)
    }

    /// Reload a single volume, used by the details view refresh.
    pub fn fetch_volume(&self, id: &str) -> Result<BookSummary> {
        let url = format!("{}/books/v1/volumes/{}", self.base_url, urlencoding::encode(id));
        debug!(%url, "fetching volume");

        let mut request = self.http.get(&url);
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key)]);
        }

        let response = ensure_success(request.send()?)?;
        let text = response.text()?;
        let volume: Volume = serde_json::from_str(&text)?;
        Ok(volume.into())
    }
}

impl PageSource for CatalogClient {
    fn fetch_page(&self, query: &str, offset: usize, page_size: usize) -> Result<PageResponse> {
        self.search(query, offset, page_size)
    }
}

/// Bearer-authenticated access to the user's favorites shelf.
#[derive(Clone)]
pub struct FavoritesClient {
    http: Client,
    base_url: String,
}

impl FavoritesClient {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            http: build_http(config)?,
            base_url: config.catalog_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn shelf_url(&self, action: &str) -> String {
        format!(
            "{}/books/v1/mylibrary/bookshelves/{}/{}",
            self.base_url, FAVORITES_SHELF, action
        )
    }

    fn bearer(token: &str) -> Result<String> {
        if token.trim().is_empty() {
            return Err(BookError::Auth("no access token, sign in first".into()));
        }
        Ok(format!("Bearer {}", token))
    }

    fn post_volume(&self, action: &str, book_id: &str, token: &str) -> Result<()> {
        let auth = Self::bearer(token)?;
        let url = self.shelf_url(action);
        debug!(%url, book_id, "updating favorites shelf");

        // An empty body still sends Content-Length, which the endpoint requires
        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, auth)
            .query(&[("volumeId", book_id)])
            .body("")
            .send()?;

        if let Err(e) = ensure_success(response) {
            warn!(book_id, error = %e, "favorites shelf update rejected");
            return Err(e);
        }
        Ok(())
    }

    pub fn add_to_favorites(&self, book_id: &str, token: &str) -> Result<()> {
        self.post_volume("addVolume", book_id, token)
    }

    pub fn remove_from_favorites(&self, book_id: &str, token: &str) -> Result<()> {
        self.post_volume("removeVolume", book_id, token)
    }

    pub fn list_favorites(&self, offset: usize, page_size: usize, token: &str) -> Result<PageResponse> {
        let auth = Self::bearer(token)?;
        let url = self.shelf_url("volumes");
        debug!(%url, offset, page_size, "fetching favorites page");

        let response = self
            .http
            .get(&url)
            .header(AUTHORIZATION, auth)
            .query(&[
                ("startIndex", offset.to_string()),
                ("maxResults", page_size.to_string()),
            ])
            .send()?;

        parse_volumes(ensure_success(response)?)
    }
}

/// The favorites listing seen as a page source. The shelf has no query.
#[derive(Clone)]
pub struct ShelfSource {
    pub client: FavoritesClient,
    pub token: String,
}

impl PageSource for ShelfSource {
    fn fetch_page(&self, _query: &str, offset: usize, page_size: usize) -> Result<PageResponse> {
        self.client.list_favorites(offset, page_size, &self.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn config_for(server: &MockServer, api_key: Option<&str>) -> Config {
        Config {
            catalog_base_url: server.base_url(),
            api_key: api_key.map(str::to_string),
            ..Config::default()
        }
    }

    fn volumes_body(ids: &[&str], total: usize) -> serde_json::Value {
        let items: Vec<_> = ids
            .iter()
            .map(|id| json!({"id": id, "volumeInfo": {"title": format!("Title {id}")}}))
            .collect();
        json!({"kind": "books#volumes", "totalItems": total, "items": items})
    }

    #[test]
    fn search_sends_title_filter_and_paging() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/books/v1/volumes")
                .query_param("q", "intitle:dune")
                .query_param("startIndex", "5")
                .query_param("maxResults", "5")
                .query_param("key", "k");
            then.status(200).json_body(volumes_body(&["a", "b"], 120));
        });

        let client = CatalogClient::new(&config_for(&server, Some("k"))).unwrap();
        let page = client.search("dune", 5, 5).unwrap();

        mock.assert();
        assert_eq!(page.total_count, 120);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].title, "Title a");
    }

    #[test]
    fn search_without_key_omits_key_param() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/books/v1/volumes").matches(|req| {
                req.query_params
                    .as_ref()
                    .map(|params| params.iter().all(|(name, _)| name != "key"))
                    .unwrap_or(true)
            });
            then.status(200).json_body(json!({"totalItems": 0}));
        });

        let client = CatalogClient::new(&config_for(&server, None)).unwrap();
        let page = client.search("dune", 0, 5).unwrap();

        mock.assert();
        assert!(page.items.is_empty());
    }

    #[test]
    fn non_success_status_is_an_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/books/v1/volumes");
            then.status(500).body("boom");
        });

        let client = CatalogClient::new(&config_for(&server, None)).unwrap();
        match client.search("dune", 0, 5) {
            Err(BookError::Status { status, .. }) => assert_eq!(status, 500),
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[test]
    fn malformed_payload_is_a_parse_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/books/v1/volumes");
            then.status(200).body("<html>not json</html>");
        });

        let client = CatalogClient::new(&config_for(&server, None)).unwrap();
        assert!(matches!(client.search("dune", 0, 5), Err(BookError::Parse(_))));
    }

    #[test]
    fn fetch_volume_reads_single_item() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/books/v1/volumes/zyx");
            then.status(200)
                .json_body(json!({"id": "zyx", "volumeInfo": {"title": "Foundation", "pageCount": 255}}));
        });

        let client = CatalogClient::new(&config_for(&server, None)).unwrap();
        let book = client.fetch_volume("zyx").unwrap();

        mock.assert();
        assert_eq!(book.title, "Foundation");
        assert_eq!(book.page_count, Some(255));
    }

    #[test]
    fn add_to_favorites_posts_with_bearer() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/books/v1/mylibrary/bookshelves/0/addVolume")
                .query_param("volumeId", "abc")
                .header("authorization", "Bearer tok");
            then.status(200);
        });

        let client = FavoritesClient::new(&config_for(&server, None)).unwrap();
        client.add_to_favorites("abc", "tok").unwrap();
        mock.assert();
    }

    #[test]
    fn expired_token_is_an_auth_failure() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/books/v1/mylibrary/bookshelves/0/addVolume");
            then.status(401).json_body(json!({"error": {"message": "Invalid Credentials"}}));
        });

        let client = FavoritesClient::new(&config_for(&server, None)).unwrap();
        let err = client.add_to_favorites("abc", "stale").unwrap_err();
        assert!(err.is_auth());
    }

    #[test]
    fn missing_token_fails_without_a_request() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.path_contains("/books/v1");
            then.status(200);
        });

        let client = FavoritesClient::new(&config_for(&server, None)).unwrap();
        assert!(client.add_to_favorites("abc", "").unwrap_err().is_auth());
        assert!(client.list_favorites(0, 5, " ").unwrap_err().is_auth());
        mock.assert_hits(0);
    }

    #[test]
    fn shelf_source_lists_favorites() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/books/v1/mylibrary/bookshelves/0/volumes")
                .query_param("startIndex", "10")
                .query_param("maxResults", "5")
                .header("authorization", "Bearer tok");
            then.status(200).json_body(volumes_body(&["f1"], 11));
        });

        let source = ShelfSource {
            client: FavoritesClient::new(&config_for(&server, None)).unwrap(),
            token: "tok".into(),
        };
        let page = source.fetch_page("ignored", 10, 5).unwrap();

        mock.assert();
        assert_eq!(page.total_count, 11);
        assert_eq!(page.items[0].id, "f1");
    }
}
