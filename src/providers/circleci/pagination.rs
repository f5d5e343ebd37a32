use std::marker::PhantomData;

use log::debug;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::client::CircleCiClient;
use crate::error::{CiWaitError, Result};

/// Query parameter carrying the cursor of the next page.
pub const PAGE_TOKEN_PARAM: &str = "page-token";

/// One page of a list endpoint.
#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum CursorState {
    /// Nothing fetched yet.
    #[default]
    Start,
    /// Provider handed out a token for the next page.
    Next(String),
    /// Last page consumed. Distinct from `Start` so exhaustion is never
    /// mistaken for "no cursor sent yet".
    Exhausted,
}

/// Position of a single listing session.
///
/// Once exhausted or failed the cursor stays that way; callers never issue
/// another request through it.
#[derive(Debug, Default)]
pub struct PageCursor {
    state: CursorState,
    error: Option<CiWaitError>,
}

impl PageCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the last page was consumed or a fetch failed.
    pub fn is_done(&self) -> bool {
        self.error.is_some() || self.state == CursorState::Exhausted
    }

    pub fn error(&self) -> Option<&CiWaitError> {
        self.error.as_ref()
    }

    /// Query for the next request: the session filters on the first call,
    /// only the page token afterwards.
    fn query(&self, initial: &[(String, String)]) -> Vec<(String, String)> {
        match &self.state {
            CursorState::Start => initial.to_vec(),
            CursorState::Next(token) => vec![(PAGE_TOKEN_PARAM.to_string(), token.clone())],
            CursorState::Exhausted => Vec::new(),
        }
    }

    fn advance(&mut self, next_page_token: Option<String>) {
        self.state = match next_page_token {
            Some(token) if !token.is_empty() => CursorState::Next(token),
            _ => CursorState::Exhausted,
        };
    }

    fn fail(&mut self, error: CiWaitError) {
        self.error = Some(error);
    }
}

/// Generic iterator over a paged CircleCI list endpoint.
///
/// `next` fetches exactly one page; `all` drains the remaining pages. Errors
/// are sticky: after the first failure no further request is sent.
pub struct ListIterator<'c, T> {
    client: &'c CircleCiClient,
    path: String,
    initial_query: Vec<(String, String)>,
    cursor: PageCursor,
    pages_fetched: usize,
    _item: PhantomData<fn() -> T>,
}

impl<'c, T> ListIterator<'c, T>
where
    T: DeserializeOwned,
{
    pub fn new(client: &'c CircleCiClient, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
            initial_query: Vec::new(),
            cursor: PageCursor::new(),
            pages_fetched: 0,
            _item: PhantomData,
        }
    }

    /// Adds a filter sent with the first request only. Follow-up requests rely
    /// on the page token already encoding the filtered query.
    pub fn set_initial_param(&mut self, key: &str, value: &str) {
        self.initial_query.retain(|(k, _)| k != key);
        self.initial_query.push((key.to_string(), value.to_string()));
    }

    pub fn error(&self) -> Option<&CiWaitError> {
        self.cursor.error()
    }

    pub fn is_done(&self) -> bool {
        self.cursor.is_done()
    }

    /// Number of requests that returned a page.
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Fetches one page into `out`, replacing its contents.
    ///
    /// Returns `false` without touching `out` when the listing is exhausted or
    /// a fetch failed, now or on an earlier call. Inspect [`Self::error`] to
    /// tell the two apart.
    pub async fn next(&mut self, out: &mut Vec<T>, cancel: &CancellationToken) -> bool {
        if self.cursor.is_done() {
            return false;
        }

        let query = self.cursor.query(&self.initial_query);
        match self
            .client
            .get_json::<Page<T>>(&self.path, &query, cancel)
            .await
        {
            Ok(page) => {
                self.pages_fetched += 1;
                debug!(
                    "Fetched page {} of {} with {} items",
                    self.pages_fetched,
                    self.path,
                    page.items.len()
                );
                self.cursor.advance(page.next_page_token);
                *out = page.items;
                true
            }
            Err(e) => {
                self.cursor.fail(e);
                false
            }
        }
    }

    /// Collects every remaining page into `out` in provider order.
    ///
    /// # Errors
    ///
    /// Returns the error that stopped the iteration, if any. Calling `all`
    /// again afterwards returns the same error without another request.
    pub async fn all(&mut self, out: &mut Vec<T>, cancel: &CancellationToken) -> Result<()> {
        out.clear();

        let mut page = Vec::new();
        while self.next(&mut page, cancel).await {
            out.append(&mut page);
        }

        match self.cursor.error() {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Token;
    use crate::error::ErrorKind;
    use crate::providers::circleci::client::ApiVersion;
    use mockito::Matcher;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        n: u32,
    }

    fn client_for(server: &mockito::ServerGuard) -> CircleCiClient {
        CircleCiClient::new(&server.url(), ApiVersion::V2, &Token::new("t").unwrap()).unwrap()
    }

    async fn mock_page(
        server: &mut mockito::ServerGuard,
        query: Matcher,
        body: &str,
    ) -> mockito::Mock {
        server
            .mock("GET", "/v2/things")
            .match_query(query)
            .with_status(200)
            .with_body(body)
            .expect(1)
            .create_async()
            .await
    }

    mod cursor_tests {
        use super::*;

        #[test]
        fn test_empty_token_exhausts_cursor() {
            let mut cursor = PageCursor::new();
            assert!(!cursor.is_done());

            cursor.advance(Some(String::new()));
            assert!(cursor.is_done());
            assert!(cursor.query(&[]).is_empty());
        }

        #[test]
        fn test_first_query_uses_initial_params() {
            let mut cursor = PageCursor::new();
            let initial = vec![("branch".to_string(), "main".to_string())];
            assert_eq!(cursor.query(&initial), initial);

            cursor.advance(Some("abc".to_string()));
            assert_eq!(
                cursor.query(&initial),
                vec![(PAGE_TOKEN_PARAM.to_string(), "abc".to_string())]
            );
        }
    }

    #[tokio::test]
    async fn test_all_concatenates_pages_in_order() {
        let mut server = mockito::Server::new_async().await;
        let first = mock_page(
            &mut server,
            Matcher::Exact(String::new()),
            r#"{"items": [{"n": 1}, {"n": 2}], "next_page_token": "p2"}"#,
        )
        .await;
        let second = mock_page(
            &mut server,
            Matcher::UrlEncoded(PAGE_TOKEN_PARAM.into(), "p2".into()),
            r#"{"items": [{"n": 3}], "next_page_token": "p3"}"#,
        )
        .await;
        let third = mock_page(
            &mut server,
            Matcher::UrlEncoded(PAGE_TOKEN_PARAM.into(), "p3".into()),
            r#"{"items": [{"n": 4}], "next_page_token": null}"#,
        )
        .await;

        let client = client_for(&server);
        let mut iter = ListIterator::<Item>::new(&client, "/things");
        let mut out = vec![Item { n: 99 }];
        iter.all(&mut out, &CancellationToken::new()).await.unwrap();

        let got: Vec<u32> = out.iter().map(|i| i.n).collect();
        assert_eq!(got, vec![1, 2, 3, 4]);
        assert_eq!(iter.pages_fetched(), 3);
        first.assert_async().await;
        second.assert_async().await;
        third.assert_async().await;
    }

    #[tokio::test]
    async fn test_exhausted_iterator_makes_no_more_requests() {
        let mut server = mockito::Server::new_async().await;
        let only = mock_page(
            &mut server,
            Matcher::Any,
            r#"{"items": [{"n": 1}], "next_page_token": ""}"#,
        )
        .await;

        let client = client_for(&server);
        let mut iter = ListIterator::<Item>::new(&client, "/things");
        let cancel = CancellationToken::new();
        let mut out = Vec::new();

        assert!(iter.next(&mut out, &cancel).await);
        assert_eq!(out, vec![Item { n: 1 }]);

        assert!(!iter.next(&mut out, &cancel).await);
        assert_eq!(out, vec![Item { n: 1 }], "out must be left untouched");
        assert!(iter.error().is_none());

        iter.all(&mut out, &cancel).await.unwrap();
        assert!(out.is_empty());
        only.assert_async().await;
    }

    #[tokio::test]
    async fn test_initial_param_only_on_first_request() {
        let mut server = mockito::Server::new_async().await;
        let first = mock_page(
            &mut server,
            Matcher::Exact("branch=main".into()),
            r#"{"items": [], "next_page_token": "next"}"#,
        )
        .await;
        let second = mock_page(
            &mut server,
            Matcher::Exact(format!("{PAGE_TOKEN_PARAM}=next")),
            r#"{"items": [{"n": 5}]}"#,
        )
        .await;

        let client = client_for(&server);
        let mut iter = ListIterator::<Item>::new(&client, "/things");
        iter.set_initial_param("branch", "main");

        let mut out = Vec::new();
        iter.all(&mut out, &CancellationToken::new()).await.unwrap();

        assert_eq!(out, vec![Item { n: 5 }]);
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_is_sticky() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("GET", "/v2/things")
            .with_status(404)
            .with_body(r#"{"message": "Not Found"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server);
        let mut iter = ListIterator::<Item>::new(&client, "/things");
        let cancel = CancellationToken::new();
        let mut out = vec![Item { n: 1 }];

        assert!(!iter.next(&mut out, &cancel).await);
        assert_eq!(out, vec![Item { n: 1 }]);
        assert_eq!(iter.error().map(CiWaitError::kind), Some(ErrorKind::Provider));

        assert!(!iter.next(&mut out, &cancel).await);
        let err = iter.all(&mut out, &cancel).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Provider);
        assert!(out.is_empty());
        failing.assert_async().await;
    }

    #[tokio::test]
    async fn test_all_propagates_mid_listing_error() {
        let mut server = mockito::Server::new_async().await;
        let _first = mock_page(
            &mut server,
            Matcher::Exact(String::new()),
            r#"{"items": [{"n": 1}], "next_page_token": "p2"}"#,
        )
        .await;
        let _mock = server
            .mock("GET", "/v2/things")
            .match_query(Matcher::UrlEncoded(PAGE_TOKEN_PARAM.into(), "p2".into()))
            .with_status(500)
            .create_async()
            .await;

        let client = client_for(&server);
        let mut iter = ListIterator::<Item>::new(&client, "/things");
        let mut out = Vec::new();
        let err = iter.all(&mut out, &CancellationToken::new()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(iter.is_done());
    }
}
