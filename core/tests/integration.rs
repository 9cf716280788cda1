//! End-to-end tests against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port, then drives a `Connection` over
//! real HTTP through `ReqwestTransport`. A counting wrapper around the
//! transport shows which calls the cache absorbed. Response types are
//! declared here rather than imported from the mock server, so schema drift
//! between the two shows up as decode failures.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use gw2_core::{
    ApiError, AuthorizationKind, BadRequestKind, CancellationToken, ClientConfig, Connection,
    HttpRequest, HttpResponse, Locale, MemoryCacheStore, ReqwestTransport, RequestOptions,
    Transport, TransportError,
};
use mock_server::{BASIC_KEY, FULL_KEY, LEADER_GUILD, MEMBER_KEY, OTHER_GUILD};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Build {
    id: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Item {
    id: u32,
    name: String,
    rarity: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Account {
    name: String,
    guilds: Vec<String>,
}

struct CountingTransport {
    inner: ReqwestTransport,
    calls: AtomicUsize,
}

impl CountingTransport {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for CountingTransport {
    async fn send(
        &self,
        request: &HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.send(request, cancel).await
    }
}

async fn start_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(mock_server::run(listener));
    format!("http://{addr}")
}

struct Fixture {
    transport: Arc<CountingTransport>,
    store: Arc<MemoryCacheStore>,
    connection: Connection,
}

async fn fixture(token: Option<&str>, locale: Locale) -> Fixture {
    let base_url = start_server().await;
    let transport = Arc::new(CountingTransport {
        inner: ReqwestTransport::new(&base_url).unwrap(),
        calls: AtomicUsize::new(0),
    });
    let store = Arc::new(MemoryCacheStore::new());
    let mut builder = Connection::builder()
        .locale(locale)
        .transport(transport.clone())
        .cache_store(store.clone());
    if let Some(token) = token {
        builder = builder.access_token(token);
    }
    Fixture {
        transport,
        store,
        connection: builder.build().unwrap(),
    }
}

#[tokio::test]
async fn repeated_request_is_served_from_cache() {
    let f = fixture(None, Locale::English).await;
    let cancel = CancellationToken::new();
    let options = RequestOptions::get("v2/build");

    let first = f.connection.execute::<Build>(&options, &cancel).await.unwrap();
    assert_eq!(first.content.id, mock_server::BUILD_ID);
    assert!(first.expires().is_some());

    let second = f.connection.execute::<Build>(&options, &cancel).await.unwrap();
    assert_eq!(second.content, first.content);
    assert_eq!(f.transport.calls(), 1);

    let a = f.connection.execute_raw(&options, &cancel).await.unwrap();
    let b = f.connection.execute_raw(&options, &cancel).await.unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(f.transport.calls(), 1);
}

#[tokio::test]
async fn bulk_request_fills_element_entries() {
    let f = fixture(None, Locale::English).await;
    let cancel = CancellationToken::new();

    let bulk = RequestOptions::builder("v2/items").ids([14, 19, 20]).build().unwrap();
    let items = f.connection.execute::<Vec<Item>>(&bulk, &cancel).await.unwrap();
    assert_eq!(items.content.len(), 3);
    assert_eq!(f.store.len(), 3);

    let single = RequestOptions::builder("v2/items").ids([19]).build().unwrap();
    let items = f.connection.execute::<Vec<Item>>(&single, &cancel).await.unwrap();
    assert_eq!(items.content.len(), 1);
    assert_eq!(items.content[0].name, "Iron Shield");
    assert_eq!(f.transport.calls(), 1);

    // Aggregate requests always reach the server.
    f.connection.execute::<Vec<Item>>(&bulk, &cancel).await.unwrap();
    assert_eq!(f.transport.calls(), 2);
}

#[tokio::test]
async fn pages_carry_pagination_info() {
    let f = fixture(None, Locale::English).await;
    let cancel = CancellationToken::new();

    let page = RequestOptions::builder("v2/items").page(1, Some(5)).build().unwrap();
    let response = f.connection.execute::<Vec<Item>>(&page, &cancel).await.unwrap();
    let info = response.page_info().unwrap();
    assert_eq!(info.page_size, Some(5));
    assert_eq!(info.page_total, Some(3));
    assert_eq!(info.result_count, Some(5));
    assert_eq!(info.result_total, Some(12));
    assert_eq!(response.content[0].id, 30);

    let beyond = RequestOptions::builder("v2/items").page(3, Some(5)).build().unwrap();
    let err = f.connection.execute::<Vec<Item>>(&beyond, &cancel).await.unwrap_err();
    assert!(matches!(
        err,
        ApiError::BadRequest { kind: BadRequestKind::PageOutOfRange, .. }
    ));
    assert_eq!(
        err.details().unwrap().text.as_deref(),
        Some("page out of range. Use page values 0 - 2.")
    );
}

#[tokio::test]
async fn locales_do_not_share_entries() {
    let f = fixture(None, Locale::English).await;
    let cancel = CancellationToken::new();
    let options = RequestOptions::builder("v2/items").all().build().unwrap();

    let english = f.connection.execute::<Vec<Item>>(&options, &cancel).await.unwrap();
    let german_options = RequestOptions::builder("v2/items")
        .all()
        .header("Accept-Language", "de")
        .build()
        .unwrap();
    let german = f
        .connection
        .execute::<Vec<Item>>(&german_options, &cancel)
        .await
        .unwrap();

    assert_eq!(english.content[1].name, "Mighty Sword");
    assert_eq!(german.content[1].name, "Mächtiges Schwert");
    assert_eq!(german.header("content-language"), Some("de"));
    assert_eq!(f.transport.calls(), 2);
}

#[tokio::test]
async fn status_errors_are_classified() {
    let f = fixture(None, Locale::English).await;
    let cancel = CancellationToken::new();

    let err = f
        .connection
        .execute::<Item>(&RequestOptions::get("v2/items/1"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound { .. }));

    let err = f
        .connection
        .execute::<Build>(&RequestOptions::get("v2/boom"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::ServerError { .. }));

    let unknown = RequestOptions::builder("v2/items").ids([9999]).build().unwrap();
    let err = f
        .connection
        .execute::<Vec<Item>>(&unknown, &cancel)
        .await
        .unwrap_err();
    match err {
        ApiError::UnexpectedStatus { status, body, .. } => {
            assert_eq!(status, 404);
            assert!(body.contains("all ids provided are invalid"));
        }
        other => panic!("unexpected variant: {other:?}"),
    }

    // Failures are never cached.
    assert!(f.store.is_empty());
}

#[tokio::test]
async fn authorization_errors_are_classified() {
    let cancel = CancellationToken::new();
    let account = RequestOptions::get("v2/account");

    let anonymous = fixture(None, Locale::English).await;
    let err = anonymous.connection.execute::<Account>(&account, &cancel).await.unwrap_err();
    assert!(matches!(
        err,
        ApiError::AuthorizationRequired { kind: AuthorizationKind::Generic, .. }
    ));

    let bogus = fixture(Some("nope"), Locale::English).await;
    let err = bogus.connection.execute::<Account>(&account, &cancel).await.unwrap_err();
    assert!(matches!(
        err,
        ApiError::AuthorizationRequired { kind: AuthorizationKind::InvalidAccessToken, .. }
    ));

    let basic = fixture(Some(BASIC_KEY), Locale::English).await;
    let err = basic.connection.execute::<Account>(&account, &cancel).await.unwrap_err();
    assert!(matches!(
        err,
        ApiError::AuthorizationRequired { kind: AuthorizationKind::MissingScopes, .. }
    ));

    let leader = fixture(Some(FULL_KEY), Locale::English).await;
    let log = RequestOptions::get(format!("v2/guild/{OTHER_GUILD}/log"));
    let err = leader
        .connection
        .execute::<serde_json::Value>(&log, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ApiError::AuthorizationRequired { kind: AuthorizationKind::MembershipRequired, .. }
    ));

    let member = fixture(Some(MEMBER_KEY), Locale::English).await;
    let log = RequestOptions::get(format!("v2/guild/{LEADER_GUILD}/log"));
    let err = member
        .connection
        .execute::<serde_json::Value>(&log, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ApiError::AuthorizationRequired { kind: AuthorizationKind::RestrictedToGuildLeaders, .. }
    ));
}

#[tokio::test]
async fn authorized_request_succeeds() {
    let f = fixture(Some(FULL_KEY), Locale::English).await;
    let account = f
        .connection
        .execute::<Account>(&RequestOptions::get("v2/account"), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(account.content.name, "Leader.1234");
    assert_eq!(account.content.guilds, vec![LEADER_GUILD.to_string()]);
    assert_eq!(
        gw2_core::http::find_header(&account.request_headers, "authorization"),
        Some(format!("Bearer {FULL_KEY}").as_str())
    );
}

#[tokio::test]
async fn connection_from_config() {
    let base_url = start_server().await;
    let config = ClientConfig {
        base_url,
        locale: Locale::French,
        timeout_secs: 5,
        ..ClientConfig::default()
    };
    let connection = Connection::from_config(&config).unwrap();
    assert_eq!(connection.locale(), Locale::French);

    let item = connection
        .execute::<Item>(&RequestOptions::get("v2/items/19"), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(item.content.name, "Bouclier en fer");
    assert_eq!(item.content.rarity, "Basic");
}

#[tokio::test]
async fn unreachable_server_is_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let connection = Connection::builder()
        .base_url(format!("http://{addr}"))
        .build()
        .unwrap();
    let err = connection
        .execute_raw(&RequestOptions::get("v2/build"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Transport(_)), "got {err:?}");
}

#[tokio::test]
async fn cancelled_call_never_reaches_cache() {
    let f = fixture(None, Locale::English).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = f
        .connection
        .execute::<Build>(&RequestOptions::get("v2/build"), &cancel)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert!(f.store.is_empty());
}

#[tokio::test]
async fn concurrent_calls_share_one_connection() {
    let f = fixture(None, Locale::English).await;
    let mut handles = Vec::new();
    for id in [12, 14, 19, 20, 24] {
        let connection = f.connection.clone();
        handles.push(tokio::spawn(async move {
            connection
                .execute::<Item>(
                    &RequestOptions::get(format!("v2/items/{id}")),
                    &CancellationToken::new(),
                )
                .await
                .map(|response| response.content.id)
        }));
    }
    for (handle, id) in handles.into_iter().zip([12, 14, 19, 20, 24]) {
        assert_eq!(handle.await.unwrap().unwrap(), id);
    }
}
