//! In-process stand-in for the Guild Wars 2 API v2.
//!
//! Serves a small fixed catalog with the same response shapes, pagination
//! headers, `Expires` headers and `{"text": ...}` error payloads as the real
//! service, so the client pipeline can be exercised end to end.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Current game build returned by `/v2/build`.
pub const BUILD_ID: u64 = 115_267;
pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 200;
/// Lifetime announced through `Expires` on cacheable responses.
pub const CACHE_SECONDS: i64 = 300;

/// Key with the `account` and `guilds` scopes. Leader of [`LEADER_GUILD`].
pub const FULL_KEY: &str = "FULL-KEY-0000";
/// Key without any scopes. Member of no guild.
pub const BASIC_KEY: &str = "BASIC-KEY-0000";
/// Key with the `account` and `guilds` scopes. Plain member of [`LEADER_GUILD`].
pub const MEMBER_KEY: &str = "MEMBER-KEY-0000";

pub const LEADER_GUILD: Uuid = Uuid::from_u128(0x4bbb52aa_d768_4fc6_8ede_c299f2822f0f);
pub const OTHER_GUILD: Uuid = Uuid::from_u128(0x116e0c0e_0035_44a9_bb22_4ae3e23127e5);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: u32,
    pub name: String,
    pub rarity: String,
    pub level: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub guilds: Vec<Uuid>,
    pub guild_leader: Vec<Uuid>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Guild {
    pub id: Uuid,
    pub name: String,
    pub tag: String,
    pub level: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GuildLogEntry {
    pub id: u32,
    pub time: String,
    pub user: String,
    #[serde(rename = "type")]
    pub kind: String,
}

struct CatalogItem {
    id: u32,
    names: [&'static str; 3],
    rarity: &'static str,
    level: u32,
}

const CATALOG: &[CatalogItem] = &[
    CatalogItem { id: 12, names: ["Tasty Wurm", "Leckerer Wurm", "Ver savoureux"], rarity: "Basic", level: 0 },
    CatalogItem { id: 14, names: ["Mighty Sword", "Mächtiges Schwert", "Epée puissante"], rarity: "Fine", level: 5 },
    CatalogItem { id: 19, names: ["Iron Shield", "Eisenschild", "Bouclier en fer"], rarity: "Basic", level: 10 },
    CatalogItem { id: 20, names: ["Copper Ore", "Kupfererz", "Minerai de cuivre"], rarity: "Basic", level: 0 },
    CatalogItem { id: 24, names: ["Sealed Package", "Versiegeltes Paket", "Colis scellé"], rarity: "Fine", level: 0 },
    CatalogItem { id: 30, names: ["Ascalonian Blade", "Ascalonische Klinge", "Lame d'Ascalon"], rarity: "Masterwork", level: 35 },
    CatalogItem { id: 33, names: ["Krytan Bow", "Krytanischer Bogen", "Arc kryte"], rarity: "Masterwork", level: 40 },
    CatalogItem { id: 46, names: ["Charr Hammer", "Charr-Hammer", "Marteau charr"], rarity: "Rare", level: 55 },
    CatalogItem { id: 56, names: ["Norn Axe", "Norn-Axt", "Hache norn"], rarity: "Rare", level: 62 },
    CatalogItem { id: 57, names: ["Sylvari Staff", "Sylvari-Stab", "Bâton sylvari"], rarity: "Exotic", level: 70 },
    CatalogItem { id: 58, names: ["Asura Focus", "Asura-Fokus", "Focus asura"], rarity: "Exotic", level: 78 },
    CatalogItem { id: 59, names: ["Zojja's Torch", "Zojjas Fackel", "Torche de Zojja"], rarity: "Ascended", level: 80 },
];

struct ApiKey {
    token: &'static str,
    account: &'static str,
    scopes: &'static [&'static str],
    guilds: &'static [Uuid],
    guild_leader: &'static [Uuid],
}

const KEYS: &[ApiKey] = &[
    ApiKey {
        token: FULL_KEY,
        account: "Leader.1234",
        scopes: &["account", "guilds"],
        guilds: &[LEADER_GUILD],
        guild_leader: &[LEADER_GUILD],
    },
    ApiKey {
        token: MEMBER_KEY,
        account: "Member.5678",
        scopes: &["account", "guilds"],
        guilds: &[LEADER_GUILD],
        guild_leader: &[],
    },
    ApiKey {
        token: BASIC_KEY,
        account: "Basic.9012",
        scopes: &[],
        guilds: &[],
        guild_leader: &[],
    },
];

#[derive(Clone)]
pub struct AppState {
    maintenance: Arc<[&'static str]>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::with_maintenance(&[])
    }
}

impl AppState {
    /// State in which the listed paths answer 503 as if down for maintenance.
    pub fn with_maintenance(paths: &[&'static str]) -> Self {
        Self {
            maintenance: paths.into(),
        }
    }
}

pub fn app() -> Router {
    app_with_state(AppState::default())
}

pub fn app_with_state(state: AppState) -> Router {
    Router::new()
        .route("/v2/build", get(build))
        .route("/v2/items", get(list_items))
        .route("/v2/items/{id}", get(get_item))
        .route("/v2/account", get(account))
        .route("/v2/guild/{id}", get(guild))
        .route("/v2/guild/{id}/log", get(guild_log))
        .route("/v2/boom", get(boom))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// JSON response with the given headers. Header names must be lowercase.
fn json_response<T: Serialize>(
    status: StatusCode,
    headers: Vec<(&'static str, String)>,
    body: T,
) -> Response {
    let mut response = (status, Json(body)).into_response();
    for (name, value) in headers {
        if let Ok(value) = HeaderValue::from_str(&value) {
            response.headers_mut().insert(name, value);
        }
    }
    response
}

fn api_error(status: StatusCode, text: &str) -> Response {
    tracing::debug!(status = status.as_u16(), text, "rejecting request");
    json_response(status, Vec::new(), json!({ "text": text }))
}

fn expires_header() -> (&'static str, String) {
    let expires = Utc::now() + Duration::seconds(CACHE_SECONDS);
    ("expires", expires.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
}

fn language(headers: &HeaderMap) -> &'static str {
    match headers.get("accept-language").and_then(|v| v.to_str().ok()) {
        Some("de") => "de",
        Some("fr") => "fr",
        _ => "en",
    }
}

fn localize(item: &CatalogItem, lang: &str) -> Item {
    let name = match lang {
        "de" => item.names[1],
        "fr" => item.names[2],
        _ => item.names[0],
    };
    Item {
        id: item.id,
        name: name.to_string(),
        rarity: item.rarity.to_string(),
        level: item.level,
    }
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Resolve the caller's key, or the error response for a missing or unknown
/// one.
fn authorize(headers: &HeaderMap, scope: &str) -> Result<&'static ApiKey, Response> {
    let Some(token) = bearer(headers) else {
        return Err(api_error(StatusCode::FORBIDDEN, "authorization failed"));
    };
    let Some(key) = KEYS.iter().find(|key| key.token == token) else {
        return Err(api_error(StatusCode::FORBIDDEN, "invalid key"));
    };
    if !key.scopes.contains(&scope) {
        return Err(api_error(
            StatusCode::FORBIDDEN,
            &format!("requires scope {scope}"),
        ));
    }
    Ok(key)
}

fn in_maintenance(state: &AppState, path: &str) -> bool {
    state.maintenance.iter().any(|p| *p == path)
}

async fn build(State(state): State<AppState>) -> Response {
    if in_maintenance(&state, "/v2/build") {
        return api_error(StatusCode::SERVICE_UNAVAILABLE, "service unavailable");
    }
    json_response(StatusCode::OK, vec![expires_header()], json!({ "id": BUILD_ID }))
}

async fn list_items(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if in_maintenance(&state, "/v2/items") {
        return api_error(StatusCode::SERVICE_UNAVAILABLE, "service unavailable");
    }
    let lang = language(&headers);
    let total = CATALOG.len();

    if let Some(ids) = query.get("ids") {
        let items: Vec<Item> = if ids == "all" {
            CATALOG.iter().map(|item| localize(item, lang)).collect()
        } else {
            let wanted: Vec<u32> = ids.split(',').filter_map(|id| id.trim().parse().ok()).collect();
            CATALOG
                .iter()
                .filter(|item| wanted.contains(&item.id))
                .map(|item| localize(item, lang))
                .collect()
        };
        if items.is_empty() {
            return api_error(StatusCode::NOT_FOUND, "all ids provided are invalid");
        }
        let headers = vec![
            expires_header(),
            ("content-language", lang.to_string()),
            ("x-result-count", items.len().to_string()),
            ("x-result-total", total.to_string()),
        ];
        return json_response(StatusCode::OK, headers, items);
    }

    if let Some(page) = query.get("page") {
        let Ok(page) = page.parse::<usize>() else {
            return api_error(StatusCode::BAD_REQUEST, "bad request");
        };
        let page_size = match query.get("page_size").map(|size| size.parse::<usize>()) {
            None => DEFAULT_PAGE_SIZE,
            Some(Ok(size)) if (1..=MAX_PAGE_SIZE).contains(&size) => size,
            Some(_) => return api_error(StatusCode::BAD_REQUEST, "bad request"),
        };
        let page_total = total.div_ceil(page_size);
        if page >= page_total {
            return api_error(
                StatusCode::BAD_REQUEST,
                &format!(
                    "page out of range. Use page values 0 - {}.",
                    page_total.saturating_sub(1)
                ),
            );
        }
        let items: Vec<Item> = CATALOG
            .iter()
            .skip(page * page_size)
            .take(page_size)
            .map(|item| localize(item, lang))
            .collect();
        let headers = vec![
            expires_header(),
            ("content-language", lang.to_string()),
            ("x-page-size", page_size.to_string()),
            ("x-page-total", page_total.to_string()),
            ("x-result-count", items.len().to_string()),
            ("x-result-total", total.to_string()),
        ];
        return json_response(StatusCode::OK, headers, items);
    }

    let ids: Vec<u32> = CATALOG.iter().map(|item| item.id).collect();
    let headers = vec![
        expires_header(),
        ("x-result-count", total.to_string()),
        ("x-result-total", total.to_string()),
    ];
    json_response(StatusCode::OK, headers, ids)
}

async fn get_item(headers: HeaderMap, Path(id): Path<String>) -> Response {
    let Ok(id) = id.parse::<u32>() else {
        return api_error(StatusCode::BAD_REQUEST, "bad request");
    };
    match CATALOG.iter().find(|item| item.id == id) {
        Some(item) => {
            let lang = language(&headers);
            json_response(
                StatusCode::OK,
                vec![expires_header(), ("content-language", lang.to_string())],
                localize(item, lang),
            )
        }
        None => api_error(StatusCode::NOT_FOUND, "not found"),
    }
}

async fn account(headers: HeaderMap) -> Response {
    let key = match authorize(&headers, "account") {
        Ok(key) => key,
        Err(response) => return response,
    };
    let account = Account {
        id: Uuid::new_v5(&Uuid::NAMESPACE_OID, key.account.as_bytes()),
        name: key.account.to_string(),
        guilds: key.guilds.to_vec(),
        guild_leader: key.guild_leader.to_vec(),
    };
    json_response(StatusCode::OK, Vec::new(), account)
}

fn find_guild(id: &str) -> Result<Guild, Response> {
    let Ok(id) = Uuid::parse_str(id) else {
        return Err(api_error(StatusCode::BAD_REQUEST, "bad request"));
    };
    let (name, tag, level) = if id == LEADER_GUILD {
        ("Lions Arch Ladies", "LAL", 42)
    } else if id == OTHER_GUILD {
        ("Divinity Reach Dancers", "DRD", 17)
    } else {
        return Err(api_error(StatusCode::NOT_FOUND, "not found"));
    };
    Ok(Guild {
        id,
        name: name.to_string(),
        tag: tag.to_string(),
        level,
    })
}

async fn guild(headers: HeaderMap, Path(id): Path<String>) -> Response {
    let guild = match find_guild(&id) {
        Ok(guild) => guild,
        Err(response) => return response,
    };
    // Public details without a key; members see the same here.
    if bearer(&headers).is_some() {
        if let Err(response) = authorize(&headers, "guilds") {
            return response;
        }
    }
    json_response(StatusCode::OK, vec![expires_header()], guild)
}

async fn guild_log(headers: HeaderMap, Path(id): Path<String>) -> Response {
    let guild = match find_guild(&id) {
        Ok(guild) => guild,
        Err(response) => return response,
    };
    let key = match authorize(&headers, "guilds") {
        Ok(key) => key,
        Err(response) => return response,
    };
    if !key.guilds.contains(&guild.id) {
        return api_error(StatusCode::FORBIDDEN, "membership required");
    }
    if !key.guild_leader.contains(&guild.id) {
        return api_error(StatusCode::FORBIDDEN, "access restricted to guild leaders");
    }
    let log = vec![GuildLogEntry {
        id: 1,
        time: "2019-12-19T00:00:00.000Z".to_string(),
        user: key.account.to_string(),
        kind: "joined".to_string(),
    }];
    json_response(StatusCode::OK, Vec::new(), log)
}

async fn boom() -> Response {
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "server error")
}

async fn not_found() -> Response {
    api_error(StatusCode::NOT_FOUND, "not found")
}
