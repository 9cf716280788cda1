//! Domain types surfaced by the pipeline: locales, the error payload and the
//! decoded response envelope.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::expiry_from_headers;
use crate::error::ConfigError;
use crate::http::{find_header, Headers};

/// Languages the API can localize content into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Locale {
    #[default]
    #[serde(rename = "en")]
    English,
    #[serde(rename = "de")]
    German,
    #[serde(rename = "fr")]
    French,
    #[serde(rename = "es")]
    Spanish,
    #[serde(rename = "ko")]
    Korean,
    #[serde(rename = "zh")]
    Chinese,
}

impl Locale {
    pub const ALL: [Locale; 6] = [
        Locale::English,
        Locale::German,
        Locale::French,
        Locale::Spanish,
        Locale::Korean,
        Locale::Chinese,
    ];

    /// Two-letter code sent as `Accept-Language`.
    pub fn code(&self) -> &'static str {
        match self {
            Locale::English => "en",
            Locale::German => "de",
            Locale::French => "fr",
            Locale::Spanish => "es",
            Locale::Korean => "ko",
            Locale::Chinese => "zh",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Locale {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Locale::ALL
            .into_iter()
            .find(|locale| locale.code() == s)
            .ok_or_else(|| ConfigError::UnsupportedLocale(s.to_string()))
    }
}

/// Error payload returned by the API on failed requests: `{"text": "..."}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    #[serde(default)]
    pub text: Option<String>,
}

impl ErrorObject {
    /// Best-effort decode; a body that is not an error object yields no text.
    pub fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }
}

/// Pagination metadata sent by list endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageInfo {
    pub page_size: Option<u32>,
    pub page_total: Option<u32>,
    pub result_count: Option<u32>,
    pub result_total: Option<u32>,
}

impl PageInfo {
    /// Read `X-Page-*` and `X-Result-*` headers. `None` when none are present.
    pub fn from_headers(headers: &[(String, String)]) -> Option<Self> {
        let read = |name: &str| find_header(headers, name).and_then(|v| v.trim().parse().ok());
        let info = PageInfo {
            page_size: read("X-Page-Size"),
            page_total: read("X-Page-Total"),
            result_count: read("X-Result-Count"),
            result_total: read("X-Result-Total"),
        };
        (info != PageInfo::default()).then_some(info)
    }
}

/// A successful, decoded API response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse<T> {
    pub status: u16,
    pub request_headers: Headers,
    pub response_headers: Headers,
    pub content: T,
}

impl<T> ApiResponse<T> {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.response_headers, name)
    }

    pub fn page_info(&self) -> Option<PageInfo> {
        PageInfo::from_headers(&self.response_headers)
    }

    /// Absolute expiry announced by the server, if any.
    pub fn expires(&self) -> Option<DateTime<Utc>> {
        expiry_from_headers(&self.response_headers)
    }

    pub fn into_content(self) -> T {
        self.content
    }
}
