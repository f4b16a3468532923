use std::fmt;
use std::str::FromStr;

use axum::http::{header, HeaderMap};
use chrono::{SecondsFormat, Utc};
use reqwest::Url;
use serde::Serialize;

pub const UNKNOWN: &str = "unknown";
pub const DIRECT: &str = "direct";
pub const MAX_USER_AGENT_CHARS: usize = 150;

/// Proxy headers consulted for the client address, highest priority first.
const IP_HEADERS: [&str; 3] = ["x-forwarded-for", "x-real-ip", "x-vercel-ip"];
const COUNTRY_HEADER: &str = "x-vercel-ip-country";
const REGION_HEADER: &str = "x-vercel-ip-country-region";
const CITY_HEADER: &str = "x-vercel-ip-city";

/// Events the browser is allowed to report through the track endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientEventType {
    LspClick,
    VirgilClick,
    VirgilOpened,
    VirgilMessageSent,
}

impl ClientEventType {
    pub const ALL: [ClientEventType; 4] = [
        ClientEventType::LspClick,
        ClientEventType::VirgilClick,
        ClientEventType::VirgilOpened,
        ClientEventType::VirgilMessageSent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClientEventType::LspClick => "lsp_click",
            ClientEventType::VirgilClick => "virgil_click",
            ClientEventType::VirgilOpened => "virgil_opened",
            ClientEventType::VirgilMessageSent => "virgil_message_sent",
        }
    }
}

impl fmt::Display for ClientEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event type: {0:?}")]
pub struct UnknownEventType(pub String);

impl FromStr for ClientEventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClientEventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownEventType(s.to_string()))
    }
}

/// What a visit record describes: a page path or a client-reported action.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Subject {
    Path(String),
    Type(ClientEventType),
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Path(path) => f.write_str(path),
            Subject::Type(kind) => write!(f, "{}", kind),
        }
    }
}

/// Request metadata shared by both record variants. Every field is always
/// populated; missing headers resolve to the documented defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip_client: String,
    pub country: String,
    pub region: String,
    pub city: String,
    pub user_agent: String,
    pub referrer: String,
}

/// Non-empty header value, or `None` when absent or not valid UTF-8.
fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| std::str::from_utf8(v.as_bytes()).ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    IP_HEADERS.iter().find_map(|name| {
        let value = header_str(headers, name)?;
        // x-forwarded-for is a chain; the originating client comes first
        let first = value.split(',').next()?.trim();
        (!first.is_empty()).then(|| first.to_string())
    })
}

fn referrer_host(headers: &HeaderMap) -> String {
    match header_str(headers, header::REFERER.as_str()) {
        None => DIRECT.to_string(),
        Some(raw) => Url::parse(raw)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| UNKNOWN.to_string()),
    }
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

impl ClientInfo {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let or_unknown = |name: &str| header_str(headers, name).unwrap_or(UNKNOWN).to_string();
        Self {
            ip_client: client_ip(headers).unwrap_or_else(|| UNKNOWN.to_string()),
            country: or_unknown(COUNTRY_HEADER),
            region: or_unknown(REGION_HEADER),
            city: or_unknown(CITY_HEADER),
            user_agent: header_str(headers, header::USER_AGENT.as_str())
                .map(|ua| truncate_chars(ua, MAX_USER_AGENT_CHARS))
                .unwrap_or_else(|| UNKNOWN.to_string()),
            referrer: referrer_host(headers),
        }
    }
}

/// One observed page visit or client-reported action. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitEvent {
    timestamp: String,
    #[serde(flatten)]
    subject: Subject,
    ip_client: String,
    country: String,
    region: String,
    city: String,
    user_agent: String,
    referrer: String,
}

impl VisitEvent {
    fn new(subject: Subject, info: ClientInfo) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            subject,
            ip_client: info.ip_client,
            country: info.country,
            region: info.region,
            city: info.city,
            user_agent: info.user_agent,
            referrer: info.referrer,
        }
    }

    pub fn page_visit(path: &str, headers: &HeaderMap) -> Self {
        Self::new(
            Subject::Path(path.to_string()),
            ClientInfo::from_headers(headers),
        )
    }

    pub fn client_event(kind: ClientEventType, headers: &HeaderMap) -> Self {
        Self::new(Subject::Type(kind), ClientInfo::from_headers(headers))
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    pub fn ip_client(&self) -> &str {
        &self.ip_client
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn referrer(&self) -> &str {
        &self.referrer
    }

    /// Short single-line form for logs.
    pub fn summary(&self) -> String {
        format!(
            "{} ip={} referrer={} ua={:?}",
            self.subject(),
            self.ip_client(),
            self.referrer(),
            self.user_agent()
        )
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
