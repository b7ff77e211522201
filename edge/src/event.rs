//! # Origin-request event model
//!
//! Only the parts of the CloudFront event the rewriter reads or writes are
//! typed. Everything else is carried through untouched in `extra`, so a
//! forwarded request serializes back to what the edge runtime handed us.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One value of a (possibly repeated) header. CloudFront keys the header map
/// by the lowercase name and keeps the original spelling in `key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub value: String,
}

impl HeaderEntry {
    pub fn new(key: &str, value: impl Into<String>) -> Self {
        Self {
            key: Some(key.to_string()),
            value: value.into(),
        }
    }
}

pub type Headers = BTreeMap<String, Vec<HeaderEntry>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginRequest {
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub querystring: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Origin {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<CustomOrigin>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomOrigin {
    #[serde(rename = "domainName")]
    pub domain_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OriginRequest {
    /// All values of header `name`, matched case-insensitively, in order.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(key, _)| key.eq_ignore_ascii_case(name))
            .flat_map(|(_, entries)| entries.iter().map(|entry| entry.value.as_str()))
            .collect()
    }

    /// Replaces every spelling of header `name` with a single value.
    pub fn set_header(&mut self, display_key: &str, value: impl Into<String>) {
        let name: String = display_key.to_ascii_lowercase();
        self.headers.retain(|key, _| !key.eq_ignore_ascii_case(&name));
        self.headers
            .insert(name, vec![HeaderEntry::new(display_key, value)]);
    }

    /// Non-empty values of query parameter `name`, percent-decoded.
    pub fn query_values(&self, name: &str) -> Vec<String> {
        let query: &str = self.querystring.trim_start_matches('?');
        url::form_urlencoded::parse(query.as_bytes())
            .filter(|(key, value)| key == name && !value.is_empty())
            .map(|(_, value)| value.into_owned())
            .collect()
    }

    pub fn origin_domain(&self) -> Option<&str> {
        self.origin
            .as_ref()
            .and_then(|origin| origin.custom.as_ref())
            .map(|custom| custom.domain_name.as_str())
    }
}

/// Terminal response generated at the edge instead of forwarding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: String,
    #[serde(rename = "statusDescription")]
    pub status_description: String,
    pub body: String,
    #[serde(rename = "bodyEncoding")]
    pub body_encoding: String,
    pub headers: Headers,
}

impl Response {
    pub fn bad_request(body: impl Into<String>, content_type: &str) -> Self {
        let mut headers = Headers::new();
        headers.insert(
            "content-type".to_string(),
            vec![HeaderEntry::new("Content-Type", content_type)],
        );
        Self {
            status: "400".to_string(),
            status_description: "Bad Request".to_string(),
            body: body.into(),
            body_encoding: "text".to_string(),
            headers,
        }
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
