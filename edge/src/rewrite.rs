//! # Request rewriting
//!
//! 1. The target origin comes from `Cdn-Proxy-Origin` (header first, then
//!    query string). Without one the request is answered with the help page,
//!    so the deployment never acts as an undirected open proxy.
//! 2. `Host` is `Cdn-Proxy-Host` when given, the target origin otherwise.
//! 3. `X-Forwarded-For` is the deploy-time override when configured. Otherwise
//!    a random public address is forged, unless the request already carries
//!    exactly one value.
//!
//! Nothing is mutated until every input has been validated.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

use crate::event::{OriginRequest, Response};
use crate::forwarded::synthetic_forwarded_for;
use crate::hostname::resolve_origin;
use crate::{HEADER_HOST, HEADER_ORIGIN, HELP_PAGE};

/// Deploy-time settings shipped next to the handler as `config.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteSettings {
    #[serde(
        rename = "xForwardedFor",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub x_forwarded_for: Option<Ipv4Addr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RewriteError {
    #[error("no Cdn-Proxy-Origin header or query parameter")]
    MissingOrigin,

    /// The event has no custom origin to point somewhere else.
    #[error("request has no custom origin to rewrite")]
    MissingOriginDescriptor,

    #[error("invalid Cdn-Proxy-Origin value: {0:?}")]
    InvalidOrigin(String),

    #[error("malformed origin-request event: {0}")]
    MalformedEvent(String),
}

impl RewriteError {
    pub fn into_response(self) -> Response {
        match self {
            RewriteError::MissingOrigin => {
                Response::bad_request(HELP_PAGE, "text/html; charset=utf-8")
            }
            other => Response::bad_request(other.to_string(), "text/plain; charset=utf-8"),
        }
    }
}

/// Rewrites `request` in place.
pub fn rewrite(request: &mut OriginRequest, settings: &RewriteSettings) -> Result<(), RewriteError> {
    let raw_origin: String = first_value(request, HEADER_ORIGIN).ok_or(RewriteError::MissingOrigin)?;
    let origin: String = resolve_origin(&raw_origin)?;
    let host: String = first_value(request, HEADER_HOST).unwrap_or_else(|| origin.clone());

    let custom = request
        .origin
        .as_mut()
        .and_then(|descriptor| descriptor.custom.as_mut())
        .ok_or(RewriteError::MissingOriginDescriptor)?;
    custom.domain_name = origin;

    request.set_header("Host", host);

    let forwarded_for: Option<Ipv4Addr> = match settings.x_forwarded_for {
        Some(fixed) => Some(fixed),
        None if request.header_values("x-forwarded-for").len() != 1 => {
            Some(synthetic_forwarded_for())
        }
        None => None,
    };
    if let Some(ip) = forwarded_for {
        debug!(x_forwarded_for = %ip, "setting X-Forwarded-For");
        request.set_header("X-Forwarded-For", ip.to_string());
    }

    Ok(())
}

/// Either the rewritten request or the terminal response that replaces it.
pub fn process(mut request: OriginRequest, settings: &RewriteSettings) -> Result<OriginRequest, Response> {
    match rewrite(&mut request, settings) {
        Ok(()) => Ok(request),
        Err(e) => Err(e.into_response()),
    }
}

/// Handles a full origin-request event envelope (`Records[0].cf.request`).
/// Always returns a well-formed object for the edge runtime.
pub fn handle_event(event: &Value, settings: &RewriteSettings) -> Value {
    let outcome: Result<Value, RewriteError> = extract_request(event).and_then(|request| {
        let to_value = |v: Result<Value, serde_json::Error>| {
            v.map_err(|e| RewriteError::MalformedEvent(e.to_string()))
        };
        match process(request, settings) {
            Ok(rewritten) => to_value(serde_json::to_value(rewritten)),
            Err(response) => to_value(serde_json::to_value(response)),
        }
    });

    match outcome {
        Ok(value) => value,
        Err(e) => {
            let response: Response = e.into_response();
            json!({
                "status": response.status,
                "statusDescription": response.status_description,
                "body": response.body,
                "bodyEncoding": response.body_encoding,
                "headers": {},
            })
        }
    }
}

fn extract_request(event: &Value) -> Result<OriginRequest, RewriteError> {
    let request: &Value = event
        .pointer("/Records/0/cf/request")
        .ok_or_else(|| RewriteError::MalformedEvent("missing Records[0].cf.request".to_string()))?;
    serde_json::from_value(request.clone()).map_err(|e| RewriteError::MalformedEvent(e.to_string()))
}

fn first_value(request: &OriginRequest, name: &str) -> Option<String> {
    request
        .header_values(name)
        .first()
        .map(|value| value.to_string())
        .or_else(|| request.query_values(name).into_iter().next())
        .filter(|value| !value.trim().is_empty())
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use cdn_proxy_common::network::ip::is_public_v4;

    fn request_with(headers: Value, querystring: &str) -> OriginRequest {
        serde_json::from_value(json!({
            "method": "GET",
            "uri": "/",
            "querystring": querystring,
            "headers": headers,
            "origin": {
                "custom": {
                    "domainName": "example.com",
                    "port": 443,
                    "protocol": "https",
                    "path": "",
                }
            }
        }))
        .unwrap()
    }

    fn header(req: &OriginRequest, name: &str) -> Vec<String> {
        req.header_values(name).into_iter().map(str::to_string).collect()
    }

    #[test]
    fn origin_and_host_headers_are_applied() {
        let mut req = request_with(
            json!({
                "host": [{"key": "Host", "value": "d111111abcdef8.cloudfront.net"}],
                "cdn-proxy-origin": [{"key": "Cdn-Proxy-Origin", "value": "52.4.10.14"}],
                "cdn-proxy-host": [{"key": "Cdn-Proxy-Host", "value": "test-host"}],
                "accept": [{"key": "Accept", "value": "*/*"}],
            }),
            "",
        );

        rewrite(&mut req, &RewriteSettings::default()).unwrap();

        assert_eq!(req.origin_domain(), Some("52-4-10-14.sslip.io"));
        assert_eq!(header(&req, "host"), vec!["test-host"]);
        assert_eq!(header(&req, "accept"), vec!["*/*"]);
    }

    #[test]
    fn host_defaults_to_the_resolved_origin() {
        let mut req = request_with(
            json!({"cdn-proxy-origin": [{"key": "Cdn-Proxy-Origin", "value": "origin.example.net"}]}),
            "",
        );
        rewrite(&mut req, &RewriteSettings::default()).unwrap();
        assert_eq!(req.origin_domain(), Some("origin.example.net"));
        assert_eq!(header(&req, "host"), vec!["origin.example.net"]);
    }

    #[test]
    fn query_parameters_are_honoured() {
        let mut req = request_with(
            json!({}),
            "cdn-proxy-origin=52.4.10.14&cdn-proxy-host=internal.example.com",
        );
        rewrite(&mut req, &RewriteSettings::default()).unwrap();
        assert_eq!(req.origin_domain(), Some("52-4-10-14.sslip.io"));
        assert_eq!(header(&req, "host"), vec!["internal.example.com"]);
    }

    #[test]
    fn missing_origin_answers_with_help_and_leaves_request_alone() {
        let mut req = request_with(
            json!({"host": [{"key": "Host", "value": "d111111abcdef8.cloudfront.net"}]}),
            "",
        );
        let before: OriginRequest = req.clone();

        let err = rewrite(&mut req, &RewriteSettings::default()).unwrap_err();
        assert_eq!(err, RewriteError::MissingOrigin);
        assert_eq!(req, before);

        let response = process(req, &RewriteSettings::default()).unwrap_err();
        assert_eq!(response.status, "400");
        assert_eq!(response.body, HELP_PAGE);
    }

    #[test]
    fn invalid_origin_is_a_structured_400() {
        let req = request_with(
            json!({"cdn-proxy-origin": [{"key": "Cdn-Proxy-Origin", "value": "evil.com/path"}]}),
            "",
        );
        let response = process(req, &RewriteSettings::default()).unwrap_err();
        assert_eq!(response.status, "400");
        assert!(response.body.contains("evil.com/path"));
    }

    #[test]
    fn single_existing_forwarded_for_is_kept() {
        let mut req = request_with(
            json!({
                "cdn-proxy-origin": [{"key": "Cdn-Proxy-Origin", "value": "example.org"}],
                "x-forwarded-for": [{"key": "X-Forwarded-For", "value": "76.121.136.156"}],
            }),
            "",
        );
        rewrite(&mut req, &RewriteSettings::default()).unwrap();
        assert_eq!(header(&req, "x-forwarded-for"), vec!["76.121.136.156"]);
    }

    #[test]
    fn forwarded_for_is_forged_when_absent_or_ambiguous() {
        for existing in [json!([]), json!([{"value": "1.1.1.1"}, {"value": "8.8.8.8"}])] {
            let mut req = request_with(
                json!({
                    "cdn-proxy-origin": [{"key": "Cdn-Proxy-Origin", "value": "example.org"}],
                    "x-forwarded-for": existing,
                }),
                "",
            );
            rewrite(&mut req, &RewriteSettings::default()).unwrap();
            let values = header(&req, "x-forwarded-for");
            assert_eq!(values.len(), 1);
            let ip: Ipv4Addr = values[0].parse().unwrap();
            assert!(is_public_v4(ip));
        }
    }

    #[test]
    fn configured_forwarded_for_always_wins() {
        let settings = RewriteSettings {
            x_forwarded_for: Some(Ipv4Addr::new(8, 8, 4, 4)),
        };
        let mut req = request_with(
            json!({
                "cdn-proxy-origin": [{"key": "Cdn-Proxy-Origin", "value": "example.org"}],
                "x-forwarded-for": [{"key": "X-Forwarded-For", "value": "76.121.136.156"}],
            }),
            "",
        );
        rewrite(&mut req, &settings).unwrap();
        assert_eq!(header(&req, "x-forwarded-for"), vec!["8.8.4.4"]);
    }

    #[test]
    fn settings_file_format() {
        let settings = RewriteSettings {
            x_forwarded_for: Some(Ipv4Addr::new(8, 8, 4, 4)),
        };
        assert_eq!(
            serde_json::to_string(&settings).unwrap(),
            r#"{"xForwardedFor":"8.8.4.4"}"#
        );
        assert_eq!(
            serde_json::to_string(&RewriteSettings::default()).unwrap(),
            "{}"
        );
    }

    #[test]
    fn event_envelope_is_unwrapped() {
        let event = json!({
            "Records": [{
                "cf": {
                    "config": {"eventType": "origin-request"},
                    "request": {
                        "clientIp": "203.0.113.178",
                        "method": "GET",
                        "uri": "/login",
                        "querystring": "cdn-proxy-origin=52.4.10.14",
                        "headers": {},
                        "origin": {"custom": {"domainName": "example.com", "port": 443}},
                    }
                }
            }]
        });

        let out = handle_event(&event, &RewriteSettings::default());
        assert_eq!(out["origin"]["custom"]["domainName"], "52-4-10-14.sslip.io");
        assert_eq!(out["origin"]["custom"]["port"], 443);
        assert_eq!(out["uri"], "/login");
        assert_eq!(out["headers"]["host"][0]["value"], "52-4-10-14.sslip.io");
    }

    #[test]
    fn broken_events_still_get_a_response() {
        let out = handle_event(&json!({"Records": []}), &RewriteSettings::default());
        assert_eq!(out["status"], "400");

        let no_origin = json!({"Records": [{"cf": {"request": {
            "headers": {"cdn-proxy-origin": [{"value": "example.org"}]},
        }}}]});
        let out = handle_event(&no_origin, &RewriteSettings::default());
        assert_eq!(out["status"], "400");
    }

    /// Cases shared with `assets/index.test.mjs`, so the deployed handler and
    /// this module are held to the same table.
    const SHARED_CASES: &str = include_str!("../assets/rewrite_cases.json");

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct SharedCase {
        name: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
        #[serde(default)]
        querystring: String,
        #[serde(default)]
        settings: RewriteSettings,
        expect: Expected,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Expected {
        error: Option<String>,
        domain: Option<String>,
        host: Option<String>,
        x_forwarded_for: Option<String>,
    }

    #[test]
    fn shared_rewrite_table() {
        let cases: Vec<SharedCase> = serde_json::from_str(SHARED_CASES).unwrap();
        assert!(!cases.is_empty());

        for case in cases {
            let headers: serde_json::Map<String, Value> = case
                .headers
                .iter()
                .map(|(key, value)| {
                    (key.to_ascii_lowercase(), json!([{"key": key, "value": value}]))
                })
                .collect();
            let mut req = request_with(Value::Object(headers), &case.querystring);
            let result = rewrite(&mut req, &case.settings);

            match case.expect.error.as_deref() {
                Some("missing-origin") => {
                    assert_eq!(result, Err(RewriteError::MissingOrigin), "{}", case.name);
                    continue;
                }
                Some(_) => {
                    assert!(
                        matches!(result, Err(RewriteError::InvalidOrigin(_))),
                        "{}: {result:?}",
                        case.name
                    );
                    continue;
                }
                None => assert_eq!(result, Ok(()), "{}", case.name),
            }

            assert_eq!(req.origin_domain(), case.expect.domain.as_deref(), "{}", case.name);
            assert_eq!(header(&req, "host"), vec![case.expect.host.unwrap()], "{}", case.name);

            let forwarded: Vec<String> = header(&req, "x-forwarded-for");
            assert_eq!(forwarded.len(), 1, "{}", case.name);
            match case.expect.x_forwarded_for.as_deref() {
                Some("random") => {
                    let ip: Ipv4Addr = forwarded[0].parse().unwrap();
                    assert!(is_public_v4(ip), "{}", case.name);
                }
                expected => assert_eq!(Some(forwarded[0].as_str()), expected, "{}", case.name),
            }
        }
    }
}
