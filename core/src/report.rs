//! # Scan report
//!
//! Machine-readable summary of a scan: one entry per finding, grouped under a
//! vulnerability key. Origins that are neither bypassable nor publicly exposed
//! are left out.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use cdn_proxy_common::error::CdnProxyError;
use cdn_proxy_common::scan::{ScanResult, ServiceState};
use serde::Serialize;
use uuid::Uuid;

pub const FORMAT: &str = "cdn-proxy-simple";
pub const FORMAT_VERSION: f64 = 2.0;
pub const PROXY_BYPASS: &str = "cloudfront_proxy_bypass";
pub const EXPOSED_SERVICE: &str = "publicly_exposed_http_service";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub resource_type: String,
    pub global_identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Report {
    pub scan_date: u64,
    pub scan_uuid: String,
    pub scan_format: &'static str,
    pub scan_format_version: f64,
    pub platform: &'static str,
    pub vulnerabilities: BTreeMap<String, Vec<Finding>>,
}

impl Default for Report {
    fn default() -> Self {
        let scan_date: u64 = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self::with_identity(scan_date, Uuid::new_v4().to_string())
    }
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identity(scan_date: u64, scan_uuid: String) -> Self {
        Self {
            scan_date,
            scan_uuid,
            scan_format: FORMAT,
            scan_format_version: FORMAT_VERSION,
            platform: "Any",
            vulnerabilities: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, vulnerability: &str, finding: Finding) {
        self.vulnerabilities
            .entry(vulnerability.to_string())
            .or_default()
            .push(finding);
    }

    /// Files a scan result under the matching key, if any.
    pub fn record(&mut self, result: &ScanResult, scheme: &str) {
        let identifier: String = format!("{scheme}://{}/", result.origin);

        if result.is_bypass() {
            self.add(
                PROXY_BYPASS,
                Finding {
                    resource_type: "CloudFront Proxy Bypass".to_string(),
                    global_identifier: identifier,
                    name: Some(result.host.clone()),
                    meta_name: Some("Proxy State".to_string()),
                    meta: Some(result.proxy_state.to_string()),
                },
            );
        } else if result.origin_state == ServiceState::Open && result.proxy_state == ServiceState::Open
        {
            self.add(
                EXPOSED_SERVICE,
                Finding {
                    resource_type: "Publicly Exposed HTTP Service".to_string(),
                    global_identifier: identifier,
                    name: Some(result.host.clone()),
                    meta_name: None,
                    meta: None,
                },
            );
        }
    }

    pub fn findings(&self) -> usize {
        self.vulnerabilities.values().map(Vec::len).sum()
    }

    pub fn to_json(&self) -> Result<Vec<u8>, CdnProxyError> {
        serde_json::to_vec(self).map_err(|e| CdnProxyError::Report(e.to_string()))
    }

    pub async fn write(&self, path: &Path) -> Result<(), CdnProxyError> {
        let json: Vec<u8> = self.to_json()?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| CdnProxyError::Report(format!("{}: {e}", path.display())))
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
