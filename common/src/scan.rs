//! # Scan model
//!
//! Reachability of one probe path is a [`ServiceState`], derived solely from the
//! transport outcome of a single HTTP request ([`ProbeOutcome`]). A probed origin
//! produces exactly one immutable [`ScanResult`].

use std::fmt;

/// Transport-level result of one probe, independent of the HTTP client used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Status(u16),
    /// The redirect limit was exceeded. Something answered, repeatedly.
    RedirectLimit,
    ConnectFailed,
    ConnectionReset,
    TimedOut,
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceState {
    Open,
    OpenServerFail,
    Closed,
    Filtered,
    ClientFailed,
}

impl ServiceState {
    pub fn classify(outcome: &ProbeOutcome) -> ServiceState {
        match outcome {
            ProbeOutcome::Status(500) => ServiceState::OpenServerFail,
            ProbeOutcome::Status(502 | 503) => ServiceState::Closed,
            ProbeOutcome::Status(504) => ServiceState::Filtered,
            ProbeOutcome::Status(200..=499) => ServiceState::Open,
            // 501, 505+: the server answered, it just failed.
            ProbeOutcome::Status(501..=599) => ServiceState::OpenServerFail,
            ProbeOutcome::Status(_) => ServiceState::ClientFailed,
            ProbeOutcome::RedirectLimit => ServiceState::Open,
            ProbeOutcome::ConnectFailed
            | ProbeOutcome::ConnectionReset
            | ProbeOutcome::TimedOut => ServiceState::Filtered,
            ProbeOutcome::Other(_) => ServiceState::ClientFailed,
        }
    }

    pub fn is_reachable(self) -> bool {
        matches!(self, ServiceState::Open | ServiceState::OpenServerFail)
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label: &str = match self {
            ServiceState::Open => "open",
            ServiceState::OpenServerFail => "open (server failed)",
            ServiceState::Closed => "closed",
            ServiceState::Filtered => "filtered",
            ServiceState::ClientFailed => "unknown (client failed)",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub origin: String,
    pub host: String,
    pub proxy_state: ServiceState,
    pub origin_state: ServiceState,
}

impl ScanResult {
    /// The origin refuses direct traffic while the same request routed
    /// through the CDN gets an answer.
    pub fn is_bypass(&self) -> bool {
        self.origin_state == ServiceState::Closed && self.proxy_state.is_reachable()
    }
}

impl fmt::Display for ScanResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Host: {}) -- Proxy: {} / Origin: {}",
            self.origin, self.host, self.proxy_state, self.origin_state
        )?;
        if self.is_bypass() {
            f.write_str(" -- Proxy Bypass Found")?;
        }
        Ok(())
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

#[cfg(test)]
mod tests {
    use super::*;

    fn result(proxy: ServiceState, origin: ServiceState) -> ScanResult {
        ScanResult {
            origin: "52.4.10.14".to_string(),
            host: "test-host".to_string(),
            proxy_state: proxy,
            origin_state: origin,
        }
    }

    #[test]
    fn classification_table() {
        use ProbeOutcome::*;
        assert_eq!(ServiceState::classify(&Status(200)), ServiceState::Open);
        assert_eq!(ServiceState::classify(&Status(403)), ServiceState::Open);
        assert_eq!(ServiceState::classify(&Status(499)), ServiceState::Open);
        assert_eq!(ServiceState::classify(&Status(500)), ServiceState::OpenServerFail);
        assert_eq!(ServiceState::classify(&Status(502)), ServiceState::Closed);
        assert_eq!(ServiceState::classify(&Status(503)), ServiceState::Closed);
        assert_eq!(ServiceState::classify(&Status(504)), ServiceState::Filtered);
        assert_eq!(ServiceState::classify(&RedirectLimit), ServiceState::Open);
        assert_eq!(ServiceState::classify(&ConnectFailed), ServiceState::Filtered);
        assert_eq!(ServiceState::classify(&ConnectionReset), ServiceState::Filtered);
        assert_eq!(ServiceState::classify(&TimedOut), ServiceState::Filtered);
        assert_eq!(
            ServiceState::classify(&Other("tls handshake".into())),
            ServiceState::ClientFailed
        );
    }

    #[test]
    fn statuses_outside_the_table() {
        assert_eq!(ServiceState::classify(&ProbeOutcome::Status(501)), ServiceState::OpenServerFail);
        assert_eq!(ServiceState::classify(&ProbeOutcome::Status(599)), ServiceState::OpenServerFail);
        assert_eq!(ServiceState::classify(&ProbeOutcome::Status(101)), ServiceState::ClientFailed);
    }

    #[test]
    fn bypass_requires_closed_origin_and_reachable_proxy() {
        assert!(result(ServiceState::Open, ServiceState::Closed).is_bypass());
        assert!(result(ServiceState::OpenServerFail, ServiceState::Closed).is_bypass());
        assert!(!result(ServiceState::Open, ServiceState::Open).is_bypass());
        assert!(!result(ServiceState::Open, ServiceState::Filtered).is_bypass());
        assert!(!result(ServiceState::Closed, ServiceState::Closed).is_bypass());
    }

    #[test]
    fn report_line_format() {
        let line: String = result(ServiceState::Open, ServiceState::Closed).to_string();
        assert_eq!(
            line,
            "52.4.10.14 (Host: test-host) -- Proxy: open / Origin: closed -- Proxy Bypass Found"
        );

        let line: String = result(ServiceState::Open, ServiceState::Open).to_string();
        assert_eq!(line, "52.4.10.14 (Host: test-host) -- Proxy: open / Origin: open");
    }
}
