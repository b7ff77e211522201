//! # Edge request rewriter
//!
//! Logic executed once per proxied request at the CDN edge, before the request
//! leaves for the origin. It picks the real origin from request metadata, sets
//! the upstream `Host`, and forges `X-Forwarded-For`.
//!
//! The edge runtime only executes JavaScript, so what is actually deployed is
//! [`HANDLER_SOURCE`]. It follows the same contract as [`rewrite::handle_event`],
//! which is the reference the handler is checked against.

pub mod event;
pub mod forwarded;
pub mod hostname;
pub mod rewrite;

pub use event::{HeaderEntry, OriginRequest, Response};
pub use rewrite::{RewriteError, RewriteSettings, handle_event, process, rewrite};

/// Request header (or query parameter) naming the real origin.
pub const HEADER_ORIGIN: &str = "cdn-proxy-origin";
/// Request header (or query parameter) overriding the upstream `Host`.
pub const HEADER_HOST: &str = "cdn-proxy-host";

/// Page returned when a request does not say where it should go.
pub const HELP_PAGE: &str = include_str!("../assets/help.html");

/// The deployed handler.
pub const HANDLER_SOURCE: &str = include_str!("../assets/index.mjs");

/// File names inside the deployment package. The handler reads these at
/// cold start.
pub const PACKAGE_HANDLER_FILE: &str = "index.mjs";
pub const PACKAGE_HELP_FILE: &str = "help.html";
pub const PACKAGE_SETTINGS_FILE: &str = "config.json";
/// `<module>.<export>` entry point registered with the function.
pub const PACKAGE_ENTRY_POINT: &str = "index.handler";
