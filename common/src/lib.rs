//! # cdn-proxy common
//!
//! Shared domain models, configuration and error types used by every crate in
//! the workspace. Nothing in here talks to the network or to a cloud provider.

pub mod config;
pub mod deployment;
pub mod error;
pub mod network;
pub mod progress;
pub mod scan;

/// Target used for events that should render as a success line.
pub const SUCCESS_TARGET: &str = "cdn_proxy::success";

#[macro_export]
macro_rules! success {
    ($($arg:tt)*) => {
        ::tracing::info!(target: "cdn_proxy::success", $($arg)*)
    };
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        ::tracing::warn!($($arg)*)
    };
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        ::tracing::error!($($arg)*)
    };
}

/// Shortens `s` to `length` characters, appending `...` when anything was cut.
pub fn trim(s: &str, length: usize) -> String {
    match s.char_indices().nth(length) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
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
