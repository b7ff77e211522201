use std::fmt;

use cdn_proxy_common::SUCCESS_TARGET;
use colored::*;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::{self, Writer};
use tracing_subscriber::fmt::{FmtContext, FormatEvent};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

use crate::terminal::print::PRINT_TARGET;

pub struct CdnProxyFormatter;

impl<S, N> FormatEvent<S, N> for CdnProxyFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> format::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();
        let mut fields = Fields::default();
        event.record(&mut fields);

        // Pre-rendered terminal output, no decoration.
        if meta.target() == PRINT_TARGET {
            return writeln!(writer, "{}", fields.message);
        }

        let (symbol, color_func): (&str, fn(ColoredString) -> ColoredString) = match *meta.level() {
            _ if meta.target() == SUCCESS_TARGET => ("[+]", |s| s.green().bold()),
            Level::TRACE => ("[ ]", |s| s.dimmed()),
            Level::DEBUG => ("[?]", |s| s.blue()),
            Level::INFO => ("[+]", |s| s.green().bold()),
            Level::WARN => ("[*]", |s| s.yellow().bold()),
            _ => ("[-]", |s| s.red().bold()),
        };

        write!(writer, "{} {}", color_func(symbol.into()), fields.message)?;
        if !fields.extra.is_empty() {
            write!(writer, " {}", fields.extra.join(" ").dimmed())?;
        }
        writeln!(writer)
    }
}

#[derive(Default)]
struct Fields {
    message: String,
    extra: Vec<String>,
}

impl Visit for Fields {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" | "raw_msg" => self.message = value.to_string(),
            name => self.extra.push(format!("{name}={value}")),
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            "message" | "raw_msg" => self.message = format!("{value:?}"),
            name => self.extra.push(format!("{name}={value:?}")),
        }
    }
}

/// `RUST_LOG` wins; otherwise `-qq` and above hide everything below warnings.
pub fn init_logging(quiet: u8) {
    let default_level: &str = if quiet > 1 { "warn" } else { "info" };
    let filter: EnvFilter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let indicatif_layer = IndicatifLayer::new();
    let fmt_layer = tracing_subscriber::fmt::layer()
        .event_format(CdnProxyFormatter)
        .with_writer(indicatif_layer.get_stderr_writer());

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(indicatif_layer)
        .init();
}
