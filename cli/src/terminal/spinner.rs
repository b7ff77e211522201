use cdn_proxy_common::progress::{ProgressEvent, ProgressSink};
use colored::*;
use indicatif::ProgressStyle;
use tracing::{Span, debug, info_span, warn};
use tracing_indicatif::span_ext::IndicatifSpanExt;

const TICKS: &[&str] = &[
    "▁▁▁▁▁",
    "▁▂▂▂▁",
    "▁▄▂▄▁",
    "▂▄▆▄▂",
    "▄▆█▆▄",
    "▂▄▆▄▂",
    "▁▄▂▄▁",
    "▁▂▂▂▁",
];

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.blue} {elapsed:>4.dim} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(TICKS)
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.blue} {elapsed_precise} {bar:36.cyan/blue} {pos:>4}/{len:4} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .tick_strings(TICKS)
        .progress_chars("■■□")
}

/// Spinner for the lifecycle commands. Lives as long as the span.
pub fn deployment_span() -> Span {
    let span: Span = info_span!("deployment", indicatif.pb_show = true);
    span.pb_set_style(&spinner_style());
    span
}

/// Bar counting finished origins.
pub fn scan_span(total: usize) -> Span {
    let span: Span = info_span!("scan", indicatif.pb_show = true);
    span.pb_set_style(&bar_style());
    span.pb_set_length(total as u64);
    span.pb_set_message(&format!("{}", "probing origins".italic()));
    span
}

/// Drives the spinner message from orchestration progress.
pub struct SpanProgress {
    span: Span,
}

impl SpanProgress {
    pub fn new(span: Span) -> Self {
        Self { span }
    }
}

impl ProgressSink for SpanProgress {
    fn emit(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Step(msg) => {
                debug!("{msg}");
                self.span.pb_set_message(&msg);
            }
            ProgressEvent::Warning(msg) => warn!("{msg}"),
        }
    }
}
