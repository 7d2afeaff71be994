//! Handler for `tokenwright window`.

use std::path::PathBuf;

use colored::Colorize;
use serde::Serialize;

use super::{read_input, Runtime};
use crate::cli::OutputFormat;
use crate::error::{Result, TokenwrightError};
use crate::output::{self, FormatOptions, Report};
use crate::windower::{ContextWindower, WindowMode};

pub struct WindowOptions {
    pub input: Option<PathBuf>,
    pub budget: usize,
    pub query: Option<String>,
    pub threshold: Option<f64>,
    pub explain: bool,
    pub format: OutputFormat,
    pub out: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct WindowResult<'a> {
    text: &'a str,
    tokens: usize,
    budget: usize,
    original_tokens: usize,
    degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    explain: Option<Explanation>,
}

#[derive(Debug, Serialize)]
struct Explanation {
    mode: WindowMode,
    selected: Vec<usize>,
    segment_count: usize,
    hard_truncated: bool,
}

pub fn run(runtime: &Runtime, options: WindowOptions) -> Result<()> {
    let mut window_config = runtime.config.window.clone();
    if let Some(threshold) = options.threshold {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(TokenwrightError::validation(
                "threshold",
                "must be between 0 and 1",
            ));
        }
        window_config.relevance_threshold = threshold;
    }

    let content = read_input(options.input.as_deref())?;
    let counter = runtime.counter();
    let windower = ContextWindower::new(counter.clone(), window_config);
    let query = options.query.as_deref();

    let (text, degraded, explain) = if options.explain {
        let report = windower.window_report(
            &content,
            options.budget,
            query,
            windower.config().relevance_threshold,
        );
        let explain = Explanation {
            mode: report.mode,
            selected: report.selected,
            segment_count: report.segment_count,
            hard_truncated: report.hard_truncated,
        };
        (report.text, report.degraded, Some(explain))
    } else {
        let windowed = match runtime.result_cache()? {
            Some(cache) => cache.apply_window(&windower, &content, options.budget, query),
            None => windower.window(&content, options.budget, query),
        };
        (windowed.value, windowed.degraded, None)
    };

    let result = WindowResult {
        text: &text,
        tokens: counter.count(&text),
        budget: options.budget,
        original_tokens: counter.count(&content),
        degraded,
        explain,
    };
    if !runtime.quiet {
        eprintln!(
            "{} {} of {} tokens (budget {})",
            "window".green().bold(),
            result.tokens,
            result.original_tokens,
            result.budget
        );
        if let Some(ref explain) = result.explain {
            let kept: Vec<String> = explain.selected.iter().map(usize::to_string).collect();
            eprintln!(
                "{} mode {:?}, kept segments [{}] of {}{}",
                "explain".cyan().bold(),
                explain.mode,
                kept.join(", "),
                explain.segment_count,
                if explain.hard_truncated { ", hard-truncated" } else { "" }
            );
        }
    }

    let report = Report::new("Context window")
        .field("budget", result.budget)
        .field("tokens", result.tokens)
        .field("original tokens", result.original_tokens)
        .section("window", result.text)
        .data(&result)?;
    output::write_report(
        &report,
        &FormatOptions {
            format: options.format.into(),
            out: options.out,
        },
    )
}
