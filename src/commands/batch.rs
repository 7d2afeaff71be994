//! Handler for `tokenwright batch`.

use std::path::PathBuf;

use colored::Colorize;

use super::{read_input, Runtime};
use crate::batcher::{self, LlmRequest};
use crate::cli::OutputFormat;
use crate::error::{Result, TokenwrightError};
use crate::output::{self, FormatOptions, Report};

pub struct BatchOptions {
    pub input: Option<PathBuf>,
    pub threshold: Option<f64>,
    pub format: OutputFormat,
    pub out: Option<PathBuf>,
}

pub fn run(runtime: &Runtime, options: BatchOptions) -> Result<()> {
    let threshold = options
        .threshold
        .unwrap_or(runtime.config.batcher.similarity_threshold);
    if !(0.0..=1.0).contains(&threshold) {
        return Err(TokenwrightError::validation(
            "threshold",
            "must be between 0 and 1",
        ));
    }

    let raw = read_input(options.input.as_deref())?;
    let requests: Vec<LlmRequest> = serde_json::from_str(&raw)
        .map_err(|e| TokenwrightError::serialization("request list", e))?;

    let batched = batcher::batch_with_prefix(
        &requests,
        threshold,
        runtime.config.batcher.content_prefix_chars,
    );

    if !runtime.quiet {
        eprintln!(
            "{} {} request{} into {} batch{}",
            "batch".green().bold(),
            requests.len(),
            if requests.len() == 1 { "" } else { "s" },
            batched.len(),
            if batched.len() == 1 { "" } else { "es" }
        );
    }

    let mut report = Report::new("Batched requests")
        .field("requests", requests.len())
        .field("batches", batched.len())
        .field("threshold", threshold);
    for (i, (request, group)) in batched.requests.iter().zip(&batched.groups).enumerate() {
        let members: Vec<String> = group.iter().map(usize::to_string).collect();
        report = report.section(
            format!("batch {i}"),
            format!("requests: {}\nprompt: {}", members.join(", "), request.prompt),
        );
    }
    let report = report.data(&batched)?;

    output::write_report(
        &report,
        &FormatOptions {
            format: options.format.into(),
            out: options.out,
        },
    )
}
