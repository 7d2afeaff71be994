//! Handler for `tokenwright count`.

use std::path::PathBuf;

use serde::Serialize;

use super::{read_input, Runtime};
use crate::cli::OutputFormat;
use crate::error::Result;
use crate::output::{self, FormatOptions, Report};

pub struct CountOptions {
    pub input: Option<PathBuf>,
    pub format: OutputFormat,
}

#[derive(Debug, Serialize)]
struct CountResult<'a> {
    tokens: usize,
    characters: usize,
    estimate: usize,
    encoder: &'a str,
    model: &'a str,
    degraded: bool,
}

pub fn run(runtime: &Runtime, options: CountOptions) -> Result<()> {
    let text = read_input(options.input.as_deref())?;
    let counter = runtime.counter();
    let counted = counter.count_checked(&text);

    let result = CountResult {
        tokens: counted.value,
        characters: text.chars().count(),
        estimate: counter.estimate(&text),
        encoder: counter.encoder_name(),
        model: &runtime.config.model,
        degraded: counted.degraded,
    };
    let report = Report::new("Token count")
        .field("encoder", result.encoder)
        .field("characters", result.characters)
        .field("estimate", result.estimate)
        .section("tokens", result.tokens.to_string())
        .data(&result)?;

    output::write_report(
        &report,
        &FormatOptions {
            format: options.format.into(),
            out: None,
        },
    )
}
