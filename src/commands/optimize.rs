//! Handler for `tokenwright optimize`.
//!
//! Without `--param` the content (file or stdin) is fitted into the prompt
//! template's `{content}` slot. With parameters the template's named fields
//! are filled and the oversized ones shrunk; an input file, when given,
//! supplies the `content` field.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use colored::Colorize;

use super::{read_input, Runtime};
use crate::cli::OutputFormat;
use crate::error::{Result, TokenwrightError};
use crate::optimizer::{ContentStrategy, PromptOptimizer};
use crate::output::{self, FormatOptions, Report};

pub struct OptimizeOptions {
    pub input: Option<PathBuf>,
    pub prompt: Option<String>,
    pub prompt_file: Option<PathBuf>,
    pub max_tokens: usize,
    pub reserved: usize,
    pub params: Vec<String>,
    pub param_files: Vec<String>,
    pub format: OutputFormat,
    pub out: Option<PathBuf>,
}

pub fn run(runtime: &Runtime, options: OptimizeOptions) -> Result<()> {
    let template = match (options.prompt, options.prompt_file.as_deref()) {
        (Some(prompt), _) => prompt,
        (None, Some(path)) => read_input(Some(path))?,
        (None, None) => {
            return Err(TokenwrightError::validation(
                "prompt",
                "either --prompt or --prompt-file is required",
            ))
        }
    };

    let mut params = BTreeMap::new();
    for raw in &options.params {
        let (name, value) = split_param(raw)?;
        params.insert(name.to_string(), value.to_string());
    }
    for raw in &options.param_files {
        let (name, path) = split_param(raw)?;
        params.insert(name.to_string(), read_input(Some(Path::new(path)))?);
    }

    let optimizer = PromptOptimizer::new(
        runtime.counter(),
        runtime.config.optimizer.clone(),
        runtime.config.window.clone(),
    );

    let prompt = if params.is_empty() {
        let content = read_input(options.input.as_deref())?;
        match runtime.result_cache()? {
            Some(cache) => cache.optimize_prompt(
                &optimizer,
                &template,
                &content,
                options.max_tokens,
                options.reserved,
            ),
            None => optimizer.optimize(&template, &content, options.max_tokens, options.reserved),
        }
    } else {
        if let Some(ref input) = options.input {
            if !params.contains_key("content") {
                params.insert("content".to_string(), read_input(Some(input.as_path()))?);
            }
        }
        optimizer.optimize_template(&template, &params, options.max_tokens, options.reserved)?
    };

    if !runtime.quiet {
        if prompt.strategy == ContentStrategy::Dropped {
            eprintln!(
                "{} no room for content within {} tokens ({} reserved)",
                "warning:".yellow().bold(),
                options.max_tokens,
                options.reserved
            );
        }
        eprintln!(
            "{} {} tokens, content {:?}",
            "optimize".green().bold(),
            prompt.tokens,
            prompt.strategy
        );
    }

    let report = Report::new("Optimized prompt")
        .field("tokens", prompt.tokens)
        .field("max tokens", options.max_tokens)
        .field("reserved", options.reserved)
        .field("strategy", format!("{:?}", prompt.strategy).to_lowercase())
        .section("prompt", prompt.text.as_str())
        .data(&prompt)?;
    output::write_report(
        &report,
        &FormatOptions {
            format: options.format.into(),
            out: options.out,
        },
    )
}

fn split_param(raw: &str) -> Result<(&str, &str)> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim(), value)),
        _ => Err(TokenwrightError::validation(
            "param",
            format!("expected NAME=VALUE, got '{raw}'"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_param_accepts_equals_in_value() {
        assert_eq!(split_param("tone=a=b").unwrap(), ("tone", "a=b"));
        assert_eq!(split_param(" name =Sam").unwrap(), ("name", "Sam"));
        assert!(split_param("novalue").is_err());
        assert!(split_param("=x").is_err());
    }
}
