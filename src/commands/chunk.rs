//! Handler for `tokenwright chunk`.

use std::path::PathBuf;

use colored::Colorize;
use serde::Serialize;

use super::{read_input, Runtime};
use crate::chunker::{Chunk, DocumentChunker};
use crate::cli::OutputFormat;
use crate::error::Result;
use crate::output::{self, FormatOptions, Report};

pub struct ChunkOptions {
    pub input: Option<PathBuf>,
    pub size: Option<usize>,
    pub overlap: Option<usize>,
    pub format: OutputFormat,
    pub out: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ChunkResult<'a> {
    chunk_size: usize,
    overlap: usize,
    degraded: bool,
    chunks: &'a [Chunk],
}

pub fn run(runtime: &Runtime, options: ChunkOptions) -> Result<()> {
    let chunk_size = options.size.unwrap_or(runtime.config.chunker.chunk_size);
    let overlap = options.overlap.unwrap_or(runtime.config.chunker.overlap);

    let document = read_input(options.input.as_deref())?;
    let chunked = DocumentChunker::new(runtime.counter()).chunk(&document, chunk_size, overlap);

    if !runtime.quiet {
        eprintln!(
            "{} {} chunk{} (size {}, overlap {})",
            "chunk".green().bold(),
            chunked.value.len(),
            if chunked.value.len() == 1 { "" } else { "s" },
            chunk_size,
            overlap
        );
    }

    let mut report = Report::new("Chunks")
        .field("chunk size", chunk_size)
        .field("overlap", overlap)
        .field("chunks", chunked.value.len());
    for chunk in &chunked.value {
        report = report.section(
            format!(
                "chunk {} (tokens {}..{})",
                chunk.index, chunk.start_token, chunk.end_token
            ),
            chunk.text.as_str(),
        );
    }
    let report = report.data(&ChunkResult {
        chunk_size,
        overlap,
        degraded: chunked.degraded,
        chunks: &chunked.value,
    })?;

    output::write_report(
        &report,
        &FormatOptions {
            format: options.format.into(),
            out: options.out,
        },
    )
}
