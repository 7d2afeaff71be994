use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::output::Format;

#[derive(Parser, Debug)]
#[command(
    name = "tokenwright",
    about = "Token budgeting, context windowing and conversation trimming for LLM requests",
    version,
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Model name (selects the tokenizer)
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Encoder: auto, piece, cl100k or o200k
    #[arg(long, global = true, env = "TOKENWRIGHT_ENCODER")]
    pub encoder: Option<String>,

    /// Disable the result cache
    #[arg(long, global = true)]
    pub no_cache: bool,

    /// Override cache directory
    #[arg(long, global = true, env = "TOKENWRIGHT_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Color output mode
    #[arg(long, global = true, value_enum, default_value_t = ColorMode::Auto)]
    pub color: ColorMode,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a default config file and create the cache directory
    Init {
        /// Where to write the config file
        #[arg(long, default_value = "tokenwright.toml")]
        path: PathBuf,

        /// Overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Count tokens in a file or stdin
    Count {
        /// Input file (stdin when omitted or "-")
        input: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Plain)]
        format: OutputFormat,
    },

    /// Fit a document into a token budget
    #[command(alias = "w")]
    Window {
        /// Input file (stdin when omitted or "-")
        input: Option<PathBuf>,

        /// Token budget
        #[arg(long)]
        budget: usize,

        /// Rank segments by similarity to this query
        #[arg(long)]
        query: Option<String>,

        /// Relevance threshold for query mode
        #[arg(long)]
        threshold: Option<f64>,

        /// Report which segments were kept and why (skips the result cache)
        #[arg(long)]
        explain: bool,

        #[arg(long, value_enum, default_value_t = OutputFormat::Plain)]
        format: OutputFormat,

        /// Write output to file
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Split a document into overlapping chunks
    Chunk {
        /// Input file (stdin when omitted or "-")
        input: Option<PathBuf>,

        /// Tokens per chunk
        #[arg(long)]
        size: Option<usize>,

        /// Tokens shared between consecutive chunks
        #[arg(long)]
        overlap: Option<usize>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Plain)]
        format: OutputFormat,

        /// Write output to file
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Fit content into a prompt template
    #[command(alias = "o")]
    Optimize {
        /// Content file for `{content}` (stdin when "-")
        input: Option<PathBuf>,

        /// Prompt template
        #[arg(long, conflicts_with = "prompt_file")]
        prompt: Option<String>,

        /// Read the prompt template from a file
        #[arg(long)]
        prompt_file: Option<PathBuf>,

        /// Total token budget
        #[arg(long)]
        max_tokens: usize,

        /// Tokens reserved for the response
        #[arg(long, default_value_t = 0)]
        reserved: usize,

        /// Template parameter (repeatable)
        #[arg(long = "param", value_name = "NAME=VALUE")]
        params: Vec<String>,

        /// Template parameter read from a file (repeatable)
        #[arg(long = "param-file", value_name = "NAME=PATH")]
        param_files: Vec<String>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Plain)]
        format: OutputFormat,

        /// Write output to file
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Group near-duplicate requests from a JSON array
    Batch {
        /// JSON file with an array of {prompt, content, query?}
        input: Option<PathBuf>,

        /// Similarity threshold
        #[arg(long)]
        threshold: Option<f64>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,

        /// Write output to file
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Manage stored conversation contexts
    #[command(subcommand)]
    Context(ContextCommand),
}

#[derive(Subcommand, Debug)]
pub enum ContextCommand {
    /// Create a conversation context
    Create {
        #[arg(long)]
        session: String,

        /// Conversation id (generated when omitted)
        #[arg(long)]
        conversation: Option<String>,

        /// Initial system message
        #[arg(long)]
        system: Option<String>,

        /// Document snapshot file
        #[arg(long)]
        document: Option<PathBuf>,

        #[arg(long)]
        user: Option<String>,
    },

    /// Append a message
    Add {
        #[arg(long)]
        session: String,

        #[arg(long)]
        conversation: String,

        /// system, user or assistant
        #[arg(long, default_value = "user")]
        role: String,

        /// Message text
        content: String,
    },

    /// Replace or remove the document snapshot
    Document {
        #[arg(long)]
        session: String,

        #[arg(long)]
        conversation: String,

        /// Document file (stdin when "-")
        #[arg(required_unless_present = "clear")]
        input: Option<PathBuf>,

        /// Remove the document
        #[arg(long)]
        clear: bool,
    },

    /// Show a stored context
    Show {
        #[arg(long)]
        session: String,

        #[arg(long)]
        conversation: String,

        #[arg(long, value_enum, default_value_t = OutputFormat::Markdown)]
        format: OutputFormat,
    },

    /// Print the messages that would be sent to a model
    Prepare {
        #[arg(long)]
        session: String,

        #[arg(long)]
        conversation: String,

        /// Token budget (defaults to conversation.max_tokens)
        #[arg(long)]
        max_tokens: Option<usize>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },

    /// Trim a stored context to a token budget
    Trim {
        #[arg(long)]
        session: String,

        #[arg(long)]
        conversation: String,

        #[arg(long)]
        max_tokens: Option<usize>,
    },

    /// Delete a stored context
    Clear {
        #[arg(long)]
        session: String,

        #[arg(long)]
        conversation: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
    Markdown,
}

impl From<OutputFormat> for Format {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Plain => Format::Plain,
            OutputFormat::Json => Format::Json,
            OutputFormat::Markdown => Format::Markdown,
        }
    }
}
