use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;

use tokenwright::cli::{Cli, ColorMode, Command};
use tokenwright::commands::{self, Runtime};
use tokenwright::commands::batch::BatchOptions;
use tokenwright::commands::chunk::ChunkOptions;
use tokenwright::commands::count::CountOptions;
use tokenwright::commands::init::{InitOptions, InitResult};
use tokenwright::commands::optimize::OptimizeOptions;
use tokenwright::commands::window::WindowOptions;
use tokenwright::config::{self, Config};
use tokenwright::error::TokenwrightError;
use tokenwright::tokens::EncoderKind;

fn main() {
    let cli = Cli::parse();

    // Configure color output
    match cli.color {
        ColorMode::Always => colored::control::set_override(true),
        ColorMode::Never => colored::control::set_override(false),
        ColorMode::Auto => {}
    }

    // Init tracing
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(cli) {
        eprintln!("{} {err:#}", "error:".red().bold());
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    if let Command::Init { path, force } = cli.command {
        let result = commands::init::run(InitOptions {
            config_path: path,
            cache_dir: cli.cache_dir,
            force,
        })?;
        if !cli.quiet {
            print_init_result(&result);
        }
        return Ok(());
    }

    let runtime = resolve_runtime(&cli)?;
    match cli.command {
        Command::Init { .. } => Ok(()),
        Command::Count { input, format } => {
            commands::count::run(&runtime, CountOptions { input, format })
        }
        Command::Window {
            input,
            budget,
            query,
            threshold,
            explain,
            format,
            out,
        } => commands::window::run(
            &runtime,
            WindowOptions {
                input,
                budget,
                query,
                threshold,
                explain,
                format,
                out,
            },
        ),
        Command::Chunk {
            input,
            size,
            overlap,
            format,
            out,
        } => commands::chunk::run(
            &runtime,
            ChunkOptions {
                input,
                size,
                overlap,
                format,
                out,
            },
        ),
        Command::Optimize {
            input,
            prompt,
            prompt_file,
            max_tokens,
            reserved,
            params,
            param_files,
            format,
            out,
        } => commands::optimize::run(
            &runtime,
            OptimizeOptions {
                input,
                prompt,
                prompt_file,
                max_tokens,
                reserved,
                params,
                param_files,
                format,
                out,
            },
        ),
        Command::Batch {
            input,
            threshold,
            format,
            out,
        } => commands::batch::run(
            &runtime,
            BatchOptions {
                input,
                threshold,
                format,
                out,
            },
        ),
        Command::Context(action) => commands::context::run(&runtime, action),
    }?;
    Ok(())
}

/// Load config and layer the global flags on top.
fn resolve_runtime(cli: &Cli) -> Result<Runtime> {
    let mut config = config::load_or_default(cli.config.as_deref())
        .context("failed to load configuration")?;

    if let Some(ref model) = cli.model {
        config.model = model.clone();
    }
    if let Some(ref name) = cli.encoder {
        config.encoder = EncoderKind::parse(name).ok_or_else(|| {
            TokenwrightError::validation(
                "encoder",
                format!("unknown encoder '{name}' (expected auto, piece, cl100k or o200k)"),
            )
        })?;
    }
    if cli.no_cache {
        config.cache.enabled = false;
    }
    config.validate().context("invalid configuration")?;

    let cache_dir = cli
        .cache_dir
        .clone()
        .or_else(|| config.cache.dir.clone())
        .unwrap_or_else(config::default_cache_dir);

    Ok(Runtime {
        config,
        cache_dir,
        quiet: cli.quiet,
    })
}

fn print_init_result(result: &InitResult) {
    println!(
        "{} Created config at {}",
        "ok".green().bold(),
        result.config_path.display()
    );
    if let Some(ref cache_dir) = result.cache_dir {
        println!(
            "{} Created cache at {}",
            "ok".green().bold(),
            cache_dir.display()
        );
        if result.purged > 0 {
            println!(
                "{} Removed {} expired cache entr{}",
                "ok".green().bold(),
                result.purged,
                if result.purged == 1 { "y" } else { "ies" }
            );
        }
    }
    let defaults = Config::default();
    println!("Encoder: {}", result.encoder);
    println!();
    println!("Next steps:");
    println!(
        "  1. Edit {} to set the model (default {})",
        result.config_path.display().to_string().bold(),
        defaults.model
    );
    println!(
        "  2. Run {} to count tokens",
        "tokenwright count FILE".bold()
    );
    println!(
        "  3. Run {} to fit a document into a budget",
        "tokenwright window FILE --budget N".bold()
    );
}
