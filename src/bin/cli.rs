use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use waltiscan::client::ScanClient;
use waltiscan::config::{Config, Secret};
use waltiscan::error::WaltiError;
use waltiscan::orchestrator::{CancelToken, RunLog};
use waltiscan::output::OutputFormat;
use waltiscan::{RunOptions, CONFIG_FILE};

#[derive(Parser)]
#[command(
    name = "walti-scan",
    about = "Queue Walti.io security scans and turn their results into a build verdict",
    version,
    author
)]
struct Cli {
    /// Config file path
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// API key
    #[arg(long, env = "WALTI_API_KEY", global = true, hide_env_values = true)]
    key: Option<String>,

    /// API secret
    #[arg(long, env = "WALTI_API_SECRET", global = true, hide_env_values = true)]
    secret: Option<String>,

    /// Base URL of the scan service API
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue scans for a target and wait for the verdict
    Run {
        /// Target name as registered with the scan service
        #[arg(long, short = 't')]
        target: Option<String>,

        /// Plugin to queue (repeatable, or comma separated)
        #[arg(long = "plugin", short = 'p', value_delimiter = ',')]
        plugins: Vec<String>,

        /// Return right after queueing instead of waiting for results
        /// (`--no-wait=false` overrides the config file)
        #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
        no_wait: Option<bool>,

        /// Report non-green results as UNSTABLE instead of FAILURE
        /// (`--unstable-preferred=false` overrides the config file)
        #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
        unstable_preferred: Option<bool>,

        /// Seconds between status polls
        #[arg(long)]
        poll_interval: Option<u64>,

        /// Summary format (console, json)
        #[arg(long, short = 'f', default_value = "console")]
        format: String,

        /// Write the summary to file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Write the progress log to file instead of stdout
        #[arg(long)]
        log: Option<PathBuf>,
    },

    /// List targets registered for the account
    Targets,

    /// List plugins available for a target
    Plugins {
        /// Target name
        target: String,
    },

    /// Check that the API key and secret are accepted
    Check,

    /// Generate a starter .walti.toml config file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let options = RunOptions {
        config_path: cli.config,
        key: cli.key,
        secret: cli.secret.map(Secret::new),
        api_url: cli.api_url,
        ..RunOptions::default()
    };

    let result = match cli.command {
        Commands::Run {
            target,
            plugins,
            no_wait,
            unstable_preferred,
            poll_interval,
            format,
            output,
            log,
        } => {
            let options = RunOptions {
                target,
                plugins,
                no_wait,
                unstable_preferred,
                poll_interval_secs: poll_interval,
                ..options
            };
            cmd_run(options, format, output, log)
        }
        Commands::Targets => cmd_targets(options),
        Commands::Plugins { target } => cmd_plugins(options, target),
        Commands::Check => cmd_check(options),
        Commands::Init { force } => cmd_init(force),
    };

    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "waltiscan=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_run(
    options: RunOptions,
    format_str: String,
    output_path: Option<PathBuf>,
    log_path: Option<PathBuf>,
) -> Result<i32, WaltiError> {
    let format = OutputFormat::from_str_lenient(&format_str).unwrap_or_else(|| {
        eprintln!("Warning: unknown format '{}', using console", format_str);
        OutputFormat::Console
    });

    let log = match log_path {
        Some(path) => RunLog::new(std::fs::File::create(path)?),
        None => RunLog::stdout(),
    };

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::info!("Received Ctrl+C, stopping after the current poll");
        handler_token.cancel();
    }) {
        tracing::warn!(error = %e, "could not install Ctrl+C handler");
    }

    let report = waltiscan::run(&options, cancel, log)?;
    let rendered = waltiscan::render_report(&report, format)?;

    match output_path {
        Some(out) => std::fs::write(&out, &rendered)?,
        None => print!("{}", rendered),
    }

    Ok(report.verdict.exit_code())
}

fn cmd_targets(options: RunOptions) -> Result<i32, WaltiError> {
    let config = waltiscan::load_config(&options)?;
    let client = waltiscan::connect(&config)?;

    for name in client.list_targets()? {
        println!("{}", name);
    }
    Ok(0)
}

fn cmd_plugins(options: RunOptions, target: String) -> Result<i32, WaltiError> {
    let config = waltiscan::load_config(&options)?;
    let client = waltiscan::connect(&config)?;

    println!("{:<20} STATE", "PLUGIN");
    println!("{}", "-".repeat(40));
    for plugin in client.fetch_target_status(&target)? {
        let state = if plugin.is_queued { "queued" } else { "idle" };
        println!("{:<20} {}", plugin.name, state);
    }
    Ok(0)
}

fn cmd_check(options: RunOptions) -> Result<i32, WaltiError> {
    let config = waltiscan::load_config(&options)?;
    let client = waltiscan::connect(&config)?;

    if client.validate_credentials()? {
        println!("API key and secret are valid");
        Ok(0)
    } else {
        eprintln!("API key or secret is not valid");
        Ok(1)
    }
}

fn cmd_init(force: bool) -> Result<i32, WaltiError> {
    let path = PathBuf::from(CONFIG_FILE);

    if path.exists() && !force {
        eprintln!("{} already exists. Use --force to overwrite.", CONFIG_FILE);
        return Ok(1);
    }

    std::fs::write(&path, Config::starter_toml())?;
    println!("Created {}", CONFIG_FILE);

    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_flags(args: &[&str]) -> (Option<bool>, Option<bool>) {
        let argv = ["walti-scan", "run"].iter().chain(args.iter()).copied();
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Run {
                no_wait,
                unstable_preferred,
                ..
            } => (no_wait, unstable_preferred),
            _ => panic!("expected the run subcommand"),
        }
    }

    #[test]
    fn absent_flags_defer_to_config() {
        assert_eq!(run_flags(&[]), (None, None));
    }

    #[test]
    fn bare_flags_turn_options_on() {
        assert_eq!(
            run_flags(&["--no-wait", "--unstable-preferred"]),
            (Some(true), Some(true))
        );
    }

    #[test]
    fn explicit_false_turns_options_off() {
        assert_eq!(
            run_flags(&["--no-wait=false", "--unstable-preferred=false"]),
            (Some(false), Some(false))
        );
    }

    #[test]
    fn explicit_false_overrides_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"[scan]\nno_wait = true\n").unwrap();
        let (no_wait, _) = run_flags(&["--no-wait=false"]);
        let options = RunOptions {
            config_path: Some(file.path().to_path_buf()),
            no_wait,
            ..RunOptions::default()
        };

        let config = waltiscan::load_config(&options).unwrap();
        assert!(!config.scan.no_wait);
    }
}
