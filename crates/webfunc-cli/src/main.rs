//! webfunc - run a WASM handler per HTTP request.
//!
//! `webfunc serve` answers every request by running the handler against a
//! fresh in-memory filesystem describing the request. `webfunc invoke` does
//! the same once, from command-line flags.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use webfunc_config::{Config, ConfigLoader, LoadedConfig};

mod config_bridge;
mod invoke;
mod server;

/// webfunc - WASM request handlers
#[derive(Parser)]
#[command(name = "webfunc")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the handler over HTTP
    Serve {
        /// WASM module (overrides sandbox.module)
        #[arg(short, long)]
        module: Option<PathBuf>,

        /// Listen address (overrides server.bind_addr)
        #[arg(short, long)]
        bind: Option<SocketAddr>,
    },

    /// Run the handler once and stream its output
    Invoke {
        /// WASM module (overrides sandbox.module)
        #[arg(short, long)]
        module: Option<PathBuf>,

        /// Request method
        #[arg(long, default_value = "GET")]
        method: String,

        /// Request path
        #[arg(long, default_value = "/")]
        path: String,

        /// Query string, without the leading '?'
        #[arg(long, default_value = "")]
        query: String,

        /// Request header as 'Name: value' (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// File to send as the body ('-' for stdin)
        #[arg(long)]
        body: Option<PathBuf>,
    },

    /// View configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
    /// Show which files were loaded and where the user file lives
    Paths,
}

fn load_config(explicit: Option<&PathBuf>) -> Result<LoadedConfig> {
    let mut loader = ConfigLoader::from_environment();
    if let Some(path) = explicit {
        loader = loader.with_file(path);
    }
    loader.load().context("failed to load configuration")
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let loaded = load_config(cli.config.as_ref())?;
    let cfg = &loaded.config;

    let mut log_config = config_bridge::to_log_config(cfg);
    if cli.verbose {
        "debug".clone_into(&mut log_config.level);
    }
    let _log_guard = match webfunc_telemetry::setup_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        },
    };

    match cli.command {
        Commands::Serve { module, bind } => {
            let session = config_bridge::build_session(cfg, module.as_deref())?;
            let addr = match bind {
                Some(addr) => addr,
                None => cfg
                    .server
                    .bind_addr
                    .parse()
                    .with_context(|| format!("invalid bind address {}", cfg.server.bind_addr))?,
            };
            server::serve(addr, session, cfg.server.max_body_bytes).await?;
        },
        Commands::Invoke {
            module,
            method,
            path,
            query,
            headers,
            body,
        } => {
            let session = config_bridge::build_session(cfg, module.as_deref())?;
            let args = invoke::InvokeArgs {
                method,
                path,
                query,
                headers,
                body,
            };
            let code = invoke::run(session, &args).await?;
            return Ok(guest_exit_code(code));
        },
        Commands::Config { command } => match command {
            ConfigCommands::Show => print!("{}", render_config(cfg)?),
            ConfigCommands::Paths => {
                match webfunc_config::user_config_path() {
                    Some(path) => println!("user config: {}", path.display()),
                    None => println!("user config: (no home directory)"),
                }
                if loaded.loaded_files.is_empty() {
                    println!("loaded: (defaults only)");
                }
                for path in &loaded.loaded_files {
                    println!("loaded: {}", path.display());
                }
                println!("environment overrides: {}", loaded.env_overrides);
            },
        },
    }

    Ok(ExitCode::SUCCESS)
}

/// Map a guest exit code onto the process exit status, saturating at 255.
fn guest_exit_code(code: u32) -> ExitCode {
    if code == 0 {
        return ExitCode::SUCCESS;
    }
    ExitCode::from(u8::try_from(code).unwrap_or(u8::MAX))
}

fn render_config(cfg: &Config) -> Result<String> {
    toml::to_string_pretty(cfg).context("failed to render configuration")
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn guest_exit_codes_map_to_process_status() {
        assert_eq!(guest_exit_code(0), ExitCode::SUCCESS);
        assert_eq!(guest_exit_code(2), ExitCode::from(2));
        assert_eq!(guest_exit_code(255), ExitCode::from(255));
        assert_eq!(guest_exit_code(70_000), ExitCode::from(u8::MAX));
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn invoke_flags_parse() {
        let cli = Cli::try_parse_from([
            "webfunc",
            "--verbose",
            "invoke",
            "--module",
            "fn.wasm",
            "--method",
            "POST",
            "--path",
            "/hello",
            "-H",
            "X-A: 1",
            "-H",
            "X-B: 2",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Invoke {
                module,
                method,
                headers,
                ..
            } => {
                assert_eq!(module, Some(PathBuf::from("fn.wasm")));
                assert_eq!(method, "POST");
                assert_eq!(headers, vec!["X-A: 1".to_owned(), "X-B: 2".to_owned()]);
            },
            _ => panic!("expected invoke"),
        }
    }

    #[test]
    fn serve_bind_must_be_socket_addr() {
        assert!(Cli::try_parse_from(["webfunc", "serve", "--bind", "nowhere"]).is_err());
        assert!(Cli::try_parse_from(["webfunc", "serve", "--bind", "127.0.0.1:9000"]).is_ok());
    }

    #[test]
    fn global_config_after_subcommand() {
        let cli = Cli::try_parse_from(["webfunc", "config", "show", "--config", "c.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("c.toml")));
    }

    #[test]
    fn rendered_config_round_trips() {
        let rendered = render_config(&Config::default()).unwrap();
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, Config::default());
    }
}
