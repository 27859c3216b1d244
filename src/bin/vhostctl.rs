use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::Value;

use vhost_config::config::{load_config, ConfigError, ResolvedConfig};
use vhost_config::observability::logging::{init_logging, LogFormat};

#[derive(Parser)]
#[command(name = "vhostctl")]
#[command(about = "Inspect and check virtual host configuration", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration and print every problem found
    Check {
        path: PathBuf,
        /// Print diagnostics as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the resolved configuration as JSON
    Show {
        path: PathBuf,
        /// Only this virtual host (name, alias or host:port)
        #[arg(long)]
        vhost: Option<String>,
        /// Include where each vhost field got its value
        #[arg(long)]
        origins: bool,
    },
    /// Show which virtual host serves a hostname
    Lookup { path: PathBuf, host: String },
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(LogFormat::Text);

    match cli.command {
        Commands::Check { path, json } => match load_config(&path) {
            Ok(config) => {
                println!(
                    "{}: OK ({} virtual hosts, {} source files)",
                    path.display(),
                    config.virtual_hosts().len(),
                    config.sources().len()
                );
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                print_diagnostics(&e, json)?;
                Ok(ExitCode::FAILURE)
            }
        },
        Commands::Show { path, vhost, origins } => {
            let Some(config) = load_or_report(&path)? else {
                return Ok(ExitCode::FAILURE);
            };
            let mut value = match vhost {
                Some(host) => serde_json::to_value(config.lookup_virtual_host(&host)?)?,
                None => serde_json::to_value(&config)?,
            };
            if !origins {
                strip_origins(&mut value);
            }
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Lookup { path, host } => {
            let Some(config) = load_or_report(&path)? else {
                return Ok(ExitCode::FAILURE);
            };
            match config.lookup_virtual_host(&host) {
                Ok(vhost) => {
                    println!("{} -> {} (docroot {})", host, vhost.name, vhost.docroot.as_deref().unwrap_or("-"));
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    eprintln!("{e}");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}

/// Load `path`, printing diagnostics instead of returning a broken config.
fn load_or_report(path: &Path) -> Result<Option<ResolvedConfig>, serde_json::Error> {
    match load_config(path) {
        Ok(config) => Ok(Some(config)),
        Err(e) => {
            print_diagnostics(&e, false)?;
            Ok(None)
        }
    }
}

fn print_diagnostics(err: &ConfigError, json: bool) -> Result<(), serde_json::Error> {
    let diagnostics = err.diagnostics();
    if json {
        println!("{}", serde_json::to_string_pretty(&diagnostics)?);
    } else {
        eprintln!("Error: {} problem(s) found", diagnostics.len());
        for diag in diagnostics {
            eprintln!("  {}: {}", diag.path, diag.message);
        }
    }
    Ok(())
}

fn strip_origins(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.remove("origins");
            for child in map.values_mut() {
                strip_origins(child);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(strip_origins),
        _ => {}
    }
}
