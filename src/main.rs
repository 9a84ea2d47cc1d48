mod artifact;
mod config;
mod contract;
mod header;
mod pin;
mod probe;
mod settings;
mod validation;

use crate::artifact::{ArtifactError, Format};
use crate::config::{Config, ConfigError};
use crate::probe::{BrokerProbe, ProbeError};
use crate::settings::Settings;
use crate::validation::ValidationErrors;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use thiserror::Error;
use tracing::{error, info, warn};

/// Manage the build-time settings of an MMRC client.
#[derive(Parser)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the effective settings
    Show {
        /// Output format
        #[arg(short, long, value_enum, default_value = "json")]
        format: Format,
        /// Read the headers in the settings directory instead of defaults + environment
        #[arg(long)]
        from_dir: bool,
    },
    /// Parse and validate both settings headers
    Check {
        /// Directory holding the headers (defaults to MMRC_SETTINGS_DIR)
        dir: Option<PathBuf>,
    },
    /// Write the effective settings as a deployment artifact
    Render {
        #[arg(short, long, value_enum)]
        format: Format,
        /// Target directory (defaults to MMRC_SETTINGS_DIR)
        #[arg(short, long)]
        out: Option<PathBuf>,
        #[arg(long)]
        from_dir: bool,
    },
    /// Read a deployment artifact back and print it as JSON
    Import {
        #[arg(short, long, value_enum)]
        format: Format,
        dir: PathBuf,
    },
    /// Check that the configured broker accepts an MQTT connection
    Probe {
        #[arg(long)]
        from_dir: bool,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error(transparent)]
    Invalid(#[from] ValidationErrors),
    #[error(transparent)]
    Probe(#[from] ProbeError),
    #[error("Serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

fn load_settings(config: &Config, from_dir: bool) -> Result<Settings, CliError> {
    let settings = if from_dir {
        artifact::read_headers(&config.settings_dir)?
    } else {
        Settings::from_env()?
    };
    Ok(settings)
}

fn print_artifact(settings: &Settings, format: Format) -> Result<(), CliError> {
    for (_, contents) in artifact::render(settings, format)? {
        print!("{}", contents);
    }
    Ok(())
}

async fn run(cli: Cli, config: Config) -> Result<(), CliError> {
    match cli.command {
        Command::Show { format, from_dir } => {
            let settings = load_settings(&config, from_dir)?;
            print_artifact(&settings, format)?;
        }
        Command::Check { dir } => {
            let dir = dir.unwrap_or(config.settings_dir);
            let settings = artifact::read_headers(&dir)?;
            if let Err(errors) = settings.validate() {
                for issue in errors.issues() {
                    error!("{}", issue);
                }
                return Err(errors.into());
            }
            info!("Settings in {} are valid.", dir.display());
        }
        Command::Render {
            format,
            out,
            from_dir,
        } => {
            let settings = load_settings(&config, from_dir)?;
            if let Err(errors) = settings.validate() {
                warn!("Rendering settings with problems: {}", errors);
            }
            let out = out.unwrap_or_else(|| config.settings_dir.clone());
            for path in artifact::write(&settings, &out, format)? {
                info!("Wrote {}", path.display());
            }
        }
        Command::Import { format, dir } => {
            let settings = artifact::read(&dir, format)?;
            settings.validate()?;
            print_artifact(&settings, Format::Json)?;
        }
        Command::Probe { from_dir } => {
            let settings = load_settings(&config, from_dir)?;
            let probe = BrokerProbe::new(&settings.client, &config)?;
            let attempts = probe.run().await?;
            info!(
                "Broker {} reachable ({} attempt(s)).",
                probe.address(),
                attempts
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_env();

    // Initialize logging
    let level = config
        .as_ref()
        .map(|c| c.log_level)
        .unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let config = match config {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Error loading configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_render_arguments() {
        let cli = Cli::try_parse_from(["mmrc-settings", "render", "--format", "env", "-o", "out"])
            .unwrap();
        match cli.command {
            Command::Render { format, out, from_dir } => {
                assert_eq!(format, Format::Env);
                assert_eq!(out, Some(PathBuf::from("out")));
                assert!(!from_dir);
            }
            _ => panic!("expected render"),
        }
    }

    #[test]
    fn render_requires_format() {
        assert!(Cli::try_parse_from(["mmrc-settings", "render"]).is_err());
    }
}
