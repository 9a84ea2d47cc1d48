use crate::contract::{CLIENT_HEADER_FILE, START_HEADER_FILE};
use crate::header::{self, HeaderError};
use crate::settings::{ClientSettings, Settings, SettingsError, StartSettings};
use clap::ValueEnum;
use log::{debug, info};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const JSON_FILE: &str = "settings.json";
pub const ENV_FILE: &str = "mmrc.env";

/// Deployment artifact layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// `MMRCsettings.h` and `mmrcSettings.h`
    Header,
    /// `settings.json`
    Json,
    /// `mmrc.env`
    Env,
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{}: {source}", .path.display())]
    Header { path: PathBuf, source: HeaderError },
    #[error("{}: {source}", .path.display())]
    Settings { path: PathBuf, source: SettingsError },
    #[error("{}: {source}", .path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("{}: {source}", .path.display())]
    Env {
        path: PathBuf,
        source: dotenvy::Error,
    },
}

fn read_file(path: &Path) -> Result<String, ArtifactError> {
    fs::read_to_string(path).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_file(path: PathBuf, contents: &str) -> Result<PathBuf, ArtifactError> {
    debug!("Writing {}", path.display());
    match fs::write(&path, contents) {
        Ok(()) => Ok(path),
        Err(source) => Err(ArtifactError::Io { path, source }),
    }
}

fn quote_env(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '$' => out.push_str("\\$"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Render `settings` in `format` without touching the filesystem. One `(file name, contents)`
/// pair per file of the artifact.
pub fn render(settings: &Settings, format: Format) -> Result<Vec<(&'static str, String)>, serde_json::Error> {
    let files = match format {
        Format::Header => vec![
            (
                CLIENT_HEADER_FILE,
                header::render(&settings.client.to_header_document()),
            ),
            (
                START_HEADER_FILE,
                header::render(&settings.start.to_header_document()),
            ),
        ],
        Format::Json => {
            let mut json = serde_json::to_string_pretty(settings)?;
            json.push('\n');
            vec![(JSON_FILE, json)]
        }
        Format::Env => {
            let mut env = String::from("# MMRC client settings\n");
            for (name, value) in settings.to_pairs() {
                env.push_str(&format!("{}={}\n", name, quote_env(&value)));
            }
            vec![(ENV_FILE, env)]
        }
    };
    Ok(files)
}

/// Write `settings` into `dir` and return the paths written.
pub fn write(settings: &Settings, dir: &Path, format: Format) -> Result<Vec<PathBuf>, ArtifactError> {
    fs::create_dir_all(dir).map_err(|source| ArtifactError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let files = render(settings, format).map_err(|source| ArtifactError::Json {
        path: dir.join(JSON_FILE),
        source,
    })?;

    let written = files
        .into_iter()
        .map(|(name, contents)| write_file(dir.join(name), &contents))
        .collect::<Result<Vec<_>, _>>()?;

    info!("Wrote {:?} artifact to {}", format, dir.display());
    Ok(written)
}

/// Load the two settings headers from `dir`.
pub fn read_headers(dir: &Path) -> Result<Settings, ArtifactError> {
    let client_path = dir.join(CLIENT_HEADER_FILE);
    let start_path = dir.join(START_HEADER_FILE);

    let client_header = header::parse(&read_file(&client_path)?).map_err(|source| {
        ArtifactError::Header {
            path: client_path.clone(),
            source,
        }
    })?;
    let start_header = header::parse(&read_file(&start_path)?).map_err(|source| {
        ArtifactError::Header {
            path: start_path.clone(),
            source,
        }
    })?;

    debug!(
        "Parsed {} + {} definitions from {}",
        client_header.len(),
        start_header.len(),
        dir.display()
    );

    let client = ClientSettings::from_header(&client_header).map_err(|source| {
        ArtifactError::Settings {
            path: client_path,
            source,
        }
    })?;
    let start = StartSettings::from_header(&start_header).map_err(|source| {
        ArtifactError::Settings {
            path: start_path,
            source,
        }
    })?;

    Ok(Settings { client, start })
}

/// Read an artifact previously produced by [`write`].
pub fn read(dir: &Path, format: Format) -> Result<Settings, ArtifactError> {
    match format {
        Format::Header => read_headers(dir),
        Format::Json => {
            let path = dir.join(JSON_FILE);
            let text = read_file(&path)?;
            serde_json::from_str(&text).map_err(|source| ArtifactError::Json { path, source })
        }
        Format::Env => {
            let path = dir.join(ENV_FILE);
            let env_error = |source: dotenvy::Error| ArtifactError::Env {
                path: path.clone(),
                source,
            };
            let vars = dotenvy::from_path_iter(&path)
                .map_err(env_error)?
                .collect::<Result<HashMap<String, String>, _>>()
                .map_err(env_error)?;

            Settings::from_lookup(|key| vars.get(key).cloned())
                .map_err(|source| ArtifactError::Settings { path, source })
        }
    }
}
