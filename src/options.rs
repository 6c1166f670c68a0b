use std::{
    env,
    ffi::OsString,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::{parser::ValueSource, ArgAction, ArgMatches, CommandFactory, FromArgMatches, Parser};
use config::{Config, ConfigError, FileFormat};
use itertools::chain;
use log::LevelFilter;
use serde::Deserialize;
use tokio::sync::Semaphore;

use crate::{
    credentials::{CONNECTION_STRING_ENV, DEFAULT_FILENAME},
    exit_error,
};

pub const DEFAULT_DIRECTORY: &str = "build";
pub const DEFAULT_CONTAINER: &str = "$web";
const CONFIG_FILENAME: &str = "blob-uploader.toml";

#[derive(Deserialize, Default, Debug)]
#[serde(rename_all = "kebab-case")]
pub struct FileConfig {
    filename: Option<PathBuf>,
    directory: Option<PathBuf>,
    container: Option<String>,
    concurrency: Option<usize>,
    timeout: Option<String>,
    overwrite: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(config::File::from(path).format(FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    // Values only fill arguments left to their defaults on the command line and
    // in the environment.
    fn as_args(&self, matches: &ArgMatches) -> Vec<OsString> {
        let unset = |id: &str| {
            matches!(
                matches.value_source(id),
                None | Some(ValueSource::DefaultValue)
            )
        };

        let mut args = Vec::<OsString>::new();
        if let Some(filename) = self.filename.as_ref().filter(|_| unset("filename")) {
            args.extend(["--filename".into(), filename.into()]);
        }
        if let Some(directory) = self.directory.as_ref().filter(|_| unset("directory")) {
            args.extend(["--directory".into(), directory.into()]);
        }
        if let Some(container) = self.container.as_ref().filter(|_| unset("container")) {
            args.extend(["--container".into(), container.into()]);
        }
        if let Some(concurrency) = self.concurrency.filter(|_| unset("concurrency")) {
            args.extend(["--concurrency".into(), concurrency.to_string().into()]);
        }
        if let Some(timeout) = self.timeout.as_ref().filter(|_| unset("timeout")) {
            args.extend(["--timeout".into(), timeout.into()]);
        }
        if self.overwrite == Some(false) && unset("no_overwrite") {
            args.push("--no-overwrite".into());
        }
        args
    }
}

#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Options {
    /// Increase logs verbosity (Error (default), Warn, Info, Debug, Trace).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub log_level: u8,
    /// TOML configuration file [default: <config dir>/blob-uploader.toml].
    #[arg(short = 'C', long, env = "BLOB_UPLOADER_CONFIG")]
    pub config: Option<PathBuf>,
    /// File holding the storage connection string.
    #[arg(short = 'f', long, env = "BLOB_UPLOADER_FILENAME", default_value = DEFAULT_FILENAME)]
    pub filename: PathBuf,
    /// Local directory to upload.
    #[arg(short = 'd', long, env = "BLOB_UPLOADER_DIRECTORY", default_value = DEFAULT_DIRECTORY)]
    pub directory: PathBuf,
    /// Destination container.
    #[arg(short = 'c', long, env = "BLOB_UPLOADER_CONTAINER", default_value = DEFAULT_CONTAINER)]
    pub container: String,
    /// Fail instead of replacing blobs that already exist.
    #[arg(long, env = "BLOB_UPLOADER_NO_OVERWRITE")]
    pub no_overwrite: bool,
    /// Maximum number of simultaneous uploads (unbounded by default).
    #[arg(short = 'j', long, env = "BLOB_UPLOADER_CONCURRENCY", value_parser(parse_concurrency))]
    pub concurrency: Option<usize>,
    /// Timeout of each upload (e.g. 30s, 5m). Zero disables it.
    #[arg(short = 't', long, env = "BLOB_UPLOADER_TIMEOUT", default_value = "5m", value_parser(parse_duration))]
    pub timeout: Duration,
    /// Only print failures and the final summary.
    #[arg(short = 'q', long)]
    pub quiet: bool,
    /// Connection string, used instead of the credential file.
    #[arg(long, env = CONNECTION_STRING_ENV, hide_env_values = true)]
    pub connection_string: Option<String>,
}

impl Options {
    pub fn parse() -> Self {
        let args = env::args_os().collect::<Vec<_>>();
        let matches = Self::command().get_matches_from(args.clone());
        let options = Self::from_arg_matches(&matches).unwrap_or_else(|err| err.exit());

        let config = match options.config_file() {
            Ok(Some(config)) => config,
            Ok(None) => return options,
            Err(err) => exit_error!("Cannot load configuration: {}", err),
        };
        Self::with_config(&args, &matches, &config).unwrap_or_else(|err| err.exit())
    }

    fn with_config(
        args: &[OsString],
        matches: &ArgMatches,
        config: &FileConfig,
    ) -> Result<Self, clap::Error> {
        Self::try_parse_from(chain!(
            args.iter().take(1).cloned(),
            config.as_args(matches),
            args.iter().skip(1).cloned()
        ))
    }

    /// Explicit configuration file, or the default one when it exists.
    pub fn config_path(&self) -> Option<PathBuf> {
        match &self.config {
            Some(path) => Some(path.clone()),
            None => dirs::config_dir()
                .map(|d| d.join(CONFIG_FILENAME))
                .filter(|path| path.is_file()),
        }
    }

    fn config_file(&self) -> Result<Option<FileConfig>, ConfigError> {
        self.config_path()
            .map(|path| FileConfig::load(&path))
            .transpose()
    }

    pub fn log_level(&self) -> LevelFilter {
        use LevelFilter::*;
        match self.log_level {
            0 => Error,
            1 => Warn,
            2 => Info,
            3 => Debug,
            _ => Trace,
        }
    }

    pub fn overwrite(&self) -> bool {
        !self.no_overwrite
    }

    pub fn timeout(&self) -> Option<Duration> {
        (!self.timeout.is_zero()).then_some(self.timeout)
    }
}

fn parse_concurrency(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_owned()),
        Ok(n) if n > Semaphore::MAX_PERMITS => {
            Err(format!("must be at most {}", Semaphore::MAX_PERMITS))
        }
        Ok(n) => Ok(n),
        Err(err) => Err(err.to_string()),
    }
}

fn parse_duration(s: &str) -> Result<Duration, humantime::DurationError> {
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    s.parse::<humantime::Duration>().map(Into::into)
}
