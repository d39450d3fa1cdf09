use crate::RelayerConfig;
use anyhow::Context;
use directories_next::ProjectDirs;
use std::path::{Path, PathBuf};
use structopt::StructOpt;
use tracing::Level;

/// Qualifier, organization and application name of the relayer's OS
/// specific config and data directories.
pub const PACKAGE_ID: [&str; 3] = ["tools", "webb", "bridge-relayer"];

/// The Bridge Relayer Command-line tool
///
/// $ bridge-relayer -vvv -c <CONFIG_DIR>
#[derive(Debug, StructOpt)]
#[structopt(name = "Bridge Relayer")]
pub struct Opts {
    /// A level of verbosity, and can be used multiple times
    #[structopt(short, long, parse(from_occurrences))]
    pub verbose: i32,
    /// Directory that contains configration files.
    #[structopt(
        short = "c",
        long = "config-dir",
        value_name = "PATH",
        parse(from_os_str)
    )]
    pub config_dir: Option<PathBuf>,
    /// Keep the store in a temporary directory, removed on exit.
    #[structopt(long)]
    pub tmp: bool,
}

fn project_dirs() -> anyhow::Result<ProjectDirs> {
    let [qualifier, organization, application] = PACKAGE_ID;
    ProjectDirs::from(qualifier, organization, application)
        .context("no home directory to derive the relayer directories from")
}

/// Loads every config file of `config_dir`, or of the OS config directory
/// of the relayer when none is given.
pub fn load_config<P>(config_dir: Option<P>) -> anyhow::Result<RelayerConfig>
where
    P: AsRef<Path>,
{
    let dir = match config_dir {
        Some(dir) => dir.as_ref().to_path_buf(),
        None => project_dirs()?.config_dir().to_path_buf(),
    };
    anyhow::ensure!(dir.is_dir(), "{} is not a directory", dir.display());
    tracing::trace!(dir = %dir.display(), "Loading the config");
    Ok(crate::utils::load(dir)?)
}

/// Maps the number of `-v` flags to the level of the `webb` targets.
pub fn verbosity_level(verbosity: i32) -> Level {
    match verbosity {
        i32::MIN..=0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Installs the global subscriber: pretty stdout filtered by `verbosity`
/// and `RUST_LOG`, plus the compliance audit log appended to
/// `compliance_log` when given.
pub fn setup_logger(
    verbosity: i32,
    compliance_log: Option<&Path>,
) -> anyhow::Result<()> {
    use tracing_subscriber::filter::Targets;
    use tracing_subscriber::prelude::*;

    let directive = format!("webb={}", verbosity_level(verbosity))
        .parse()
        .context("invalid log directive")?;
    let stdout = tracing_subscriber::fmt::layer()
        .with_target(true)
        .pretty()
        .with_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(directive),
        );

    let compliance = match compliance_log {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            let audit = Targets::new().with_target(
                webb_relayer_utils::probe::COMPLIANCE_TARGET,
                Level::INFO,
            );
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file))
                    .with_filter(audit),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stdout)
        .with(compliance)
        .try_init()
        .context("failed to install the logger")
}

/// Where the store lives: a `store` directory next to the config directory
/// when one is given, otherwise under the OS data directory.
pub fn store_path(config_dir: Option<&Path>) -> anyhow::Result<PathBuf> {
    match config_dir {
        Some(dir) => Ok(dir.parent().unwrap_or(dir).join("store")),
        None => Ok(project_dirs()?.data_local_dir().join("store")),
    }
}

/// Opens the store selected by `opts`.
pub async fn create_store(
    opts: &Opts,
) -> anyhow::Result<webb_relayer_store::SledStore> {
    if opts.tmp {
        tracing::debug!("Using a temporary store");
        return Ok(webb_relayer_store::SledStore::temporary()?);
    }
    let path = store_path(opts.config_dir.as_deref())?;
    tracing::debug!(path = %path.display(), "Opening the store");
    Ok(webb_relayer_store::SledStore::open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_saturates_at_both_ends() {
        assert_eq!(verbosity_level(-1), Level::ERROR);
        assert_eq!(verbosity_level(0), Level::ERROR);
        assert_eq!(verbosity_level(2), Level::INFO);
        assert_eq!(verbosity_level(9), Level::TRACE);
    }

    #[test]
    fn store_sits_next_to_the_config_dir() {
        let path = store_path(Some(Path::new("/etc/relayer/config"))).unwrap();
        assert_eq!(path, PathBuf::from("/etc/relayer/store"));
    }

    #[test]
    fn config_path_must_be_a_directory() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = load_config(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("is not a directory"));
    }

    #[tokio::test]
    async fn tmp_store_ignores_the_config_dir() {
        let opts = Opts {
            verbose: 0,
            config_dir: Some(PathBuf::from("/nonexistent/config")),
            tmp: true,
        };
        assert!(create_store(&opts).await.is_ok());
    }
}
