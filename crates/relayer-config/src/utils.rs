// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use config::{Config, File};
use std::path::{Path, PathBuf};

use super::*;

/// A helper function that will search for all config files in the given directory and return them as a vec
/// of the paths.
///
/// Supported file extensions are:
/// - `.toml`.
/// - `.json`.
pub fn search_config_files<P: AsRef<Path>>(
    base_dir: P,
) -> webb_relayer_utils::Result<Vec<PathBuf>> {
    // A pattern that covers all toml or json files in the config directory and subdirectories.
    let toml_pattern = format!("{}/**/*.toml", base_dir.as_ref().display());
    let json_pattern = format!("{}/**/*.json", base_dir.as_ref().display());
    tracing::trace!(
        "Loading config files from {} and {}",
        toml_pattern,
        json_pattern
    );
    let toml_files = glob::glob(&toml_pattern)?;
    let json_files = glob::glob(&json_pattern)?;
    toml_files
        .chain(json_files)
        .map(|v| v.map_err(webb_relayer_utils::Error::from))
        .collect()
}

/// Try to parse the [`RelayerConfig`] from the given config file(s).
pub fn parse_from_files(
    files: &[PathBuf],
) -> webb_relayer_utils::Result<RelayerConfig> {
    let mut builder = Config::builder();
    for config_file in files {
        tracing::trace!("Loading config file: {}", config_file.display());
        // get file extension
        let ext = config_file
            .extension()
            .map(|e| e.to_str().unwrap_or(""))
            .unwrap_or("");
        let format = match ext {
            "toml" => config::FileFormat::Toml,
            "json" => config::FileFormat::Json,
            _ => {
                tracing::warn!("Unknown file extension: {}", ext);
                continue;
            }
        };
        builder = builder
            .add_source(File::from(config_file.as_path()).format(format));
    }

    // also merge in the environment (with a prefix of WEBB).
    let builder = builder
        .add_source(config::Environment::with_prefix("WEBB").separator("__"));
    let cfg = builder.build()?;
    // and finally deserialize the config and post-process it
    let config: Result<
        RelayerConfig,
        serde_path_to_error::Error<config::ConfigError>,
    > = serde_path_to_error::deserialize(cfg);
    match config {
        Ok(c) => postloading_process(c),
        Err(e) => {
            tracing::error!("{}", e);
            Err(e.into())
        }
    }
}

/// Load the configuration files and
///
/// Returns `Ok(RelayerConfig)` on success, or an error on failure.
///
/// it is the same as using the [`search_config_files`] and [`parse_from_files`] functions combined.
pub fn load<P: AsRef<Path>>(
    path: P,
) -> webb_relayer_utils::Result<RelayerConfig> {
    parse_from_files(&search_config_files(path)?)
}

/// The postloading_process exists to validate configuration and standardize
/// the format of the configuration
pub fn postloading_process(
    mut config: RelayerConfig,
) -> webb_relayer_utils::Result<RelayerConfig> {
    tracing::trace!("Checking configration sanity ...");

    // 1. drain everything, and take enabled chains.
    let old_evm = config
        .evm
        .drain()
        .filter(|(_, chain)| chain.enabled)
        .collect::<HashMap<_, _>>();
    // 2. insert them again, keyed by chain id.
    for (_, v) in old_evm {
        if v.chain_id == config.coordinator.chain_id {
            tracing::warn!(
                "!!WARNING!!: chain {} is the coordination chain and cannot be observed as an evm chain",
                v.chain_id
            );
            continue;
        }
        config.evm.insert(v.chain_id.to_string(), v);
    }
    if config.evm.is_empty() {
        tracing::warn!("!!WARNING!!: no evm chain is enabled in the config");
    }

    config.compliance.restricted_addresses = config
        .compliance
        .restricted_addresses
        .iter()
        .map(|a| a.trim().to_lowercase())
        .filter(|a| !a.is_empty())
        .collect();

    config.verify()?;

    tracing::trace!(
        "postloaded config: {}",
        serde_json::to_string_pretty(&config)?
    );

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
port = 9000

[coordinator]
chain-id = 186
name = "coordinator"
endpoint = "http://127.0.0.1:1317"
operator-address = "relayer1operator"

[evm.sepolia]
name = "sepolia"
chain-id = 11155111
http-endpoints = ["http://127.0.0.1:8545"]
force-start-height = 42

[evm.disabled]
name = "disabled"
chain-id = 5
enabled = false
http-endpoints = ["http://127.0.0.1:8546"]

[evm.loop]
name = "loop"
chain-id = 186
http-endpoints = ["http://127.0.0.1:8547"]

[compliance]
restricted-addresses = ["0xABCDEF0000000000000000000000000000000001", " "]
"#;

    fn write_config(dir: &Path, content: &str) {
        std::fs::write(dir.join("main.toml"), content).unwrap();
    }

    #[test]
    fn loads_and_normalises_the_config() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), CONFIG);
        let config = load(dir.path()).unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.coordinator.max_msgs_per_tx, 13);
        assert_eq!(config.coordinator.block_time_secs, 6);
        // disabled chains and the coordination chain are dropped.
        assert_eq!(config.evm.len(), 1);
        let sepolia = config.evm_chain(11155111).unwrap();
        assert_eq!(sepolia.force_start_height, 42);
        assert_eq!(sepolia.max_latest_indexed_block_gap, 100);
        assert!(config.evm.contains_key("11155111"));
        assert_eq!(
            config.compliance.restricted_addresses,
            vec!["0xabcdef0000000000000000000000000000000001".to_string()]
        );
        assert_eq!(config.tss.keygen_poll_interval_ms, 1_000);
    }

    #[test]
    fn rejects_tiny_batches() {
        let dir = tempfile::tempdir().unwrap();
        let content = CONFIG.replace(
            "operator-address = \"relayer1operator\"",
            "operator-address = \"relayer1operator\"\nmax-msgs-per-tx = 1",
        );
        write_config(dir.path(), &content);
        assert!(load(dir.path()).is_err());
    }
}
