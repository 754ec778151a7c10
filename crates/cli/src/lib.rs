//! runledger CLI
//!
//! Command-line front end for the post-run pipeline, selector ranking,
//! audit verification and the tool server.

pub mod commands;
pub mod output;

use std::path::Path;

use anyhow::Context;
use runledger_common::{Error, RunledgerConfig, PIPELINE_FAULT_EXIT_CODE};

/// Resolve configuration from the global flags.
///
/// An explicit config file is read as-is; otherwise `runledger.toml` is
/// looked up in the base directory. `--base-dir` always wins over the file.
pub fn load_config(base_dir: Option<&Path>, config_path: Option<&Path>) -> anyhow::Result<RunledgerConfig> {
    let mut config = match (config_path, base_dir) {
        (Some(path), _) => RunledgerConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        (None, Some(base)) => RunledgerConfig::load_from_base(base)?,
        (None, None) => RunledgerConfig::load_from_base(Path::new("."))?,
    };
    if let Some(base) = base_dir {
        config.base_dir = base.to_path_buf();
    }
    Ok(config)
}

/// Process exit code for a failed command
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<Error>())
        .map(Error::exit_code)
        .unwrap_or(PIPELINE_FAULT_EXIT_CODE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_base_dir_overrides_config_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("custom.toml");
        std::fs::write(&path, "base_dir = \"/elsewhere\"\nreports_dir = \"out\"\n").unwrap();

        let config = load_config(Some(tmp.path()), Some(&path)).unwrap();
        assert_eq!(config.base_dir, tmp.path());
        assert_eq!(config.reports_path(), tmp.path().join("out"));

        let config = load_config(None, Some(&path)).unwrap();
        assert_eq!(config.base_dir, PathBuf::from("/elsewhere"));
    }

    #[test]
    fn test_exit_codes() {
        let governance: anyhow::Error = Error::GovernanceFailure {
            exit_code: 4,
            is_flaky: false,
        }
        .into();
        assert_eq!(exit_code_for(&governance), 4);

        let wrapped = anyhow::Error::from(Error::RunNotFound("x".into())).context("getRun");
        assert_eq!(exit_code_for(&wrapped), PIPELINE_FAULT_EXIT_CODE);

        assert_eq!(exit_code_for(&anyhow::anyhow!("other")), PIPELINE_FAULT_EXIT_CODE);
    }
}
