use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use clap::Args;

use crate::error::BoundaryError;
use crate::ledger::Ledger;

pub const DEFAULT_STATE_PATH: &str = "anthocoin.state.json";
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Clone, Debug, Args)]
pub struct CliConfig {
    /// Ledger snapshot file
    #[arg(long = "state", env = "ANTHO_STATE", default_value = DEFAULT_STATE_PATH, global = true)]
    pub state_path: PathBuf,

    /// tracing filter directive, e.g. `debug` or `antho_ledger=trace`
    #[arg(long = "log", env = "ANTHO_LOG", default_value = DEFAULT_LOG_FILTER, global = true)]
    pub log_filter: String,
}

impl CliConfig {
    pub fn state_path(&self) -> &Path {
        &self.state_path
    }
}

pub fn load_ledger(path: &Path) -> Result<Ledger, BoundaryError> {
    let bytes = fs::read(path)?;
    let snapshot = serde_json::from_slice(&bytes)?;
    Ledger::restore(snapshot)
}

/// Writes the snapshot next to `path` first, then renames over it.
pub fn save_ledger(path: &Path, ledger: &Ledger) -> Result<(), BoundaryError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_vec_pretty(&ledger.snapshot())?;
    let tmp = path.with_extension("json.tmp");
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(&json)?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}
