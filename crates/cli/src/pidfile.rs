//! PID file lifecycle (`spec.md` §6 On-disk layout): decimal PID,
//! newline-terminated, written on boot and removed on clean shutdown.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

const PID_FILE_NAME: &str = "vargos.pid";

pub fn write(data_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    let path = data_dir.join(PID_FILE_NAME);
    std::fs::write(&path, format!("{}\n", std::process::id()))
        .with_context(|| format!("writing pid file {}", path.display()))?;
    Ok(path)
}

pub fn remove(path: &Path) {
    let _ = std::fs::remove_file(path);
}
