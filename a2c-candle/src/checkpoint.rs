use anyhow::{Context, Result};
use candle_nn::VarMap;
use std::path::Path;
use tracing::info;

/// Writes every variable of `varmap` to a safetensors file.
pub fn save_checkpoint(varmap: &VarMap, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating checkpoint directory {}", parent.display()))?;
    }
    varmap
        .save(path)
        .with_context(|| format!("saving checkpoint to {}", path.display()))?;
    info!("saved checkpoint to {}", path.display());
    Ok(())
}

/// Overwrites the variables of `varmap` with the ones stored at `path`. Returns false when there
/// is nothing to resume from.
pub fn load_checkpoint_if_exists(varmap: &mut VarMap, path: impl AsRef<Path>) -> Result<bool> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(false);
    }
    varmap
        .load(path)
        .with_context(|| format!("loading checkpoint from {}", path.display()))?;
    info!("resumed from checkpoint {}", path.display());
    Ok(true)
}
