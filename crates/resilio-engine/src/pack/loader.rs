use super::definition::SelectorPack;
use crate::store::SelectorStore;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum PackLoadError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("YAML parse error in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Glob pattern error: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("Glob iteration error: {0}")]
    Glob(#[from] glob::GlobError),
    #[error("Pack directory not found at {0}")]
    DirectoryNotFound(PathBuf),
    #[error("Pack at {0} has no name")]
    Unnamed(PathBuf),
}

pub struct PackLoader;

impl PackLoader {
    pub async fn load_file(path: &Path) -> Result<SelectorPack, PackLoadError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| PackLoadError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let pack: SelectorPack =
            serde_yaml::from_str(&content).map_err(|source| PackLoadError::Yaml {
                path: path.to_path_buf(),
                source,
            })?;
        if pack.pack.trim().is_empty() {
            return Err(PackLoadError::Unnamed(path.to_path_buf()));
        }
        Ok(pack)
    }

    /// Load every `*.yaml`/`*.yml` file in `dir`, sorted by path. Files that
    /// fail to parse are skipped with a warning.
    pub async fn load_dir(dir: &Path) -> Result<Vec<SelectorPack>, PackLoadError> {
        if !dir.is_dir() {
            return Err(PackLoadError::DirectoryNotFound(dir.to_path_buf()));
        }

        let mut files = Vec::new();
        for extension in ["yaml", "yml"] {
            let pattern = dir.join(format!("*.{extension}"));
            let pattern_str = pattern.to_str().ok_or(PackLoadError::Pattern(glob::PatternError {
                pos: 0,
                msg: "Invalid UTF-8 path",
            }))?;
            for entry in glob::glob(pattern_str)? {
                let entry_path = entry?;
                if entry_path.is_file() {
                    files.push(entry_path);
                }
            }
        }
        files.sort();

        let mut packs = Vec::with_capacity(files.len());
        for file in files {
            match Self::load_file(&file).await {
                Ok(pack) => packs.push(pack),
                Err(e) => warn!(error = %e, "skipping invalid selector pack"),
            }
        }
        Ok(packs)
    }

    /// Load packs from each directory in order. Missing directories are
    /// skipped.
    pub async fn load_all(dirs: &[PathBuf]) -> Result<Vec<SelectorPack>, PackLoadError> {
        let mut packs = Vec::new();
        for dir in dirs {
            match Self::load_dir(dir).await {
                Ok(mut loaded) => packs.append(&mut loaded),
                Err(PackLoadError::DirectoryNotFound(path)) => {
                    debug!(path = %path.display(), "pack directory not present");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(packs)
    }

    /// Register the packs' selectors as builtins. When several packs define
    /// the same action, their lists are concatenated in load order.
    pub fn install(packs: &[SelectorPack], store: &SelectorStore) -> usize {
        let mut merged: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for pack in packs {
            info!(pack = %pack.pack, selectors = pack.selector_count(), "installing selector pack");
            for (action_key, selectors) in &pack.actions {
                merged
                    .entry(action_key.as_str())
                    .or_default()
                    .extend(selectors.iter().map(String::as_str));
            }
        }

        for (action_key, selectors) in &merged {
            store.register_builtins(action_key, selectors.iter().copied());
        }
        merged.len()
    }
}
