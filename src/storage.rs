//! Per-owner blob directory: `<root>/<owner>/<filename>`.

use anyhow::{bail, Context, Result};
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("create files dir {}", root.display()))?;
        Ok(Self { root })
    }

    /// Create the private directory for a newly registered user.
    pub fn provision(&self, owner: &str) -> Result<()> {
        let dir = self.owner_dir(owner)?;
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("provision {}", dir.display()))?;
        Ok(())
    }

    pub fn write(&self, owner: &str, filename: &str, bytes: &[u8]) -> Result<()> {
        let dir = self.owner_dir(owner)?;
        // Users registered before their directory existed still get one.
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(single_component(filename)?);
        std::fs::write(&path, bytes).with_context(|| format!("write {}", path.display()))
    }

    pub fn contains(&self, owner: &str, filename: &str) -> bool {
        self.blob_path(owner, filename).is_ok_and(|path| path.is_file())
    }

    pub fn remove(&self, owner: &str, filename: &str) -> Result<()> {
        let path = self.blob_path(owner, filename)?;
        std::fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))
    }

    /// `None` when no blob exists for `(owner, filename)`.
    pub fn read(&self, owner: &str, filename: &str) -> Result<Option<Vec<u8>>> {
        let path = self.blob_path(owner, filename)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
        }
    }

    fn owner_dir(&self, owner: &str) -> Result<PathBuf> {
        Ok(self.root.join(single_component(owner)?))
    }

    fn blob_path(&self, owner: &str, filename: &str) -> Result<PathBuf> {
        Ok(self.owner_dir(owner)?.join(single_component(filename)?))
    }
}

/// Accept only one plain path component, so nothing escapes the root.
fn single_component(name: &str) -> Result<&str> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(name),
        _ => bail!("refusing unsafe path component '{name}'"),
    }
}
