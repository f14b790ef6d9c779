use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use stagehand_contracts::ImageHandle;

/// Directory holding on-disk previews of the images currently on screen.
#[derive(Debug, Clone)]
pub struct PreviewStore {
    dir: PathBuf,
}

impl PreviewStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn create(&self, image: &ImageHandle, slot: &str) -> anyhow::Result<PreviewFile> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let path = self
            .dir
            .join(format!("{slot}-{}.{}", image.short_id(), image.extension()));
        fs::write(&path, image.bytes())
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(PreviewFile {
            path,
            image: image.clone(),
        })
    }
}

/// A preview reference. Holds the image it shows so a repeat sync of the
/// same snapshot keeps the file; the file is removed when this is dropped.
#[derive(Debug)]
pub struct PreviewFile {
    path: PathBuf,
    image: ImageHandle,
}

impl PreviewFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn previews(&self, image: &ImageHandle) -> bool {
        self.image.same_image(image)
    }
}

impl Drop for PreviewFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use stagehand_contracts::ImageHandle;

    use super::PreviewStore;

    #[test]
    fn preview_file_is_released_on_drop() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = PreviewStore::new(temp.path().join("previews"));
        let image = ImageHandle::new(vec![7u8; 8], "image/jpeg", "a.jpg");

        let preview = store.create(&image, "scene")?;
        let path = preview.path().to_path_buf();
        assert!(path.exists());
        assert!(path.to_string_lossy().ends_with(".jpg"));
        assert!(preview.previews(&image));
        assert_eq!(std::fs::read(&path)?, vec![7u8; 8]);

        drop(preview);
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn replacing_a_slot_releases_the_old_file() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = PreviewStore::new(temp.path());
        let first = ImageHandle::new(vec![1u8], "image/png", "1.png");
        let second = ImageHandle::new(vec![2u8], "image/png", "2.png");

        let mut slot = Some(store.create(&first, "display")?);
        let old_path = slot.as_ref().map(|p| p.path().to_path_buf()).unwrap_or_default();
        slot = Some(store.create(&second, "display")?);

        assert!(!old_path.exists());
        assert!(slot.as_ref().map(|p| p.path().exists()).unwrap_or(false));
        assert!(!slot.as_ref().map(|p| p.previews(&first)).unwrap_or(true));
        Ok(())
    }
}
