use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

pub const DEFAULT_AVATAR_NAME: &str = "default_avatar.svg";

const PHOTO_EXTENSIONS: [&str; 4] = [".jpg", ".jpeg", ".png", ".webp"];

const DEFAULT_AVATAR_SVG: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="512" height="512" viewBox="0 0 512 512">
  <defs>
    <linearGradient id="g" x1="0" y1="0" x2="1" y2="1">
      <stop offset="0" stop-color="#7C4DFF"/>
      <stop offset="1" stop-color="#00E5FF"/>
    </linearGradient>
  </defs>
  <rect width="512" height="512" rx="256" fill="url(#g)"/>
  <circle cx="256" cy="210" r="86" fill="rgba(0,0,0,0.28)"/>
  <path d="M128 444c22-78 76-118 128-118s106 40 128 118" fill="rgba(0,0,0,0.28)"/>
</svg>
"##;

/// Flat on-disk store for profile photos and chat attachments.
///
/// Every upload lands at `{dir}/{uuid}{ext}`. The returned path is what gets
/// persisted; clients only ever see the public URL built from its file name.
pub struct PhotoStore {
    dir: PathBuf,
    public_base_url: String,
}

impl PhotoStore {
    pub async fn new(dir: PathBuf, public_base_url: String) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Upload directory: {}", dir.display());
        Ok(Self {
            dir,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes the placeholder avatar unless one is already there.
    pub async fn ensure_default_avatar(&self) -> Result<PathBuf> {
        let path = self.dir.join(DEFAULT_AVATAR_NAME);
        if fs::try_exists(&path).await? {
            return Ok(path);
        }
        fs::write(&path, DEFAULT_AVATAR_SVG).await?;
        info!("Created default avatar at {}", path.display());
        Ok(path)
    }

    /// Stores a profile photo. Unknown or missing extensions become `.jpg`.
    pub async fn save_photo(&self, original_name: Option<&str>, data: &[u8]) -> Result<String> {
        self.write_new(photo_extension(original_name), data).await
    }

    /// Stores a chat attachment, keeping a sane extension from the client's file name.
    pub async fn save_attachment(&self, original_name: Option<&str>, data: &[u8]) -> Result<String> {
        self.write_new(&attachment_extension(original_name), data).await
    }

    async fn write_new(&self, ext: &str, data: &[u8]) -> Result<String> {
        if data.is_empty() {
            bail!("refusing to store an empty upload");
        }

        let path = self.dir.join(format!("{}{}", Uuid::new_v4(), ext));
        let mut file = fs::File::create(&path).await?;
        file.write_all(data).await?;
        file.flush().await?;

        Ok(path.to_string_lossy().into_owned())
    }

    /// Removes a previously stored file. Missing files are not an error.
    pub async fn delete(&self, stored_path: &str) -> Result<()> {
        let Some(name) = file_name(stored_path) else {
            bail!("not a stored file: {}", stored_path);
        };
        match fs::remove_file(self.dir.join(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Stored file {} already gone", stored_path);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort removal of a file whose owning write failed.
    pub async fn discard(&self, stored_path: &str) {
        if let Err(e) = self.delete(stored_path).await {
            warn!("Failed to remove orphaned file {}: {}", stored_path, e);
        }
    }

    /// Public URL for a persisted path: `{public_base_url}/static/{file name}`.
    pub fn public_url(&self, stored_path: &str) -> String {
        let name = file_name(stored_path).unwrap_or(DEFAULT_AVATAR_NAME);
        format!("{}/static/{}", self.public_base_url, name)
    }
}

fn file_name(stored_path: &str) -> Option<&str> {
    Path::new(stored_path).file_name().and_then(|n| n.to_str())
}

fn lowercase_extension(original_name: Option<&str>) -> Option<String> {
    let ext = Path::new(original_name?).extension()?.to_str()?;
    Some(format!(".{}", ext.to_ascii_lowercase()))
}

fn photo_extension(original_name: Option<&str>) -> &'static str {
    let ext = lowercase_extension(original_name);
    PHOTO_EXTENSIONS
        .iter()
        .find(|known| Some(**known) == ext.as_deref())
        .copied()
        .unwrap_or(".jpg")
}

fn attachment_extension(original_name: Option<&str>) -> String {
    match lowercase_extension(original_name) {
        Some(ext) if ext.len() <= 9 && ext[1..].chars().all(|c| c.is_ascii_alphanumeric()) => ext,
        _ => ".bin".to_string(),
    }
}
