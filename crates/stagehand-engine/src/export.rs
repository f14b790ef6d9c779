use std::borrow::Cow;
use std::fs::{self, OpenOptions};
use std::io::{Cursor, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use image::ImageFormat;
use stagehand_contracts::ImageHandle;

const MAX_NAME_ATTEMPTS: u32 = 100;

/// `{app}-creation-{timestamp}.png`, with `-{n}` before the extension when
/// an earlier export already took the name.
pub fn download_file_name(app_name: &str, timestamp_ms: i64, attempt: u32) -> String {
    if attempt == 0 {
        format!("{app_name}-creation-{timestamp_ms}.png")
    } else {
        format!("{app_name}-creation-{timestamp_ms}-{attempt}.png")
    }
}

/// Saves the image as PNG into `dir`, re-encoding when it is another format.
/// Existing files are never overwritten.
pub fn download_image(image: &ImageHandle, dir: &Path, app_name: &str) -> Result<PathBuf> {
    let png = png_bytes(image)?;
    write_new_file(dir, app_name, chrono::Utc::now().timestamp_millis(), &png)
}

fn png_bytes(image: &ImageHandle) -> Result<Cow<'_, [u8]>> {
    if image.mime_type() == "image/png" {
        return Ok(Cow::Borrowed(image.bytes()));
    }
    let decoded = image::load_from_memory(image.bytes())
        .with_context(|| format!("failed to decode {} for export", image.file_name()))?;
    let mut encoded = Vec::new();
    decoded
        .write_to(&mut Cursor::new(&mut encoded), ImageFormat::Png)
        .with_context(|| format!("failed to encode {} as png", image.file_name()))?;
    Ok(Cow::Owned(encoded))
}

fn write_new_file(dir: &Path, app_name: &str, timestamp_ms: i64, bytes: &[u8]) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let path = dir.join(download_file_name(app_name, timestamp_ms, attempt));
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
            Err(err) => {
                return Err(err).with_context(|| format!("failed to create {}", path.display()))
            }
        };
        file.write_all(bytes)
            .with_context(|| format!("failed to write {}", path.display()))?;
        return Ok(path);
    }
    bail!(
        "no free download name for {app_name} at {timestamp_ms} in {}",
        dir.display()
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareOutcome {
    Shared,
    Cancelled,
    Unsupported,
}

impl ShareOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            ShareOutcome::Shared => "shared",
            ShareOutcome::Cancelled => "cancelled",
            ShareOutcome::Unsupported => "unsupported",
        }
    }
}

/// Platform share sheet. Cancellation is an outcome, not an error.
pub trait ShareTarget {
    fn share(&self, path: &Path, title: &str) -> Result<ShareOutcome>;
}

/// Hands the file to the desktop's default opener.
pub struct SystemShare;

impl SystemShare {
    fn command(path: &Path) -> Command {
        if cfg!(target_os = "macos") {
            let mut command = Command::new("open");
            command.arg(path);
            command
        } else if cfg!(target_os = "windows") {
            let mut command = Command::new("cmd");
            command.args(["/C", "start", ""]).arg(path);
            command
        } else {
            let mut command = Command::new("xdg-open");
            command.arg(path);
            command
        }
    }
}

impl ShareTarget for SystemShare {
    fn share(&self, path: &Path, _title: &str) -> Result<ShareOutcome> {
        match Self::command(path).status() {
            Ok(status) if status.success() => Ok(ShareOutcome::Shared),
            Ok(_) => Ok(ShareOutcome::Cancelled),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(ShareOutcome::Unsupported),
            Err(err) => Err(err).context("failed to launch share handler"),
        }
    }
}
