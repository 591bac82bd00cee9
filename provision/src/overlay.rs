use anyhow::Result;
use ignore::WalkBuilder;
use log::info;
use number_prefix::NumberPrefix;
use std::{
    fmt,
    fs::{File, OpenOptions},
    path::Path,
};
use tar::{Archive, Builder as TarBuilder};
use tempfile::TempDir;

use crate::error::ProvisionError;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct OverlayReport {
    pub files: u64,
    pub bytes: u64,
}

impl fmt::Display for OverlayReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match NumberPrefix::binary(self.bytes as f32) {
            NumberPrefix::Standalone(bytes) => {
                write!(f, "{} files ({} bytes)", self.files, bytes)
            }
            NumberPrefix::Prefixed(prefix, n) => {
                write!(f, "{} files ({:.1} {}B)", self.files, n, prefix)
            }
        }
    }
}

/// Copies the overlay tree verbatim over `root`, the way `COPY ./root/ /`
/// does. Hidden files are included and symlinks are copied as links.
pub fn copy_overlay<O, R>(overlay: O, root: R) -> Result<OverlayReport>
where
    O: AsRef<Path>,
    R: AsRef<Path>,
{
    let overlay = overlay.as_ref();
    let root = root.as_ref();

    if !overlay.is_dir() {
        return Err(ProvisionError::MissingOverlay {
            path: overlay.to_owned(),
        }
        .into());
    }

    let temp_dir = TempDir::new()?;
    let archive_path = temp_dir.path().join("overlay.tar");
    let archive = {
        let mut options = OpenOptions::new();
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        options.write(true).create(true).open(&archive_path)?
    };

    let mut tar = TarBuilder::new(archive);
    tar.follow_symlinks(false);

    let walk = WalkBuilder::new(overlay)
        .standard_filters(false)
        .follow_links(false)
        .build();

    let mut report = OverlayReport::default();
    for result in walk {
        let entry = result?;
        let relative = entry.path().strip_prefix(overlay)?;
        if relative.as_os_str().is_empty() {
            continue;
        }

        tar.append_path_with_name(entry.path(), relative)?;

        if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            report.files += 1;
            report.bytes += entry.metadata()?.len();
        }
    }

    tar.into_inner()?.sync_all()?;

    let mut archive = Archive::new(File::open(&archive_path)?);
    archive.set_preserve_permissions(true);
    archive.set_overwrite(true);
    archive.unpack(root)?;

    temp_dir.close()?;
    info!("copied overlay {:?} into {:?}: {}", overlay, root, report);

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn copies_nested_and_hidden_files() -> Result<()> {
        let context = TempDir::new()?;
        let root = TempDir::new()?;
        let overlay = context.path().join("root");
        fs::create_dir_all(overlay.join("opt"))?;
        fs::create_dir_all(overlay.join("etc/nginx/conf.d"))?;
        fs::write(overlay.join("opt/onbuild.sh"), "true\n")?;
        fs::write(overlay.join("etc/nginx/conf.d/.keep"), "")?;
        fs::write(overlay.join("etc/nginx/conf.d/app.conf"), "server {}\n")?;

        let report = copy_overlay(&overlay, root.path())?;

        assert_eq!(report.files, 3);
        assert_eq!(report.bytes, 15);
        assert_eq!(fs::read_to_string(root.path().join("opt/onbuild.sh"))?, "true\n");
        assert!(root.path().join("etc/nginx/conf.d/.keep").is_file());
        Ok(())
    }

    #[test]
    fn overwrites_existing_files() -> Result<()> {
        let context = TempDir::new()?;
        let root = TempDir::new()?;
        let overlay = context.path().join("root");
        fs::create_dir_all(overlay.join("etc"))?;
        fs::write(overlay.join("etc/motd"), "overlay\n")?;
        fs::create_dir_all(root.path().join("etc"))?;
        fs::write(root.path().join("etc/motd"), "base\n")?;
        fs::write(root.path().join("etc/hostname"), "base\n")?;

        copy_overlay(&overlay, root.path())?;

        assert_eq!(fs::read_to_string(root.path().join("etc/motd"))?, "overlay\n");
        assert_eq!(fs::read_to_string(root.path().join("etc/hostname"))?, "base\n");
        Ok(())
    }

    #[test]
    fn missing_overlay_fails() {
        let context = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();

        let err = copy_overlay(context.path().join("root"), root.path()).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ProvisionError>(),
            Some(ProvisionError::MissingOverlay { .. })
        ));
    }

    #[test]
    fn report_uses_binary_prefixes() {
        let report = OverlayReport {
            files: 2,
            bytes: 3 * 1024,
        };

        assert_eq!(report.to_string(), "2 files (3.0 KiB)");
    }
}
