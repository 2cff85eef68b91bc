use std::path::{Path, PathBuf};

use cvd_core::error::CvdError;

const KERNEL_IMAGE_NAMES: [&str; 3] = ["kernel", "bzImage", "Image"];
const INITRAMFS_IMAGE_NAMES: [&str; 1] = ["initramfs.img"];
const BOOT_IMAGE_NAMES: [&str; 1] = ["boot.img"];
const VENDOR_BOOT_IMAGE_NAMES: [&str; 1] = ["vendor_boot.img"];

/// Which family of image a `--local-*-image` directory is being probed for
/// (spec §4.E, grounded on `converter.cpp`'s `_KERNEL_IMAGE_NAMES` et al.).
#[derive(Debug, Clone, Copy)]
pub enum ImageKind {
    Kernel,
    Initramfs,
    Boot,
    VendorBoot,
}

impl ImageKind {
    fn candidate_names(self) -> &'static [&'static str] {
        match self {
            Self::Kernel => &KERNEL_IMAGE_NAMES,
            Self::Initramfs => &INITRAMFS_IMAGE_NAMES,
            Self::Boot => &BOOT_IMAGE_NAMES,
            Self::VendorBoot => &VENDOR_BOOT_IMAGE_NAMES,
        }
    }
}

/// `FindImage`: given a directory, return the first candidate filename for
/// `kind` that exists within it.
pub fn find_image(dir: &Path, kind: ImageKind) -> Result<PathBuf, CvdError> {
    for name in kind.candidate_names() {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(CvdError::invalid_argument(format!(
        "no {:?} image found under {}",
        kind,
        dir.display()
    )))
}

fn find_optional(dir: &Path, kind: ImageKind) -> Option<PathBuf> {
    find_image(dir, kind).ok()
}

/// What a `--local-kernel-image`/`--local-boot-image` path resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalImageSelection {
    /// Both a kernel image and an `initramfs.img` were found in the
    /// directory — kernel takes priority over boot images (spec §4.E).
    KernelAndInitramfs { kernel: PathBuf, initramfs: PathBuf },
    /// Either the path was a direct file (always treated as `boot.img`), or
    /// the directory lacked a kernel+initramfs pair so the fallback
    /// `boot.img` (+ optional `vendor_boot.img`) is used instead.
    Boot { boot: PathBuf, vendor_boot: Option<PathBuf> },
}

/// `FindImage` dispatch for `--local-kernel-image`/`--local-boot-image`: a
/// regular file always means "this is `boot.img`"; a directory probes for a
/// kernel+initramfs pair first and only falls back to `boot.img` (+
/// `vendor_boot.img` if present) when that pair is incomplete (spec §4.E,
/// `converter.cpp`'s kernel-vs-boot-image branch).
pub fn probe_local_kernel_image(path: &Path) -> Result<LocalImageSelection, CvdError> {
    if path.is_file() {
        return Ok(LocalImageSelection::Boot {
            boot: path.to_path_buf(),
            vendor_boot: None,
        });
    }
    if let (Some(kernel), Some(initramfs)) = (
        find_optional(path, ImageKind::Kernel),
        find_optional(path, ImageKind::Initramfs),
    ) {
        return Ok(LocalImageSelection::KernelAndInitramfs { kernel, initramfs });
    }
    let boot = find_image(path, ImageKind::Boot)?;
    let vendor_boot = find_optional(path, ImageKind::VendorBoot);
    Ok(LocalImageSelection::Boot { boot, vendor_boot })
}
