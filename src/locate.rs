//! Turning a command line target into the path of an ELF file, and
//! finding the separate files its debugging information lives in.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

const OSRELEASE: &str = "/proc/sys/kernel/osrelease";

/// Root of the installed separate debug files.
pub const DEBUG_ROOT: &str = "/usr/lib/debug";

/// What to open: a file, a kernel image or a kernel module.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct Target {
    /// ELF file to open
    pub file: Option<PathBuf>,
    /// Open the kernel image of RELEASE, the running kernel if omitted
    #[clap(short, long, value_name = "RELEASE")]
    pub kernel: Option<Option<String>>,
    /// Open kernel module NAME
    #[clap(short, long, value_name = "NAME")]
    pub module: Option<String>,
    /// Supplementary debug file, instead of the one named by .gnu_debugaltlink
    #[clap(long, value_name = "PATH")]
    pub alt: Option<PathBuf>,
}

impl Target {
    pub fn resolve(&self) -> Result<PathBuf> {
        match (&self.file, &self.kernel, &self.module) {
            (Some(file), None, None) => Ok(file.clone()),
            (Some(_), _, _) => Err(Error::TooManyTargets),
            (None, kernel, Some(module)) => {
                let release = release(kernel.clone().flatten())?;
                module_file(&release, module)
            }
            (None, Some(kernel), None) => kernel_image(&release(kernel.clone())?),
            (None, None, None) => Err(Error::NoTarget),
        }
    }
}

fn release(release: Option<String>) -> Result<String> {
    match release {
        Some(release) => Ok(release),
        None => Ok(fs::read_to_string(OSRELEASE)?.trim().to_string()),
    }
}

pub fn kernel_candidates(release: &str) -> Vec<PathBuf> {
    vec![
        PathBuf::from(format!("/usr/lib/debug/lib/modules/{}/vmlinux", release)),
        PathBuf::from(format!("/usr/lib/debug/boot/vmlinux-{}", release)),
        PathBuf::from(format!("/boot/vmlinux-{}", release)),
        PathBuf::from(format!("/lib/modules/{}/build/vmlinux", release)),
    ]
}

pub fn kernel_image(release: &str) -> Result<PathBuf> {
    kernel_candidates(release)
        .into_iter()
        .find(|path| path.is_file())
        .ok_or_else(|| Error::KernelNotFound(release.to_string()))
}

pub fn module_file(release: &str, name: &str) -> Result<PathBuf> {
    let roots = [
        PathBuf::from(format!("/usr/lib/debug/lib/modules/{}", release)),
        PathBuf::from(format!("/lib/modules/{}", release)),
    ];
    roots
        .iter()
        .find_map(|root| find_module(root, name))
        .ok_or_else(|| Error::ModuleNotFound(name.to_string(), release.to_string()))
}

fn module_key(name: &str) -> String {
    name.replace('-', "_")
}

/// Search below `root` for `name.ko.debug`, or `name.ko` if there is none.
pub fn find_module(root: &Path, name: &str) -> Option<PathBuf> {
    let key = module_key(name);
    let mut fallback = None;
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::debug!("skipping {}: {}", dir.display(), err);
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
                continue;
            }
            let file_name = entry.file_name();
            let file_name = match file_name.to_str() {
                Some(file_name) => file_name,
                None => continue,
            };
            if let Some(stem) = file_name.strip_suffix(".ko.debug") {
                if module_key(stem) == key {
                    return Some(path);
                }
            } else if let Some(stem) = file_name.strip_suffix(".ko") {
                if module_key(stem) == key && fallback.is_none() {
                    fallback = Some(path);
                }
            }
        }
    }
    fallback
}

/// The supplementary file named `link` by the `.gnu_debugaltlink` of
/// `file`. Anything from a NUL on is ignored.
pub fn alt_path(file: &Path, link: &[u8]) -> Option<PathBuf> {
    let end = link.iter().position(|&b| b == 0).unwrap_or(link.len());
    let name = std::str::from_utf8(&link[..end]).ok()?;
    if name.is_empty() {
        return None;
    }
    let name = Path::new(name);
    if name.is_absolute() {
        return Some(name.to_path_buf());
    }
    let dir = file.parent().unwrap_or_else(|| Path::new(""));
    Some(dir.join(name))
}

/// `root/.build-id/xx/yyyy.debug` for build id `xxyyyy`.
pub fn build_id_path(root: &Path, id: &[u8]) -> Option<PathBuf> {
    let (first, rest) = id.split_first()?;
    if rest.is_empty() {
        return None;
    }
    let rest: String = rest.iter().map(|b| format!("{:02x}", b)).collect();
    Some(
        root.join(".build-id")
            .join(format!("{:02x}", first))
            .join(format!("{}.debug", rest)),
    )
}

/// Where the file named `link` by the `.gnu_debuglink` of `file` may be:
/// beside it, in `.debug/` beside it, and under `root` by its directory.
pub fn debuglink_candidates(root: &Path, file: &Path, link: &str) -> Vec<PathBuf> {
    let dir = file.parent().unwrap_or_else(|| Path::new(""));
    let absolute = fs::canonicalize(file)
        .ok()
        .and_then(|file| file.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| dir.to_path_buf());
    let relative = absolute.strip_prefix("/").unwrap_or(&absolute);
    vec![
        dir.join(link),
        dir.join(".debug").join(link),
        root.join(relative).join(link),
    ]
}
