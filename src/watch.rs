// Shader hot reload - watches compiled SPIR-V files on disk
//
// The parent directories are watched rather than the files themselves, since
// shader compilers usually replace the output file instead of rewriting it.

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use crate::backend::shader::check_spirv;
use crate::error::{ConfigureError, ShaderError};

pub struct ShaderWatcher {
    /// The underlying file watcher (kept alive).
    _watcher: RecommendedWatcher,
    event_rx: mpsc::Receiver<notify::Event>,
    watched: Vec<PathBuf>,
}

impl ShaderWatcher {
    pub fn new<P: AsRef<Path>>(paths: &[P]) -> notify::Result<Self> {
        let (tx, rx) = mpsc::channel::<notify::Event>();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        })?;

        let mut watched = Vec::with_capacity(paths.len());
        let mut directories: Vec<PathBuf> = Vec::new();
        for path in paths {
            let path = absolute(path.as_ref());
            if let Some(parent) = path.parent() {
                if !directories.iter().any(|d| d == parent) {
                    watcher.watch(parent, RecursiveMode::NonRecursive)?;
                    log::info!("Watching {:?} for shader changes", parent);
                    directories.push(parent.to_path_buf());
                }
            }
            watched.push(path);
        }

        Ok(Self {
            _watcher: watcher,
            event_rx: rx,
            watched,
        })
    }

    /// Drain pending events; true if any watched shader was written or replaced.
    pub fn poll_changed(&self) -> bool {
        let mut changed = false;
        while let Ok(event) = self.event_rx.try_recv() {
            if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                continue;
            }
            if event
                .paths
                .iter()
                .any(|path| is_watched(&self.watched, &absolute(path)))
            {
                changed = true;
            }
        }
        changed
    }
}

/// Whether every shader on disk is a complete SPIR-V module.
///
/// Change events arrive while a compiler is still writing its output, so a
/// reload only tears down the live pipeline once this passes.
pub fn shaders_ready<P: AsRef<Path>>(paths: &[P]) -> Result<(), ShaderError> {
    paths.iter().try_for_each(|path| check_spirv(path.as_ref()))
}

/// A reload that fails on the shaders themselves waits for the next edit
/// instead of stopping the host.
pub fn is_recoverable(err: &ConfigureError) -> bool {
    matches!(err, ConfigureError::Shader(_) | ConfigureError::ShaderModule(_))
}

fn is_watched(watched: &[PathBuf], path: &Path) -> bool {
    watched.iter().any(|w| w == path)
}

/// Canonical form when the file (or its directory) exists, else joined onto
/// the working directory.
fn absolute(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
        let parent = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };
        if let Ok(parent) = parent.canonicalize() {
            return parent.join(name);
        }
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::shader::SPIRV_MAGIC;
    use ash::vk;
    use std::time::{Duration, Instant};

    fn write_module(path: &Path) {
        let mut bytes = SPIRV_MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0, 0, 1, 0]);
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn half_written_shader_is_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let vert = dir.path().join("quad.vert.spv");
        let frag = dir.path().join("quad.frag.spv");
        write_module(&vert);
        write_module(&frag);
        assert!(shaders_ready(&[&vert, &frag]).is_ok());

        // Truncated mid-word, as seen between a compiler's writes.
        std::fs::write(&frag, [0x03, 0x02, 0x23, 0x07, 0x00, 0x00]).unwrap();
        assert!(matches!(
            shaders_ready(&[&vert, &frag]),
            Err(ShaderError::Size { len: 6, .. })
        ));

        // Truncated to nothing.
        std::fs::write(&frag, [0u8; 0]).unwrap();
        assert!(shaders_ready(&[&vert, &frag]).is_err());

        write_module(&frag);
        assert!(shaders_ready(&[&vert, &frag]).is_ok());
    }

    #[test]
    fn only_shader_failures_are_recoverable() {
        let size = ConfigureError::from(ShaderError::Size {
            path: "quad.frag.spv".into(),
            len: 6,
        });
        assert!(is_recoverable(&size));
        assert!(is_recoverable(&ConfigureError::ShaderModule(
            vk::Result::ERROR_INVALID_SHADER_NV
        )));
        assert!(!is_recoverable(&ConfigureError::Swapchain(
            vk::Result::ERROR_SURFACE_LOST_KHR
        )));
        assert!(!is_recoverable(&ConfigureError::NotInitialized));
    }

    #[test]
    fn relative_and_absolute_forms_match() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("quad.vert.spv");
        std::fs::write(&file, [0u8; 4]).unwrap();

        let watched = vec![absolute(&file)];
        assert!(is_watched(&watched, &absolute(&dir.path().join("./quad.vert.spv"))));
        assert!(!is_watched(&watched, &absolute(&dir.path().join("quad.frag.spv"))));
    }

    #[test]
    fn missing_file_resolves_through_its_directory() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = absolute(&dir.path().join("later.spv"));
        assert_eq!(resolved, dir.path().canonicalize().unwrap().join("later.spv"));
    }

    #[test]
    fn reports_writes_to_watched_shader() {
        let dir = tempfile::tempdir().unwrap();
        let shader = dir.path().join("quad.frag.spv");
        std::fs::write(&shader, [0u8; 4]).unwrap();

        let watcher = ShaderWatcher::new(&[&shader]).unwrap();
        assert!(!watcher.poll_changed());

        std::fs::write(&shader, [1u8; 8]).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut seen = false;
        while !seen && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(50));
            seen = watcher.poll_changed();
        }
        assert!(seen);
    }
}
