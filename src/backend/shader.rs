// Shader module loading
//
// Shaders are precompiled SPIR-V read from disk at configure time.

use ash::vk;
use std::fs::File;
use std::path::Path;

use crate::error::{ConfigureError, ShaderError};

/// First word of every SPIR-V module.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Read a SPIR-V binary. The file length must be a whole number of words.
pub fn read_spirv(path: &Path) -> Result<Vec<u32>, ShaderError> {
    let file_error = |source| ShaderError::File {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(file_error)?;
    let len = file.metadata().map_err(file_error)?.len();
    if len % 4 != 0 {
        return Err(ShaderError::Size {
            path: path.to_path_buf(),
            len,
        });
    }

    let words = ash::util::read_spv(&mut file).map_err(file_error)?;
    log::debug!("Loaded shader {:?} ({} words)", path, words.len());
    Ok(words)
}

/// Stricter check than `read_spirv`: the file must also carry the SPIR-V
/// header. Used to tell a finished compiler output from one still being written.
pub fn check_spirv(path: &Path) -> Result<(), ShaderError> {
    let words = read_spirv(path)?;
    if words.first() != Some(&SPIRV_MAGIC) {
        return Err(ShaderError::Header {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

/// Load a SPIR-V file and create a shader module from it
pub fn load_shader_module(
    device: &ash::Device,
    path: &Path,
) -> Result<vk::ShaderModule, ConfigureError> {
    let code = read_spirv(path)?;
    let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);

    unsafe { device.create_shader_module(&create_info, None) }
        .map_err(ConfigureError::ShaderModule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_whole_words() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&SPIRV_MAGIC.to_le_bytes()).unwrap();
        file.write_all(&[1, 0, 0, 0]).unwrap();
        file.flush().unwrap();

        let words = read_spirv(file.path()).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC, 1]);
    }

    #[test]
    fn rejects_partial_word() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&SPIRV_MAGIC.to_le_bytes()).unwrap();
        file.write_all(&[0xff, 0xff]).unwrap();
        file.flush().unwrap();

        let err = read_spirv(file.path()).unwrap_err();
        assert!(matches!(err, ShaderError::Size { len: 6, .. }));
        assert_eq!(
            ConfigureError::from(err).code(),
            crate::error::code::VULKAN_SHADER_READ
        );
    }

    #[test]
    fn missing_file_is_a_file_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_spirv(&dir.path().join("absent.spv")).unwrap_err();
        assert!(matches!(err, ShaderError::File { .. }));
        assert_eq!(ConfigureError::from(err).code(), crate::error::code::FILE);
    }

    #[test]
    fn check_requires_spirv_header() {
        let mut text = tempfile::NamedTempFile::new().unwrap();
        text.write_all(b"void").unwrap();
        text.flush().unwrap();
        assert!(matches!(
            check_spirv(text.path()),
            Err(ShaderError::Header { .. })
        ));

        let empty = tempfile::NamedTempFile::new().unwrap();
        assert!(check_spirv(empty.path()).is_err());

        let mut module = tempfile::NamedTempFile::new().unwrap();
        module.write_all(&SPIRV_MAGIC.to_le_bytes()).unwrap();
        module.write_all(&[0, 0, 1, 0]).unwrap();
        module.flush().unwrap();
        assert!(check_spirv(module.path()).is_ok());
    }
}
