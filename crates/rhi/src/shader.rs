//! SPIR-V shader modules.
//!
//! Shaders are compiled ahead of time (`glslc shaders/simple.vert -o
//! shaders/simple.vert.spv`) and loaded here by path. Every module uses
//! `main` as its entry point.

use std::ffi::CStr;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Entry point of every shader module.
pub const ENTRY_POINT: &CStr = c"main";

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Pipeline stage a shader module is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        })
    }
}

/// RAII wrapper over `VkShaderModule`.
pub struct Shader {
    device: Arc<Device>,
    module: vk::ShaderModule,
    stage: ShaderStage,
}

impl Shader {
    /// Loads a SPIR-V binary from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ShaderError`] if the file cannot be read or is not
    /// SPIR-V, or a Vulkan error if module creation fails.
    pub fn from_spirv_file(device: Arc<Device>, path: &Path, stage: ShaderStage) -> RhiResult<Self> {
        debug!("Loading {} shader from {:?}", stage, path);
        let bytes = std::fs::read(path).map_err(|e| {
            RhiError::ShaderError(format!("Failed to read shader file {:?}: {}", path, e))
        })?;
        Self::from_spirv_bytes(device, &bytes, stage)
    }

    /// Creates a module from an in-memory SPIR-V binary.
    ///
    /// # Errors
    ///
    /// See [`from_spirv_file`](Self::from_spirv_file).
    pub fn from_spirv_bytes(device: Arc<Device>, bytes: &[u8], stage: ShaderStage) -> RhiResult<Self> {
        let code = parse_spirv(bytes)?;
        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
        let module = unsafe { device.handle().create_shader_module(&create_info, None)? };

        debug!("Created {} shader module ({} words)", stage, code.len());
        Ok(Self {
            device,
            module,
            stage,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'static> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk_stage())
            .module(self.module)
            .name(ENTRY_POINT)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_shader_module(self.module, None);
        }
        debug!("Destroyed {} shader module", self.stage);
    }
}

/// Splits a SPIR-V binary into words and checks its magic number.
fn parse_spirv(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    let code = ash::util::read_spv(&mut Cursor::new(bytes))
        .map_err(|e| RhiError::ShaderError(format!("Invalid SPIR-V binary: {}", e)))?;
    match code.first() {
        Some(&SPIRV_MAGIC) => Ok(code),
        Some(word) => Err(RhiError::ShaderError(format!(
            "Bad SPIR-V magic number {:#010x}",
            word
        ))),
        None => Err(RhiError::ShaderError("Empty SPIR-V binary".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_stage_to_vk_stage() {
        assert_eq!(ShaderStage::Vertex.to_vk_stage(), vk::ShaderStageFlags::VERTEX);
        assert_eq!(
            ShaderStage::Fragment.to_vk_stage(),
            vk::ShaderStageFlags::FRAGMENT
        );
        assert_eq!(ShaderStage::Fragment.to_string(), "fragment");
    }

    #[test]
    fn test_parse_spirv_accepts_magic() {
        let mut bytes = SPIRV_MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&0x0001_0000u32.to_le_bytes());
        let code = parse_spirv(&bytes).expect("valid header");
        assert_eq!(code, vec![SPIRV_MAGIC, 0x0001_0000]);
    }

    #[test]
    fn test_parse_spirv_rejects_bad_input() {
        assert!(matches!(parse_spirv(&[]), Err(RhiError::ShaderError(_))));
        assert!(matches!(parse_spirv(&[1, 2, 3]), Err(RhiError::ShaderError(_))));
        assert!(matches!(
            parse_spirv(&0xdead_beefu32.to_le_bytes()),
            Err(RhiError::ShaderError(_))
        ));
    }
}
