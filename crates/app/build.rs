//! Compiles the GLSL shaders under `shaders/` to SPIR-V with `glslc`.
//!
//! Each `name.vert` / `name.frag` becomes `name.vert.spv` / `name.frag.spv`
//! next to its source. Set `SKIP_SHADERS` to skip compilation; without a
//! `VULKAN_SDK` the step is skipped with a warning.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

const STAGES: [&str; 3] = ["vert", "frag", "comp"];

fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".into()));
    let shader_dir = manifest_dir.join("../../shaders");
    println!("cargo:rerun-if-changed={}", shader_dir.display());
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");
    println!("cargo:rerun-if-env-changed=SKIP_SHADERS");

    if env::var_os("SKIP_SHADERS").is_some() {
        println!("cargo:warning=Skipping shader compilation (SKIP_SHADERS set)");
        return;
    }

    let Ok(vulkan_sdk) = env::var("VULKAN_SDK") else {
        println!("cargo:warning=VULKAN_SDK not set, shader compilation skipped");
        return;
    };
    let glslc = if cfg!(target_os = "windows") {
        Path::new(&vulkan_sdk).join("Bin").join("glslc.exe")
    } else {
        Path::new(&vulkan_sdk).join("bin").join("glslc")
    };
    if !glslc.exists() {
        panic!("glslc not found at {}", glslc.display());
    }

    let entries = match std::fs::read_dir(&shader_dir) {
        Ok(entries) => entries,
        Err(e) => {
            println!("cargo:warning=No shader directory at {}: {}", shader_dir.display(), e);
            return;
        }
    };

    for path in entries.filter_map(|entry| entry.ok().map(|e| e.path())) {
        let is_stage = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| STAGES.contains(&ext));
        if !is_stage {
            continue;
        }

        let mut out_file = path.clone().into_os_string();
        out_file.push(".spv");
        let out_file = PathBuf::from(out_file);
        if is_up_to_date(&path, &out_file) {
            continue;
        }

        let status = Command::new(&glslc)
            .arg(&path)
            .arg("-o")
            .arg(&out_file)
            .status()
            .unwrap_or_else(|e| panic!("Failed to run glslc for {}: {}", path.display(), e));
        if !status.success() {
            panic!("glslc failed for {} with {}", path.display(), status);
        }
    }
}

fn is_up_to_date(source: &Path, output: &Path) -> bool {
    let modified = |path: &Path| std::fs::metadata(path).and_then(|m| m.modified()).ok();
    match (modified(source), modified(output)) {
        (Some(source), Some(output)) => output >= source,
        _ => false,
    }
}
