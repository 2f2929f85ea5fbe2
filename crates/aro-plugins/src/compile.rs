//! The plugin compiler driver.
//!
//! When a native plugin ships no prebuilt library, the driver detects its
//! source language from the files present and invokes the matching
//! toolchain:
//!
//! | Detected by | Build |
//! |---|---|
//! | `Cargo.toml` | `cargo build --release`, artifact under `target/release/` |
//! | `.c` / `.cpp` sources | system compiler with `-shared -fPIC` |
//! | `.swift` sources | `swiftc -emit-library` |
//!
//! A failed build surfaces the compiler's stderr as the diagnostic.

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{PluginError, PluginResult};
use crate::manifest::BuildConfig;

/// Platform extension for shared libraries.
pub fn library_extension() -> &'static str {
    if cfg!(target_os = "macos") {
        "dylib"
    } else if cfg!(target_os = "windows") {
        "dll"
    } else {
        "so"
    }
}

/// The toolchain a plugin directory calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginFlavor {
    Cargo,
    C,
    Cpp,
    Swift,
}

/// Detects the flavor from the files present under `dir`.
pub fn detect_flavor(dir: &Path) -> Option<PluginFlavor> {
    if dir.join("Cargo.toml").exists() {
        return Some(PluginFlavor::Cargo);
    }
    let mut has_c = false;
    let mut has_cpp = false;
    let mut has_swift = false;
    for entry in std::fs::read_dir(dir).ok()?.filter_map(Result::ok) {
        match entry.path().extension().and_then(|e| e.to_str()) {
            Some("c") => has_c = true,
            Some("cpp" | "cc" | "cxx") => has_cpp = true,
            Some("swift") => has_swift = true,
            _ => {}
        }
    }
    if has_swift {
        Some(PluginFlavor::Swift)
    } else if has_cpp {
        Some(PluginFlavor::Cpp)
    } else if has_c {
        Some(PluginFlavor::C)
    } else {
        None
    }
}

/// Builds the plugin under `dir` and returns the produced library path.
pub async fn build_plugin(
    plugin: &str,
    dir: &Path,
    build: Option<&BuildConfig>,
) -> PluginResult<PathBuf> {
    let flavor = detect_flavor(dir).ok_or_else(|| PluginError::LibraryNotFound {
        plugin: plugin.to_string(),
        searched: vec![dir.to_path_buf()],
    })?;
    info!(%plugin, ?flavor, dir = %dir.display(), "Building plugin from source");

    match flavor {
        PluginFlavor::Cargo => build_cargo(plugin, dir).await,
        PluginFlavor::C => build_clang_family(plugin, dir, build, "cc", &["c"]).await,
        PluginFlavor::Cpp => {
            build_clang_family(plugin, dir, build, "c++", &["cpp", "cc", "cxx"]).await
        }
        PluginFlavor::Swift => build_swift(plugin, dir, build).await,
    }
}

async fn build_cargo(plugin: &str, dir: &Path) -> PluginResult<PathBuf> {
    run_tool(
        plugin,
        Command::new("cargo")
            .arg("build")
            .arg("--release")
            .current_dir(dir),
    )
    .await?;

    let release = dir.join("target").join("release");
    find_library(plugin, &release).ok_or_else(|| PluginError::LibraryNotFound {
        plugin: plugin.to_string(),
        searched: vec![release],
    })
}

async fn build_clang_family(
    plugin: &str,
    dir: &Path,
    build: Option<&BuildConfig>,
    default_compiler: &str,
    extensions: &[&str],
) -> PluginResult<PathBuf> {
    let sources = collect_sources(dir, extensions)?;
    if sources.is_empty() {
        return Err(PluginError::LibraryNotFound {
            plugin: plugin.to_string(),
            searched: vec![dir.to_path_buf()],
        });
    }

    let output = dir.join(format!("lib{plugin}.{}", library_extension()));
    let compiler = build
        .and_then(|b| b.compiler.clone())
        .unwrap_or_else(|| default_compiler.to_string());

    let mut command = Command::new(&compiler);
    if cfg!(target_os = "macos") {
        command.arg("-dynamiclib");
    } else {
        command.arg("-shared");
    }
    command.arg("-fPIC");
    if let Some(build) = build {
        command.args(&build.flags);
    }
    command.arg("-o").arg(&output).args(&sources).current_dir(dir);

    run_tool(plugin, &mut command).await?;
    Ok(output)
}

async fn build_swift(plugin: &str, dir: &Path, build: Option<&BuildConfig>) -> PluginResult<PathBuf> {
    let sources = collect_sources(dir, &["swift"])?;
    let output = dir.join(format!("lib{plugin}.{}", library_extension()));
    let compiler = build
        .and_then(|b| b.compiler.clone())
        .unwrap_or_else(|| "swiftc".to_string());

    let mut command = Command::new(&compiler);
    command.arg("-emit-library");
    if let Some(build) = build {
        command.args(&build.flags);
    }
    command.arg("-o").arg(&output).args(&sources).current_dir(dir);

    run_tool(plugin, &mut command).await?;
    Ok(output)
}

/// Runs a toolchain invocation, turning a nonzero exit into a compilation
/// error carrying stderr.
async fn run_tool(plugin: &str, command: &mut Command) -> PluginResult<()> {
    debug!(%plugin, ?command, "Invoking toolchain");
    let output = command
        .output()
        .await
        .map_err(|e| PluginError::Compilation {
            plugin: plugin.to_string(),
            stderr: format!("failed to launch: {e}"),
        })?;
    if !output.status.success() {
        return Err(PluginError::Compilation {
            plugin: plugin.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(())
}

fn collect_sources(dir: &Path, extensions: &[&str]) -> PluginResult<Vec<PathBuf>> {
    let mut sources: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| extensions.contains(&e))
        })
        .collect();
    sources.sort();
    Ok(sources)
}

/// Finds the first shared library under `dir` with the platform extension.
pub fn find_library(plugin: &str, dir: &Path) -> Option<PathBuf> {
    let extension = library_extension();
    let preferred = [
        dir.join(format!("lib{plugin}.{extension}")),
        dir.join(format!("{plugin}.{extension}")),
    ];
    for candidate in preferred {
        if candidate.exists() {
            return Some(candidate);
        }
    }
    std::fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .find(|path| path.extension().and_then(|e| e.to_str()) == Some(extension))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flavor_detection() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(detect_flavor(dir.path()), None);

        std::fs::write(dir.path().join("plugin.c"), "").unwrap();
        assert_eq!(detect_flavor(dir.path()), Some(PluginFlavor::C));

        std::fs::write(dir.path().join("extra.cpp"), "").unwrap();
        assert_eq!(detect_flavor(dir.path()), Some(PluginFlavor::Cpp));

        std::fs::write(dir.path().join("main.swift"), "").unwrap();
        assert_eq!(detect_flavor(dir.path()), Some(PluginFlavor::Swift));

        std::fs::write(dir.path().join("Cargo.toml"), "[package]").unwrap();
        assert_eq!(detect_flavor(dir.path()), Some(PluginFlavor::Cargo));
    }

    #[test]
    fn library_lookup_prefers_conventional_names() {
        let dir = tempfile::tempdir().unwrap();
        let extension = library_extension();
        std::fs::write(dir.path().join(format!("other.{extension}")), "").unwrap();
        std::fs::write(dir.path().join(format!("libdemo.{extension}")), "").unwrap();
        let found = find_library("demo", dir.path()).unwrap();
        assert!(found.ends_with(format!("libdemo.{extension}")));
    }

    #[tokio::test]
    async fn missing_toolchain_surfaces_as_compilation_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("p.c"), "int x;").unwrap();
        let build = BuildConfig {
            compiler: Some("definitely-not-a-compiler".to_string()),
            ..Default::default()
        };
        let err = build_plugin("p", dir.path(), Some(&build)).await;
        assert!(matches!(err, Err(PluginError::Compilation { .. })));
    }
}
