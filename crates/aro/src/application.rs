//! Application loading.
//!
//! Wires the whole toolchain together for the common case — a directory of
//! `.aro` sources with optional `aro.yaml` and plugin folders:
//!
//! 1. compile and merge every source file (fail fast on errors),
//! 2. load the configuration,
//! 3. discover plugins and attach their hosts,
//! 4. hand everything to the runtime driver.

use std::path::{Path, PathBuf};

use tracing::warn;

use aro_compiler::{compile_source, merge};
use aro_core::diagnostics::{Diagnostic, has_errors};
use aro_runtime::config::load_config;
use aro_runtime::driver::ApplicationDriver;

/// A fully loaded application, ready to run.
pub struct Application {
    driver: ApplicationDriver,
    /// Non-fatal diagnostics collected during loading.
    pub diagnostics: Vec<Diagnostic>,
}

/// Compilation failed; the program never reached the runtime.
#[derive(Debug)]
pub struct CompileFailure {
    pub diagnostics: Vec<Diagnostic>,
}

impl std::fmt::Display for CompileFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "the application could not be compiled:")?;
        for diagnostic in &self.diagnostics {
            writeln!(f, "  {diagnostic}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileFailure {}

impl Application {
    /// Loads the application in `dir`.
    ///
    /// Returns [`CompileFailure`] when any source file has errors; the
    /// corresponding process exit code is 1.
    pub fn load(dir: &Path) -> anyhow::Result<Self> {
        let sources = source_files(dir)?;

        let mut programs = Vec::new();
        let mut diagnostics = Vec::new();
        for path in &sources {
            let source = std::fs::read_to_string(path)?;
            let origin = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("unknown.aro")
                .to_string();
            let (program, mut file_diagnostics) = compile_source(&source, Some(&origin));
            diagnostics.append(&mut file_diagnostics);
            programs.push(program);
        }

        let (merged, mut merge_diagnostics) = merge(programs);
        diagnostics.append(&mut merge_diagnostics);

        if has_errors(&diagnostics) {
            return Err(CompileFailure { diagnostics }.into());
        }
        for diagnostic in &diagnostics {
            warn!("{diagnostic}");
        }

        let config = load_config(dir)?;
        let call_timeout = config.runtime.call_timeout();
        let mut driver = ApplicationDriver::new(merged, config);

        let assembled = aro_plugins::assemble_with(dir, call_timeout);
        diagnostics.extend(assembled.diagnostics);
        for provider in assembled.providers {
            driver.register_provider(provider);
        }

        Ok(Self {
            driver,
            diagnostics,
        })
    }

    /// Disables OS signal handling (embedding hosts and tests).
    pub fn without_signal_handlers(mut self) -> Self {
        self.driver = self.driver.without_signal_handlers();
        self
    }

    /// The underlying driver, for registering additional providers or
    /// inspecting services.
    pub fn driver(&mut self) -> &mut ApplicationDriver {
        &mut self.driver
    }

    /// Runs the application to completion and returns the process exit
    /// code: 0 on success, 1 on an uncaught runtime error.
    pub async fn run(self) -> anyhow::Result<i32> {
        self.driver.run().await
    }
}

/// Every `.aro` file directly under `dir`, sorted for deterministic merge
/// order.
fn source_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut sources: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "aro"))
        .collect();
    sources.sort();
    Ok(sources)
}
