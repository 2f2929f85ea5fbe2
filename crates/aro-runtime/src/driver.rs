//! The application driver.
//!
//! Orchestrates one program run: build the service bundle, let every
//! registered plugin provider contribute its actions, qualifiers, and
//! feature sets, start the event scheduler, invoke `Application-Start`,
//! block until shutdown, and tear everything down in order.
//!
//! Plugin hosts are registered as [`PluginProvider`] trait objects — the
//! driver knows nothing about manifest formats, dynamic libraries, or
//! interpreter subprocesses.
//!
//! Exit codes: 0 when the program returned normally, 1 for an uncaught
//! runtime error (compilation errors exit 1 before a driver even exists).

use std::sync::Arc;

use async_trait::async_trait;
use tokio::signal;
use tracing::{error, info, warn};

use aro_core::ast::FeatureSetKind;
use aro_core::diagnostics::Diagnostic;
use aro_core::program::{AnalyzedFeatureSet, Program};

use crate::config::AroConfig;
use crate::context::ExecutionContext;
use crate::events::EventScheduler;
use crate::runner::FeatureSetRunner;
use crate::services::RuntimeServices;
use crate::shutdown::ShutdownReason;

// =============================================================================
// Plugin provider seam
// =============================================================================

/// What one plugin contributed at load time, beyond direct registry writes.
#[derive(Default)]
pub struct PluginContribution {
    /// Feature sets from declarative (`.aro` file) providers. The driver
    /// namespaces them as `<plugin>:<feature-set>`.
    pub feature_sets: Vec<AnalyzedFeatureSet>,
    /// Problems found while loading; errors here fail only this plugin.
    pub diagnostics: Vec<Diagnostic>,
}

/// A plugin host the driver can drive.
///
/// Implementations register their actions and qualifiers directly into the
/// service bundle during [`load`](PluginProvider::load) and must remove
/// them again in [`unload`](PluginProvider::unload).
#[async_trait]
pub trait PluginProvider: Send + Sync {
    /// The plugin's name, used for namespacing and log output.
    fn name(&self) -> &str;

    /// Loads the plugin's contributions into the service bundle.
    async fn load(&self, services: &Arc<RuntimeServices>) -> anyhow::Result<PluginContribution>;

    /// Removes every registration this provider created.
    async fn unload(&self, services: &Arc<RuntimeServices>);
}

// =============================================================================
// Driver
// =============================================================================

/// Drives one application from loaded program to process exit.
pub struct ApplicationDriver {
    program: Program,
    config: AroConfig,
    providers: Vec<Box<dyn PluginProvider>>,
    handle_signals: bool,
    services: Arc<RuntimeServices>,
    receiver: Option<tokio::sync::mpsc::UnboundedReceiver<aro_core::event::EventEnvelope>>,
}

impl ApplicationDriver {
    pub fn new(program: Program, config: AroConfig) -> Self {
        let (services, receiver) = RuntimeServices::create();
        Self {
            program,
            config,
            providers: Vec::new(),
            handle_signals: true,
            services,
            receiver: Some(receiver),
        }
    }

    /// The service bundle this driver runs against. Useful for inspecting
    /// repositories and globals after [`run`](Self::run) completes.
    pub fn services(&self) -> Arc<RuntimeServices> {
        Arc::clone(&self.services)
    }

    /// Registers a plugin provider. Providers load in registration order
    /// and unload in reverse.
    pub fn register_provider(&mut self, provider: Box<dyn PluginProvider>) {
        self.providers.push(provider);
    }

    /// Disables OS signal handling; embedding hosts and tests drive
    /// shutdown through the controller instead.
    pub fn without_signal_handlers(mut self) -> Self {
        self.handle_signals = false;
        self
    }

    /// Runs the application to completion. Returns the process exit code.
    pub async fn run(mut self) -> anyhow::Result<i32> {
        crate::logging::init_from_level(&self.config.logging.level);

        let services = Arc::clone(&self.services);
        let receiver = self
            .receiver
            .take()
            .ok_or_else(|| anyhow::anyhow!("the driver was already run"))?;

        // ── Plugins load before the entry feature set runs ───────────────
        for provider in &self.providers {
            let plugin = provider.name().to_string();
            match provider.load(&services).await {
                Ok(contribution) => {
                    for diagnostic in &contribution.diagnostics {
                        warn!(%plugin, "{diagnostic}");
                    }
                    for mut analyzed in contribution.feature_sets {
                        // Registered under the fully qualified name; the
                        // short name resolves through lookup while it
                        // stays unambiguous.
                        let short = analyzed.feature_set.name;
                        analyzed.feature_set.name = format!("{plugin}:{short}");
                        self.program.feature_sets.push(analyzed);
                    }
                    info!(%plugin, "Plugin loaded");
                }
                // A missing plugin is a warning until something references
                // one of its verbs, which then fails resolution.
                Err(e) => warn!(%plugin, error = %e, "Plugin failed to load"),
            }
        }

        let Some(start_index) = self
            .program
            .feature_sets
            .iter()
            .position(|fs| fs.feature_set.kind() == FeatureSetKind::ApplicationStart)
        else {
            error!("The program has no 'Application-Start' feature set");
            return Ok(1);
        };

        let program = Arc::new(self.program);
        let scheduler = EventScheduler::new(
            receiver,
            Arc::clone(&program),
            Arc::clone(&services),
            self.config.runtime.grace_period(),
        );
        let scheduler_handle = tokio::spawn(scheduler.run());

        if self.handle_signals {
            tokio::spawn(wait_for_signals(Arc::clone(&services)));
        }

        // ── Entry feature set runs exactly once ──────────────────────────
        let runner = FeatureSetRunner::new(Arc::clone(&services));
        let mut root_ctx = ExecutionContext::new(services.globals.clone());
        let start_result = runner.run(&program.feature_sets[start_index], &mut root_ctx).await;

        match &start_result {
            Ok(_) => services.shutdown.request(ShutdownReason::Completed),
            Err(e) => {
                error!("Application-Start failed: {e}");
                services
                    .shutdown
                    .request(ShutdownReason::Fatal(e.to_string()));
            }
        }

        // The scheduler drains the queue to quiescence (emitting the final
        // `application-shutdown` event) and cancels stragglers.
        if let Err(e) = scheduler_handle.await {
            error!("Event scheduler task failed: {e}");
        }

        // ── Lifecycle hooks ──────────────────────────────────────────────
        let end_kind = if start_result.is_ok() {
            FeatureSetKind::ApplicationEndSuccess
        } else {
            FeatureSetKind::ApplicationEndError
        };
        if let Some(end) = program
            .feature_sets
            .iter()
            .find(|fs| fs.feature_set.kind() == end_kind)
        {
            let mut end_ctx = ExecutionContext::new(services.globals.clone());
            if let Err(e) = runner.run(end, &mut end_ctx).await {
                error!(hook = %end.feature_set.identity(), "Shutdown hook failed: {e}");
            }
        }

        // ── Plugins unload last ──────────────────────────────────────────
        for provider in self.providers.iter().rev() {
            provider.unload(&services).await;
            info!(plugin = %provider.name(), "Plugin unloaded");
        }

        Ok(if start_result.is_ok() { 0 } else { 1 })
    }
}

/// Waits for SIGINT/SIGTERM (or the platform equivalent) and requests
/// shutdown.
async fn wait_for_signals(services: Arc<RuntimeServices>) {
    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to register SIGTERM handler: {e}");
                return;
            }
        };
        tokio::select! {
            _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            return;
        }
        info!("Received Ctrl+C, shutting down");
    }

    services.shutdown.request(ShutdownReason::Signal);
}

#[cfg(test)]
mod tests {
    use super::*;
    use aro_compiler::{compile_source, merge};
    use aro_core::diagnostics::has_errors;
    use aro_core::value::RuntimeValue;

    fn build_program(sources: &[&str]) -> Program {
        let mut programs = Vec::new();
        for (index, source) in sources.iter().enumerate() {
            let origin = format!("file{index}.aro");
            let (program, diagnostics) = compile_source(source, Some(&origin));
            assert!(!has_errors(&diagnostics), "{diagnostics:?}");
            programs.push(program);
        }
        let (merged, diagnostics) = merge(programs);
        assert!(!has_errors(&diagnostics), "{diagnostics:?}");
        merged
    }

    fn driver(sources: &[&str]) -> ApplicationDriver {
        ApplicationDriver::new(build_program(sources), AroConfig::default())
            .without_signal_handlers()
    }

    #[tokio::test]
    async fn hello_world_exits_zero() {
        let exit = driver(&[r#"(Application-Start: Hello) {
            Log "Hello from ARO!" to the <console>.
            Return an <OK: status> for the <startup>.
        }"#])
        .run()
        .await
        .unwrap();
        assert_eq!(exit, 0);
    }

    #[tokio::test]
    async fn start_failure_exits_one() {
        let exit = driver(&[r#"(Application-Start: Boom) {
            Throw the <boom> for the <caller>.
        }"#])
        .run()
        .await
        .unwrap();
        assert_eq!(exit, 1);
    }

    #[tokio::test]
    async fn events_drain_before_exit_in_emission_order() {
        // The handler stores each payload; both must be visible even though
        // the program ends right after emitting, and in emission order.
        let sources = [r#"(Application-Start: Emitter) {
            Emit the <greeting> with { text: "one" }.
            Emit the <greeting> with { text: "two" }.
        }
        (record: greeting Handler) {
            Compute the <entry> from the <event>.
            Store the <entry> in the <greeting-repository>.
        }"#];

        let driver = driver(&sources);
        let services = driver.services();
        let exit = driver.run().await.unwrap();
        assert_eq!(exit, 0);

        let stored = services.repositories.retrieve_all("greeting-repository");
        let texts: Vec<String> = stored
            .as_list()
            .unwrap()
            .iter()
            .map(|e| e.property("text").unwrap().to_string())
            .collect();
        assert_eq!(texts, ["one", "two"]);
    }

    #[tokio::test]
    async fn guarded_handler_only_runs_for_matching_payloads() {
        let sources = [r#"(Application-Start: Emitter) {
            Emit the <UserCreated> with { age: 17 }.
            Emit the <UserCreated> with { age: 21 }.
        }
        (Welcome: UserCreated Handler) when <age> >= 18 {
            Compute the <entry> from the <event>.
            Store the <entry> in the <adult-repository>.
        }"#];
        let driver = driver(&sources);
        let services = driver.services();
        let exit = driver.run().await.unwrap();
        assert_eq!(exit, 0);

        // Only the adult payload passed the guard.
        let stored = services.repositories.retrieve_all("adult-repository");
        let list = stored.as_list().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].property("age"), Some(&RuntimeValue::Int(21)));
    }

    #[tokio::test]
    async fn observers_see_the_committed_entity() {
        let sources = [r#"(Application-Start: Seed) {
            Create the <user> with { name: "Alice" }.
            Store the <user> in the <user-repository>.
        }
        (Audit: user-repository Observer) {
            Compute the <after> from the <event: entity-after>.
            Store the <after> in the <audit-repository>.
        }"#];
        let driver = driver(&sources);
        let services = driver.services();
        assert_eq!(driver.run().await.unwrap(), 0);

        // Exactly one change notification, carrying the post-mutation
        // state (id already assigned).
        let audited = services.repositories.retrieve_all("audit-repository");
        let list = audited.as_list().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].property("name"), Some(&RuntimeValue::Text("Alice".into())));
    }

    #[tokio::test]
    async fn shutdown_hook_runs_on_success() {
        let sources = [r#"(Application-Start: Quick) {
            Return an <OK: status> for the <startup>.
        }
        (Application-End: Success) {
            Log "goodbye" to the <console>.
        }"#];
        let exit = driver(&sources).run().await.unwrap();
        assert_eq!(exit, 0);
    }

    #[tokio::test]
    async fn error_hook_runs_on_failure() {
        let sources = [r#"(Application-Start: Boom) {
            Throw the <boom> for the <caller>.
        }
        (Application-End: Error) {
            Log "cleaning up" to the <console>.
        }"#];
        let exit = driver(&sources).run().await.unwrap();
        assert_eq!(exit, 1);
    }

    #[tokio::test]
    async fn user_requested_shutdown_releases_keepalive() {
        // `application-shutdown` emitted from a handler cancels the
        // keepalive suspension; the driver then exits 0 (S6 ordering).
        let sources = [r#"(Application-Start: Service) {
            Emit the <tick> with { n: 1 }.
            Keepalive the <service> until the <shutdown>.
            Return an <OK: status> for the <startup>.
        }
        (stop: tick Handler) {
            Emit the <application-shutdown> with { reason: "done" }.
        }"#];
        let exit = tokio::time::timeout(std::time::Duration::from_secs(10), driver(&sources).run())
            .await
            .expect("driver must not hang")
            .unwrap();
        assert_eq!(exit, 0);
    }

    #[tokio::test]
    async fn missing_entry_point_exits_one() {
        // Bypasses merge validation on purpose: the driver re-checks.
        let (program, _) = compile_source(
            r#"(helper: Utilities) { Log "x" to the <console>. }"#,
            None,
        );
        let (merged, _) = merge(vec![program]);
        let exit = ApplicationDriver::new(merged, AroConfig::default())
            .without_signal_handlers()
            .run()
            .await
            .unwrap();
        assert_eq!(exit, 1);
    }
}
