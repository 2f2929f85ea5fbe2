//! The scripted plugin host (python flavor).
//!
//! Scripted plugins are invoked through an external interpreter rather
//! than an embedded one: every action call spawns a fresh subprocess that
//! imports the plugin module, decodes its base64 JSON input, calls
//! `aro_action_<snake_case_verb>`, and prints the reply JSON on stdout.
//! Isolation costs a process per call but inherits the interpreter's
//! signal handling and (for python) its GIL semantics faithfully, and
//! leaves no shared interpreter state to protect.
//!
//! Conventions:
//! - info function `aro_plugin_info()`,
//! - action functions `aro_action_<snake_case_verb>(input)`,
//! - qualifier function `aro_plugin_qualifier(name, input)`,
//! - inputs arrive as base64-encoded JSON argv to avoid shell-escaping
//!   hazards.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use tracing::{debug, info};

use aro_core::error::{RuntimeError, RuntimeResult};
use aro_core::value::{RuntimeValue, ValueType};
use aro_runtime::actions::{ActionInvocation, ActionOutcome, ActionRegistration};
use aro_runtime::driver::{PluginContribution, PluginProvider};
use aro_runtime::qualifiers::QualifierRegistration;
use aro_runtime::services::RuntimeServices;
use aro_runtime::{handler, qualifier_handler};

use crate::error::{PluginError, PluginResult};
use crate::manifest::ProvideEntry;
use crate::native::{
    PluginInfo, marshal_input, parse_execute_reply, parse_qualifier_reply, qualifier_request,
};

/// Main-file names probed in order.
const MAIN_FILE_CANDIDATES: &[&str] = &["plugin.py", "main.py", "__init__.py"];

/// Interpreter locations probed before falling back to `PATH`.
const INTERPRETER_CANDIDATES: &[&str] = &[
    "/usr/local/bin/python3",
    "/usr/bin/python3",
    "/opt/homebrew/bin/python3",
];

/// Finds a usable python interpreter: environment override first, then the
/// fixed candidates, then `PATH`.
pub fn find_interpreter() -> Option<PathBuf> {
    if let Ok(override_path) = std::env::var("ARO_PYTHON") {
        let path = PathBuf::from(override_path);
        if path.exists() {
            return Some(path);
        }
    }
    for candidate in INTERPRETER_CANDIDATES {
        let path = PathBuf::from(candidate);
        if path.exists() {
            return Some(path);
        }
    }
    which::which("python3")
        .or_else(|_| which::which("python"))
        .ok()
}

/// `create-user` → `create_user`, matching the python function naming
/// convention.
pub fn snake_case_verb(verb: &str) -> String {
    verb.to_ascii_lowercase().replace(['-', '.', ' '], "_")
}

// =============================================================================
// Subprocess plumbing
// =============================================================================

/// Everything one registered handler needs to reach the plugin.
struct ScriptedCall {
    plugin: String,
    interpreter: PathBuf,
    module_dir: PathBuf,
    module: String,
    timeout: Duration,
}

impl ScriptedCall {
    fn preamble(&self) -> String {
        format!(
            "import sys, json, base64, importlib, traceback\n\
             sys.path.insert(0, {dir:?})\n",
            dir = self.module_dir.display().to_string(),
        )
    }

    /// Runs one interpreter invocation with the per-call deadline.
    async fn run(&self, script: String, argv: &[String]) -> PluginResult<String> {
        let mut command = tokio::process::Command::new(&self.interpreter);
        command
            .arg("-c")
            .arg(script)
            .args(argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| PluginError::Timeout {
                plugin: self.plugin.clone(),
                secs: self.timeout.as_secs(),
            })??;

        // Stderr only matters when the interpreter itself failed; plugin
        // exceptions come back as JSON on stdout.
        if !output.status.success() {
            return Err(PluginError::Execute {
                plugin: self.plugin.clone(),
                message: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn call_info(&self) -> PluginResult<String> {
        let script = format!(
            "{}mod = importlib.import_module({module:?})\n\
             print(json.dumps(mod.aro_plugin_info()))\n",
            self.preamble(),
            module = self.module,
        );
        self.run(script, &[]).await
    }

    async fn call_action(&self, verb: &str, input_json: &str) -> PluginResult<String> {
        let function = format!("aro_action_{}", snake_case_verb(verb));
        let script = format!(
            "{preamble}try:\n\
             \x20   mod = importlib.import_module({module:?})\n\
             \x20   payload = json.loads(base64.b64decode(sys.argv[1]).decode('utf-8'))\n\
             \x20   result = getattr(mod, {function:?})(payload)\n\
             \x20   print(json.dumps(result))\n\
             except Exception as exc:\n\
             \x20   print(json.dumps({{\"error\": str(exc), \"traceback\": traceback.format_exc()}}))\n",
            preamble = self.preamble(),
            module = self.module,
            function = function,
        );
        let argv = vec![BASE64.encode(input_json.as_bytes())];
        self.run(script, &argv).await
    }

    async fn call_qualifier(&self, name: &str, input_json: &str) -> PluginResult<String> {
        let script = format!(
            "{preamble}try:\n\
             \x20   mod = importlib.import_module({module:?})\n\
             \x20   payload = json.loads(base64.b64decode(sys.argv[1]).decode('utf-8'))\n\
             \x20   result = mod.aro_plugin_qualifier({name:?}, payload)\n\
             \x20   print(json.dumps(result))\n\
             except Exception as exc:\n\
             \x20   print(json.dumps({{\"error\": str(exc), \"traceback\": traceback.format_exc()}}))\n",
            preamble = self.preamble(),
            module = self.module,
            name = name,
        );
        let argv = vec![BASE64.encode(input_json.as_bytes())];
        self.run(script, &argv).await
    }
}

// =============================================================================
// Provider
// =============================================================================

/// A managed python plugin as a driver-attachable provider.
pub struct PythonPluginHost {
    plugin: String,
    directory: PathBuf,
    entry: ProvideEntry,
    timeout: Duration,
}

impl PythonPluginHost {
    pub fn new(plugin: impl Into<String>, directory: PathBuf, entry: ProvideEntry) -> Self {
        Self {
            plugin: plugin.into(),
            directory,
            entry,
            timeout: Duration::from_secs(30),
        }
    }

    /// Overrides the default 30s per-call deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Identifies the plugin's main source file by convention:
    /// `plugin.py`, `<name>.py`, `main.py`, `__init__.py`.
    fn find_main_file(&self, dir: &Path) -> PluginResult<PathBuf> {
        let mut candidates = vec![
            MAIN_FILE_CANDIDATES[0].to_string(),
            format!("{}.py", self.plugin),
        ];
        candidates.extend(MAIN_FILE_CANDIDATES[1..].iter().map(|c| c.to_string()));

        for candidate in candidates {
            let path = dir.join(&candidate);
            if path.exists() {
                return Ok(path);
            }
        }
        Err(PluginError::MainFileNotFound {
            plugin: self.plugin.clone(),
            dir: dir.to_path_buf(),
        })
    }

    fn build_call(&self) -> PluginResult<Arc<ScriptedCall>> {
        let dir = self.directory.join(self.entry.path.trim_start_matches("./"));
        let dir = if dir.is_dir() { dir } else { self.directory.clone() };
        let main_file = self.find_main_file(&dir)?;

        // `__init__.py` makes the directory itself the module.
        let (module_dir, module) = if main_file.file_name().is_some_and(|n| n == "__init__.py") {
            let parent = dir.parent().unwrap_or(&dir).to_path_buf();
            let module = dir
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(&self.plugin)
                .to_string();
            (parent, module)
        } else {
            let module = main_file
                .file_stem()
                .and_then(|n| n.to_str())
                .unwrap_or(&self.plugin)
                .to_string();
            (dir, module)
        };

        let interpreter = find_interpreter().ok_or_else(|| PluginError::InterpreterNotFound {
            plugin: self.plugin.clone(),
        })?;
        debug!(
            plugin = %self.plugin,
            interpreter = %interpreter.display(),
            %module,
            "Scripted plugin resolved"
        );

        Ok(Arc::new(ScriptedCall {
            plugin: self.plugin.clone(),
            interpreter,
            module_dir,
            module,
            timeout: self.timeout,
        }))
    }

    fn namespace(&self) -> &str {
        self.entry.handler.as_deref().unwrap_or(&self.plugin)
    }
}

#[async_trait]
impl PluginProvider for PythonPluginHost {
    fn name(&self) -> &str {
        &self.plugin
    }

    async fn load(&self, services: &Arc<RuntimeServices>) -> anyhow::Result<PluginContribution> {
        let call = self.build_call()?;

        let info_json = call.call_info().await?;
        let plugin_info = PluginInfo::parse(&self.plugin, &info_json)?;
        info!(
            plugin = %self.plugin,
            actions = plugin_info.actions.len(),
            qualifiers = plugin_info.qualifiers.len(),
            "Scripted plugin loaded"
        );

        for declared in &plugin_info.qualifiers {
            let accepted: BTreeSet<ValueType> = declared
                .input_types
                .iter()
                .filter_map(|label| ValueType::parse(label))
                .collect();
            let call = Arc::clone(&call);
            let plugin = self.plugin.clone();
            let qualifier = declared.name.clone();
            services.qualifiers.register(QualifierRegistration {
                name: declared.name.clone(),
                namespace: self.namespace().to_string(),
                accepted_types: accepted,
                owner: self.plugin.clone(),
                description: declared.description.clone().unwrap_or_default(),
                handler: qualifier_handler(move |value: RuntimeValue| {
                    let call = Arc::clone(&call);
                    let plugin = plugin.clone();
                    let qualifier = qualifier.clone();
                    async move {
                        let request = qualifier_request(&value);
                        let reply = call
                            .call_qualifier(&qualifier, &request)
                            .await
                            .map_err(RuntimeError::from)?;
                        parse_qualifier_reply(&plugin, &reply)
                    }
                }),
            });
        }

        for declared in &plugin_info.actions {
            for (action, verb) in declared.verb_mappings() {
                let key = match &self.entry.handler {
                    Some(namespace) => format!("{namespace}.{verb}"),
                    None => verb.clone(),
                };
                let call = Arc::clone(&call);
                let plugin = self.plugin.clone();
                let registration = ActionRegistration {
                    verb: key,
                    aliases: Vec::new(),
                    owner: Some(self.plugin.clone()),
                    handler: handler(move |invocation: ActionInvocation| {
                        let call = Arc::clone(&call);
                        let plugin = plugin.clone();
                        let action = action.clone();
                        async move {
                            let input = marshal_input(&invocation).to_string();
                            let reply = call
                                .call_action(&action, &input)
                                .await
                                .map_err(RuntimeError::from)?;
                            parse_execute_reply(&plugin, &reply).map(ActionOutcome::Value)
                        }
                    }),
                };
                if let Err(error) = services.actions.register(registration) {
                    services.actions.unregister_owned(&self.plugin);
                    services.qualifiers.unregister_owned(&self.plugin);
                    return Err(anyhow::anyhow!(error.to_string()));
                }
            }
        }

        Ok(PluginContribution::default())
    }

    async fn unload(&self, services: &Arc<RuntimeServices>) {
        services.actions.unregister_owned(&self.plugin);
        services.qualifiers.unregister_owned(&self.plugin);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ProvideKind;

    fn entry() -> ProvideEntry {
        ProvideEntry {
            kind: ProvideKind::PythonPlugin,
            path: ".".to_string(),
            handler: None,
            build: None,
            python: None,
        }
    }

    const PLUGIN_SOURCE: &str = r#"
def aro_plugin_info():
    return {
        "name": "shouter",
        "version": "1.0.0",
        "language": "python",
        "actions": ["shout"],
        "qualifiers": [{"name": "upper", "inputTypes": ["string"]}],
    }

def aro_action_shout(payload):
    return {"result": str(payload.get("data", "")) + "!"}

def aro_plugin_qualifier(name, payload):
    if name == "upper":
        return {"result": payload["value"].upper()}
    return {"error": "unknown qualifier " + name}
"#;

    #[test]
    fn verbs_are_snake_cased() {
        assert_eq!(snake_case_verb("create-user"), "create_user");
        assert_eq!(snake_case_verb("Shout"), "shout");
        assert_eq!(snake_case_verb("ns.verb"), "ns_verb");
    }

    #[tokio::test]
    async fn scripted_plugin_round_trip() {
        let Some(_) = find_interpreter() else {
            eprintln!("no python interpreter available; skipping");
            return;
        };
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("plugin.py"), PLUGIN_SOURCE).unwrap();

        let host = PythonPluginHost::new("shouter", dir.path().to_path_buf(), entry());
        let (services, _rx) = RuntimeServices::create();
        host.load(&services).await.unwrap();

        // The action arrived in the registry under its bare verb.
        assert!(services.actions.lookup("shout").is_some());

        // The qualifier speaks the wire protocol.
        let result = services
            .qualifiers
            .apply(Some("shouter"), "upper", RuntimeValue::Text("hey".into()))
            .await
            .unwrap();
        assert_eq!(result, RuntimeValue::Text("HEY".into()));

        // Unloading restores both registries.
        let before_actions = {
            let (fresh, _rx) = RuntimeServices::create();
            fresh.actions.snapshot()
        };
        host.unload(&services).await;
        assert_eq!(services.actions.snapshot(), before_actions);
        assert!(services.qualifiers.lookup("shouter", "upper").is_none());
    }

    #[tokio::test]
    async fn plugin_exception_is_surfaced_as_error_json() {
        let Some(_) = find_interpreter() else {
            eprintln!("no python interpreter available; skipping");
            return;
        };
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("plugin.py"),
            "def aro_action_boom(payload):\n    raise ValueError('bad input')\n",
        )
        .unwrap();

        let call = ScriptedCall {
            plugin: "boomer".to_string(),
            interpreter: find_interpreter().unwrap(),
            module_dir: dir.path().to_path_buf(),
            module: "plugin".to_string(),
            timeout: Duration::from_secs(10),
        };
        let reply = call.call_action("boom", "{}").await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(json["error"], serde_json::json!("bad input"));
        assert!(json["traceback"].as_str().unwrap().contains("ValueError"));
    }

    #[tokio::test]
    async fn missing_main_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let host = PythonPluginHost::new("empty", dir.path().to_path_buf(), entry());
        let (services, _rx) = RuntimeServices::create();
        assert!(host.load(&services).await.is_err());
    }
}
