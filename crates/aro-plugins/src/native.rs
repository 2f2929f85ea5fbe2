//! The native (C-ABI) plugin host.
//!
//! A native plugin is a shared library exposing C-linkage entry points:
//!
//! | Symbol | Required |
//! |---|---|
//! | `aro_plugin_execute(verb, input_json) -> json` | yes |
//! | `aro_plugin_free(ptr)` | yes |
//! | `aro_plugin_info() -> json` | no |
//! | `aro_plugin_qualifier(name, input_json) -> json` | no |
//!
//! All strings are null-terminated UTF-8; every buffer the plugin returns
//! is handed back to `aro_plugin_free`. Libraries are opened with an
//! RTLD_NOW-equivalent policy and library-local symbol scope, and the
//! handle outlives every registration it created.
//!
//! FFI calls are synchronous and may block, so they run on the blocking
//! thread pool; the registered handlers themselves are ordinary suspending
//! actions and qualifiers.

use std::collections::BTreeSet;
use std::ffi::{CStr, CString, c_char};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use libloading::Library;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use aro_core::error::{RuntimeError, RuntimeResult};
use aro_core::value::{RuntimeValue, ValueType};
use aro_runtime::actions::{ActionInvocation, ActionOutcome, ActionRegistration};
use aro_runtime::driver::{PluginContribution, PluginProvider};
use aro_runtime::qualifiers::QualifierRegistration;
use aro_runtime::services::RuntimeServices;
use aro_runtime::{handler, qualifier_handler};

use crate::compile;
use crate::error::{PluginError, PluginResult};
use crate::manifest::ProvideEntry;

const EXECUTE_SYMBOL: &[u8] = b"aro_plugin_execute\0";
const FREE_SYMBOL: &[u8] = b"aro_plugin_free\0";
const INFO_SYMBOL: &[u8] = b"aro_plugin_info\0";
const QUALIFIER_SYMBOL: &[u8] = b"aro_plugin_qualifier\0";

type ExecuteFn = unsafe extern "C" fn(*const c_char, *const c_char) -> *mut c_char;
type FreeFn = unsafe extern "C" fn(*mut c_char);
type InfoFn = unsafe extern "C" fn() -> *mut c_char;
type QualifierFn = unsafe extern "C" fn(*const c_char, *const c_char) -> *mut c_char;

impl From<PluginError> for RuntimeError {
    fn from(error: PluginError) -> Self {
        match &error {
            PluginError::Protocol { plugin, message } => RuntimeError::Protocol {
                message: format!("plugin '{plugin}': {message}"),
            },
            PluginError::Timeout { plugin, secs } => RuntimeError::Timeout {
                what: format!("plugin '{plugin}' call"),
                secs: *secs,
            },
            _ => RuntimeError::Plugin {
                plugin: "native".to_string(),
                message: error.to_string(),
            },
        }
    }
}

// =============================================================================
// Loaded library
// =============================================================================

/// An open plugin library. All raw-pointer traffic is contained here.
pub struct NativeLibrary {
    plugin: String,
    library: Library,
}

impl NativeLibrary {
    /// Opens the library with immediate binding and local symbol scope and
    /// verifies the required entry points.
    pub fn open(plugin: &str, path: &PathBuf) -> PluginResult<Self> {
        let library = open_with_local_scope(path).map_err(|e| PluginError::LibraryOpen {
            plugin: plugin.to_string(),
            message: e.to_string(),
        })?;
        let loaded = Self {
            plugin: plugin.to_string(),
            library,
        };
        for symbol in [EXECUTE_SYMBOL, FREE_SYMBOL] {
            if !loaded.has_symbol(symbol) {
                return Err(PluginError::MissingSymbol {
                    plugin: plugin.to_string(),
                    symbol: String::from_utf8_lossy(&symbol[..symbol.len() - 1]).into_owned(),
                });
            }
        }
        Ok(loaded)
    }

    fn has_symbol(&self, symbol: &[u8]) -> bool {
        unsafe { self.library.get::<*const ()>(symbol).is_ok() }
    }

    /// Calls `aro_plugin_execute` and frees the returned buffer.
    pub fn call_execute(&self, action: &str, input: &str) -> PluginResult<String> {
        unsafe {
            let execute = self
                .library
                .get::<ExecuteFn>(EXECUTE_SYMBOL)
                .map_err(|e| self.missing(EXECUTE_SYMBOL, e))?;
            let action_c = self.c_string(action)?;
            let input_c = self.c_string(input)?;
            let raw = execute(action_c.as_ptr(), input_c.as_ptr());
            self.take_reply(raw)
        }
    }

    /// Calls `aro_plugin_qualifier` and frees the returned buffer.
    pub fn call_qualifier(&self, qualifier: &str, input: &str) -> PluginResult<String> {
        unsafe {
            let run = self
                .library
                .get::<QualifierFn>(QUALIFIER_SYMBOL)
                .map_err(|e| self.missing(QUALIFIER_SYMBOL, e))?;
            let qualifier_c = self.c_string(qualifier)?;
            let input_c = self.c_string(input)?;
            let raw = run(qualifier_c.as_ptr(), input_c.as_ptr());
            self.take_reply(raw)
        }
    }

    /// Calls `aro_plugin_info` when exported.
    pub fn call_info(&self) -> PluginResult<Option<String>> {
        if !self.has_symbol(INFO_SYMBOL) {
            return Ok(None);
        }
        unsafe {
            let info = self
                .library
                .get::<InfoFn>(INFO_SYMBOL)
                .map_err(|e| self.missing(INFO_SYMBOL, e))?;
            let raw = info();
            self.take_reply(raw).map(Some)
        }
    }

    /// Copies a plugin-owned buffer into a Rust string and frees it through
    /// the plugin's own allocator.
    unsafe fn take_reply(&self, raw: *mut c_char) -> PluginResult<String> {
        if raw.is_null() {
            return Err(PluginError::Execute {
                plugin: self.plugin.clone(),
                message: "the plugin returned a null buffer".to_string(),
            });
        }
        let text = unsafe { CStr::from_ptr(raw) }.to_string_lossy().into_owned();
        unsafe {
            if let Ok(free) = self.library.get::<FreeFn>(FREE_SYMBOL) {
                free(raw);
            }
        }
        Ok(text)
    }

    fn c_string(&self, text: &str) -> PluginResult<CString> {
        CString::new(text).map_err(|_| PluginError::Protocol {
            plugin: self.plugin.clone(),
            message: "input contains an interior NUL byte".to_string(),
        })
    }

    fn missing(&self, symbol: &[u8], error: libloading::Error) -> PluginError {
        PluginError::MissingSymbol {
            plugin: self.plugin.clone(),
            symbol: format!(
                "{} ({error})",
                String::from_utf8_lossy(&symbol[..symbol.len() - 1])
            ),
        }
    }
}

#[cfg(unix)]
fn open_with_local_scope(path: &PathBuf) -> Result<Library, libloading::Error> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_LOCAL, RTLD_NOW};
    unsafe { UnixLibrary::open(Some(path), RTLD_NOW | RTLD_LOCAL).map(Into::into) }
}

#[cfg(not(unix))]
fn open_with_local_scope(path: &PathBuf) -> Result<Library, libloading::Error> {
    unsafe { Library::new(path) }
}

// =============================================================================
// Info block
// =============================================================================

/// The parsed `aro_plugin_info` block.
#[derive(Debug, Default, Deserialize)]
pub struct PluginInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub actions: Vec<ActionDecl>,
    #[serde(default)]
    pub qualifiers: Vec<QualifierDecl>,
}

/// One declared action. The legacy shape is a bare string (the verb is
/// also the action name); the rich shape maps several verbs to one
/// canonical action.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ActionDecl {
    Legacy(String),
    Rich {
        name: String,
        #[serde(default)]
        verbs: Vec<String>,
    },
}

impl ActionDecl {
    /// `(canonical_action, verbs)` pairs, preserving the verb → action
    /// mapping.
    pub fn verb_mappings(&self) -> Vec<(String, String)> {
        match self {
            ActionDecl::Legacy(name) => vec![(name.clone(), name.clone())],
            ActionDecl::Rich { name, verbs } => {
                if verbs.is_empty() {
                    vec![(name.clone(), name.clone())]
                } else {
                    verbs.iter().map(|verb| (name.clone(), verb.clone())).collect()
                }
            }
        }
    }
}

/// One declared qualifier.
#[derive(Debug, Deserialize)]
pub struct QualifierDecl {
    pub name: String,
    #[serde(default, rename = "inputTypes")]
    pub input_types: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl PluginInfo {
    pub fn parse(plugin: &str, json: &str) -> PluginResult<Self> {
        serde_json::from_str(json).map_err(|e| PluginError::Protocol {
            plugin: plugin.to_string(),
            message: format!("malformed info block: {e}"),
        })
    }
}

// =============================================================================
// Wire helpers
// =============================================================================

/// Builds the JSON input object for `aro_plugin_execute`: the object's
/// value under `data`, `object`, and its base name (kept for older
/// plugins), the first specifier as `qualifier`, and the `with` clause
/// merged in.
pub fn marshal_input(invocation: &ActionInvocation) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    let object_json = invocation.object_value.to_json();
    map.insert("data".to_string(), object_json.clone());
    map.insert("object".to_string(), object_json.clone());
    let object_name = invocation.object_name();
    if !object_name.is_empty() {
        map.insert(object_name.to_string(), object_json);
    }

    let qualifier = invocation
        .object
        .as_ref()
        .and_then(|d| d.specifiers.first().cloned().or_else(|| d.qualifier.clone()));
    if let Some(qualifier) = qualifier {
        map.insert("qualifier".to_string(), serde_json::Value::String(qualifier));
    }

    if let RuntimeValue::Map(fields) = &invocation.with_value {
        for (key, value) in fields {
            map.insert(key.clone(), value.to_json());
        }
    }
    if !matches!(invocation.with_value, RuntimeValue::Null) {
        map.insert("_with_".to_string(), invocation.with_value.to_json());
    }
    if !matches!(invocation.expression_value, RuntimeValue::Null) {
        map.insert(
            "_expression_".to_string(),
            invocation.expression_value.to_json(),
        );
    }
    serde_json::Value::Object(map)
}

/// Parses an execute reply: `{"error": …}` fails, `{"result": …}` unwraps,
/// anything else binds verbatim.
pub fn parse_execute_reply(plugin: &str, text: &str) -> RuntimeResult<RuntimeValue> {
    let json: serde_json::Value =
        serde_json::from_str(text).map_err(|e| RuntimeError::Protocol {
            message: format!("plugin '{plugin}' returned malformed JSON: {e}"),
        })?;
    if let Some(object) = json.as_object() {
        if let Some(error) = object.get("error").and_then(|v| v.as_str()) {
            return Err(RuntimeError::plugin(plugin, error));
        }
        if let Some(result) = object.get("result") {
            return Ok(RuntimeValue::from_json(result));
        }
    }
    Ok(RuntimeValue::from_json(&json))
}

/// Parses a qualifier reply, which must be exactly `{"result": …}` or
/// `{"error": …}`.
pub fn parse_qualifier_reply(plugin: &str, text: &str) -> RuntimeResult<RuntimeValue> {
    let json: serde_json::Value =
        serde_json::from_str(text).map_err(|e| RuntimeError::Protocol {
            message: format!("plugin '{plugin}' returned malformed JSON: {e}"),
        })?;
    let Some(object) = json.as_object() else {
        return Err(RuntimeError::Protocol {
            message: format!("plugin '{plugin}' qualifier reply is not an object"),
        });
    };
    if let Some(error) = object.get("error").and_then(|v| v.as_str()) {
        return Err(RuntimeError::plugin(plugin, error));
    }
    match object.get("result") {
        Some(result) => Ok(RuntimeValue::from_json(result)),
        None => Err(RuntimeError::Protocol {
            message: format!("plugin '{plugin}' qualifier reply has neither result nor error"),
        }),
    }
}

/// The request body for a qualifier invocation.
pub fn qualifier_request(value: &RuntimeValue) -> String {
    serde_json::json!({
        "value": value.to_json(),
        "type": value.type_label().as_str(),
    })
    .to_string()
}

// =============================================================================
// Provider
// =============================================================================

/// A managed native plugin as a driver-attachable provider.
pub struct NativePluginHost {
    plugin: String,
    directory: PathBuf,
    entry: ProvideEntry,
    loaded: Mutex<Option<Arc<NativeLibrary>>>,
}

impl NativePluginHost {
    pub fn new(plugin: impl Into<String>, directory: PathBuf, entry: ProvideEntry) -> Self {
        Self {
            plugin: plugin.into(),
            directory,
            entry,
            loaded: Mutex::new(None),
        }
    }

    /// The namespace this entry registers under: the manifest's `handler`,
    /// defaulting to the plugin name.
    fn namespace(&self) -> &str {
        self.entry.handler.as_deref().unwrap_or(&self.plugin)
    }

    /// Finds the loadable library: explicit `build.output`, conventional
    /// names next to the manifest, a prebuilt cargo artifact, and finally a
    /// fresh build.
    async fn locate_library(&self) -> PluginResult<PathBuf> {
        let base = self.directory.join(self.entry.path.trim_start_matches("./"));
        let base = if base.is_dir() { base } else { self.directory.clone() };

        let mut searched = Vec::new();
        if let Some(output) = self.entry.build.as_ref().and_then(|b| b.output.as_deref()) {
            let explicit = self.directory.join(output);
            if explicit.exists() {
                return Ok(explicit);
            }
            searched.push(explicit);
        }
        if let Some(found) = compile::find_library(&self.plugin, &base) {
            return Ok(found);
        }
        searched.push(base.clone());
        let release = base.join("target").join("release");
        if let Some(found) = compile::find_library(&self.plugin, &release) {
            return Ok(found);
        }
        searched.push(release);

        debug!(plugin = %self.plugin, ?searched, "No prebuilt library; compiling");
        compile::build_plugin(&self.plugin, &base, self.entry.build.as_ref()).await
    }

    fn register_qualifiers(
        &self,
        services: &Arc<RuntimeServices>,
        library: &Arc<NativeLibrary>,
        info: &PluginInfo,
    ) {
        for declared in &info.qualifiers {
            let accepted: BTreeSet<ValueType> = declared
                .input_types
                .iter()
                .filter_map(|label| ValueType::parse(label))
                .collect();
            let library = Arc::clone(library);
            let plugin = self.plugin.clone();
            let qualifier = declared.name.clone();
            services.qualifiers.register(QualifierRegistration {
                name: declared.name.clone(),
                namespace: self.namespace().to_string(),
                accepted_types: accepted,
                owner: self.plugin.clone(),
                description: declared.description.clone().unwrap_or_default(),
                handler: qualifier_handler(move |value| {
                    let library = Arc::clone(&library);
                    let plugin = plugin.clone();
                    let qualifier = qualifier.clone();
                    async move {
                        let request = qualifier_request(&value);
                        let reply = tokio::task::spawn_blocking(move || {
                            library.call_qualifier(&qualifier, &request)
                        })
                        .await
                        .map_err(|e| RuntimeError::service(e.to_string()))??;
                        parse_qualifier_reply(&plugin, &reply)
                    }
                }),
            });
        }
    }

    fn register_actions(
        &self,
        services: &Arc<RuntimeServices>,
        library: &Arc<NativeLibrary>,
        info: &PluginInfo,
    ) -> PluginResult<()> {
        for declared in &info.actions {
            for (action, verb) in declared.verb_mappings() {
                // A declared handler namespace keeps plugin verbs out of
                // the bare verb space entirely.
                let key = match &self.entry.handler {
                    Some(namespace) => format!("{namespace}.{verb}"),
                    None => verb.clone(),
                };
                let library = Arc::clone(library);
                let plugin = self.plugin.clone();
                let registration = ActionRegistration {
                    verb: key,
                    aliases: Vec::new(),
                    owner: Some(self.plugin.clone()),
                    handler: handler(move |invocation: ActionInvocation| {
                        let library = Arc::clone(&library);
                        let plugin = plugin.clone();
                        let action = action.clone();
                        async move {
                            let input = marshal_input(&invocation).to_string();
                            let reply = tokio::task::spawn_blocking(move || {
                                library.call_execute(&action, &input)
                            })
                            .await
                            .map_err(|e| RuntimeError::service(e.to_string()))??;
                            parse_execute_reply(&plugin, &reply).map(ActionOutcome::Value)
                        }
                    }),
                };
                services
                    .actions
                    .register(registration)
                    .map_err(|e| PluginError::Execute {
                        plugin: self.plugin.clone(),
                        message: e.to_string(),
                    })?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PluginProvider for NativePluginHost {
    fn name(&self) -> &str {
        &self.plugin
    }

    async fn load(&self, services: &Arc<RuntimeServices>) -> anyhow::Result<PluginContribution> {
        let path = self.locate_library().await?;
        info!(plugin = %self.plugin, library = %path.display(), "Opening native plugin");
        let library = Arc::new(NativeLibrary::open(&self.plugin, &path)?);

        let info = match library.call_info()? {
            Some(json) => PluginInfo::parse(&self.plugin, &json)?,
            None => {
                warn!(
                    plugin = %self.plugin,
                    "Plugin exports no aro_plugin_info; nothing to register"
                );
                PluginInfo::default()
            }
        };
        debug!(
            plugin = %self.plugin,
            language = info.language.as_deref().unwrap_or("unknown"),
            actions = info.actions.len(),
            qualifiers = info.qualifiers.len(),
            "Plugin info loaded"
        );

        self.register_qualifiers(services, &library, &info);
        if let Err(error) = self.register_actions(services, &library, &info) {
            // Roll back everything this plugin managed to register.
            services.actions.unregister_owned(&self.plugin);
            services.qualifiers.unregister_owned(&self.plugin);
            return Err(error.into());
        }

        *self.loaded.lock().await = Some(library);
        Ok(PluginContribution::default())
    }

    async fn unload(&self, services: &Arc<RuntimeServices>) {
        services.actions.unregister_owned(&self.plugin);
        services.qualifiers.unregister_owned(&self.plugin);
        // Registrations (and their handler closures) are gone; the handle
        // can now close.
        self.loaded.lock().await.take();
    }
}
