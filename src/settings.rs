//! Bootstrap settings: graphics options, asset prefixes, input flags, preload modules.
//!
//! Replaces the window-scoped globals a hosted engine build normally reads at
//! startup. The page hands one `Settings` value to the sequencer; nothing here
//! is global or mutable after construction. Every field is optional in JSON and
//! falls back to the defaults of a stock engine export.

#[cfg(test)]
#[path = "settings_test.rs"]
mod settings_test;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::BootError;

pub const DEFAULT_CANVAS_ID: &str = "application-canvas";
pub const DEFAULT_CONFIG_FILENAME: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub asset_prefix: String,
    pub script_prefix: String,
    pub canvas_id: String,
    pub context_options: ContextOptions,
    /// Script load order handed to the application.
    pub scripts: Vec<String>,
    pub config_filename: String,
    pub input: InputSettings,
    pub preload_modules: Vec<ModuleDescriptor>,
    pub decoders: DecoderSettings,
    pub legacy_scripts: bool,
    /// Cap for the graphics device pixel ratio. `None` follows `devicePixelRatio`.
    pub max_pixel_ratio: Option<f64>,
    pub reconcile: ReconcilePolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            asset_prefix: String::new(),
            script_prefix: String::new(),
            canvas_id: DEFAULT_CANVAS_ID.to_owned(),
            context_options: ContextOptions::default(),
            scripts: Vec::new(),
            config_filename: DEFAULT_CONFIG_FILENAME.to_owned(),
            input: InputSettings::default(),
            preload_modules: Vec::new(),
            decoders: DecoderSettings::default(),
            legacy_scripts: false,
            max_pixel_ratio: None,
            reconcile: ReconcilePolicy::default(),
        }
    }
}

impl Settings {
    /// Parse and validate settings from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`BootError::Settings`] if the JSON is malformed or a value is out of range.
    pub fn from_json(json: &str) -> Result<Self, BootError> {
        let settings: Self = serde_json::from_str(json).map_err(|e| BootError::Settings(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check value ranges serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`BootError::Settings`] naming the first offending field.
    pub fn validate(&self) -> Result<(), BootError> {
        if self.canvas_id.trim().is_empty() {
            return Err(BootError::Settings("canvasId must not be empty".to_owned()));
        }
        if self.config_filename.trim().is_empty() {
            return Err(BootError::Settings("configFilename must not be empty".to_owned()));
        }
        if let Some(ratio) = self.max_pixel_ratio {
            if !ratio.is_finite() || ratio <= 0.0 {
                return Err(BootError::Settings(format!("maxPixelRatio must be positive, got {ratio}")));
            }
        }
        // Browser timers take a u32 of milliseconds.
        let timer_limit = u64::from(u32::MAX);
        for (field, ms) in [
            ("reconcile.intervalMs", self.reconcile.interval_ms),
            ("reconcile.windowMs", self.reconcile.window_ms),
        ] {
            if ms > timer_limit {
                return Err(BootError::Settings(format!("{field} must be at most {timer_limit}, got {ms}")));
            }
        }
        if let Some(module) = self.preload_modules.iter().find(|m| m.module_name.is_empty()) {
            return Err(BootError::Settings(format!(
                "preload module with wasmUrl {:?} has no moduleName",
                module.wasm_url
            )));
        }
        Ok(())
    }

    /// URL of the engine config file, relative to the asset root.
    #[must_use]
    pub fn config_url(&self) -> String {
        if self.asset_prefix.is_empty() {
            format!("./{}", self.config_filename)
        } else {
            format!("{}{}", self.asset_prefix, self.config_filename)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PowerPreference {
    Default,
    #[default]
    HighPerformance,
    LowPower,
}

/// Graphics context creation options, serialized verbatim into the application options.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContextOptions {
    pub antialias: bool,
    pub alpha: bool,
    pub preserve_drawing_buffer: bool,
    #[serde(rename = "preferWebGl2")]
    pub prefer_webgl2: bool,
    pub power_preference: PowerPreference,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            antialias: true,
            alpha: true,
            preserve_drawing_buffer: true,
            prefer_webgl2: true,
            power_preference: PowerPreference::HighPerformance,
        }
    }
}

/// Which input devices the application is constructed with.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InputSettings {
    pub use_keyboard: bool,
    pub use_mouse: bool,
    pub use_gamepads: bool,
    pub use_touch: bool,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self { use_keyboard: true, use_mouse: true, use_gamepads: false, use_touch: true }
    }
}

/// One WASM module to register with the engine's module registry.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModuleDescriptor {
    pub module_name: String,
    pub glue_url: String,
    pub wasm_url: String,
    pub fallback_url: String,
    pub preload: Option<bool>,
}

impl ModuleDescriptor {
    /// Modules preload unless explicitly disabled.
    #[must_use]
    pub fn should_preload(&self) -> bool {
        self.preload.unwrap_or(true)
    }

    /// Registry URLs with `prefix` prepended to each.
    #[must_use]
    pub fn urls(&self, prefix: &str) -> ModuleUrls {
        ModuleUrls {
            glue_url: format!("{prefix}{}", self.glue_url),
            wasm_url: format!("{prefix}{}", self.wasm_url),
            fallback_url: format!("{prefix}{}", self.fallback_url),
        }
    }
}

/// The config object passed to the engine's module registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleUrls {
    pub glue_url: String,
    pub wasm_url: String,
    pub fallback_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DecoderSettings {
    pub draco: Option<DracoDecoder>,
    pub basis: Option<BasisDecoder>,
}

/// Draco geometry decoder, initialized eagerly after the application exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DracoDecoder {
    pub js_url: String,
    pub wasm_url: String,
    pub num_workers: u32,
    pub lazy_init: bool,
}

impl Default for DracoDecoder {
    fn default() -> Self {
        Self { js_url: String::new(), wasm_url: String::new(), num_workers: 2, lazy_init: true }
    }
}

/// Basis texture transcoder.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BasisDecoder {
    pub glue_url: String,
    pub wasm_url: String,
    pub fallback_url: String,
}

/// Bounded polling used after a reconciliation pass while the viewport settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconcilePolicy {
    pub interval_ms: u64,
    pub window_ms: u64,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self { interval_ms: 100, window_ms: 2000 }
    }
}

impl ReconcilePolicy {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Polling is off when the interval is zero or longer than the window.
    #[must_use]
    pub fn polls(&self) -> bool {
        self.interval_ms > 0 && self.interval_ms <= self.window_ms
    }
}
