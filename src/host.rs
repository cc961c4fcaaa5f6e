//! Seams between the orchestration logic and the outside world.
//!
//! The sequencer and reconciler are written against these traits rather than
//! `web_sys` directly, so they run natively in tests. The `web` module provides
//! the browser implementations; tests provide in-memory fakes.
//!
//! | Trait | Stands for |
//! |-------|------------|
//! | [`Scheduler`] | timers and local task spawning |
//! | [`Viewport`] | window inner size and scroll position |
//! | [`CanvasSurface`] | the canvas element's size and inline style |
//! | [`Page`] | the document: canvas creation, CSS, error panel, listeners |
//! | [`Engine`] | the engine library: devices, application, decoder registry |
//! | [`Application`] | one engine application instance |

#[cfg(test)]
#[path = "host_test.rs"]
mod host_test;

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use futures::future::LocalBoxFuture;

use crate::devices::{DeviceKind, DeviceSet};
use crate::error::BootError;
use crate::settings::{BasisDecoder, ContextOptions, DracoDecoder, InputSettings, ModuleUrls};

/// Canvas sizing policy, using the engine's string constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillMode {
    None,
    KeepAspect,
    #[default]
    FillWindow,
}

impl FillMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::KeepAspect => "KEEP_ASPECT",
            Self::FillWindow => "FILL_WINDOW",
        }
    }

    /// Parse an engine fill mode constant. Unknown values fall back to `FillWindow`.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "NONE" => Self::None,
            "KEEP_ASPECT" => Self::KeepAspect,
            _ => Self::FillWindow,
        }
    }

    /// Modes where the canvas may be letterboxed and needs vertical centering.
    #[must_use]
    pub fn letterboxes(self) -> bool {
        matches!(self, Self::None | Self::KeepAspect)
    }
}

impl fmt::Display for FillMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backing-store resolution policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolutionMode {
    #[default]
    Auto,
    Fixed,
}

impl ResolutionMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "AUTO",
            Self::Fixed => "FIXED",
        }
    }
}

/// Window inner dimensions in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ViewportSize {
    pub width: f64,
    pub height: f64,
}

impl ViewportSize {
    #[must_use]
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Width over height, or `None` for a degenerate viewport.
    #[must_use]
    pub fn aspect(self) -> Option<f64> {
        if self.height > 0.0 { Some(self.width / self.height) } else { None }
    }
}

/// iOS version as `(major, minor, patch)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct IosVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl IosVersion {
    /// Parse from `navigator.platform` and `navigator.appVersion`.
    ///
    /// Returns `None` off iOS or when the app version has no `OS x_y[_z]` token.
    #[must_use]
    pub fn detect(platform: &str, app_version: &str) -> Option<Self> {
        let on_ios = ["iPhone", "iPod", "iPad"].iter().any(|p| platform.contains(p));
        if !on_ios {
            return None;
        }
        app_version
            .match_indices("OS ")
            .find_map(|(at, token)| parse_version_token(&app_version[at + token.len()..]))
    }

    /// iOS 12 and earlier hide content under the URL bar after rotation.
    #[must_use]
    pub fn needs_scroll_reset(self) -> bool {
        self.major <= 12
    }
}

fn parse_version_token(rest: &str) -> Option<IosVersion> {
    let token: &str = rest
        .split(|c: char| !(c.is_ascii_digit() || c == '_'))
        .next()
        .unwrap_or_default();
    let mut parts = token.split('_').filter(|p| !p.is_empty());
    let Ok(major) = parts.next()?.parse::<u32>() else {
        return None;
    };
    let Ok(minor) = parts.next()?.parse::<u32>() else {
        return None;
    };
    let patch = match parts.next().map(str::parse::<u32>) {
        Some(Ok(patch)) => patch,
        Some(Err(_)) => return None,
        None => 0,
    };
    Some(IosVersion { major, minor, patch })
}

/// Timers and task spawning on the single-threaded event loop.
pub trait Scheduler {
    /// Resolve after `delay`. Never resolves synchronously, even for a zero delay.
    fn sleep(&self, delay: Duration) -> LocalBoxFuture<'static, ()>;

    /// Run `task` to completion in the background.
    fn spawn(&self, task: LocalBoxFuture<'static, ()>);

    /// Resolve on the next scheduling tick.
    fn next_tick(&self) -> LocalBoxFuture<'static, ()> {
        self.sleep(Duration::ZERO)
    }
}

pub trait Viewport {
    fn inner_size(&self) -> ViewportSize;
    fn scroll_to_origin(&self);
}

/// The canvas element as the reconciler sees it.
pub trait CanvasSurface {
    /// Backing-store size in device pixels (`canvas.width`, `canvas.height`).
    fn pixel_size(&self) -> (u32, u32);
    /// Laid-out size in CSS pixels (`clientWidth`, `clientHeight`).
    fn client_size(&self) -> (f64, f64);
    /// Remove inline `width`/`height` styles.
    fn clear_inline_size(&self);
    /// Set `margin-top` in pixels, or clear it with `None`.
    fn set_margin_top(&self, px: Option<i64>);
}

/// The document hosting the canvas.
pub trait Page: Scheduler + Viewport {
    type Container;
    type Canvas: CanvasSurface;

    /// Create the canvas and attach it to `container`, or to the body.
    ///
    /// # Errors
    ///
    /// Returns [`BootError::Dom`] if the element cannot be created or attached.
    fn create_canvas(&self, id: &str, container: Option<&Self::Container>) -> Result<Self::Canvas, BootError>;

    fn remove_canvas(&self, canvas: &Self::Canvas);

    /// Replace the body content with `html`.
    fn show_error_panel(&self, html: &str);

    /// Tag the canvas with its fill mode class and append `css` to the document head.
    ///
    /// # Errors
    ///
    /// Returns [`BootError::Dom`] if the stylesheet cannot be updated.
    fn apply_fill_css(&self, canvas: &Self::Canvas, fill_mode: FillMode, css: &str) -> Result<(), BootError>;

    /// Invoke `handler` on every `resize` and `orientationchange` event.
    ///
    /// # Errors
    ///
    /// Returns [`BootError::Dom`] if a listener cannot be registered.
    fn on_viewport_change(&self, handler: Rc<dyn Fn()>) -> Result<(), BootError>;

    fn device_pixel_ratio(&self) -> f64;

    fn ios_version(&self) -> Option<IosVersion>;
}

/// Construction options for the engine application.
#[derive(Debug, Clone)]
pub struct AppOptions<'a> {
    pub graphics: &'a ContextOptions,
    pub asset_prefix: &'a str,
    pub script_prefix: &'a str,
    pub scripts_order: &'a [String],
}

/// The external engine library.
pub trait Engine {
    type Canvas;
    type Device;
    type App: Application;

    fn touch_supported(&self) -> bool;

    /// Construct one input device.
    ///
    /// # Errors
    ///
    /// Returns [`BootError::Initialization`] if the engine rejects the device.
    fn create_device(
        &self,
        kind: DeviceKind,
        canvas: &Self::Canvas,
        input: &InputSettings,
    ) -> Result<Self::Device, BootError>;

    /// Construct the application. Devices are consumed by reference here only.
    ///
    /// # Errors
    ///
    /// Returns one of the three construction kinds of [`BootError`].
    fn create_application(
        &self,
        canvas: &Self::Canvas,
        devices: &DeviceSet<Self::Device>,
        options: &AppOptions<'_>,
    ) -> Result<Self::App, BootError>;

    /// Publish the application as the `app` global.
    ///
    /// # Errors
    ///
    /// Returns [`BootError::Dom`] if the global cannot be set.
    fn expose_application(&self, app: &Self::App) -> Result<(), BootError>;

    /// Toggle the engine's legacy script system.
    fn set_legacy_scripts(&self, legacy: bool);

    /// Register a module's URLs with the module registry.
    fn register_module(&self, name: &str, urls: &ModuleUrls);

    /// Initialize the Basis transcoder, with explicit URLs or from the registry.
    fn basis_initialize(&self, config: Option<&BasisDecoder>);

    /// Initialize the Draco decoder directly.
    ///
    /// Returns `false` when the engine predates direct initialization, in which
    /// case the caller falls back to [`Engine::module_instance`].
    fn draco_initialize(&self, config: Option<&DracoDecoder>) -> bool;

    /// Resolve once the registry has instantiated module `name`.
    fn module_instance(&self, name: &str) -> LocalBoxFuture<'static, ()>;
}

/// One engine application instance.
pub trait Application {
    fn set_canvas_fill_mode(&self, mode: FillMode);
    fn set_canvas_resolution(&self, mode: ResolutionMode);
    fn fill_mode(&self) -> FillMode;
    /// Configured resolution `(width, height)` from the loaded config.
    fn resolution(&self) -> (u32, u32);
    fn resize_canvas(&self, width: u32, height: u32);
    fn set_max_pixel_ratio(&self, ratio: f64);
    /// Load the engine config file at `url`. The error string is the engine's message.
    fn configure(&self, url: &str) -> LocalBoxFuture<'static, Result<(), String>>;
    fn destroy(&self);
}
