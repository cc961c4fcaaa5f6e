//! Bindings to the PlayCanvas engine loaded as the `pc` global.
//!
//! Constructors and callbacks are bound through `wasm_bindgen` externs.
//! Entry points that older engine builds lack (`dracoInitialize`,
//! `platform.touch`, `script.legacy`) are looked up with `Reflect` so their
//! absence degrades instead of throwing.

use futures::FutureExt;
use futures::channel::oneshot;
use futures::future::LocalBoxFuture;
use js_sys::{Function, Object, Reflect};
use serde::Serialize;
use wasm_bindgen::prelude::*;
use web_sys::{HtmlCanvasElement, Window};

use super::page::{BrowserCanvas, dom_error};
use crate::devices::{DeviceKind, DeviceSet};
use crate::error::BootError;
use crate::host::{AppOptions, Application, Engine, FillMode, ResolutionMode};
use crate::settings::{BasisDecoder, DracoDecoder, InputSettings, ModuleUrls};

#[wasm_bindgen(js_namespace = pc)]
extern "C" {
    #[wasm_bindgen(js_name = Application)]
    type PcApplication;

    #[wasm_bindgen(constructor, catch, js_class = "Application")]
    fn new(canvas: &HtmlCanvasElement, options: &Object) -> Result<PcApplication, JsValue>;

    type ElementInput;

    #[wasm_bindgen(constructor, catch)]
    fn new(element: &HtmlCanvasElement, options: &Object) -> Result<ElementInput, JsValue>;

    type Keyboard;

    #[wasm_bindgen(constructor, catch)]
    fn new(target: &Window) -> Result<Keyboard, JsValue>;

    type Mouse;

    #[wasm_bindgen(constructor, catch)]
    fn new(element: &HtmlCanvasElement) -> Result<Mouse, JsValue>;

    type GamePads;

    #[wasm_bindgen(constructor, catch)]
    fn new() -> Result<GamePads, JsValue>;

    type TouchDevice;

    #[wasm_bindgen(constructor, catch)]
    fn new(element: &HtmlCanvasElement) -> Result<TouchDevice, JsValue>;

    type WasmModule;

    #[wasm_bindgen(static_method_of = WasmModule, js_name = setConfig)]
    fn set_config(name: &str, config: &JsValue);

    #[wasm_bindgen(static_method_of = WasmModule, js_name = getInstance)]
    fn get_instance(name: &str, callback: &Function);

    #[wasm_bindgen(js_name = basisInitialize)]
    fn basis_initialize(config: &JsValue);
}

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(method, js_name = setCanvasFillMode)]
    fn set_canvas_fill_mode(this: &PcApplication, mode: &str);

    #[wasm_bindgen(method, js_name = setCanvasResolution)]
    fn set_canvas_resolution(this: &PcApplication, mode: &str);

    #[wasm_bindgen(method, js_name = resizeCanvas)]
    fn resize_canvas(this: &PcApplication, width: u32, height: u32);

    #[wasm_bindgen(method, getter = _fillMode)]
    fn fill_mode(this: &PcApplication) -> JsValue;

    #[wasm_bindgen(method, getter = _width)]
    fn width(this: &PcApplication) -> JsValue;

    #[wasm_bindgen(method, getter = _height)]
    fn height(this: &PcApplication) -> JsValue;

    #[wasm_bindgen(method, getter = graphicsDevice)]
    fn graphics_device(this: &PcApplication) -> GraphicsDevice;

    #[wasm_bindgen(method)]
    fn configure(this: &PcApplication, url: &str, callback: &Function);

    #[wasm_bindgen(method)]
    fn destroy(this: &PcApplication);

    type GraphicsDevice;

    #[wasm_bindgen(method, setter = maxPixelRatio)]
    fn set_max_pixel_ratio(this: &GraphicsDevice, ratio: f64);
}

/// Message of a thrown JS value: a string, an `Error`'s `toString()`, or its debug form.
pub(crate) fn js_error_message(err: &JsValue) -> String {
    if let Some(message) = err.as_string() {
        return message;
    }
    match err.dyn_ref::<js_sys::Error>() {
        Some(error) => String::from(error.to_string()),
        None => format!("{err:?}"),
    }
}

fn js_error_name(err: &JsValue) -> String {
    err.dyn_ref::<js_sys::Error>().map(|error| String::from(error.name())).unwrap_or_default()
}

fn set(target: &JsValue, key: &str, value: &JsValue) -> Result<(), BootError> {
    Reflect::set(target, &JsValue::from_str(key), value)
        .map(|_| ())
        .map_err(|e| dom_error(key, &e))
}

fn get(target: &JsValue, key: &str) -> JsValue {
    Reflect::get(target, &JsValue::from_str(key)).unwrap_or(JsValue::UNDEFINED)
}

/// Serialize through JSON into a plain JS object.
fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, BootError> {
    let json = serde_json::to_string(value).map_err(|e| BootError::Settings(e.to_string()))?;
    js_sys::JSON::parse(&json).map_err(|e| dom_error("JSON.parse", &e))
}

fn device_or_undefined(devices: &DeviceSet<JsValue>, kind: DeviceKind) -> JsValue {
    devices.get(kind).cloned().unwrap_or(JsValue::UNDEFINED)
}

/// The `pc` namespace.
pub struct PlayCanvas {
    window: Window,
    pc: JsValue,
}

impl PlayCanvas {
    /// Bind to the loaded engine.
    ///
    /// # Errors
    ///
    /// Returns [`BootError::Initialization`] if no `pc` global is present.
    pub fn new(window: Window) -> Result<Self, BootError> {
        let pc = get(&js_sys::global(), "pc");
        if !pc.is_object() {
            return Err(BootError::Initialization("engine global `pc` is not loaded".to_owned()));
        }
        Ok(Self { window, pc })
    }

    fn app_options(devices: &DeviceSet<JsValue>, options: &AppOptions<'_>) -> Result<Object, BootError> {
        let object = Object::new();
        for (key, kind) in [
            ("elementInput", DeviceKind::ElementInput),
            ("keyboard", DeviceKind::Keyboard),
            ("mouse", DeviceKind::Mouse),
            ("gamepads", DeviceKind::Gamepads),
            ("touch", DeviceKind::Touch),
        ] {
            set(&object, key, &device_or_undefined(devices, kind))?;
        }
        set(&object, "graphicsDeviceOptions", &to_js(options.graphics)?)?;
        set(&object, "assetPrefix", &JsValue::from_str(options.asset_prefix))?;
        set(&object, "scriptPrefix", &JsValue::from_str(options.script_prefix))?;
        set(&object, "scriptsOrder", &to_js(options.scripts_order)?)?;
        Ok(object)
    }
}

impl Engine for PlayCanvas {
    type Canvas = BrowserCanvas;
    type Device = JsValue;
    type App = PlayCanvasApp;

    fn touch_supported(&self) -> bool {
        get(&get(&self.pc, "platform"), "touch").as_bool().unwrap_or(false)
    }

    fn create_device(&self, kind: DeviceKind, canvas: &BrowserCanvas, input: &InputSettings) -> Result<JsValue, BootError> {
        let element = canvas.element();
        let created: Result<JsValue, JsValue> = match kind {
            DeviceKind::ElementInput => {
                let options = Object::new();
                set(&options, "useMouse", &JsValue::from_bool(input.use_mouse))?;
                set(&options, "useTouch", &JsValue::from_bool(input.use_touch))?;
                ElementInput::new(element, &options).map(Into::into)
            }
            DeviceKind::Keyboard => Keyboard::new(&self.window).map(Into::into),
            DeviceKind::Mouse => Mouse::new(element).map(Into::into),
            DeviceKind::Gamepads => GamePads::new().map(Into::into),
            DeviceKind::Touch => TouchDevice::new(element).map(Into::into),
        };
        created.map_err(|e| BootError::Initialization(format!("{kind:?} device: {}", js_error_message(&e))))
    }

    fn create_application(
        &self,
        canvas: &BrowserCanvas,
        devices: &DeviceSet<JsValue>,
        options: &AppOptions<'_>,
    ) -> Result<PlayCanvasApp, BootError> {
        let options = Self::app_options(devices, options)?;
        let inner = PcApplication::new(canvas.element(), &options)
            .map_err(|e| BootError::from_construction_failure(&js_error_name(&e), &js_error_message(&e)))?;
        Ok(PlayCanvasApp { inner })
    }

    fn expose_application(&self, app: &PlayCanvasApp) -> Result<(), BootError> {
        let window: &JsValue = self.window.as_ref();
        let app: &JsValue = app.inner.as_ref();
        set(window, "app", app)
    }

    fn set_legacy_scripts(&self, legacy: bool) {
        let script = get(&self.pc, "script");
        if !script.is_object() {
            log::warn!("engine has no script namespace; legacy={legacy} ignored");
            return;
        }
        if let Err(e) = set(&script, "legacy", &JsValue::from_bool(legacy)) {
            log::warn!("{e}");
        }
    }

    fn register_module(&self, name: &str, urls: &ModuleUrls) {
        match to_js(urls) {
            Ok(config) => WasmModule::set_config(name, &config),
            Err(e) => log::error!("cannot register module {name}: {e}"),
        }
    }

    fn basis_initialize(&self, config: Option<&BasisDecoder>) {
        let config = match config.map(to_js).transpose() {
            Ok(config) => config.unwrap_or(JsValue::UNDEFINED),
            Err(e) => {
                log::error!("basis config: {e}");
                return;
            }
        };
        basis_initialize(&config);
    }

    fn draco_initialize(&self, config: Option<&DracoDecoder>) -> bool {
        let Ok(initialize) = get(&self.pc, "dracoInitialize").dyn_into::<Function>() else {
            return false;
        };
        let config = match config.map(to_js).transpose() {
            Ok(config) => config.unwrap_or(JsValue::UNDEFINED),
            Err(e) => {
                log::error!("draco config: {e}");
                return true;
            }
        };
        if let Err(e) = initialize.call1(&self.pc, &config) {
            log::error!("dracoInitialize threw: {}", js_error_message(&e));
        }
        true
    }

    fn module_instance(&self, name: &str) -> LocalBoxFuture<'static, ()> {
        let (tx, rx) = oneshot::channel::<()>();
        let module = name.to_owned();
        let callback = Closure::once_into_js(move || {
            if tx.send(()).is_err() {
                log::debug!("nobody waiting on module {module}");
            }
        });
        WasmModule::get_instance(name, callback.unchecked_ref());
        rx.map(|_| ()).boxed_local()
    }
}

/// A constructed `pc.Application`.
pub struct PlayCanvasApp {
    inner: PcApplication,
}

impl Application for PlayCanvasApp {
    fn set_canvas_fill_mode(&self, mode: FillMode) {
        self.inner.set_canvas_fill_mode(mode.as_str());
    }

    fn set_canvas_resolution(&self, mode: ResolutionMode) {
        self.inner.set_canvas_resolution(mode.as_str());
    }

    fn fill_mode(&self) -> FillMode {
        FillMode::parse(&self.inner.fill_mode().as_string().unwrap_or_default())
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn resolution(&self) -> (u32, u32) {
        let dimension = |value: JsValue| value.as_f64().unwrap_or(0.0).max(0.0) as u32;
        (dimension(self.inner.width()), dimension(self.inner.height()))
    }

    fn resize_canvas(&self, width: u32, height: u32) {
        self.inner.resize_canvas(width, height);
    }

    fn set_max_pixel_ratio(&self, ratio: f64) {
        self.inner.graphics_device().set_max_pixel_ratio(ratio);
    }

    fn configure(&self, url: &str) -> LocalBoxFuture<'static, Result<(), String>> {
        let (tx, rx) = oneshot::channel::<Result<(), String>>();
        let callback = Closure::once_into_js(move |err: JsValue| {
            let result = if err.is_null() || err.is_undefined() { Ok(()) } else { Err(js_error_message(&err)) };
            if tx.send(result).is_err() {
                log::debug!("config result dropped");
            }
        });
        self.inner.configure(url, callback.unchecked_ref());
        async move { rx.await.unwrap_or_else(|_| Err("config callback never ran".to_owned())) }.boxed_local()
    }

    fn destroy(&self) {
        self.inner.destroy();
    }
}
