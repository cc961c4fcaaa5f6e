//! Browser entry points exported to JavaScript.
//!
//! | Export | Purpose |
//! |--------|---------|
//! | `start` | install the panic hook and console logger on module load |
//! | `Bootstrap` | one boot sequence over a settings object |
//! | `bootFromUrl` | fetch settings JSON, then boot |
//! | `loadModules` | preload decoder modules with a completion callback |

mod page;
mod playcanvas;

pub use page::{BrowserCanvas, BrowserPage};
pub use playcanvas::{PlayCanvas, PlayCanvasApp};

use std::rc::Rc;

use js_sys::{Function, Promise};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{JsFuture, future_to_promise};
use web_sys::HtmlElement;

use crate::error::BootError;
use crate::modules::preload_modules_then;
use crate::sequencer::Sequencer;
use crate::settings::{ModuleDescriptor, Settings};

type BrowserSequencer = Sequencer<BrowserPage, PlayCanvas>;

fn to_js_error(err: BootError) -> JsValue {
    js_sys::Error::new(&err.to_string()).into()
}

fn json_of(value: &JsValue) -> Result<String, BootError> {
    js_sys::JSON::stringify(value)
        .map(String::from)
        .map_err(|e| BootError::Settings(format!("value is not serializable: {e:?}")))
}

fn settings_from_js(value: &JsValue) -> Result<Settings, BootError> {
    if value.is_undefined() || value.is_null() {
        return Ok(Settings::default());
    }
    Settings::from_json(&json_of(value)?)
}

async fn fetch_settings(url: &str) -> Result<Settings, BootError> {
    let response = gloo_net::http::Request::get(url)
        .send()
        .await
        .map_err(|e| BootError::Settings(format!("fetch {url}: {e}")))?;
    if !(200..300).contains(&response.status()) {
        return Err(BootError::Settings(format!("fetch {url}: status {}", response.status())));
    }
    let body = response.text().await.map_err(|e| BootError::Settings(format!("read {url}: {e}")))?;
    Settings::from_json(&body)
}

#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    if let Err(e) = console_log::init_with_level(log::Level::Info) {
        web_sys::console::warn_1(&JsValue::from_str(&format!("logger not installed: {e}")));
    }
}

/// One boot sequence, from canvas creation to a live application.
#[wasm_bindgen]
pub struct Bootstrap {
    sequencer: Rc<BrowserSequencer>,
    container: Option<HtmlElement>,
}

impl Bootstrap {
    fn with_settings(settings: Settings, container: Option<HtmlElement>) -> Result<Self, BootError> {
        let page = BrowserPage::new()?;
        let engine = PlayCanvas::new(page.window().clone())?;
        let sequencer = Sequencer::new(Rc::new(page), Rc::new(engine), settings);
        Ok(Self { sequencer: Rc::new(sequencer), container })
    }
}

#[wasm_bindgen]
impl Bootstrap {
    /// `settings` is a plain object in the settings schema; `undefined` uses defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(settings: JsValue, container: Option<HtmlElement>) -> Result<Bootstrap, JsValue> {
        let settings = settings_from_js(&settings).map_err(to_js_error)?;
        Self::with_settings(settings, container).map_err(to_js_error)
    }

    /// Run the sequence. Resolves once live; rejects on a fatal failure.
    pub fn run(&self) -> Promise {
        let sequencer = Rc::clone(&self.sequencer);
        let container = self.container.clone();
        future_to_promise(async move {
            sequencer.run(container.as_ref()).await.map_err(to_js_error)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    #[must_use]
    pub fn phase(&self) -> String {
        self.sequencer.phase().to_string()
    }

    /// Message of a non-fatal config load failure.
    #[wasm_bindgen(js_name = configError)]
    #[must_use]
    pub fn config_error(&self) -> Option<String> {
        self.sequencer.config_error().map(|e| e.to_string())
    }

    pub fn destroy(&self) {
        self.sequencer.destroy();
    }
}

/// Fetch settings JSON from `url` and run a boot sequence with it.
///
/// # Errors
///
/// Rejects if the settings cannot be fetched or parsed, or the boot fails.
#[wasm_bindgen(js_name = bootFromUrl)]
pub async fn boot_from_url(url: String, container: Option<HtmlElement>) -> Result<Bootstrap, JsValue> {
    let settings = fetch_settings(&url).await.map_err(to_js_error)?;
    let bootstrap = Bootstrap::with_settings(settings, container).map_err(to_js_error)?;
    JsFuture::from(bootstrap.run()).await?;
    Ok(bootstrap)
}

/// Register and preload `modules`, then call `done` once.
///
/// # Errors
///
/// Throws if `modules` is not an array of module descriptors or the engine is missing.
#[wasm_bindgen(js_name = loadModules)]
pub fn load_modules(modules: JsValue, url_prefix: String, done: Function) -> Result<(), JsValue> {
    let modules: Vec<ModuleDescriptor> = serde_json::from_str(&json_of(&modules).map_err(to_js_error)?)
        .map_err(|e| to_js_error(BootError::Settings(e.to_string())))?;
    let page = BrowserPage::new().map_err(to_js_error)?;
    let engine = PlayCanvas::new(page.window().clone()).map_err(to_js_error)?;
    preload_modules_then(Rc::new(engine), Rc::new(page), modules, url_prefix, move || {
        if let Err(e) = done.call0(&JsValue::NULL) {
            log::error!("loadModules callback threw: {e:?}");
        }
    });
    Ok(())
}
