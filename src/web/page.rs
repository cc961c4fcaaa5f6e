//! `web-sys` implementation of the page, viewport, scheduler and canvas seams.

use std::rc::Rc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::LocalBoxFuture;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Document, Event, HtmlCanvasElement, HtmlElement, Window};

use crate::error::BootError;
use crate::host::{CanvasSurface, FillMode, IosVersion, Page, Scheduler, Viewport, ViewportSize};

/// Events that trigger a reconciliation pass.
const VIEWPORT_EVENTS: [&str; 2] = ["resize", "orientationchange"];

pub(crate) fn dom_error(context: &str, err: &JsValue) -> BootError {
    BootError::Dom(format!("{context}: {err:?}"))
}

fn warn_on_err<T>(context: &str, result: Result<T, JsValue>) {
    if let Err(e) = result {
        log::warn!("{context}: {e:?}");
    }
}

/// The canvas element created by [`BrowserPage::create_canvas`].
#[derive(Debug, Clone)]
pub struct BrowserCanvas {
    element: HtmlCanvasElement,
}

impl BrowserCanvas {
    #[must_use]
    pub fn element(&self) -> &HtmlCanvasElement {
        &self.element
    }
}

impl CanvasSurface for BrowserCanvas {
    fn pixel_size(&self) -> (u32, u32) {
        (self.element.width(), self.element.height())
    }

    fn client_size(&self) -> (f64, f64) {
        (f64::from(self.element.client_width()), f64::from(self.element.client_height()))
    }

    fn clear_inline_size(&self) {
        let style = self.element.style();
        warn_on_err("clear canvas width", style.remove_property("width"));
        warn_on_err("clear canvas height", style.remove_property("height"));
    }

    fn set_margin_top(&self, px: Option<i64>) {
        let style = self.element.style();
        match px {
            Some(px) => warn_on_err("set canvas margin", style.set_property("margin-top", &format!("{px}px"))),
            None => warn_on_err("clear canvas margin", style.remove_property("margin-top")),
        }
    }
}

/// The current document and window.
pub struct BrowserPage {
    window: Window,
    document: Document,
}

impl BrowserPage {
    /// Bind to the global window and document.
    ///
    /// # Errors
    ///
    /// Returns [`BootError::Dom`] outside a browser main thread.
    pub fn new() -> Result<Self, BootError> {
        let window = web_sys::window().ok_or_else(|| BootError::Dom("no global window".to_owned()))?;
        let document = window.document().ok_or_else(|| BootError::Dom("window has no document".to_owned()))?;
        Ok(Self { window, document })
    }

    #[must_use]
    pub fn window(&self) -> &Window {
        &self.window
    }

    fn body(&self) -> Result<HtmlElement, BootError> {
        self.document.body().ok_or_else(|| BootError::Dom("document has no body".to_owned()))
    }

    fn append_head_css(&self, css: &str) -> Result<(), BootError> {
        let head = self.document.head().ok_or_else(|| BootError::Dom("document has no head".to_owned()))?;
        let existing = head.query_selector("style").map_err(|e| dom_error("query head style", &e))?;
        if let Some(style) = existing {
            let mut text = style.text_content().unwrap_or_default();
            text.push_str(css);
            style.set_text_content(Some(&text));
            return Ok(());
        }
        let style = self.document.create_element("style").map_err(|e| dom_error("create style", &e))?;
        style.set_text_content(Some(css));
        head.append_child(&style).map_err(|e| dom_error("append style", &e))?;
        Ok(())
    }
}

impl Scheduler for BrowserPage {
    fn sleep(&self, delay: Duration) -> LocalBoxFuture<'static, ()> {
        gloo_timers::future::sleep(delay).boxed_local()
    }

    fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
        wasm_bindgen_futures::spawn_local(task);
    }
}

impl Viewport for BrowserPage {
    fn inner_size(&self) -> ViewportSize {
        let width = self.window.inner_width().map_or(0.0, |v| v.as_f64().unwrap_or(0.0));
        let height = self.window.inner_height().map_or(0.0, |v| v.as_f64().unwrap_or(0.0));
        ViewportSize::new(width, height)
    }

    fn scroll_to_origin(&self) {
        self.window.scroll_to_with_x_and_y(0.0, 0.0);
    }
}

impl Page for BrowserPage {
    type Container = HtmlElement;
    type Canvas = BrowserCanvas;

    fn create_canvas(&self, id: &str, container: Option<&HtmlElement>) -> Result<BrowserCanvas, BootError> {
        let element: HtmlCanvasElement = self
            .document
            .create_element("canvas")
            .map_err(|e| dom_error("create canvas", &e))?
            .dyn_into()
            .map_err(|_| BootError::Dom("created element is not a canvas".to_owned()))?;
        element.set_id(id);
        element.set_attribute("tabindex", "0").map_err(|e| dom_error("set tabindex", &e))?;

        // No I-bar cursor on click+drag, no long-press selection on iOS.
        let style = element.style();
        style
            .set_property("-webkit-user-select", "none")
            .map_err(|e| dom_error("set user-select", &e))?;
        style.set_property("user-select", "none").map_err(|e| dom_error("set user-select", &e))?;
        let suppress = Closure::<dyn FnMut(Event)>::new(|event: Event| event.prevent_default());
        element
            .add_event_listener_with_callback("selectstart", suppress.as_ref().unchecked_ref())
            .map_err(|e| dom_error("listen selectstart", &e))?;
        suppress.forget();

        let parent = match container {
            Some(container) => container.clone(),
            None => self.body()?,
        };
        parent.append_child(&element).map_err(|e| dom_error("attach canvas", &e))?;
        log::debug!("created canvas #{id}");
        Ok(BrowserCanvas { element })
    }

    fn remove_canvas(&self, canvas: &BrowserCanvas) {
        canvas.element.remove();
    }

    fn show_error_panel(&self, html: &str) {
        match self.body() {
            Ok(body) => body.set_inner_html(html),
            Err(e) => log::error!("cannot show error panel: {e}"),
        }
    }

    fn apply_fill_css(&self, canvas: &BrowserCanvas, fill_mode: FillMode, css: &str) -> Result<(), BootError> {
        canvas
            .element
            .class_list()
            .add_1(&format!("fill-mode-{fill_mode}"))
            .map_err(|e| dom_error("add fill mode class", &e))?;
        if css.is_empty() {
            return Ok(());
        }
        self.append_head_css(css)
    }

    fn on_viewport_change(&self, handler: Rc<dyn Fn()>) -> Result<(), BootError> {
        for event in VIEWPORT_EVENTS {
            let handler = Rc::clone(&handler);
            let callback = Closure::<dyn FnMut()>::new(move || handler());
            self.window
                .add_event_listener_with_callback(event, callback.as_ref().unchecked_ref())
                .map_err(|e| dom_error(event, &e))?;
            // Listeners live as long as the page.
            callback.forget();
        }
        Ok(())
    }

    fn device_pixel_ratio(&self) -> f64 {
        self.window.device_pixel_ratio()
    }

    fn ios_version(&self) -> Option<IosVersion> {
        let navigator = self.window.navigator();
        let platform = navigator.platform().unwrap_or_default();
        let app_version = navigator.app_version().unwrap_or_default();
        IosVersion::detect(&platform, &app_version)
    }
}
