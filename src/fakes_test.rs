//! In-memory host for exercising the sequencer and reconciler without a browser.
//!
//! `Harness` owns a `LocalPool` and a manual `Clock`. Sleeps registered with the
//! clock resolve only when the harness advances time past their deadline.

#![allow(clippy::float_cmp)]

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use futures::channel::oneshot;
use futures::executor::{LocalPool, LocalSpawner};
use futures::future::{self, FutureExt, LocalBoxFuture};
use futures::task::LocalSpawnExt;

use crate::devices::{DeviceKind, DeviceSet};
use crate::error::BootError;
use crate::host::{
    AppOptions, Application, CanvasSurface, Engine, FillMode, IosVersion, Page, ResolutionMode, Scheduler, Viewport,
    ViewportSize,
};
use crate::settings::{BasisDecoder, DracoDecoder, InputSettings, ModuleUrls};

pub type Log = Rc<RefCell<Vec<String>>>;

pub fn entries(log: &Log) -> Vec<String> {
    log.borrow().clone()
}

pub fn position(log: &Log, prefix: &str) -> usize {
    log.borrow()
        .iter()
        .position(|e| e.starts_with(prefix))
        .unwrap_or_else(|| panic!("no log entry starting with {prefix:?} in {:?}", log.borrow()))
}

// =============================================================
// Clock
// =============================================================

#[derive(Default)]
struct ClockState {
    now_ms: u64,
    next_id: u64,
    lateness_ms: u64,
    timers: Vec<(u64, u64, Waker)>,
}

#[derive(Clone, Default)]
pub struct Clock(Rc<RefCell<ClockState>>);

impl Clock {
    pub fn now_ms(&self) -> u64 {
        self.0.borrow().now_ms
    }

    pub fn pending_timers(&self) -> usize {
        self.0.borrow().timers.len()
    }

    /// Make every later sleep fire `ms` after its deadline, like a busy event loop.
    pub fn set_lateness(&self, ms: u64) {
        self.0.borrow_mut().lateness_ms = ms;
    }

    fn advance_to(&self, now_ms: u64) {
        let due: Vec<Waker> = {
            let mut state = self.0.borrow_mut();
            state.now_ms = now_ms;
            let (due, rest): (Vec<_>, Vec<_>) = state.timers.drain(..).partition(|(at, _, _)| *at <= now_ms);
            state.timers = rest;
            due.into_iter().map(|(_, _, waker)| waker).collect()
        };
        for waker in due {
            waker.wake();
        }
    }

    fn sleep(&self, delay: Duration) -> Sleep {
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        let state = self.0.borrow();
        let due_ms = state.now_ms.saturating_add(delay_ms).saturating_add(state.lateness_ms);
        Sleep { clock: self.clone(), due_ms, id: None }
    }
}

struct Sleep {
    clock: Clock,
    due_ms: u64,
    id: Option<u64>,
}

impl Future for Sleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        let mut state = this.clock.0.borrow_mut();
        match this.id {
            Some(id) => {
                if state.now_ms >= this.due_ms {
                    state.timers.retain(|(_, timer, _)| *timer != id);
                    return Poll::Ready(());
                }
                if let Some(entry) = state.timers.iter_mut().find(|(_, timer, _)| *timer == id) {
                    entry.2 = cx.waker().clone();
                } else {
                    state.timers.push((this.due_ms, id, cx.waker().clone()));
                }
                Poll::Pending
            }
            None => {
                // First poll always yields, even when already due.
                let id = state.next_id;
                state.next_id += 1;
                this.id = Some(id);
                if state.now_ms >= this.due_ms {
                    cx.waker().wake_by_ref();
                } else {
                    state.timers.push((this.due_ms, id, cx.waker().clone()));
                }
                Poll::Pending
            }
        }
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        let Some(id) = self.id else {
            return;
        };
        if let Ok(mut state) = self.clock.0.try_borrow_mut() {
            state.timers.retain(|(_, timer, _)| *timer != id);
        }
    }
}

pub struct Harness {
    pub pool: LocalPool,
    pub clock: Clock,
}

impl Harness {
    pub fn new() -> Self {
        Self { pool: LocalPool::new(), clock: Clock::default() }
    }

    pub fn spawner(&self) -> LocalSpawner {
        self.pool.spawner()
    }

    pub fn spawn(&self, task: impl Future<Output = ()> + 'static) {
        self.pool.spawner().spawn_local(task).expect("spawn");
    }

    pub fn run(&mut self) {
        self.pool.run_until_stalled();
    }

    /// Advance the clock one millisecond at a time up to `target_ms`.
    pub fn advance_to(&mut self, target_ms: u64) {
        self.pool.run_until_stalled();
        let start = self.clock.now_ms();
        for now in start + 1..=target_ms {
            self.clock.advance_to(now);
            self.pool.run_until_stalled();
        }
    }
}

// =============================================================
// Page
// =============================================================

#[derive(Debug, Default)]
pub struct CanvasState {
    pub id: String,
    pub container: Option<String>,
    pub attached: Cell<bool>,
    pub pixel: Cell<(u32, u32)>,
    pub client: Cell<(f64, f64)>,
    pub inline_width: RefCell<Option<String>>,
    pub inline_height: RefCell<Option<String>>,
    pub margin_top: RefCell<Option<String>>,
    pub margin_writes: Cell<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeCanvas(pub Rc<CanvasState>);

impl FakeCanvas {
    pub fn sized(pixel: (u32, u32), client: (f64, f64)) -> Self {
        let canvas = Self::default();
        canvas.0.pixel.set(pixel);
        canvas.0.client.set(client);
        canvas.0.attached.set(true);
        canvas
    }

    pub fn margin_top(&self) -> Option<String> {
        self.0.margin_top.borrow().clone()
    }

    pub fn style_snapshot(&self) -> (Option<String>, Option<String>, Option<String>) {
        (
            self.0.inline_width.borrow().clone(),
            self.0.inline_height.borrow().clone(),
            self.0.margin_top.borrow().clone(),
        )
    }
}

impl CanvasSurface for FakeCanvas {
    fn pixel_size(&self) -> (u32, u32) {
        self.0.pixel.get()
    }

    fn client_size(&self) -> (f64, f64) {
        self.0.client.get()
    }

    fn clear_inline_size(&self) {
        *self.0.inline_width.borrow_mut() = None;
        *self.0.inline_height.borrow_mut() = None;
    }

    fn set_margin_top(&self, px: Option<i64>) {
        self.0.margin_writes.set(self.0.margin_writes.get() + 1);
        *self.0.margin_top.borrow_mut() = px.map(|px| format!("{px}px"));
    }
}

pub struct FakePage {
    pub clock: Clock,
    pub spawner: LocalSpawner,
    pub log: Log,
    pub viewport: Cell<ViewportSize>,
    pub scrolls: Cell<u32>,
    pub ios: Option<IosVersion>,
    pub dpr: f64,
    pub fail_canvas: bool,
    pub canvas: RefCell<Option<FakeCanvas>>,
    pub body_panel: RefCell<Option<String>>,
    pub css: RefCell<Vec<(FillMode, String)>>,
    pub listeners: RefCell<Vec<Rc<dyn Fn()>>>,
}

impl FakePage {
    pub fn new(harness: &Harness, log: &Log) -> Self {
        Self {
            clock: harness.clock.clone(),
            spawner: harness.spawner(),
            log: Rc::clone(log),
            viewport: Cell::new(ViewportSize::new(800.0, 600.0)),
            scrolls: Cell::new(0),
            ios: None,
            dpr: 2.0,
            fail_canvas: false,
            canvas: RefCell::new(None),
            body_panel: RefCell::new(None),
            css: RefCell::new(Vec::new()),
            listeners: RefCell::new(Vec::new()),
        }
    }

    pub fn set_viewport(&self, width: f64, height: f64) {
        self.viewport.set(ViewportSize::new(width, height));
    }

    pub fn fire_viewport_change(&self) {
        let listeners: Vec<Rc<dyn Fn()>> = self.listeners.borrow().clone();
        for listener in listeners {
            listener();
        }
    }

    pub fn canvas(&self) -> FakeCanvas {
        self.canvas.borrow().clone().expect("canvas created")
    }
}

impl Scheduler for FakePage {
    fn sleep(&self, delay: Duration) -> LocalBoxFuture<'static, ()> {
        self.clock.sleep(delay).boxed_local()
    }

    fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
        self.spawner.spawn_local(task).expect("spawn");
    }
}

impl Viewport for FakePage {
    fn inner_size(&self) -> ViewportSize {
        self.viewport.get()
    }

    fn scroll_to_origin(&self) {
        self.scrolls.set(self.scrolls.get() + 1);
    }
}

impl Page for FakePage {
    type Container = String;
    type Canvas = FakeCanvas;

    fn create_canvas(&self, id: &str, container: Option<&String>) -> Result<FakeCanvas, BootError> {
        if self.fail_canvas {
            return Err(BootError::Dom("document has no body".to_owned()));
        }
        let state = CanvasState {
            id: id.to_owned(),
            container: container.cloned(),
            attached: Cell::new(true),
            pixel: Cell::new((1600, 1200)),
            client: Cell::new((800.0, 600.0)),
            ..CanvasState::default()
        };
        let canvas = FakeCanvas(Rc::new(state));
        *self.canvas.borrow_mut() = Some(canvas.clone());
        self.log.borrow_mut().push(format!("canvas:create {id}"));
        Ok(canvas)
    }

    fn remove_canvas(&self, canvas: &FakeCanvas) {
        canvas.0.attached.set(false);
        self.log.borrow_mut().push("canvas:remove".to_owned());
    }

    fn show_error_panel(&self, html: &str) {
        if let Some(canvas) = self.canvas.borrow().as_ref() {
            canvas.0.attached.set(false);
        }
        *self.body_panel.borrow_mut() = Some(html.to_owned());
        self.log.borrow_mut().push("page:error-panel".to_owned());
    }

    fn apply_fill_css(&self, _canvas: &FakeCanvas, fill_mode: FillMode, css: &str) -> Result<(), BootError> {
        self.css.borrow_mut().push((fill_mode, css.to_owned()));
        self.log.borrow_mut().push(format!("page:css {fill_mode}"));
        Ok(())
    }

    fn on_viewport_change(&self, handler: Rc<dyn Fn()>) -> Result<(), BootError> {
        self.listeners.borrow_mut().push(handler);
        self.log.borrow_mut().push("page:listeners".to_owned());
        Ok(())
    }

    fn device_pixel_ratio(&self) -> f64 {
        self.dpr
    }

    fn ios_version(&self) -> Option<IosVersion> {
        self.ios
    }
}

// =============================================================
// Engine
// =============================================================

#[derive(Debug)]
pub struct AppState {
    pub log: Log,
    pub fill_mode: Cell<FillMode>,
    pub resolution_mode: Cell<Option<ResolutionMode>>,
    pub resolution: Cell<(u32, u32)>,
    pub resizes: RefCell<Vec<(u32, u32)>>,
    pub max_pixel_ratio: Cell<Option<f64>>,
    pub config_result: RefCell<Result<(), String>>,
    /// Hold config loads open until [`FakeApp::finish_config`].
    pub config_pending: Cell<bool>,
    pub config_release: RefCell<Option<oneshot::Sender<Result<(), String>>>>,
    pub configured_url: RefCell<Option<String>>,
    pub destroyed: Cell<bool>,
}

#[derive(Debug, Clone)]
pub struct FakeApp(pub Rc<AppState>);

impl FakeApp {
    pub fn new(log: &Log) -> Self {
        Self(Rc::new(AppState {
            log: Rc::clone(log),
            fill_mode: Cell::new(FillMode::FillWindow),
            resolution_mode: Cell::new(None),
            resolution: Cell::new((1280, 720)),
            resizes: RefCell::new(Vec::new()),
            max_pixel_ratio: Cell::new(None),
            config_result: RefCell::new(Ok(())),
            config_pending: Cell::new(false),
            config_release: RefCell::new(None),
            configured_url: RefCell::new(None),
            destroyed: Cell::new(false),
        }))
    }

    pub fn resize_count(&self) -> usize {
        self.0.resizes.borrow().len()
    }

    /// Complete a held config load with `result`.
    pub fn finish_config(&self, result: Result<(), String>) {
        let sender = self.0.config_release.borrow_mut().take().expect("config load pending");
        sender.send(result).expect("config waiter alive");
    }
}

impl Application for FakeApp {
    fn set_canvas_fill_mode(&self, mode: FillMode) {
        self.0.fill_mode.set(mode);
    }

    fn set_canvas_resolution(&self, mode: ResolutionMode) {
        self.0.resolution_mode.set(Some(mode));
    }

    fn fill_mode(&self) -> FillMode {
        self.0.fill_mode.get()
    }

    fn resolution(&self) -> (u32, u32) {
        self.0.resolution.get()
    }

    fn resize_canvas(&self, width: u32, height: u32) {
        self.0.resizes.borrow_mut().push((width, height));
        self.0.log.borrow_mut().push(format!("app:resize {width}x{height}"));
    }

    fn set_max_pixel_ratio(&self, ratio: f64) {
        self.0.max_pixel_ratio.set(Some(ratio));
    }

    fn configure(&self, url: &str) -> LocalBoxFuture<'static, Result<(), String>> {
        *self.0.configured_url.borrow_mut() = Some(url.to_owned());
        self.0.log.borrow_mut().push(format!("app:configure {url}"));
        if self.0.config_pending.get() {
            let (tx, rx) = oneshot::channel();
            *self.0.config_release.borrow_mut() = Some(tx);
            return rx.map(|result| result.unwrap_or_else(|_| Err("config dropped".to_owned()))).boxed_local();
        }
        future::ready(self.0.config_result.borrow().clone()).boxed_local()
    }

    fn destroy(&self) {
        self.0.destroyed.set(true);
        self.0.log.borrow_mut().push("app:destroy".to_owned());
    }
}

pub struct FakeEngine {
    pub log: Log,
    pub touch: bool,
    pub draco_direct: bool,
    pub fail_device: Option<DeviceKind>,
    pub config_pending: bool,
    pub construction_error: RefCell<Option<BootError>>,
    pub registered: RefCell<Vec<(String, ModuleUrls)>>,
    pub instances: RefCell<Vec<(String, oneshot::Sender<()>)>>,
    pub app: RefCell<Option<FakeApp>>,
    pub exposed: Cell<bool>,
    pub legacy_scripts: Cell<Option<bool>>,
    pub config_result: RefCell<Result<(), String>>,
}

impl FakeEngine {
    pub fn new(log: &Log) -> Self {
        Self {
            log: Rc::clone(log),
            touch: false,
            draco_direct: true,
            fail_device: None,
            config_pending: false,
            construction_error: RefCell::new(None),
            registered: RefCell::new(Vec::new()),
            instances: RefCell::new(Vec::new()),
            app: RefCell::new(None),
            exposed: Cell::new(false),
            legacy_scripts: Cell::new(None),
            config_result: RefCell::new(Ok(())),
        }
    }

    pub fn app(&self) -> FakeApp {
        self.app.borrow().clone().expect("app created")
    }

    pub fn pending_instances(&self) -> Vec<String> {
        self.instances.borrow().iter().map(|(name, _)| name.clone()).collect()
    }

    /// Complete the registry lookup for `name`.
    pub fn complete_instance(&self, name: &str) {
        let sender = {
            let mut instances = self.instances.borrow_mut();
            let at = instances.iter().position(|(n, _)| n == name).expect("pending instance");
            instances.remove(at).1
        };
        sender.send(()).expect("receiver alive");
    }
}

impl Engine for FakeEngine {
    type Canvas = FakeCanvas;
    type Device = DeviceKind;
    type App = FakeApp;

    fn touch_supported(&self) -> bool {
        self.touch
    }

    fn create_device(
        &self,
        kind: DeviceKind,
        _canvas: &FakeCanvas,
        _input: &InputSettings,
    ) -> Result<DeviceKind, BootError> {
        self.log.borrow_mut().push(format!("device:{kind:?}"));
        if self.fail_device == Some(kind) {
            return Err(BootError::Initialization(format!("{kind:?} rejected")));
        }
        Ok(kind)
    }

    fn create_application(
        &self,
        _canvas: &FakeCanvas,
        devices: &DeviceSet<DeviceKind>,
        options: &AppOptions<'_>,
    ) -> Result<FakeApp, BootError> {
        self.log
            .borrow_mut()
            .push(format!("app:create devices={:?} assets={:?}", devices.enabled(), options.asset_prefix));
        if let Some(err) = self.construction_error.borrow().clone() {
            return Err(err);
        }
        let app = FakeApp::new(&self.log);
        *app.0.config_result.borrow_mut() = self.config_result.borrow().clone();
        app.0.config_pending.set(self.config_pending);
        *self.app.borrow_mut() = Some(app.clone());
        Ok(app)
    }

    fn expose_application(&self, _app: &FakeApp) -> Result<(), BootError> {
        self.exposed.set(true);
        Ok(())
    }

    fn set_legacy_scripts(&self, legacy: bool) {
        self.legacy_scripts.set(Some(legacy));
    }

    fn register_module(&self, name: &str, urls: &ModuleUrls) {
        self.registered.borrow_mut().push((name.to_owned(), urls.clone()));
        self.log.borrow_mut().push(format!("module:register {name}"));
    }

    fn basis_initialize(&self, config: Option<&BasisDecoder>) {
        let source = config.map_or("registry".to_owned(), |c| c.wasm_url.clone());
        self.log.borrow_mut().push(format!("basis:init {source}"));
    }

    fn draco_initialize(&self, config: Option<&DracoDecoder>) -> bool {
        if !self.draco_direct {
            return false;
        }
        let source = config.map_or("registry".to_owned(), |c| c.wasm_url.clone());
        self.log.borrow_mut().push(format!("draco:init {source}"));
        true
    }

    fn module_instance(&self, name: &str) -> LocalBoxFuture<'static, ()> {
        let (tx, rx) = oneshot::channel();
        self.instances.borrow_mut().push((name.to_owned(), tx));
        self.log.borrow_mut().push(format!("module:instance {name}"));
        rx.map(|_| ()).boxed_local()
    }
}
