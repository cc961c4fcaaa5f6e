//! Bootstrap sequencer: drives startup from an empty page to a live application.
//!
//! ARCHITECTURE
//! ============
//! Startup is a strictly ordered chain with async join points:
//!
//! ```text
//! Created → DevicesReady → ApplicationReady → ModulesLoading → ModulesReady
//!         → ConfigLoading → Configured → Live
//! ```
//!
//! Devices are built before the application because the engine only accepts
//! them at construction. Construction failure is the single fatal edge: the
//! page body is replaced with an error panel and the sequence stops in
//! `Failed`. A config load failure is logged and the sequence carries on.
//!
//! ERROR HANDLING
//! ==============
//! Operations return `BootError`; the panel is rendered here, at the point of
//! failure, so callers only need to log.

#[cfg(test)]
#[path = "sequencer_test.rs"]
mod sequencer_test;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::devices::{DeviceKind, DeviceSet};
use crate::error::{BootError, error_panel_html};
use crate::host::{AppOptions, Application, Engine, FillMode, Page, ResolutionMode};
use crate::modules::preload_modules;
use crate::reconcile::{Reconciler, fill_mode_css};
use crate::settings::Settings;

/// Where the bootstrap sequence currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Created,
    DevicesReady,
    ApplicationReady,
    ModulesLoading,
    ModulesReady,
    ConfigLoading,
    Configured,
    Live,
    /// Application construction failed; terminal.
    Failed,
    /// Torn down by [`Sequencer::destroy`]; terminal.
    Destroyed,
}

impl Phase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::DevicesReady => "devices-ready",
            Self::ApplicationReady => "application-ready",
            Self::ModulesLoading => "modules-loading",
            Self::ModulesReady => "modules-ready",
            Self::ConfigLoading => "config-loading",
            Self::Configured => "configured",
            Self::Live => "live",
            Self::Failed => "failed",
            Self::Destroyed => "destroyed",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Destroyed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The reconciler installed once the sequence goes live.
pub type SharedReconciler<P, E> = Rc<RefCell<Reconciler<P, <P as Page>::Canvas, <E as Engine>::App>>>;

struct Session<C, D, A> {
    canvas: Rc<C>,
    devices: DeviceSet<D>,
    app: Rc<A>,
}

pub struct Sequencer<P, E>
where
    P: Page,
    E: Engine<Canvas = P::Canvas>,
{
    page: Rc<P>,
    engine: Rc<E>,
    settings: Settings,
    phase: Cell<Phase>,
    session: RefCell<Option<Session<P::Canvas, E::Device, E::App>>>,
    reconciler: RefCell<Option<SharedReconciler<P, E>>>,
    config_error: RefCell<Option<BootError>>,
}

impl<P, E> Sequencer<P, E>
where
    P: Page + 'static,
    P::Canvas: 'static,
    E: Engine<Canvas = P::Canvas> + 'static,
    E::App: 'static,
{
    #[must_use]
    pub fn new(page: Rc<P>, engine: Rc<E>, settings: Settings) -> Self {
        Self {
            page,
            engine,
            settings,
            phase: Cell::new(Phase::Created),
            session: RefCell::new(None),
            reconciler: RefCell::new(None),
            config_error: RefCell::new(None),
        }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase.get()
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The config load failure recorded by [`Sequencer::configure`], if any.
    #[must_use]
    pub fn config_error(&self) -> Option<BootError> {
        self.config_error.borrow().clone()
    }

    /// Device kinds the application was constructed with.
    #[must_use]
    pub fn devices(&self) -> Vec<DeviceKind> {
        self.session.borrow().as_ref().map(|s| s.devices.enabled()).unwrap_or_default()
    }

    #[must_use]
    pub fn application(&self) -> Option<Rc<E::App>> {
        self.session.borrow().as_ref().map(|s| Rc::clone(&s.app))
    }

    #[must_use]
    pub fn reconciler(&self) -> Option<SharedReconciler<P, E>> {
        self.reconciler.borrow().clone()
    }

    /// Run the whole sequence: initialize, decoders, preload, configure.
    ///
    /// # Errors
    ///
    /// Returns the first fatal [`BootError`]; a config load failure is not one.
    pub async fn run(&self, container: Option<&P::Container>) -> Result<(), BootError> {
        self.initialize(container)?;
        self.initialize_decoders();
        self.preload().await?;
        self.configure().await?;
        log::info!("application live on #{}", self.settings.canvas_id);
        Ok(())
    }

    /// Create the canvas, the devices and the application.
    ///
    /// On construction failure the page body is replaced with the error panel.
    ///
    /// # Errors
    ///
    /// Returns [`BootError::Dom`] if the canvas cannot be created, or the
    /// classified construction failure.
    pub fn initialize(&self, container: Option<&P::Container>) -> Result<(), BootError> {
        if self.phase() != Phase::Created {
            return Err(BootError::Initialization(format!("cannot initialize from phase {}", self.phase())));
        }
        let settings = &self.settings;
        self.engine.set_legacy_scripts(settings.legacy_scripts);

        let canvas = match self.page.create_canvas(&settings.canvas_id, container) {
            Ok(canvas) => canvas,
            Err(e) => return Err(self.fail(e)),
        };
        let devices = match DeviceSet::build(&*self.engine, &canvas, &settings.input) {
            Ok(devices) => devices,
            Err(e) => return Err(self.fail(e)),
        };
        self.transition(Phase::DevicesReady);

        let options = AppOptions {
            graphics: &settings.context_options,
            asset_prefix: &settings.asset_prefix,
            script_prefix: &settings.script_prefix,
            scripts_order: &settings.scripts,
        };
        let app = match self.engine.create_application(&canvas, &devices, &options) {
            Ok(app) => app,
            Err(e) => return Err(self.fail(e)),
        };
        let ratio = settings.max_pixel_ratio.unwrap_or_else(|| self.page.device_pixel_ratio());
        app.set_max_pixel_ratio(ratio);
        if let Err(e) = self.engine.expose_application(&app) {
            log::warn!("could not publish application global: {e}");
        }

        *self.session.borrow_mut() = Some(Session { canvas: Rc::new(canvas), devices, app: Rc::new(app) });
        self.transition(Phase::ApplicationReady);
        Ok(())
    }

    /// Eagerly initialize the Draco and Basis decoders configured in the settings.
    pub fn initialize_decoders(&self) {
        let decoders = &self.settings.decoders;
        if let Some(draco) = &decoders.draco {
            if !self.engine.draco_initialize(Some(draco)) {
                log::warn!("engine has no direct Draco initialization; decoder loads on first use");
            }
        }
        if let Some(basis) = &decoders.basis {
            self.engine.basis_initialize(Some(basis));
        }
    }

    /// Register and preload the settings' decoder modules.
    ///
    /// # Errors
    ///
    /// Returns [`BootError::NotInitialized`] before a successful [`Sequencer::initialize`].
    pub async fn preload(&self) -> Result<usize, BootError> {
        if self.phase() != Phase::ApplicationReady {
            return Err(BootError::NotInitialized);
        }
        self.transition(Phase::ModulesLoading);
        let count = preload_modules(
            &*self.engine,
            &*self.page,
            &self.settings.preload_modules,
            &self.settings.asset_prefix,
        )
        .await;
        self.ensure_active()?;
        self.transition(Phase::ModulesReady);
        Ok(count)
    }

    /// Load the engine config, set up fill CSS, run the first reconciliation
    /// and install the viewport listeners.
    ///
    /// # Errors
    ///
    /// Returns [`BootError::NotInitialized`] unless modules have just finished
    /// preloading, or if the sequence is torn down while configuring;
    /// [`BootError::Dom`] if the CSS or listeners cannot be installed.
    pub async fn configure(&self) -> Result<SharedReconciler<P, E>, BootError> {
        if self.phase() != Phase::ModulesReady {
            return Err(BootError::NotInitialized);
        }
        let (canvas, app) = match self.session.borrow().as_ref() {
            Some(session) => (Rc::clone(&session.canvas), Rc::clone(&session.app)),
            None => return Err(BootError::NotInitialized),
        };

        app.set_canvas_fill_mode(FillMode::FillWindow);
        app.set_canvas_resolution(ResolutionMode::Auto);
        log::debug!("fill mode {}", app.fill_mode());

        self.transition(Phase::ConfigLoading);
        let url = self.settings.config_url();
        match app.configure(&url).await {
            Ok(()) => log::info!("loaded config {url}"),
            Err(message) => {
                let err = BootError::ConfigLoad(message);
                log::error!("{err} ({url})");
                *self.config_error.borrow_mut() = Some(err);
            }
        }
        self.ensure_active()?;
        self.transition(Phase::Configured);

        let fill_mode = app.fill_mode();
        let (width, height) = app.resolution();
        let css = fill_mode_css(&self.settings.canvas_id, width, height).unwrap_or_default();
        self.page.apply_fill_css(&canvas, fill_mode, &css)?;

        let reconciler = Rc::new(RefCell::new(Reconciler::new(
            Rc::clone(&self.page),
            canvas,
            app,
            self.settings.reconcile,
            self.page.ios_version(),
        )));

        // First pass on a later tick: iOS can report a squished layout on first paint.
        self.page.next_tick().await;
        self.ensure_active()?;
        Reconciler::schedule_window(&reconciler);

        let listener = Rc::clone(&reconciler);
        self.page.on_viewport_change(Rc::new(move || {
            if let Ok(mut inner) = listener.try_borrow_mut() {
                inner.reconcile();
            }
        }))?;

        *self.reconciler.borrow_mut() = Some(Rc::clone(&reconciler));
        self.transition(Phase::Live);
        Ok(reconciler)
    }

    /// Destroy the application, remove the canvas and detach the reconciler.
    pub fn destroy(&self) {
        if let Some(reconciler) = self.reconciler.borrow_mut().take() {
            reconciler.borrow_mut().detach();
        }
        if let Some(session) = self.session.borrow_mut().take() {
            session.app.destroy();
            self.page.remove_canvas(&session.canvas);
        }
        self.transition(Phase::Destroyed);
    }

    fn fail(&self, err: BootError) -> BootError {
        log::error!("bootstrap failed: {err}");
        if err.shows_panel() {
            self.page.show_error_panel(&error_panel_html(&err.panel_message()));
        }
        self.transition(Phase::Failed);
        err
    }

    /// Fails once the sequence has been torn down under an in-flight step.
    fn ensure_active(&self) -> Result<(), BootError> {
        if self.phase().is_terminal() {
            log::debug!("boot step abandoned in phase {}", self.phase());
            return Err(BootError::NotInitialized);
        }
        Ok(())
    }

    fn transition(&self, next: Phase) {
        let current = self.phase();
        if current.is_terminal() && !next.is_terminal() {
            log::debug!("ignoring boot phase {next} after {current}");
            return;
        }
        log::debug!("boot phase {current} -> {next}");
        self.phase.set(next);
    }
}
