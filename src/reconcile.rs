//! Canvas/viewport resize reconciliation.
//!
//! Some mobile browsers (notably iOS Safari) report `innerWidth`/`innerHeight`
//! changes only after the `resize` event has fired, while the browser chrome
//! settles. A single pass on the event is therefore not enough: after the first
//! pass, a reconciliation window polls the viewport at a fixed interval and
//! re-runs the pass whenever it drifts from the last snapshot. The window closes
//! on a fixed deadline, so transitions slower than the window go uncorrected.

#[cfg(test)]
#[path = "reconcile_test.rs"]
mod reconcile_test;

use std::cell::RefCell;
use std::rc::Rc;
use futures::FutureExt;
use futures::future;

use crate::host::{Application, CanvasSurface, FillMode, IosVersion, Scheduler, Viewport, ViewportSize};
use crate::settings::ReconcilePolicy;

/// Top margin that vertically centers a letterboxed canvas, or `None` to clear it.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn top_margin(fill_mode: FillMode, client: (f64, f64), viewport: ViewportSize) -> Option<i64> {
    if !fill_mode.letterboxes() {
        return None;
    }
    let (client_width, client_height) = client;
    let shorter_than_viewport = fill_mode == FillMode::None && client_height < viewport.height;
    let wider_than_viewport = match (ViewportSize::new(client_width, client_height).aspect(), viewport.aspect()) {
        (Some(canvas), Some(window)) => canvas >= window,
        _ => false,
    };
    if shorter_than_viewport || wider_than_viewport {
        Some(((viewport.height - client_height) / 2.0).floor() as i64)
    } else {
        None
    }
}

/// Media query CSS that keeps a `FILL_WINDOW` canvas at its configured aspect ratio.
///
/// Returns `None` when the configured resolution is degenerate.
#[must_use]
pub fn fill_mode_css(canvas_id: &str, width: u32, height: u32) -> Option<String> {
    if width == 0 || height == 0 {
        return None;
    }
    Some(format!(
        "@media screen and (min-aspect-ratio: {width}/{height}) {{\n\
         \x20   #{canvas_id}.fill-mode-{fill} {{\n\
         \x20       width: auto;\n\
         \x20       height: 100%;\n\
         \x20       margin: 0 auto;\n\
         \x20   }}\n\
         }}\n",
        fill = FillMode::FillWindow.as_str(),
    ))
}

/// Keeps one canvas in sync with the viewport.
pub struct Reconciler<P, C, A> {
    page: Rc<P>,
    canvas: Rc<C>,
    app: Rc<A>,
    policy: ReconcilePolicy,
    last_viewport: ViewportSize,
    /// Margin last written to the canvas; `None` before the first pass.
    applied_margin: Option<Option<i64>>,
    scroll_reset: bool,
    polling: bool,
    detached: bool,
    passes: u64,
}

impl<P, C, A> Reconciler<P, C, A>
where
    P: Viewport + Scheduler + 'static,
    C: CanvasSurface + 'static,
    A: Application + 'static,
{
    #[must_use]
    pub fn new(page: Rc<P>, canvas: Rc<C>, app: Rc<A>, policy: ReconcilePolicy, ios: Option<IosVersion>) -> Self {
        let last_viewport = page.inner_size();
        Self {
            page,
            canvas,
            app,
            policy,
            last_viewport,
            applied_margin: None,
            scroll_reset: ios.is_some_and(IosVersion::needs_scroll_reset),
            polling: false,
            detached: false,
            passes: 0,
        }
    }

    /// One reconciliation pass.
    pub fn reconcile(&mut self) {
        if self.detached {
            return;
        }
        self.canvas.clear_inline_size();
        let (width, height) = self.canvas.pixel_size();
        self.app.resize_canvas(width, height);

        let viewport = self.page.inner_size();
        let margin = top_margin(self.app.fill_mode(), self.canvas.client_size(), viewport);
        if self.applied_margin != Some(margin) {
            self.canvas.set_margin_top(margin);
            self.applied_margin = Some(margin);
        }
        self.last_viewport = viewport;

        if self.scroll_reset {
            self.page.scroll_to_origin();
        }
        self.passes += 1;
    }

    /// Whether the viewport differs from the snapshot taken by the last pass.
    #[must_use]
    pub fn drifted(&self) -> bool {
        self.page.inner_size() != self.last_viewport
    }

    /// Reconcile now, then poll for drift until the policy window closes.
    ///
    /// The window closes on its own timer, so late-firing polls cannot stretch it.
    ///
    /// While a window is open, further calls only run the immediate pass.
    pub fn schedule_window(this: &Rc<RefCell<Self>>) {
        let (page, policy) = {
            let mut inner = this.borrow_mut();
            inner.reconcile();
            if inner.polling || inner.detached || !inner.policy.polls() {
                return;
            }
            inner.polling = true;
            (Rc::clone(&inner.page), inner.policy)
        };

        let handle = Rc::clone(this);
        let timer = Rc::clone(&page);
        let interval = policy.interval();
        let poll = async move {
            loop {
                timer.sleep(interval).await;
                let Ok(mut inner) = handle.try_borrow_mut() else {
                    continue;
                };
                if inner.detached {
                    break;
                }
                if inner.drifted() {
                    log::debug!("viewport drifted to {:?}, reconciling", inner.page.inner_size());
                    inner.reconcile();
                }
            }
        };

        // The window closes on this timer alone.
        let deadline = page.sleep(policy.window());
        let owner = Rc::clone(this);
        let task = async move {
            future::select(poll.boxed_local(), deadline).await;
            owner.borrow_mut().polling = false;
        };
        page.spawn(task.boxed_local());
    }

    /// Stop reacting to events; later passes are no-ops.
    pub fn detach(&mut self) {
        self.detached = true;
    }

    #[must_use]
    pub fn last_viewport(&self) -> ViewportSize {
        self.last_viewport
    }

    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.polling
    }

    /// Number of passes run so far.
    #[must_use]
    pub fn passes(&self) -> u64 {
        self.passes
    }
}
