//! Decoder module preloading.
//!
//! Each descriptor is registered with the engine's module registry, then
//! optionally initialized. Completion is the join of one future per module, so
//! it fires once after every module reports, in whatever order they finish.

#[cfg(test)]
#[path = "modules_test.rs"]
mod modules_test;

use std::rc::Rc;

use futures::future::{self, FutureExt, LocalBoxFuture};

use crate::host::{Engine, Scheduler};
use crate::settings::ModuleDescriptor;

/// Registry name of the Basis texture transcoder.
pub const BASIS_MODULE: &str = "BASIS";

/// Registry name of the Draco geometry decoder.
pub const DRACO_MODULE: &str = "DracoDecoderModule";

/// How a module is brought up once registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Startup {
    Skip,
    Basis,
    Draco,
    Registry,
}

impl Startup {
    fn of(module: &ModuleDescriptor) -> Self {
        if !module.should_preload() {
            return Self::Skip;
        }
        match module.module_name.as_str() {
            BASIS_MODULE => Self::Basis,
            DRACO_MODULE => Self::Draco,
            _ => Self::Registry,
        }
    }
}

/// Register and preload `modules`, resolving once all of them have completed.
///
/// An empty list still resolves on the next scheduling tick, never synchronously.
/// Returns the number of modules processed.
pub async fn preload_modules<E, S>(engine: &E, scheduler: &S, modules: &[ModuleDescriptor], url_prefix: &str) -> usize
where
    E: Engine + ?Sized,
    S: Scheduler + ?Sized,
{
    if modules.is_empty() {
        scheduler.next_tick().await;
        return 0;
    }

    let pending: Vec<LocalBoxFuture<'static, ()>> = modules
        .iter()
        .map(|module| {
            engine.register_module(&module.module_name, &module.urls(url_prefix));
            match Startup::of(module) {
                Startup::Skip => future::ready(()).boxed_local(),
                Startup::Basis => {
                    engine.basis_initialize(None);
                    future::ready(()).boxed_local()
                }
                Startup::Draco if engine.draco_initialize(None) => future::ready(()).boxed_local(),
                Startup::Draco | Startup::Registry => engine.module_instance(&module.module_name),
            }
        })
        .collect();

    future::join_all(pending).await;
    log::info!("preloaded {} module(s)", modules.len());
    modules.len()
}

/// Callback form of [`preload_modules`]: runs in the background and calls
/// `on_complete` exactly once when every module has completed.
pub fn preload_modules_then<E, S>(
    engine: Rc<E>,
    scheduler: Rc<S>,
    modules: Vec<ModuleDescriptor>,
    url_prefix: String,
    on_complete: impl FnOnce() + 'static,
) where
    E: Engine + ?Sized + 'static,
    S: Scheduler + ?Sized + 'static,
{
    let runner = Rc::clone(&scheduler);
    let task = async move {
        preload_modules(&*engine, &*runner, &modules, &url_prefix).await;
        on_complete();
    };
    scheduler.spawn(task.boxed_local());
}
