//! Browser bootstrap for a PlayCanvas application, compiled to WebAssembly.
//!
//! The crate takes a page with nothing but the engine script loaded and brings
//! it to a running application: it creates the canvas, builds the input
//! devices, constructs the application, preloads decoder modules, loads the
//! engine config and then keeps the canvas sized to the viewport. All
//! orchestration is written against the traits in [`host`], so it runs and is
//! tested natively; the browser bindings live behind the `browser` feature.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`sequencer`] | Ordered startup phases and teardown |
//! | [`reconcile`] | Canvas/viewport reconciliation and the polling window |
//! | [`modules`] | Decoder module registration and preloading |
//! | [`devices`] | Input device planning and construction |
//! | [`settings`] | Startup settings schema and defaults |
//! | [`host`] | Seams to the page, the scheduler and the engine |
//! | [`error`] | Boot errors and the error panel markup |
//! | `web` | `web-sys`/`wasm-bindgen` backend and JS exports (feature `browser`) |

pub mod devices;
pub mod error;
pub mod host;
pub mod modules;
pub mod reconcile;
pub mod sequencer;
pub mod settings;
#[cfg(feature = "browser")]
pub mod web;

#[cfg(test)]
#[path = "fakes_test.rs"]
pub(crate) mod fakes;
