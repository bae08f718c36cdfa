//! Scroll-triggered behaviour for the Lifesaver blood donation site: fade-in
//! reveals, count-up statistics, lazy images, and navigation highlighting.
//!
//! Everything except `dom` and `page` is platform independent and runs
//! against the host-only doubles in `testing`.

pub mod actions;
pub mod config;
pub mod counter;
pub mod error;
pub mod nav;
pub mod scheduler;
pub mod surface;
#[cfg(not(target_arch = "wasm32"))]
pub mod testing;
pub mod timer;
pub mod trigger;
pub mod viewport;

#[cfg(target_arch = "wasm32")]
pub mod dom;
#[cfg(target_arch = "wasm32")]
pub mod page;

pub use error::{RevealError, RevealResult};
pub use scheduler::Scheduler;
pub use trigger::TriggerPolicy;
pub use viewport::{ElementId, SubscriptionHandle};
