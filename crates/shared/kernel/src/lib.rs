//! Composition kernel.
//!
//! Turns independently declared [`features::Feature`]s into a running
//! application: names are registered, capability contracts resolved, aspect
//! payloads assembled into artifacts, and startup hooks run, all under a
//! single [`lifecycle::LifecycleOrchestrator`].
//!
//! ```rust
//! use weave_kernel::aspects::{EffectsAspect, StateAspect};
//! use weave_kernel::compose::{Composition, compose_application};
//! use weave_kernel::features::Feature;
//! use weave_kernel::store::SliceReducer;
//! use weave_kernel::domain::intent::Intent;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let counter = Feature::builder("counter")
//!     .slice(SliceReducer::typed("count", 0_u64, |n, intent| match intent.kind() {
//!         "tick" => n + 1,
//!         _ => n,
//!     })?)
//!     .build();
//!
//! let app = compose_application(
//!     Composition::builder()
//!         .feature(counter)
//!         .aspect(StateAspect)
//!         .aspect(EffectsAspect)
//!         .build(),
//! )
//! .await?;
//!
//! app.dispatch(Intent::bare("tick"))?;
//! let store = app.store().ok_or("no store")?;
//! store.settled().await;
//! assert_eq!(store.state().select::<u64>("count"), Some(1));
//! app.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod aspects;
pub mod compose;
pub mod config;
pub mod contracts;
pub mod error;
pub mod features;
pub mod hooks;
pub mod lifecycle;

pub use error::{ComposeError, ComposeErrorExt};
pub use weave_domain as domain;
pub use weave_store as store;
