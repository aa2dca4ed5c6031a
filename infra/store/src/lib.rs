//! # Store
//!
//! Intent dispatch for composed Weave applications.
//!
//! ## Overview
//!
//! A [`Store`] owns the application [`StateTree`], partitioned into slices that
//! each belong to one [`SliceReducer`]. Dispatched intents are reduced one at a
//! time, in arrival order, and then handed to the matching
//! [`EffectRule`](effect::EffectRule)s, which run concurrently on their own
//! Tokio tasks and may emit follow-up intents.
//!
//! ## Guarantees
//!
//! * **Serial reduction**: the reducer sees intents strictly one after another.
//! * **Reducer first**: a rule observes the state produced by its trigger.
//! * **Isolation**: a failing or panicking rule is reported on the failure
//!   channel and never affects the reducer or other rules. A panicking slice
//!   reducer keeps its previous value and is reported the same way.
//! * **Bounded chains**: emitted intents beyond `max_chain_depth`, or repeating
//!   a type already in their causal chain when cycle detection is on, are dropped
//!   and reported.

pub mod effect;
mod error;
mod receiver;
mod state;
mod store;

pub use effect::{EffectContext, EffectError, EffectErrorExt, EffectRule, EffectSet, rule};
pub use error::{StoreError, StoreErrorExt};
pub use receiver::ObserverExt;
pub use state::{CombinedReducer, SlicePath, SliceReducer, SliceSelector, StateTree};
pub use store::{EffectFailure, Store, StoreBuilder};
