//! Canopy -- hierarchical agent runtime
//!
//! Drives the end-to-end execution of LLM-backed agents: a multi-step
//! control loop that alternates model turns with streaming, out-of-order
//! tool execution; programmatic step handlers that interleave deterministic
//! code with LLM turns; recursive child-agent spawning with credit rollup;
//! and token-aware history management.
//!
//! The runtime owns none of the outside world: the LLM transport, run
//! storage, tool execution, analytics, and template lookup are injected
//! contracts (see [`contracts`]). Drive a run with
//! [`runtime::Runtime::run_agent`].

pub mod config;
pub mod contracts;
pub mod error;
pub mod history;
pub mod prelude;
pub mod runtime;
pub mod tools;
pub mod types;

pub use config::RuntimeConfig;
pub use error::{CanopyError, Result};
pub use runtime::{RunOutcome, RunParams, Runtime};
