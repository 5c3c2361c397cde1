//! `stagehand` — phase-driven session orchestration for interactive
//! applications.
//!
//! The crate is the session core of a host application: it drives
//! mutually-exclusive phases (loading, menu, active play), tracks the
//! resources each phase activation loads so they are released exactly once,
//! fans out typed events to interested listeners, and runs cancellable
//! timers for recurring behavior such as spawning and shield cooldowns.
//!
//! Rendering, input polling, physics and object instantiation stay in the
//! host; they are reached through the narrow collaborator traits in
//! [`assets`], [`session`] and [`spawn`].

pub mod assets;
pub mod config;
pub mod error;
pub mod events;
pub mod observability;
pub mod phase;
pub mod session;
pub mod shield;
pub mod spawn;
pub mod timer;

pub use error::{Result, StagehandError};
