//! Persistent, dependency-aware task queue and swarm orchestration engine.
//!
//! Organized as ports-and-adapters: `domain` holds the pure models, errors,
//! and trait seams; `adapters::sqlite` is the only `Store` implementation;
//! `services` composes the ports into the five in-scope components
//! (`TaskQueue`, `SwarmOrchestrator`, `DependencyResolver`,
//! `PriorityCalculator`); `infrastructure` is ambient (config, logging);
//! `cli` is the thin binary-facing adapter over all of the above.

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;
