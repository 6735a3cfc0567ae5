//! Shared type definitions for pagewright workflows.
//!
//! The engine, the runner CLI and any tooling that inspects authored workflows depend on this crate for the
//! document model. Nothing here performs I/O.

pub mod workflow;

pub use workflow::{ExtractField, InputParameter, OutputField, StepDefinition, WorkflowDefinition};
