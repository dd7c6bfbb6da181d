//! Transient, process-local UI state.

pub mod selection;
