//! Ready-to-go hooks for message handlers.
pub mod pre_start;
pub mod transient_error;
