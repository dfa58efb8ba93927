//! Binary-side helpers around the library pipeline.

pub(crate) mod progress_manager;
