//! Internal utility helpers for locally persisted settings.

pub(crate) mod settings;
