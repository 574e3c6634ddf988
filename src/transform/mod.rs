//! Transform adapters from raw feed records into CLI-facing entity models.

pub(crate) mod medicine;
