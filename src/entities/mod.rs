//! Catalog entities and the search workflow used by the CLI.

pub(crate) mod expand;
pub(crate) mod medicine;
pub(crate) mod search;
