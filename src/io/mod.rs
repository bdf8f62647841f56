//! Byte-level building blocks for the HTTP codec and the raw-stream plumbing.

pub(crate) mod chunked;
pub(crate) mod limited;
pub(crate) mod pipe;
pub(crate) mod pushback;
pub(crate) mod util;
