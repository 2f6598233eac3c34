//! API route modules.

pub mod analysis;
pub mod answers;
pub mod sessions;
pub mod transcript;
