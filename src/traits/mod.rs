//! Core traits for the service registry.

mod dispose;
mod resolver;

pub use dispose::Dispose;
pub use resolver::Resolver;
