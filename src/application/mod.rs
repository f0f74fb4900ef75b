//! Application layer - Generic services that use ports.

pub mod catalog;
pub mod diagram;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;
