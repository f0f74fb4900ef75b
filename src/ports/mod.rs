//! Ports - Trait definitions for every external collaborator.

pub mod queue;
pub mod storage;
pub mod tams;
pub mod transcoder;
