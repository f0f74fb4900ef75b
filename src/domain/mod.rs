//! Domain layer - Pure types and algorithms, no I/O.

pub mod entities;
pub mod form;
pub mod graph;
pub mod jobs;
pub mod timerange;
