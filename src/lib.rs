//! Grade derivation and autosave engine for a course assessment grid.

pub mod aggregate;
pub mod autosave;
pub mod bands;
pub mod config;
pub mod course_ops;
pub mod grading;
pub mod grid;
pub mod model;
pub mod penalty;
pub mod session;
pub mod validate;
