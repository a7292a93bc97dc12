/*!
Small shared utilities for the treesweep crates: a totally ordered wrapper for finite floats and a thread safe progress counter.
*/

pub mod finite;
pub mod progress_counter;
