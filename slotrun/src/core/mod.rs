//! Deterministic, pure logic shared by the sandbox runtime.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod ids;
pub mod slots;
pub mod tabular;
