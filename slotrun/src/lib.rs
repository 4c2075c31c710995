//! Slot sandbox runtime.
//!
//! Instruction sets are flat text files holding numbered code fragments
//! ("slots"). Callers request slots by identifier expression; the runtime
//! extracts each fragment, executes it through a pluggable strategy, and
//! archives tabular output into a hash-sharded content store. The
//! architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (id resolution, slot-file
//!   parsing, output classification). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (set files, shard store, config).
//!   Isolated to enable temp-dir tests.
//! - **[`exec`]**: Execution strategies behind a trait so tests and embedders
//!   can swap the backend without touching the engine.
//!
//! [`batch`] coordinates core logic, strategies, and stores to serve one
//! batch request end to end.

pub mod batch;
pub mod core;
pub mod exec;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
