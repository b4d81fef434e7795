//! Async external command runner
//!
//! Executes git invocations off the caller's context:
//! - `CommandRunner` - Serialized execution with locked-index retries
//! - `MainLoop` / `MainContext` - Single-consumer delivery of results
//! - `Spawn` / `SystemSpawner` - One spawn attempt with merged output
//! - `FallbackEncoding` - Decoding of non-UTF-8 output
//! - `CommandResolver` - Configured program paths

mod dispatch;
mod encoding;
mod executor;
mod invocation;
mod resolve;
mod spawn;

pub use dispatch::*;
pub use encoding::*;
pub use executor::*;
pub use invocation::*;
pub use resolve::*;
pub use spawn::*;
