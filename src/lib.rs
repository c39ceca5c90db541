//! A SPIR-V backend for a structured shader IR.
//!
//! The input is a [`ir::Module`]: functions over SSA values whose control
//! flow is expressed with nested `If`/`Loop`/`Switch` instructions rather
//! than a branch graph. [`generate`] validates the module, relinearizes the
//! nesting into labeled blocks with explicit merge information, and writes
//! the result as a binary word stream.
//!
//! ```no_run
//! use sir_spirv::ir::Module;
//! use sir_spirv::{generate, Options};
//!
//! let module = Module::new();
//! let words = generate(&module, &Options::default())?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod ir;
pub mod lower;
pub mod spirv;
pub mod validate;

pub use lower::{generate, Options};
pub use validate::{validate, ValidateError};

/// Panic with an internal compiler error message. Used for states that a
/// validated module cannot reach; anything user-triggerable reports through
/// [`ValidateError`] instead.
#[macro_export]
macro_rules! ice {
    ($($arg:tt)*) => {
        panic!("internal compiler error: {}", format_args!($($arg)*))
    };
}
