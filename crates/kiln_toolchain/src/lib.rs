//! Compiler invocation and flag probing seams.
//!
//! The build core never spawns a compiler directly: every invocation goes
//! through the [`Compiler`] trait so that module and cache orchestration can
//! be driven by a real toolchain ([`ProcessCompiler`]) or a scripted one in
//! tests. Flag support questions go through [`FlagProbe`].

#![warn(missing_docs)]

pub mod compiler;
pub mod probe;

pub use compiler::{CompileFailure, Compiler, CompilerOutput, ProcessCompiler};
pub use probe::{FlagProbe, MemoizedProbe};
