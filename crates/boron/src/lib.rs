#![doc = include_str!("../../../README.md")]

pub mod analyze;
pub mod ast;
pub mod bignum;
mod cheader;
mod codegen;
pub mod config;
mod consteval;
pub mod diag;
pub mod imports;
pub mod intern;
pub mod ir;
pub mod lexer;
pub mod parser;
pub mod run;
pub mod scope;
pub mod span;
pub mod target;
pub mod token;
pub mod types;
pub mod value;

pub use crate::{
    config::{BuildConfig, OutKind},
    run::{BuildError, BuildOutput, Compilation},
    span::CodeLoc,
    target::{TargetArch, TargetEnviron, TargetInfo, TargetOs},
};
