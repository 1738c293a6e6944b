//! # class-shade
//!
//! Relocates Java classes into a private package and drops the ones no entry
//! point can reach, producing a shaded jar.
//!
//! ## Architecture
//!
//! - **patterns**: Package prefix / exact name matching with a learned cache
//! - **graph**: Class registry, relocation naming and reference edges
//! - **reachability**: Mark phase over a sealed graph
//! - **classfile**: Class file constant pool reader for reference discovery
//! - **input**: Jar and class directory loading
//! - **shade**: Scan pipeline and shade plan
//! - **assemble**: Shaded jar writer
//! - **config**: Shading configuration (JSON file plus CLI flags)
//! - **logging**: tracing subscriber setup

pub mod assemble;
pub mod classfile;
pub mod cli;
pub mod config;
pub mod graph;
pub mod input;
pub mod logging;
pub mod patterns;
pub mod reachability;
pub mod shade;
