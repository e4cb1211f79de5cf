//! Core build logic for bundlekit.
//!
//! This crate ties the manifest tree, directive resolution, transform
//! stages and storages together into a build (see [`Engine::build`]).

pub mod cache;
pub mod engine;
pub mod pipeline;
pub mod reducer;
pub mod tags;
pub mod writer;

pub use cache::ExpiringCache;
pub use engine::{BuildOptions, BuildReport, Engine, ProgressReporter, SilentProgress};
pub use pipeline::{FinalNewline, StageFactory, StageRegistry, StripWhitespace, TransformStage};
pub use reducer::{concat_fragments, preprocess, reduce, reduce_extension};
pub use tags::{GitVcs, Tagger, Vcs, template};
pub use writer::Writer;
