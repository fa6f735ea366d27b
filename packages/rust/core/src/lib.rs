//! Export pipeline for the `code.json` manifest.
//!
//! This crate joins the import and append collections, enriches each matched
//! record with a repository description and assembles the manifest artifact
//! (see [`pipeline::Exporter`]).

pub mod assembler;
pub mod enrichment;
pub mod join;
pub mod pipeline;
pub mod release;
