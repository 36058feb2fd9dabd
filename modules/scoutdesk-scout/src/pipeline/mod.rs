//! The scout pipeline steps, leaf-first:
//! context → search → dedup → ideas → idea store → auto-write.

pub mod auto_write;
pub mod context;
pub mod dedup;
pub mod idea_store;
pub mod ideas;
pub mod search;
