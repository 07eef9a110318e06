//! umlpipe: a rendering proxy for PlantUML.
//!
//! The service fronts a bounded pool of long-lived JVM renderer
//! subprocesses running in pipe mode, amortizing the multi-second JVM
//! startup cost across many client requests. Around that core it carries
//! the PlantUML text-encoding codec (the "short code" used as cache key
//! and URL-safe surrogate), image-metadata extraction for PNG and SVG
//! output, and an optional peer-sharded result cache.

pub mod application;
pub mod cache;
pub mod client;
pub mod config;
pub mod domain;
pub mod infra;
