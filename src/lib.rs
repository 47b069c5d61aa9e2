//! Core library for the mini-gfs chunked file store: a single master
//! coordinating placement, leases and repair across a fleet of chunk
//! servers, with a thin client driver on top.

pub mod chunkserver;
pub mod client;
pub mod config;
pub mod error;
pub mod httpclient;
pub mod httpserver;
pub mod master;
pub mod util;
pub mod wire;
