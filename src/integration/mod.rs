//! Integration tests
//!
//! Drive the full router against a local mock upstream and a scripted
//! stand-in for ffmpeg.

#[cfg(test)]
pub mod fixtures;

#[cfg(test)]
mod e2e;
