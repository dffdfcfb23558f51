//! Age guesser - a camera demo backed by a hosted vision-language model
//!
//! Captures a photo in the browser, stages it in a transient encrypted bucket,
//! asks a multimodal completion API for an age estimate, and shows the answer.

pub mod app;
pub mod error;
pub mod image;
pub mod inference;
pub mod models;
pub mod prompts;
pub mod stage;
pub mod web;

pub use error::{Error, Result};
