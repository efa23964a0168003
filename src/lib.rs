// PromptChain — Replay stored prompt workflows into a chat surface
// License: Apache-2.0

pub mod bus;
pub mod config;
pub mod engine;
pub mod logger;
pub mod surface;
pub mod workflow;
