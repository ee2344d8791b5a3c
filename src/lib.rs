//! Palette - multimodal chat server and client
//!
//! A thin server proxies an LLM chat-completions API (text + image input)
//! and an image generation API. The client side keeps the conversation,
//! routes each input to one of the two endpoints and renders the result.

pub mod config;
pub mod conversation;
pub mod providers;
pub mod routes;
pub mod session;

#[cfg(test)]
mod testing;
