//! Client-side session logic
//!
//! This module holds the conversation dispatcher and the HTTP backend it
//! uses to reach the server.

mod backend;
mod dispatcher;

pub use backend::{BackendError, HttpBackend};
pub use dispatcher::{
    classify, Backend, Directive, DispatchError, Dispatcher, ImageHistoryPolicy, Outcome,
    Renderer, FALLBACK_FAILURE,
};
