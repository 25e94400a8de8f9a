//! Plain request/response endpoints on the HTTP listener.

pub mod handlers;
