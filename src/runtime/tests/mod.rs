//! Loop-level scenario tests driven by a stub transport.

mod support;

mod handlers;
mod lifecycle;
