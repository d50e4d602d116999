//! Integration tests for the relay
//!
//! Most tests drive the full router through `axum_test::TestServer`
//! against wiremock provider servers; disconnect tests use a real socket.

mod health;
mod hooks;
mod metrics;
mod routing;
