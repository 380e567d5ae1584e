//! End-to-end tests for Ferry
//!
//! These tests run the relay server on a real socket and talk to it with an
//! HTTP client, covering the full stack down to connection handling.

mod streaming_workflow;
