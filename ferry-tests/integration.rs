//! Integration tests for Ferry
//!
//! These tests drive the relay through its public API against in-memory and
//! HTTP origin backends, without binding the relay itself to a socket.

#[path = "integration/range_properties.rs"]
mod range_properties;

#[path = "integration/relay_faults.rs"]
mod relay_faults;

#[path = "integration/origin_relay.rs"]
mod origin_relay;
