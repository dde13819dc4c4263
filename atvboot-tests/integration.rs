//! Integration tests for atvboot
//!
//! These run the real listener on an ephemeral port and talk to it over
//! HTTP, the way a set-top box would.

#[path = "integration/support.rs"]
mod support;

#[path = "integration/bootstrap_flow.rs"]
mod bootstrap_flow;
#[path = "integration/listener_lifecycle.rs"]
mod listener_lifecycle;
#[path = "integration/playback_flow.rs"]
mod playback_flow;
