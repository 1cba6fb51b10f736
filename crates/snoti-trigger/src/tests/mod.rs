//! Scenario tests for the trigger.
//!
//! - `harness.rs`    - fake connection and recording handlers
//! - `dispatch.rs`   - fan-out, ack-after-handlers, failure isolation, ordering
//! - `lifecycle.rs`  - start/stop of the trigger
//! - `end_to_end.rs` - trigger over a real client and the in-memory broker
