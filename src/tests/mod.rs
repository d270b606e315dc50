//! Consolidated test modules.
//!
//! End-to-end tests that drive the full router in process.

mod scim_e2e;
