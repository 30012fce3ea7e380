//! End-to-end tests against the public tree API.
//!
//! Each test file covers one scenario. Random orders come from seeded
//! generators so failures reproduce.

#![cfg(test)]

mod helpers;

mod test_blobs;
mod test_fault_injection;
mod test_file_persistence;
mod test_long_keys;
mod test_model_comparison;
mod test_prefix_scan;
mod test_root_promotion;
mod test_round_trip;
mod test_split_merge;
mod test_state_faults;
mod test_transactions;
