//! BDD scenarios for the volume lifecycle.

use rstest_bdd_macros::scenario;

use super::test_helpers::{LifecycleContext, lifecycle_context};

#[scenario(
    path = "tests/features/volume_lifecycle.feature",
    name = "Mount and release a persistent disk"
)]
fn scenario_round_trip(lifecycle_context: LifecycleContext) {
    drop(lifecycle_context);
}

#[scenario(
    path = "tests/features/volume_lifecycle.feature",
    name = "Reject a duplicate volume"
)]
fn scenario_duplicate_create(lifecycle_context: LifecycleContext) {
    drop(lifecycle_context);
}

#[scenario(
    path = "tests/features/volume_lifecycle.feature",
    name = "Removing a mounted volume unmounts it first"
)]
fn scenario_remove_mounted(lifecycle_context: LifecycleContext) {
    drop(lifecycle_context);
}

#[scenario(
    path = "tests/features/volume_lifecycle.feature",
    name = "Attach timeouts leave the volume unmounted"
)]
fn scenario_attach_timeout(lifecycle_context: LifecycleContext) {
    drop(lifecycle_context);
}

#[scenario(
    path = "tests/features/volume_lifecycle.feature",
    name = "Unmount failures keep the disk attached"
)]
fn scenario_unmount_failure(lifecycle_context: LifecycleContext) {
    drop(lifecycle_context);
}
