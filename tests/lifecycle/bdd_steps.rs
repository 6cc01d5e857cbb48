//! BDD step definitions for the volume lifecycle.

use std::cell::Ref;

use camino::Utf8PathBuf;
use cloudvol::{
    BlockDeviceStorage, ErrorKind, MountLayout, VolumeError, VolumeManager, VolumeOptions,
};
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;

use super::test_helpers::{LifecycleContext, LifecycleManager, Outcome};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

fn runtime() -> Result<Runtime, StepError> {
    Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))
}

fn manager(context: &LifecycleContext) -> Result<Ref<'_, LifecycleManager>, StepError> {
    Ref::filter_map(context.manager.borrow(), Option::as_ref)
        .map_err(|_| StepError::Assertion(String::from("volume manager not configured")))
}

fn failure(err: &VolumeError) -> Outcome {
    Outcome::Failure {
        kind: err.kind(),
        message: err.to_string(),
    }
}

fn parse_kind(kind: &str) -> Result<ErrorKind, StepError> {
    [
        ErrorKind::AlreadyExists,
        ErrorKind::NotFound,
        ErrorKind::AlreadyMounted,
        ErrorKind::NotMounted,
        ErrorKind::InvalidName,
        ErrorKind::Io,
        ErrorKind::Mount,
        ErrorKind::Attach,
        ErrorKind::Detach,
        ErrorKind::Timeout,
    ]
    .into_iter()
    .find(|candidate| candidate.as_str() == kind)
    .ok_or_else(|| StepError::Assertion(format!("unknown error kind: {kind}")))
}

#[given("a volume manager on \"{base}\"")]
fn volume_manager(lifecycle_context: &LifecycleContext, base: String) {
    let manager = VolumeManager::new(
        BlockDeviceStorage::new(lifecycle_context.block.clone(), lifecycle_context.fs.clone()),
        lifecycle_context.fs.clone(),
        MountLayout::new(base),
    );
    lifecycle_context.manager.replace(Some(manager));
}

#[given("a volume \"{name}\" with option \"{key}\" set to \"{value}\"")]
fn existing_volume(
    lifecycle_context: &LifecycleContext,
    name: String,
    key: String,
    value: String,
) -> Result<(), StepError> {
    let options = VolumeOptions::from([(key, value)]);
    let manager = manager(lifecycle_context)?;
    runtime()?
        .block_on(manager.create(&name, options))
        .map(drop)
        .map_err(|err| StepError::Assertion(format!("create {name}: {err}")))
}

#[given("disk attachment times out")]
fn attachment_times_out(lifecycle_context: &LifecycleContext) {
    lifecycle_context.block.timeout_attach();
}

#[given("unmounting fails with \"{message}\"")]
fn unmount_fails(lifecycle_context: &LifecycleContext, message: String) {
    lifecycle_context.fs.fail_unmount(&message);
}

#[when("I create \"{name}\"")]
fn create_volume(lifecycle_context: &LifecycleContext, name: String) -> Result<(), StepError> {
    let manager = manager(lifecycle_context)?;
    let outcome = match runtime()?.block_on(manager.create(&name, VolumeOptions::new())) {
        Ok(_) => Outcome::Success,
        Err(err) => failure(&err),
    };
    lifecycle_context.record(outcome);
    Ok(())
}

#[when("I mount \"{name}\"")]
fn mount_volume(lifecycle_context: &LifecycleContext, name: String) -> Result<(), StepError> {
    let manager = manager(lifecycle_context)?;
    let outcome = match runtime()?.block_on(manager.mount(&name)) {
        Ok(path) => Outcome::Mounted(path),
        Err(err) => failure(&err),
    };
    lifecycle_context.record(outcome);
    Ok(())
}

#[when("I unmount \"{name}\"")]
fn unmount_volume(lifecycle_context: &LifecycleContext, name: String) -> Result<(), StepError> {
    let manager = manager(lifecycle_context)?;
    let outcome = match runtime()?.block_on(manager.unmount(&name)) {
        Ok(()) => Outcome::Success,
        Err(err) => failure(&err),
    };
    lifecycle_context.record(outcome);
    Ok(())
}

#[when("I remove \"{name}\"")]
fn remove_volume(lifecycle_context: &LifecycleContext, name: String) -> Result<(), StepError> {
    let manager = manager(lifecycle_context)?;
    let outcome = match runtime()?.block_on(manager.remove(&name)) {
        Ok(()) => Outcome::Success,
        Err(err) => failure(&err),
    };
    lifecycle_context.record(outcome);
    Ok(())
}

#[then("the operation succeeds")]
fn operation_succeeds(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    match &*lifecycle_context.outcome.borrow() {
        Some(Outcome::Success | Outcome::Mounted(_)) => Ok(()),
        Some(Outcome::Failure { message, .. }) => Err(StepError::Assertion(format!(
            "expected success, got failure: {message}"
        ))),
        None => Err(StepError::Assertion(String::from("missing outcome"))),
    }
}

#[then("the mount point is \"{path}\"")]
fn mount_point_is(lifecycle_context: &LifecycleContext, path: String) -> Result<(), StepError> {
    let expected = Outcome::Mounted(Utf8PathBuf::from(path));
    let outcome = lifecycle_context.outcome.borrow();
    if outcome.as_ref() == Some(&expected) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {expected:?}, got {:?}",
            *outcome
        )))
    }
}

#[then("the error kind is \"{kind}\"")]
fn error_kind_is(lifecycle_context: &LifecycleContext, kind: String) -> Result<(), StepError> {
    let expected = parse_kind(&kind)?;
    let outcome = lifecycle_context.outcome.borrow();
    let Some(Outcome::Failure { kind: actual, .. }) = outcome.as_ref() else {
        return Err(StepError::Assertion(format!(
            "expected failure outcome, got {:?}",
            *outcome
        )));
    };
    if *actual == expected {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected failure kind {expected}, got {actual}"
        )))
    }
}

fn mount_path_of(lifecycle_context: &LifecycleContext, name: &str) -> Result<String, StepError> {
    let manager = manager(lifecycle_context)?;
    runtime()?
        .block_on(manager.get(name))
        .map(|view| view.mount_path)
        .map_err(|err| StepError::Assertion(format!("get {name}: {err}")))
}

#[then("the volume \"{name}\" is mounted")]
fn volume_is_mounted(lifecycle_context: &LifecycleContext, name: String) -> Result<(), StepError> {
    if mount_path_of(lifecycle_context, &name)?.is_empty() {
        Err(StepError::Assertion(format!("{name} should be mounted")))
    } else {
        Ok(())
    }
}

#[then("the volume \"{name}\" is not mounted")]
fn volume_is_not_mounted(
    lifecycle_context: &LifecycleContext,
    name: String,
) -> Result<(), StepError> {
    let path = mount_path_of(lifecycle_context, &name)?;
    if path.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "{name} should not be mounted, found {path}"
        )))
    }
}

#[then("the calls were \"{calls}\"")]
fn calls_were(lifecycle_context: &LifecycleContext, calls: String) -> Result<(), StepError> {
    let expected: Vec<&str> = calls.split(", ").collect();
    let actual: Vec<String> = lifecycle_context
        .log
        .calls()
        .into_iter()
        .filter(|call| !call.starts_with("create_dir") && !call.starts_with("remove_dir"))
        .collect();
    if actual == expected {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected calls {expected:?}, got {actual:?}"
        )))
    }
}

#[then("the detach count is {count}")]
fn detach_count(lifecycle_context: &LifecycleContext, count: usize) -> Result<(), StepError> {
    let actual = lifecycle_context.log.count("detach ");
    if actual == count {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} detach calls, got {actual}"
        )))
    }
}

#[then("no volumes are registered")]
fn no_volumes(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    let manager = manager(lifecycle_context)?;
    let volumes = runtime()?.block_on(manager.list());
    if volumes.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected no volumes, got {volumes:?}"
        )))
    }
}
