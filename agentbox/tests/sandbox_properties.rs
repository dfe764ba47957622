//! Authorization properties of the sandbox policy.
//!
//! Covers the write truth table, root containment and the categorical
//! process/VCS ban, plus two concurrent policies over the same root.

use std::path::Path;

use agentbox::core::sandbox::{
    Decision, DenyReason, Guard, Operation, Policy, SandboxMode, WriteKind, authorize,
};

fn write_op(path: &Path) -> Operation<'_> {
    Operation::WritePath {
        path,
        payload: "hello",
        kind: WriteKind::Create,
    }
}

#[test]
fn write_allowed_only_with_all_three_factors() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path();
    let target = root.join("a.txt");
    let op = write_op(&target);

    let cases = [
        (SandboxMode::Limited, true, true, Decision::Allow),
        (
            SandboxMode::Full,
            true,
            true,
            Decision::Deny(DenyReason::ModeForbidsWrites),
        ),
        (
            SandboxMode::Limited,
            false,
            true,
            Decision::Deny(DenyReason::WriteCapabilityMissing),
        ),
        (
            SandboxMode::Limited,
            true,
            false,
            Decision::Deny(DenyReason::ConsentMissing),
        ),
    ];
    for (mode, allows_writes, consent, expected) in cases {
        let policy = Policy::new(mode, root, allows_writes, consent).expect("policy");
        assert_eq!(
            authorize(&policy, &op),
            expected,
            "mode={mode} allows_writes={allows_writes} consent={consent}"
        );
    }
}

#[test]
fn full_mode_read_only_policy_denies_writes_as_mode_violation() {
    let temp = tempfile::tempdir().expect("tempdir");
    let policy = Policy::new(SandboxMode::Full, temp.path(), false, false).expect("policy");
    let target = temp.path().join("a.txt");
    assert_eq!(
        authorize(&policy, &write_op(&target)),
        Decision::Deny(DenyReason::ModeForbidsWrites)
    );
}

#[test]
fn parent_escape_is_outside_root_even_when_writes_are_permitted() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().join("proj");
    std::fs::create_dir(&root).expect("mkdir");
    std::fs::write(temp.path().join("secret.txt"), "s").expect("write");
    let policy = Policy::new(SandboxMode::Limited, &root, true, true).expect("policy");

    let escaped = root.join("../secret.txt");
    assert_eq!(
        authorize(&policy, &write_op(&escaped)),
        Decision::Deny(DenyReason::OutsideRoot)
    );
    assert_eq!(
        authorize(&policy, &Operation::ReadPath(Path::new("../secret.txt"))),
        Decision::Deny(DenyReason::OutsideRoot)
    );
    assert_eq!(
        authorize(&policy, &Operation::ReadPath(Path::new("nested/../still_inside.txt"))),
        Decision::Allow
    );
}

#[test]
fn reads_inside_root_are_allowed_in_every_mode() {
    let temp = tempfile::tempdir().expect("tempdir");
    for mode in [SandboxMode::Full, SandboxMode::Limited] {
        let policy = Policy::new(mode, temp.path(), false, false).expect("policy");
        assert!(authorize(&policy, &Operation::ReadPath(Path::new("src/lib.rs"))).is_allowed());
    }
}

#[test]
fn process_and_vcs_access_are_never_allowed() {
    let temp = tempfile::tempdir().expect("tempdir");
    let policy = Policy::new(SandboxMode::Limited, temp.path(), true, true).expect("policy");
    let forbidden = Decision::Deny(DenyReason::OperationCategoricallyForbidden);

    assert_eq!(
        authorize(&policy, &Operation::SpawnProcess { program: "sh" }),
        forbidden
    );
    assert_eq!(
        authorize(&policy, &Operation::VcsAccess { command: "push" }),
        forbidden
    );
}

#[test]
fn independent_policies_do_not_interfere() {
    let temp = tempfile::tempdir().expect("tempdir");
    let with_consent = Guard::new(
        Policy::new(SandboxMode::Limited, temp.path(), true, true).expect("policy"),
    );
    let without_consent = Guard::new(
        Policy::new(SandboxMode::Limited, temp.path(), true, false).expect("policy"),
    );

    let path = Path::new("out.txt");
    assert!(
        with_consent
            .admit_write(path, "x", WriteKind::Create)
            .is_ok()
    );
    let violation = without_consent
        .admit_write(path, "x", WriteKind::Create)
        .expect_err("denied");
    assert_eq!(violation.reason, DenyReason::ConsentMissing);
    assert!(with_consent.admit_write(path, "x", WriteKind::Create).is_ok());
}

#[test]
fn policy_requires_an_existing_directory_root() {
    let temp = tempfile::tempdir().expect("tempdir");
    let file = temp.path().join("file.txt");
    std::fs::write(&file, "").expect("write");

    assert!(Policy::new(SandboxMode::Full, &temp.path().join("missing"), false, false).is_err());
    assert!(Policy::new(SandboxMode::Full, &file, false, false).is_err());
}
