use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn apm(dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("apm").unwrap();
    cmd.arg("--project-root").arg(dir);
    cmd
}

fn scaffold_with_lockfile(dir: &std::path::Path) {
    std::fs::write(
        dir.join("apm.yml"),
        "name: demo\nversion: \"1.0.0\"\ndependencies:\n  apm:\n    - owner/repo\n",
    )
    .unwrap();
    std::fs::write(
        dir.join("apm.lock"),
        "lockfile_version: \"1\"\napm_version: \"0.1.0\"\ngenerated_at: \"2024-01-01T00:00:00Z\"\ndependencies:\n  - repo_url: owner/repo\n    host: github.com\n    resolved_commit: \"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\"\n    resolved_ref: main\n    version: null\n    virtual_path: null\n    is_virtual: false\n    depth: 1\n    resolved_by: root\n",
    )
    .unwrap();
}

#[test]
fn deps_list_prints_locked_dependency() {
    let dir = tempdir().unwrap();
    scaffold_with_lockfile(dir.path());
    apm(dir.path()).arg("deps").arg("list").assert().success().stdout(predicate::str::contains("owner/repo"));
}

#[test]
fn deps_verify_fails_when_install_dir_missing() {
    let dir = tempdir().unwrap();
    scaffold_with_lockfile(dir.path());
    apm(dir.path())
        .arg("deps")
        .arg("verify")
        .assert()
        .failure()
        .stdout(predicate::str::contains("missing:"));
}

#[test]
fn deps_verify_succeeds_when_install_dir_present() {
    let dir = tempdir().unwrap();
    scaffold_with_lockfile(dir.path());
    std::fs::create_dir_all(dir.path().join("apm_modules/owner/repo")).unwrap();
    apm(dir.path()).arg("deps").arg("verify").assert().success();
}
