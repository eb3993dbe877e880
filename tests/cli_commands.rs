// Copyright 2025 dentsusoken
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

struct TestEnv {
    temp: TempDir,
    config_path: PathBuf,
}

impl TestEnv {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let shared = temp.path().join("shared");
        let config_path = temp.path().join("config.toml");
        fs::write(
            &config_path,
            format!(
                "[locking]\nshared_dir = {shared:?}\n\n[locking.backoff]\ninitial_ms = 50\ncap_ms = 100\n"
            ),
        )
        .unwrap();
        Self { temp, config_path }
    }

    fn shared(&self) -> PathBuf {
        self.temp.path().join("shared")
    }

    fn marker(&self, resource: &str) -> PathBuf {
        self.shared().join(format!("lock-{resource}.lock"))
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("reslock").unwrap();
        cmd.arg("--config")
            .arg(&self.config_path)
            .env_remove("RESLOCK_LOCK_TIMEOUT")
            .env_remove("RESLOCK_CONFIG")
            .env_remove("RUST_LOG");
        cmd
    }
}

#[test]
fn test_acquire_prints_token_and_keeps_marker() {
    let env = TestEnv::new();

    let output = env.cmd().args(["acquire", "printer"]).output().unwrap();
    assert!(output.status.success());
    let token = String::from_utf8(output.stdout).unwrap().trim().to_string();
    assert!(!token.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Got resource lock!"));

    let contents = fs::read_to_string(env.marker("printer")).unwrap();
    assert!(contents.contains(&token));

    env.cmd()
        .args(["release", "printer", "--token", &token])
        .assert()
        .success()
        .stdout(predicate::str::contains("Released resource 'printer'"))
        .stderr(predicate::str::contains("Giving up resource 'printer'..."));
    assert!(!env.marker("printer").exists());
}

#[test]
fn test_acquire_times_out_with_exit_code() {
    let env = TestEnv::new();
    fs::create_dir_all(env.shared()).unwrap();
    fs::write(env.marker("node"), b"held").unwrap();

    env.cmd()
        .args(["acquire", "--timeout", "1"])
        .assert()
        .code(75)
        .stderr(predicate::str::contains("Attempting to lock resource 'node'..."))
        .stderr(predicate::str::contains("Timed out"))
        .stderr(predicate::str::contains("reslock release --force node"));
}

#[test]
fn test_release_with_wrong_token_is_refused() {
    let env = TestEnv::new();
    env.cmd().args(["acquire", "printer"]).assert().success();

    env.cmd()
        .args(["release", "printer", "--token", "not-mine"])
        .assert()
        .code(77);
    assert!(env.marker("printer").exists());

    env.cmd()
        .args(["release", "printer", "--force"])
        .assert()
        .success();
    assert!(!env.marker("printer").exists());
}

#[test]
fn test_release_requires_token_or_force() {
    let env = TestEnv::new();
    env.cmd()
        .args(["release", "printer"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--token"));
}

#[test]
fn test_release_of_free_resource_is_not_an_error() {
    let env = TestEnv::new();
    env.cmd()
        .args(["release", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Resource 'node' was not locked"));
}

#[cfg(unix)]
#[test]
fn test_run_holds_lock_and_propagates_exit_code() {
    let env = TestEnv::new();
    let marker = env.marker("printer");
    let script = format!("test -f {marker:?} && exit 7");

    env.cmd()
        .args(["run", "--name", "printer", "--", "sh", "-c", &script])
        .assert()
        .code(7)
        .stderr(predicate::str::contains("Got resource lock!"))
        .stderr(predicate::str::contains("Giving up resource 'printer'..."));
    assert!(!marker.exists());
}

#[test]
fn test_status_reports_free_and_held() {
    let env = TestEnv::new();
    env.cmd()
        .args(["status", "printer"])
        .assert()
        .success()
        .stdout(predicate::str::contains("free"));

    env.cmd().args(["acquire", "printer"]).assert().success();
    env.cmd()
        .args(["status", "printer", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"held\": true"))
        .stdout(predicate::str::contains("\"resource\": \"printer\""));
}

#[test]
fn test_invalid_resource_name_is_rejected() {
    let env = TestEnv::new();
    env.cmd()
        .args(["acquire", "../etc"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid resource name"));
}

#[test]
fn test_clean_removes_old_markers() {
    let env = TestEnv::new();
    fs::create_dir_all(env.shared()).unwrap();
    fs::write(
        env.marker("printer"),
        r#"{"resource":"printer","token":"1-abc","pid":1,"created_at":"2000-01-01T00:00:00Z"}"#,
    )
    .unwrap();

    env.cmd()
        .args(["clean", "--older-than", "60"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed stale marker for 'printer'"));
    assert!(!env.marker("printer").exists());
}

#[test]
fn test_config_shows_effective_values() {
    let env = TestEnv::new();
    env.cmd()
        .arg("config")
        .env("RESLOCK_LOCKING__TIMEOUT_SECS", "42")
        .assert()
        .success()
        .stdout(predicate::str::contains("timeout_secs = 42"))
        .stdout(predicate::str::contains("initial_ms = 50"));
}

#[test]
fn test_broken_config_exits_with_invalid_input() {
    let env = TestEnv::new();
    fs::write(&env.config_path, "[locking.backoff]\nfactor = 0.5\n").unwrap();
    env.cmd()
        .arg("status")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("backoff.factor"));
}
