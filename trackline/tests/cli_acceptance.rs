use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

// Nothing listens on the discard port, so the probe resolves dead quickly.
const UNREACHABLE_URL: &str = "http://127.0.0.1:9";

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_data: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_data = base.join("xdg-data");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_data).expect("failed to create XDG_DATA_HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_data,
            xdg_config,
            xdg_state,
        }
    }

    fn write_config(&self, content: &str) {
        let path = self.xdg_config.join("trackline/config.toml");
        fs::create_dir_all(path.parent().expect("missing config parent"))
            .expect("failed to create config directory");
        fs::write(path, content).expect("failed to write config");
    }

    fn identity_path(&self) -> PathBuf {
        self.xdg_data.join("trackline/identity")
    }
}

fn command(env: &CliTestEnv, args: &[&str]) -> Command {
    let mut command = Command::new(PathBuf::from(assert_cmd::cargo::cargo_bin!("trackline")));
    command
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_DATA_HOME", &env.xdg_data)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .env_remove("RUST_LOG");
    command
}

fn run_bin(env: &CliTestEnv, args: &[&str]) -> Output {
    command(env, args)
        .output()
        .unwrap_or_else(|e| panic!("failed to execute trackline: {e}"))
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "trackline {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

#[test]
fn status_without_config_reports_not_ready() {
    let env = CliTestEnv::new();

    let output = run_bin(&env, &["status"]);
    assert_success(&["status"], &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Trackline Pipeline Configuration"));
    assert!(stdout.contains("Tenant:          <not set>"));
    assert!(
        stdout.contains("Status: Not ready"),
        "expected not-ready status, got:\n{stdout}"
    );
}

#[test]
fn status_reads_config_file() {
    let env = CliTestEnv::new();
    env.write_config(&format!(
        "[pipeline]\ntenant = \"acme\"\nbase_url = \"{UNREACHABLE_URL}\"\nflush_interval_secs = 3\n"
    ));

    let output = run_bin(&env, &["status"]);
    assert_success(&["status"], &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Tenant:          acme"));
    assert!(stdout.contains("Flush Interval:  3s"));
    assert!(stdout.contains("Status: Endpoint unreachable"));
}

#[test]
fn track_with_invalid_config_fails() {
    let env = CliTestEnv::new();

    let output = run_bin(&env, &["track", "app_open"]);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("failed to initialize pipeline"),
        "expected initialization error, got:\n{stderr}"
    );
}

#[test]
fn track_against_unreachable_endpoint_exits_cleanly() {
    let env = CliTestEnv::new();
    let args = [
        "--tenant",
        "acme",
        "--base-url",
        UNREACHABLE_URL,
        "track",
        "app_open",
        "--value",
        r#"{"source":"cli"}"#,
    ];

    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Health:          dead"));
    assert!(stdout.contains("Tracked:         1"));
    assert!(stdout.contains("Sent:            0"));

    let identity = fs::read_to_string(env.identity_path()).expect("identity should be persisted");
    assert!(!identity.trim().is_empty());
}

#[test]
fn pipe_tracks_each_line_until_eof() {
    let env = CliTestEnv::new();
    let args = ["--tenant", "acme", "--base-url", UNREACHABLE_URL, "pipe"];

    let mut child = command(&env, &args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn trackline");
    {
        let mut stdin = child.stdin.take().expect("missing stdin");
        stdin
            .write_all(b"first\nsecond\tvalue\n\nthird\n")
            .expect("failed to write stdin");
    }
    let output = child.wait_with_output().expect("failed to wait for trackline");
    assert_success(&args, &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("Tracked:         3"),
        "expected three tracked events, got:\n{stdout}"
    );
}
