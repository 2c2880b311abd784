#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

impl CmdResult {
    /// Paths reported by find-only mode, sorted.
    pub fn candidates(&self) -> Vec<String> {
        let mut found: Vec<String> = self
            .stdout
            .lines()
            .filter_map(|l| l.strip_prefix("found a file to migrate: "))
            .map(str::to_string)
            .collect();
        found.sort();
        found
    }

    pub fn error_lines(&self) -> Vec<&str> {
        self.stderr
            .lines()
            .filter(|l| l.starts_with("error:"))
            .collect()
    }
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_ost-migrate") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) {
        "ost-migrate.exe"
    } else {
        "ost-migrate"
    };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve ost-migrate binary path for integration test"),
    }
}

/// Scratch home so no operator config leaks into a test run.
fn scratch_home() -> &'static Path {
    static HOME: OnceLock<PathBuf> = OnceLock::new();
    HOME.get_or_init(|| {
        let dir = std::env::temp_dir().join(format!("ost-migrate-test-home-{}", std::process::id()));
        fs::create_dir_all(&dir).expect("create scratch home");
        dir
    })
}

/// Stand-in for `lfs`: `getstripe <path>` prints a `.dat` file's own contents
/// as its layout, or fails with code 61 when the file starts with `FAIL`.
/// Any other file (configs, action output) reports a released layout.
///
/// Written once per test process so no test execs a script another thread is
/// still writing.
#[cfg(unix)]
pub fn fake_lfs() -> &'static Path {
    use std::os::unix::fs::PermissionsExt;

    static LFS: OnceLock<PathBuf> = OnceLock::new();
    LFS.get_or_init(|| {
        let path = scratch_home().join("fake-lfs");
        let script = "#!/bin/sh\n\
                      [ \"$1\" = getstripe ] || exit 22\n\
                      case \"$2\" in *.dat) ;; *) printf 'lmm_stripe_count:  0\\nlmm_pattern:       released\\n'; exit 0;; esac\n\
                      case \"$(head -c 4 \"$2\")\" in FAIL) echo \"cannot get layout\" >&2; exit 61;; esac\n\
                      cat \"$2\"\n";
        fs::write(&path, script).expect("write fake lfs");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod fake lfs");
        path
    })
}

/// `lfs getstripe` table for a file striped over `targets`.
pub fn layout_text(targets: &[u32]) -> String {
    let mut text = format!("lmm_stripe_count:  {}\n", targets.len());
    text.push_str("\tobdidx\t\t objid\t\t objid\t\t group\n");
    for (i, t) in targets.iter().enumerate() {
        text.push_str(&format!("\t{t:>6}\t{:>14}\t{:>#14x}\t{:>14}\n", 1000 + i, 1000 + i, 0));
    }
    text
}

/// `lfs getstripe` output for a released (HSM-archived) file.
pub fn released_text() -> String {
    "lmm_stripe_count:  1\nlmm_stripe_size:   1048576\nlmm_pattern:       released\nlmm_layout_gen:    2\n"
        .to_string()
}

/// Config file running `/bin/sh -c <script> ostm <path>` as the action.
pub fn write_action_config(dir: &Path, script: &str) -> PathBuf {
    let path = dir.join("ost-migrate.toml");
    let body = format!(
        "[action]\nprogram = \"/bin/sh\"\nargs = [\"-c\", {script:?}, \"ostm\"]\n\n[walk]\nparallelism = 2\n"
    );
    fs::write(&path, body).expect("write config");
    path
}

pub fn run_cli_case(case_name: &str, args: &[&str]) -> CmdResult {
    run_cli_case_with_env(case_name, args, &[])
}

pub fn run_cli_case_with_env(case_name: &str, args: &[&str], env: &[(&str, &str)]) -> CmdResult {
    let root = std::env::temp_dir().join("ost-migrate-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    let mut cmd = Command::new(&bin_path);
    cmd.args(args)
        .env("HOME", scratch_home())
        .env("NO_COLOR", "1")
        .env("RUST_BACKTRACE", "1");
    for (name, value) in env {
        cmd.env(name, value);
    }
    let output = cmd.output().expect("execute ost-migrate command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("bin={}\n", bin_path.display()));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("env={env:?}\n"));
    log_content.push_str(&format!("status={}\n", output.status));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(&stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}
