use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

/// How long captured output may keep draining after the converter is gone.
/// A leaked grandchild can hold the pipes open indefinitely.
const OUTPUT_GRACE: Duration = Duration::from_secs(2);

/// Captured result of one converter run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl InvocationOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    pub fn diagnostics(&self) -> String {
        let stderr = self.stderr.trim();
        let stdout = self.stdout.trim();
        match (stderr.is_empty(), stdout.is_empty()) {
            (true, true) => "no output".to_string(),
            (false, true) => format!("stderr: {stderr}"),
            (true, false) => format!("stdout: {stdout}"),
            (false, false) => format!("stderr: {stderr}; stdout: {stdout}"),
        }
    }
}

/// Runs `program` once and waits at most `timeout` for it. On timeout the
/// child and everything it spawned are killed.
pub async fn invoke_once(program: &Path, args: &[OsString], timeout: Duration) -> io::Result<InvocationOutput> {
    let start = Instant::now();
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    isolate(&mut command);

    let mut child = command.spawn()?;
    let stdout = child.stdout.take().map(|out| tokio::spawn(read_all(out)));
    let stderr = child.stderr.take().map(|err| tokio::spawn(read_all(err)));

    let (exit_code, timed_out) = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => (status?.code(), false),
        Err(_) => {
            warn!("{} exceeded {}, killing process tree", program.display(), humantime::format_duration(timeout));
            if let Some(pid) = child.id() {
                kill_process_tree(pid).await;
            }
            if let Err(e) = child.kill().await {
                debug!("Direct kill of {} failed: {}", program.display(), e);
            }
            (None, true)
        }
    };

    Ok(InvocationOutput {
        exit_code,
        stdout: collect(stdout).await,
        stderr: collect(stderr).await,
        timed_out,
        elapsed: start.elapsed(),
    })
}

async fn read_all<R: AsyncRead + Unpin>(mut reader: R) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Err(e) = reader.read_to_end(&mut buf).await {
        debug!("Reading converter output failed: {}", e);
    }
    buf
}

async fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    let Some(mut handle) = handle else {
        return String::new();
    };
    match tokio::time::timeout(OUTPUT_GRACE, &mut handle).await {
        Ok(Ok(buf)) => String::from_utf8_lossy(&buf).into_owned(),
        Ok(Err(e)) => {
            debug!("Output reader task failed: {}", e);
            String::new()
        }
        Err(_) => {
            handle.abort();
            String::new()
        }
    }
}

#[cfg(unix)]
fn isolate(command: &mut Command) {
    // Own process group, so the whole tree can be signalled at once.
    command.process_group(0);
}

#[cfg(windows)]
fn isolate(command: &mut Command) {
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    command.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(any(unix, windows)))]
fn isolate(_command: &mut Command) {}

#[cfg(unix)]
async fn kill_process_tree(pid: u32) {
    // The child leads its process group; a negative pid addresses the group.
    let mut kill = Command::new("/bin/sh");
    kill.arg("-c").arg(format!("kill -9 -{pid}"));
    run_quietly(kill).await;
}

#[cfg(windows)]
async fn kill_process_tree(pid: u32) {
    let mut kill = Command::new("taskkill");
    kill.args(["/PID", &pid.to_string(), "/T", "/F"]);
    run_quietly(kill).await;
}

#[cfg(not(any(unix, windows)))]
async fn kill_process_tree(_pid: u32) {}

#[cfg(any(unix, windows))]
async fn run_quietly(mut command: Command) {
    command.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());
    match command.status().await {
        Ok(status) if status.success() => {}
        Ok(status) => debug!("Process tree kill exited with {:?}", status.code()),
        Err(e) => debug!("Process tree kill could not run: {}", e),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<OsString> {
        vec![OsString::from("-c"), OsString::from(script)]
    }

    #[tokio::test]
    async fn captures_exit_code_and_streams() {
        let out = invoke_once(Path::new("/bin/sh"), &sh("echo printed; echo warn >&2; exit 3"), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.stdout.trim(), "printed");
        assert_eq!(out.stderr.trim(), "warn");
        assert!(!out.success());
        assert_eq!(out.diagnostics(), "stderr: warn; stdout: printed");
    }

    #[tokio::test]
    async fn success_needs_zero_exit() {
        let out = invoke_once(Path::new("/bin/sh"), &sh("exit 0"), Duration::from_secs(10)).await.unwrap();
        assert!(out.success());
        assert_eq!(out.diagnostics(), "no output");
    }

    #[tokio::test]
    async fn timeout_kills_the_whole_tree() {
        let started = Instant::now();
        // The shell forks `sleep`, which would keep stdout open if only the shell died.
        let out = invoke_once(Path::new("/bin/sh"), &sh("sleep 30; echo late"), Duration::from_millis(300))
            .await
            .unwrap();
        assert!(out.timed_out);
        assert!(!out.success());
        assert!(!out.stdout.contains("late"));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn missing_program_is_an_io_error() {
        let err = invoke_once(Path::new("/nonexistent/converter"), &[], Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
