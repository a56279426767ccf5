//! Process execution for backend invocations

use std::io::{self, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// One backend invocation: program, arguments, optional stdin and timeout.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub program: &'a Path,
    pub args: &'a [String],
    pub input: Option<&'a [u8]>,
    pub timeout: Option<Duration>,
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Exit code, `None` when the process was terminated by a signal
    pub status: Option<i32>,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Runs backend commands.
///
/// An `Err` means the program could not be run at all (missing, not
/// executable, permission denied, timed out). A program that ran and exited
/// non-zero is an `Ok` with a non-zero status.
pub trait Executor: Send + Sync {
    fn execute(&self, invocation: &Invocation<'_>) -> io::Result<ExecOutput>;
}

/// Executes commands on the local machine via `std::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

impl Executor for SystemExecutor {
    fn execute(&self, invocation: &Invocation<'_>) -> io::Result<ExecOutput> {
        let mut child = Command::new(invocation.program)
            .args(invocation.args)
            .stdin(if invocation.input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // stdin is fed while both pipes drain; the child may exit mid-input
        let writer = match (invocation.input, child.stdin.take()) {
            (Some(input), Some(stdin)) => Some(feed(stdin, input.to_vec())),
            _ => None,
        };
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = match invocation.timeout {
            None => child.wait()?,
            Some(timeout) => wait_with_deadline(&mut child, invocation.program, timeout)?,
        };

        if let Some(writer) = writer {
            writer
                .join()
                .map_err(|_| io::Error::new(io::ErrorKind::Other, "input writer panicked"))??;
        }

        Ok(ExecOutput {
            stdout: join(stdout)?,
            stderr: join(stderr)?,
            status: status.code(),
        })
    }
}

fn wait_with_deadline(child: &mut Child, program: &Path, timeout: Duration) -> io::Result<ExitStatus> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("{} did not finish within {:?}", program.display(), timeout),
            ));
        }
        thread::sleep(Duration::from_millis(10));
    }
}

/// Writes `input` and closes stdin. A child that exits before reading all
/// of it is reported through its exit status, not as a write failure.
fn feed(mut stdin: ChildStdin, input: Vec<u8>) -> thread::JoinHandle<io::Result<()>> {
    thread::spawn(move || match stdin.write_all(&input) {
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    })
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf)?;
        Ok(buf)
    })
}

fn join(handle: Option<thread::JoinHandle<io::Result<Vec<u8>>>>) -> io::Result<Vec<u8>> {
    match handle {
        Some(handle) => handle
            .join()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "output reader panicked"))?,
        None => Ok(Vec::new()),
    }
}
