// This file is part of the bin2c package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

//! Small command harness for driving the bin2c binary.

#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::process::{Command, Stdio};
use std::thread;

const BIN: &str = env!("CARGO_BIN_EXE_bin2c");

pub fn new_cmd() -> TestCommand {
    TestCommand {
        cmd: Command::new(BIN),
        pipe_in: None,
        stdin_file: None,
        stdout_file: None,
    }
}

/// Builder around one invocation of the binary. Stdin defaults to an
/// immediately-closed pipe, stdout and stderr to captured pipes.
pub struct TestCommand {
    cmd: Command,
    pipe_in: Option<Vec<u8>>,
    stdin_file: Option<File>,
    stdout_file: Option<File>,
}

impl TestCommand {
    pub fn arg(mut self, arg: &str) -> Self {
        self.cmd.arg(arg);
        self
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.cmd.args(args);
        self
    }

    /// Feed these bytes through a pipe on stdin.
    pub fn pipe_in<T: Into<Vec<u8>>>(mut self, data: T) -> Self {
        self.pipe_in = Some(data.into());
        self
    }

    /// Redirect stdin from an open file, exercising the mmap engines.
    pub fn stdin_file(mut self, file: File) -> Self {
        self.stdin_file = Some(file);
        self
    }

    /// Redirect stdout to an open file instead of capturing it.
    pub fn stdout_file(mut self, file: File) -> Self {
        self.stdout_file = Some(file);
        self
    }

    pub fn run(mut self) -> CmdResult {
        match self.stdin_file.take() {
            Some(file) => {
                self.cmd.stdin(Stdio::from(file));
            }
            None => {
                self.cmd.stdin(Stdio::piped());
            }
        }
        match self.stdout_file.take() {
            Some(file) => {
                self.cmd.stdout(Stdio::from(file));
            }
            None => {
                self.cmd.stdout(Stdio::piped());
            }
        }
        self.cmd.stderr(Stdio::piped());

        let mut child = self.cmd.spawn().expect("failed to spawn bin2c");
        // Feed stdin from a helper thread so a full stdout pipe cannot
        // deadlock against a full stdin pipe.
        let feeder = child.stdin.take().map(|mut stdin| {
            let data = self.pipe_in.take().unwrap_or_default();
            thread::spawn(move || {
                let _ = stdin.write_all(&data);
            })
        });
        let output = child
            .wait_with_output()
            .expect("failed to collect bin2c output");
        if let Some(handle) = feeder {
            let _ = handle.join();
        }
        CmdResult {
            stdout: output.stdout,
            stderr: output.stderr,
            code: output.status.code().unwrap_or(-1),
        }
    }
}

pub struct CmdResult {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    code: i32,
}

impl CmdResult {
    pub fn stdout(&self) -> &[u8] {
        &self.stdout
    }

    pub fn stdout_str(&self) -> &str {
        std::str::from_utf8(&self.stdout).expect("stdout is not utf-8")
    }

    pub fn stderr_str(&self) -> &str {
        std::str::from_utf8(&self.stderr).expect("stderr is not utf-8")
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn success(&self) -> &Self {
        assert_eq!(
            self.code,
            0,
            "expected success, got {} with stderr: {}",
            self.code,
            self.stderr_str()
        );
        self
    }

    pub fn failure(&self) -> &Self {
        assert_eq!(
            self.code,
            1,
            "expected failure, got {} with stderr: {}",
            self.code,
            self.stderr_str()
        );
        self
    }

    pub fn no_stdout(&self) -> &Self {
        assert_eq!(self.stdout_str(), "");
        self
    }

    pub fn no_stderr(&self) -> &Self {
        assert_eq!(self.stderr_str(), "");
        self
    }

    pub fn stdout_is(&self, expected: &str) -> &Self {
        assert_eq!(self.stdout_str(), expected);
        self
    }

    pub fn stdout_is_bytes(&self, expected: &[u8]) -> &Self {
        assert_eq!(self.stdout, expected);
        self
    }

    /// Compare stderr modulo the trailing newline.
    pub fn stderr_is(&self, expected: &str) -> &Self {
        assert_eq!(self.stderr_str().trim_end(), expected.trim_end());
        self
    }

    pub fn stdout_only(&self, expected: &str) -> &Self {
        self.no_stderr().stdout_is(expected)
    }

    pub fn stderr_only(&self, expected: &str) -> &Self {
        self.no_stdout().stderr_is(expected)
    }

    pub fn stdout_contains(&self, needle: &str) -> &Self {
        assert!(
            self.stdout_str().contains(needle),
            "stdout does not contain {needle:?}: {}",
            self.stdout_str()
        );
        self
    }

    pub fn stderr_contains(&self, needle: &str) -> &Self {
        assert!(
            self.stderr_str().contains(needle),
            "stderr does not contain {needle:?}: {}",
            self.stderr_str()
        );
        self
    }
}
