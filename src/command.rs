//! 外部命令执行
//!
//! 供外部命令检测器调用平台工具（如 `file`）使用：按 `PATH` 解析程序、
//! 以子进程运行并在 timeout 与输出上限约束下捕获 stdout/stderr。
//! 超时的子进程会被终止。

use anyhow::{anyhow, Context, Result};
use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_OUTPUT_MAX_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct CommandRunner {
    program: PathBuf,
    args: Vec<OsString>,
    timeout: Option<Duration>,
    stdout_max_bytes: usize,
    stderr_max_bytes: usize,
    working_dir: Option<PathBuf>,
}

#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl CommandOutput {
    #[must_use]
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    #[must_use]
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    /// 正常退出、未超时且退出码为 0。
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.timed_out && self.status.success()
    }
}

impl CommandRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: Some(DEFAULT_TIMEOUT),
            stdout_max_bytes: DEFAULT_OUTPUT_MAX_BYTES,
            stderr_max_bytes: DEFAULT_OUTPUT_MAX_BYTES,
            working_dir: None,
        }
    }

    pub fn arg(
        &mut self,
        arg: impl Into<OsString>,
    ) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, A>(
        &mut self,
        args: I,
    ) -> &mut Self
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn timeout(
        &mut self,
        timeout: Option<Duration>,
    ) -> &mut Self {
        self.timeout = timeout;
        self
    }

    pub const fn stdout_max_bytes(
        &mut self,
        bytes: usize,
    ) -> &mut Self {
        self.stdout_max_bytes = bytes;
        self
    }

    pub fn working_dir(
        &mut self,
        dir: impl Into<PathBuf>,
    ) -> &mut Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// 执行命令并捕获输出。
    ///
    /// # Errors
    ///
    /// 当命令启动失败、等待失败或输出读取线程异常退出时返回错误。
    pub fn run(&self) -> Result<CommandOutput> {
        let start = Instant::now();
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        log::debug!("执行外部命令: {cmd:?}");

        let mut child = cmd
            .spawn()
            .with_context(|| format!("启动外部命令失败: {}", self.program.display()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("无法捕获 stdout: {}", self.program.display()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("无法捕获 stderr: {}", self.program.display()))?;

        let stdout_max = self.stdout_max_bytes;
        let stderr_max = self.stderr_max_bytes;
        let stdout_handle = std::thread::spawn(move || read_stream_with_limit(stdout, stdout_max));
        let stderr_handle = std::thread::spawn(move || read_stream_with_limit(stderr, stderr_max));

        let (status, timed_out) = wait_with_timeout(&mut child, self.timeout)?;

        let stdout_capture = stdout_handle
            .join()
            .map_err(|_| anyhow!("stdout 读取线程异常退出"))?;
        let stderr_capture = stderr_handle
            .join()
            .map_err(|_| anyhow!("stderr 读取线程异常退出"))?;

        Ok(CommandOutput {
            status,
            stdout: stdout_capture.buf,
            stderr: stderr_capture.buf,
            stdout_truncated: stdout_capture.truncated,
            stderr_truncated: stderr_capture.truncated,
            timed_out,
            elapsed: start.elapsed(),
        })
    }
}

/// 解析程序路径：若路径存在则直接返回，否则按 `PATH` 搜索。
///
/// # Errors
///
/// 当程序不存在时返回错误。
pub fn resolve_program(program: impl AsRef<Path>) -> Result<PathBuf> {
    let program = program.as_ref();
    if program.exists() {
        return Ok(program.to_path_buf());
    }
    if program.components().count() > 1 {
        return Err(anyhow!("program not found: {}", program.display()));
    }

    let path = std::env::var_os("PATH").ok_or_else(|| anyhow!("PATH is not set"))?;
    for dir in std::env::split_paths(&path) {
        let full = dir.join(program);
        if full.is_file() {
            return Ok(full);
        }
        #[cfg(windows)]
        {
            let exe = dir.join(format!("{}.exe", program.display()));
            if exe.is_file() {
                return Ok(exe);
            }
        }
    }
    Err(anyhow!("program not found in PATH: {}", program.display()))
}

fn wait_with_timeout(
    child: &mut std::process::Child,
    timeout: Option<Duration>,
) -> Result<(ExitStatus, bool)> {
    let Some(timeout) = timeout else {
        let status = child.wait().context("等待外部命令退出失败")?;
        return Ok((status, false));
    };

    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().context("轮询外部命令状态失败")? {
            return Ok((status, false));
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            let status = child.wait().context("等待被终止的外部命令退出失败")?;
            return Ok((status, true));
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

struct StreamCapture {
    buf: Vec<u8>,
    truncated: bool,
}

fn read_stream_with_limit<R: Read>(
    mut reader: R,
    max_bytes: usize,
) -> StreamCapture {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 8192];
    let mut truncated = false;

    loop {
        match reader.read(&mut tmp) {
            Ok(0) => break,
            Ok(n) => {
                if buf.len() < max_bytes {
                    let remaining = max_bytes - buf.len();
                    if n <= remaining {
                        buf.extend_from_slice(&tmp[..n]);
                    } else {
                        buf.extend_from_slice(&tmp[..remaining]);
                        truncated = true;
                    }
                } else {
                    truncated = true;
                }
            }
            Err(_) => break,
        }
    }

    StreamCapture { buf, truncated }
}
