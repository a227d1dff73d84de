use std::collections::HashMap;
use std::fmt;

use log::{debug, error};
use nix::errno::Errno;
use nix::sys::wait::waitpid;
use nix::sys::wait::WaitStatus as WS;
use nix::unistd::Pid;

use crate::shell::error::ShellError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Finished,
}

/// One top-level tree as seen by the scheduler.
#[derive(Debug, Clone)]
pub struct Job {
    pub pid: i32,
    pub index: usize,
    pub command: String,
    pub status: JobStatus,
    pub exit_status: Option<i32>,
}

impl Job {
    fn new(index: usize, command: String) -> Self {
        Self {
            pid: 0,
            index,
            command,
            status: JobStatus::Pending,
            exit_status: None,
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self.status {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Finished => "done",
        };
        write!(f, "[{}] {} {}", self.index, self.pid, status)?;
        if let Some(code) = self.exit_status {
            write!(f, "({})", code)?;
        }
        write!(f, " {}", self.command)
    }
}

/// Tracks every job by ordinal and the live ones by pid.
#[derive(Debug, Clone, Default)]
pub struct JobManager {
    pub(crate) jobs: Vec<Job>,
    running: HashMap<i32, usize>,
}

impl JobManager {
    pub fn new<I>(commands: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            jobs: commands
                .into_iter()
                .enumerate()
                .map(|(index, command)| Job::new(index, command))
                .collect(),
            running: HashMap::new(),
        }
    }

    pub fn mark_running(&mut self, index: usize, pid: Pid) {
        if let Some(job) = self.jobs.get_mut(index) {
            job.pid = pid.as_raw();
            job.status = JobStatus::Running;
            self.running.insert(job.pid, index);
            debug!("启动任务 {}", job);
        }
    }

    pub fn has_running(&self) -> bool {
        !self.running.is_empty()
    }

    pub fn all_finished(&self) -> bool {
        self.jobs.iter().all(|job| job.status == JobStatus::Finished)
    }

    fn mark_job_as_done(&mut self, pid: i32, code: i32) -> Option<usize> {
        let index = self.running.remove(&pid)?;
        let job = self.jobs.get_mut(index)?;
        job.status = JobStatus::Finished;
        job.exit_status = Some(code);
        debug!("任务结束 {}", job);
        Some(index)
    }

    /// Blocks until any running job exits and returns its ordinal and
    /// exit status. `None` when nothing is running.
    pub fn wait_any(&mut self) -> Result<Option<(usize, i32)>, ShellError> {
        while self.has_running() {
            let ws = waitpidx(-1);
            debug!("回收子进程 {:?}", ws);
            let (pid, code) = match ws {
                WaitStatus::Exited { pid, code } => (pid, code),
                WaitStatus::Signaled { pid, signal } => (pid, 128 + signal),
                WaitStatus::Failed(err) => {
                    error!("等待子进程失败: {}", err);
                    return Err(ShellError::Sys(err));
                }
                WaitStatus::Other => continue,
            };
            if let Some(index) = self.mark_job_as_done(pid, code) {
                return Ok(Some((index, code)));
            }
            debug!("忽略非调度任务的子进程 {}", pid);
        }
        Ok(None)
    }
}

/// Outcome of one `waitpid` call, reduced to what the shell needs.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WaitStatus {
    Exited { pid: i32, code: i32 },
    Signaled { pid: i32, signal: i32 },
    Failed(Errno),
    /// Stopped, continued or nothing to report.
    Other,
}

impl WaitStatus {
    /// Exit code, or `128 + signal` for a killed process.
    pub fn exit_code(&self) -> Option<i32> {
        match *self {
            WaitStatus::Exited { code, .. } => Some(code),
            WaitStatus::Signaled { signal, .. } => Some(128 + signal),
            WaitStatus::Failed(_) | WaitStatus::Other => None,
        }
    }
}

impl From<WS> for WaitStatus {
    fn from(ws: WS) -> Self {
        match ws {
            WS::Exited(pid, code) => WaitStatus::Exited {
                pid: pid.as_raw(),
                code,
            },
            WS::Signaled(pid, sig, _core_dumped) => WaitStatus::Signaled {
                pid: pid.as_raw(),
                signal: sig as i32,
            },
            _ => WaitStatus::Other,
        }
    }
}

/// Blocking `waitpid` that retries on `EINTR`.
pub fn waitpidx(wpid: i32) -> WaitStatus {
    loop {
        match waitpid(Pid::from_raw(wpid), None) {
            Ok(ws) => return ws.into(),
            Err(Errno::EINTR) => continue,
            Err(e) => return WaitStatus::Failed(e),
        }
    }
}

/// Waits for one specific child and returns its exit status.
pub fn wait_child(pid: Pid) -> Result<i32, ShellError> {
    loop {
        let ws = waitpidx(pid.as_raw());
        if let WaitStatus::Failed(err) = ws {
            return Err(ShellError::Sys(err));
        }
        if let Some(code) = ws.exit_code() {
            return Ok(code);
        }
    }
}
