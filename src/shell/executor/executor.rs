use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::{AsRawFd, IntoRawFd, RawFd};

use log::debug;
use nix::errno::Errno;
use nix::sys::signal::{signal, SigHandler, Signal};
use nix::unistd::{close, dup2, execvp, fork, pipe, ForkResult, Pid};

use crate::shell::error::ShellError;
use crate::shell::job_manager::wait_child;
use crate::shell::parser::ast::{Command, CommandKind};

/// Exit status of a program that could not be found.
pub const STATUS_NOT_FOUND: i32 = 127;
/// Exit status of a program that was found but could not be loaded.
pub const STATUS_NOT_EXECUTABLE: i32 = 126;

/// Runs one command tree to completion, left to right, and records the
/// status on every node it evaluated in this process.
///
/// Pipelines and subshells run in forked children; `Simple` leaves of a
/// pipeline replace the forked child's image directly, composite branches
/// fork again through this function.
pub fn execute_command(command: &mut Command) -> Result<i32, ShellError> {
    let Command {
        kind,
        input,
        output,
        status,
    } = command;

    let code = match kind {
        CommandKind::Simple(words) => run_simple(words, input.as_deref(), output.as_deref())?,
        CommandKind::Pipe(left, right) => run_pipe(left, right)?,
        CommandKind::And(left, right) => {
            let code = execute_command(left)?;
            if code == 0 {
                execute_command(right)?
            } else {
                code
            }
        }
        CommandKind::Or(left, right) => {
            if execute_command(left)? == 0 {
                0
            } else {
                execute_command(right)?
            }
        }
        CommandKind::Sequence(left, right) => {
            execute_command(left)?;
            execute_command(right)?
        }
        CommandKind::Subshell(inner) => run_subshell(inner, input.as_deref(), output.as_deref())?,
    };

    *status = Some(code);
    Ok(code)
}

fn run_simple(
    words: &[String],
    input: Option<&str>,
    output: Option<&str>,
) -> Result<i32, ShellError> {
    flush_stdout();
    // SAFETY: the child only sets up file descriptors and execs or exits.
    match unsafe { fork() }? {
        ForkResult::Child => exec_in_place(words, input, output),
        ForkResult::Parent { child } => {
            debug!("进程 {} 执行: {}", child, words.join(" "));
            wait_child(child)
        }
    }
}

fn run_pipe(left: &mut Command, right: &mut Command) -> Result<i32, ShellError> {
    flush_stdout();
    let (read_end, write_end) = pipe()?;

    // SAFETY: the child rewires stdout and then execs or exits.
    let left_pid: Pid = match unsafe { fork() }? {
        ForkResult::Child => {
            drop(read_end);
            redirect_fd_or_exit(write_end.as_raw_fd(), libc::STDOUT_FILENO);
            drop(write_end);
            run_in_place(left)
        }
        ForkResult::Parent { child } => child,
    };

    // SAFETY: as above, for stdin.
    let right_pid: Pid = match unsafe { fork() }? {
        ForkResult::Child => {
            drop(write_end);
            redirect_fd_or_exit(read_end.as_raw_fd(), libc::STDIN_FILENO);
            drop(read_end);
            run_in_place(right)
        }
        ForkResult::Parent { child } => child,
    };

    drop(read_end);
    drop(write_end);

    let left_code = wait_child(left_pid)?;
    let right_code = wait_child(right_pid)?;
    left.status = Some(left_code);
    right.status = Some(right_code);
    Ok(right_code)
}

fn run_subshell(
    inner: &mut Command,
    input: Option<&str>,
    output: Option<&str>,
) -> Result<i32, ShellError> {
    flush_stdout();
    // SAFETY: the child evaluates the subtree and exits without returning.
    match unsafe { fork() }? {
        ForkResult::Child => {
            if let Err(e) = apply_redirections(input, output) {
                child_exit_with_error(&e, 1);
            }
            match execute_command(inner) {
                Ok(code) => _exit(code),
                Err(e) => child_exit_with_error(&e, 1),
            }
        }
        ForkResult::Parent { child } => {
            let code = wait_child(child)?;
            inner.status = Some(code);
            Ok(code)
        }
    }
}

/// Evaluates a pipeline branch inside an already forked child.
fn run_in_place(command: &mut Command) -> ! {
    if let CommandKind::Simple(words) = &command.kind {
        exec_in_place(words, command.input.as_deref(), command.output.as_deref());
    }
    match execute_command(command) {
        Ok(code) => _exit(code),
        Err(e) => child_exit_with_error(&e, 1),
    }
}

/// Applies redirections and replaces the current process image.
/// A leading `exec` word is skipped.
fn exec_in_place(words: &[String], input: Option<&str>, output: Option<&str>) -> ! {
    if let Err(e) = apply_redirections(input, output) {
        child_exit_with_error(&e, 1);
    }

    let argv = match words.split_first() {
        Some((first, rest)) if first == "exec" => rest,
        _ => words,
    };
    if argv.is_empty() {
        _exit(0);
    }

    let args = match argv
        .iter()
        .map(|w| CString::new(w.as_bytes()))
        .collect::<Result<Vec<_>, _>>()
    {
        Ok(args) => args,
        Err(_) => {
            eprintln!("wavesh: {}: invalid program name", argv[0]);
            _exit(STATUS_NOT_EXECUTABLE);
        }
    };

    // 子进程恢复默认的 SIGPIPE 处理
    // SAFETY: resetting to the default disposition installs no handler.
    unsafe {
        let _ = signal(Signal::SIGPIPE, SigHandler::SigDfl);
    }

    let err = match execvp(&args[0], &args) {
        Ok(never) => match never {},
        Err(err) => err,
    };
    eprintln!("wavesh: {}: {}", argv[0], err.desc());
    _exit(if err == Errno::ENOENT {
        STATUS_NOT_FOUND
    } else {
        STATUS_NOT_EXECUTABLE
    })
}

/// Rebinds stdin/stdout of the current process to the named files.
/// The input file must exist; the output file is created or truncated.
fn apply_redirections(input: Option<&str>, output: Option<&str>) -> Result<(), ShellError> {
    if let Some(path) = input {
        let file = File::open(path).map_err(|source| ShellError::Redirect {
            path: path.to_string(),
            source,
        })?;
        move_fd(file.into_raw_fd(), libc::STDIN_FILENO)?;
    }
    if let Some(path) = output {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|source| ShellError::Redirect {
                path: path.to_string(),
                source,
            })?;
        move_fd(file.into_raw_fd(), libc::STDOUT_FILENO)?;
    }
    Ok(())
}

fn move_fd(fd: RawFd, target: RawFd) -> Result<(), ShellError> {
    if fd != target {
        dup2(fd, target)?;
        close(fd)?;
    }
    Ok(())
}

fn redirect_fd_or_exit(fd: RawFd, target: RawFd) {
    if let Err(e) = dup2(fd, target) {
        child_exit_with_error(&ShellError::Sys(e), 1);
    }
}

fn child_exit_with_error(err: &ShellError, code: i32) -> ! {
    eprintln!("wavesh: {}", err);
    _exit(code)
}

// fork 之前先把缓冲区写出去，避免子进程重复输出
pub(crate) fn flush_stdout() {
    let _ = io::stdout().flush();
}

/// Leaves a forked child immediately, skipping the parent's atexit
/// handlers and buffered output.
pub(crate) fn _exit(code: i32) -> ! {
    // SAFETY: only called in forked children, which own no state that needs
    // unwinding.
    unsafe { libc::_exit(code) }
}
