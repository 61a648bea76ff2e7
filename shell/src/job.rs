use nix::errno::Errno;
use nix::sys::wait::{self, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use tracing::{debug, warn};

pub trait WaitStatusExt {
	/// Shell-style exit code: the exit status, or 128 plus the signal number.
	fn code(self) -> i32;
}

impl WaitStatusExt for WaitStatus {
	fn code(self) -> i32 {
		match self {
			WaitStatus::Exited(_, code) => code,
			WaitStatus::Signaled(_, sig, _) => 128 + sig as i32,
			_ => 0,
		}
	}
}

/// Blocks until `pid` terminates.
pub fn wait_for(pid: Pid) -> nix::Result<WaitStatus> {
	loop {
		match wait::waitpid(pid, None) {
			Err(Errno::EINTR) => continue,
			Ok(status @ WaitStatus::Exited(..)) | Ok(status @ WaitStatus::Signaled(..)) => {
				debug!(%pid, code = status.code(), "child finished");
				return Ok(status);
			},
			Ok(_) => continue,
			Err(e) => return Err(e),
		}
	}
}

/// Collects every child that has already exited, without blocking.
/// Background commands are never waited for otherwise.
pub fn reap_background() -> usize {
	let mut reaped = 0;
	loop {
		match wait::waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
			Ok(WaitStatus::StillAlive) | Err(Errno::ECHILD) => break,
			Err(Errno::EINTR) => continue,
			Ok(status) => {
				debug!(pid = ?status.pid(), code = status.code(), "reaped background process");
				reaped += 1;
			},
			Err(e) => {
				warn!(error = %e, "reaping background processes failed");
				break;
			},
		}
	}
	reaped
}
