use std::ffi::{CString, NulError, OsStr};
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Write};
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStringExt;
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;

use nix::unistd::{self, ForkResult};
use thiserror::Error;
use tracing::{debug, warn};

use crate::builtin;
use crate::global;
use crate::job;
use crate::search::{self, SearchPath};
use crate::types::{Command, OutputMode};

/// What the prompt loop should do after a line has been evaluated.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Status {
	Success = 0,
	Exit = 1,
	/// The line could not be started at all (the shell failed to fork).
	Unknown = 2,
}

#[derive(Debug, Error)]
enum ExecError {
	#[error("{0}")]
	Nix(#[from] nix::Error),
	#[error("{0}")]
	Io(#[from] io::Error),
	#[error("argument contains a nul byte: {0}")]
	Nul(#[from] NulError),
	#[error("command not found: {0}")]
	NotFound(String),
	#[error("{target}: {source}")]
	Redirect {
		target: String,
		#[source]
		source: io::Error,
	},
}

impl ExecError {
	fn exit_code(&self) -> u8 {
		match *self {
			ExecError::NotFound(_) => 127,
			ExecError::Redirect { .. } => 1,
			_ => 126,
		}
	}
}

enum Program {
	Builtin(builtin::Handler),
	External(CString),
}

fn locate(command: &Command) -> Result<Program, ExecError> {
	if builtin::is_builtin(&command.name) {
		return builtin::match_builtin(&command.name)
			.map(Program::Builtin)
			.ok_or_else(|| ExecError::NotFound(command.name.clone()));
	}
	let path = if command.name.contains('/') {
		let path = PathBuf::from(&command.name);
		if path.exists() { Some(path) } else { None }
	} else {
		search::resolve(&command.name)
	};
	match path {
		Some(path) => Ok(Program::External(CString::new(path.into_os_string().into_vec())?)),
		None => Err(ExecError::NotFound(command.name.clone())),
	}
}

fn open_target(target: &str, mode: Option<OutputMode>) -> Result<OwnedFd, ExecError> {
	let mut oopt = OpenOptions::new();
	oopt.read(true).write(true).create(true).mode(0o644);
	match mode {
		Some(OutputMode::Truncate) => { oopt.truncate(true); },
		Some(OutputMode::Append) => { oopt.append(true); },
		None => {},
	}
	match oopt.open(target) {
		Ok(file) => Ok(OwnedFd::from(file)),
		Err(e) => Err(ExecError::Redirect { target: target.to_string(), source: e }),
	}
}

/// Moves `fd` onto descriptor `to`. The original descriptor is closed
/// unless it already is `to`.
fn bind(fd: OwnedFd, to: RawFd) -> nix::Result<()> {
	if fd.as_raw_fd() == to {
		let _ = fd.into_raw_fd();
		return Ok(());
	}
	unistd::dup2(fd.as_raw_fd(), to)?;
	Ok(())
}

fn wire_redirects(command: &Command) -> Result<(), ExecError> {
	if let Some(target) = command.input_target() {
		bind(open_target(target, None)?, libc::STDIN_FILENO)?;
	}
	if let Some((target, mode)) = command.output_target() {
		bind(open_target(target, Some(mode))?, libc::STDOUT_FILENO)?;
	}
	Ok(())
}

fn exec_program(program: &Program, command: &Command) -> Result<u8, ExecError> {
	match *program {
		Program::Builtin(handler) => {
			// A fresh reader over descriptor 0: `io::stdin()` may still hold
			// script lines the shell buffered before forking.
			let fd = unistd::dup(libc::STDIN_FILENO)?;
			let mut input = BufReader::new(File::from(unsafe { OwnedFd::from_raw_fd(fd) }));
			let mut output = io::stdout().lock();
			let code = handler(command, &mut input, &mut output)?;
			output.flush()?;
			Ok(code)
		},
		Program::External(ref path) => {
			let argv = command.argv()?;
			match unistd::execv(path, argv.as_slice()) {
				Ok(never) => match never {},
				Err(e) => Err(e.into()),
			}
		},
	}
}

/// Binds the pipe ends over whatever the stage's redirects left on the
/// standard descriptors, then runs it.
fn start(command: &Command, program: &Program, stdin: Option<OwnedFd>, stdout: Option<OwnedFd>) -> Result<u8, ExecError> {
	if let Some(fd) = stdin {
		bind(fd, libc::STDIN_FILENO)?;
	}
	if let Some(fd) = stdout {
		bind(fd, libc::STDOUT_FILENO)?;
	}
	exec_program(program, command)
}

fn exit_with(command: &Command, r: Result<u8, ExecError>) -> ! {
	let code = r.unwrap_or_else(|e| {
		match e {
			ExecError::NotFound(_) => eprintln!("{}", e),
			_ => eprintln!("-{}: {}: {}", global::SYSNAME, command.name, e),
		}
		e.exit_code()
	});
	let _ = io::stdout().flush();
	unsafe { libc::_exit(code as libc::c_int) }
}

fn do_run_stage(command: &Command, inherited: Option<OwnedFd>) -> Result<u8, ExecError> {
	let program = locate(command)?;
	wire_redirects(command)?;
	let next = match command.next {
		Some(ref next) => next,
		None => return start(command, &program, inherited, None),
	};

	let (read_end, write_end) = unistd::pipe()?;
	match unsafe { unistd::fork() }? {
		ForkResult::Child => {
			drop(read_end);
			let r = start(command, &program, inherited, Some(write_end));
			exit_with(command, r)
		},
		ForkResult::Parent { child } => {
			drop(write_end);
			drop(inherited);
			debug!(command = %command.name, %child, "started pipeline stage");
			job::wait_for(child)?;
			run_stage(next, Some(read_end))
		},
	}
}

/// Runs `command` and every stage after it inside the current (already
/// forked) process. Each stage with a successor gets its own child; this
/// process waits for it and then becomes the runner of the next stage, so
/// it ends up executing the last one. A stage's redirects are bound here
/// before the pipe ends, so a pipe end takes precedence over a redirect
/// on the same descriptor, and a redirect stays in effect for later
/// stages that do not rebind that descriptor.
fn run_stage(command: &Command, inherited: Option<OwnedFd>) -> ! {
	let r = do_run_stage(command, inherited);
	exit_with(command, r)
}

fn show_completions(command: &Command) {
	let last = command.stages().last().unwrap_or(command);
	let candidates: Vec<String> = match last.args.last() {
		None => search::complete(&SearchPath::from_env(), &last.name),
		Some(prefix) => SearchPath::new(OsStr::new(".")).entries_with_prefix(prefix).into_iter().collect(),
	};
	if !candidates.is_empty() {
		println!("{}", candidates.join("  "));
	}
}

pub fn eval(state: &mut global::State, command: &Command) -> Status {
	if state.show_parse {
		eprint!("{}", command);
	}
	if command.is_empty() {
		return Status::Success;
	}
	if command.auto_complete {
		show_completions(command);
		return Status::Success;
	}
	if let Some(func) = builtin::match_shell_builtin(command) {
		return func(state, command);
	}

	let _ = io::stdout().flush();
	match unsafe { unistd::fork() } {
		Ok(ForkResult::Child) => run_stage(command, None),
		Ok(ForkResult::Parent { child }) => {
			if command.background {
				debug!(command = %command.name, %child, "running in background");
			} else if let Err(e) = job::wait_for(child) {
				warn!(command = %command.name, %child, error = %e, "waiting for command failed");
			}
			Status::Success
		},
		Err(e) => {
			eprintln!("-{}: {}: {}", state.sysname, command.name, e.desc());
			Status::Unknown
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::parser::parse;
	use std::fs;
	use std::io::{Read, Seek, SeekFrom};
	use tempfile::TempDir;

	#[test]
	fn input_target_is_created_without_truncation() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("in.txt");
		let target = path.to_str().unwrap();

		drop(open_target(target, None).unwrap());
		assert_eq!(fs::read(&path).unwrap(), b"");

		fs::write(&path, b"kept").unwrap();
		let mut file = fs::File::from(open_target(target, None).unwrap());
		let mut buf = String::new();
		file.read_to_string(&mut buf).unwrap();
		assert_eq!(buf, "kept");
	}

	#[test]
	fn truncate_and_append_targets() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("out.txt");
		let target = path.to_str().unwrap();
		fs::write(&path, b"old\n").unwrap();

		let mut file = fs::File::from(open_target(target, Some(OutputMode::Append)).unwrap());
		file.write_all(b"new\n").unwrap();
		drop(file);
		assert_eq!(fs::read_to_string(&path).unwrap(), "old\nnew\n");

		let mut file = fs::File::from(open_target(target, Some(OutputMode::Truncate)).unwrap());
		file.write_all(b"x").unwrap();
		file.seek(SeekFrom::Start(0)).unwrap();
		let mut buf = String::new();
		file.read_to_string(&mut buf).unwrap();
		assert_eq!(buf, "x");
	}

	#[test]
	fn unopenable_target_is_an_error() {
		let err = open_target("/definitely/not/here/out.txt", Some(OutputMode::Truncate)).unwrap_err();
		assert_eq!(err.exit_code(), 1);
		assert!(err.to_string().starts_with("/definitely/not/here/out.txt: "));
	}

	#[test]
	fn builtins_are_located_before_the_search_path() {
		assert!(matches!(locate(&parse("uniq -c")), Ok(Program::Builtin(_))));
		for name in builtin::names().filter(|name| builtin::is_builtin(name)) {
			assert!(matches!(locate(&parse(name)), Ok(Program::Builtin(_))), "{}", name);
		}
		match locate(&parse("no-such-command-anywhere")) {
			Err(e @ ExecError::NotFound(_)) => {
				assert_eq!(e.to_string(), "command not found: no-such-command-anywhere");
				assert_eq!(e.exit_code(), 127);
			},
			_ => panic!("expected not found"),
		}
		assert!(matches!(locate(&parse("/bin/sh")), Ok(Program::External(_))));
	}

	#[test]
	fn blank_lines_do_not_spawn() {
		let mut state = global::State::new(false);
		assert_eq!(eval(&mut state, &parse("   ")), Status::Success);
		assert_eq!(eval(&mut state, &parse("exit")), Status::Exit);
	}
}
