//! Built-in commands.
//!
//! `cd` and `exit` change the shell itself and run in the shell process.
//! Everything else in this module runs after the orchestrator has forked
//! and wired the stage's descriptors, in the child's copy of the shell
//! image, so a built-in reads and writes its standard descriptors exactly
//! like an external program and needs no special casing for pipes or
//! redirects.

use std::io::{self, BufRead, Write};

use argh::{EarlyExit, FromArgs};
use nix::unistd;
use tracing::debug;

use crate::eval::Status;
use crate::global;
use crate::types::Command;

pub type ShellBuiltin = fn(&mut global::State, &Command) -> Status;

/// Handler for a forked built-in. The return value becomes the exit code
/// of the process it runs in.
pub type Handler = fn(&Command, &mut dyn BufRead, &mut dyn Write) -> io::Result<u8>;

const SHELL_BUILTINS: &[&str] = &["cd", "exit"];
const FORKED_BUILTINS: &[&str] = &["uniq", "chatroom", "wiseman", "myfactor"];

pub fn builtin_exit(_: &mut global::State, _: &Command) -> Status {
	Status::Exit
}

pub fn builtin_cd(state: &mut global::State, command: &Command) -> Status {
	let target = &command.args[0];
	match unistd::chdir(target.as_str()) {
		Ok(()) => debug!(dir = %target, "changed directory"),
		Err(errno) => eprintln!("-{}: {}: {}", state.sysname, command.name, errno.desc()),
	}
	Status::Success
}

/// Built-ins that run without forking. `cd` only counts when it has an
/// argument; a bare `cd` takes the ordinary path and is not found.
pub fn match_shell_builtin(command: &Command) -> Option<ShellBuiltin> {
	match command.name.as_str() {
		"exit" => Some(builtin_exit),
		"cd" if command.arg_count() > 0 => Some(builtin_cd),
		_ => None,
	}
}

pub fn is_builtin(name: &str) -> bool {
	FORKED_BUILTINS.contains(&name)
}

pub fn match_builtin(name: &str) -> Option<Handler> {
	match name {
		"uniq" => Some(builtin_uniq),
		"chatroom" => Some(builtin_chatroom),
		"wiseman" => Some(builtin_wiseman),
		"myfactor" => Some(builtin_myfactor),
		_ => None,
	}
}

pub fn names() -> impl Iterator<Item = &'static str> {
	SHELL_BUILTINS.iter().chain(FORKED_BUILTINS).copied()
}

/// Parses a built-in's arguments. On `--help` or bad usage the text has
/// already been printed and the exit code is returned as the error.
fn parse_args<T: FromArgs>(command: &Command, output: &mut dyn Write) -> Result<T, u8> {
	let args: Vec<&str> = command.args.iter().map(String::as_str).collect();
	T::from_args(&[command.name.as_str()], &args).map_err(|EarlyExit { output: text, status }| {
		match status {
			Ok(()) => {
				let _ = output.write_all(text.as_bytes());
				0
			},
			Err(()) => {
				eprintln!("{}", text.trim_end());
				1
			},
		}
	})
}

#[derive(FromArgs)]
/// Collapse adjacent duplicate lines of standard input.
struct UniqArgs {
	/// prefix each line with the number of times it occurred
	#[argh(switch, short = 'c')]
	count: bool,

	/// further arguments are accepted and ignored
	#[argh(positional, greedy)]
	rest: Vec<String>,
}

fn write_run(output: &mut dyn Write, line: &[u8], run: u64, with_count: bool) -> io::Result<()> {
	if with_count {
		write!(output, "{} ", run)?;
	}
	output.write_all(line)
}

pub fn builtin_uniq(command: &Command, input: &mut dyn BufRead, output: &mut dyn Write) -> io::Result<u8> {
	let opts: UniqArgs = match parse_args(command, output) {
		Ok(opts) => opts,
		Err(code) => return Ok(code),
	};
	if !opts.rest.is_empty() {
		debug!(ignored = ?opts.rest, "uniq reads standard input only");
	}
	let mut prev: Option<Vec<u8>> = None;
	let mut run = 0;
	loop {
		let mut line = Vec::new();
		if input.read_until(b'\n', &mut line)? == 0 {
			break;
		}
		if prev.as_ref() == Some(&line) {
			run += 1;
		} else {
			if let Some(p) = prev.replace(line) {
				write_run(output, &p, run, opts.count)?;
			}
			run = 1;
		}
	}
	if let Some(p) = prev {
		write_run(output, &p, run, opts.count)?;
	}
	Ok(0)
}

pub fn builtin_chatroom(_: &Command, _: &mut dyn BufRead, _: &mut dyn Write) -> io::Result<u8> {
	Ok(0)
}

pub fn builtin_wiseman(_: &Command, _: &mut dyn BufRead, _: &mut dyn Write) -> io::Result<u8> {
	Ok(0)
}

#[derive(FromArgs)]
/// Print the prime factors of a number.
struct FactorArgs {
	/// unsigned integer to factor
	#[argh(positional)]
	number: u64,
}

fn prime_factors(mut n: u64) -> Vec<u64> {
	let mut factors = vec![];
	let mut d = 2;
	while d <= n / d {
		while n % d == 0 {
			factors.push(d);
			n /= d;
		}
		d += 1;
	}
	if n > 1 {
		factors.push(n);
	}
	factors
}

pub fn builtin_myfactor(command: &Command, _: &mut dyn BufRead, output: &mut dyn Write) -> io::Result<u8> {
	let opts: FactorArgs = match parse_args(command, output) {
		Ok(opts) => opts,
		Err(code) => return Ok(code),
	};
	write!(output, "{}:", opts.number)?;
	for p in prime_factors(opts.number) {
		write!(output, " {}", p)?;
	}
	writeln!(output)?;
	Ok(0)
}
