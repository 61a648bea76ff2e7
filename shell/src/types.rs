use std::ffi::{CString, NulError};
use std::fmt;

pub const REDIRECT_INPUT: usize = 0;
pub const REDIRECT_TRUNCATE: usize = 1;
pub const REDIRECT_APPEND: usize = 2;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum OutputMode { Truncate, Append }

/// One pipeline stage. Stages after the first hang off `next`.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct Command {
	pub name: String,
	pub background: bool,
	pub auto_complete: bool,
	pub args: Vec<String>,
	/// Input, truncate and append targets, in that order.
	pub redirects: [Option<String>; 3],
	pub next: Option<Box<Command>>,
}

pub struct Stages<'a> {
	cur: Option<&'a Command>,
}

impl<'a> Iterator for Stages<'a> {
	type Item = &'a Command;

	fn next(&mut self) -> Option<&'a Command> {
		let cur = self.cur?;
		self.cur = cur.next.as_deref();
		Some(cur)
	}
}

impl Command {
	pub fn arg_count(&self) -> usize {
		self.args.len()
	}

	pub fn is_empty(&self) -> bool {
		self.name.is_empty()
	}

	pub fn stages(&self) -> Stages<'_> {
		Stages { cur: Some(self) }
	}

	pub fn argv(&self) -> Result<Vec<CString>, NulError> {
		let mut argv = Vec::with_capacity(self.args.len() + 1);
		argv.push(CString::new(self.name.as_str())?);
		for arg in &self.args {
			argv.push(CString::new(arg.as_str())?);
		}
		Ok(argv)
	}

	pub fn input_target(&self) -> Option<&str> {
		self.redirects[REDIRECT_INPUT].as_deref()
	}

	/// Truncate shadows append when a stage names both.
	pub fn output_target(&self) -> Option<(&str, OutputMode)> {
		if let Some(ref t) = self.redirects[REDIRECT_TRUNCATE] {
			Some((t.as_str(), OutputMode::Truncate))
		} else {
			self.redirects[REDIRECT_APPEND].as_deref().map(|t| (t, OutputMode::Append))
		}
	}
}

fn yes_no(b: bool) -> &'static str {
	if b { "yes" } else { "no" }
}

impl fmt::Display for Command {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		writeln!(f, "Command: <{}>", self.name)?;
		writeln!(f, "\tIs Background: {}", yes_no(self.background))?;
		writeln!(f, "\tNeeds Auto-complete: {}", yes_no(self.auto_complete))?;
		writeln!(f, "\tRedirects:")?;
		for (i, r) in self.redirects.iter().enumerate() {
			writeln!(f, "\t\t{}: {}", i, r.as_deref().unwrap_or("N/A"))?;
		}
		writeln!(f, "\tArguments ({}):", self.arg_count())?;
		for (i, arg) in self.args.iter().enumerate() {
			writeln!(f, "\t\tArg {}: {}", i, arg)?;
		}
		if let Some(ref next) = self.next {
			writeln!(f, "\tPiped to:")?;
			write!(f, "{}", next)?;
		}
		Ok(())
	}
}
