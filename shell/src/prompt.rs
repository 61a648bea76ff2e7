//! Line input for the prompt loop.
//!
//! On a terminal the reader switches stdin to non-canonical, no-echo mode
//! for the duration of one line and does its own echoing, backspace,
//! history recall and tab handling. Anything else (a pipe, a file) is read
//! line by line with no prompt.

use std::collections::VecDeque;
use std::env;
use std::io::{self, IsTerminal, Read, Write};
use std::os::fd::AsFd;

use nix::sys::termios::{self, LocalFlags, SetArg, SpecialCharacterIndices, Termios};
use nix::unistd;
use tracing::warn;

const HISTORY_CAPACITY: usize = 100;
const MAX_LINE: usize = 4096;

const CTRL_D: u8 = 4;
const BACKSPACE: u8 = 8;
const TAB: u8 = 9;
const ESC: u8 = 27;
const DEL: u8 = 127;

#[derive(Debug, PartialEq, Eq)]
pub enum Input {
	Line(String),
	EndOfInput,
}

/// Most recent lines, oldest first. Blank lines and immediate repeats
/// are not recorded.
#[derive(Debug)]
pub struct History {
	entries: VecDeque<String>,
	capacity: usize,
}

impl History {
	pub fn new(capacity: usize) -> History {
		History { entries: VecDeque::with_capacity(capacity), capacity: capacity }
	}

	pub fn push(&mut self, line: &str) {
		let line = line.trim();
		if line.is_empty() || self.capacity == 0 {
			return;
		}
		if self.entries.back().map(String::as_str) == Some(line) {
			return;
		}
		if self.entries.len() == self.capacity {
			self.entries.pop_front();
		}
		self.entries.push_back(line.to_string());
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn get(&self, i: usize) -> Option<&str> {
		self.entries.get(i).map(String::as_str)
	}
}

/// Restores the saved terminal attributes when dropped.
struct RawMode {
	saved: Termios,
}

impl RawMode {
	fn enter() -> nix::Result<RawMode> {
		let stdin = io::stdin();
		let saved = termios::tcgetattr(stdin.as_fd())?;
		let mut raw = saved.clone();
		raw.local_flags.remove(LocalFlags::ICANON | LocalFlags::ECHO);
		raw.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
		raw.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
		termios::tcsetattr(stdin.as_fd(), SetArg::TCSANOW, &raw)?;
		Ok(RawMode { saved: saved })
	}
}

impl Drop for RawMode {
	fn drop(&mut self) {
		if let Err(e) = termios::tcsetattr(io::stdin().as_fd(), SetArg::TCSANOW, &self.saved) {
			warn!(error = %e, "restoring terminal attributes failed");
		}
	}
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Escape { None, Started, Bracket }

#[derive(Debug, PartialEq, Eq)]
enum Key {
	Pending,
	Submit,
	EndOfInput,
}

/// Keystroke state for one raw-mode line.
struct Editor<'h> {
	buf: Vec<u8>,
	history: &'h History,
	/// Index into history; `history.len()` means the line being typed.
	pos: usize,
	draft: Vec<u8>,
	escape: Escape,
}

impl<'h> Editor<'h> {
	fn new(history: &'h History) -> Editor<'h> {
		Editor { buf: vec![], history: history, pos: history.len(), draft: vec![], escape: Escape::None }
	}

	fn redraw(&self, out: &mut dyn Write, prompt: &str) -> io::Result<()> {
		out.write_all(b"\r\x1b[K")?;
		out.write_all(prompt.as_bytes())?;
		out.write_all(&self.buf)
	}

	fn recall(&mut self, pos: usize, out: &mut dyn Write, prompt: &str) -> io::Result<()> {
		if self.pos == self.history.len() {
			self.draft = self.buf.clone();
		}
		self.pos = pos;
		self.buf = match self.history.get(pos) {
			Some(line) => line.as_bytes().to_vec(),
			None => self.draft.clone(),
		};
		self.redraw(out, prompt)
	}

	fn erase_char(&mut self) {
		while let Some(b) = self.buf.pop() {
			if b & 0xc0 != 0x80 {
				break;
			}
		}
	}

	fn key(&mut self, b: u8, out: &mut dyn Write, prompt: &str) -> io::Result<Key> {
		match self.escape {
			Escape::Started => {
				self.escape = if b == b'[' { Escape::Bracket } else { Escape::None };
				return Ok(Key::Pending);
			},
			Escape::Bracket => {
				self.escape = Escape::None;
				match b {
					b'A' if self.pos > 0 => {
						let pos = self.pos - 1;
						self.recall(pos, out, prompt)?;
					},
					b'B' if self.pos < self.history.len() => {
						let pos = self.pos + 1;
						self.recall(pos, out, prompt)?;
					},
					_ => {},
				}
				return Ok(Key::Pending);
			},
			Escape::None => {},
		}
		match b {
			CTRL_D => return Ok(Key::EndOfInput),
			ESC => self.escape = Escape::Started,
			TAB => {
				self.buf.push(b'?');
				out.write_all(b"?\n")?;
				return Ok(Key::Submit);
			},
			DEL | BACKSPACE => {
				if !self.buf.is_empty() {
					self.erase_char();
					out.write_all(b"\x08 \x08")?;
				}
			},
			b'\n' | b'\r' => {
				out.write_all(b"\n")?;
				return Ok(Key::Submit);
			},
			_ if b < 0x20 => {},
			_ => {
				self.buf.push(b);
				out.write_all(&[b])?;
				if self.buf.len() >= MAX_LINE {
					out.write_all(b"\n")?;
					return Ok(Key::Submit);
				}
			},
		}
		Ok(Key::Pending)
	}

	fn into_line(self) -> String {
		String::from_utf8_lossy(&self.buf).into_owned()
	}
}

/// Descriptor 0 with no buffering, so the commands a line starts find
/// standard input positioned right after that line.
struct RawStdin;

impl Read for RawStdin {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		loop {
			match unistd::read(libc::STDIN_FILENO, buf) {
				Err(nix::errno::Errno::EINTR) => continue,
				r => return r.map_err(io::Error::from),
			}
		}
	}
}

/// Reads one byte at a time up to and including the next newline.
fn read_unbuffered<R: Read>(r: &mut R) -> io::Result<Input> {
	let mut buf = Vec::new();
	let mut byte = [0u8; 1];
	loop {
		if r.read(&mut byte)? == 0 {
			if buf.is_empty() {
				return Ok(Input::EndOfInput);
			}
			break;
		}
		if byte[0] == b'\n' {
			break;
		}
		buf.push(byte[0]);
	}
	if buf.last() == Some(&b'\r') {
		buf.pop();
	}
	Ok(Input::Line(String::from_utf8_lossy(&buf).into_owned()))
}

pub struct LineReader {
	history: History,
	interactive: bool,
}

impl LineReader {
	pub fn new() -> LineReader {
		LineReader { history: History::new(HISTORY_CAPACITY), interactive: io::stdin().is_terminal() }
	}

	fn read_raw(&self, prompt: &str) -> io::Result<Input> {
		let _raw = RawMode::enter()?;
		let stdout = io::stdout();
		let mut out = stdout.lock();
		out.write_all(prompt.as_bytes())?;
		out.flush()?;

		let mut editor = Editor::new(&self.history);
		let mut byte = [0u8; 1];
		loop {
			let n = match unistd::read(libc::STDIN_FILENO, &mut byte) {
				Ok(n) => n,
				Err(nix::errno::Errno::EINTR) => continue,
				Err(e) => return Err(e.into()),
			};
			if n == 0 {
				return Ok(Input::EndOfInput);
			}
			let key = editor.key(byte[0], &mut out, prompt)?;
			out.flush()?;
			match key {
				Key::Pending => {},
				Key::Submit => return Ok(Input::Line(editor.into_line())),
				Key::EndOfInput => return Ok(Input::EndOfInput),
			}
		}
	}

	fn read_plain(&self) -> io::Result<Input> {
		read_unbuffered(&mut RawStdin)
	}

	pub fn read_line(&mut self, prompt: &str) -> io::Result<Input> {
		let input = if self.interactive {
			self.read_raw(prompt)?
		} else {
			self.read_plain()?
		};
		if let Input::Line(ref line) = input {
			self.history.push(line);
		}
		Ok(input)
	}
}

/// `user@host:cwd sysname$ `
pub fn prompt_string(sysname: &str) -> String {
	let user = env::var("USER").unwrap_or_default();
	let host = unistd::gethostname().map(|h| h.to_string_lossy().into_owned()).unwrap_or_default();
	let cwd = env::current_dir().map(|d| d.display().to_string()).unwrap_or_default();
	format!("{}@{}:{} {}$ ", user, host, cwd, sysname)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn feed(history: &History, keys: &[u8]) -> (Key, String, String) {
		let mut editor = Editor::new(history);
		let mut out = Vec::new();
		let mut last = Key::Pending;
		for &b in keys {
			last = editor.key(b, &mut out, "$ ").unwrap();
			if last != Key::Pending {
				break;
			}
		}
		(last, editor.into_line(), String::from_utf8(out).unwrap())
	}

	#[test]
	fn history_is_bounded() {
		let mut h = History::new(3);
		for line in &["a", "b", "c", "d"] {
			h.push(line);
		}
		assert_eq!(h.len(), 3);
		assert_eq!(h.get(0), Some("b"));
		assert_eq!(h.get(2), Some("d"));
	}

	#[test]
	fn history_skips_blank_and_repeated_lines() {
		let mut h = History::new(10);
		h.push("ls");
		h.push("ls ");
		h.push("   ");
		h.push("pwd");
		h.push("ls");
		assert_eq!(h.len(), 3);
		assert_eq!(h.get(2), Some("ls"));
	}

	#[test]
	fn typing_and_enter() {
		let h = History::new(10);
		let (key, line, out) = feed(&h, b"ls -l\n");
		assert_eq!(key, Key::Submit);
		assert_eq!(line, "ls -l");
		assert_eq!(out, "ls -l\n");
	}

	#[test]
	fn backspace_erases() {
		let h = History::new(10);
		let (_, line, out) = feed(&h, b"lss\x7f\r");
		assert_eq!(line, "ls");
		assert!(out.contains("\x08 \x08"));
		let (_, line, _) = feed(&h, "é\x7fa\n".as_bytes());
		assert_eq!(line, "a");
	}

	#[test]
	fn tab_requests_completion() {
		let h = History::new(10);
		let (key, line, _) = feed(&h, b"ec\t");
		assert_eq!(key, Key::Submit);
		assert_eq!(line, "ec?");
	}

	#[test]
	fn ctrl_d_ends_input() {
		let h = History::new(10);
		assert_eq!(feed(&h, b"ls\x04").0, Key::EndOfInput);
	}

	#[test]
	fn arrows_walk_history() {
		let mut h = History::new(10);
		h.push("first");
		h.push("second");
		let (_, line, _) = feed(&h, b"\x1b[A\x1b[A\n");
		assert_eq!(line, "first");
		let (_, line, _) = feed(&h, b"dr\x1b[A\x1b[B\n");
		assert_eq!(line, "dr");
		// letters outside an escape sequence are ordinary input
		let (_, line, _) = feed(&h, b"ABCD\x1b[C\n");
		assert_eq!(line, "ABCD");
	}

	#[test]
	fn plain_lines_stop_at_the_newline() {
		let mut input = io::Cursor::new(b"echo a | uniq\r\nrest\nlast".to_vec());
		assert_eq!(read_unbuffered(&mut input).unwrap(), Input::Line("echo a | uniq".to_string()));
		assert_eq!(input.position(), 15);
		assert_eq!(read_unbuffered(&mut input).unwrap(), Input::Line("rest".to_string()));
		assert_eq!(read_unbuffered(&mut input).unwrap(), Input::Line("last".to_string()));
		assert_eq!(read_unbuffered(&mut input).unwrap(), Input::EndOfInput);
	}
}
