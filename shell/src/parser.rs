use crate::types::{Command, REDIRECT_APPEND, REDIRECT_INPUT, REDIRECT_TRUNCATE};

#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
struct LineFlags {
	background: bool,
	auto_complete: bool,
}

struct Parser<'a> {
	line: &'a str,
	i: usize,
}

fn is_whitespace(c: u8) -> bool {
	match c {
		b' ' | b'\t' | b'\n' | b'\r' => true,
		_ => false,
	}
}

/// Trims the line and peels off a trailing `?` or `&`.
fn trim(line: &str) -> (&str, LineFlags) {
	let line = line.trim_matches(|c: char| c.is_ascii() && is_whitespace(c as u8));
	let mut flags = LineFlags::default();
	match line.as_bytes().last() {
		Some(&b'?') => flags.auto_complete = true,
		Some(&b'&') => flags.background = true,
		_ => return (line, flags),
	}
	(&line[.. line.len() - 1], flags)
}

fn strip_quotes(word: &str) -> &str {
	let b = word.as_bytes();
	let len = b.len();
	if len > 2 && (b[0] == b'"' || b[0] == b'\'') && b[len - 1] == b[0] {
		&word[1 .. len - 1]
	} else {
		word
	}
}

impl<'a> Parser<'a> {
	fn proceed_while<F>(&mut self, f: F) where F: Fn(u8) -> bool {
		while let Some(c) = self.line.as_bytes().get(self.i) {
			if !f(*c) { break; }
			self.i += 1;
		}
	}

	fn skip_whitespaces(&mut self) {
		self.proceed_while(is_whitespace);
	}

	fn read_word(&mut self) -> &'a str {
		self.skip_whitespaces();
		let orig = self.i;
		self.proceed_while(|c| !is_whitespace(c));
		&self.line[orig .. self.i]
	}

	fn parse_redirect(&mut self, word: &str, command: &mut Command) -> bool {
		let (slot, rest) = if let Some(rest) = word.strip_prefix(">>") {
			(REDIRECT_APPEND, rest)
		} else if let Some(rest) = word.strip_prefix('>') {
			(REDIRECT_TRUNCATE, rest)
		} else if let Some(rest) = word.strip_prefix('<') {
			(REDIRECT_INPUT, rest)
		} else {
			return false;
		};
		// The target is glued to the operator; a bare operator names "".
		command.redirects[slot] = Some(rest.to_string());
		true
	}

	fn parse_command(&mut self, flags: LineFlags) -> Command {
		let mut command = Command {
			name: self.read_word().to_string(),
			background: flags.background,
			auto_complete: flags.auto_complete,
			..Command::default()
		};
		if command.name.is_empty() {
			return command;
		}

		loop {
			let word = self.read_word();
			if word.is_empty() {
				break;
			}
			match word {
				"|" => {
					self.skip_whitespaces();
					let mut rest = Parser { line: &self.line[self.i ..], i: 0 };
					command.next = Some(Box::new(rest.parse_command(flags)));
					break;
				},
				"&" => continue,
				_ => {},
			}
			if self.parse_redirect(word, &mut command) {
				continue;
			}
			command.args.push(strip_quotes(word).to_string());
		}
		command
	}
}

pub fn parse(line: &str) -> Command {
	let (line, flags) = trim(line);
	let mut parser = Parser { line: line, i: 0 };
	parser.parse_command(flags)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::OutputMode;

	fn names(c: &Command) -> Vec<&str> {
		c.stages().map(|s| s.name.as_str()).collect()
	}

	#[test]
	fn blank_lines_are_empty_commands() {
		for line in &["", "   ", "\t \n"] {
			let c = parse(line);
			assert!(c.is_empty());
			assert_eq!(c.arg_count(), 0);
			assert!(c.next.is_none());
		}
	}

	#[test]
	fn name_and_arguments() {
		let c = parse("  ls   -l\t/tmp  ");
		assert_eq!(c.name, "ls");
		assert_eq!(c.args, ["-l", "/tmp"]);
		assert!(!c.background);
		assert!(!c.auto_complete);
	}

	#[test]
	fn three_stage_pipeline() {
		let c = parse("a | b | c");
		assert_eq!(names(&c), ["a", "b", "c"]);
		assert!(c.stages().all(|s| s.args.is_empty()));
	}

	#[test]
	fn pipe_ends_the_current_stage() {
		let c = parse("cat -n file |  grep x  y| wc -l");
		assert_eq!(c.args, ["-n", "file"]);
		let grep = c.next.as_ref().unwrap();
		// `y|` is one token, so the pipe is not a separator there
		assert_eq!(grep.args, ["x", "y|", "wc", "-l"]);
		assert!(grep.next.is_none());
	}

	#[test]
	fn quotes_are_stripped_once() {
		let c = parse(r#"echo 'x' "y" "" 'a" "b 'c 'quoted'' ''x''"#);
		assert_eq!(c.args, ["x", "y", "\"\"", "'a\"", "\"b", "'c", "quoted'", "'x'"]);
	}

	#[test]
	fn redirect_slots() {
		let c = parse("sort <in.txt >out.txt >>log.txt");
		assert_eq!(c.input_target(), Some("in.txt"));
		assert_eq!(c.redirects[REDIRECT_APPEND].as_deref(), Some("log.txt"));
		assert_eq!(c.output_target(), Some(("out.txt", OutputMode::Truncate)));
		assert!(c.args.is_empty());
	}

	#[test]
	fn bare_operator_has_an_empty_target() {
		let c = parse("cat < in.txt >> out.txt | wc");
		assert_eq!(c.input_target(), Some(""));
		assert_eq!(c.output_target(), Some(("", OutputMode::Append)));
		assert_eq!(c.args, ["in.txt", "out.txt"]);
		assert_eq!(names(&c), ["cat", "wc"]);

		let c = parse("cat > | wc");
		assert_eq!(c.output_target(), Some(("", OutputMode::Truncate)));
		assert!(c.args.is_empty());
		assert_eq!(names(&c), ["cat", "wc"]);
	}

	#[test]
	fn background_flag_reaches_every_stage() {
		let c = parse("sleep 1 | cat &");
		assert_eq!(names(&c), ["sleep", "cat"]);
		assert!(c.stages().all(|s| s.background));
		assert_eq!(c.args, ["1"]);
		assert!(c.next.as_ref().unwrap().args.is_empty());

		let c = parse("sleep 1&");
		assert!(c.background);
		assert_eq!(c.args, ["1"]);
	}

	#[test]
	fn lone_ampersand_in_the_middle_is_dropped() {
		let c = parse("a & b");
		assert_eq!(c.args, ["b"]);
		assert!(!c.background);
	}

	#[test]
	fn autocomplete_flag() {
		let c = parse("ec?");
		assert!(c.auto_complete);
		assert_eq!(c.name, "ec");
		let c = parse("ls | gr ?");
		assert!(c.stages().all(|s| s.auto_complete));
		assert!(c.next.as_ref().unwrap().args.is_empty());
	}
}
