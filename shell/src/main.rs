use std::io::{self, IsTerminal, Write};

use argh::FromArgs;
use tracing_subscriber::EnvFilter;

use shellax::eval::{self, Status};
use shellax::prompt::{self, Input};
use shellax::{global, job, parser};

const LOG_ENV: &str = "SHELLAX_LOG";

#[derive(FromArgs)]
/// A small interactive shell with pipes and redirection.
struct Args {
	/// run a single command line and exit
	#[argh(option, short = 'c')]
	command: Option<String>,

	/// print every parsed command chain to stderr before running it
	#[argh(switch)]
	show_parse: bool,
}

fn init_logging() {
	let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(io::stderr)
		.with_ansi(false)
		.init();
}

fn main() {
	let args: Args = argh::from_env();
	init_logging();

	let mut state = global::State::new(args.show_parse);
	if let Some(line) = args.command {
		let command = parser::parse(&line);
		eval::eval(&mut state, &command);
		return;
	}

	let mut reader = prompt::LineReader::new();
	loop {
		job::reap_background();
		let prompt = prompt::prompt_string(&state.sysname);
		let line = match reader.read_line(&prompt) {
			Ok(Input::Line(line)) => line,
			Ok(Input::EndOfInput) => break,
			Err(e) => {
				eprintln!("-{}: {}", state.sysname, e);
				break;
			},
		};
		let command = parser::parse(&line);
		if eval::eval(&mut state, &command) == Status::Exit {
			break;
		}
	}

	if io::stdin().is_terminal() {
		let mut stdout = io::stdout();
		let _ = writeln!(stdout);
		let _ = stdout.flush();
	}
}
