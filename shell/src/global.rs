pub const SYSNAME: &str = "shellax";

pub struct State {
	pub sysname: String,
	/// Dump every parsed chain to stderr before running it.
	pub show_parse: bool,
}

impl State {
	pub fn new(show_parse: bool) -> State {
		State { sysname: SYSNAME.to_string(), show_parse: show_parse }
	}
}
