//! `wd completions`: print a shell completion script.

use std::io::Write;

use clap::Args;
use clap_complete::Shell;

const BIN_NAME: &str = "wd";

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// bash, zsh, fish, elvish, or powershell.
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Render the script for `args.shell` into `out`.
pub fn write_completions(args: &CompletionsArgs, command: &mut clap::Command, out: &mut dyn Write) {
    clap_complete::generate(args.shell, command, BIN_NAME, out);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{Arg, Command};

    #[test]
    fn bash_script_names_the_binary_and_subcommands() {
        let mut command = Command::new(BIN_NAME)
            .subcommand(Command::new("ready").arg(Arg::new("turf").long("turf")));
        let mut buf = Vec::new();
        write_completions(&CompletionsArgs { shell: Shell::Bash }, &mut command, &mut buf);

        let script = String::from_utf8(buf).unwrap();
        assert!(script.contains("_wd()"));
        assert!(script.contains("ready"));
        assert!(script.contains("--turf"));
    }
}
