//! Command-line surface of the watcher binary.

use std::path::PathBuf;

use clap::Parser;

/// Watches a document root and runs a worker command on change bursts.
#[derive(Debug, Parser)]
#[command(
    name = "edigate-watch",
    about = "Watches a document root and triggers worker runs on filesystem activity",
    override_usage = "edigate-watch [OPTIONS] <COMMAND> [COMMAND ARGS]..."
)]
pub struct WatchArgs {
    /// Enable verbose debugging output.
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Log human-readable lines for a terminal instead of JSON.
    #[arg(short = 't', long = "terminal")]
    pub terminal: bool,

    /// Ignore files and directories matching this regular expression.
    #[arg(short = 'x', long = "exclude", value_name = "REGEX")]
    pub exclude: Option<String>,

    /// The path to watch.
    #[arg(short = 'p', long = "path", value_name = "PATH", default_value = ".")]
    pub path: PathBuf,

    /// Intake file extensions recognised for processing.
    #[arg(
        long = "extension",
        value_name = "EXT",
        default_values_t = [String::from("xml"), String::from("json")]
    )]
    pub extensions: Vec<String>,

    /// Originator mailbox for notifications.
    #[arg(long, env = "EDIGATE_NOTIFY_FROM", default_value = "edigate@localhost")]
    pub notify_from: String,

    /// Operator mailbox for notifications.
    #[arg(long, env = "EDIGATE_NOTIFY_TO", default_value = "operator@localhost")]
    pub notify_to: String,

    /// Local mail delivery command; notifications go to the log without it.
    #[arg(long, env = "EDIGATE_MAIL_COMMAND")]
    pub mail_command: Option<String>,

    /// Worker command executed on each triggered run, with its arguments.
    #[arg(value_name = "COMMAND", trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_original_flag_surface() {
        let args = WatchArgs::parse_from([
            "edigate-watch",
            "-v",
            "-t",
            "-x",
            r"\.tmp$",
            "-p",
            "/srv/edi/in",
            "edigate-import",
            "--partner",
            "tcp://10.0.0.4:30770",
        ]);
        assert!(args.verbose);
        assert!(args.terminal);
        assert_eq!(args.exclude.as_deref(), Some(r"\.tmp$"));
        assert_eq!(args.path, PathBuf::from("/srv/edi/in"));
        assert_eq!(
            args.command,
            vec!["edigate-import", "--partner", "tcp://10.0.0.4:30770"]
        );
    }

    #[test]
    fn defaults_to_the_current_directory() {
        let args = WatchArgs::parse_from(["edigate-watch", "worker"]);
        assert_eq!(args.path, PathBuf::from("."));
        assert!(!args.verbose);
        assert_eq!(args.extensions, vec!["xml", "json"]);
    }

    #[test]
    fn command_may_be_absent_at_parse_time() {
        // Missing commands are reported by main with exit code 1 rather
        // than by the parser.
        let args = WatchArgs::parse_from(["edigate-watch"]);
        assert!(args.command.is_empty());
    }
}
