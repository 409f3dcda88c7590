//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Reconstruct HTTP/2 stream lifetimes from httpd error logs.
///
/// Reads a log written with `LogLevel http2:trace2` (or at least `debug`),
/// follows each stream from creation to cleanup and reports when workers
/// were taken and released.
#[derive(Debug, Parser)]
#[command(name = "h2wtf", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show the lifetime of every stream.
    Summary {
        /// The httpd error log to analyze.
        log: PathBuf,

        /// Only show matching streams (`child-session-stream`, `session-stream`,
        /// `child-` or `stream`). May be repeated.
        #[arg(short = 'S', long = "stream", value_name = "ID")]
        streams: Vec<String>,

        /// Attribute FRAME records to their streams.
        #[arg(short = 'F', long)]
        frames: bool,

        /// Print every record attributed to a shown stream while collecting.
        #[arg(long, conflicts_with = "json")]
        echo: bool,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print selected log records.
    Lines {
        /// The httpd error log to read.
        log: PathBuf,

        #[command(flatten)]
        select: LineSelection,
    },
}

/// Which records `lines` prints; all protocol records when nothing is set.
#[derive(Debug, Default, Args)]
#[group(multiple = false)]
pub struct LineSelection {
    /// Only FRAME records.
    #[arg(short = 'F', long)]
    pub frames: bool,

    /// Only records matched by a lifecycle rule.
    #[arg(short = 'L', long)]
    pub lifetime: bool,

    /// Only records naming this stream (`session-stream` or a suffix of it).
    #[arg(short = 'S', long, value_name = "ID")]
    pub stream: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn summary_collects_repeated_stream_filters() {
        let cli = Cli::parse_from(["h2wtf", "summary", "error.log", "-S", "1-3", "--stream", "7"]);
        let Some(Commands::Summary { log, streams, frames, echo, json }) = cli.command else {
            panic!("expected summary");
        };
        assert_eq!(log, PathBuf::from("error.log"));
        assert_eq!(streams, ["1-3", "7"]);
        assert!(!frames && !echo && !json);
    }

    #[test]
    fn line_selections_are_exclusive() {
        let result = Cli::try_parse_from(["h2wtf", "lines", "error.log", "-F", "-L"]);
        assert!(result.is_err());

        let cli = Cli::try_parse_from(["h2wtf", "-v", "lines", "error.log", "-S", "2-7"]).unwrap();
        assert!(cli.verbose);
        let Some(Commands::Lines { select, .. }) = cli.command else {
            panic!("expected lines");
        };
        assert_eq!(select.stream.as_deref(), Some("2-7"));
    }
}
