pub mod commands;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::config::interval::parse_interval;
use crate::domain::Frequency;

#[derive(Parser)]
#[command(name = "tributary")]
#[command(about = "A tiered RSS/Atom subscription engine", long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.config/tributary/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Poll subscriptions in the foreground until interrupted
    Run {
        /// Delay before the first poll (e.g., "0", "30s", "5m")
        #[arg(long, value_parser = parse_duration)]
        startup_delay: Option<Duration>,
    },
    /// Subscribe to a feed, or to a page that links to one
    Add {
        /// URL of the feed or page
        url: String,

        /// Put the subscription in this top-level category
        #[arg(short = 'C', long)]
        category: Option<String>,
    },
    /// Unsubscribe from a feed
    Remove {
        /// URL of the feed to remove
        url: String,

        /// Leave the cache file on disk
        #[arg(long)]
        keep_cache: bool,
    },
    /// Create a top-level category
    Category {
        title: String,
    },
    /// List subscriptions with unread counts
    List,
    /// Fetch every subscription now
    Refresh,
    /// Set how often a feed is polled
    Frequency {
        /// URL of the feed
        url: String,

        /// auto, high, low or none
        frequency: Frequency,
    },
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    parse_interval(s).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_add_with_category() {
        let cli = Cli::try_parse_from(["tributary", "add", "https://a.example/", "-C", "News"]).unwrap();
        match cli.command {
            Commands::Add { url, category } => {
                assert_eq!(url, "https://a.example/");
                assert_eq!(category.as_deref(), Some("News"));
            }
            _ => panic!("expected add"),
        }
    }

    #[test]
    fn test_parse_frequency_and_delay() {
        let cli = Cli::try_parse_from(["tributary", "frequency", "u", "never"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Frequency { frequency: Frequency::None, .. }
        ));

        let cli = Cli::try_parse_from(["tributary", "run", "--startup-delay", "2m"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Run { startup_delay: Some(d) } if d == Duration::from_secs(120)
        ));

        assert!(Cli::try_parse_from(["tributary", "frequency", "u", "sometimes"]).is_err());
    }
}
