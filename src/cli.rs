use clap::builder::PossibleValuesParser;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::downloader::AUDIO_CODECS;

#[derive(Parser)]
#[command(name = "trackgrab")]
#[command(version = "0.1.0")]
#[command(about = "Download tracks by title, one at a time or from a list")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Only print warnings, errors and summaries
    #[arg(long, short = 'q', default_value_t = false, global = true)]
    pub quiet: bool,

    /// Print debug output
    #[arg(long, short = 'v', default_value_t = false, global = true)]
    pub verbose: bool,

    /// Emit one JSON object per event instead of text
    #[arg(long, default_value_t = false, global = true)]
    pub json: bool,

    /// Where the failure log is kept
    #[arg(long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download a single track by title
    Single {
        /// Song title, e.g. "Daft Punk - Get Lucky" (quotes optional)
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,
        /// Parent of the `downloads_single` folder (defaults to the current directory)
        #[arg(long)]
        root: Option<PathBuf>,
        #[command(flatten)]
        download: DownloadArgs,
    },
    /// Download every title listed in a text file, one per line
    Batch {
        file: PathBuf,
        /// Parent of the output folder (defaults to the list's own folder)
        #[arg(long)]
        root: Option<PathBuf>,
        /// Don't record failed titles in the failure log
        #[arg(long = "no-log", default_value_t = false)]
        no_log: bool,
        #[command(flatten)]
        download: DownloadArgs,
    },
    /// Strip trailing `[id]` tokens from downloaded file names
    Clean {
        dir: PathBuf,
        #[arg(short, long, default_value = "mp3")]
        extension: String,
        /// Show what would be renamed without touching anything
        #[arg(long = "dry-run", default_value_t = false)]
        dry_run: bool,
    },
    /// Write a Spotify playlist's tracks to a batch list file
    Export {
        /// Playlist link or URI
        playlist: String,
        #[arg(short, long, default_value = "playlist.txt")]
        output: PathBuf,
        /// Log in as a user (needed for private or collaborative playlists)
        #[arg(long = "user-auth", default_value_t = false)]
        user_auth: bool,
    },
    /// Re-run every title recorded in the failure log
    Retry {
        #[command(flatten)]
        download: DownloadArgs,
    },
    /// Show or clear the failure log
    Errors {
        #[arg(long, default_value_t = false)]
        clear: bool,
    },
}

#[derive(Args, Clone, Debug)]
pub struct DownloadArgs {
    /// Audio codec passed to yt-dlp (`best` keeps the source format)
    #[arg(
        short,
        long,
        default_value = "mp3",
        ignore_case = true,
        value_parser = PossibleValuesParser::new(AUDIO_CODECS)
    )]
    pub format: String,
    #[arg(long, default_value = "192K")]
    pub quality: String,
    #[arg(long, default_value_t = 10)]
    pub retries: u32,
    #[arg(long = "fragment-retries", default_value_t = 10)]
    pub fragment_retries: u32,
    #[arg(long = "yt-dlp", default_value = "yt-dlp")]
    pub program: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Console behaviour derived from the global flags
#[derive(Clone, Debug)]
pub struct HeadlessConfig {
    pub enabled: bool,
    pub quiet: bool,
    pub verbose: bool,
    pub output_format: OutputFormat,
}

impl HeadlessConfig {
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            enabled: cli.quiet || cli.verbose || cli.json,
            quiet: cli.quiet,
            verbose: cli.verbose,
            output_format: if cli.json {
                OutputFormat::Json
            } else {
                OutputFormat::Text
            },
        }
    }
}

/// Settings handed to the yt-dlp resolver
#[derive(Clone, Debug)]
pub struct DownloadOptions {
    pub program: String,
    pub codec: String,
    pub quality: String,
    pub retries: u32,
    pub fragment_retries: u32,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            program: "yt-dlp".to_string(),
            codec: "mp3".to_string(),
            quality: "192K".to_string(),
            retries: 10,
            fragment_retries: 10,
        }
    }
}

impl From<&DownloadArgs> for DownloadOptions {
    fn from(args: &DownloadArgs) -> Self {
        Self {
            program: args.program.clone(),
            codec: args.format.to_lowercase(),
            quality: args.quality.clone(),
            retries: args.retries,
            fragment_retries: args.fragment_retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_defaults() {
        let cli = Cli::parse_from(["trackgrab", "batch", "list.txt"]);
        match &cli.command {
            Commands::Batch { file, root, no_log, download } => {
                assert_eq!(file, &PathBuf::from("list.txt"));
                assert!(root.is_none());
                assert!(!*no_log);
                let options = DownloadOptions::from(download);
                assert_eq!(options.codec, "mp3");
                assert_eq!(options.quality, "192K");
                assert_eq!(options.retries, 10);
                assert_eq!(options.fragment_retries, 10);
            }
            _ => panic!("expected batch command"),
        }
    }

    #[test]
    fn test_headless_config() {
        let cli = Cli::parse_from(["trackgrab", "--json", "errors"]);
        let config = HeadlessConfig::from_cli(&cli);
        assert!(config.enabled);
        assert_eq!(config.output_format, OutputFormat::Json);

        let cli = Cli::parse_from(["trackgrab", "clean", "music"]);
        let config = HeadlessConfig::from_cli(&cli);
        assert!(!config.enabled);
        assert_eq!(config.output_format, OutputFormat::Text);
    }

    #[test]
    fn test_clean_args() {
        let cli = Cli::parse_from(["trackgrab", "clean", "music", "--dry-run", "-e", "m4a"]);
        match &cli.command {
            Commands::Clean { dir, extension, dry_run } => {
                assert_eq!(dir, &PathBuf::from("music"));
                assert_eq!(extension, "m4a");
                assert!(*dry_run);
            }
            _ => panic!("expected clean command"),
        }
    }

    #[test]
    fn test_single_title_words_and_format() {
        let cli = Cli::parse_from(["trackgrab", "single", "Get", "Lucky", "--format", "MP3"]);
        match &cli.command {
            Commands::Single { title, download, .. } => {
                assert_eq!(title.join(" "), "Get Lucky");
                assert_eq!(DownloadOptions::from(download).codec, "mp3");
            }
            _ => panic!("expected single command"),
        }
    }

    #[test]
    fn test_format_limited_to_known_codecs() {
        let cli = Cli::parse_from(["trackgrab", "retry", "-f", "vorbis"]);
        match &cli.command {
            Commands::Retry { download } => {
                assert_eq!(DownloadOptions::from(download).codec, "vorbis")
            }
            _ => panic!("expected retry command"),
        }

        assert!(Cli::try_parse_from(["trackgrab", "retry", "-f", "mp4"]).is_err());
    }
}
