use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "urlzip")]
#[command(version)]
#[command(about = "Extract ZIP archives from HTTP URLs without downloading them in full", long_about = None)]
#[command(after_help = "Examples:\n  \
  urlzip https://example.com/archive.zip -d out        extract into ./out\n  \
  urlzip https://example.com/archive.zip -c 8          extract with 8 workers\n  \
  urlzip -l data.zip                                   list a local archive")]
pub struct Cli {
    /// ZIP file path or HTTP URL
    #[arg(value_name = "ARCHIVE")]
    pub archive: String,

    /// Extract files into DIR (default: current directory)
    #[arg(short = 'd', long = "dest", value_name = "DIR", default_value = ".")]
    pub dest: PathBuf,

    /// Number of concurrent extraction workers
    #[arg(
        short = 'c',
        long = "concurrency",
        value_name = "N",
        default_value_t = 4
    )]
    pub concurrency: usize,

    /// Entries buffered between the producer and the workers
    #[arg(long = "queue-depth", value_name = "N", default_value_t = 1)]
    pub queue_depth: usize,

    /// List files instead of extracting
    #[arg(short = 'l', long = "list")]
    pub list: bool,

    /// List verbosely (sizes, compression, timestamps)
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Quiet mode
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,
}

impl Cli {
    pub fn is_http_url(&self) -> bool {
        self.archive.starts_with("http://") || self.archive.starts_with("https://")
    }
}
