use clap::Parser;
use std::path::PathBuf;

use crate::archive::Compression;

#[derive(Parser, Debug)]
#[command(name = "urlzip")]
#[command(version)]
#[command(about = "Fetch URLs and local files into one ZIP archive", long_about = None)]
#[command(after_help = "Examples:\n  \
  urlzip -o out.zip https://example.com/a.txt https://example.com/b.txt\n  \
  urlzip -m sources.json > out.zip      stream the archive to stdout\n  \
  urlzip -0 ./logs/app.log ./logs/db.log -o logs.zip   store without compression")]
pub struct Cli {
    /// URLs or local paths to add, in order
    #[arg(value_name = "LOCATIONS")]
    pub locations: Vec<String>,

    /// Write the archive to FILE instead of streaming it to stdout
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// JSON array of sources ({"url": .., "extra": ..}) added after LOCATIONS
    #[arg(short = 'm', long = "manifest", value_name = "FILE")]
    pub manifest: Option<PathBuf>,

    /// Store entries without compression
    #[arg(short = '0', long = "store")]
    pub store: bool,

    /// Total timeout for one request, in seconds
    #[arg(long = "timeout", value_name = "SECS", default_value_t = 10)]
    pub timeout: u64,

    /// Log every source as it is fetched
    #[arg(long = "debug")]
    pub debug: bool,

    /// Only log errors
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,
}

impl Cli {
    pub fn compression(&self) -> Compression {
        if self.store {
            Compression::Stored
        } else {
            Compression::Deflate
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.output.is_none()
    }
}
