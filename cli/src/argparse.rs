use clap::Parser;
use rtq_query::FastQuery;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "rtcontrol",
    about = "Select rTorrent items with filter conditions",
    version,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Filter conditions, e.g. `ratio>1 tagged=hd OR [ name=*linux* ]`
    #[arg(required = true)]
    pub filter: Vec<String>,

    /// Configuration file, instead of the default location
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Daemon endpoint or connection alias, overriding the configuration
    #[arg(long)]
    pub scgi_url: Option<String>,

    /// Pre-filter level: 0 off, 1 safe, 2 aggressive
    #[arg(long)]
    pub fast_query: Option<FastQuery>,

    /// View to select items from, or `#<hash>` for a single item
    #[arg(long, default_value = "default")]
    pub view: String,

    /// Fields to print, tab-separated
    #[arg(short, long, value_delimiter = ',', default_value = "name")]
    pub output: Vec<String>,

    /// Print the rendered pre-filter and exit
    #[arg(long, conflicts_with = "show_keys")]
    pub show_prefilter: bool,

    /// Print the referenced fields and the calls they need, then exit
    #[arg(long)]
    pub show_keys: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

pub fn parse_args() -> Cli {
    Cli::parse()
}
