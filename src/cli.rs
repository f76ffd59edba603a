use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ktail")]
#[command(about = "Tail logs from every matching Kubernetes container, following pods as they come and go")]
pub struct Cli {
    /// Regexes matched against pod and container names (any match selects the pod)
    pub patterns: Vec<String>,

    /// Exclude pods or containers whose name matches this regex (repeatable)
    #[arg(short = 'x', long = "exclude")]
    pub exclude: Vec<String>,

    /// Namespace (defaults to the kubeconfig context's namespace)
    #[arg(short = 'n', long)]
    pub namespace: Option<String>,

    /// Watch pods in all namespaces
    #[arg(short = 'A', long, conflicts_with = "namespace")]
    pub all_namespaces: bool,

    /// Label selector
    #[arg(short = 'l', long)]
    pub selector: Option<String>,

    /// Kubeconfig context
    #[arg(long)]
    pub context: Option<String>,

    /// Lines of history to print when attaching to a container
    #[arg(short = 't', long)]
    pub tail: Option<i64>,

    /// Prefix each line with its timestamp
    #[arg(long)]
    pub timestamps: bool,

    /// Print bare log lines without the pod/container prefix
    #[arg(long)]
    pub raw: bool,

    /// Disable colored prefixes
    #[arg(long)]
    pub no_color: bool,

    /// Don't report containers being attached or detached
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose logging
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Log message buffer size
    #[arg(long, default_value = "1000")]
    pub buffer_size: usize,

    /// Consecutive log stream failures before giving up on a container (default 0, retry forever)
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Config file (defaults to ~/.config/ktail/config.yml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}
