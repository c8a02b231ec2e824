use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::Parser;

use crate::platform::Platform;

#[derive(Debug, Clone, Parser)]
pub struct MirrorArgs {
    /// verbose and debug info, also keeps gallery queries on disk
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// output dir
    #[arg(short, long, env = "VSCODE_MIRROR_DEST_DIR")]
    pub dest_dir: Option<PathBuf>,

    /// editor version, `latest` or `x.y.z`
    #[arg(short = 'e', long)]
    pub version: Option<String>,

    /// download only extensions
    #[arg(short = 'E', long, default_value_t = false)]
    pub extensions_only: bool,

    /// configuration file, defaults to `<dest-dir>/files`
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// add the extensions of the locally installed editor
    #[arg(long, default_value_t = false)]
    pub local: bool,

    /// compare the configured extensions with the local editor and exit
    #[arg(long, default_value_t = false)]
    pub compare_local: bool,

    /// prune old and unwanted extensions
    #[arg(short, long, default_value_t = false)]
    pub prune: bool,

    /// platforms to keep platform-specific extension builds for
    #[arg(long, value_name = "PLATFORM")]
    pub platform: Vec<Platform>,

    /// parallel archive downloads within one wave
    #[arg(long, default_value = "4")]
    pub max_parallel_downloads: NonZeroUsize,

    /// extension identifier
    #[arg(value_name = "ID")]
    pub extension_ids: Vec<String>,
}
