mod error;
mod platform;
mod version;
mod asset;
mod args;
mod gallery;
mod select;
mod vsix;
mod download;
mod update;
mod inventory;
mod config;
mod report;
mod sync;
mod compare;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use clap::Parser as _;
use colored::Colorize;
use regex::Regex;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use crate::args::MirrorArgs;
use crate::config::Config;
use crate::download::{HttpFetcher, VsixStore};
use crate::error::MirrorError;
use crate::gallery::{FsQueryCache, GalleryClient};
use crate::platform::Platform;
use crate::sync::Mirror;
use crate::update::{CodeVersion, UpdateClient};

fn main() {
    let args = MirrorArgs::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_env("VSCODE_MIRROR_LOG")
        .unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new(if args.verbose { "debug" } else { "info" })
        });

    let indicatif_layer = tracing_indicatif::IndicatifLayer::new();

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(indicatif_layer.get_stdout_writer()))
        .with(indicatif_layer)
        .init();

    let result = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime.block_on(async_main(args)),
        Err(err) => {
            tracing::error!("failed to create tokio runtime: {:?}", err);
            std::process::exit(1);
        }
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            tracing::error!("{err}");
            std::process::exit(err.exit_code());
        }
    }
}

async fn async_main(args: MirrorArgs) -> Result<i32, MirrorError> {
    tracing::trace!("args = {:#?}", args);

    let config_file = args
        .config
        .clone()
        .or_else(|| args.dest_dir.as_ref().map(|dir| dir.join("files")));

    let config = Config::load(config_file.as_deref(), &args.extension_ids, args.local).await?;

    if args.compare_local {
        return compare::compare_local(config.all_extensions()).await;
    }

    let update = UpdateClient::new()?;
    let (code, dest_dir) = resolve_version_dest(&update, &args).await?;

    if !args.extensions_only {
        let entries = update.download_editor(&code, &dest_dir).await?;

        let file = dest_dir.join("files");
        tokio::task::spawn_blocking(move || inventory::write_code_entries(&file, &entries))
            .await
            .unwrap()?;
    }

    let wanted: BTreeSet<Platform> = if args.platform.is_empty() {
        Platform::default_wanted()
    } else {
        args.platform.iter().copied().collect()
    };

    let cache = Arc::new(FsQueryCache::new(dest_dir.clone(), args.verbose));
    let gallery = GalleryClient::new(cache)?;
    let fetcher = Arc::new(HttpFetcher::new()?);
    let store = VsixStore::new(dest_dir.clone(), fetcher, args.max_parallel_downloads.get());

    let mut mirror = Mirror::new(code.version.clone(), wanted, gallery, store);
    let report = mirror.run(config.all_extensions()).await?;

    if args.prune {
        let directory = dest_dir.clone();
        let assets = mirror.assets().to_vec();
        tokio::task::spawn_blocking(move || inventory::prune(&directory, &assets))
            .await
            .unwrap()?;
    }

    let file = dest_dir.join("files");
    let extension_count = config.all_extensions().len();
    let sections = config.sections;
    let assets = mirror.assets().to_vec();
    tokio::task::spawn_blocking(move || {
        inventory::write_extension_sections(&file, &sections, &assets)
    })
    .await
    .unwrap()?;

    println!("extensions: {extension_count}");

    if !report.missing_platforms.is_empty() {
        tracing::warn!("platform builds not published:");
        for missing in &report.missing_platforms {
            tracing::warn!("- {} for {}", missing.platform, missing.name);
        }
    }

    if !report.not_found.is_empty() {
        tracing::error!("extensions without any download:");
        for name in &report.not_found {
            tracing::error!("- {}", name);
        }
    }

    tracing::info!("archives in the mirror: {}", report.downloaded);

    Ok(0)
}

static EXACT_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\d+\.\d+").unwrap());

/// Figure out which editor build to mirror and where to put it.
///
/// An existing mirror pins its own version through the manifest, the update
/// service is only asked when the manifest is absent or a different version
/// was requested explicitly.
async fn resolve_version_dest(
    update: &UpdateClient,
    args: &MirrorArgs,
) -> Result<(CodeVersion, PathBuf), MirrorError> {
    if let Some(dest_dir) = &args.dest_dir {
        let file = dest_dir.join("files");
        if file.is_file() {
            let code = inventory::read_code_version(&file).await?;

            if args.version.is_none() || args.version.as_deref() == Some(code.version.as_str()) {
                println!(
                    "Using Visual Studio Code {} (from {})",
                    code.version.green().bold(),
                    dest_dir.display()
                );
                return Ok((code, dest_dir.clone()));
            }
        }
    }

    let code = match args.version.as_deref() {
        None | Some("latest") => {
            let code = update.resolve_version("latest", "stable").await?;
            println!(
                "Using Visual Studio Code {} (latest)",
                code.version.green().bold()
            );
            code
        }
        Some(version) if EXACT_VERSION_RE.is_match(version) => {
            let code = update.resolve_version(version, "stable").await?;
            println!(
                "Using Visual Studio Code {} (requested)",
                code.version.green().bold()
            );
            code
        }
        Some(version) => return Err(MirrorError::UnknownVersionRequest(version.to_owned())),
    };

    let dest_dir = match &args.dest_dir {
        Some(dir) => dir.clone(),
        None => {
            let dir = PathBuf::from(format!("code-{}", code.version));
            println!("Using dest_dir {}", dir.display().to_string().green().bold());
            dir
        }
    };

    tokio::fs::create_dir_all(&dest_dir).await?;

    Ok((code, dest_dir))
}
