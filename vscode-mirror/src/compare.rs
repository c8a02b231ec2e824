//! Comparison of the configured extension list against a local install.

use std::collections::BTreeSet;

use colored::Colorize;

use crate::config;
use crate::error::MirrorError;

const MARKETPLACE_ITEM_URL: &str = "https://marketplace.visualstudio.com/items?itemName=";
const NAME_COLUMN_WIDTH: usize = 55;

/// Print a union table of the configured and the locally installed
/// extensions, marking per identifier which side has it.
///
/// Returns the process exit code: 2 when the configuration disagrees with
/// the local install about identifier casing, 0 otherwise.
pub async fn compare_local(extension_ids: &BTreeSet<String>) -> Result<i32, MirrorError> {
    let installed: BTreeSet<String> = config::installed_extensions().await?.into_iter().collect();

    let conflicts = case_conflicts(extension_ids, &installed);
    if !conflicts.is_empty() {
        for (wanted_id, installed_id) in &conflicts {
            tracing::warn!("upper/lower case problem with {wanted_id}, should be {installed_id}");
        }
        return Ok(2);
    }

    println!(
        "{}{}{}",
        format!("{:<NAME_COLUMN_WIDTH$}", "extension")
            .white()
            .bold()
            .italic(),
        format!("{:^9}", "config").bright_yellow().bold().italic(),
        format!("{:^9}", "local").bright_magenta().bold().italic()
    );

    for extension in extension_ids.union(&installed) {
        let wanted = extension_ids.contains(extension);
        let local = installed.contains(extension);

        let link = hyperlink(extension);
        let link = match (wanted, local) {
            (true, false) => link.bright_yellow(),
            (false, true) => link.bright_magenta(),
            _ => link.white(),
        };

        println!("{link}{:^9}{:^9}", mark(wanted), mark(local));
    }

    Ok(0)
}

/// Configured identifiers that only differ from an installed one in case.
/// The gallery ignores case but the manifest and the editor do not, so
/// these pairs need fixing before a comparison is meaningful.
fn case_conflicts(
    wanted: &BTreeSet<String>,
    installed: &BTreeSet<String>,
) -> Vec<(String, String)> {
    let mut conflicts = Vec::new();

    for wanted_id in wanted {
        if installed.contains(wanted_id) {
            continue;
        }
        for installed_id in installed {
            if installed_id.to_lowercase() == wanted_id.to_lowercase() {
                conflicts.push((wanted_id.clone(), installed_id.clone()));
            }
        }
    }

    conflicts
}

const fn mark(present: bool) -> &'static str {
    if present { "✅" } else { "❌" }
}

/// Wrap an identifier in an OSC 8 hyperlink to its marketplace page and pad
/// it to the name column width.
///
/// <https://wezfurlong.org/wezterm/hyperlinks.html#explicit-hyperlinks>
fn hyperlink(extension: &str) -> String {
    let padding = " ".repeat(NAME_COLUMN_WIDTH.saturating_sub(extension.len()));
    format!("\x1b]8;;{MARKETPLACE_ITEM_URL}{extension}\x1b\\{extension}\x1b]8;;\x1b\\{padding}")
}
