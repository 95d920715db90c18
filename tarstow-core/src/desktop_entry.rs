// tarstow-core/src/desktop_entry.rs
//! Launcher entries: adopting the one an archive ships, or writing one.

use std::path::{Path, PathBuf};

use tracing::{debug, trace};
use walkdir::WalkDir;

const SHIPPED_SEARCH_DEPTH: usize = 3;
const ICON_SEARCH_DEPTH: usize = 5;
const MAIN_GROUP: &str = "[Desktop Entry]";
/// Best format first.
const ICON_EXTENSIONS: &[&str] = &["svg", "png", "xpm"];
const GENERIC_ICON_STEMS: &[&str] = &["icon", "logo"];

/// First `.desktop` file under `root`, in sorted walk order.
pub fn find_shipped_desktop_file(root: &Path) -> Option<PathBuf> {
    WalkDir::new(root)
        .min_depth(1)
        .max_depth(SHIPPED_SEARCH_DEPTH)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .find(|p| {
            p.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("desktop"))
        })
}

/// Rewrites the `[Desktop Entry]` group of a shipped entry so it points at
/// the installed program. Arguments and field codes after the original
/// command are kept. A relative `Icon=` is replaced when `resolve_icon`
/// finds a file for it. Other groups pass through untouched.
pub fn rewrite_desktop_entry<F>(contents: &str, exec: Option<&Path>, resolve_icon: F) -> String
where
    F: Fn(&str) -> Option<PathBuf>,
{
    let mut out = String::with_capacity(contents.len() + 64);
    let mut in_main_group = false;

    for line in contents.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            in_main_group = trimmed == MAIN_GROUP;
        }

        let rewritten = if in_main_group {
            rewrite_entry_line(line, exec, &resolve_icon)
        } else {
            None
        };
        out.push_str(rewritten.as_deref().unwrap_or(line));
        out.push('\n');
    }
    out
}

fn rewrite_entry_line<F>(line: &str, exec: Option<&Path>, resolve_icon: &F) -> Option<String>
where
    F: Fn(&str) -> Option<PathBuf>,
{
    let (key, value) = line.split_once('=')?;
    let value = value.trim();
    match key.trim() {
        "Exec" => {
            let exec = exec?;
            let (_, args) = split_exec_command(value);
            let mut new_value = quote_exec_arg(&exec.display().to_string());
            if !args.is_empty() {
                new_value.push(' ');
                new_value.push_str(args);
            }
            Some(format!("Exec={new_value}"))
        }
        "TryExec" => exec.map(|e| format!("TryExec={}", e.display())),
        "Icon" if !value.is_empty() && !value.starts_with('/') => {
            let resolved = resolve_icon(value)?;
            debug!("Resolved icon '{}' to {}", value, resolved.display());
            Some(format!("Icon={}", resolved.display()))
        }
        _ => None,
    }
}

/// Splits an `Exec` value into its (possibly quoted) command and the rest.
fn split_exec_command(value: &str) -> (&str, &str) {
    if let Some(rest) = value.strip_prefix('"') {
        let mut escaped = false;
        for (i, c) in rest.char_indices() {
            match c {
                '\\' if !escaped => escaped = true,
                '"' if !escaped => {
                    let command_end = i + 2;
                    return (&value[..command_end], value[command_end..].trim_start());
                }
                _ => escaped = false,
            }
        }
        return (value, "");
    }
    match value.split_once(char::is_whitespace) {
        Some((command, args)) => (command, args.trim_start()),
        None => (value, ""),
    }
}

/// Quotes an `Exec` argument when it contains characters the desktop entry
/// format reserves.
fn quote_exec_arg(arg: &str) -> String {
    const RESERVED: &[char] = &[
        ' ', '\t', '"', '\'', '\\', '>', '<', '~', '|', '&', ';', '$', '*', '?', '#', '(', ')',
        '`',
    ];
    if !arg.contains(RESERVED) {
        return arg.to_string();
    }
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for c in arg.chars() {
        if matches!(c, '"' | '`' | '$' | '\\') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// A minimal application entry for archives that ship none.
pub fn fabricate_desktop_entry(app_identifier: &str, exec: &Path, icon: &str) -> String {
    format!(
        "[Desktop Entry]\n\
         Version=1.0\n\
         Type=Application\n\
         Name={}\n\
         Exec={}\n\
         TryExec={}\n\
         Icon={}\n\
         Terminal=false\n\
         Categories=Utility;\n",
        display_name(app_identifier),
        quote_exec_arg(&exec.display().to_string()),
        exec.display(),
        icon
    )
}

fn display_name(app_identifier: &str) -> String {
    let mut chars = app_identifier.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Icon file under `install_dir` for the icon name `name` (with or without
/// extension). Prefers svg, then png, then xpm.
pub fn resolve_icon(install_dir: &Path, name: &str) -> Option<PathBuf> {
    let wanted = name.to_lowercase();
    best_icon(install_dir, |stem, file_name| {
        stem == wanted || file_name == wanted
    })
}

/// Icon for an entry we write ourselves: a file named after the
/// application, or a generic `icon`/`logo` file.
pub fn guess_icon(install_dir: &Path, app_identifier: &str) -> Option<PathBuf> {
    let id = app_identifier.to_lowercase();
    best_icon(install_dir, |stem, _| stem.contains(&id))
        .or_else(|| best_icon(install_dir, |stem, _| GENERIC_ICON_STEMS.contains(&stem)))
}

fn best_icon<P>(install_dir: &Path, matches: P) -> Option<PathBuf>
where
    P: Fn(&str, &str) -> bool,
{
    let mut best: Option<(usize, PathBuf)> = None;

    for entry in WalkDir::new(install_dir)
        .min_depth(1)
        .max_depth(ICON_SEARCH_DEPTH)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        let Some(rank) = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .and_then(|ext| ICON_EXTENSIONS.iter().position(|known| *known == ext))
        else {
            continue;
        };
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let file_name = entry.file_name().to_string_lossy().to_lowercase();
        if !matches(&stem, &file_name) {
            continue;
        }
        trace!("Icon candidate {} (rank {})", path.display(), rank);
        if best.as_ref().map_or(true, |(r, _)| rank < *r) {
            best = Some((rank, path.to_path_buf()));
        }
    }
    best.map(|(_, path)| path)
}
