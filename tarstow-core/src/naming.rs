// tarstow-core/src/naming.rs
//! Application identifiers derived from archive file names.

use lazy_static::lazy_static;
use regex::Regex;
use tarstow_common::config::NameRules;
use tracing::debug;

lazy_static! {
    static ref VERSION_RE: Regex =
        Regex::new(r"(?i)[-_]v?\d+(?:\.\d+)*(?:[-.][a-z0-9]+)?([-_]|$)").unwrap();
    static ref WHITESPACE_RE: Regex = Regex::new(r"\s+").unwrap();
}

const FALLBACK_IDENTIFIER: &str = "app";

/// Turns archive file names into stable lowercase identifiers.
#[derive(Debug, Clone)]
pub struct NameDeriver {
    extensions: Vec<String>,
    arch_re: Option<Regex>,
    os_re: Option<Regex>,
    release_re: Option<Regex>,
}

impl NameDeriver {
    pub fn new(rules: &NameRules) -> Self {
        let mut extensions: Vec<String> = rules
            .archive_extensions
            .iter()
            .map(|e| e.to_lowercase())
            .collect();
        // Longest first so ".tar.gz" wins over ".tar".
        extensions.sort_by_key(|e| std::cmp::Reverse(e.len()));

        Self {
            extensions,
            arch_re: segment_regex(&rules.arch_tokens),
            os_re: segment_regex(&rules.os_tokens),
            release_re: release_suffix_regex(&rules.release_tokens),
        }
    }

    /// Derives the identifier for `filename`. Always returns a non-empty,
    /// lowercase, whitespace-free string.
    pub fn derive(&self, filename: &str) -> String {
        let mut name = self.strip_extension(filename).to_string();

        // Arch and OS tokens go before versions: "x86_64" would otherwise
        // lose its "64" to the version pattern.
        for re in [&self.arch_re, &self.os_re].into_iter().flatten() {
            name = strip_to_fixpoint(re, &name);
        }
        name = strip_to_fixpoint(&VERSION_RE, &name);
        if let Some(re) = &self.release_re {
            name = strip_to_fixpoint(re, &name);
        }

        let identifier = normalize(&name);
        if !identifier.is_empty() {
            debug!("Derived identifier '{}' from '{}'", identifier, filename);
            return identifier;
        }

        let fallback = filename
            .split(['-', '_'])
            .map(normalize)
            .find(|segment| !segment.is_empty())
            .unwrap_or_else(|| FALLBACK_IDENTIFIER.to_string());
        debug!(
            "Stripping emptied '{}', falling back to '{}'",
            filename, fallback
        );
        fallback
    }

    fn strip_extension<'a>(&self, filename: &'a str) -> &'a str {
        let lower = filename.to_lowercase();
        self.extensions
            .iter()
            .find(|ext| lower.ends_with(ext.as_str()) && lower.len() >= ext.len())
            .and_then(|ext| filename.get(..filename.len() - ext.len()))
            .unwrap_or(filename)
    }
}

impl Default for NameDeriver {
    fn default() -> Self {
        Self::new(&NameRules::default())
    }
}

/// Matches any of `tokens` as a whole `-`/`_` delimited segment. The
/// trailing delimiter is captured so replacing with `$1` keeps it.
fn segment_regex(tokens: &[String]) -> Option<Regex> {
    let alternation = alternation(tokens, |t| regex::escape(t))?;
    Regex::new(&format!(r"(?i)[-_](?:{alternation})([-_]|$)")).ok()
}

/// Matches one release token at the very end of the name. Only `rc` takes a
/// number (`rc1`, `rc12`).
fn release_suffix_regex(tokens: &[String]) -> Option<Regex> {
    let alternation = alternation(tokens, |t| {
        if t.eq_ignore_ascii_case("rc") {
            format!(r"{}\d*", regex::escape(t))
        } else {
            regex::escape(t)
        }
    })?;
    Regex::new(&format!(r"(?i)[-_](?:{alternation})$")).ok()
}

fn alternation(tokens: &[String], pattern: impl Fn(&str) -> String) -> Option<String> {
    if tokens.is_empty() {
        return None;
    }
    let mut sorted: Vec<&String> = tokens.iter().collect();
    sorted.sort_by_key(|t| std::cmp::Reverse(t.len()));
    Some(
        sorted
            .iter()
            .map(|t| pattern(t))
            .collect::<Vec<_>>()
            .join("|"),
    )
}

/// Adjacent tokens share a delimiter, so one pass can leave the second
/// behind; repeat until nothing changes.
fn strip_to_fixpoint(re: &Regex, input: &str) -> String {
    let mut current = input.to_string();
    loop {
        let next = re.replace_all(&current, "${1}").into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

fn normalize(name: &str) -> String {
    let trimmed = name.trim_matches(|c: char| c == '-' || c == '_' || c == '.' || c.is_whitespace());
    WHITESPACE_RE
        .replace_all(&trimmed.to_lowercase(), "-")
        .into_owned()
}
