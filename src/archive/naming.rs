//! Entry naming for a single archive run
//!
//! Names are sanitized down to a single file name component and made unique
//! against every name already written in the run. A clash (or an empty name)
//! gets a random token inserted before the extension, e.g. `report(9F3A2C1B).csv`,
//! and the check repeats until an unused name comes out.

use std::{collections::HashSet, path::Path};
use tracing::debug;

/// Stem used when a unit resolved to no usable name at all
const FALLBACK_STEM: &str = "download";

const RESERVED_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// Names already claimed in this run
#[derive(Debug, Default)]
pub struct EntryNames {
    used: HashSet<String>,
}

impl EntryNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.used.contains(name)
    }

    /// Claim a unique entry name for `candidate`
    pub fn claim(&mut self, candidate: &str) -> String {
        self.claim_with(candidate, random_token)
    }

    fn claim_with(&mut self, candidate: &str, mut token: impl FnMut() -> String) -> String {
        let sanitized = sanitize(candidate);
        if !sanitized.is_empty() && !self.used.contains(&sanitized) {
            self.used.insert(sanitized.clone());
            return sanitized;
        }

        let (stem, ext) = split_extension(&sanitized);
        let stem = if stem.is_empty() { FALLBACK_STEM } else { stem };
        loop {
            let name = format!("{stem}({}){ext}", token());
            if self.used.insert(name.clone()) {
                debug!(requested = candidate, resolved = %name, "Disambiguated entry name");
                return name;
            }
        }
    }
}

fn random_token() -> String {
    format!("{:08X}", rand::random::<u32>())
}

/// Reduce a requested name to a single safe file name component
///
/// Keeps the last component after `/` or `\`, replaces control and reserved
/// characters with `_`, and trims whitespace and trailing dots. `.` and `..`
/// become empty.
pub fn sanitize(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let replaced: String = last
        .chars()
        .map(|c| {
            if c.is_control() || RESERVED_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect();

    let trimmed = replaced.trim().trim_end_matches('.').trim_end();
    match trimmed {
        "" | "." | ".." => String::new(),
        name => name.to_string(),
    }
}

/// Split `name` into stem and extension (with its dot), the way a file name lookup would
fn split_extension(name: &str) -> (&str, &str) {
    match Path::new(name).extension().and_then(|e| e.to_str()) {
        Some(ext) if name.len() > ext.len() + 1 => {
            let split = name.len() - ext.len() - 1;
            (&name[..split], &name[split..])
        }
        _ => (name, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("report.csv"), "report.csv");
        assert_eq!(sanitize("../../etc/passwd"), "passwd");
        assert_eq!(sanitize("C:\\Users\\me\\notes.txt"), "notes.txt");
        assert_eq!(sanitize("what?.txt"), "what_.txt");
        assert_eq!(sanitize("tab\there"), "tab_here");
        assert_eq!(sanitize("  spaced.txt  "), "spaced.txt");
        assert_eq!(sanitize("trailing..."), "trailing");
        assert_eq!(sanitize(".."), "");
        assert_eq!(sanitize("dir/"), "");
        assert_eq!(sanitize(".bashrc"), ".bashrc");
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("report.csv"), ("report", ".csv"));
        assert_eq!(split_extension("tool.tar.gz"), ("tool.tar", ".gz"));
        assert_eq!(split_extension("README"), ("README", ""));
        assert_eq!(split_extension(".bashrc"), (".bashrc", ""));
        assert_eq!(split_extension(""), ("", ""));
    }

    #[test]
    fn test_first_claim_keeps_name() {
        let mut names = EntryNames::new();
        assert_eq!(names.claim("file.txt"), "file.txt");
        assert!(names.contains("file.txt"));
    }

    #[test]
    fn test_collision_inserts_token_before_extension() {
        let mut names = EntryNames::new();
        assert_eq!(names.claim("report.csv"), "report.csv");

        let second = names.claim("report.csv");
        assert_ne!(second, "report.csv");
        assert!(second.starts_with("report("), "{second}");
        assert!(second.ends_with(").csv"), "{second}");
        // "report(" + 8 hex digits + ").csv"
        assert_eq!(second.len(), "report(".len() + 8 + ").csv".len());
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn test_empty_name_gets_generated_name() {
        let mut names = EntryNames::new();
        let name = names.claim("");
        assert!(name.starts_with("download("), "{name}");
        assert!(name.ends_with(')'), "{name}");
    }

    #[test]
    fn test_regenerates_until_unique() {
        let mut names = EntryNames::new();
        names.claim("a.txt");
        names.claim_with("a.txt", || "00000001".to_string());

        // The first two tokens collide with names already taken
        let mut tokens = ["00000001", "00000001", "00000002"].into_iter();
        let name = names.claim_with("a.txt", || tokens.next().unwrap().to_string());
        assert_eq!(name, "a(00000002).txt");
        assert_eq!(names.len(), 3);
    }
}
