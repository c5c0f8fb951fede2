//! File-path mapping rules applied by the reply stage before a file
//! component is handed to a platform adapter (spec §6).
//!
//! A rule is written `FROM:TO`, but `:` is also the Windows drive-letter
//! separator, so a rule like `C:\bot-data:D:\shared` splits into four raw
//! `:`-segments that must be re-paired into two logical halves before use.

#[derive(Debug, Clone)]
pub struct PathMappingRule {
    pub from: String,
    pub to: String,
}

impl PathMappingRule {
    pub fn parse(rule: &str) -> Option<Self> {
        let raw: Vec<&str> = rule.split(':').collect();
        let merged = merge_drive_letters(raw);
        if merged.len() != 2 {
            return None;
        }
        Some(Self { from: merged[0].clone(), to: merged[1].clone() })
    }
}

fn merge_drive_letters(parts: Vec<&str>) -> Vec<String> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < parts.len() {
        let is_drive_letter = parts[i].len() == 1 && parts[i].chars().all(|c| c.is_ascii_alphabetic());
        if is_drive_letter && i + 1 < parts.len() {
            out.push(format!("{}:{}", parts[i], parts[i + 1]));
            i += 2;
        } else {
            out.push(parts[i].to_string());
            i += 1;
        }
    }
    out
}

/// Apply the first matching rule's prefix substitution, normalizing the
/// result's separators to whichever style the rule's `to` half uses. A
/// path matching no rule is returned unchanged.
pub fn apply(rules: &[PathMappingRule], path: &str) -> String {
    for rule in rules {
        if let Some(rest) = path.strip_prefix(&rule.from) {
            let joined = format!("{}{}", rule.to, rest);
            return normalize_separators(&joined, separator_style(&rule.to));
        }
    }
    path.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Separator {
    Forward,
    Back,
}

fn separator_style(sample: &str) -> Separator {
    if sample.contains('\\') {
        Separator::Back
    } else {
        Separator::Forward
    }
}

fn normalize_separators(path: &str, style: Separator) -> String {
    match style {
        Separator::Forward => path.replace('\\', "/"),
        Separator::Back => path.replace('/', "\\"),
    }
}

pub fn parse_rules(raw: &[String]) -> Vec<PathMappingRule> {
    raw.iter().filter_map(|r| PathMappingRule::parse(r)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_unix_rule() {
        let rule = PathMappingRule::parse("/data/bot:/srv/shared").unwrap();
        assert_eq!(rule.from, "/data/bot");
        assert_eq!(rule.to, "/srv/shared");
    }

    #[test]
    fn parses_rule_with_drive_letters_on_both_sides() {
        let rule = PathMappingRule::parse(r"C:\bot-data:D:\shared").unwrap();
        assert_eq!(rule.from, r"C:\bot-data");
        assert_eq!(rule.to, r"D:\shared");
    }

    #[test]
    fn first_matching_prefix_wins() {
        let rules = vec![
            PathMappingRule::parse("/data:/first").unwrap(),
            PathMappingRule::parse("/data:/second").unwrap(),
        ];
        assert_eq!(apply(&rules, "/data/file.png"), "/first/file.png");
    }

    #[test]
    fn normalizes_separators_to_target_style() {
        let rules = vec![PathMappingRule::parse(r"/data:C:\shared").unwrap()];
        assert_eq!(apply(&rules, "/data/sub/file.png"), r"C:\shared\sub\file.png");
    }

    #[test]
    fn unmatched_path_passes_through() {
        let rules = vec![PathMappingRule::parse("/data:/other").unwrap()];
        assert_eq!(apply(&rules, "/elsewhere/file.png"), "/elsewhere/file.png");
    }
}
