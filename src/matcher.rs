use crate::model::{AppEntry, Keyword};

/// Where a lowercased candidate sits relative to the lowercased query.
/// Variants are declared best-first so the derived `Ord` sorts them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    Exact,
    Prefix,
    Contains,
    Other,
}

impl Tier {
    pub fn of(candidate: &str, query: &str) -> Self {
        if candidate == query {
            Tier::Exact
        } else if candidate.starts_with(query) {
            Tier::Prefix
        } else if candidate.contains(query) {
            Tier::Contains
        } else {
            Tier::Other
        }
    }
}

/// Filters enabled keywords by shortcut or name and orders them by how
/// well the shortcut matches. `query` must already be lowercase.
pub fn rank_keywords<'a>(keywords: impl Iterator<Item = &'a Keyword>, query: &str) -> Vec<Keyword> {
    let mut ranked: Vec<(Tier, &Keyword)> = keywords
        .filter(|k| k.enabled)
        .filter_map(|k| {
            let shortcut = k.shortcut.to_lowercase();
            if shortcut.contains(query) || k.name.to_lowercase().contains(query) {
                Some((Tier::of(&shortcut, query), k))
            } else {
                None
            }
        })
        .collect();

    ranked.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.shortcut.cmp(&b.1.shortcut)));
    ranked.into_iter().map(|(_, k)| k.clone()).collect()
}

/// Substring filter on app names, exact then prefix then alphabetical,
/// truncated to `limit`. `query` must already be lowercase.
pub fn rank_apps<'a>(apps: impl Iterator<Item = &'a AppEntry>, query: &str, limit: usize) -> Vec<AppEntry> {
    let mut ranked: Vec<(Tier, String, &AppEntry)> = apps
        .filter_map(|a| {
            let name = a.name.to_lowercase();
            if name.contains(query) {
                Some((Tier::of(&name, query), name, a))
            } else {
                None
            }
        })
        .collect();

    // Every survivor contains the query, so past prefix the order is alphabetical.
    ranked.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    ranked.into_iter().take(limit).map(|(_, _, a)| a.clone()).collect()
}

/// Completion shown behind the input: the user's own prefix followed by
/// the rest of `title`. `None` unless `title` starts with `typed`
/// case-insensitively.
pub fn autocomplete_hint(typed: &str, title: &str) -> Option<String> {
    if typed.is_empty() {
        return None;
    }

    let mut typed_chars = typed.chars();
    let mut rest = title.char_indices();
    loop {
        match (typed_chars.next(), rest.next()) {
            (None, Some((idx, _))) => return Some(format!("{}{}", typed, &title[idx..])),
            (None, None) => return Some(typed.to_string()),
            (Some(_), None) => return None,
            (Some(t), Some((_, c))) => {
                if !t.to_lowercase().eq(c.to_lowercase()) {
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn kw(shortcut: &str, name: &str) -> Keyword {
        Keyword::new(shortcut, name, "https://example.com")
    }

    fn app(name: &str) -> AppEntry {
        AppEntry::new(PathBuf::from(format!("/Applications/{name}.app")), name.to_string(), None)
    }

    fn shortcuts(ks: &[Keyword]) -> Vec<&str> {
        ks.iter().map(|k| k.shortcut.as_str()).collect()
    }

    #[test]
    fn tiers_are_ordered_best_first() {
        assert!(Tier::Exact < Tier::Prefix);
        assert!(Tier::Prefix < Tier::Contains);
        assert!(Tier::Contains < Tier::Other);
        assert_eq!(Tier::of("gh", "gh"), Tier::Exact);
        assert_eq!(Tier::of("ghp", "gh"), Tier::Prefix);
        assert_eq!(Tier::of("xgh", "gh"), Tier::Contains);
        assert_eq!(Tier::of("git", "gh"), Tier::Other);
    }

    #[test]
    fn keywords_rank_exact_prefix_contains_then_name_hits() {
        let keywords = vec![
            kw("zgh", "contains"),
            kw("docs", "GH pages"),
            kw("ghub", "prefix"),
            kw("gh", "exact"),
            kw("ghb", "prefix too"),
        ];
        let ranked = rank_keywords(keywords.iter(), "gh");
        assert_eq!(shortcuts(&ranked), vec!["gh", "ghb", "ghub", "zgh", "docs"]);
    }

    #[test]
    fn keyword_ranking_is_case_insensitive() {
        let keywords = vec![kw("GH", "GitHub"), kw("ghx", "other")];
        let ranked = rank_keywords(keywords.iter(), "gh");
        assert_eq!(shortcuts(&ranked), vec!["GH", "ghx"]);
    }

    #[test]
    fn disabled_keywords_never_match() {
        let mut off = kw("gh", "GitHub");
        off.enabled = false;
        let keywords = vec![off, kw("ghe", "Enterprise")];
        assert_eq!(shortcuts(&rank_keywords(keywords.iter(), "gh")), vec!["ghe"]);
    }

    #[test]
    fn duplicate_shortcuts_both_match() {
        let keywords = vec![kw("gh", "one"), kw("gh", "two")];
        assert_eq!(rank_keywords(keywords.iter(), "gh").len(), 2);
    }

    #[test]
    fn apps_rank_and_truncate() {
        let apps: Vec<AppEntry> = ["Notes", "Notion", "Sticky Notes", "notes", "Keynote"]
            .iter()
            .map(|n| app(n))
            .collect();
        let ranked = rank_apps(apps.iter(), "note", 8);
        let names: Vec<&str> = ranked.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Notes", "notes", "Keynote", "Sticky Notes"]);

        let exact = rank_apps(apps.iter(), "notes", 8);
        assert_eq!(exact[0].name.to_lowercase(), "notes");

        let many: Vec<AppEntry> = (0..20).map(|i| app(&format!("Tool {i:02}"))).collect();
        assert_eq!(rank_apps(many.iter(), "tool", 8).len(), 8);
    }

    #[test]
    fn apps_require_substring() {
        let apps = vec![app("GitHub Desktop")];
        assert!(rank_apps(apps.iter(), "gh", 8).is_empty());
    }

    #[test]
    fn hint_keeps_typed_casing() {
        assert_eq!(autocomplete_hint("GiT", "github").as_deref(), Some("GiThub"));
        assert_eq!(autocomplete_hint("gh", "gh").as_deref(), Some("gh"));
        assert_eq!(autocomplete_hint("gx", "github"), None);
        assert_eq!(autocomplete_hint("githubs", "github"), None);
        assert_eq!(autocomplete_hint("", "github"), None);
    }
}
