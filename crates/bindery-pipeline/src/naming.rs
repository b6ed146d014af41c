// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Naming templates.
//
// Recognised tags: {name} {sheet} {parent} {seq} {fseq} {pseq} {total}
// {ptotal} {username} {rand} and {date:<pattern>}, where the pattern tokens
// yyyy mm dd HH MM SS expand to the local date and time. Unknown tags are
// kept verbatim. All tags are expanded in one scan, so tag text inside a
// substituted value is never expanded again.

use std::cell::OnceCell;
use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Local, Timelike};
use rand::Rng;
use regex::{Captures, Regex};

static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{(?:(name|sheet|parent|seq|fseq|pseq|total|ptotal|username|rand)|date:(.*?))\}")
        .expect("tag pattern is valid")
});

/// Values available to a template for one output unit (or one page).
#[derive(Debug, Clone)]
pub struct NamingContext {
    /// Source file name without extension.
    pub name: String,
    pub sheet: String,
    /// Name of the source file's directory.
    pub parent: String,
    /// Output unit counter across the run (`{seq}`).
    pub global_seq: usize,
    /// Position of the source document in the job (`{fseq}`).
    pub file_seq: usize,
    /// Page or sheet counter within the document (`{pseq}`).
    pub page_seq: usize,
    /// Number of source documents in the job (`{total}`).
    pub total_files: usize,
    /// Page total of the unit (`{ptotal}`).
    pub total_pages: usize,
    pub username: String,
    pub now: DateTime<Local>,
}

impl NamingContext {
    /// A context with every counter at 1 and the current user and time.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sheet: String::new(),
            parent: String::new(),
            global_seq: 1,
            file_seq: 1,
            page_seq: 1,
            total_files: 1,
            total_pages: 1,
            username: current_username(),
            now: Local::now(),
        }
    }
}

/// Login name from the environment, empty if unknown.
pub fn current_username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default()
}

/// Expand `template` against `ctx`. `{rand}` is drawn once per call and
/// repeated occurrences share it.
pub fn resolve_template(template: &str, ctx: &NamingContext) -> String {
    let token = OnceCell::new();
    TAG.replace_all(template, |caps: &Captures<'_>| {
        if let Some(pattern) = caps.get(2) {
            return format_date(pattern.as_str(), &ctx.now);
        }
        match caps.get(1).map(|m| m.as_str()) {
            Some("name") => ctx.name.clone(),
            Some("sheet") => ctx.sheet.clone(),
            Some("parent") => ctx.parent.clone(),
            Some("seq") => ctx.global_seq.to_string(),
            Some("fseq") => ctx.file_seq.to_string(),
            Some("pseq") => ctx.page_seq.to_string(),
            Some("total") => ctx.total_files.to_string(),
            Some("ptotal") => ctx.total_pages.to_string(),
            Some("username") => ctx.username.clone(),
            Some("rand") => token
                .get_or_init(|| format!("{:04}", rand::thread_rng().gen_range(0..10_000)))
                .clone(),
            _ => caps[0].to_string(),
        }
    })
    .into_owned()
}

/// Expand yyyy/mm/dd/HH/MM/SS in a date pattern; other characters are literal.
fn format_date(pattern: &str, now: &DateTime<Local>) -> String {
    let mut out = String::with_capacity(pattern.len() + 4);
    let mut rest = pattern;
    while !rest.is_empty() {
        let (text, consumed) = if rest.starts_with("yyyy") {
            (format!("{:04}", now.year()), 4)
        } else if rest.starts_with("mm") {
            (format!("{:02}", now.month()), 2)
        } else if rest.starts_with("dd") {
            (format!("{:02}", now.day()), 2)
        } else if rest.starts_with("HH") {
            (format!("{:02}", now.hour()), 2)
        } else if rest.starts_with("MM") {
            (format!("{:02}", now.minute()), 2)
        } else if rest.starts_with("SS") {
            (format!("{:02}", now.second()), 2)
        } else {
            let c = rest.chars().next().unwrap_or_default();
            (c.to_string(), c.len_utf8())
        };
        out.push_str(&text);
        rest = &rest[consumed..];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ctx() -> NamingContext {
        NamingContext {
            name: "Report".into(),
            sheet: "Q3".into(),
            parent: "finance".into(),
            global_seq: 3,
            file_seq: 2,
            page_seq: 5,
            total_files: 7,
            total_pages: 12,
            username: "alex".into(),
            now: Local.with_ymd_and_hms(2026, 3, 9, 14, 5, 7).unwrap(),
        }
    }

    #[test]
    fn name_and_sequence() {
        assert_eq!(resolve_template("{name}_{seq}", &ctx()), "Report_3");
    }

    #[test]
    fn every_literal_tag() {
        let out = resolve_template(
            "{name}|{sheet}|{parent}|{seq}|{fseq}|{pseq}|{total}|{ptotal}|{username}",
            &ctx(),
        );
        assert_eq!(out, "Report|Q3|finance|3|2|5|7|12|alex");
    }

    #[test]
    fn unknown_tags_are_kept() {
        assert_eq!(resolve_template("{foo}-{name}-{Name}", &ctx()), "{foo}-Report-{Name}");
    }

    #[test]
    fn date_patterns() {
        assert_eq!(resolve_template("{date:yyyy-mm-dd}", &ctx()), "2026-03-09");
        assert_eq!(resolve_template("{date:HHMMSS}", &ctx()), "140507");
        assert_eq!(resolve_template("{date:yyyy年mm月}", &ctx()), "2026年03月");
        assert_eq!(resolve_template("{date:x}", &ctx()), "x");
    }

    #[test]
    fn rand_is_four_digits_shared_within_one_call() {
        for _ in 0..20 {
            let out = resolve_template("{rand}-{rand}", &ctx());
            let (first, second) = out.split_once('-').unwrap();
            assert_eq!(first.len(), 4);
            assert!(first.chars().all(|c| c.is_ascii_digit()));
            assert_eq!(first, second);
        }
    }

    #[test]
    fn substituted_values_are_not_rescanned() {
        let mut c = ctx();
        c.name = "{seq}{date:yyyy}".into();
        assert_eq!(resolve_template("{name}", &c), "{seq}{date:yyyy}");
    }

    #[test]
    fn template_without_tags_is_unchanged() {
        assert_eq!(resolve_template("plain name", &ctx()), "plain name");
    }
}
