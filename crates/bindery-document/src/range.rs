// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page range expressions.
//
// Syntax: comma-separated tokens, each a bare 1-based page number or a range
// `a-b` where either bound may be omitted. Parsing is permissive: tokens that
// are out of range or malformed select nothing and raise no error.

use std::collections::BTreeSet;

use bindery_core::is_all_pages;
use tracing::trace;

/// Parse `spec` against a document of `total` pages.
///
/// Returns 0-based page indices, strictly ascending. An empty or "all pages"
/// expression selects every page; an empty result means the expression
/// matched nothing and is distinct from "all pages".
pub fn parse_page_spec(spec: &str, total: usize) -> Vec<usize> {
    if is_all_pages(spec) {
        return (0..total).collect();
    }

    let mut selected = BTreeSet::new();
    for raw in spec.split(',') {
        let token: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        if token.is_empty() {
            continue;
        }
        match select_token(&token, total) {
            Some((start, end)) => selected.extend(start - 1..end),
            None => trace!(token, total, "range token selects nothing"),
        }
    }
    selected.into_iter().collect()
}

/// Inclusive 1-based bounds selected by one token, if any.
fn select_token(token: &str, total: usize) -> Option<(usize, usize)> {
    if total == 0 {
        return None;
    }
    match token.split_once('-') {
        Some((left, right)) => {
            let start = bound(left, 1)?.max(1);
            let end = bound(right, total)?.min(total);
            (start <= end).then_some((start, end))
        }
        None => {
            let n = number(token)?;
            (1..=total).contains(&n).then_some((n, n))
        }
    }
}

/// A range bound; empty means `default`, non-numeric selects nothing.
fn bound(text: &str, default: usize) -> Option<usize> {
    if text.is_empty() { Some(default) } else { number(text) }
}

/// ASCII digits only, saturating instead of overflowing.
fn number(text: &str) -> Option<usize> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(text.bytes().fold(0usize, |n, b| {
        n.saturating_mul(10).saturating_add(usize::from(b - b'0'))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_tokens() {
        assert_eq!(parse_page_spec("1-3,5,8-", 10), [0, 1, 2, 4, 7, 8, 9]);
    }

    #[test]
    fn open_left_range_starts_at_one() {
        assert_eq!(parse_page_spec("-3", 5), [0, 1, 2]);
    }

    #[test]
    fn empty_and_sentinels_select_everything() {
        assert_eq!(parse_page_spec("", 4), [0, 1, 2, 3]);
        assert_eq!(parse_page_spec("All Pages", 3), [0, 1, 2]);
        assert_eq!(parse_page_spec("全ページ", 2), [0, 1]);
    }

    #[test]
    fn out_of_range_number_is_dropped() {
        assert!(parse_page_spec("99", 5).is_empty());
        assert!(parse_page_spec("0", 5).is_empty());
    }

    #[test]
    fn ranges_are_clamped() {
        assert_eq!(parse_page_spec("0-2", 5), [0, 1]);
        assert_eq!(parse_page_spec("4-99", 5), [3, 4]);
        assert!(parse_page_spec("4-2", 5).is_empty());
        assert!(parse_page_spec("7-9", 5).is_empty());
    }

    #[test]
    fn oversized_bounds_saturate() {
        assert_eq!(parse_page_spec("2-99999999999999999999", 4), [1, 2, 3]);
        assert!(parse_page_spec("99999999999999999999", 4).is_empty());
        assert!(parse_page_spec("99999999999999999999-", 4).is_empty());
    }

    #[test]
    fn signs_are_not_digits() {
        assert!(parse_page_spec("+3", 4).is_empty());
        assert!(parse_page_spec("1-+3", 4).is_empty());
        assert!(parse_page_spec("٣", 4).is_empty());
    }

    #[test]
    fn whitespace_inside_tokens_is_ignored() {
        assert_eq!(parse_page_spec(" 1 - 2 , 4 ", 5), [0, 1, 3]);
    }

    #[test]
    fn junk_tokens_are_ignored() {
        assert_eq!(parse_page_spec("abc,2,x-3,1-2-3,", 5), [1]);
    }

    #[test]
    fn overlapping_tokens_collapse() {
        assert_eq!(parse_page_spec("3,1-4,2", 6), [0, 1, 2, 3]);
    }

    #[test]
    fn result_is_ascending_and_in_bounds() {
        for spec in ["5,1,3", "-", "2-,-2", "10,9,8-", "3-3,3"] {
            let pages = parse_page_spec(spec, 9);
            assert!(pages.windows(2).all(|w| w[0] < w[1]), "{spec}: {pages:?}");
            assert!(pages.iter().all(|&p| p < 9), "{spec}: {pages:?}");
        }
    }

    #[test]
    fn empty_document_selects_nothing() {
        assert!(parse_page_spec("1-3", 0).is_empty());
        assert!(parse_page_spec("", 0).is_empty());
    }
}
