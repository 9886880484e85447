//! Document number formats and sequence arithmetic.
//!
//! Pure helpers only; the store-backed assignment (max + 1 over the existing
//! numbers in scope, bounded retry on conflict) lives in the engine
//! operations. Formats:
//!
//! - Quote: `DEV-{year}-{month:02}-{seq:03}`, sequence scoped to (year, month)
//! - Invoice: `FACT-{year}-{seq:03}`, sequence scoped to year, gapless
//! - Credit note: `AV-{year}-{seq:03}`, sequence scoped to year
//! - Amendment: `{quoteYear}-{quoteSeq}-A{n}`, derived from the parent
//!   quote's number
//!
//! A number, once assigned, never changes; cancelling a document changes its
//! status, never its number.

/// Scope prefix for quote numbers of a given year and month.
pub fn quote_prefix(year: i32, month: u32) -> String {
    format!("DEV-{year}-{month:02}-")
}

/// Scope prefix for invoice numbers of a given year.
pub fn invoice_prefix(year: i32) -> String {
    format!("FACT-{year}-")
}

/// Scope prefix for credit note numbers of a given year.
pub fn credit_note_prefix(year: i32) -> String {
    format!("AV-{year}-")
}

/// Parse the sequence out of a number, given its scope prefix.
///
/// Numbers from other scopes (or malformed ones) yield `None` and are
/// ignored by sequence computation.
pub fn parse_seq(number: &str, prefix: &str) -> Option<u32> {
    number.strip_prefix(prefix)?.parse().ok()
}

/// Next sequence in a scope: max of the existing sequences + 1, default 1.
pub fn next_seq<'a>(numbers: impl Iterator<Item = &'a str>, prefix: &str) -> u32 {
    numbers
        .filter_map(|n| parse_seq(n, prefix))
        .max()
        .map_or(1, |max| max + 1)
}

/// Format a full number from a scope prefix and sequence.
pub fn format_number(prefix: &str, seq: u32) -> String {
    format!("{prefix}{seq:03}")
}

/// Derive an amendment number from the parent quote's number.
///
/// `DEV-2026-08-003` with 1 prior amendment becomes `2026-003-A2`. Returns
/// `None` when the parent number does not parse; assignment is then deferred
/// until the parent is numbered.
pub fn amendment_number(quote_number: &str, prior_amendments: usize) -> Option<String> {
    let mut parts = quote_number.split('-');
    if parts.next() != Some("DEV") {
        return None;
    }
    let year = parts.next()?;
    let _month = parts.next()?;
    let seq = parts.next()?;
    if parts.next().is_some() || year.is_empty() || seq.is_empty() {
        return None;
    }
    Some(format!("{year}-{seq}-A{}", prior_amendments + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequences_start_at_one() {
        assert_eq!(next_seq([].into_iter(), "FACT-2026-"), 1);
    }

    #[test]
    fn sequences_ignore_other_scopes() {
        let numbers = ["FACT-2026-001", "FACT-2026-007", "FACT-2025-042", "AV-2026-003"];
        assert_eq!(next_seq(numbers.into_iter(), "FACT-2026-"), 8);
        assert_eq!(next_seq(numbers.into_iter(), "AV-2026-"), 4);
    }

    #[test]
    fn quote_scope_is_year_and_month() {
        let numbers = ["DEV-2026-08-002", "DEV-2026-07-019"];
        let prefix = quote_prefix(2026, 8);
        assert_eq!(format_number(&prefix, next_seq(numbers.into_iter(), &prefix)), "DEV-2026-08-003");
    }

    #[test]
    fn amendment_number_derives_from_parent() {
        assert_eq!(
            amendment_number("DEV-2026-08-003", 0).as_deref(),
            Some("2026-003-A1")
        );
        assert_eq!(
            amendment_number("DEV-2026-08-003", 2).as_deref(),
            Some("2026-003-A3")
        );
    }

    #[test]
    fn malformed_parent_number_defers_assignment() {
        assert_eq!(amendment_number("FACT-2026-001", 0), None);
        assert_eq!(amendment_number("DEV-2026", 0), None);
    }
}
