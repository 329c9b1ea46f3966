//! SQL request guards shared by the direct and natural-language endpoints
//!
//! Two pure string operations:
//! - a keyword denylist deciding whether a statement may reach the engine
//! - a `LIMIT` clause appender for statements that carry none
//!
//! Neither parses SQL. Both work on the upper-cased text, so a keyword inside a
//! string literal, comment or identifier counts the same as a real clause.

/// Keywords that mark a statement as mutating or DDL
pub const FORBIDDEN_KEYWORDS: [&str; 7] = [
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "ATTACH", "DETACH",
];

/// Return the first forbidden keyword found in `sql`, if any
pub fn forbidden_keyword(sql: &str) -> Option<&'static str> {
    let upper = sql.to_uppercase();
    FORBIDDEN_KEYWORDS
        .iter()
        .copied()
        .find(|keyword| upper.contains(keyword))
}

/// Whether `sql` may be executed against the shared table
///
/// Rejects anything containing a forbidden keyword in any letter case.
/// This is a coarse substring scan, not a security boundary: `updated_at`
/// is rejected, while obfuscated statements may slip through.
pub fn is_safe_sql(sql: &str) -> bool {
    forbidden_keyword(sql).is_none()
}

/// When a requested row limit should be turned into a `LIMIT` clause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitPolicy {
    /// Any supplied limit is appended, zero included
    WhenPresent,
    /// Only a non-zero limit is appended
    WhenNonZero,
}

impl LimitPolicy {
    fn accepts(self, limit: i64) -> bool {
        match self {
            LimitPolicy::WhenPresent => true,
            LimitPolicy::WhenNonZero => limit != 0,
        }
    }
}

/// Whether `sql` already mentions `LIMIT` anywhere, in any case
pub fn has_limit(sql: &str) -> bool {
    sql.to_uppercase().contains("LIMIT")
}

/// Append ` LIMIT <limit>` to `sql` unless it already mentions `LIMIT`
///
/// The result is not checked for syntax: a trailing `;` or line comment in
/// `sql` leaves the appended clause outside the statement.
pub fn apply_limit(sql: &str, limit: Option<i64>, policy: LimitPolicy) -> String {
    match limit {
        Some(limit) if policy.accepts(limit) && !has_limit(sql) => {
            format!("{} LIMIT {}", sql, limit)
        }
        _ => sql.to_string(),
    }
}
