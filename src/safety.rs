//! Read-only gate for candidate SQL.
//!
//! The check is deliberately coarse: the upper-cased text is searched for
//! write/DDL keywords as plain substrings, with no tokenization. A SELECT that
//! merely mentions one of them inside a literal or identifier (an employee
//! named "Insert", a column `created_at`) is rejected too.

use std::fmt;
use tracing::warn;

/// Keywords that make a statement unsafe wherever they appear.
pub const DENYLIST: &[&str] = &[
    "DROP", "DELETE", "UPDATE", "INSERT", "ALTER", "TRUNCATE", "CREATE", "GRANT", "REVOKE",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafetyVerdict {
    Allowed,
    Rejected { offending_operation: String },
}

impl SafetyVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, SafetyVerdict::Allowed)
    }
}

impl fmt::Display for SafetyVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafetyVerdict::Allowed => write!(f, "allowed"),
            SafetyVerdict::Rejected { offending_operation } => {
                write!(f, "rejected ({})", offending_operation)
            }
        }
    }
}

/// Inspect `sql` and decide whether it may be executed.
pub fn check(sql: &str) -> SafetyVerdict {
    let upper = sql.to_uppercase();

    if let Some(op) = DENYLIST.iter().find(|op| upper.contains(**op)) {
        warn!(operation = *op, "dangerous operation in candidate SQL");
        return SafetyVerdict::Rejected {
            offending_operation: op.to_string(),
        };
    }

    let trimmed = upper.trim();
    if !trimmed.starts_with("SELECT") {
        let first = trimmed
            .split(|c: char| c.is_whitespace() || c == ';' || c == '(')
            .next()
            .filter(|w| !w.is_empty())
            .unwrap_or("<empty>");
        warn!(statement = %preview(sql), "candidate SQL does not start with SELECT");
        return SafetyVerdict::Rejected {
            offending_operation: first.to_string(),
        };
    }

    SafetyVerdict::Allowed
}

/// `true` when `sql` is a read-only statement.
pub fn is_safe(sql: &str) -> bool {
    check(sql).is_allowed()
}

fn preview(sql: &str) -> String {
    sql.chars().take(50).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(op: &str) -> SafetyVerdict {
        SafetyVerdict::Rejected {
            offending_operation: op.to_string(),
        }
    }

    #[test]
    fn test_select_allowed() {
        assert!(is_safe("SELECT * FROM employees;"));
        assert!(is_safe("  select first_name from employees where salary > 10;"));
    }

    #[test]
    fn test_drop_rejected() {
        assert_eq!(check("DROP TABLE employees;"), rejected("DROP"));
        assert!(!is_safe("DROP TABLE employees;"));
    }

    #[test]
    fn test_stacked_statement_rejected() {
        assert_eq!(
            check("SELECT * FROM employees; DELETE FROM employees;"),
            rejected("DELETE")
        );
    }

    #[test]
    fn test_denylist_any_case_any_position() {
        for op in DENYLIST {
            let lower = op.to_lowercase();
            assert!(!is_safe(&format!("SELECT * FROM t WHERE x = '{}'", lower)), "{}", op);
            assert!(!is_safe(&format!("{} something", op)), "{}", op);
        }
    }

    #[test]
    fn test_substring_limitation_preserved() {
        // Literal and identifier matches are rejected as well.
        assert!(!is_safe("SELECT * FROM employees WHERE last_name = 'Insert';"));
        assert!(!is_safe("SELECT created_at FROM employees;"));
    }

    #[test]
    fn test_non_select_rejected_with_first_word() {
        assert_eq!(check("SHOW TABLES;"), rejected("SHOW"));
        assert_eq!(check("with x as (select 1) select * from x"), rejected("WITH"));
        assert_eq!(check("   "), rejected("<empty>"));
    }

    #[test]
    fn test_allowed_always_starts_with_select() {
        let candidates = [
            "SELECT 1;",
            "select count(*) from employees",
            "\n\tSELECT AVG(salary) FROM employees;",
            "EXPLAIN SELECT 1",
            "VALUES (1)",
        ];
        for sql in candidates {
            if is_safe(sql) {
                assert!(sql.trim().to_uppercase().starts_with("SELECT"));
            }
        }
    }
}
