use sqlx::error::ErrorKind;

use super::error::DataError;

pub fn map_sqlx_error(err: sqlx::Error) -> DataError {
    match err {
        sqlx::Error::Database(db) => match db.kind() {
            ErrorKind::UniqueViolation => DataError::Duplicate {
                constraint: db.constraint().unwrap_or("unknown").to_string(),
            },
            ErrorKind::ForeignKeyViolation => DataError::InvalidInput {
                message: db.message().to_string(),
            },
            ErrorKind::NotNullViolation | ErrorKind::CheckViolation => DataError::Integrity {
                message: db.message().to_string(),
            },
            _ if db.message().contains("invalid input syntax") => DataError::InvalidInput {
                message: db.message().to_string(),
            },
            _ if db.message().contains("violates") => DataError::Integrity {
                message: db.message().to_string(),
            },
            _ if db
                .message()
                .contains("canceling statement due to user request") =>
            {
                DataError::Timeout
            }
            _ => DataError::from_persistence(db.message()),
        },
        sqlx::Error::PoolTimedOut => DataError::Timeout,
        sqlx::Error::ColumnDecode { index, source } => DataError::decode(index, source.to_string()),
        other => DataError::from_persistence(other),
    }
}

/// Whether the statement produces a row set rather than an affected-row count.
pub(crate) fn returns_rows(sql: &str) -> bool {
    let head = sql.trim_start();
    let keyword: String = head
        .chars()
        .take_while(|ch| ch.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase();

    matches!(keyword.as_str(), "SELECT" | "WITH" | "PRAGMA" | "VALUES")
        || sql.to_ascii_uppercase().contains(" RETURNING ")
}

/// Rewrite `?` placeholders into Postgres' numbered `$n` form, leaving quoted
/// literals and identifiers untouched.
pub(crate) fn number_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut index = 0usize;
    let mut quote: Option<char> = None;

    for ch in sql.chars() {
        match quote {
            Some(open) => {
                out.push(ch);
                if ch == open {
                    quote = None;
                }
            }
            None if ch == '\'' || ch == '"' => {
                quote = Some(ch);
                out.push(ch);
            }
            None if ch == '?' => {
                index += 1;
                out.push('$');
                out.push_str(&index.to_string());
            }
            None => out.push(ch),
        }
    }

    out
}

/// First keyword of the statement, used as a low-cardinality metric label.
pub(crate) fn statement_kind(sql: &str) -> &'static str {
    let head = sql.trim_start();
    let upper = head
        .get(..head.len().min(6))
        .unwrap_or_default()
        .to_ascii_uppercase();
    match upper.as_str() {
        "SELECT" => "select",
        "INSERT" => "insert",
        "UPDATE" => "update",
        "DELETE" => "delete",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_numbered_in_order() {
        assert_eq!(
            number_placeholders("SELECT * FROM t WHERE a = ? AND b = ?"),
            "SELECT * FROM t WHERE a = $1 AND b = $2"
        );
    }

    #[test]
    fn quoted_question_marks_are_left_alone() {
        assert_eq!(
            number_placeholders("SELECT '?' AS q, \"w?\" FROM t WHERE a = ?"),
            "SELECT '?' AS q, \"w?\" FROM t WHERE a = $1"
        );
    }

    #[test]
    fn select_and_returning_produce_rows() {
        assert!(returns_rows("  select * from t"));
        assert!(returns_rows("INSERT INTO t (a) VALUES (?) RETURNING id"));
        assert!(!returns_rows("DELETE FROM t WHERE a = ?"));
        assert!(!returns_rows("UPDATE t SET a = ?"));
    }

    #[test]
    fn statement_kind_labels() {
        assert_eq!(statement_kind("SELECT 1"), "select");
        assert_eq!(statement_kind("delete from x"), "delete");
        assert_eq!(statement_kind("PRAGMA foo"), "other");
        assert_eq!(statement_kind("x"), "other");
    }
}
