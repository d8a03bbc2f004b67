//! Lightweight SQL classification for query span attributes.

use once_cell::sync::Lazy;
use regex::Regex;

/// Leading keyword class of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlOperation {
    Select,
    Insert,
    Update,
    Delete,
    Create,
    Drop,
    Alter,
    Truncate,
    Begin,
    Commit,
    Rollback,
    Savepoint,
    Set,
    Other,
}

impl SqlOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            SqlOperation::Select => "SELECT",
            SqlOperation::Insert => "INSERT",
            SqlOperation::Update => "UPDATE",
            SqlOperation::Delete => "DELETE",
            SqlOperation::Create => "CREATE",
            SqlOperation::Drop => "DROP",
            SqlOperation::Alter => "ALTER",
            SqlOperation::Truncate => "TRUNCATE",
            SqlOperation::Begin => "BEGIN",
            SqlOperation::Commit => "COMMIT",
            SqlOperation::Rollback => "ROLLBACK",
            SqlOperation::Savepoint => "SAVEPOINT",
            SqlOperation::Set => "SET",
            SqlOperation::Other => "QUERY",
        }
    }
}

impl std::fmt::Display for SqlOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Leading keyword -> operation. `WITH` and `START` are aliases.
const KEYWORDS: &[(&str, SqlOperation)] = &[
    ("SELECT", SqlOperation::Select),
    ("WITH", SqlOperation::Select),
    ("INSERT", SqlOperation::Insert),
    ("UPDATE", SqlOperation::Update),
    ("DELETE", SqlOperation::Delete),
    ("CREATE", SqlOperation::Create),
    ("DROP", SqlOperation::Drop),
    ("ALTER", SqlOperation::Alter),
    ("TRUNCATE", SqlOperation::Truncate),
    ("BEGIN", SqlOperation::Begin),
    ("START", SqlOperation::Begin),
    ("COMMIT", SqlOperation::Commit),
    ("ROLLBACK", SqlOperation::Rollback),
    ("SAVEPOINT", SqlOperation::Savepoint),
    ("SET", SqlOperation::Set),
];

static LEADING_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*([A-Za-z]+)").unwrap());

// One pattern per operation that names a table; capture group 1 is the table.
static TABLE_PATTERNS: Lazy<Vec<(SqlOperation, Regex)>> = Lazy::new(|| {
    const IDENT: &str = r#"[`"\[]?(\w+)[`"\]]?"#;
    [
        (SqlOperation::Select, r"\bFROM\s+"),
        (SqlOperation::Insert, r"\bINSERT\s+INTO\s+"),
        (SqlOperation::Update, r"\bUPDATE\s+"),
        (SqlOperation::Delete, r"\bDELETE\s+FROM\s+"),
        (
            SqlOperation::Create,
            r"\bCREATE\s+(?:TEMP(?:ORARY)?\s+)?TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?",
        ),
        (SqlOperation::Drop, r"\bDROP\s+TABLE\s+(?:IF\s+EXISTS\s+)?"),
        (SqlOperation::Alter, r"\bALTER\s+TABLE\s+"),
        (SqlOperation::Truncate, r"\bTRUNCATE\s+(?:TABLE\s+)?"),
    ]
    .into_iter()
    .map(|(operation, prefix)| {
        let pattern = format!("(?i){}{}", prefix, IDENT);
        (operation, Regex::new(&pattern).unwrap())
    })
    .collect()
});

/// Classify a statement by its leading keyword.
pub fn parse_operation(sql: &str) -> SqlOperation {
    let Some(word) = LEADING_WORD.captures(sql).and_then(|caps| caps.get(1)) else {
        return SqlOperation::Other;
    };

    KEYWORDS
        .iter()
        .find(|(keyword, _)| word.as_str().eq_ignore_ascii_case(keyword))
        .map(|(_, operation)| *operation)
        .unwrap_or(SqlOperation::Other)
}

/// Extract the primary table of a statement, lowercased.
pub fn extract_table(sql: &str, operation: SqlOperation) -> Option<String> {
    let (_, regex) = TABLE_PATTERNS.iter().find(|(op, _)| *op == operation)?;
    regex
        .captures(sql)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_lowercase())
}

/// Operation and table of one statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSql {
    pub operation: SqlOperation,
    pub table: Option<String>,
}

impl ParsedSql {
    pub fn parse(sql: &str) -> Self {
        let operation = parse_operation(sql);
        let table = extract_table(sql, operation);
        Self { operation, table }
    }
}
