//! Built-in starter queries, listed in the order they are offered.

use sqlpad_storage::LIST_TABLES_QUERY;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleQuery {
    pub name: &'static str,
    pub query: &'static str,
}

pub const SAMPLE_QUERIES: &[SampleQuery] = &[
    SampleQuery {
        name: "Create Users Table",
        query: "CREATE TABLE users (
  id INTEGER PRIMARY KEY,
  name TEXT NOT NULL,
  email TEXT UNIQUE NOT NULL,
  created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);",
    },
    SampleQuery {
        name: "Insert Sample Data",
        query: "INSERT INTO users (name, email) VALUES
('John Doe', 'john@example.com'),
('Jane Smith', 'jane@example.com'),
('Bob Johnson', 'bob@example.com');",
    },
    SampleQuery {
        name: "Select All Users",
        query: "SELECT * FROM users;",
    },
    SampleQuery {
        name: "SQLite Version",
        query: "SELECT sqlite_version();",
    },
    SampleQuery {
        name: "List All Tables",
        query: LIST_TABLES_QUERY,
    },
];
