//! Versioned SQL migrations for the polls database.
//! Statements are separated by `;`, so the SQL must not contain semicolons
//! inside literals or comments.

pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub sql: &'static str,
}

/// Bookkeeping table, created outside of the numbered migrations.
pub const MIGRATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL -- RFC3339
)
"#;

/// Ordered by `version`. Never edit an entry that has shipped, append a new one.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "0001_initial",
        sql: r#"
CREATE TABLE auth_user (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL DEFAULT '',
    first_name TEXT NOT NULL DEFAULT '',
    last_name TEXT NOT NULL DEFAULT '',
    password TEXT NOT NULL, -- argon2 PHC string
    is_staff INTEGER NOT NULL DEFAULT 0,
    is_superuser INTEGER NOT NULL DEFAULT 0,
    is_active INTEGER NOT NULL DEFAULT 1,
    date_joined TEXT NOT NULL, -- RFC3339
    last_login TEXT NULL
);

CREATE TABLE polls_question (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    question_text TEXT NOT NULL,
    pub_date TEXT NOT NULL -- RFC3339, fixed precision so text order is time order
);

CREATE INDEX idx_polls_question_pub_date ON polls_question(pub_date);

CREATE TABLE polls_choice (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    question_id INTEGER NOT NULL REFERENCES polls_question(id) ON DELETE CASCADE,
    choice_text TEXT NOT NULL,
    votes INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX idx_polls_choice_question_id ON polls_choice(question_id)
"#,
    },
    Migration {
        version: 2,
        name: "0002_question_end_date",
        sql: r#"
ALTER TABLE polls_question ADD COLUMN end_date TEXT NULL
"#,
    },
    Migration {
        version: 3,
        name: "0003_vote",
        sql: r#"
CREATE TABLE polls_vote (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES auth_user(id) ON DELETE CASCADE,
    choice_id INTEGER NOT NULL REFERENCES polls_choice(id) ON DELETE CASCADE,
    question_id INTEGER NOT NULL REFERENCES polls_question(id) ON DELETE CASCADE,
    UNIQUE (user_id, question_id)
);

CREATE INDEX idx_polls_vote_choice_id ON polls_vote(choice_id);

-- Tallies are derived from polls_vote from here on.
ALTER TABLE polls_choice DROP COLUMN votes
"#,
    },
    Migration {
        version: 4,
        name: "0004_vote_choice_question",
        sql: r#"
CREATE UNIQUE INDEX idx_polls_choice_id_question ON polls_choice(id, question_id);

-- A vote's question always follows its choice, moving a choice moves its votes.
CREATE TABLE polls_vote_new (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES auth_user(id) ON DELETE CASCADE,
    choice_id INTEGER NOT NULL,
    question_id INTEGER NOT NULL REFERENCES polls_question(id) ON DELETE CASCADE,
    UNIQUE (user_id, question_id),
    FOREIGN KEY (choice_id, question_id) REFERENCES polls_choice(id, question_id)
        ON UPDATE CASCADE ON DELETE CASCADE
);

INSERT OR IGNORE INTO polls_vote_new (id, user_id, choice_id, question_id)
SELECT v.id, v.user_id, v.choice_id, c.question_id
FROM polls_vote v
JOIN polls_choice c ON c.id = v.choice_id
ORDER BY v.id;

DROP TABLE polls_vote;

ALTER TABLE polls_vote_new RENAME TO polls_vote;

CREATE INDEX idx_polls_vote_choice_id ON polls_vote(choice_id)
"#,
    },
    Migration {
        version: 5,
        name: "0005_username_nocase",
        sql: r#"
CREATE UNIQUE INDEX idx_auth_user_username_nocase ON auth_user(username COLLATE NOCASE)
"#,
    },
];
