//! SQL schema for the Didact SQLite store.
//!
//! Applied idempotently at startup; `PRAGMA user_version` marks the schema
//! revision so later releases can gate migrations on it.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS principals (
    principal_id  TEXT PRIMARY KEY,
    name          TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS repositories (
    repository_id TEXT PRIMARY KEY,
    name          TEXT NOT NULL,
    owner_id      TEXT NOT NULL REFERENCES principals(principal_id),
    created_at    TEXT NOT NULL
);

-- One row per (repository, principal); re-granting replaces the level.
-- The owner needs no row here: ownership itself resolves to 'owner'.
CREATE TABLE IF NOT EXISTS repository_access (
    repository_id TEXT NOT NULL REFERENCES repositories(repository_id),
    principal_id  TEXT NOT NULL REFERENCES principals(principal_id),
    level         TEXT NOT NULL,   -- 'read' | 'write' | 'owner'
    granted_at    TEXT NOT NULL,
    PRIMARY KEY (repository_id, principal_id)
);

CREATE TABLE IF NOT EXISTS documents (
    document_id TEXT PRIMARY KEY,
    title       TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS repository_documents (
    repository_id TEXT NOT NULL REFERENCES repositories(repository_id),
    document_id   TEXT NOT NULL REFERENCES documents(document_id),
    PRIMARY KEY (repository_id, document_id)
);

CREATE TABLE IF NOT EXISTS chunks (
    chunk_id    TEXT PRIMARY KEY,
    document_id TEXT NOT NULL REFERENCES documents(document_id),
    position    INTEGER NOT NULL,
    content     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS units (
    unit_id       TEXT PRIMARY KEY,
    repository_id TEXT NOT NULL REFERENCES repositories(repository_id),
    title         TEXT NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tasks (
    task_id           TEXT PRIMARY KEY,
    chunk_id          TEXT NOT NULL REFERENCES chunks(chunk_id),
    skill_id          TEXT,            -- opaque external reference
    kind              TEXT NOT NULL,   -- 'multiple_choice' | 'free_text'
    question          TEXT NOT NULL,
    has_been_modified INTEGER NOT NULL DEFAULT 0,
    created_at        TEXT NOT NULL,
    deleted_at        TEXT             -- set once on soft delete, never cleared
);

CREATE TABLE IF NOT EXISTS answer_options (
    option_id  TEXT PRIMARY KEY,
    task_id    TEXT NOT NULL REFERENCES tasks(task_id),
    text       TEXT NOT NULL,
    is_correct INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS unit_tasks (
    unit_id TEXT NOT NULL REFERENCES units(unit_id),
    task_id TEXT NOT NULL REFERENCES tasks(task_id),
    PRIMARY KEY (unit_id, task_id)
);

-- Snapshots are strictly append-only; numbering is dense per task and the
-- UNIQUE constraint is the structural backstop for concurrent mutations.
CREATE TABLE IF NOT EXISTS task_versions (
    version_id TEXT PRIMARY KEY,
    task_id    TEXT NOT NULL REFERENCES tasks(task_id),
    version    INTEGER NOT NULL,
    question   TEXT NOT NULL,
    kind       TEXT NOT NULL,
    chunk_id   TEXT NOT NULL,
    skill_id   TEXT,
    created_at TEXT NOT NULL,
    UNIQUE (task_id, version)
);

-- option_id carries no foreign key: it keeps pointing at the live option's
-- id after that row is deleted.
CREATE TABLE IF NOT EXISTS option_versions (
    option_version_id TEXT PRIMARY KEY,
    version_id        TEXT NOT NULL REFERENCES task_versions(version_id),
    option_id         TEXT NOT NULL,
    text              TEXT NOT NULL,
    is_correct        INTEGER NOT NULL
);

-- Append-only audit trail.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS task_changes (
    event_id    TEXT PRIMARY KEY,
    task_id     TEXT NOT NULL REFERENCES tasks(task_id),
    kind        TEXT NOT NULL,
    actor_id    TEXT NOT NULL REFERENCES principals(principal_id),
    option_id   TEXT,                           -- no foreign key; may dangle
    old_value   TEXT,
    new_value   TEXT,
    metadata    TEXT NOT NULL DEFAULT 'null',   -- compact JSON
    recorded_at TEXT NOT NULL
);

-- Append-only; option_id is NULLed explicitly before its option row is
-- deleted, so the constraint never fires on reconciliation.
CREATE TABLE IF NOT EXISTS task_answers (
    answer_id    TEXT PRIMARY KEY,
    task_id      TEXT NOT NULL REFERENCES tasks(task_id),
    principal_id TEXT NOT NULL REFERENCES principals(principal_id),
    option_id    TEXT REFERENCES answer_options(option_id),
    free_text    TEXT,
    result       TEXT NOT NULL,   -- 'correct' | 'incorrect' | 'partial'
    recorded_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS task_user_stats (
    task_id         TEXT NOT NULL REFERENCES tasks(task_id),
    principal_id    TEXT NOT NULL REFERENCES principals(principal_id),
    times_correct   INTEGER NOT NULL DEFAULT 0,
    times_incorrect INTEGER NOT NULL DEFAULT 0,
    times_partial   INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (task_id, principal_id)
);

-- Rows appear lazily with the first increment.
CREATE TABLE IF NOT EXISTS repository_stats (
    repository_id  TEXT PRIMARY KEY REFERENCES repositories(repository_id),
    total_created  INTEGER NOT NULL DEFAULT 0,
    total_modified INTEGER NOT NULL DEFAULT 0,
    total_deleted  INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS chunks_document_idx   ON chunks(document_id);
CREATE INDEX IF NOT EXISTS units_repository_idx  ON units(repository_id);
CREATE INDEX IF NOT EXISTS options_task_idx      ON answer_options(task_id);
CREATE INDEX IF NOT EXISTS unit_tasks_task_idx   ON unit_tasks(task_id);
CREATE INDEX IF NOT EXISTS versions_task_idx     ON task_versions(task_id);
CREATE INDEX IF NOT EXISTS changes_task_idx      ON task_changes(task_id);
CREATE INDEX IF NOT EXISTS answers_task_idx      ON task_answers(task_id);
CREATE INDEX IF NOT EXISTS answers_option_idx    ON task_answers(option_id);

PRAGMA user_version = 1;
";
