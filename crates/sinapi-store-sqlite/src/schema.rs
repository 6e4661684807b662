//! SQL schema for the SINAPI SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
///
/// Primary keys are the upstream ids; there is no AUTOINCREMENT anywhere.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS states (
    id            INTEGER PRIMARY KEY,
    name          TEXT    NOT NULL,
    abbreviation  TEXT    NOT NULL,   -- UF, e.g. 'RS'
    ibge_code     INTEGER NOT NULL,
    deleted       INTEGER
);

CREATE TABLE IF NOT EXISTS pricing_tables (
    id             INTEGER PRIMARY KEY,
    name           TEXT,
    state_id       INTEGER NOT NULL REFERENCES states(id),
    month          INTEGER NOT NULL CHECK (month BETWEEN 1 AND 12),
    year           INTEGER NOT NULL,
    updated_at     TEXT,              -- upstream timestamp, verbatim
    table_type_id  INTEGER,
    deleted        INTEGER
);

CREATE TABLE IF NOT EXISTS units (
    id       INTEGER PRIMARY KEY,
    name     TEXT,
    deleted  INTEGER
);

-- `placeholder` marks rows synthesised for a class id seen only as a
-- reference; the real record overwrites them.
CREATE TABLE IF NOT EXISTS classes (
    id           INTEGER PRIMARY KEY,
    name         TEXT,
    deleted      INTEGER,
    placeholder  INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS catalog_entries (
    id                        INTEGER PRIMARY KEY,
    name                      TEXT,
    code                      TEXT,
    table_id                  INTEGER REFERENCES pricing_tables(id),
    unit_id                   INTEGER REFERENCES units(id),
    class_id                  INTEGER REFERENCES classes(id),
    value_burdened            REAL,
    value_unburdened          REAL,
    is_composition            INTEGER NOT NULL,
    pct_labor                 REAL,
    pct_material              REAL,
    pct_equipment             REAL,
    pct_third_party_services  REAL,
    pct_other                 REAL,
    deleted                   INTEGER
);

CREATE TABLE IF NOT EXISTS composition_lines (
    id                INTEGER PRIMARY KEY,
    parent_entry_id   INTEGER NOT NULL REFERENCES catalog_entries(id),
    child_entry_id    INTEGER NOT NULL REFERENCES catalog_entries(id),
    value_burdened    REAL,
    value_unburdened  REAL,
    coefficient       REAL,
    deleted           INTEGER
);

-- Ingestion progress; not part of the mirrored catalog.
-- `seq` grows on every save so the latest touch is unambiguous.
CREATE TABLE IF NOT EXISTS slice_checkpoints (
    state_id     INTEGER NOT NULL,
    year         INTEGER NOT NULL,
    month        INTEGER NOT NULL,
    composition  INTEGER NOT NULL,
    next_page    INTEGER NOT NULL,
    completed    INTEGER NOT NULL DEFAULT 0,
    updated_at   TEXT    NOT NULL,
    seq          INTEGER NOT NULL,
    PRIMARY KEY (state_id, year, month, composition)
);

-- One row per (state, year) a run has started; `completed` flips once every
-- month listed for that year has been enumerated.
CREATE TABLE IF NOT EXISTS state_years (
    state_id    INTEGER NOT NULL,
    year        INTEGER NOT NULL,
    completed   INTEGER NOT NULL DEFAULT 0,
    updated_at  TEXT    NOT NULL,
    PRIMARY KEY (state_id, year)
);

CREATE INDEX IF NOT EXISTS pricing_tables_slice_idx ON pricing_tables(state_id, year, month);
CREATE INDEX IF NOT EXISTS catalog_entries_table_idx ON catalog_entries(table_id);
CREATE INDEX IF NOT EXISTS catalog_entries_class_idx ON catalog_entries(class_id);
CREATE INDEX IF NOT EXISTS composition_lines_parent_idx ON composition_lines(parent_entry_id);
CREATE INDEX IF NOT EXISTS slice_checkpoints_seq_idx ON slice_checkpoints(seq);

PRAGMA user_version = 1;
";
