use duet_core::clock::SystemClock;
use duet_core::db::migrations::latest_version;
use duet_core::db::{open_db, open_db_in_memory, DbError};
use duet_core::{RepoError, SqliteStore};
use rusqlite::Connection;
use std::sync::Arc;

const TABLES: &[&str] = &[
    "users",
    "spaces",
    "space_members",
    "unbind_requests",
    "sessions",
    "notifications",
    "memories",
    "milestones",
    "reactions",
    "comments",
];

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    for table in TABLES {
        assert_table_exists(&conn, table);
    }
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("duet.sqlite3");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "space_members");
}

#[test]
fn open_db_creates_missing_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data").join("nested").join("duet.sqlite3");

    let conn = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn), latest_version());
    assert!(path.exists());
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.sqlite3");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn store_rejects_unmigrated_connection() {
    let conn = Connection::open_in_memory().unwrap();
    let err = SqliteStore::try_new(conn, Arc::new(SystemClock))
        .err()
        .unwrap();
    match err {
        RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        } => {
            assert_eq!(expected_version, latest_version());
            assert_eq!(actual_version, 0);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn schema_allows_one_active_membership_per_user() {
    let conn = open_db_in_memory().unwrap();
    let insert = "INSERT INTO space_members (space_id, user_id, joined_at, is_deleted)
                  VALUES (?1, 'user-1', 0, ?2);";

    conn.execute(insert, rusqlite::params!["space-a", 0]).unwrap();
    assert!(conn.execute(insert, rusqlite::params!["space-b", 0]).is_err());

    // Tombstoned rows do not count against the user.
    conn.execute("UPDATE space_members SET is_deleted = 1;", [])
        .unwrap();
    conn.execute(insert, rusqlite::params!["space-b", 0]).unwrap();
}

#[test]
fn schema_allows_one_pending_unbind_per_space() {
    let conn = open_db_in_memory().unwrap();
    let insert = "INSERT INTO unbind_requests (
                      id, space_id, requested_by, requested_at, expires_at, status, is_deleted
                  ) VALUES (?1, 'space-a', 'user-1', 0, 1, ?2, 0);";

    conn.execute(insert, ["r1", "pending"]).unwrap();
    assert!(conn.execute(insert, ["r2", "pending"]).is_err());
    conn.execute(insert, ["r3", "cancelled"]).unwrap();
    conn.execute(insert, ["r4", "completed"]).unwrap();
}

#[test]
fn version_one_database_is_upgraded_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("duet.sqlite3");
    {
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(include_str!("../src/db/migrations/0001_init.sql"))
            .unwrap();
        conn.execute_batch(
            "PRAGMA user_version = 1;
             INSERT INTO users (id, nickname, created_at) VALUES ('user-1', 'alex', 0);",
        )
        .unwrap();
    }

    let conn = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "reactions");
    assert_table_exists(&conn, "comments");
    let nickname: String = conn
        .query_row("SELECT nickname FROM users WHERE id = 'user-1';", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(nickname, "alex");
}

#[test]
fn schema_allows_one_active_reaction_per_user_and_memory() {
    let conn = open_db_in_memory().unwrap();
    let insert = "INSERT INTO reactions (id, memory_id, user_id, kind, created_at, is_deleted)
                  VALUES (?1, 'memory-1', 'user-1', 'love', 0, 0);";

    conn.execute(insert, ["r1"]).unwrap();
    assert!(conn.execute(insert, ["r2"]).is_err());
    conn.execute("UPDATE reactions SET is_deleted = 1;", [])
        .unwrap();
    conn.execute(insert, ["r3"]).unwrap();
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
