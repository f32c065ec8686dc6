use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            username        TEXT NOT NULL UNIQUE,
            email           TEXT NOT NULL UNIQUE,
            password_hash   TEXT NOT NULL,
            salt            TEXT NOT NULL,
            first_name      TEXT NOT NULL DEFAULT '',
            last_name       TEXT NOT NULL DEFAULT '',
            avatar_path     TEXT NOT NULL DEFAULT '',
            followed_by     INTEGER NOT NULL DEFAULT 0,
            following       INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS boards (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id         INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            title           TEXT NOT NULL,
            description     TEXT NOT NULL DEFAULT '',
            avatar_path     TEXT NOT NULL DEFAULT '',
            avg_color       TEXT NOT NULL DEFAULT '',
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_boards_user
            ON boards(user_id, id);

        CREATE TABLE IF NOT EXISTS pins (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id         INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            title           TEXT NOT NULL,
            description     TEXT NOT NULL DEFAULT '',
            image_path      TEXT NOT NULL,
            image_width     INTEGER NOT NULL DEFAULT 0,
            image_height    INTEGER NOT NULL DEFAULT 0,
            avg_color       TEXT NOT NULL DEFAULT '',
            reports_count   INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS pairs (
            board_id        INTEGER NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
            pin_id          INTEGER NOT NULL REFERENCES pins(id) ON DELETE CASCADE,
            PRIMARY KEY (board_id, pin_id)
        );

        CREATE TABLE IF NOT EXISTS followers (
            follower_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            followed_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            PRIMARY KEY (follower_id, followed_id)
        );

        CREATE TABLE IF NOT EXISTS reports (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            pin_id          INTEGER NOT NULL REFERENCES pins(id) ON DELETE CASCADE,
            sender_id       INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            description     TEXT NOT NULL DEFAULT '',
            UNIQUE(pin_id, sender_id)
        );

        CREATE TABLE IF NOT EXISTS comments (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id         INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            pin_id          INTEGER NOT NULL REFERENCES pins(id) ON DELETE CASCADE,
            text            TEXT NOT NULL,
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_comments_pin
            ON comments(pin_id, id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
