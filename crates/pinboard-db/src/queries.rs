use crate::Database;
use crate::models::{
    CommentOutcome, CreateUserOutcome, FollowOutcome, NewPin, NewUser, PinOutcome, ReportOutcome,
    UnfollowOutcome, UserRow,
};
use anyhow::Result;
use pinboard_types::models::UserProfile;
use rusqlite::{Connection, params};

/// Every account starts with this board; pins without an explicit board land here.
pub const DEFAULT_BOARD_TITLE: &str = "Saved pins";

const USER_COLUMNS: &str =
    "id, username, email, password_hash, avatar_path, followed_by, following";

impl UserRow {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            user_id: self.id,
            username: self.username.clone(),
            avatar_path: self.avatar_path.clone(),
        }
    }
}

impl Database {
    // -- Users --

    /// Inserts the user together with their default board.
    pub fn create_user(&self, user: &NewUser<'_>) -> Result<CreateUserOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            if query_user_by_username(&tx, user.username)?.is_some() {
                return Ok(CreateUserOutcome::UsernameTaken);
            }
            let email_taken: Option<i64> = tx
                .query_row("SELECT id FROM users WHERE email = ?1", [user.email], |row| {
                    row.get(0)
                })
                .optional()?;
            if email_taken.is_some() {
                return Ok(CreateUserOutcome::EmailTaken);
            }

            tx.execute(
                "INSERT INTO users (username, email, password_hash, salt, first_name, last_name)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    user.username,
                    user.email,
                    user.password_hash,
                    user.salt,
                    user.first_name,
                    user.last_name
                ],
            )?;
            let user_id = tx.last_insert_rowid();

            tx.execute(
                "INSERT INTO boards (user_id, title) VALUES (?1, ?2)",
                params![user_id, DEFAULT_BOARD_TITLE],
            )?;

            tx.commit()?;
            Ok(CreateUserOutcome::Created(user_id))
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    // -- Follows --

    pub fn follow(&self, follower_id: i64, followed_id: i64) -> Result<FollowOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            if query_user_by_id(&tx, followed_id)?.is_none() {
                return Ok(FollowOutcome::UnknownUser);
            }

            let inserted = tx.execute(
                "INSERT OR IGNORE INTO followers (follower_id, followed_id) VALUES (?1, ?2)",
                params![follower_id, followed_id],
            )?;
            if inserted == 0 {
                return Ok(FollowOutcome::AlreadyFollowing);
            }

            tx.execute(
                "UPDATE users SET following = following + 1 WHERE id = ?1",
                [follower_id],
            )?;
            tx.execute(
                "UPDATE users SET followed_by = followed_by + 1 WHERE id = ?1",
                [followed_id],
            )?;

            tx.commit()?;
            Ok(FollowOutcome::Followed)
        })
    }

    pub fn unfollow(&self, follower_id: i64, followed_id: i64) -> Result<UnfollowOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            if query_user_by_id(&tx, followed_id)?.is_none() {
                return Ok(UnfollowOutcome::UnknownUser);
            }

            let removed = tx.execute(
                "DELETE FROM followers WHERE follower_id = ?1 AND followed_id = ?2",
                params![follower_id, followed_id],
            )?;
            if removed == 0 {
                return Ok(UnfollowOutcome::NotFollowing);
            }

            tx.execute(
                "UPDATE users SET following = following - 1 WHERE id = ?1",
                [follower_id],
            )?;
            tx.execute(
                "UPDATE users SET followed_by = followed_by - 1 WHERE id = ?1",
                [followed_id],
            )?;

            tx.commit()?;
            Ok(UnfollowOutcome::Unfollowed)
        })
    }

    // -- Boards & pins --

    #[cfg(test)]
    fn default_board(&self, user_id: i64) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id FROM boards WHERE user_id = ?1 ORDER BY id LIMIT 1",
                [user_id],
                |row| row.get(0),
            )
            .optional()
        })
    }

    /// Creates the pin and files it on `pin.board_id`, or on the owner's
    /// default board when none is given. The board must belong to the owner.
    pub fn create_pin(&self, user_id: i64, pin: &NewPin<'_>) -> Result<PinOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let board_id: Option<i64> = match pin.board_id {
                Some(board_id) => tx
                    .query_row(
                        "SELECT id FROM boards WHERE id = ?1 AND user_id = ?2",
                        params![board_id, user_id],
                        |row| row.get(0),
                    )
                    .optional()?,
                None => tx
                    .query_row(
                        "SELECT id FROM boards WHERE user_id = ?1 ORDER BY id LIMIT 1",
                        [user_id],
                        |row| row.get(0),
                    )
                    .optional()?,
            };
            let Some(board_id) = board_id else {
                return Ok(PinOutcome::BoardNotFound);
            };

            tx.execute(
                "INSERT INTO pins (user_id, title, description, image_path) VALUES (?1, ?2, ?3, ?4)",
                params![user_id, pin.title, pin.description, pin.image_path],
            )?;
            let pin_id = tx.last_insert_rowid();

            tx.execute(
                "INSERT INTO pairs (board_id, pin_id) VALUES (?1, ?2)",
                params![board_id, pin_id],
            )?;

            tx.commit()?;
            Ok(PinOutcome::Created(pin_id))
        })
    }

    #[cfg(test)]
    fn pins_on_board(&self, board_id: i64) -> Result<Vec<i64>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT pin_id FROM pairs WHERE board_id = ?1 ORDER BY pin_id")?;
            let ids = stmt
                .query_map([board_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<i64>, _>>()?;
            Ok(ids)
        })
    }

    // -- Reports --

    /// Records a report and bumps the pin's counter. One report per sender per pin.
    pub fn report_pin(&self, pin_id: i64, sender_id: i64, description: &str) -> Result<ReportOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let pin: Option<(i64, String)> = tx
                .query_row(
                    "SELECT user_id, title FROM pins WHERE id = ?1",
                    [pin_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let Some((owner_id, pin_title)) = pin else {
                return Ok(ReportOutcome::PinNotFound);
            };

            let inserted = tx.execute(
                "INSERT OR IGNORE INTO reports (pin_id, sender_id, description) VALUES (?1, ?2, ?3)",
                params![pin_id, sender_id, description],
            )?;
            if inserted == 0 {
                return Ok(ReportOutcome::AlreadyReported);
            }

            tx.execute(
                "UPDATE pins SET reports_count = reports_count + 1 WHERE id = ?1",
                [pin_id],
            )?;
            let reports_count: i64 = tx.query_row(
                "SELECT reports_count FROM pins WHERE id = ?1",
                [pin_id],
                |row| row.get(0),
            )?;

            tx.commit()?;
            Ok(ReportOutcome::Reported {
                owner_id,
                pin_title,
                reports_count,
            })
        })
    }

    // -- Comments --

    pub fn add_comment(&self, user_id: i64, pin_id: i64, text: &str) -> Result<CommentOutcome> {
        self.with_conn_mut(|conn| {
            let exists: Option<i64> = conn
                .query_row("SELECT id FROM pins WHERE id = ?1", [pin_id], |row| row.get(0))
                .optional()?;
            if exists.is_none() {
                return Ok(CommentOutcome::PinNotFound);
            }

            conn.execute(
                "INSERT INTO comments (user_id, pin_id, text) VALUES (?1, ?2, ?3)",
                params![user_id, pin_id, text],
            )?;
            Ok(CommentOutcome::Created(conn.last_insert_rowid()))
        })
    }
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM users WHERE username = ?1",
        USER_COLUMNS
    ))?;

    let row = stmt.query_row([username], map_user).optional()?;

    Ok(row)
}

fn query_user_by_id(conn: &Connection, id: i64) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS))?;

    let row = stmt.query_row([id], map_user).optional()?;

    Ok(row)
}

fn map_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        avatar_path: row.get(4)?,
        followed_by: row.get(5)?,
        following: row.get(6)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user<'a>(username: &'a str, email: &'a str) -> NewUser<'a> {
        NewUser {
            username,
            email,
            password_hash: "$argon2id$stub",
            salt: "c2FsdA",
            first_name: "",
            last_name: "",
        }
    }

    fn seeded() -> (Database, i64, i64) {
        let db = Database::open_in_memory().unwrap();
        let CreateUserOutcome::Created(alice) =
            db.create_user(&new_user("alice", "alice@example.com")).unwrap()
        else {
            panic!("alice not created");
        };
        let CreateUserOutcome::Created(bob) =
            db.create_user(&new_user("bob", "bob@example.com")).unwrap()
        else {
            panic!("bob not created");
        };
        (db, alice, bob)
    }

    #[test]
    fn ids_start_at_one_and_default_board_exists() {
        let (db, alice, bob) = seeded();
        assert_eq!((alice, bob), (1, 2));
        assert!(db.default_board(alice).unwrap().is_some());

        let row = db.get_user_by_username("bob").unwrap().unwrap();
        assert_eq!(row.profile().user_id, bob);
    }

    #[test]
    fn duplicate_username_and_email() {
        let (db, _, _) = seeded();
        assert_eq!(
            db.create_user(&new_user("alice", "other@example.com")).unwrap(),
            CreateUserOutcome::UsernameTaken
        );
        assert_eq!(
            db.create_user(&new_user("carol", "bob@example.com")).unwrap(),
            CreateUserOutcome::EmailTaken
        );
    }

    #[test]
    fn follow_and_unfollow_keep_counters() {
        let (db, alice, bob) = seeded();

        assert_eq!(db.follow(alice, bob).unwrap(), FollowOutcome::Followed);
        assert_eq!(db.follow(alice, bob).unwrap(), FollowOutcome::AlreadyFollowing);
        assert_eq!(db.follow(alice, 99).unwrap(), FollowOutcome::UnknownUser);

        let bob_row = db.get_user_by_id(bob).unwrap().unwrap();
        let alice_row = db.get_user_by_id(alice).unwrap().unwrap();
        assert_eq!(bob_row.followed_by, 1);
        assert_eq!(alice_row.following, 1);

        assert_eq!(db.unfollow(alice, bob).unwrap(), UnfollowOutcome::Unfollowed);
        assert_eq!(db.unfollow(alice, bob).unwrap(), UnfollowOutcome::NotFollowing);
        assert_eq!(db.get_user_by_id(bob).unwrap().unwrap().followed_by, 0);
    }

    #[test]
    fn pins_land_on_default_board_and_reports_count_once_per_sender() {
        let (db, alice, bob) = seeded();
        let pin = NewPin {
            title: "sunset",
            description: "",
            image_path: "pins/sunset.jpg",
            board_id: None,
        };
        let PinOutcome::Created(pin_id) = db.create_pin(alice, &pin).unwrap() else {
            panic!("pin not created");
        };
        let board = db.default_board(alice).unwrap().unwrap();
        assert_eq!(db.pins_on_board(board).unwrap(), vec![pin_id]);

        let foreign_board = db.default_board(bob).unwrap();
        let misplaced = NewPin { board_id: foreign_board, ..pin };
        assert_eq!(db.create_pin(alice, &misplaced).unwrap(), PinOutcome::BoardNotFound);

        assert_eq!(
            db.report_pin(pin_id, bob, "spam").unwrap(),
            ReportOutcome::Reported {
                owner_id: alice,
                pin_title: "sunset".into(),
                reports_count: 1
            }
        );
        assert_eq!(db.report_pin(pin_id, bob, "spam").unwrap(), ReportOutcome::AlreadyReported);
        assert_eq!(db.report_pin(404, bob, "").unwrap(), ReportOutcome::PinNotFound);

        assert!(matches!(db.add_comment(bob, pin_id, "nice").unwrap(), CommentOutcome::Created(_)));
        assert_eq!(db.add_comment(bob, 404, "nice").unwrap(), CommentOutcome::PinNotFound);
    }
}
