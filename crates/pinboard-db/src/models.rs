//! Database row types and query outcomes. Rows map directly to SQLite rows;
//! outcomes let callers tell a uniqueness clash apart from a driver failure.

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub avatar_path: String,
    pub followed_by: i64,
    pub following: i64,
}

pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub salt: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
}

pub struct NewPin<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub image_path: &'a str,
    pub board_id: Option<i64>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum CreateUserOutcome {
    Created(i64),
    UsernameTaken,
    EmailTaken,
}

#[derive(Debug, PartialEq, Eq)]
pub enum FollowOutcome {
    Followed,
    AlreadyFollowing,
    UnknownUser,
}

#[derive(Debug, PartialEq, Eq)]
pub enum UnfollowOutcome {
    Unfollowed,
    NotFollowing,
    UnknownUser,
}

#[derive(Debug, PartialEq, Eq)]
pub enum PinOutcome {
    Created(i64),
    BoardNotFound,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ReportOutcome {
    Reported {
        owner_id: i64,
        pin_title: String,
        reports_count: i64,
    },
    AlreadyReported,
    PinNotFound,
}

#[derive(Debug, PartialEq, Eq)]
pub enum CommentOutcome {
    Created(i64),
    PinNotFound,
}
