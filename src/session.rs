//! Keys stored in the tower-sessions record.

pub const USER_ID: &str = "user_id";
pub const ROLE: &str = "role";
