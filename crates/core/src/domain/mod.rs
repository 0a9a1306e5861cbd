pub mod check_in;
pub mod holiday;
pub mod leave;
pub mod reminder;
pub mod setting;
pub mod user;
