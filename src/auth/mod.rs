pub mod authorizor;
mod platform;
mod user;

pub use platform::{Platform, PLATFORM_ROLES};
pub use user::{User, USER_ID_HEADER, USER_ROLES_HEADER};
