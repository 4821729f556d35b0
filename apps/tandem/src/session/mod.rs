pub mod driver;
pub mod machine;

pub use driver::{start, SessionConfig, SessionHandle};
pub use machine::{ConnectionState, SessionNotice, UserCommand};
