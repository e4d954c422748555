//! Data models for mailcmd
//!
//! Email records, parsed commands, drafts and command responses.

mod attachment;
mod command;
mod draft;
mod email;
mod response;

pub use attachment::*;
pub use command::*;
pub use draft::*;
pub use email::*;
pub use response::*;
