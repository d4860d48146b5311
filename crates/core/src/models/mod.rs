//! Data models for badgesync

mod event;
mod history;
mod hub;
mod meeting;
mod member;
mod project;

pub use event::*;
pub use history::*;
pub use hub::*;
pub use meeting::*;
pub use member::*;
pub use project::*;
