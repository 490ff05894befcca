//! Data models for BlinkVault entities.
//!
//! - `UserSummary`: the signed-in user held by the session
//! - `UserProfile`, `UserListEntry`: other users as seen from profiles and lists
//! - `Post`, `Feed`, `Comment`: feed content
//! - `Notification`: activity notifications
//! - Admin types: `AdminStats`, `ReportedPost`, `AdminDashboard`

pub mod admin;
pub mod notification;
pub mod post;
pub mod user;

pub use admin::{AdminDashboard, AdminStats, ReportKind, ReportedPost};
pub use notification::{unread_count, Notification};
pub use post::{Comment, Feed, FeedTab, Post, PostAuthor};
pub use user::{Role, UserListEntry, UserProfile, UserSummary, UsernameAvailability};
