use serde::{Deserialize, Serialize};

use super::{Post, UserListEntry};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminStats {
    #[serde(rename = "totalUsers", default)]
    pub total_users: u64,
    #[serde(rename = "totalPosts", default)]
    pub total_posts: u64,
    #[serde(rename = "pendingReports", default)]
    pub pending_reports: u64,
    #[serde(rename = "newSignupsToday", default)]
    pub new_signups_today: u64,
    #[serde(rename = "loggedInUsers", default)]
    pub logged_in_users: u64,
    #[serde(rename = "visitsToday", default)]
    pub visits_today: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportedPost {
    #[serde(flatten)]
    pub post: Post,
    #[serde(rename = "reportCount", default)]
    pub report_count: u64,
}

/// Everything the admin console loads on open.
#[derive(Debug, Clone, Default)]
pub struct AdminDashboard {
    pub stats: AdminStats,
    pub users: Vec<UserListEntry>,
    pub reported_posts: Vec<ReportedPost>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    User,
    Post,
}
