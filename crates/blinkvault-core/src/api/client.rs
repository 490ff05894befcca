//! API client for the BlinkVault REST API.
//!
//! `BlinkVaultClient` wraps the request pipeline with typed endpoints.
//! Authentication exchanges feed their result into the session; everything
//! else is a plain authenticated call.

use std::sync::Arc;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::auth::SessionManager;
use crate::config::Config;
use crate::models::post::{CommentResponse, CommentsResponse, SavedResponse};
use crate::models::user::{
    AuthGrant, BlockedResponse, FollowersResponse, FollowingResponse, ProfileResponse,
};
use crate::models::{
    AdminDashboard, AdminStats, Comment, Feed, Notification, Post, ReportKind, ReportedPost, Role,
    UserListEntry, UserProfile, UserSummary, UsernameAvailability,
};

use super::{
    ApiError, ApiRequest, ApiResponse, FileUpload, HttpTransport, RequestPipeline, Transport,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    Signup,
    ForgotPassword,
}

/// Second step of mobile signup: the OTP plus the chosen credentials.
#[derive(Debug, Clone)]
pub struct SignupVerification {
    pub mobile: String,
    pub name: String,
    pub username: String,
    pub otp: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    /// URL returned by [`BlinkVaultClient::upload_profile_pic`].
    #[serde(rename = "profilePic", skip_serializing_if = "Option::is_none")]
    pub profile_pic: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadedPicture {
    #[serde(rename = "profilePicUrl")]
    profile_pic_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProfilePage {
    pub user: UserProfile,
    pub posts: Vec<Post>,
}

/// Typed BlinkVault API.
/// Clone is cheap - the pipeline is shared.
pub struct BlinkVaultClient<T: Transport = HttpTransport> {
    pipeline: Arc<RequestPipeline<T>>,
}

impl<T: Transport> Clone for BlinkVaultClient<T> {
    fn clone(&self) -> Self {
        Self {
            pipeline: self.pipeline.clone(),
        }
    }
}

impl BlinkVaultClient<HttpTransport> {
    /// Build a client over HTTP with the configured base URL and token store.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let transport = HttpTransport::new(config.api_base_url.clone(), config.request_timeout())
            .context("Failed to build HTTP client")?;
        let session = Arc::new(SessionManager::new(config.token_store()?));
        debug!(base_url = %config.api_base_url, "API client configured");
        Ok(Self::new(RequestPipeline::new(transport, session)))
    }
}

/// Trim `value`, rejecting it if nothing is left.
fn required<'a>(value: &'a str, field: &'static str) -> Result<&'a str, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ApiError::MissingField(field))
    } else {
        Ok(trimmed)
    }
}

impl<T: Transport> BlinkVaultClient<T> {
    pub fn new(pipeline: RequestPipeline<T>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        self.pipeline.session()
    }

    pub fn pipeline(&self) -> &RequestPipeline<T> {
        &self.pipeline
    }

    /// Restore the persisted session. See [`SessionManager::bootstrap`].
    pub async fn bootstrap(&self) {
        self.session().bootstrap(&self.pipeline).await;
    }

    async fn fetch<R: DeserializeOwned>(&self, request: ApiRequest) -> Result<R, ApiError> {
        self.pipeline.send(request).await?.json()
    }

    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        self.pipeline.send(request).await
    }

    fn require_admin(&self) -> Result<(), ApiError> {
        match self.session().current_user() {
            Some(user) if user.is_admin() => Ok(()),
            _ => Err(ApiError::AdminRequired),
        }
    }

    /// Hand a successful authentication exchange to the session.
    fn sign_in(&self, grant: AuthGrant) -> Result<UserSummary, ApiError> {
        if !grant.user.has_identity() || grant.access_token.trim().is_empty() {
            return Err(ApiError::InvalidResponse(
                "Authentication response missing user or token".to_string(),
            ));
        }
        self.session().login(grant.user.clone(), grant.access_token);
        Ok(grant.user)
    }

    // ===== Authentication =====

    /// Sign in with mobile number and password.
    pub async fn login(&self, mobile: &str, password: &str) -> Result<UserSummary, ApiError> {
        let mobile = required(mobile, "mobile")?;
        let password = required(password, "password")?;

        let request = ApiRequest::post("/auth/login")
            .with_body(json!({ "mobile": mobile, "password": password }))
            .credential_exchange();
        let grant: AuthGrant = self.fetch(request).await?;
        info!("Login successful");
        self.sign_in(grant)
    }

    /// Explicit sign-out. Local only; the server keeps no session to end.
    pub fn logout(&self) {
        self.session().logout();
    }

    /// Ask the server to text a one-time code to `mobile`.
    pub async fn send_otp(
        &self,
        mobile: &str,
        name: Option<&str>,
        purpose: OtpPurpose,
    ) -> Result<(), ApiError> {
        let mobile = required(mobile, "mobile")?;
        let mut body = json!({ "mobile": mobile });
        if let Some(name) = name {
            body["name"] = json!(required(name, "name")?);
        }
        if purpose == OtpPurpose::ForgotPassword {
            body["purpose"] = json!(purpose);
        }
        self.execute(ApiRequest::post("/auth/send-otp").with_body(body).credential_exchange())
            .await?;
        Ok(())
    }

    /// Finish mobile signup; signs the new user in.
    pub async fn complete_signup(
        &self,
        signup: &SignupVerification,
    ) -> Result<UserSummary, ApiError> {
        let body = json!({
            "mobile": required(&signup.mobile, "mobile")?,
            "name": required(&signup.name, "name")?,
            "username": required(&signup.username, "username")?,
            "otp": required(&signup.otp, "otp")?,
            "password": required(&signup.password, "password")?,
        });
        let request = ApiRequest::post("/auth/setPasswordAndVerifyOTP")
            .with_body(body)
            .credential_exchange();
        let grant: AuthGrant = self.fetch(request).await?;
        info!("Signup verified");
        self.sign_in(grant)
    }

    /// Email signup. The account is usable after [`Self::verify_email`].
    pub async fn signup_with_email(
        &self,
        name: &str,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<(), ApiError> {
        let body = json!({
            "name": required(name, "name")?,
            "email": required(email, "email")?,
            "username": required(username, "username")?,
            "password": required(password, "password")?,
        });
        self.execute(ApiRequest::post("/auth/signup").with_body(body).credential_exchange())
            .await?;
        Ok(())
    }

    /// Redeem an email verification link token; signs the user in.
    pub async fn verify_email(&self, token: &str) -> Result<UserSummary, ApiError> {
        let token = required(token, "token")?;
        let request = ApiRequest::get(format!("/auth/verify-email/{}", token)).credential_exchange();
        let grant: AuthGrant = self.fetch(request).await?;
        info!("Email verified");
        self.sign_in(grant)
    }

    pub async fn check_username(&self, username: &str) -> Result<UsernameAvailability, ApiError> {
        let username = required(username, "username")?;
        self.fetch(
            ApiRequest::post("/auth/check-username").with_body(json!({ "username": username })),
        )
        .await
    }

    /// Set a new password using a code from [`Self::send_otp`].
    pub async fn reset_password(
        &self,
        mobile: &str,
        otp: &str,
        new_password: &str,
    ) -> Result<(), ApiError> {
        let body = json!({
            "mobile": required(mobile, "mobile")?,
            "otp": required(otp, "otp")?,
            "newPassword": required(new_password, "newPassword")?,
        });
        self.execute(
            ApiRequest::post("/auth/forgot-password")
                .with_body(body)
                .credential_exchange(),
        )
        .await?;
        Ok(())
    }

    // ===== Users =====

    pub async fn profile(&self, user_id: &str) -> Result<ProfilePage, ApiError> {
        let user_id = required(user_id, "user id")?;
        let page: ProfileResponse = self.fetch(ApiRequest::get(format!("/users/{}", user_id))).await?;
        Ok(ProfilePage {
            user: page.user,
            posts: page.posts,
        })
    }

    pub async fn followers(&self, user_id: &str) -> Result<Vec<UserListEntry>, ApiError> {
        let user_id = required(user_id, "user id")?;
        let resp: FollowersResponse = self
            .fetch(ApiRequest::get(format!("/users/{}/followers", user_id)))
            .await?;
        Ok(resp.followers)
    }

    pub async fn following(&self, user_id: &str) -> Result<Vec<UserListEntry>, ApiError> {
        let user_id = required(user_id, "user id")?;
        let resp: FollowingResponse = self
            .fetch(ApiRequest::get(format!("/users/{}/following", user_id)))
            .await?;
        Ok(resp.following)
    }

    /// Follow or unfollow; returns whether the current user now follows `user_id`.
    pub async fn toggle_follow(&self, user_id: &str) -> Result<bool, ApiError> {
        let user_id = required(user_id, "user id")?;
        self.execute(ApiRequest::put(format!("/users/follow/{}", user_id)))
            .await?;
        let mut now_following = false;
        self.session().update_user(|u| {
            now_following = UserSummary::toggle(&mut u.following_ids, user_id);
        });
        Ok(now_following)
    }

    /// Block or unblock; returns whether `user_id` is now blocked.
    pub async fn toggle_block(&self, user_id: &str) -> Result<bool, ApiError> {
        let user_id = required(user_id, "user id")?;
        self.execute(ApiRequest::post(format!("/users/block/{}", user_id)))
            .await?;
        let mut now_blocked = false;
        self.session().update_user(|u| {
            now_blocked = UserSummary::toggle(&mut u.blocked_user_ids, user_id);
        });
        Ok(now_blocked)
    }

    pub async fn blocked_users(&self) -> Result<Vec<UserListEntry>, ApiError> {
        let resp: BlockedResponse = self.fetch(ApiRequest::get("/users/blocked")).await?;
        Ok(resp.blocked)
    }

    pub async fn report_user(&self, user_id: &str) -> Result<(), ApiError> {
        let user_id = required(user_id, "user id")?;
        self.execute(ApiRequest::post(format!("/users/report/{}", user_id)))
            .await?;
        Ok(())
    }

    /// File a report against a user or post.
    pub async fn report(
        &self,
        kind: ReportKind,
        target_id: &str,
        reason: &str,
    ) -> Result<(), ApiError> {
        let body = json!({
            "type": kind,
            "targetId": required(target_id, "targetId")?,
            "reason": required(reason, "reason")?,
        });
        self.execute(ApiRequest::post("/report").with_body(body)).await?;
        Ok(())
    }

    pub async fn saved_posts(&self) -> Result<Vec<Post>, ApiError> {
        let resp: SavedResponse = self.fetch(ApiRequest::get("/users/saved")).await?;
        Ok(resp.saved)
    }

    /// Update profile fields; the session's username follows a successful change.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<(), ApiError> {
        let mut update = update.clone();
        if let Some(username) = update.username.as_mut() {
            let trimmed = required(username, "username")?.to_string();
            *username = trimmed;
        }
        let body = serde_json::to_value(&update)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to encode update: {}", e)))?;
        self.execute(ApiRequest::put("/users/update").with_body(body))
            .await?;
        let ProfileUpdate {
            username,
            profile_pic,
            ..
        } = update;
        if username.is_some() || profile_pic.is_some() {
            self.session().update_user(|u| {
                if let Some(username) = username {
                    u.username = username;
                }
                if let Some(url) = profile_pic {
                    u.profile_pic_url = Some(url);
                }
            });
        }
        Ok(())
    }

    /// Upload a new profile picture and return its hosted URL. The picture
    /// takes effect once the URL is saved with [`Self::update_profile`].
    pub async fn upload_profile_pic(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<String, ApiError> {
        let file_name = required(file_name, "file name")?;
        if bytes.is_empty() {
            return Err(ApiError::MissingField("profilePic"));
        }
        let upload = FileUpload::image("profilePic", file_name, bytes);
        let uploaded: UploadedPicture = self
            .fetch(ApiRequest::post("/users/upload-profile-pic").with_file(upload))
            .await?;
        match uploaded.profile_pic_url {
            Some(url) if !url.trim().is_empty() => Ok(url),
            _ => Err(ApiError::InvalidResponse(
                "Upload response carried no profilePicUrl".to_string(),
            )),
        }
    }

    pub async fn change_password(
        &self,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), ApiError> {
        let body = json!({
            "oldPassword": required(old_password, "oldPassword")?,
            "newPassword": required(new_password, "newPassword")?,
        });
        self.execute(ApiRequest::put("/users/change-password").with_body(body))
            .await?;
        Ok(())
    }

    /// Permanently delete the signed-in account, then sign out.
    pub async fn delete_account(&self) -> Result<(), ApiError> {
        self.execute(ApiRequest::delete("/users/delete-account"))
            .await?;
        info!("Account deleted");
        self.session().logout();
        Ok(())
    }

    // ===== Posts =====

    pub async fn feed(&self) -> Result<Feed, ApiError> {
        self.fetch(ApiRequest::get("/posts/feed")).await
    }

    pub async fn create_post(&self, title: &str, content: &str) -> Result<(), ApiError> {
        let body = json!({
            "title": required(title, "title")?,
            "content": required(content, "content")?,
        });
        self.execute(ApiRequest::post("/posts").with_body(body)).await?;
        Ok(())
    }

    pub async fn delete_post(&self, post_id: &str) -> Result<(), ApiError> {
        let post_id = required(post_id, "post id")?;
        self.execute(ApiRequest::delete(format!("/posts/{}", post_id)))
            .await?;
        Ok(())
    }

    pub async fn comments(&self, post_id: &str) -> Result<Vec<Comment>, ApiError> {
        let post_id = required(post_id, "post id")?;
        let resp: CommentsResponse = self
            .fetch(ApiRequest::get(format!("/posts/comments/{}", post_id)))
            .await?;
        Ok(resp.comments)
    }

    pub async fn add_comment(&self, post_id: &str, content: &str) -> Result<Comment, ApiError> {
        let post_id = required(post_id, "post id")?;
        let content = required(content, "content")?;
        let resp: CommentResponse = self
            .fetch(
                ApiRequest::post(format!("/posts/{}/comment", post_id))
                    .with_body(json!({ "content": content })),
            )
            .await?;
        Ok(resp.comment)
    }

    // ===== Notifications =====

    pub async fn notifications(&self) -> Result<Vec<Notification>, ApiError> {
        self.fetch(ApiRequest::get("/notifications")).await
    }

    pub async fn mark_notifications_read(&self) -> Result<(), ApiError> {
        self.execute(ApiRequest::put("/notifications/read")).await?;
        Ok(())
    }

    // ===== Admin =====
    // Every admin call checks the local role first and never reaches the
    // network for non-admins.

    pub async fn admin_stats(&self) -> Result<AdminStats, ApiError> {
        self.require_admin()?;
        self.fetch(ApiRequest::get("/admin/stats")).await
    }

    pub async fn admin_users(&self) -> Result<Vec<UserListEntry>, ApiError> {
        self.require_admin()?;
        self.fetch(ApiRequest::get("/admin/users")).await
    }

    pub async fn reported_posts(&self) -> Result<Vec<ReportedPost>, ApiError> {
        self.require_admin()?;
        self.fetch(ApiRequest::get("/admin/reports/posts")).await
    }

    /// Stats, users and reports, fetched concurrently.
    pub async fn admin_dashboard(&self) -> Result<AdminDashboard, ApiError> {
        self.require_admin()?;
        let (stats, users, reported_posts) = futures::try_join!(
            self.admin_stats(),
            self.admin_users(),
            self.reported_posts()
        )?;
        Ok(AdminDashboard {
            stats,
            users,
            reported_posts,
        })
    }

    pub async fn set_user_role(&self, user_id: &str, role: Role) -> Result<(), ApiError> {
        self.require_admin()?;
        let user_id = required(user_id, "user id")?;
        self.execute(
            ApiRequest::put(format!("/admin/users/{}/role", user_id))
                .with_body(json!({ "role": role })),
        )
        .await?;
        info!(user_id = %user_id, %role, "User role updated");
        Ok(())
    }

    /// Ban or unban a user; the server flips `isBanned`.
    pub async fn toggle_ban(&self, user_id: &str) -> Result<(), ApiError> {
        self.require_admin()?;
        let user_id = required(user_id, "user id")?;
        self.execute(ApiRequest::put(format!("/admin/ban/{}", user_id)))
            .await?;
        info!(user_id = %user_id, "User ban toggled");
        Ok(())
    }

    pub async fn admin_delete_user(&self, user_id: &str) -> Result<(), ApiError> {
        self.require_admin()?;
        let user_id = required(user_id, "user id")?;
        self.execute(ApiRequest::delete(format!("/admin/users/{}", user_id)))
            .await?;
        Ok(())
    }

    pub async fn admin_delete_post(&self, post_id: &str) -> Result<(), ApiError> {
        self.require_admin()?;
        let post_id = required(post_id, "post id")?;
        self.execute(ApiRequest::delete(format!("/admin/posts/{}", post_id)))
            .await?;
        Ok(())
    }

    /// Clear all reports on a post without removing it.
    pub async fn dismiss_reports(&self, post_id: &str) -> Result<(), ApiError> {
        self.require_admin()?;
        let post_id = required(post_id, "post id")?;
        self.execute(ApiRequest::put(format!("/admin/posts/{}/dismiss", post_id)))
            .await?;
        Ok(())
    }
}
