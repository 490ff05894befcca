//! BlinkVault CLI - a terminal client for the BlinkVault social service.
//!
//! Every command restores the saved session first, then talks to the API
//! through the same authenticated pipeline.

use std::io::{self, Write};

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use blinkvault_core::api::{ApiError, ProfileUpdate};
use blinkvault_core::auth::{admin_view, private_view, Access};
use blinkvault_core::models::{unread_count, FeedTab, Post};
use blinkvault_core::{BlinkVaultClient, Config};

const USAGE: &str = "\
Usage: blinkvault <command> [args]

Commands:
  login [mobile]           Sign in with mobile number and password
  logout                   Sign out and forget the saved token
  whoami                   Show the signed-in user
  feed [trending|latest]   Show the home feed (default: trending)
  notifications            List notifications and mark them read
  post <title> <content>   Publish a post
  follow <user-id>         Follow or unfollow a user
  block <user-id>          Block or unblock a user
  avatar <image-file>      Upload a new profile picture
  admin-stats              Show admin dashboard figures
  ban <user-id>            Ban or unban a user (admin)";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        eprintln!("{}", USAGE);
        return Ok(());
    };

    let mut config = Config::load()?;
    let client = BlinkVaultClient::from_config(&config)?;

    client.bootstrap().await;
    info!(authenticated = client.session().is_authenticated(), "Session ready");

    let result = match command {
        "login" => login(&client, &mut config, args.get(1).cloned()).await,
        "logout" => {
            client.logout();
            println!("Signed out.");
            Ok(())
        }
        "whoami" => whoami(&client),
        "feed" => feed(&client, args.get(1).map(String::as_str)).await,
        "notifications" => notifications(&client).await,
        "post" => match (args.get(1), args.get(2)) {
            (Some(title), Some(content)) => create_post(&client, title, content).await,
            _ => Err(anyhow::anyhow!("post needs a title and content")),
        },
        "follow" => match args.get(1) {
            Some(id) => follow(&client, id).await,
            None => Err(anyhow::anyhow!("follow needs a user id")),
        },
        "block" => match args.get(1) {
            Some(id) => block(&client, id).await,
            None => Err(anyhow::anyhow!("block needs a user id")),
        },
        "avatar" => match args.get(1) {
            Some(path) => avatar(&client, path).await,
            None => Err(anyhow::anyhow!("avatar needs an image file")),
        },
        "admin-stats" => admin_stats(&client).await,
        "ban" => match args.get(1) {
            Some(id) => ban(&client, id).await,
            None => Err(anyhow::anyhow!("ban needs a user id")),
        },
        other => {
            eprintln!("Unknown command: {}\n\n{}", other, USAGE);
            return Ok(());
        }
    };

    if let Err(e) = result {
        report(&e);
        std::process::exit(1);
    }
    Ok(())
}

/// Print a failure. An expired session gets the re-login notice.
fn report(error: &anyhow::Error) {
    match error.downcast_ref::<ApiError>() {
        Some(api_error) => {
            eprintln!("Error: {}", api_error.user_message());
            if api_error.is_session_expired() {
                eprintln!("Run `blinkvault login` to sign in again.");
            }
        }
        None => eprintln!("Error: {:#}", error),
    }
}

/// Check the gate for a signed-in view.
fn require_signed_in(client: &BlinkVaultClient) -> Result<()> {
    match private_view(&client.session().snapshot()) {
        Access::Granted => Ok(()),
        _ => Err(anyhow::anyhow!(
            "Not signed in. Run `blinkvault login` first."
        )),
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

async fn login(
    client: &BlinkVaultClient,
    config: &mut Config,
    mobile: Option<String>,
) -> Result<()> {
    let mobile = match mobile {
        Some(m) => m,
        None => match config.last_mobile.clone() {
            Some(last) => {
                let input = prompt(&format!("Mobile [{}]: ", last))?;
                if input.is_empty() {
                    last
                } else {
                    input
                }
            }
            None => prompt("Mobile: ")?,
        },
    };
    let password = rpassword::prompt_password("Password: ")?;

    let user = client.login(&mobile, &password).await?;

    config.last_mobile = Some(mobile.trim().to_string());
    if let Err(e) = config.save() {
        tracing::warn!(error = %e, "Failed to save config");
    }

    println!("Signed in as {} ({}).", user.username, user.role);
    Ok(())
}

fn whoami(client: &BlinkVaultClient) -> Result<()> {
    require_signed_in(client)?;
    if let Some(user) = client.session().current_user() {
        println!("{} ({})", user.username, user.id);
        println!("  role:      {}", user.role);
        println!("  following: {}", user.following_ids.len());
        println!("  blocked:   {}", user.blocked_user_ids.len());
        println!("  saved:     {}", user.saved_post_ids.len());
    }
    Ok(())
}

fn print_post(post: &Post) {
    let when = post
        .created_at
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default();
    println!("[{}] {} - @{} {}", post.id, post.title, post.author_name(), when);
    if !post.content.is_empty() {
        println!("    {}", post.content);
    }
    println!("    score {:+}", post.score());
}

async fn feed(client: &BlinkVaultClient, tab: Option<&str>) -> Result<()> {
    let tab = match tab {
        None | Some("trending") => FeedTab::Trending,
        Some("latest") => FeedTab::Latest,
        Some(other) => return Err(anyhow::anyhow!("Unknown feed tab: {}", other)),
    };
    require_signed_in(client)?;
    let feed = client.feed().await?;
    let posts = feed.tab(tab);
    if posts.is_empty() {
        println!("No posts yet.");
    }
    for post in posts {
        print_post(post);
    }
    Ok(())
}

async fn notifications(client: &BlinkVaultClient) -> Result<()> {
    require_signed_in(client)?;
    let list = client.notifications().await?;
    if list.is_empty() {
        println!("You have no new notifications.");
        return Ok(());
    }
    println!("{} unread", unread_count(&list));
    for n in &list {
        let marker = if n.read { " " } else { "*" };
        let ago = n
            .created_at
            .map(|t| {
                let minutes = (chrono::Utc::now() - t).num_minutes().max(0);
                format!("{}m ago", minutes)
            })
            .unwrap_or_default();
        println!("{} {} {}", marker, n.plain_message(), ago);
    }
    client.mark_notifications_read().await?;
    Ok(())
}

async fn create_post(client: &BlinkVaultClient, title: &str, content: &str) -> Result<()> {
    require_signed_in(client)?;
    client.create_post(title, content).await?;
    println!("Posted.");
    Ok(())
}

async fn follow(client: &BlinkVaultClient, user_id: &str) -> Result<()> {
    require_signed_in(client)?;
    if client.toggle_follow(user_id).await? {
        println!("Following {}.", user_id);
    } else {
        println!("Unfollowed {}.", user_id);
    }
    Ok(())
}

async fn block(client: &BlinkVaultClient, user_id: &str) -> Result<()> {
    require_signed_in(client)?;
    if client.toggle_block(user_id).await? {
        println!("Blocked {}.", user_id);
    } else {
        println!("Unblocked {}.", user_id);
    }
    Ok(())
}

async fn avatar(client: &BlinkVaultClient, path: &str) -> Result<()> {
    require_signed_in(client)?;
    let path = std::path::Path::new(path);
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "avatar".to_string());

    let url = client.upload_profile_pic(&file_name, bytes).await?;
    client
        .update_profile(&ProfileUpdate {
            profile_pic: Some(url),
            ..ProfileUpdate::default()
        })
        .await?;
    println!("Profile picture updated.");
    Ok(())
}

/// Check the gate for an admin-only view.
fn require_admin(client: &BlinkVaultClient) -> Result<()> {
    match admin_view(&client.session().snapshot()) {
        Access::Granted => Ok(()),
        Access::RedirectHome => Err(anyhow::anyhow!("Access denied. Admins only.")),
        _ => Err(anyhow::anyhow!("Not signed in. Run `blinkvault login` first.")),
    }
}

async fn ban(client: &BlinkVaultClient, user_id: &str) -> Result<()> {
    require_admin(client)?;
    client.toggle_ban(user_id).await?;
    println!("Ban status toggled for {}.", user_id);
    Ok(())
}

async fn admin_stats(client: &BlinkVaultClient) -> Result<()> {
    require_admin(client)?;

    let dashboard = client.admin_dashboard().await?;
    let stats = &dashboard.stats;
    println!("Users:            {}", stats.total_users);
    println!("Posts:            {}", stats.total_posts);
    println!("Pending reports:  {}", stats.pending_reports);
    println!("New signups today {}", stats.new_signups_today);
    println!("Reported posts:");
    for reported in &dashboard.reported_posts {
        println!("  [{}] {} ({} reports)", reported.post.id, reported.post.title, reported.report_count);
    }
    Ok(())
}
