use clap::Subcommand;
use serde_json::json;

use crate::app::AppContext;
use crate::auth::{SessionState, SessionSummary};
use crate::cli::utils::*;
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum AuthCommands {
    #[command(about = "Sign in with email and password")]
    Login {
        #[arg(help = "Email address")]
        email: String,
        #[arg(long, help = "Password (will prompt if not provided)")]
        password: Option<String>,
    },

    #[command(about = "Create an account")]
    Register {
        #[arg(help = "Email address")]
        email: String,
        #[arg(long, help = "Display name")]
        name: Option<String>,
        #[arg(long, help = "Password (will prompt if not provided)")]
        password: Option<String>,
    },

    #[command(about = "Sign out and forget the saved session")]
    Logout,

    #[command(about = "Show current authentication status")]
    Status,

    #[command(about = "Show current user profile")]
    Whoami,

    #[command(about = "Email a password reset link")]
    ResetPassword {
        #[arg(help = "Email address")]
        email: String,
    },

    #[command(about = "Change the password of the signed-in user")]
    UpdatePassword {
        #[arg(long, help = "New password (will prompt if not provided)")]
        password: Option<String>,
    },
}

fn print_summary(summary: &SessionSummary) {
    println!("State: {}", summary.state);
    if let Some(user) = &summary.user {
        println!("User: {}", user.email.as_deref().unwrap_or("(no email)"));
    }
    if let Some(status) = summary.profile_status {
        println!("Profile: {}", status);
    }
    if let Some(profile) = &summary.profile {
        println!("Name: {}", profile.display_name());
        println!("Role: {}", profile.role);
    }
    if let Some(expires_at) = summary.expires_at {
        println!("Expires: {}", expires_at.to_rfc3339());
    }
}

fn signed_in_message(state: &SessionState) -> String {
    match state.profile() {
        Some(profile) => format!("Signed in as {} ({})", profile.display_name(), profile.role),
        None => "Signed in (profile unavailable)".to_string(),
    }
}

pub async fn handle(cmd: AuthCommands, context: &AppContext, output_format: OutputFormat) -> anyhow::Result<()> {
    let session = &context.session;
    match cmd {
        AuthCommands::Login { email, password } => {
            let password = password_or_prompt(password, "Password")?;
            let state = session.sign_in(&email, &password).await?;
            output_success(
                &output_format,
                &signed_in_message(&state),
                Some(json!({ "session": SessionSummary::from(&state) })),
            )
        }
        AuthCommands::Register { email, name, password } => {
            let password = password_or_prompt(password, "Password")?;
            let state = session.sign_up(&email, &password, name.as_deref()).await?;
            let message = if state.is_authenticated() {
                signed_in_message(&state)
            } else {
                format!("Check {} to confirm the account", email)
            };
            output_success(
                &output_format,
                &message,
                Some(json!({ "session": SessionSummary::from(&state) })),
            )
        }
        AuthCommands::Logout => {
            session.sign_out().await;
            output_success(&output_format, "Signed out", None)
        }
        AuthCommands::Status => {
            let summary = SessionSummary::from(&session.state());
            output_item(&output_format, "session", &summary, print_summary)
        }
        AuthCommands::Whoami => {
            let profile = session.current_profile()?;
            output_item(&output_format, "profile", &profile, |p| {
                println!("{} <{}>", p.display_name(), p.email);
                println!("Role: {}", p.role);
                println!("Member since: {}", p.created_at.format("%Y-%m-%d"));
            })
        }
        AuthCommands::ResetPassword { email } => {
            session.reset_password(&email).await?;
            output_success(&output_format, &format!("Reset link sent to {}", email), None)
        }
        AuthCommands::UpdatePassword { password } => {
            let password = password_or_prompt(password, "New password")?;
            session.update_password(&password).await?;
            output_success(&output_format, "Password updated", None)
        }
    }
}
