//! `tunnelbot users` handlers.

use serde::Serialize;
use tabled::Tabled;

use tunnelbot_core::{Backend, generate_password};
use tunnelbot_core::store::normalize_username;

use crate::cli::{GlobalOpts, UsersArgs, UsersCommand};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Serialize)]
struct UserEntry {
    username: String,
}

#[derive(Tabled)]
struct UserRow {
    #[tabled(rename = "#")]
    position: usize,
    #[tabled(rename = "Username")]
    username: String,
}

/// Credentials of a newly added account, printed once.
#[derive(Serialize)]
struct NewAccount<'a> {
    username: &'a str,
    password: &'a str,
    store: String,
}

pub async fn handle(backend: &Backend, args: UsersArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let registry = backend.credentials();
    match args.command {
        UsersCommand::List => {
            let users: Vec<UserEntry> = registry
                .list_users()
                .await?
                .into_iter()
                .map(|username| UserEntry { username })
                .collect();
            let mut position = 0;
            let out = output::render_list(
                global.output,
                &users,
                |u| {
                    position += 1;
                    UserRow {
                        position,
                        username: u.username.clone(),
                    }
                },
                |u| u.username.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        UsersCommand::Add {
            username,
            password,
            generate,
        } => {
            let username = normalize_username(&username);
            let password = match password {
                Some(p) => p,
                None if generate => generate_password(),
                None => prompt_password()?,
            };

            let change = registry.add_user(&username, &password).await?;
            let account = NewAccount {
                username: &change.username,
                password: &password,
                store: change.path.display().to_string(),
            };
            let out = output::render_single(
                global.output,
                &account,
                |a| format!("Username: {}\nPassword: {}", a.username, a.password),
                |a| format!("{} {}", a.username, a.password),
            )?;
            output::print_output(&out, global.quiet);
            util::settle(&format!("User {username} added"), change.outcome, global)
        }

        UsersCommand::Delete { username } => {
            let username = normalize_username(&username);
            if !util::confirm(
                &format!("Delete user {username}? Their VPN access stops immediately."),
                "users delete",
                global.yes,
            )? {
                return Ok(());
            }
            let change = registry.delete_user(&username).await?;
            util::settle(&format!("User {username} deleted"), change.outcome, global)
        }
    }
}

/// Ask for a password on the terminal; empty input generates one.
fn prompt_password() -> Result<String, CliError> {
    let entered = rpassword::prompt_password("Password (empty to generate): ")?;
    if entered.is_empty() {
        Ok(generate_password())
    } else {
        Ok(entered)
    }
}
