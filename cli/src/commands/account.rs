use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};

use crate::config::Config;
use fitlog_core::auth::{sign_in, sign_out, sign_up};
use fitlog_core::db::Database;

use super::helpers::{print_json, require_user};

fn read_password(password: Option<String>) -> Result<String> {
    if let Some(p) = password {
        return Ok(p);
    }
    eprint!("Password: ");
    io::stderr().flush()?;
    let stdin = io::stdin();
    let line = stdin.lock().lines().next().context("No input")??;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

pub(crate) fn cmd_signup(
    db: &Database,
    config: &Config,
    email: &str,
    password: Option<String>,
    json: bool,
) -> Result<()> {
    let password = read_password(password)?;
    let user = sign_up(db, email, &password)?;
    let (_, token) = sign_in(db, &user.email, &password)?;
    config.save_session(&token)?;

    if json {
        print_json(&user)?;
    } else {
        println!("Created account for {} and logged in.", user.email);
    }
    Ok(())
}

pub(crate) fn cmd_login(
    db: &Database,
    config: &Config,
    email: &str,
    password: Option<String>,
    json: bool,
) -> Result<()> {
    let password = read_password(password)?;
    let (user, token) = sign_in(db, email, &password)?;
    config.save_session(&token)?;

    if json {
        print_json(&user)?;
    } else {
        println!("Logged in as {}.", user.email);
    }
    Ok(())
}

pub(crate) fn cmd_logout(db: &Database, config: &Config, json: bool) -> Result<()> {
    let revoked = match config.load_session()? {
        Some(token) => sign_out(db, &token)?,
        None => false,
    };
    config.clear_session()?;

    if json {
        println!("{}", serde_json::json!({ "logged_out": revoked }));
    } else if revoked {
        println!("Logged out.");
    } else {
        eprintln!("Not logged in.");
    }
    Ok(())
}

pub(crate) fn cmd_whoami(db: &Database, config: &Config, json: bool) -> Result<()> {
    let user = require_user(db, config)?;
    if json {
        print_json(&user)?;
    } else {
        println!("{} (member since {})", user.email, &user.created_at[..10.min(user.created_at.len())]);
    }
    Ok(())
}
