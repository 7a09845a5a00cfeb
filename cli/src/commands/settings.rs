use anyhow::Result;

use fitlog_core::db::Database;
use fitlog_core::models::{THEME_SETTING, Theme, User};

/// Stored theme, falling back to the default when unset or unrecognized.
pub(crate) fn load_theme(db: &Database, user_id: i64) -> Result<Theme> {
    Ok(db
        .get_setting(user_id, THEME_SETTING)?
        .and_then(|v| v.parse().ok())
        .unwrap_or_default())
}

pub(crate) fn cmd_theme(db: &Database, user: &User, value: Option<Theme>, json: bool) -> Result<()> {
    let theme = match value {
        Some(theme) => {
            db.set_setting(user.id, THEME_SETTING, &theme.to_string())?;
            theme
        }
        None => load_theme(db, user.id)?,
    };

    if json {
        println!("{}", serde_json::json!({ "theme": theme }));
    } else if value.is_some() {
        println!("Theme set to {theme}");
    } else {
        println!("{theme}");
    }
    Ok(())
}
