use std::path::PathBuf;

use serde::Serialize;

use crate::cli::ConfigCommands;
use crate::commands::common::resolve_db_path;
use crate::config_profiles::{
    is_http_url, normalize_profile_name, normalize_text_option, CliProfile, CliProfilesConfig,
    API_BASE_URL_ENV,
};
use crate::error::CliError;

/// Resolved view of a profile, as printed by `config show`.
#[derive(Debug, Serialize)]
pub struct ProfileSummary {
    pub profile: String,
    pub active: bool,
    pub api_base_url: Option<String>,
    pub db_path: PathBuf,
    pub request_timeout_ms: Option<u64>,
    pub max_attempts: Option<u32>,
}

pub fn run_config(
    command: ConfigCommands,
    global_profile: Option<&str>,
) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            profile,
            api_base_url,
            db_path,
            request_timeout_ms,
            max_attempts,
            no_activate,
        } => run_config_init(
            profile.as_deref().or(global_profile),
            ProfileUpdate {
                api_base_url,
                db_path,
                request_timeout_ms,
                max_attempts,
            },
            no_activate,
        ),
        ConfigCommands::Show { profile } => run_config_show(profile.as_deref().or(global_profile)),
        ConfigCommands::Use { name } => run_config_use(&name),
    }
}

/// Values passed to `config init`; unset fields keep their current value.
#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub api_base_url: Option<String>,
    pub db_path: Option<PathBuf>,
    pub request_timeout_ms: Option<u64>,
    pub max_attempts: Option<u32>,
}

pub fn apply_profile_update(profile: &mut CliProfile, update: ProfileUpdate) -> Result<(), CliError> {
    let api_base_url = normalize_text_option(update.api_base_url)
        .or_else(|| normalize_text_option(std::env::var(API_BASE_URL_ENV).ok()));
    if let Some(url) = api_base_url {
        profile.api_base_url = Some(normalize_api_base_url(url)?);
    }
    if let Some(path) = update.db_path {
        profile.db_path = Some(path);
    }
    if let Some(timeout) = update.request_timeout_ms {
        profile.request_timeout_ms = Some(timeout);
    }
    if let Some(attempts) = update.max_attempts {
        profile.max_attempts = Some(attempts);
    }
    profile.validate().map_err(CliError::Config)
}

pub fn normalize_api_base_url(url: String) -> Result<String, CliError> {
    let normalized = normalize_text_option(Some(url))
        .ok_or_else(|| CliError::Config("api_base_url must not be empty".to_string()))?;
    if !is_http_url(&normalized) {
        return Err(CliError::Config(
            "api_base_url must include http:// or https://".to_string(),
        ));
    }
    Ok(normalized.trim_end_matches('/').to_string())
}

fn run_config_init(
    profile_name: Option<&str>,
    update: ProfileUpdate,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);

    let profile = config.profile_mut_or_default(&profile_name);
    apply_profile_update(profile, update)?;
    let missing_base_url = profile.api_base_url.is_none();

    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }

    let path = config.save().map_err(CliError::Config)?;
    println!(
        "Profile '{}' initialized at {}",
        profile_name,
        path.display()
    );
    if missing_base_url {
        println!("Profile '{profile_name}' is missing: api_base_url");
    } else {
        println!("Profile '{profile_name}' is ready. Export ARCHIVA_ACCESS_TOKEN and run `archiva sync`.");
    }
    Ok(())
}

pub fn profile_summary(config: &CliProfilesConfig, profile_name: &str) -> ProfileSummary {
    let profile = config.profile(profile_name).cloned().unwrap_or_default();
    let remote = profile.remote_config().ok().flatten();

    ProfileSummary {
        profile: profile_name.to_string(),
        active: config.active_profile.as_deref() == Some(profile_name),
        api_base_url: profile.api_base_url(),
        db_path: resolve_db_path(None, &profile),
        request_timeout_ms: remote
            .as_ref()
            .map(|config| config.request_timeout_ms)
            .or(profile.request_timeout_ms),
        max_attempts: remote
            .as_ref()
            .map(|config| config.max_attempts)
            .or(profile.max_attempts),
    }
}

fn run_config_show(profile_name: Option<&str>) -> Result<(), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);
    if config.profile(&profile_name).is_none() {
        println!("Profile '{profile_name}' is not configured; showing defaults");
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&profile_summary(&config, &profile_name))?
    );
    Ok(())
}

fn run_config_use(name: &str) -> Result<(), CliError> {
    let Some(name) = normalize_profile_name(Some(name)) else {
        return Err(CliError::Config("profile name must not be empty".to_string()));
    };
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    if config.profile(&name).is_none() {
        return Err(CliError::Config(format!(
            "profile '{name}' does not exist; run `archiva config init --profile {name}`"
        )));
    }
    config.active_profile = Some(name.clone());
    config.save().map_err(CliError::Config)?;
    println!("Active profile is now '{name}'");
    Ok(())
}
