use std::path::PathBuf;

use docsync::SyncConfig;

use crate::cli::ConfigCommands;
use crate::error::CliError;

const REDACTED: &str = "********";

pub async fn run_config(
    command: ConfigCommands,
    config_path: Option<PathBuf>,
) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show => {
            let config = SyncConfig::load(config_path)?;
            print!("{}", render_redacted(&config)?);
            Ok(())
        }
        ConfigCommands::Init {
            server_url,
            token,
            force,
        } => {
            let path = run_config_init(config_path, server_url, token, force)?;
            println!("Wrote {}", path.display());
            Ok(())
        }
    }
}

fn run_config_init(
    config_path: Option<PathBuf>,
    server_url: Option<String>,
    token: Option<String>,
    force: bool,
) -> Result<PathBuf, CliError> {
    let target = config_path
        .or_else(SyncConfig::default_config_path)
        .ok_or_else(|| {
            docsync::SyncError::ConfigSaveFailed("No config path available".into())
        })?;
    if target.exists() && !force {
        return Err(CliError::ConfigExists(target));
    }

    let mut config = SyncConfig::new();
    config.server.url = normalize(server_url);
    config.server.auth_token = normalize(token);
    config.validate()?;

    Ok(config.save(Some(target))?)
}

fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn render_redacted(config: &SyncConfig) -> Result<String, CliError> {
    let mut shown = config.clone();
    if shown.server.auth_token.is_some() {
        shown.server.auth_token = Some(REDACTED.to_string());
    }
    Ok(toml::to_string_pretty(&shown)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_writes_a_loadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.toml");

        let written = run_config_init(
            Some(path.clone()),
            Some(" https://sync.example.com ".into()),
            Some("secret".into()),
            false,
        )
        .unwrap();
        assert_eq!(written, path);

        let contents = std::fs::read_to_string(&path).unwrap();
        let loaded: SyncConfig = toml::from_str(&contents).unwrap();
        assert_eq!(loaded.server_url(), Some("https://sync.example.com"));
        assert_eq!(loaded.server.auth_token.as_deref(), Some("secret"));
        assert!(!loaded.device_id().is_empty());
    }

    #[test]
    fn test_init_refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.toml");
        std::fs::write(&path, "").unwrap();

        let err = run_config_init(Some(path.clone()), None, None, false).unwrap_err();
        assert!(matches!(err, CliError::ConfigExists(_)));

        run_config_init(Some(path), None, None, true).unwrap();
    }

    #[test]
    fn test_init_rejects_bad_urls() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_config_init(
            Some(dir.path().join("sync.toml")),
            Some("ftp://example.com".into()),
            None,
            false,
        )
        .unwrap_err();
        assert!(matches!(err, CliError::Sync(ref e) if e.is_config_error()));
    }

    #[test]
    fn test_show_hides_the_token() {
        let mut config = SyncConfig::default();
        config.server.auth_token = Some("secret".into());

        let rendered = render_redacted(&config).unwrap();
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains(REDACTED));
    }
}
