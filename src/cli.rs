use pushgate::adapters::AesGcmCodec;
use pushgate::config::{AppConfig, ConfigFile};

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[allow(clippy::large_enum_variant)]
pub(crate) enum RunOutcome {
    Serve(SocketAddr, AppConfig),
    Exit(i32),
}

pub(crate) fn run() -> RunOutcome {
    let cli = Cli::parse();
    if let Some(Command::Init) = cli.command {
        return RunOutcome::Exit(run_init());
    }

    let file = match cli.config.as_ref() {
        Some(path) => match ConfigFile::load(path) {
            Ok(file) => file,
            Err(err) => {
                eprintln!("error: {err}");
                return RunOutcome::Exit(2);
            }
        },
        None => ConfigFile::default(),
    };

    match resolve_config(&cli, file) {
        Ok((addr, config)) => RunOutcome::Serve(addr, config),
        Err(err) => {
            eprintln!("error: {err}");
            RunOutcome::Exit(2)
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "pushgate",
    version,
    about = "Web Push notification dispatch engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, env = "PUSHGATE_LISTEN")]
    listen: Option<SocketAddr>,
    #[arg(long, env = "PUSHGATE_DATA_DIR")]
    data_dir: Option<PathBuf>,
    #[arg(long, env = "PUSHGATE_CONTACT")]
    contact: Option<String>,
    #[arg(long, env = "PUSHGATE_CODEC_KEY")]
    codec_key: Option<String>,
    /// Disable push delivery without removing the configuration.
    #[arg(long)]
    disabled: bool,
    #[arg(long, env = "PUSHGATE_POOL_SIZE")]
    pool_size: Option<usize>,
    #[arg(long, env = "PUSHGATE_DISPATCH_DELAY_MS")]
    dispatch_delay_ms: Option<u64>,
    #[arg(long, env = "PUSHGATE_MAX_BODY_LENGTH")]
    max_body_length: Option<usize>,
    #[arg(long, env = "PUSHGATE_DEFAULT_LANG")]
    default_lang: Option<String>,
    #[arg(long, env = "PUSHGATE_TTL")]
    ttl: Option<u32>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a codec key for sealing the VAPID private key at rest.
    Init,
}

fn run_init() -> i32 {
    let key = AesGcmCodec::generate_key();
    println!("Codec key generated.");
    println!();
    println!("PUSHGATE_CODEC_KEY=\"{key}\"");
    println!();
    println!("--codec-key \"{key}\"");
    0
}

fn resolve_config(cli: &Cli, file: ConfigFile) -> Result<(SocketAddr, AppConfig), String> {
    let listen = cli
        .listen
        .or(file.listen)
        .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 3000)));
    let data_dir = cli
        .data_dir
        .clone()
        .or(file.data_dir)
        .ok_or("--data-dir is required (flag, PUSHGATE_DATA_DIR, or config file)")?;
    let contact = cli
        .contact
        .clone()
        .or(file.contact)
        .ok_or("--contact is required (flag, PUSHGATE_CONTACT, or config file)")?;
    let contact = validate_contact(contact)?;
    let codec_key = cli
        .codec_key
        .clone()
        .or(file.codec_key)
        .ok_or("--codec-key is required; generate one with `pushgate init`")?;
    if codec_key.trim().is_empty() {
        return Err("codec key cannot be empty".to_string());
    }

    let enabled = if cli.disabled {
        false
    } else {
        file.enabled.unwrap_or(true)
    };
    let pool_size = cli.pool_size.or(file.pool_size).unwrap_or(5);
    if pool_size == 0 {
        return Err("pool size must be greater than 0".to_string());
    }
    let dispatch_delay =
        Duration::from_millis(cli.dispatch_delay_ms.or(file.dispatch_delay_ms).unwrap_or(1000));
    let max_body_length = cli.max_body_length.or(file.max_body_length).unwrap_or(75);

    Ok((
        listen,
        AppConfig {
            data_dir,
            contact,
            codec_key: codec_key.trim().to_string(),
            enabled,
            pool_size,
            dispatch_delay,
            max_body_length,
            require_interaction: file.require_interaction.unwrap_or(true),
            renotify: file.renotify.unwrap_or(true),
            silent: file.silent.unwrap_or(false),
            default_lang: cli
                .default_lang
                .clone()
                .or(file.default_lang)
                .unwrap_or_else(|| "en".to_string()),
            ttl: cli.ttl.or(file.ttl).unwrap_or(3600),
        },
    ))
}

fn validate_contact(contact: String) -> Result<String, String> {
    let contact = contact.trim().to_string();
    if contact.starts_with("mailto:") || contact.starts_with("https://") {
        Ok(contact)
    } else {
        Err(format!(
            "invalid contact '{contact}'; expected a mailto: or https: URI"
        ))
    }
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;

    fn base_cli() -> Cli {
        Cli {
            command: None,
            config: None,
            listen: None,
            data_dir: Some(PathBuf::from("/var/lib/pushgate")),
            contact: Some("mailto:ops@example.com".to_string()),
            codec_key: Some("key".to_string()),
            disabled: false,
            pool_size: None,
            dispatch_delay_ms: None,
            max_body_length: None,
            default_lang: None,
            ttl: None,
        }
    }

    #[test]
    fn resolve_config__should_apply_defaults() {
        // When
        let (addr, config) =
            resolve_config(&base_cli(), ConfigFile::default()).expect("resolve config");

        // Then
        assert_eq!(addr, SocketAddr::from(([127, 0, 0, 1], 3000)));
        assert!(config.enabled);
        assert_eq!(config.pool_size, 5);
        assert_eq!(config.dispatch_delay, Duration::from_secs(1));
        assert_eq!(config.max_body_length, 75);
        assert!(config.require_interaction);
        assert!(config.renotify);
        assert!(!config.silent);
        assert_eq!(config.default_lang, "en");
        assert_eq!(config.ttl, 3600);
    }

    #[test]
    fn resolve_config__should_require_data_dir_and_contact() {
        // Given
        let mut without_data_dir = base_cli();
        without_data_dir.data_dir = None;
        let mut without_contact = base_cli();
        without_contact.contact = None;

        // Then
        assert!(resolve_config(&without_data_dir, ConfigFile::default()).is_err());
        assert!(resolve_config(&without_contact, ConfigFile::default()).is_err());
    }

    #[test]
    fn resolve_config__should_require_codec_key() {
        // Given
        let mut cli = base_cli();
        cli.codec_key = None;

        // When
        let err = resolve_config(&cli, ConfigFile::default()).expect_err("missing codec key");

        // Then
        assert!(err.contains("pushgate init"));
    }

    #[test]
    fn resolve_config__should_prefer_flags_over_file_values() {
        // Given
        let mut cli = base_cli();
        cli.pool_size = Some(2);
        let file = ConfigFile {
            pool_size: Some(10),
            dispatch_delay_ms: Some(250),
            ..ConfigFile::default()
        };

        // When
        let (_, config) = resolve_config(&cli, file).expect("resolve config");

        // Then
        assert_eq!(config.pool_size, 2);
        assert_eq!(config.dispatch_delay, Duration::from_millis(250));
    }

    #[test]
    fn resolve_config__should_let_disabled_flag_win() {
        // Given
        let mut cli = base_cli();
        cli.disabled = true;
        let file = ConfigFile {
            enabled: Some(true),
            ..ConfigFile::default()
        };

        // When
        let (_, config) = resolve_config(&cli, file).expect("resolve config");

        // Then
        assert!(!config.enabled);
    }

    #[test]
    fn resolve_config__should_reject_zero_pool_size() {
        // Given
        let mut cli = base_cli();
        cli.pool_size = Some(0);

        // Then
        assert!(resolve_config(&cli, ConfigFile::default()).is_err());
    }

    #[test]
    fn validate_contact__should_accept_mailto_and_https() {
        assert!(validate_contact("mailto:ops@example.com".to_string()).is_ok());
        assert!(validate_contact("https://example.com/contact".to_string()).is_ok());
        assert!(validate_contact("ops@example.com".to_string()).is_err());
    }
}
