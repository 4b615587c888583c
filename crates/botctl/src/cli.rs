use activity::{combined_activity, BotStore, FeedLimit, SqliteActivitySource};
use anyhow::{Context, Result};
use common::config::Config;
use common::db::AsyncDb;
use vault::{CodecSettings, SecretCodec};

pub const USAGE: &str = "\
usage: botctl [--config PATH] <command>

commands:
  activity [LIMIT]              combined bot activity feed as JSON
  keygen [--show-secret]        generate a wallet keypair
  check-address ADDRESS         validate a base58 wallet address
  encrypt TEXT                  encrypt TEXT with the configured secret
  decrypt BLOB                  decrypt an iv:tag:ciphertext blob
  reveal-wallet BOT_ID          print a bot's decrypted private key
  import-wallet BOT_ID KEY      replace a bot's wallet with KEY
  migrate                       apply database migrations";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Activity { limit: Option<usize> },
    Keygen { show_secret: bool },
    CheckAddress { address: String },
    Encrypt { plaintext: String },
    Decrypt { blob: String },
    RevealWallet { bot_id: i64 },
    ImportWallet { bot_id: i64, private_key: String },
    Migrate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub config_path: Option<String>,
    pub command: Command,
}

/// Help needs no config, so it never becomes an [`Invocation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    Help,
    Run(Invocation),
}

fn required(args: &mut impl Iterator<Item = String>, usage: &str) -> Result<String, String> {
    args.next().ok_or_else(|| format!("usage: botctl {usage}"))
}

fn bot_id(raw: &str) -> Result<i64, String> {
    raw.parse().map_err(|_e| format!("invalid bot id: {raw}"))
}

pub fn parse_args<I>(mut args: I) -> std::result::Result<Parsed, String>
where
    I: Iterator<Item = String>,
{
    // Drop argv[0].
    let _ = args.next();

    let mut config_path = None;
    let cmd = loop {
        match args.next() {
            Some(flag) if flag == "--config" => {
                config_path = Some(required(&mut args, "--config <path> <command>")?);
            }
            other => break other,
        }
    };
    let Some(cmd) = cmd else {
        return Ok(Parsed::Help);
    };

    let command = match cmd.as_str() {
        "help" | "--help" | "-h" => return Ok(Parsed::Help),
        "activity" => {
            let limit = args
                .next()
                .map(|raw| raw.parse().map_err(|_e| format!("invalid limit: {raw}")))
                .transpose()?;
            Command::Activity { limit }
        }
        "keygen" => match args.next().as_deref() {
            None => Command::Keygen { show_secret: false },
            Some("--show-secret") => Command::Keygen { show_secret: true },
            Some(other) => return Err(format!("unknown keygen flag: {other}")),
        },
        "check-address" => Command::CheckAddress {
            address: required(&mut args, "check-address <address>")?,
        },
        "encrypt" => Command::Encrypt {
            plaintext: required(&mut args, "encrypt <text>")?,
        },
        "decrypt" => Command::Decrypt {
            blob: required(&mut args, "decrypt <blob>")?,
        },
        "reveal-wallet" => Command::RevealWallet {
            bot_id: bot_id(&required(&mut args, "reveal-wallet <bot_id>")?)?,
        },
        "import-wallet" => {
            let id = bot_id(&required(&mut args, "import-wallet <bot_id> <key>")?)?;
            Command::ImportWallet {
                bot_id: id,
                private_key: required(&mut args, "import-wallet <bot_id> <key>")?,
            }
        }
        "migrate" => Command::Migrate,
        other => return Err(format!("unknown command: {other}")),
    };

    Ok(Parsed::Run(Invocation {
        config_path,
        command,
    }))
}

fn codec(config: &Config) -> Result<SecretCodec> {
    SecretCodec::from_settings(&CodecSettings::from_config(config))
        .context("encryption is not configured")
}

async fn open_store(config: &Config) -> Result<BotStore> {
    let db = AsyncDb::open(&config.database.path).await?;
    Ok(BotStore::new(db, codec(config)?))
}

pub async fn run_command(config: &Config, cmd: Command) -> Result<()> {
    match cmd {
        Command::Activity { limit } => show_activity(config, limit).await,
        Command::Keygen { show_secret } => {
            let keypair = vault::generate_wallet_keypair();
            println!("address: {}", keypair.public_address);
            if show_secret {
                println!("private key: {}", keypair.private_key);
            }
            Ok(())
        }
        Command::CheckAddress { address } => {
            anyhow::ensure!(
                vault::is_valid_address(&address),
                "invalid address: {address}"
            );
            println!("valid: {address}");
            Ok(())
        }
        Command::Encrypt { plaintext } => {
            println!("{}", codec(config)?.encrypt(&plaintext)?);
            Ok(())
        }
        Command::Decrypt { blob } => {
            println!("{}", codec(config)?.decrypt(&blob)?);
            Ok(())
        }
        Command::RevealWallet { bot_id } => {
            let store = open_store(config).await?;
            let key = store
                .reveal_wallet_key(bot_id, None)
                .await?
                .with_context(|| format!("bot {bot_id} has no wallet"))?;
            println!("{key}");
            Ok(())
        }
        Command::ImportWallet {
            bot_id,
            private_key,
        } => {
            let store = open_store(config).await?;
            let address = store.import_wallet(bot_id, &private_key).await?;
            tracing::info!(bot_id, %address, "wallet imported");
            println!("address: {address}");
            Ok(())
        }
        Command::Migrate => {
            AsyncDb::open(&config.database.path).await?;
            println!("migrations applied: {}", config.database.path);
            Ok(())
        }
    }
}

async fn show_activity(config: &Config, limit: Option<usize>) -> Result<()> {
    let limit = FeedLimit::resolve(limit, &config.activity);
    let db = AsyncDb::open(&config.database.path).await?;
    let source = SqliteActivitySource::new(db);
    let feed = combined_activity(&source, limit.get()).await?;
    println!("{}", serde_json::to_string_pretty(&feed)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> std::result::Result<Parsed, String> {
        parse_args(
            std::iter::once("botctl")
                .chain(args.iter().copied())
                .map(str::to_string),
        )
    }

    fn invocation(args: &[&str]) -> Invocation {
        match parse(args).unwrap() {
            Parsed::Run(invocation) => invocation,
            Parsed::Help => panic!("expected a command for {args:?}"),
        }
    }

    fn command(args: &[&str]) -> Command {
        invocation(args).command
    }

    #[test]
    fn test_parse_help_forms() {
        assert_eq!(parse(&[]).unwrap(), Parsed::Help);
        assert_eq!(parse(&["help"]).unwrap(), Parsed::Help);
        assert_eq!(parse(&["--help"]).unwrap(), Parsed::Help);
        assert_eq!(parse(&["-h", "activity"]).unwrap(), Parsed::Help);
        assert_eq!(
            parse(&["--config", "/etc/botfeed.toml"]).unwrap(),
            Parsed::Help
        );
    }

    #[test]
    fn test_parse_activity_limit() {
        assert_eq!(command(&["activity"]), Command::Activity { limit: None });
        assert_eq!(
            command(&["activity", "50"]),
            Command::Activity { limit: Some(50) }
        );
        assert!(parse(&["activity", "-3"]).is_err());
        assert!(parse(&["activity", "lots"]).is_err());
    }

    #[test]
    fn test_parse_config_flag_precedes_command() {
        let invocation = invocation(&["--config", "/etc/botfeed.toml", "migrate"]);
        assert_eq!(invocation.config_path.as_deref(), Some("/etc/botfeed.toml"));
        assert_eq!(invocation.command, Command::Migrate);
        assert!(parse(&["--config"]).is_err());
    }

    #[test]
    fn test_parse_keygen_flags() {
        assert_eq!(
            command(&["keygen"]),
            Command::Keygen { show_secret: false }
        );
        assert_eq!(
            command(&["keygen", "--show-secret"]),
            Command::Keygen { show_secret: true }
        );
        assert!(parse(&["keygen", "--verbose"]).is_err());
    }

    #[test]
    fn test_parse_commands_with_arguments() {
        assert_eq!(
            command(&["check-address", "11111111111111111111111111111111"]),
            Command::CheckAddress {
                address: "11111111111111111111111111111111".to_string()
            }
        );
        assert_eq!(
            command(&["decrypt", "aa:bb:cc"]),
            Command::Decrypt {
                blob: "aa:bb:cc".to_string()
            }
        );
        assert_eq!(
            command(&["reveal-wallet", "7"]),
            Command::RevealWallet { bot_id: 7 }
        );
        assert_eq!(
            command(&["import-wallet", "7", "base58key"]),
            Command::ImportWallet {
                bot_id: 7,
                private_key: "base58key".to_string()
            }
        );
    }

    #[test]
    fn test_parse_rejects_missing_or_bad_arguments() {
        assert!(parse(&["encrypt"]).is_err());
        assert!(parse(&["reveal-wallet"]).is_err());
        assert!(parse(&["reveal-wallet", "seven"]).is_err());
        assert!(parse(&["import-wallet", "7"]).is_err());
        assert_eq!(
            parse(&["frobnicate"]).unwrap_err(),
            "unknown command: frobnicate"
        );
    }

    fn test_config(db_path: &str) -> Config {
        let toml = format!(
            r#"
[general]
mode = "development"
log_level = "warn"

[database]
path = "{db_path}"

[activity]
default_limit = 10
max_limit = 50

[vault]
secret_env = "BOTCTL_TEST_SECRET_UNSET"

[observability]
service_name = "botctl-test"
"#
        );
        Config::from_toml_str(&toml).unwrap()
    }

    #[tokio::test]
    async fn test_migrate_and_activity_on_fresh_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/botfeed.db");
        let config = test_config(path.to_str().unwrap());

        run_command(&config, Command::Migrate).await.unwrap();
        assert!(path.exists());
        run_command(&config, Command::Activity { limit: Some(500) })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_check_address_rejects_invalid() {
        let config = test_config(":memory:");
        assert!(run_command(
            &config,
            Command::CheckAddress {
                address: "nope".to_string()
            }
        )
        .await
        .is_err());
    }

    #[tokio::test]
    async fn test_reveal_wallet_for_missing_bot_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path().join("botfeed.db").to_str().unwrap());
        let err = run_command(&config, Command::RevealWallet { bot_id: 1 })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("has no wallet"));
    }
}
