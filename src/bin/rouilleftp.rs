use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use rouilleftp::constants::DEFAULT_CONTROL_PORT;
use rouilleftp::core_cli::{ClientAction, ClientCli};
use rouilleftp::core_client::{ClientConfig, ControlSession, DataMode, EntryKind};
use rouilleftp::core_log::logger::init_logger;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

struct Target {
    host: String,
    port: u16,
    user: String,
    password: String,
    path: Option<String>,
}

fn parse_target(raw: &str) -> Result<Target> {
    let url = Url::parse(raw).with_context(|| format!("Invalid URL: {}", raw))?;
    if url.scheme() != "ftp" {
        bail!("Unsupported scheme {:?}, expected ftp://", url.scheme());
    }
    let host = url
        .host_str()
        .context("URL has no host")?
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_string();

    let (user, password) = if url.username().is_empty() {
        ("anonymous".to_string(), "anonymous@".to_string())
    } else {
        (
            url.username().to_string(),
            url.password().unwrap_or_default().to_string(),
        )
    };
    let path = match url.path() {
        "" | "/" => None,
        p => Some(p.to_string()),
    };

    Ok(Target {
        host,
        port: url.port().unwrap_or(DEFAULT_CONTROL_PORT),
        user,
        password,
        path,
    })
}

fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

async fn run_action(session: &mut ControlSession, target: &Target, action: ClientAction) -> Result<()> {
    let dir = target.path.as_deref();
    match action {
        ClientAction::Ls => {
            for entry in session.list(dir).await? {
                match entry.kind {
                    EntryKind::Directory => println!("{:>12}  {}/", "-", entry.name.blue().bold()),
                    _ => println!(
                        "{:>12}  {}",
                        entry.size.map(|s| s.to_string()).unwrap_or_else(|| "?".into()),
                        entry.name
                    ),
                }
            }
        }
        ClientAction::Nlst => {
            for name in session.nlst(dir).await? {
                println!("{}", name);
            }
        }
        ClientAction::Get { remote, local } => {
            let local = local.unwrap_or_else(|| PathBuf::from(file_name(&remote)));
            if let Some(dir) = dir {
                session.cwd(dir).await?;
            }
            let report = session.download(&remote, &local).await?;
            println!("{} {} bytes -> {}", "Downloaded".green(), report.bytes, local.display());
        }
        ClientAction::Put { local, remote } => {
            let remote = match remote {
                Some(remote) => remote,
                None => local_file_name(&local)?,
            };
            if let Some(dir) = dir {
                session.cwd(dir).await?;
            }
            let report = session.upload(&local, &remote).await?;
            println!("{} {} bytes -> {}", "Uploaded".green(), report.bytes, remote);
        }
        ClientAction::Mkdir { path } => session.mkdir(&path).await?,
        ClientAction::Rmdir { path } => session.rmdir(&path).await?,
        ClientAction::Rm { path } => session.delete(&path).await?,
        ClientAction::Mv { from, to } => session.rename(&from, &to).await?,
    }
    Ok(())
}

fn local_file_name(local: &Path) -> Result<String> {
    local
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("Cannot derive a remote name from {}", local.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = ClientCli::parse();
    init_logger(args.verbose);

    let target = parse_target(&args.url)?;
    let timeout = Duration::from_secs(args.timeout.max(1));
    let config = ClientConfig {
        connect_timeout: timeout,
        read_timeout: timeout,
        data_timeout: timeout,
        data_mode: if args.active {
            DataMode::Active
        } else {
            DataMode::Passive
        },
        ..ClientConfig::default()
    };

    let mut session = ControlSession::connect(&target.host, target.port, config).await?;
    if let Some(welcome) = session.welcome() {
        eprintln!("{}", welcome.message().dimmed());
    }

    let outcome = match session.login(&target.user, &target.password).await {
        Ok(()) => run_action(&mut session, &target, args.action).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = &outcome {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        if let Some(reply) = session.last_reply() {
            eprintln!("{} {}", "Server said:".yellow(), reply);
        }
    }
    let _ = session.quit().await;
    outcome
}
