// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use aptstrap::{
    apt::{detect_package_manager_version, AptGet},
    bootstrap::Bootstrapper,
    config::{ProvisionPlan, RepositorySpec},
    host::{default_detectors, detect_host_identity, PresetIdentity},
    keyring::GpgDearmor,
    path::{default_plan_path, SysRoot},
    prereq::SearchPath,
    provision::provision,
    transfer::Curl,
};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::{fs::read_to_string, path::PathBuf, process::exit};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "aptstrap [options] <aptstrap-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(flatten)]
    pub host: HostOptions,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        match self.command {
            Command::Detect => run_detect(self.host),
            Command::AptVersion => run_apt_version(),
            Command::Repo(opts) => run_repo(self.host, opts),
            Command::Provision(opts) => run_provision(self.host, opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Show detected operating system and distribution codename.
    #[command(override_usage = "aptstrap detect")]
    Detect,

    /// Show installed apt version and its comparison code.
    #[command(override_usage = "aptstrap apt-version")]
    AptVersion,

    /// Bootstrap third-party repositories from provision plan.
    #[command(override_usage = "aptstrap repo [options] [<repository_name>]...")]
    Repo(RepoOptions),

    /// Carry out entire provision plan.
    #[command(override_usage = "aptstrap provision [options]")]
    Provision(ProvisionOptions),
}

#[derive(Args, Clone, Debug)]
struct HostOptions {
    /// System root to resolve all system paths under.
    #[arg(long, global = true, value_name = "path", default_value = "/")]
    pub root: PathBuf,

    /// Operating system override, skips detection together with --dist.
    #[arg(long, global = true, env = "os", value_name = "os")]
    pub os: Option<String>,

    /// Distribution codename override, skips detection together with --os.
    #[arg(long, global = true, env = "dist", value_name = "codename")]
    pub dist: Option<String>,
}

impl HostOptions {
    fn sysroot(&self) -> SysRoot {
        SysRoot::new(&self.root)
    }

    fn preset(&self) -> PresetIdentity {
        PresetIdentity::new(self.os.clone(), self.dist.clone())
    }
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RepoOptions {
    /// Path to provision plan.
    #[arg(short, long, value_name = "path")]
    pub plan: Option<PathBuf>,

    /// Names of repositories to bootstrap, all of them if omitted.
    #[arg(value_name = "repository_name")]
    pub names: Vec<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ProvisionOptions {
    /// Path to provision plan.
    #[arg(short, long, value_name = "path")]
    pub plan: Option<PathBuf>,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn run_detect(host: HostOptions) -> Result<()> {
    let identity = detect_host_identity(&host.preset(), &default_detectors(&host.sysroot()))?;
    println!("{identity}");
    Ok(())
}

fn run_apt_version() -> Result<()> {
    let version = detect_package_manager_version(&AptGet::new())?;
    println!("{version} ({})", version.code());
    Ok(())
}

fn run_repo(host: HostOptions, opts: RepoOptions) -> Result<()> {
    let plan = load_plan(opts.plan)?;
    let repositories = if opts.names.is_empty() {
        plan.repositories.clone()
    } else {
        opts.names
            .iter()
            .map(|name| {
                plan.repository(name)
                    .cloned()
                    .ok_or_else(|| anyhow!("repository {name:?} is not in provision plan"))
            })
            .collect::<Result<Vec<RepositorySpec>>>()?
    };

    let (locator, manager, client, dearmor) = (SearchPath, AptGet::new(), Curl::new(), GpgDearmor::new());
    let bootstrapper = Bootstrapper::new(
        host.sysroot(),
        host.preset(),
        &locator,
        &manager,
        &client,
        &dearmor,
    );
    let report = bootstrapper.run(&repositories)?;
    for repository in report.repositories {
        info!(
            "{} declared at {}, key at {}",
            repository.name,
            repository.definition_path.display(),
            repository.key.as_path().display()
        );
    }

    Ok(())
}

fn run_provision(host: HostOptions, opts: ProvisionOptions) -> Result<()> {
    let plan = load_plan(opts.plan)?;
    let (locator, manager, client, dearmor) = (SearchPath, AptGet::new(), Curl::new(), GpgDearmor::new());
    let bootstrapper = Bootstrapper::new(
        host.sysroot(),
        host.preset(),
        &locator,
        &manager,
        &client,
        &dearmor,
    );

    provision(&host.sysroot(), &plan, &manager, &bootstrapper)?;

    Ok(())
}

fn load_plan(path: Option<PathBuf>) -> Result<ProvisionPlan> {
    let path = match path {
        Some(path) => path,
        None => default_plan_path()?,
    };

    let data = read_to_string(&path)
        .with_context(|| format!("failed to read provision plan {}", path.display()))?;
    data.parse()
        .with_context(|| format!("invalid provision plan {}", path.display()))
}
