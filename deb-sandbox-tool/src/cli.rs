// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    clap::{value_parser, Arg, ArgAction, ArgGroup, ArgMatches, Command},
    deb_sandbox::{
        fetch::UrlFetcher, install::SandboxPolicy, lookup::JsonRegistryLookup, EngineConfig,
        SandboxEngine, SandboxError, SandboxLayout,
    },
    log::LevelFilter,
    std::path::PathBuf,
    thiserror::Error,
};

const ROOT_ABOUT: &str = "\
Install Debian packages into a virtual filesystem root.

Only the data payload of a .deb is unpacked. Maintainer scripts are never
run, dependencies are not resolved and signatures are not verified. Every
file is written beneath the virtual root; archive entries that would land
outside of it are refused.

The virtual root holds its own state:

<root>/.packages.json
   Files owned by each installed package.

<root>/etc/apt_registry.json
   Package name to .deb URL mapping consulted by `apt install`. It has the
   form {\"packages\": {\"<name>\": {\"url\": \"<url>\"}}}. http://, https://
   and file:// URLs are supported.
";

#[derive(Debug, Error)]
pub enum CliError {
    #[error("argument parsing error: {0}")]
    Clap(#[from] clap::Error),

    #[error("{0}")]
    Sandbox(#[from] SandboxError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("dpkg-query: package '{0}' is not installed")]
    NotInstalled(String),

    #[error("invalid sub-command: {0}")]
    InvalidSubCommand(String),
}

pub type Result<T> = std::result::Result<T, CliError>;

fn package_arg() -> Arg {
    Arg::new("package")
        .required(true)
        .help("Name of the package")
}

pub fn command() -> Command {
    let app = Command::new("vdpkg")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Gregory Szorc <gregory.szorc@gmail.com>")
        .about("Install Debian packages into a virtual filesystem root")
        .long_about(ROOT_ABOUT)
        .arg_required_else_help(true);

    let app = app
        .arg(
            Arg::new("root")
                .long("root")
                .env("VDPKG_ROOT")
                .default_value("LinuxFS")
                .value_parser(value_parser!(PathBuf))
                .global(true)
                .help("Directory acting as the virtual filesystem root"),
        )
        .arg(
            Arg::new("registry")
                .long("registry")
                .value_parser(value_parser!(PathBuf))
                .global(true)
                .help("Package lookup file to use instead of <root>/etc/apt_registry.json"),
        )
        .arg(
            Arg::new("database")
                .long("database")
                .value_parser(value_parser!(PathBuf))
                .global(true)
                .help("Package database to use instead of <root>/.packages.json"),
        )
        .arg(
            Arg::new("strict-sandbox")
                .long("strict-sandbox")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Abort an install when an archive entry escapes the root"),
        )
        .arg(
            Arg::new("no-keep-downloads")
                .long("no-keep-downloads")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Delete downloaded archives after installing them"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .action(ArgAction::Count)
                .global(true)
                .help("Increase logging verbosity. Can be specified multiple times."),
        );

    let app = app.subcommand(
        Command::new("init").about("Create the standard directory tree of the virtual root"),
    );

    let app = app.subcommand(
        Command::new("apt")
            .about("Install and remove packages by name")
            .subcommand_required(true)
            .arg_required_else_help(true)
            .subcommand(
                Command::new("install")
                    .about("Download a package listed in the lookup file and install it")
                    .arg(package_arg()),
            )
            .subcommand(
                Command::new("remove")
                    .visible_alias("purge")
                    .about("Remove an installed package")
                    .arg(package_arg()),
            ),
    );

    app.subcommand(
        Command::new("dpkg")
            .about("Operate on .deb files and installed packages")
            .arg_required_else_help(true)
            .arg(
                Arg::new("install")
                    .short('i')
                    .long("install")
                    .value_name("FILE")
                    .value_parser(value_parser!(PathBuf))
                    .help("Install a .deb file"),
            )
            .arg(
                Arg::new("remove")
                    .short('r')
                    .long("remove")
                    .value_name("PACKAGE")
                    .help("Remove an installed package"),
            )
            .arg(
                Arg::new("list")
                    .short('l')
                    .long("list")
                    .action(ArgAction::SetTrue)
                    .help("List installed packages"),
            )
            .arg(
                Arg::new("listfiles")
                    .short('L')
                    .long("listfiles")
                    .value_name("PACKAGE")
                    .help("List files installed by a package"),
            )
            .group(
                ArgGroup::new("action")
                    .args(["install", "remove", "list", "listfiles"])
                    .required(true),
            ),
    )
}

fn init_logging(matches: &ArgMatches) {
    let log_level = match matches.get_count("verbose") {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_level.as_str()),
    );

    // Plain dpkg-like output unless more verbosity was requested.
    if log_level <= LevelFilter::Info {
        builder
            .format_timestamp(None)
            .format_level(false)
            .format_target(false);
    }

    if log_level == LevelFilter::Info {
        builder.filter_module("rustls", LevelFilter::Error);
        builder.filter_module("reqwest", LevelFilter::Error);
    }

    builder.init();
}

fn layout_from_args(args: &ArgMatches) -> SandboxLayout {
    // Always present: the argument has a default.
    let root = args.get_one::<PathBuf>("root").cloned().unwrap_or_default();

    let mut layout = SandboxLayout::new(root);

    if let Some(path) = args.get_one::<PathBuf>("registry") {
        layout = layout.set_lookup_path(path);
    }
    if let Some(path) = args.get_one::<PathBuf>("database") {
        layout = layout.set_database_path(path);
    }

    layout
}

fn config_from_args(args: &ArgMatches) -> EngineConfig {
    EngineConfig {
        sandbox_policy: if args.get_flag("strict-sandbox") {
            SandboxPolicy::Abort
        } else {
            SandboxPolicy::Skip
        },
        keep_downloads: !args.get_flag("no-keep-downloads"),
    }
}

fn open_engine(args: &ArgMatches) -> Result<SandboxEngine> {
    Ok(SandboxEngine::open(
        layout_from_args(args),
        config_from_args(args),
    )?)
}

/// Resolve a required string argument.
fn required_str<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a str> {
    args.get_one::<String>(name)
        .map(|s| s.as_str())
        .ok_or_else(|| CliError::InvalidSubCommand(format!("missing argument: {}", name)))
}

pub fn run_cli() -> Result<()> {
    run_with_matches(&command().get_matches(), true)
}

fn run_with_matches(matches: &ArgMatches, setup_logging: bool) -> Result<()> {
    if setup_logging {
        init_logging(matches);
    }

    match matches.subcommand() {
        Some(("init", args)) => command_init(args),
        Some(("apt", args)) => match args.subcommand() {
            Some(("install", sub)) => command_apt_install(sub),
            Some(("remove", sub)) => command_remove(sub, required_str(sub, "package")?),
            Some((command, _)) => Err(CliError::InvalidSubCommand(format!("apt {}", command))),
            None => Err(CliError::InvalidSubCommand("apt".to_string())),
        },
        Some(("dpkg", args)) => command_dpkg(args),
        Some((command, _)) => Err(CliError::InvalidSubCommand(command.to_string())),
        None => {
            command().print_help()?;
            Ok(())
        }
    }
}

fn command_init(args: &ArgMatches) -> Result<()> {
    layout_from_args(args).init()?;

    Ok(())
}

fn command_apt_install(args: &ArgMatches) -> Result<()> {
    let package = required_str(args, "package")?;
    let mut engine = open_engine(args)?;

    let lookup = JsonRegistryLookup::from_path(engine.layout().lookup_path())?;
    engine.install_from_registry(&lookup, &UrlFetcher, package)?;

    Ok(())
}

fn command_remove(args: &ArgMatches, package: &str) -> Result<()> {
    let mut engine = open_engine(args)?;

    // Not being installed is a warning, not an error.
    engine.remove(package)?;

    Ok(())
}

fn command_dpkg(args: &ArgMatches) -> Result<()> {
    if let Some(path) = args.get_one::<PathBuf>("install") {
        let mut engine = open_engine(args)?;
        engine.install_from_file(path, None)?;
    } else if let Some(package) = args.get_one::<String>("remove") {
        command_remove(args, package)?;
    } else if args.get_flag("list") {
        let engine = open_engine(args)?;
        for package in engine.installed_packages() {
            println!("ii  {}", package);
        }
    } else if let Some(package) = args.get_one::<String>("listfiles") {
        let engine = open_engine(args)?;
        let files = engine
            .package_files(package)
            .ok_or_else(|| CliError::NotInstalled(package.clone()))?;

        for file in files {
            println!("/{}", file);
        }
    }

    Ok(())
}
