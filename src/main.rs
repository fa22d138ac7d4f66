mod catalog;
mod client;
mod config;
mod error;
mod export;
mod inventory;
mod model;
mod resolver;
mod session;

use crate::catalog::{DeviceCatalog, SWITCH_FAMILY};
use crate::client::ControllerClient;
use crate::config::{Config, Scope, resolve, save};
use crate::error::ControllerError;
use crate::inventory::InventoryAggregator;
use crate::model::{AttachmentResult, DeviceInterface, InterfaceSource};
use crate::resolver::IdentityResolver;
use crate::session::{Credentials, Session, SessionManager};
use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;

const EXIT_TOKEN: &str = "q";

#[derive(Parser)]
#[command(
    name = "apicctl",
    version,
    about = "Locate clients and inventory devices through a network controller"
)]
struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "URL",
        help = "Controller API base URL (defaults to https://sandboxapic.cisco.com/api/v1)"
    )]
    url: Option<String>,

    #[arg(long, global = true, help = "Controller username override")]
    username: Option<String>,

    #[arg(
        long,
        global = true,
        env = "APICCTL_PASSWORD",
        hide_env_values = true,
        help = "Controller password override"
    )]
    password: Option<String>,

    #[arg(
        long,
        global = true,
        value_name = "BOOL",
        help = "Verify the controller's TLS certificate (off by default)"
    )]
    verify_tls: Option<bool>,

    #[arg(long, global = true, value_name = "SECONDS", help = "Per-request timeout")]
    timeout: Option<u64>,

    #[arg(
        long,
        short = 'o',
        value_enum,
        default_value_t = OutputFormat::Pretty,
        global = true,
        help = "Output format"
    )]
    output: OutputFormat,

    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "More logging (-v info, -vv debug)"
    )]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Persist controller settings to the chosen scope
    ///
    /// Values come from the global --url/--username/--password/--verify-tls/--timeout flags.
    Configure {
        #[arg(
            long,
            value_enum,
            default_value_t = ScopeArg::User,
            help = "Where to write the config (local project dir or user config dir)"
        )]
        scope: ScopeArg,
    },
    /// Show current configuration (password masked)
    ConfigShow,
    /// Find the switch port or access point VLAN a client IP is attached to
    LocateIp {
        #[arg(value_name = "IP", help = "Resolve once; omit to prompt until `q`")]
        ip: Option<String>,
    },
    /// Find where a client MAC address is attached
    LocateMac {
        #[arg(value_name = "MAC", help = "Resolve once; omit to prompt until `q`")]
        mac: Option<String>,
    },
    /// Check whether an IP is used by a client and/or configured on a network device
    CheckIp {
        #[arg(value_name = "IP", help = "Check once; omit to prompt until `q`")]
        ip: Option<String>,
    },
    /// Hostname, serial number and in-use licenses of every device
    Licenses {
        #[arg(
            long,
            value_name = "FAMILY",
            help = "Only devices of this family, e.g. \"Switches and Hubs\""
        )]
        family: Option<String>,
        #[command(flatten)]
        export: ExportArgs,
    },
    /// Access port inventory (VLAN, voice VLAN, MAC) of every switch
    Switchports {
        #[arg(long, value_name = "FAMILY", default_value = SWITCH_FAMILY)]
        family: String,
        #[arg(long, help = "Include trunk and routed ports")]
        all_ports: bool,
        #[command(flatten)]
        export: ExportArgs,
    },
    /// Generate shell completion scripts
    Completion {
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(clap::Args)]
struct ExportArgs {
    #[arg(long, value_name = "NAME", help = "Also write rows to NAME.csv")]
    file: Option<String>,
    #[arg(long, conflicts_with = "file", help = "Prompt for a file name to save rows to")]
    save: bool,
    #[arg(long, value_name = "N", default_value_t = 1, help = "Devices fetched in parallel")]
    jobs: usize,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
enum OutputFormat {
    Pretty,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ScopeArg {
    Local,
    User,
}

impl From<ScopeArg> for Scope {
    fn from(value: ScopeArg) -> Self {
        match value {
            ScopeArg::Local => Scope::Local,
            ScopeArg::User => Scope::User,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let cwd = std::env::current_dir().context("reading current directory")?;

    match &cli.command {
        Commands::Configure { scope } => {
            let existing = config::load_scope((*scope).into(), &cwd)?;
            let updated = config::merge(existing, cli_overrides(&cli));
            if updated == Config::default() {
                anyhow::bail!(
                    "nothing to save; pass --url, --username, --password, --verify-tls or --timeout"
                );
            }
            let path = save((*scope).into(), &updated, &cwd)?;
            println!("Saved controller settings to {}", path.display());
            return Ok(());
        }
        Commands::ConfigShow => {
            let merged = config::load(&cwd)?;
            println!("{}", serde_json::to_string_pretty(&config::masked(&merged))?);
            return Ok(());
        }
        Commands::Completion { shell } => {
            print_completion(*shell);
            return Ok(());
        }
        _ => {}
    }

    let effective = resolve(&cwd, cli_overrides(&cli))?;
    let client = ControllerClient::new(&effective.url, effective.verify_tls, effective.timeout)?;
    let session = SessionManager::new(
        &client,
        Credentials {
            username: effective.username,
            password: effective.password,
        },
    )
    .acquire()?;

    let output = cli.output;
    match cli.command {
        Commands::LocateIp { ip } => {
            let resolver = IdentityResolver::new(&client, &session);
            run_lookups("Input the IP address to locate", ip, |ip| {
                report_attachment("IP", ip, resolver.resolve_by_ip(ip), output)
            })?
        }
        Commands::LocateMac { mac } => {
            let resolver = IdentityResolver::new(&client, &session);
            run_lookups("Input the MAC address to locate", mac, |mac| {
                report_attachment("MAC", mac, resolver.resolve_by_mac(mac), output)
            })?
        }
        Commands::CheckIp { ip } => {
            let resolver = IdentityResolver::new(&client, &session);
            run_lookups("Input the IP address to check", ip, |ip| {
                check_ip(&resolver, ip, output)
            })?
        }
        Commands::Licenses { family, export } => {
            let rows = aggregator(&client, &session, export.jobs)
                .build_fleet_inventory(family.as_deref())?;
            render_rows(
                &rows,
                &["hostname", "serial", "licenses"],
                rows.iter().map(|r| {
                    vec![
                        r.hostname.clone(),
                        r.serial_number.clone(),
                        r.licenses.join(", "),
                    ]
                }),
                output,
            )?;
            export_rows(&export, rows.iter().map(|r| r.record()))?;
        }
        Commands::Switchports {
            family,
            all_ports,
            export,
        } => {
            let rows = aggregator(&client, &session, export.jobs)
                .build_switchport_inventory(Some(family.as_str()), all_ports)?;
            render_rows(
                &rows,
                &["hostname", "port", "status", "mode", "vlan", "voice", "mac"],
                rows.iter().map(|r| r.record()),
                output,
            )?;
            export_rows(&export, rows.iter().map(|r| r.record()))?;
        }
        Commands::Configure { .. } | Commands::ConfigShow | Commands::Completion { .. } => {
            unreachable!("handled before login")
        }
    }

    Ok(())
}

fn cli_overrides(cli: &Cli) -> Config {
    Config {
        url: cli.url.clone(),
        username: cli.username.clone(),
        password: cli.password.clone(),
        verify_tls: cli.verify_tls,
        timeout_secs: cli.timeout,
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "apicctl=warn",
        1 => "apicctl=info",
        _ => "apicctl=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn aggregator<'a>(
    client: &'a ControllerClient,
    session: &'a Session,
    jobs: usize,
) -> InventoryAggregator<'a> {
    InventoryAggregator::new(DeviceCatalog::new(client, session), jobs)
}

/// Runs `lookup` once for `given`, or prompts until the exit token or EOF.
/// In the prompt loop only ticket failures end the session.
fn run_lookups<F>(prompt_text: &str, given: Option<String>, mut lookup: F) -> Result<()>
where
    F: FnMut(&str) -> Result<()>,
{
    if let Some(value) = given {
        return lookup(value.trim());
    }

    let prompt_text = format!("{prompt_text} ({EXIT_TOKEN} to exit): ");
    while let Some(value) = prompt(&prompt_text)? {
        if value == EXIT_TOKEN {
            break;
        }
        if value.is_empty() {
            continue;
        }
        if let Err(err) = lookup(&value) {
            if is_session_failure(&err) {
                return Err(err);
            }
            eprintln!("Error: {err:#}");
        }
    }
    Ok(())
}

fn is_session_failure(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<ControllerError>(),
        Some(ControllerError::Auth(_))
            | Some(ControllerError::Transport {
                status: Some(401 | 403),
                ..
            })
    )
}

fn prompt(text: &str) -> Result<Option<String>> {
    let mut stdout = io::stdout();
    write!(stdout, "{text}")?;
    stdout.flush()?;

    let mut line = String::new();
    let read = io::stdin()
        .lock()
        .read_line(&mut line)
        .context("reading input")?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn report_attachment(
    kind: &str,
    identifier: &str,
    outcome: Result<Option<AttachmentResult>, ControllerError>,
    output: OutputFormat,
) -> Result<()> {
    match outcome {
        Ok(Some(found)) => {
            if output == OutputFormat::Json {
                return print_json(&found);
            }
            println!("{}", describe_attachment(kind, &found));
        }
        Ok(None) => {
            if output == OutputFormat::Json {
                return print_json(&serde_json::json!({ "identifier": identifier, "found": false }));
            }
            println!("The {kind} address {identifier} is not used by any client devices");
        }
        Err(ControllerError::MalformedInput { input, message }) => {
            if output == OutputFormat::Json {
                return print_json(&serde_json::json!({
                    "identifier": input,
                    "malformed": true,
                    "message": message,
                }));
            }
            println!("The {kind} address {input} was rejected by the controller: {message}");
        }
        Err(err) => return Err(err.into()),
    }
    Ok(())
}

fn describe_attachment(kind: &str, found: &AttachmentResult) -> String {
    let mut line = format!(
        "The {kind} address {} is connected to network device {}, {}, interface {}",
        found.identifier, found.device.hostname, found.device.model, found.interface_label
    );
    if let Some(ip) = found.host_ip.as_deref().filter(|ip| *ip != found.identifier) {
        line.push_str(&format!(", client IP {ip}"));
    }
    if let Some(mac) = found.host_mac.as_deref().filter(|mac| *mac != found.identifier) {
        line.push_str(&format!(", client MAC {mac}"));
    }
    if let Some(vlan) = &found.vlan_id
        && !found.interface_label.starts_with("VLAN ")
    {
        line.push_str(&format!(", VLAN {vlan}"));
    }
    line
}

fn describe_device_interface(ip: &str, found: &DeviceInterface) -> String {
    match (found.source, &found.port_name) {
        (InterfaceSource::Interface, Some(port)) => format!(
            "The IP address {ip} is configured on network device {}, {}, interface {port}",
            found.device.hostname, found.device.model
        ),
        _ => format!(
            "The IP address {ip} is configured on network device {}, {}",
            found.device.hostname, found.device.model
        ),
    }
}

/// One lookup's result in `-o json` output.
#[derive(Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
enum Outcome<T> {
    Found(T),
    NotFound,
    Malformed { message: String },
    Error { message: String },
}

impl<'r, T> Outcome<&'r T> {
    fn of(result: &'r Result<Option<T>, ControllerError>) -> Self {
        match result {
            Ok(Some(found)) => Outcome::Found(found),
            Ok(None) => Outcome::NotFound,
            Err(ControllerError::MalformedInput { message, .. }) => Outcome::Malformed {
                message: message.clone(),
            },
            Err(err) => Outcome::Error {
                message: err.to_string(),
            },
        }
    }
}

/// Client attachment and device interface checks for one IP. Both are
/// reported even if the first one fails.
fn check_ip(resolver: &IdentityResolver<'_>, ip: &str, output: OutputFormat) -> Result<()> {
    let client = resolver.resolve_by_ip(ip);
    let device = resolver.resolve_interface_by_ip(ip);

    if output == OutputFormat::Json {
        #[derive(Serialize)]
        struct Check<'a> {
            ip: &'a str,
            client: Outcome<&'a AttachmentResult>,
            device: Outcome<&'a DeviceInterface>,
        }
        print_json(&Check {
            ip,
            client: Outcome::of(&client),
            device: Outcome::of(&device),
        })?;
        for err in [client.err(), device.err()].into_iter().flatten() {
            if !matches!(err, ControllerError::MalformedInput { .. }) {
                return Err(err.into());
            }
        }
        return Ok(());
    }

    let client_result = report_attachment("IP", ip, client, output);
    match device {
        Ok(Some(found)) => println!("{}", describe_device_interface(ip, &found)),
        Ok(None) => println!("The IP address {ip} is not configured on any network devices"),
        Err(err) => {
            client_result?;
            return Err(err.into());
        }
    }
    client_result
}

fn render_rows<T, I>(rows: &[T], headers: &[&str], cells: I, output: OutputFormat) -> Result<()>
where
    T: Serialize,
    I: Iterator<Item = Vec<String>>,
{
    match output {
        OutputFormat::Json => print_json(&rows),
        OutputFormat::Pretty => {
            print_table(headers, cells.collect());
            Ok(())
        }
    }
}

fn export_rows<I>(args: &ExportArgs, rows: I) -> Result<()>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let name = match (&args.file, args.save) {
        (Some(name), _) => name.clone(),
        (None, true) => match prompt("Input the file name to save data to: ")? {
            Some(name) if !name.is_empty() => name,
            _ => {
                eprintln!("No file name given, nothing saved.");
                return Ok(());
            }
        },
        (None, false) => return Ok(()),
    };
    let path = export::write_csv_file(&name, rows)?;
    eprintln!("Saved rows to {}", path.display());
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_table(headers: &[&str], table: Vec<Vec<String>>) {
    if table.is_empty() {
        println!("No devices found.");
        return;
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &table {
        for (idx, cell) in row.iter().enumerate().take(widths.len()) {
            widths[idx] = widths[idx].max(cell.chars().count());
        }
    }

    print_line(&widths, headers.iter().copied());
    let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    print_line(&widths, separator.iter().map(String::as_str));
    for row in &table {
        print_line(&widths, row.iter().map(String::as_str));
    }
}

fn print_line<'a>(widths: &[usize], cells: impl Iterator<Item = &'a str>) {
    let mut line = String::new();
    for (i, (cell, width)) in cells.zip(widths).enumerate() {
        if i > 0 {
            line.push_str("  ");
        }
        line.push_str(&format!("{:width$}", cell, width = *width));
    }
    println!("{}", line.trim_end());
}

fn print_completion(shell: CompletionShell) {
    use clap_complete::{generate, shells};
    let mut cmd = Cli::command();
    let bin = cmd.get_name().to_string();
    match shell {
        CompletionShell::Bash => generate(shells::Bash, &mut cmd, bin, &mut io::stdout()),
        CompletionShell::Zsh => generate(shells::Zsh, &mut cmd, bin, &mut io::stdout()),
        CompletionShell::Fish => generate(shells::Fish, &mut cmd, bin, &mut io::stdout()),
        CompletionShell::PowerShell => {
            generate(shells::PowerShell, &mut cmd, bin, &mut io::stdout())
        }
    }
}
