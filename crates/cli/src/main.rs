//! neewer-hid CLI: probe and control the PL81-Pro over USB HID.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use neewer_hid_core::command::{Command, LabeledCommand, LightState, DEFAULT_TEMP_K};
use neewer_hid_core::config::{load_config, ProbeConfig};
use neewer_hid_core::device::{discover_devices, locate_target, HidapiTransport};
use neewer_hid_core::framing::{self, FramingStrategy};
use neewer_hid_core::negotiate::{send_command, AttemptResult, Negotiator, Outcome, ProbePlan};
use neewer_hid_core::safety;

#[derive(Parser)]
#[command(
    name = "neewer-hid",
    version,
    about = "Probe and control a Neewer PL81-Pro over USB HID"
)]
struct Cli {
    /// JSON config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// USB vendor ID (hex), overrides the config.
    #[arg(long, global = true, value_parser = parse_hex_u16)]
    vid: Option<u16>,
    /// USB product ID (hex), overrides the config.
    #[arg(long, global = true, value_parser = parse_hex_u16)]
    pid: Option<u16>,
    /// Buffer size for padded strategies, overrides the config.
    #[arg(long, global = true)]
    pad_to: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List matching HID devices.
    ListDevices,
    /// List the framing strategies in trial order.
    ListStrategies,
    /// Try every command under every framing strategy.
    Probe {
        /// Only run these rounds (1-based, comma separated).
        #[arg(long, value_delimiter = ',')]
        rounds: Vec<usize>,
        /// Pause between submissions, in milliseconds (1000 to watch the light).
        #[arg(long)]
        delay_ms: Option<u64>,
        /// Append the transcript to this file.
        #[arg(long)]
        log: Option<PathBuf>,
        /// Print the full report as JSON instead of a transcript.
        #[arg(long)]
        json: bool,
    },
    /// Power the light on.
    On {
        #[arg(long, default_value = "app-protocol")]
        strategy: String,
    },
    /// Power the light off.
    Off {
        #[arg(long, default_value = "app-protocol")]
        strategy: String,
    },
    /// Set brightness and color temperature.
    Set {
        /// Brightness, 0-100.
        brightness: u16,
        /// Color temperature in Kelvin (2900-7000).
        kelvin: Option<u32>,
        /// Raw temperature bucket (0-18) instead of Kelvin.
        #[arg(long, conflicts_with = "kelvin")]
        temp_byte: Option<u16>,
        #[arg(long, default_value = "app-protocol")]
        strategy: String,
    },
    /// Decode a status packet given as hex bytes.
    Decode {
        /// e.g. "3a 02 03 01 32 09 00 7b"
        hex: String,
    },
}

fn parse_hex_u16(s: &str) -> std::result::Result<u16, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid hex value '{s}': {e}"))
}

fn parse_hex_bytes(s: &str) -> Result<Vec<u8>> {
    let compact: String = s
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != ',')
        .collect();
    hex::decode(&compact).with_context(|| format!("invalid hex bytes '{s}'"))
}

fn resolve_config(cli: &Cli) -> Result<ProbeConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProbeConfig::default(),
    };
    if let Some(vid) = cli.vid {
        config.vendor_id = vid;
    }
    if let Some(pid) = cli.pid {
        config.product_id = pid;
    }
    if let Some(pad_to) = cli.pad_to {
        config.pad_to = safety::validate_pad_to(pad_to)?;
    }
    Ok(config)
}

fn strategy_by_label(label: &str, config: &ProbeConfig) -> Result<FramingStrategy> {
    framing::find(label, config.pad_to).ok_or_else(|| {
        let known: Vec<String> = framing::catalog(config.pad_to)
            .into_iter()
            .map(|s| s.label)
            .collect();
        anyhow::anyhow!(
            "Unknown strategy '{label}'. Valid strategies: {}",
            known.join(", ")
        )
    })
}

/// One transcript line per attempt.
fn transcript_line(a: &AttemptResult) -> String {
    let label = format!("{} [{}]", a.command_label, a.framing_label);
    let verdict = match &a.outcome {
        Outcome::Accepted => "SUCCESS!".to_string(),
        Outcome::Rejected => a.detail.clone().unwrap_or_default(),
        Outcome::Skipped { reason } => format!("not attempted: {reason}"),
    };
    let status = a
        .status
        .map_or_else(|| "-".to_string(), |s| s.to_string());
    format!(
        "  {label:<48} type={} id={:<4} len={:<4} [{}] -> {status} {verdict}",
        a.report_type.code(),
        a.report_id,
        a.bytes_sent,
        hex::encode(&a.frame)
    )
}

fn send_single(config: &ProbeConfig, command: LabeledCommand, strategy: &str) -> Result<()> {
    let strategy = strategy_by_label(strategy, config)?;
    let mut transport = HidapiTransport::new()?;
    let target = locate_target(&mut transport, config.vendor_id, config.product_id)?;
    let result = send_command(&mut transport, &target, &command, &strategy)?;
    println!("{}", transcript_line(&result));
    if !result.succeeded() {
        anyhow::bail!("device rejected the report");
    }
    Ok(())
}

fn run_probe(
    config: &ProbeConfig,
    rounds: &[usize],
    log: Option<&PathBuf>,
    json: bool,
) -> Result<()> {
    let mut transport = HidapiTransport::new()?;
    let target = locate_target(&mut transport, config.vendor_id, config.product_id)?;

    let mut plan = ProbePlan::standard(config.pad_to);
    if !rounds.is_empty() {
        plan = plan.select(rounds);
    }

    let mut log_file: Option<File> = match log {
        Some(path) => Some(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open log file {}", path.display()))?,
        ),
        None => None,
    };

    if !json {
        println!(
            "Probing {} (VID: 0x{:04X}, PID: 0x{:04X})",
            target.path, target.vendor_id, target.product_id
        );
    }

    let mut last_round = String::new();
    let mut log_error = None;
    let report = Negotiator::new(&mut transport)
        .with_delay(config.inter_command_delay())
        .run_with(&target, &plan, &mut |attempt| {
            let mut lines = Vec::new();
            if attempt.round != last_round {
                last_round = attempt.round.clone();
                lines.push(format!("--- {} ---", attempt.round));
            }
            lines.push(transcript_line(attempt));
            for line in lines {
                if !json {
                    println!("{line}");
                }
                if let Some(file) = log_file.as_mut() {
                    if let Err(e) = writeln!(file, "{line}") {
                        log_error.get_or_insert(e);
                    }
                }
            }
        })?;

    if let Some(e) = log_error {
        tracing::warn!(error = %e, "Transcript could not be written completely");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    if report.any_succeeded {
        let count = report.attempts.iter().filter(|a| a.succeeded()).count();
        println!("*** {count} attempt(s) accepted by the device ***");
    } else {
        println!("All attempts failed.");
    }
    if let Some(hint) = report.diagnosis.hint() {
        println!("Hint: {hint}");
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    match cli.command {
        Commands::ListDevices => {
            let mut transport = HidapiTransport::new()?;
            let devices = discover_devices(&mut transport, config.vendor_id, config.product_id)?;
            if devices.is_empty() {
                println!(
                    "No HID device with VID 0x{:04X} PID 0x{:04X} found.",
                    config.vendor_id, config.product_id
                );
                println!("Ensure the light is connected and the HID device is accessible.");
            } else {
                for dev in &devices {
                    println!(
                        "{} (VID: 0x{:04X}, PID: 0x{:04X}, usage: 0x{:04X}/0x{:04X}, interface: {}, path: {})",
                        dev.product.as_deref().unwrap_or("unknown"),
                        dev.vendor_id,
                        dev.product_id,
                        dev.usage_page,
                        dev.usage,
                        dev.interface_number,
                        dev.path
                    );
                }
            }
        }
        Commands::ListStrategies => {
            for (i, s) in framing::catalog(config.pad_to).iter().enumerate() {
                println!("{:>2}. {s}", i + 1);
            }
        }
        Commands::Probe {
            rounds,
            delay_ms,
            log,
            json,
        } => {
            let mut config = config;
            if let Some(ms) = delay_ms {
                config.inter_command_delay_ms = ms;
            }
            run_probe(&config, &rounds, log.as_ref(), json)?;
        }
        Commands::On { strategy } => {
            send_single(
                &config,
                LabeledCommand::new("Power ON", Command::power_on()),
                &strategy,
            )?;
        }
        Commands::Off { strategy } => {
            send_single(
                &config,
                LabeledCommand::new("Power OFF", Command::power_off()),
                &strategy,
            )?;
        }
        Commands::Set {
            brightness,
            kelvin,
            temp_byte,
            strategy,
        } => {
            let brightness = safety::validate_brightness(brightness)?;
            let command = match temp_byte {
                Some(raw) => {
                    let temp = safety::validate_temp_byte(raw)?;
                    LabeledCommand::new(
                        format!("CCT {brightness}% temp=0x{temp:02X}"),
                        Command::cct(brightness, temp),
                    )
                }
                None => {
                    let kelvin = safety::validate_kelvin(kelvin.unwrap_or(DEFAULT_TEMP_K))?;
                    LabeledCommand::new(
                        format!("CCT {brightness}% {kelvin}K"),
                        Command::cct_kelvin(brightness, kelvin),
                    )
                }
            };
            send_single(&config, command, &strategy)?;
        }
        Commands::Decode { hex } => {
            let bytes = parse_hex_bytes(&hex)?;
            match LightState::decode(&bytes) {
                Some(state) => println!("{state}"),
                None => anyhow::bail!("not a valid CCT status packet: {:02X?}", bytes),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_ids_parse_with_and_without_prefix() {
        assert_eq!(parse_hex_u16("0x0BDA"), Ok(0x0BDA));
        assert_eq!(parse_hex_u16("1100"), Ok(0x1100));
        assert!(parse_hex_u16("xyz").is_err());
    }

    #[test]
    fn hex_bytes_accept_separators() {
        assert_eq!(
            parse_hex_bytes("3a 02:03,01").unwrap(),
            vec![0x3A, 0x02, 0x03, 0x01]
        );
        assert!(parse_hex_bytes("3a0").is_err());
        assert!(parse_hex_bytes("zz").is_err());
    }

    #[test]
    fn hex_bytes_reject_non_ascii_without_panicking() {
        let err = parse_hex_bytes("a\u{e9}0").unwrap_err();
        assert!(err.to_string().contains("invalid hex bytes"));
        assert!(parse_hex_bytes("\u{e9}\u{e9}").is_err());
    }

    #[test]
    fn unknown_strategy_lists_valid_labels() {
        let err = strategy_by_label("bogus", &ProbeConfig::default()).unwrap_err();
        assert!(err.to_string().contains("app-protocol"));
    }

    #[test]
    fn cli_parses_probe_rounds() {
        let cli = Cli::try_parse_from(["neewer-hid", "probe", "--rounds", "1,6", "--json"]).unwrap();
        match cli.command {
            Commands::Probe { rounds, json, .. } => {
                assert_eq!(rounds, vec![1, 6]);
                assert!(json);
            }
            _ => panic!("expected probe"),
        }
    }
}
