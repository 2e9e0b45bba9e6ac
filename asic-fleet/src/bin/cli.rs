//! Command-line interface for asic-fleet.
//!
//! Monitors and controls the fleet daemon through its HTTP API.

use std::env;

use anyhow::{Context, Result, bail};

use asic_fleet::api_client::{
    self,
    types::{DeviceState, FleetSnapshot},
};
use asic_fleet::tracing;

const USAGE: &str = "\
Usage: asic-fleet-cli <command> [args]

Commands:
  status                 Show fleet summary
  devices                List devices
  power <id>             Toggle a device's power
  fan <id>               Toggle a device's fan
  overclock <id>         Toggle overclocking
  action <id> <name>     Run a power action (idle, standby, stop, reboot,
                         force-stop, start-mining)
  start-all              Boot every offline device
  stop-all               Shut down every running device
  prefs                  Show preferences
  set <key> <value>      Set a preference (preventOverheat, preventErrors,
                         startupDelay, shutdownDelay)
  notifications          Show recent notifications

Environment:
  ASIC_FLEET_API_URL     API base URL (default: http://127.0.0.1:6570)";

#[tokio::main]
async fn main() -> Result<()> {
    tracing::init_stdout(::tracing::level_filters::LevelFilter::WARN);

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{USAGE}");
        std::process::exit(1);
    };
    let client = make_client();

    match command.as_str() {
        "status" => print_status(&client.get_fleet().await?),
        "devices" => print_devices(&client.get_devices().await?),
        "power" => print_device(&client.toggle_power(device_id(&args)?).await?),
        "fan" => print_device(&client.toggle_fan(device_id(&args)?).await?),
        "overclock" => print_device(&client.toggle_overclock(device_id(&args)?).await?),
        "action" => {
            let id = device_id(&args)?;
            let name = arg(&args, 2, "action name")?;
            print_device(&client.power_action(id, name).await?);
        }
        "start-all" => print_status(&client.start_all().await?),
        "stop-all" => print_status(&client.stop_all().await?),
        "prefs" => print_preferences(&client.get_preferences().await?),
        "set" => {
            let key = arg(&args, 1, "preference key")?;
            let value = arg(&args, 2, "value")?;
            print_preferences(&client.set_preference(key, value).await?);
        }
        "notifications" => {
            for entry in client.get_notifications().await? {
                println!("#{:<4} {:<8} {}", entry.seq, entry.level.to_string(), entry.message);
            }
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!("Run without arguments to see usage.");
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Build an API client, honoring ASIC_FLEET_API_URL if set.
fn make_client() -> api_client::Client {
    match env::var("ASIC_FLEET_API_URL") {
        Ok(url) => api_client::Client::with_base_url(url),
        Err(_) => api_client::Client::new(),
    }
}

fn arg<'a>(args: &'a [String], index: usize, what: &str) -> Result<&'a str> {
    match args.get(index) {
        Some(value) => Ok(value),
        None => bail!("missing {what}"),
    }
}

fn device_id(args: &[String]) -> Result<u32> {
    let raw = arg(args, 1, "device id")?;
    raw.parse()
        .with_context(|| format!("invalid device id {raw:?}"))
}

fn print_status(snapshot: &FleetSnapshot) {
    let summary = &snapshot.summary;

    println!("Uptime:      {} s", snapshot.uptime_secs);
    println!("Status:      {}", summary.global_status);
    println!(
        "Active:      {} / {}",
        summary.active_count,
        snapshot.devices.len()
    );
    println!("Hashrate:    {:.1} TH/s", summary.total_hashrate);
    println!("Power:       {:.0} W", summary.total_power);
    println!(
        "Temperature: {:.1} °C ({})",
        summary.avg_temperature, summary.temp_status_level
    );
    if summary.overclocked_majority {
        println!("Most of the fleet is overclocked.");
    }
    if snapshot.pending_transitions > 0 {
        println!("Pending:     {} transition(s)", snapshot.pending_transitions);
    }
}

fn print_devices(devices: &[DeviceState]) {
    println!(
        "{:>3}  {:<10} {:<20} {:<13} {:>8} {:>7} {:>7} {:>5}",
        "ID", "NAME", "MODEL", "STATUS", "TH/S", "°C", "W", "FAN"
    );
    for d in devices {
        let fan = if d.is_fan_on {
            format!("{}%", d.fan_speed)
        } else {
            "off".to_string()
        };
        println!(
            "{:>3}  {:<10} {:<20} {:<13} {:>8.1} {:>7.1} {:>7.0} {:>5}",
            d.id.0,
            d.name,
            d.model,
            d.status.to_string(),
            d.hashrate,
            d.temperature,
            d.power,
            fan
        );
    }
}

fn print_device(d: &DeviceState) {
    let guard = if d.is_force_stopping {
        " (force-stopping)"
    } else {
        ""
    };
    println!("{} [{}] {}{}", d.name, d.id, d.status, guard);
}

fn print_preferences(prefs: &asic_fleet::preferences::Preferences) {
    println!("preventOverheat: {}", prefs.prevent_overheat);
    println!("preventErrors:   {}", prefs.prevent_errors);
    println!("startupDelay:    {} s", prefs.startup_delay_secs);
    println!("shutdownDelay:   {} s", prefs.shutdown_delay_secs);
}
