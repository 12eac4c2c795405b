use colored::*;
use viewdns::nameserver::conf::{Conf, ViewConf};
use viewdns::nameserver::*;
use viewdns::shared::net::{start_servers, UdpParams};
use viewdns::shared::{dns, log};
use std::sync::Arc;
use std::{env, process, time};

const STARTING_TTL: u32 = 3600;
const WRITE_TIMEOUT_SECS: u64 = 2;
const UDP_THREADS: usize = 8;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        log::init_log(log::LogLevel::Debug);
        print_usage();
        process::exit(1);
    }

    // Process configuration file. Logging is initialized as soon as we know
    // the requested logfile, so parse/load errors from here on are visible.
    let conf = match Conf::from_file(&args[1]) {
        Ok(conf) => conf,
        Err(err) => {
            log::init_log(log::LogLevel::Debug);
            log::error!("Parsing configuration file: {}", err);
            process::exit(1);
        }
    };
    if let Err(err) = log::init_log_to(log::LogLevel::Info, conf.logfile.as_deref()) {
        eprintln!("Cannot open logfile '{:?}': {}", conf.logfile, err);
        process::exit(1);
    }
    log::info!("Configuration parsed: {} view(s), port {}.", conf.views.len(), conf.port);

    let registry = match build_registry(&conf) {
        Ok(v) => v,
        Err(err) => {
            log::error!("Loading zone files: {}", err);
            process::exit(1);
        }
    };

    let nameserver_handler = Arc::new(NameserverHandler(registry));
    let udp_params = UdpParams {
        address: "0.0.0.0".to_string(),
        address_v6: "::".to_string(),
        port: conf.port,
        write_timeout: time::Duration::new(WRITE_TIMEOUT_SECS, 0),
        threads: UDP_THREADS,
    };

    start_servers(nameserver_handler, udp_params);
}

/// Loads every zone file referenced by `conf` and assembles the
/// [`ViewRegistry`] served by the nameserver: the `[default]` section's
/// zones become the mandatory root view, each other section becomes a
/// named, non-default view.
fn build_registry(conf: &Conf) -> Result<ViewRegistry, String> {
    let mut default_view = View::new();
    let mut named_views = vec![];

    for view_conf in &conf.views {
        let view = load_view(view_conf)?;
        if view_conf.name == dns::Name::root() {
            default_view = view;
        } else {
            named_views.push((view_conf.name.clone(), view));
        }
    }

    let mut registry = ViewRegistry::new(default_view);
    for (name, view) in named_views {
        registry.insert(name, view);
    }
    Ok(registry)
}

fn load_view(view_conf: &ViewConf) -> Result<View, String> {
    let mut view = View::new();
    for entry in &view_conf.zones {
        let zone = parse_zone_files(ParsingParams {
            file_path: entry.file.clone(),
            zone: entry.zone.clone(),
            starting_ttl: STARTING_TTL,
        })
        .map_err(|(err, ctx)| format!("{:?}: {}", err, ctx))?;
        view.insert(zone);
    }
    Ok(view)
}

fn print_usage() {
    log::error!(
        "One argument should be provided when starting the nameserver: the path of the configuration file.
    Usage: {} {}",
        "path/to/nameserver/binary".bold(),
        "path/to/config/file".bold().bright_green()
    )
}
