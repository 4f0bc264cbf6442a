use std::net::IpAddr;
use std::time::Duration;

use clap::{Arg, ArgAction, Command};
use nostr_proxy::Proxy;
use nostr_proxy::config::{PoolKind, ProxyConfig, RelayEndpoint};
use tracing::{error, info};

fn validate_server_url(value: &str) -> Result<String, String> {
    // Pool assignment happens later; validation is pool-independent.
    RelayEndpoint::parse(value, PoolKind::Public)
        .map(|_| value.to_owned())
        .map_err(|e| e.to_string())
}

fn validate_ip_addr(value: &str) -> Result<IpAddr, String> {
    value.parse::<IpAddr>().map_err(|_| "Invalid IP Address".to_owned())
}

fn validate_port(value: &str) -> Result<u16, String> {
    value.parse::<u16>().map_err(|_| "Invalid port number".to_owned())
}

fn validate_seconds(value: &str) -> Result<u64, String> {
    value.parse::<u64>().map_err(|_| "Invalid duration in seconds".to_owned())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "nostr-proxy starting");

    let matches = Command::new("nostr-proxy")
        .version(env!("CARGO_PKG_VERSION"))
        .about("A deduplicating relay proxy with public/private routing")
        .arg(
            Arg::new("public_servers")
                .help("Public upstream relay URLs. Eg. wss://relay.damus.io:443")
                .long("public-servers")
                .value_parser(validate_server_url)
                .num_args(1..)
                .default_values(["wss://relay.damus.io:443", "wss://nos.lol:443"]),
        )
        .arg(
            Arg::new("private_servers")
                .help("Private upstream relay URLs (receive all traffic)")
                .long("private-servers")
                .value_parser(validate_server_url)
                .num_args(1..),
        )
        .arg(
            Arg::new("listen_ip")
                .help("IP address to listen on for client connections")
                .long("listen-ip")
                .value_parser(validate_ip_addr)
                .default_value("127.0.0.1"),
        )
        .arg(
            Arg::new("listen_port")
                .help("Port to listen on for client connections")
                .long("listen-port")
                .value_parser(validate_port)
                .default_value("9999"),
        )
        .arg(
            Arg::new("note_cache_time")
                .help("Seconds a seen event signature stays in the dedup cache")
                .long("note-cache-time")
                .value_parser(validate_seconds)
                .default_value("120"),
        )
        .arg(
            Arg::new("filter_large_media")
                .help("Drop events referencing images larger than 1MB")
                .long("filter-large-media")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let listen_ip = *matches
        .get_one::<IpAddr>("listen_ip")
        .expect("listen_ip has a default");
    let listen_port = *matches
        .get_one::<u16>("listen_port")
        .expect("listen_port has a default");

    let mut config = ProxyConfig::new(listen_ip, listen_port);
    config.note_cache_time = Duration::from_secs(
        *matches
            .get_one::<u64>("note_cache_time")
            .expect("note_cache_time has a default"),
    );
    config.filter_large_media = matches.get_flag("filter_large_media");
    config.public_servers = matches
        .get_many::<String>("public_servers")
        .expect("public_servers has defaults")
        .map(|raw| RelayEndpoint::parse(raw, PoolKind::Public).expect("validated by clap"))
        .collect();
    config.private_servers = matches
        .get_many::<String>("private_servers")
        .map(|urls| {
            urls.map(|raw| RelayEndpoint::parse(raw, PoolKind::Private).expect("validated by clap"))
                .collect()
        })
        .unwrap_or_default();

    let proxy = match Proxy::bind(config).await {
        Ok(proxy) => proxy,
        Err(e) => {
            eprintln!("FATAL: failed to bind client listener: {}", e);
            std::process::exit(1);
        }
    };

    match proxy.local_addr() {
        Ok(addr) => info!(listen = %addr, "listening for client connections"),
        Err(e) => {
            eprintln!("FATAL: listener has no local address: {}", e);
            std::process::exit(1);
        }
    }

    tokio::select! {
        () = proxy.run() => error!("proxy terminated unexpectedly"),
        () = nostr_proxy::signal_handler() => info!("interrupt received, shutting down"),
    }
}
