use anyhow::{bail, Context};
use clap::Parser;
use nix::sys::signal::{SigSet, Signal};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracepulse_core::{
    BurstpingConfig, DestinationInfo, Mode, PacketSize, PingConfig, ResultSink, TimeToLive,
    TracerouteConfig, MAX_PACKET_SIZE, MIN_PACKET_SIZE,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod args;
mod sink;

use args::Args;
use sink::StreamSink;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&args.log_level)
                .with_context(|| format!("invalid log filter '{}'", args.log_level))?,
        )
        .init();

    let destinations: BTreeSet<DestinationInfo> =
        args.destinations.iter().map(|dest| dest.0).collect();
    let mode = make_mode(&args);
    describe(&mode);

    // Block the shutdown signals before spawning so every service thread
    // inherits the mask and delivery funnels into the main thread's wait.
    let mut shutdown = SigSet::empty();
    shutdown.add(Signal::SIGINT);
    shutdown.add(Signal::SIGTERM);
    shutdown
        .thread_block()
        .context("unable to block shutdown signals")?;

    let sink = Arc::new(StreamSink) as Arc<dyn ResultSink>;
    let mut services = Vec::new();
    for source in &args.sources {
        match tracepulse_core::spawn(*source, &destinations, &mode, Arc::clone(&sink)) {
            Ok(handle) => services.push(handle),
            Err(err) => error!("cannot start probing from {source}: {err}"),
        }
    }
    if services.is_empty() {
        bail!("no probing service could be started");
    }

    let signal = shutdown.wait().context("waiting for shutdown signal")?;
    info!("received {signal:?}, shutting down");
    for service in &services {
        service.request_stop();
    }
    for service in services {
        service.join();
    }
    Ok(())
}

fn make_mode(args: &Args) -> Mode {
    if args.ping {
        Mode::Ping(ping_config(args))
    } else if args.burstping {
        Mode::Burstping(BurstpingConfig {
            ping: ping_config(args),
            burst: args.burst.max(1),
        })
    } else {
        Mode::Traceroute(TracerouteConfig {
            duration: clamp_ms(args.traceroute_duration),
            initial_max_ttl: clamp_ttl(args.traceroute_initial_max_ttl),
            final_max_ttl: clamp_ttl(args.traceroute_final_max_ttl),
            increment_max_ttl: clamp_ttl(args.traceroute_increment_max_ttl),
            packet_size: MIN_PACKET_SIZE,
            initial_sequence: None,
            max_rounds: args.iterations.map(|iterations| iterations as usize),
        })
    }
}

fn ping_config(args: &Args) -> PingConfig {
    PingConfig {
        interval: clamp_ms(args.ping_interval),
        expiration: clamp_ms(args.ping_expiration),
        ttl: clamp_ttl(args.ping_ttl),
        packet_size: PacketSize(args.payload.clamp(MIN_PACKET_SIZE.0, MAX_PACKET_SIZE.0)),
        initial_sequence: None,
        iterations: args.iterations,
    }
}

fn describe(mode: &Mode) {
    match mode {
        Mode::Traceroute(config) => info!(
            "traceroute: duration {}ms, TTL sweep {} -> {} by {}",
            config.duration.as_millis(),
            config.initial_max_ttl.0,
            config.final_max_ttl.0,
            config.increment_max_ttl.0
        ),
        Mode::Ping(config) => info!(
            "ping: interval {}ms, expiration {}ms, TTL {}",
            config.interval.as_millis(),
            config.expiration.as_millis(),
            config.ttl.0
        ),
        Mode::Burstping(config) => info!(
            "burstping: burst {}, interval {}ms, expiration {}ms, payload {} bytes",
            config.burst,
            config.ping.interval.as_millis(),
            config.ping.expiration.as_millis(),
            config.ping.packet_size.0
        ),
    }
}

/// Durations are accepted between 100 ms and one hour.
fn clamp_ms(millis: u64) -> Duration {
    Duration::from_millis(millis.clamp(100, 3_600_000))
}

fn clamp_ttl(ttl: u8) -> TimeToLive {
    TimeToLive(ttl.max(1))
}
