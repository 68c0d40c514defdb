//! Producer/consumer demonstration over a bounded blocking queue.
//!
//! # Usage
//!
//! ```sh
//! hopper-demo --capacity 5 --items 10 --produce-pause-ms 500 --consume-pause-ms 1000
//! RUST_LOG=hopper=trace hopper-demo --items 0 --run-for-secs 5
//! ```
//!
//! Build with `--features tracing` to see each produced and consumed item.

use std::time::{Duration, Instant};

use hopper::harness::{ConfigError, Harness, HarnessConfig, HarnessError, HarnessReport};

fn main() {
    hopper::init_tracing();
    if let Err(e) = run() {
        eprintln!("hopper-demo: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), HarnessError> {
    let args: Vec<String> = std::env::args().collect();
    let Some(options) = parse_args(&args)? else {
        print_usage();
        return Ok(());
    };
    let config = options.config.with_cpus_from_env();

    eprintln!(
        "hopper-demo: capacity {} with {} producer(s) and {} consumer(s)",
        config.capacity, config.producers, config.consumers
    );

    let harness = Harness::spawn(config)?;
    let report = match options.run_for {
        Some(limit) if !wait_finished(&harness, limit) => {
            eprintln!("hopper-demo: run time elapsed, cancelling");
            harness.shutdown()?
        }
        _ => harness.join()?,
    };

    print_report(&report);
    Ok(())
}

/// Waits up to `limit` for every role to finish on its own.
fn wait_finished(harness: &Harness, limit: Duration) -> bool {
    const POLL: Duration = Duration::from_millis(10);
    let deadline = Instant::now().checked_add(limit);
    loop {
        if harness.is_finished() {
            return true;
        }
        let left = deadline.map_or(POLL, |at| at.saturating_duration_since(Instant::now()));
        if left.is_zero() {
            return false;
        }
        std::thread::sleep(POLL.min(left));
    }
}

#[derive(Debug, PartialEq)]
struct Options {
    config: HarnessConfig,
    run_for: Option<Duration>,
}

/// Parses command line arguments. `Ok(None)` means help was requested.
fn parse_args(args: &[String]) -> Result<Option<Options>, ConfigError> {
    fn value<'a, T: std::str::FromStr>(
        flag: &str,
        iter: &mut impl Iterator<Item = &'a String>,
    ) -> Result<T, ConfigError> {
        let raw = iter
            .next()
            .ok_or_else(|| ConfigError::MissingValue(flag.to_owned()))?;
        raw.parse().map_err(|_| ConfigError::InvalidValue {
            flag: flag.to_owned(),
            value: raw.clone(),
        })
    }

    let mut config = HarnessConfig::default();
    let mut run_for = None;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            flag @ ("--capacity" | "-c") => config.capacity = value(flag, &mut iter)?,
            flag @ ("--producers" | "-p") => config.producers = value(flag, &mut iter)?,
            flag @ "--consumers" => config.consumers = value(flag, &mut iter)?,
            flag @ ("--items" | "-n") => {
                let items: u64 = value(flag, &mut iter)?;
                config.items_per_producer = (items > 0).then_some(items);
            }
            flag @ "--produce-pause-ms" => {
                config.produce_pause = Duration::from_millis(value(flag, &mut iter)?);
            }
            flag @ "--consume-pause-ms" => {
                config.consume_pause = Duration::from_millis(value(flag, &mut iter)?);
            }
            flag @ "--wait-timeout-ms" => {
                config.wait_timeout = Some(Duration::from_millis(value(flag, &mut iter)?));
            }
            flag @ "--run-for-secs" => {
                run_for = Some(Duration::from_secs(value(flag, &mut iter)?));
            }
            "--help" | "-h" => return Ok(None),
            other => return Err(ConfigError::UnknownArgument(other.to_owned())),
        }
    }

    config.validate()?;
    Ok(Some(Options { config, run_for }))
}

fn print_report(report: &HarnessReport) {
    for role in &report.roles {
        println!(
            "{:<20} {:>6} items  {:>3} timeouts  {:?} after {:.2?}",
            role.name, role.processed, role.timeouts, role.stop, role.elapsed
        );
    }
    println!(
        "produced {} consumed {} left in queue {:?} in {:.2?}",
        report.produced(),
        report.consumed(),
        report.leftover,
        report.elapsed
    );
}

fn print_usage() {
    eprintln!(
        r#"hopper-demo - bounded blocking queue producer/consumer demo

USAGE:
    hopper-demo [OPTIONS]

OPTIONS:
    -c, --capacity <N>          Queue capacity (default: 5)
    -p, --producers <N>         Producer threads (default: 1)
        --consumers <N>         Consumer threads (default: 1)
    -n, --items <N>             Items per producer, 0 runs until cancelled (default: 10)
        --produce-pause-ms <MS> Pause after each put (default: 500)
        --consume-pause-ms <MS> Pause after each take (default: 1000)
        --wait-timeout-ms <MS>  Bound each blocking put/take, retrying on expiry
        --run-for-secs <S>      Cancel all roles after this long
    -h, --help                  Print this help message

ENVIRONMENT:
    PRODUCER_CPU, CONSUMER_CPU  Pin the first producer/consumer to a CPU
    RUST_LOG                    Log filter (default: hopper=debug)

EXAMPLE:
    hopper-demo --capacity 2 --producers 3 --consumers 2 --items 20
"#
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("hopper-demo")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_defaults() {
        let options = parse_args(&args(&[])).unwrap().unwrap();
        assert_eq!(options.config, HarnessConfig::default());
        assert_eq!(options.run_for, None);
    }

    #[test]
    fn test_all_flags() {
        let options = parse_args(&args(&[
            "-c",
            "3",
            "--producers",
            "2",
            "--consumers",
            "4",
            "--items",
            "0",
            "--produce-pause-ms",
            "0",
            "--consume-pause-ms",
            "25",
            "--wait-timeout-ms",
            "100",
            "--run-for-secs",
            "2",
        ]))
        .unwrap()
        .unwrap();

        assert_eq!(options.config.capacity, 3);
        assert_eq!(options.config.producers, 2);
        assert_eq!(options.config.consumers, 4);
        assert_eq!(options.config.items_per_producer, None);
        assert_eq!(options.config.produce_pause, Duration::ZERO);
        assert_eq!(options.config.consume_pause, Duration::from_millis(25));
        assert_eq!(options.config.wait_timeout, Some(Duration::from_millis(100)));
        assert_eq!(options.run_for, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_counted_run_ends_before_limit() {
        let config = HarnessConfig {
            produce_pause: Duration::ZERO,
            consume_pause: Duration::ZERO,
            ..HarnessConfig::default()
        };
        let harness = Harness::spawn(config).unwrap();

        let start = Instant::now();
        assert!(wait_finished(&harness, Duration::from_secs(30)));
        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(harness.join().unwrap().consumed(), 10);
    }

    #[test]
    fn test_unbounded_run_hits_limit() {
        let config = HarnessConfig {
            items_per_producer: None,
            produce_pause: Duration::from_millis(5),
            ..HarnessConfig::default()
        };
        let harness = Harness::spawn(config).unwrap();
        assert!(!wait_finished(&harness, Duration::from_millis(50)));
        harness.shutdown().unwrap();
    }

    #[test]
    fn test_help() {
        assert_eq!(parse_args(&args(&["--help"])), Ok(None));
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            parse_args(&args(&["--capacity"])),
            Err(ConfigError::MissingValue("--capacity".into()))
        );
        assert_eq!(
            parse_args(&args(&["--items", "ten"])),
            Err(ConfigError::InvalidValue {
                flag: "--items".into(),
                value: "ten".into()
            })
        );
        assert_eq!(
            parse_args(&args(&["--capacity", "0"])),
            Err(ConfigError::ZeroCapacity)
        );
        assert_eq!(
            parse_args(&args(&["-p", "2", "-n", "9223372036854775808"])),
            Err(ConfigError::TooManyItems {
                producers: 2,
                per_producer: 9_223_372_036_854_775_808
            })
        );
        assert_eq!(
            parse_args(&args(&["--verbose"])),
            Err(ConfigError::UnknownArgument("--verbose".into()))
        );
    }
}
