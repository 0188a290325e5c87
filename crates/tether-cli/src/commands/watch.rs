//! Watch command: stream one subscription to the terminal

use std::path::PathBuf;

use anyhow::{Context, Result};

use tether_client::{CommandClient, LocalTransport};
use tether_core::config::ClientConfig;
use tether_core::SubscriptionKind;

use crate::output::{format_groups, format_status, print_info, print_success};

/// Options for the watch command
#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub kind: SubscriptionKind,
    pub working_dir: Option<PathBuf>,
    pub log_max_lines: Option<usize>,
    pub json: bool,
}

/// Apply command-line overrides to the loaded configuration
pub fn apply_overrides(mut config: ClientConfig, options: &WatchOptions) -> ClientConfig {
    if let Some(dir) = &options.working_dir {
        config.working_directory = dir.clone();
    }
    if let Some(max) = options.log_max_lines {
        config.log_max_lines = max;
    }
    config
}

/// Connect and print every change until interrupted, the client gives up, or
/// the service closes the subscription
pub async fn watch_command(config: ClientConfig, options: WatchOptions) -> Result<()> {
    let config = apply_overrides(config, &options);
    let working_directory = config.working_directory.clone();
    let retry = config.retry.clone();

    let transport = LocalTransport::from_config(&config);
    let client = CommandClient::new(options.kind, transport, config)
        .context("Failed to create command client")?;

    let mut connected = client.watch_connected();
    let mut status = client.watch_status();
    let mut groups = client.watch_groups();
    let mut log = client.watch_log();
    let mut failure = client.watch_last_failure();

    if !options.json {
        print_info(&format!(
            "Connecting to {} stream at {:?} ({} attempts over {:?})...",
            options.kind,
            working_directory,
            retry.max_attempts,
            retry.total_delay()
        ));
    }
    client.connect();

    let mut printed_log = 0u64;

    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::debug!("Interrupted, disconnecting");
                break Ok(());
            }

            Ok(()) = connected.changed() => {
                let is_connected = *connected.borrow_and_update();
                if !is_connected {
                    break Err(anyhow::anyhow!(
                        "Service closed the {} subscription",
                        options.kind
                    ));
                }
                if !options.json {
                    print_success(&format!("Subscribed to {}", options.kind));
                }
            }

            Ok(()) = status.changed() => {
                let snapshot = status.borrow_and_update().clone();
                if let Some(snapshot) = snapshot {
                    println!("{}", format_status(&snapshot, options.json));
                    if !options.json {
                        println!();
                    }
                }
            }

            Ok(()) = groups.changed() => {
                let list = groups.borrow_and_update().clone();
                if let Some(list) = list {
                    println!("{}", format_groups(&list, options.json));
                    if !options.json {
                        println!();
                    }
                }
            }

            Ok(()) = log.changed() => {
                let unseen: Vec<String> = {
                    let buffer = log.borrow_and_update();
                    let unseen = buffer.since(printed_log).cloned().collect();
                    printed_log = buffer.appended();
                    unseen
                };
                for line in unseen {
                    println!("{}", line);
                }
            }

            Ok(()) = failure.changed() => {
                let last = failure.borrow_and_update().clone();
                if let Some(last) = last {
                    break Err(anyhow::anyhow!("Could not reach the service: {}", last));
                }
            }
        }
    };

    client.disconnect();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_replace_config_values() {
        let options = WatchOptions {
            kind: SubscriptionKind::Log,
            working_dir: Some(PathBuf::from("/run/service")),
            log_max_lines: Some(50),
            json: false,
        };

        let config = apply_overrides(ClientConfig::default(), &options);
        assert_eq!(config.working_directory, PathBuf::from("/run/service"));
        assert_eq!(config.log_max_lines, 50);
    }

    #[test]
    fn test_no_overrides_keeps_config() {
        let options = WatchOptions {
            kind: SubscriptionKind::Status,
            working_dir: None,
            log_max_lines: None,
            json: true,
        };

        let base = ClientConfig::default();
        let config = apply_overrides(base.clone(), &options);
        assert_eq!(config.working_directory, base.working_directory);
        assert_eq!(config.log_max_lines, 300);
    }
}
