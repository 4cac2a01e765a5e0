//! §5 auto-restart: a background task that polls process uptime against a
//! configured threshold and, on crossing it, re-execs the process with its
//! original arguments. A long-lived gateway connection accumulates state
//! (cache growth, any slow leak) that a periodic clean restart bounds,
//! rather than chasing down every possible source of drift.

use std::time::{Duration, Instant};

use chorus_core::config::WatchdogConfig;
use tracing::{info, warn};

pub fn spawn(config: WatchdogConfig) {
    if !config.enabled {
        return;
    }

    tokio::spawn(async move {
        let started_at = Instant::now();
        let max_uptime = Duration::from_secs(config.max_uptime_hours.max(1) * 3600);
        let check_interval = Duration::from_secs(config.check_interval_minutes.max(1) * 60);

        loop {
            tokio::time::sleep(check_interval).await;
            if started_at.elapsed() >= max_uptime {
                info!(uptime_hours = config.max_uptime_hours, "uptime threshold reached, restarting");
                restart();
            }
        }
    });
}

/// Re-exec the current binary with the original argv. On Unix this replaces
/// the process image in place, so the gateway connection drops cleanly and
/// the new process re-establishes it from scratch. If re-exec itself fails
/// (missing executable permission, exotic sandboxing), fall through to a
/// plain process exit — an external supervisor (systemd, docker restart
/// policy) is expected to bring the process back up in that case.
fn restart() {
    let exe = match std::env::current_exe() {
        Ok(path) => path,
        Err(e) => {
            warn!(error = %e, "could not resolve current executable, exiting instead of re-exec");
            std::process::exit(0);
        }
    };
    let args: Vec<String> = std::env::args().skip(1).collect();

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        let err = std::process::Command::new(&exe).args(&args).exec();
        warn!(error = %err, "re-exec failed, exiting instead");
        std::process::exit(1);
    }

    #[cfg(not(unix))]
    {
        match std::process::Command::new(&exe).args(&args).spawn() {
            Ok(_) => std::process::exit(0),
            Err(e) => {
                warn!(error = %e, "spawning replacement process failed, exiting instead");
                std::process::exit(1);
            }
        }
    }
}
