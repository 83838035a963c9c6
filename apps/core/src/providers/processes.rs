use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tracing::info;

use super::{contains_folded, run_command};
use crate::model::{Action, Candidate, ProviderId};
use crate::registry::{Latency, Provider, ProviderError, QueryContext};

const PS_TIMEOUT: Duration = Duration::from_secs(2);
const MAX_ROWS: usize = 50;
const COMMAND_CHARS: usize = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub user: String,
    pub pid: i32,
    pub cpu: String,
    pub mem: String,
    pub command: String,
    pub name: String,
}

impl ProcessInfo {
    fn title(&self) -> String {
        format!("{} ({}% CPU, {}% MEM)", self.name, self.cpu, self.mem)
    }

    fn description(&self) -> String {
        let command: String = self.command.chars().take(COMMAND_CHARS).collect();
        format!("PID: {} | User: {} | Command: {command}", self.pid, self.user)
    }
}

/// Running processes, busiest first. Selecting one sends SIGTERM.
pub struct ProcessManager;

impl Provider for ProcessManager {
    fn id(&self) -> ProviderId {
        ProviderId::Processes
    }

    fn search(&self, query: &QueryContext) -> Result<Vec<Candidate>, ProviderError> {
        let output = run_command("ps", &["aux", "--sort=-%cpu"], PS_TIMEOUT, Some(&query.cancel))?;
        if !output.status.success() {
            return Err(ProviderError::new(format!("ps exited with {}", output.status)));
        }
        let listing = String::from_utf8_lossy(&output.stdout);
        Ok(filter_processes(parse_ps(&listing), query.residual.trim())
            .into_iter()
            .map(|(process, _)| {
                Candidate::new(
                    format!("process:{}", process.pid),
                    process.title(),
                    Action::Custom {
                        provider: ProviderId::Processes,
                        payload: process.pid.to_string(),
                    },
                )
                .with_subtitle(process.description())
                .with_icon("utilities-system-monitor")
                .pinned()
            })
            .collect())
    }

    fn latency(&self) -> Latency {
        Latency::Blocking
    }

    fn execute(&self, payload: &str) -> Result<(), ProviderError> {
        let pid: i32 = payload
            .parse()
            .ok()
            .filter(|pid| *pid > 1)
            .ok_or_else(|| ProviderError::new(format!("refusing to signal pid '{payload}'")))?;
        kill(Pid::from_raw(pid), Signal::SIGTERM)
            .map_err(|errno| ProviderError::new(format!("kill {pid}: {errno}")))?;
        info!(pid, "sent SIGTERM");
        Ok(())
    }
}

/// Parses `ps aux` output, skipping the header and malformed lines.
pub fn parse_ps(listing: &str) -> Vec<ProcessInfo> {
    listing
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let user = fields.next()?.to_string();
            let pid = fields.next()?.parse().ok()?;
            let cpu = fields.next()?.to_string();
            let mem = fields.next()?.to_string();
            // VSZ RSS TTY STAT START TIME
            let mut rest = fields.skip(6).peekable();
            rest.peek()?;
            let command = rest.collect::<Vec<_>>().join(" ");
            let name = command
                .split_whitespace()
                .next()
                .and_then(|program| program.rsplit('/').next())
                .unwrap_or("unknown")
                .to_string();
            Some(ProcessInfo {
                user,
                pid,
                cpu,
                mem,
                command,
                name,
            })
        })
        .collect()
}

/// Substring over name and description, or an exact pid. An exact pid hit
/// is flagged and moved to the front; the rest keep `ps` order.
pub fn filter_processes(processes: Vec<ProcessInfo>, query: &str) -> Vec<(ProcessInfo, bool)> {
    let needle = query.to_lowercase();
    let mut matches: Vec<(ProcessInfo, bool)> = processes
        .into_iter()
        .filter_map(|process| {
            let exact = !needle.is_empty() && process.pid.to_string() == needle;
            let matched = exact
                || contains_folded(&process.name, &needle)
                || contains_folded(&process.description(), &needle);
            matched.then_some((process, exact))
        })
        .collect();
    matches.sort_by_key(|(_, exact)| !exact);
    matches.truncate(MAX_ROWS);
    matches
}

#[cfg(test)]
mod tests {
    use super::{filter_processes, parse_ps};

    const LISTING: &str = "\
USER         PID %CPU %MEM    VSZ   RSS TTY      STAT START   TIME COMMAND
alice       4242 12.5  3.1 123456 65432 ?        Sl   09:00   1:23 /usr/lib/firefox/firefox -contentproc
root           1  0.0  0.1  16868 12000 ?        Ss   08:00   0:02 /sbin/init splash
alice        777  0.3  0.2   9000  4000 pts/0    S+   09:30   0:00 vim notes.md
broken line
";

    #[test]
    fn parses_ps_aux() {
        let processes = parse_ps(LISTING);
        assert_eq!(processes.len(), 3);
        assert_eq!(processes[0].name, "firefox");
        assert_eq!(processes[0].pid, 4242);
        assert_eq!(processes[0].command, "/usr/lib/firefox/firefox -contentproc");
        assert_eq!(processes[0].title(), "firefox (12.5% CPU, 3.1% MEM)");
    }

    #[test]
    fn filters_by_name_and_exact_pid() {
        let by_name = filter_processes(parse_ps(LISTING), "VIM");
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].0.pid, 777);
        assert!(!by_name[0].1);

        let by_pid = filter_processes(parse_ps(LISTING), "4242");
        assert_eq!(by_pid.len(), 1);
        assert!(by_pid[0].1);

        assert_eq!(filter_processes(parse_ps(LISTING), "").len(), 3);
    }
}
