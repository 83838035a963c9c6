use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{contains_folded, run_command};
use crate::clipboard::backend::command_exists;
use crate::model::{Action, Candidate, ProviderId};
use crate::registry::{CancelToken, Latency, Provider, ProviderError, QueryContext};

const SCAN_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
const QUICK_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiNetwork {
    pub ssid: String,
    pub signal: u8,
    pub security: String,
    pub bars: String,
    pub in_use: bool,
}

impl WifiNetwork {
    fn description(&self) -> String {
        let security = if self.security.is_empty() || self.security == "--" {
            "Open"
        } else {
            &self.security
        };
        let mut description = format!("{}% {} · {security}", self.signal, self.bars)
            .replace("  ", " ");
        if self.in_use {
            description.push_str(" · Connected");
        }
        description
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionDetails {
    pub interface: String,
    pub ip: Option<String>,
    pub gateway: Option<String>,
}

/// What a network row does when selected. Carried as the JSON payload of
/// a custom action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum NetworkCommand {
    Connect {
        ssid: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        password: Option<String>,
    },
    Disconnect,
    Radio {
        enabled: bool,
    },
}

impl NetworkCommand {
    fn payload(&self) -> Result<String, ProviderError> {
        serde_json::to_string(self).map_err(|e| ProviderError::new(format!("encode payload: {e}")))
    }

    pub fn parse(payload: &str) -> Result<Self, ProviderError> {
        serde_json::from_str(payload)
            .map_err(|e| ProviderError::new(format!("bad network payload '{payload}': {e}")))
    }
}

/// How the residual reads: a radio toggle, a disconnect, or an SSID filter
/// with an optional `password <secret>` tail like `nmcli` takes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkQuery {
    Overview,
    Radio(bool),
    Disconnect,
    Filter {
        ssid: String,
        password: Option<String>,
    },
}

impl NetworkQuery {
    pub fn parse(residual: &str) -> Self {
        let residual = residual.trim();
        match residual {
            "" => return Self::Overview,
            "on" => return Self::Radio(true),
            "off" => return Self::Radio(false),
            "disconnect" => return Self::Disconnect,
            _ => {}
        }
        match residual.split_once(" password ") {
            Some((ssid, password)) if !password.trim().is_empty() => Self::Filter {
                ssid: ssid.trim().to_string(),
                password: Some(password.trim().to_string()),
            },
            _ => Self::Filter {
                ssid: residual.to_string(),
                password: None,
            },
        }
    }
}

/// Wi-Fi through NetworkManager's `nmcli`: scan, connect, disconnect,
/// radio toggle and the current connection's address.
pub struct NetworkManager;

impl Provider for NetworkManager {
    fn id(&self) -> ProviderId {
        ProviderId::Network
    }

    fn search(&self, query: &QueryContext) -> Result<Vec<Candidate>, ProviderError> {
        if !command_exists("nmcli") {
            return Ok(vec![Candidate::info(
                "network:missing",
                "NetworkManager not found",
                "Install NetworkManager to manage Wi-Fi from here",
            )]);
        }

        let parsed = NetworkQuery::parse(&query.residual);
        match parsed {
            NetworkQuery::Radio(enabled) => Ok(vec![radio_row(enabled)?]),
            NetworkQuery::Disconnect => Ok(vec![disconnect_row()?]),
            NetworkQuery::Overview => {
                let mut rows = Vec::new();
                if let Some(details) = connection_details(&query.cancel)? {
                    rows.push(details_row(&details));
                    rows.push(disconnect_row()?);
                }
                rows.extend(network_rows(scan(&query.cancel)?, "", None)?);
                rows.push(radio_row(false)?);
                Ok(rows)
            }
            NetworkQuery::Filter { ssid, password } => {
                network_rows(scan(&query.cancel)?, &ssid, password.as_deref())
            }
        }
    }

    fn latency(&self) -> Latency {
        Latency::Blocking
    }

    fn execute(&self, payload: &str) -> Result<(), ProviderError> {
        match NetworkCommand::parse(payload)? {
            NetworkCommand::Connect { ssid, password } => {
                let mut args = vec!["device", "wifi", "connect", ssid.as_str()];
                if let Some(password) = password.as_deref() {
                    args.extend(["password", password]);
                }
                nmcli(&args, CONNECT_TIMEOUT)?;
                info!(ssid = %ssid, "connected to wifi");
            }
            NetworkCommand::Disconnect => {
                let output = nmcli(&["-t", "-f", "DEVICE,TYPE,STATE", "device"], QUICK_TIMEOUT)?;
                let interface = parse_devices(&output)
                    .into_iter()
                    .find(|device| device.kind == "wifi")
                    .map(|device| device.name)
                    .ok_or_else(|| ProviderError::new("no wifi interface found"))?;
                nmcli(&["device", "disconnect", interface.as_str()], CONNECT_TIMEOUT)?;
                info!(interface = %interface, "wifi disconnected");
            }
            NetworkCommand::Radio { enabled } => {
                let state = if enabled { "on" } else { "off" };
                nmcli(&["radio", "wifi", state], QUICK_TIMEOUT)?;
                info!(state, "wifi radio toggled");
            }
        }
        Ok(())
    }
}

fn nmcli(args: &[&str], timeout: Duration) -> Result<String, ProviderError> {
    let output = run_command("nmcli", args, timeout, None)?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let message = if stderr.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            stderr.trim().to_string()
        };
        return Err(ProviderError::new(format!("nmcli: {message}")));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn scan(cancel: &CancelToken) -> Result<Vec<WifiNetwork>, ProviderError> {
    let output = run_command(
        "nmcli",
        &["-t", "-f", "IN-USE,SSID,SIGNAL,SECURITY,BARS", "device", "wifi", "list"],
        SCAN_TIMEOUT,
        Some(cancel),
    )?;
    if !output.status.success() {
        return Err(ProviderError::new(format!(
            "nmcli wifi list exited with {}",
            output.status
        )));
    }
    Ok(parse_wifi_list(&String::from_utf8_lossy(&output.stdout)))
}

fn connection_details(cancel: &CancelToken) -> Result<Option<ConnectionDetails>, ProviderError> {
    let devices = run_command(
        "nmcli",
        &["-t", "-f", "DEVICE,TYPE,STATE", "device"],
        QUICK_TIMEOUT,
        Some(cancel),
    )?;
    let Some(interface) = parse_devices(&String::from_utf8_lossy(&devices.stdout))
        .into_iter()
        .find(|device| device.kind == "wifi" && device.state == "connected")
        .map(|device| device.name)
    else {
        return Ok(None);
    };

    // `ip` is optional; without it the row still names the interface.
    let ip = run_command("ip", &["-4", "addr", "show", interface.as_str()], QUICK_TIMEOUT, Some(cancel))
        .ok()
        .and_then(|out| parse_ipv4(&String::from_utf8_lossy(&out.stdout)));
    let gateway = run_command("ip", &["route", "show", "dev", interface.as_str()], QUICK_TIMEOUT, Some(cancel))
        .ok()
        .and_then(|out| parse_gateway(&String::from_utf8_lossy(&out.stdout)));
    Ok(Some(ConnectionDetails {
        interface,
        ip,
        gateway,
    }))
}

/// Splits one `nmcli -t` line on unescaped colons. `\:` and `\\` are the
/// only escapes nmcli emits.
pub fn split_terse(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => current.extend(chars.next()),
            ':' => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// Strongest first with the connected network on top. Hidden networks and
/// repeated SSIDs (one per access point) are dropped.
pub fn parse_wifi_list(listing: &str) -> Vec<WifiNetwork> {
    let mut networks: Vec<WifiNetwork> = listing
        .lines()
        .filter_map(|line| {
            let fields = split_terse(line);
            if fields.len() < 4 || fields[1].is_empty() {
                return None;
            }
            Some(WifiNetwork {
                in_use: fields[0] == "*",
                ssid: fields[1].clone(),
                signal: fields[2].trim().parse().unwrap_or(0),
                security: fields[3].trim().to_string(),
                bars: fields.get(4).map(|b| b.trim().to_string()).unwrap_or_default(),
            })
        })
        .collect();
    networks.sort_by(|a, b| b.in_use.cmp(&a.in_use).then(b.signal.cmp(&a.signal)));

    let mut seen = HashSet::new();
    networks.retain(|network| seen.insert(network.ssid.clone()));
    networks
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub name: String,
    pub kind: String,
    pub state: String,
}

pub fn parse_devices(listing: &str) -> Vec<Device> {
    listing
        .lines()
        .filter_map(|line| {
            let mut fields = split_terse(line).into_iter();
            Some(Device {
                name: fields.next().filter(|name| !name.is_empty())?,
                kind: fields.next()?,
                state: fields.next().unwrap_or_default(),
            })
        })
        .collect()
}

/// First `inet` address from `ip -4 addr show`, with its prefix length.
pub fn parse_ipv4(listing: &str) -> Option<String> {
    listing.lines().find_map(|line| {
        let mut words = line.split_whitespace();
        if words.next()? != "inet" {
            return None;
        }
        words.next().map(str::to_string)
    })
}

pub fn parse_gateway(listing: &str) -> Option<String> {
    listing.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("default via ")?;
        rest.split_whitespace().next().map(str::to_string)
    })
}

pub fn network_rows(
    networks: Vec<WifiNetwork>,
    ssid_filter: &str,
    password: Option<&str>,
) -> Result<Vec<Candidate>, ProviderError> {
    let needle = ssid_filter.to_lowercase();
    networks
        .into_iter()
        .filter(|network| contains_folded(&network.ssid, &needle))
        .map(|network| {
            let command = NetworkCommand::Connect {
                ssid: network.ssid.clone(),
                password: password.map(str::to_string),
            };
            let subtitle = if password.is_some() {
                format!("{} · connect with password", network.description())
            } else {
                network.description()
            };
            Ok(Candidate::new(
                format!("network:{}", network.ssid),
                network.ssid.clone(),
                Action::Custom {
                    provider: ProviderId::Network,
                    payload: command.payload()?,
                },
            )
            .with_subtitle(subtitle)
            .with_icon(if network.in_use {
                "network-wireless-connected"
            } else {
                "network-wireless"
            })
            .pinned())
        })
        .collect()
}

fn details_row(details: &ConnectionDetails) -> Candidate {
    let ip = details.ip.as_deref().unwrap_or("N/A");
    let gateway = details.gateway.as_deref().unwrap_or("N/A");
    let address = ip.split('/').next().unwrap_or(ip).to_string();
    let action = if details.ip.is_some() {
        Action::CopyText { text: address }
    } else {
        Action::None
    };
    Candidate::new(
        "network:details",
        format!("Connected on {}", details.interface),
        action,
    )
    .with_subtitle(format!("IP {ip} · Gateway {gateway}"))
    .with_icon("network-wireless-connected")
    .pinned()
}

fn disconnect_row() -> Result<Candidate, ProviderError> {
    Ok(Candidate::new(
        "network:disconnect",
        "Disconnect Wi-Fi",
        Action::Custom {
            provider: ProviderId::Network,
            payload: NetworkCommand::Disconnect.payload()?,
        },
    )
    .with_icon("network-wireless-disconnected")
    .pinned())
}

fn radio_row(enabled: bool) -> Result<Candidate, ProviderError> {
    let (id, title) = if enabled {
        ("network:radio-on", "Turn Wi-Fi on")
    } else {
        ("network:radio-off", "Turn Wi-Fi off")
    };
    Ok(Candidate::new(
        id,
        title,
        Action::Custom {
            provider: ProviderId::Network,
            payload: NetworkCommand::Radio { enabled }.payload()?,
        },
    )
    .with_icon("network-wireless")
    .pinned())
}

#[cfg(test)]
mod tests {
    use super::{
        details_row, network_rows, parse_devices, parse_gateway, parse_ipv4, parse_wifi_list,
        split_terse, ConnectionDetails, NetworkCommand, NetworkQuery,
    };
    use crate::model::{Action, ProviderId};

    const WIFI_LIST: &str = "\
 :Cafe\\: Guest:54:WPA2:▂▄__
*:HomeNet:82:WPA2 WPA3:▂▄▆_
 :HomeNet:40:WPA2 WPA3:▂▄__
 ::70:WPA2:▂▄▆_
 :Library:61::▂▄▆_
";

    #[test]
    fn splits_escaped_terse_fields() {
        assert_eq!(split_terse("a\\:b:c\\\\d:"), vec!["a:b", "c\\d", ""]);
    }

    #[test]
    fn parses_scan_with_connected_first_and_duplicates_dropped() {
        let networks = parse_wifi_list(WIFI_LIST);
        let ssids: Vec<&str> = networks.iter().map(|n| n.ssid.as_str()).collect();
        assert_eq!(ssids, vec!["HomeNet", "Library", "Cafe: Guest"]);
        assert!(networks[0].in_use);
        assert_eq!(networks[0].signal, 82);
        assert_eq!(networks[1].description(), "61% ▂▄▆_ · Open");
    }

    #[test]
    fn reads_devices_and_addresses() {
        let devices = parse_devices("wlp3s0:wifi:connected\nlo:loopback:connected (externally)\n");
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].name, "wlp3s0");
        assert_eq!(devices[0].kind, "wifi");

        let addr = "3: wlp3s0: <BROADCAST,MULTICAST,UP> mtu 1500\n    inet 192.168.1.10/24 brd 192.168.1.255 scope global dynamic wlp3s0\n";
        assert_eq!(parse_ipv4(addr).as_deref(), Some("192.168.1.10/24"));
        let routes = "default via 192.168.1.1 proto dhcp metric 600\n192.168.1.0/24 proto kernel scope link\n";
        assert_eq!(parse_gateway(routes).as_deref(), Some("192.168.1.1"));
        assert_eq!(parse_gateway("10.0.0.0/8 scope link\n"), None);
    }

    #[test]
    fn query_grammar() {
        assert_eq!(NetworkQuery::parse("  "), NetworkQuery::Overview);
        assert_eq!(NetworkQuery::parse("off"), NetworkQuery::Radio(false));
        assert_eq!(NetworkQuery::parse("disconnect"), NetworkQuery::Disconnect);
        assert_eq!(
            NetworkQuery::parse("home password s3cret pass"),
            NetworkQuery::Filter {
                ssid: "home".to_string(),
                password: Some("s3cret pass".to_string()),
            }
        );
        assert_eq!(
            NetworkQuery::parse("cafe"),
            NetworkQuery::Filter {
                ssid: "cafe".to_string(),
                password: None,
            }
        );
    }

    #[test]
    fn rows_connect_to_the_selected_ssid() {
        let rows = network_rows(parse_wifi_list(WIFI_LIST), "cafe", Some("pw")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "Cafe: Guest");
        assert!(rows[0].always_show);
        let Action::Custom { provider, payload } = &rows[0].action else {
            panic!("expected custom action, got {:?}", rows[0].action);
        };
        assert_eq!(provider, &ProviderId::Network);
        assert_eq!(
            NetworkCommand::parse(payload).unwrap(),
            NetworkCommand::Connect {
                ssid: "Cafe: Guest".to_string(),
                password: Some("pw".to_string()),
            }
        );
    }

    #[test]
    fn details_row_copies_the_bare_address() {
        let row = details_row(&ConnectionDetails {
            interface: "wlp3s0".to_string(),
            ip: Some("192.168.1.10/24".to_string()),
            gateway: None,
        });
        assert_eq!(row.title, "Connected on wlp3s0");
        assert_eq!(row.subtitle, "IP 192.168.1.10/24 · Gateway N/A");
        assert_eq!(
            row.action,
            Action::CopyText {
                text: "192.168.1.10".to_string()
            }
        );
    }

    #[test]
    fn rejects_unknown_payloads() {
        assert!(NetworkCommand::parse("{\"op\":\"reboot\"}").is_err());
        assert_eq!(
            NetworkCommand::parse("{\"op\":\"radio\",\"enabled\":true}").unwrap(),
            NetworkCommand::Radio { enabled: true }
        );
    }
}
