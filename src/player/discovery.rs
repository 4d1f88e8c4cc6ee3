// ABOUTME: DNS-SD advertisement of the player endpoint
// ABOUTME: Registers _sendspin._tcp with the WebSocket path in TXT

use crate::error::Error;
use crate::player::config::PlayerConfig;
use mdns_sd::{ServiceDaemon, ServiceInfo};

/// DNS-SD service type controllers browse for
pub const SERVICE_TYPE: &str = "_sendspin._tcp.local.";

/// Running mDNS advertisement for this player.
///
/// Controllers discover the player through this record and connect to the
/// advertised port; the WebSocket path travels in the TXT record.
pub struct Advertiser {
    daemon: ServiceDaemon,
    fullname: String,
}

impl Advertiser {
    /// Register the player's service record.
    pub fn advertise(config: &PlayerConfig) -> crate::Result<Self> {
        let daemon = ServiceDaemon::new().map_err(|e| Error::Discovery(e.to_string()))?;

        let hostname = format!("{}.local.", hostname_label(&config.name));
        let properties = [("path", config.ws_path.as_str())];
        let info = ServiceInfo::new(
            SERVICE_TYPE,
            &config.name,
            &hostname,
            "",
            config.bind_addr.port(),
            &properties[..],
        )
        .map_err(|e| Error::Discovery(e.to_string()))?
        .enable_addr_auto();

        let fullname = info.get_fullname().to_string();
        daemon
            .register(info)
            .map_err(|e| Error::Discovery(e.to_string()))?;

        log::info!(
            "mDNS: advertising {} on port {}",
            fullname,
            config.bind_addr.port()
        );

        Ok(Self { daemon, fullname })
    }

    /// Withdraw the record and stop the daemon.
    pub fn shutdown(self) {
        let _ = self.daemon.unregister(&self.fullname);
        let _ = self.daemon.shutdown();
    }
}

/// Reduce a display name to a usable mDNS host label.
fn hostname_label(name: &str) -> String {
    let label: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = label.trim_matches('-');
    if trimmed.is_empty() {
        "sendspin-player".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hostname_label() {
        assert_eq!(hostname_label("Living Room"), "living-room");
        assert_eq!(hostname_label("Sendspin Rust Player"), "sendspin-rust-player");
        assert_eq!(hostname_label("---"), "sendspin-player");
        assert_eq!(hostname_label("Kök"), "k-k");
    }
}
