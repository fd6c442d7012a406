use std::path::PathBuf;

/// Stable identity this device reports to HQ.
pub trait DeviceIdentity: Send + Sync {
    /// MAC of the wireless interface, or an explicit override.
    fn mac_address(&self) -> Option<String>;

    fn hostname(&self) -> String;

    /// Version of the on-device driving software, when known.
    fn software_version(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct SystemIdentity {
    sysfs_net: PathBuf,
    wlan: String,
    device_id_override: Option<String>,
    software_version: Option<String>,
}

impl SystemIdentity {
    pub fn new(wlan: impl Into<String>, device_id_override: Option<String>) -> Self {
        Self {
            sysfs_net: PathBuf::from("/sys/class/net"),
            wlan: wlan.into(),
            device_id_override,
            software_version: std::env::var("DONKEYCAR_VERSION")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
        }
    }

    #[cfg(test)]
    fn with_sysfs_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.sysfs_net = root.into();
        self
    }
}

fn normalize_mac(raw: &str) -> Option<String> {
    let mac = raw.trim().to_ascii_lowercase();
    let octets: Vec<&str> = mac.split(':').collect();
    let valid = octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()));
    if !valid || mac == "00:00:00:00:00:00" {
        return None;
    }
    Some(mac)
}

#[cfg(unix)]
fn system_hostname() -> Option<String> {
    let mut buf = [0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return None;
    }
    let end = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
    let name = String::from_utf8_lossy(&buf[..end]).trim().to_string();
    (!name.is_empty()).then_some(name)
}

#[cfg(not(unix))]
fn system_hostname() -> Option<String> {
    std::env::var("COMPUTERNAME").ok()
}

impl DeviceIdentity for SystemIdentity {
    fn mac_address(&self) -> Option<String> {
        if let Some(id) = &self.device_id_override {
            return Some(id.clone());
        }
        let path = self.sysfs_net.join(&self.wlan).join("address");
        match std::fs::read_to_string(&path) {
            Ok(raw) => normalize_mac(&raw),
            Err(err) => {
                tracing::debug!(%err, path = %path.display(), "no MAC address for interface");
                None
            }
        }
    }

    fn hostname(&self) -> String {
        system_hostname().unwrap_or_else(|| "unknown".to_string())
    }

    fn software_version(&self) -> Option<String> {
        self.software_version.clone()
    }
}
