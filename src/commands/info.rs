//! Backend detection report

use anyhow::Result;
use serde::Serialize;
use std::fmt::Display;

use iptctl::iptables::{Capabilities, IpTables, Mode, Protocol};

use crate::output::{print_output, LineStatus, StatusLine, StatusReport};

/// What detection found out about the backend
#[derive(Debug, Serialize)]
pub struct BackendInfo {
    pub protocol: Protocol,
    pub path: String,
    pub version: String,
    pub mode: Mode,
    pub capabilities: Capabilities,
    pub lock_timeout: u32,
}

impl BackendInfo {
    fn from_handle(ipt: &IpTables) -> Self {
        let v = ipt.version();
        BackendInfo {
            protocol: ipt.protocol(),
            path: ipt.path().display().to_string(),
            version: format!("{}.{}.{}", v.major, v.minor, v.patch),
            mode: ipt.mode().clone(),
            capabilities: ipt.capabilities(),
            lock_timeout: ipt.timeout(),
        }
    }

    fn report(&self) -> StatusReport {
        let flag = |key: &str, on: bool| StatusLine {
            key: key.to_string(),
            value: if on { "yes" } else { "no" }.to_string(),
            status: Some(if on { LineStatus::Ok } else { LineStatus::Warning }),
        };
        let plain = |key: &str, value: String| StatusLine {
            key: key.to_string(),
            value,
            status: None,
        };
        let caps = &self.capabilities;
        let lock = match self.lock_timeout {
            0 => "indefinite".to_string(),
            n => format!("{}s", n),
        };

        StatusReport {
            lines: vec![
                plain("Protocol", self.protocol.to_string()),
                plain("Path", self.path.clone()),
                plain("Version", self.version.clone()),
                plain("Mode", self.mode.to_string()),
                flag("Check (-C)", caps.check),
                flag("Wait (--wait)", caps.wait),
                flag("Wait seconds", caps.wait_seconds),
                flag("Random fully", caps.random_fully),
                plain("Lock wait", lock),
            ],
        }
    }
}

impl Display for BackendInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.report())
    }
}

/// Run `iptctl info`
pub fn info(ipt: &IpTables, json: bool) -> Result<()> {
    print_output(&BackendInfo::from_handle(ipt), json);
    Ok(())
}
