//! Cisco IOS command set used by the registration workflow.

pub const SHOW_LICENSE_STATUS: &str = "show license status";
pub const SHOW_RUNNING_CONFIG: &str = "show running-config";
pub const SHOW_IP_INTERFACE_BRIEF: &str = "show ip interface brief";
pub const CONVERSION_START: &str = "license smart conversion start";

pub fn register(token: &str) -> String {
    format!("license smart register idtoken {token}")
}

pub fn ping(target: &str) -> String {
    format!("ping {target}")
}

pub fn ping_from(target: &str, interface: &str) -> String {
    format!("ping {target} source {interface}")
}

pub fn http_client_source_interface(interface: &str) -> String {
    format!("ip http client source-interface {interface}")
}
