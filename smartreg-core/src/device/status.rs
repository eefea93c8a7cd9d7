//! Parsers for the text a device prints back during registration.

const STATUS_MARKER: &str = "Status:";
const FAILURE_REASON_MARKER: &str = "Failure reason:";
const REGISTERED: &str = "REGISTERED";
const CONVERSION_NOT_STARTED: &str = "Not started";

/// Why a status report was shorter than expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseAnomaly {
    /// No `Status:` lines at all.
    Empty,
    /// Only the header line was present.
    HeaderOnly,
}

/// Licensing state read from `show license status`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LicenseStatus {
    /// Registration status reads `REGISTERED`.
    pub registered: bool,
    /// A conversion status line is present.
    pub dlc_supported: bool,
    /// Conversion status is anything but `Not started`.
    pub dlc_started: bool,
    /// Set when the report was too short to read fully.
    pub anomaly: Option<ParseAnomaly>,
}

impl LicenseStatus {
    /// Parses the status report.
    ///
    /// Every line carrying `Status:` contributes the text after the marker.
    /// The first of those belongs to the smart licensing header and is
    /// skipped. The next one is the registration state, and a third one,
    /// when present, is the data-learning/conversion state.
    pub fn parse(text: &str) -> Self {
        let values: Vec<&str> = text
            .lines()
            .filter_map(|line| {
                line.find(STATUS_MARKER)
                    .map(|idx| line[idx + STATUS_MARKER.len()..].trim())
            })
            .collect();

        let Some((_header, relevant)) = values.split_first() else {
            return Self {
                anomaly: Some(ParseAnomaly::Empty),
                ..Self::default()
            };
        };

        let Some(registration) = relevant.first() else {
            return Self {
                anomaly: Some(ParseAnomaly::HeaderOnly),
                ..Self::default()
            };
        };

        let mut status = Self {
            registered: *registration == REGISTERED,
            ..Self::default()
        };

        if let Some(conversion) = relevant.get(2) {
            status.dlc_supported = true;
            status.dlc_started = *conversion != CONVERSION_NOT_STARTED;
        }

        status
    }
}

/// Text following `Failure reason:` in a status report, if any.
pub fn failure_reason(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .filter_map(|line| line.strip_prefix(FAILURE_REASON_MARKER))
        .map(str::trim)
        .rfind(|reason| !reason.is_empty())
        .map(str::to_string)
}

/// A ping succeeded when at least one echo reply (`!`) came back.
pub fn ping_succeeded(output: &str) -> bool {
    output.contains('!')
}

/// One row of `show ip interface brief`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceEntry {
    /// Interface name as listed, e.g. `GigabitEthernet0/1`.
    pub name: String,
    /// IP address, or `unassigned`.
    pub address: String,
    /// Line protocol column reads `up`.
    pub protocol_up: bool,
}

impl InterfaceEntry {
    /// Usable as a ping source: has an address and line protocol is up.
    pub fn is_active(&self) -> bool {
        self.protocol_up && self.address != "unassigned"
    }
}

/// Parses `show ip interface brief`, skipping the column header.
///
/// Rows keep device order. The status column may span two words
/// (`administratively down`), so the protocol is read from the last column.
pub fn parse_interface_brief(text: &str) -> Vec<InterfaceEntry> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .skip_while(|line| !line.starts_with("Interface"))
        .skip(1)
        .filter_map(|line| {
            let columns: Vec<&str> = line.split_whitespace().collect();
            if columns.len() < 3 {
                return None;
            }
            let protocol = columns[columns.len() - 1];
            Some(InterfaceEntry {
                name: columns[0].to_string(),
                address: columns[1].to_string(),
                protocol_up: protocol.eq_ignore_ascii_case("up"),
            })
        })
        .collect()
}

/// Hostname from a CLI prompt such as `edge-rtr-01#`.
pub fn hostname_from_prompt(prompt: &str) -> String {
    prompt
        .trim()
        .trim_end_matches(['#', '>'])
        .trim()
        .to_string()
}
