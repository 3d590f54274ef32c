//! ADMS text protocol: request parsing and reply rendering.
//!
//! Every device request is keyed by the `SN` query parameter. Bodies are plain
//! text with loose framing, so parsing falls back rather than fails:
//!
//! - Punch lines are tab separated. When a line has no tab, it is split on
//!   whitespace and the second and third tokens are joined into the timestamp.
//!   Lines without a user id or timestamp are dropped. Missing or non-numeric
//!   status and verify codes read as `0`. An unparseable timestamp is kept
//!   as `None` so the caller can substitute server time.
//! - Punch batches for tables other than `ATTLOG` yield no punches. A batch
//!   without a `table` parameter is treated as `ATTLOG`.
//! - Acknowledgements are read from the body, one `key=value&...` line per
//!   command. When the body carries no `ID`, the query string is used.

use crate::{TzOffset, VerifyMethod, parse_timestamp};

/// Decoded `key=value` pairs with case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    /// Parse an `a=1&b=2` string, percent-decoding keys and values.
    pub fn parse(input: &str) -> Self {
        let pairs = input
            .split('&')
            .filter(|part| !part.trim().is_empty())
            .map(|part| {
                let (key, value) = part.split_once('=').unwrap_or((part, ""));
                (decode(key.trim()), decode(value.trim()))
            })
            .collect();
        Self(pairs)
    }

    /// Look up a parameter by name, ignoring ASCII case.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Look up a parameter, treating an empty value as missing.
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }
}

fn decode(value: &str) -> String {
    let value = value.replace('+', " ");
    urlencoding::decode(&value)
        .map(|v| v.into_owned())
        .unwrap_or(value)
}

/// Protocol-level request errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// No `SN` parameter.
    #[error("missing SN")]
    MissingSerial,
}

/// Which device endpoint a request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Initial contact.
    Handshake,
    /// Punch batch upload.
    Punches,
    /// Command poll.
    Poll,
    /// Command acknowledgement.
    Ack,
}

/// Capability flags sent with a handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakeParams {
    /// Requested option set, usually `all`.
    pub options: Option<String>,
    /// Push protocol version.
    pub push_version: Option<String>,
    /// Device language code.
    pub language: Option<String>,
}

/// One punch reported by a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PunchLine {
    /// Device-local user id.
    pub device_user_id: String,
    /// Device wall-clock time, if parseable.
    pub timestamp: Option<chrono::NaiveDateTime>,
    /// Timestamp field as received.
    pub raw_timestamp: String,
    /// Device status code (the device's own in/out guess).
    pub status: i32,
    /// Verification method.
    pub verify: VerifyMethod,
    /// Work code, if any.
    pub work_code: Option<String>,
}

/// One command acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckParams {
    /// Alias or command identifier as sent back by the device.
    pub id: String,
    /// Raw return code.
    pub return_code: String,
    /// Command keyword echoed by the device.
    pub cmd: Option<String>,
}

/// A single unit of device input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Handshake contact.
    Handshake(HandshakeParams),
    /// Punch line.
    Punch(PunchLine),
    /// Poll for commands.
    Poll,
    /// Command acknowledgement.
    Ack(AckParams),
}

/// A parsed device request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRequest {
    /// Device serial number.
    pub serial_number: String,
    /// Decoded frames, in arrival order.
    pub frames: Vec<Frame>,
}

impl DeviceRequest {
    /// Parse a request arriving on `endpoint`.
    pub fn parse(endpoint: Endpoint, query: &str, body: &str) -> Result<Self, ProtocolError> {
        let params = Params::parse(query);
        let serial_number = params
            .non_empty("SN")
            .ok_or(ProtocolError::MissingSerial)?
            .to_string();

        let frames = match endpoint {
            Endpoint::Handshake => vec![Frame::Handshake(HandshakeParams {
                options: params.non_empty("options").map(str::to_string),
                push_version: params.non_empty("pushver").map(str::to_string),
                language: params.non_empty("language").map(str::to_string),
            })],
            Endpoint::Punches => {
                let table = params.non_empty("table").unwrap_or(ATTLOG);
                if table.eq_ignore_ascii_case(ATTLOG) {
                    parse_punch_batch(body).into_iter().map(Frame::Punch).collect()
                } else {
                    Vec::new()
                }
            }
            Endpoint::Poll => vec![Frame::Poll],
            Endpoint::Ack => parse_acks(&params, body)
                .into_iter()
                .map(Frame::Ack)
                .collect(),
        };

        Ok(Self {
            serial_number,
            frames,
        })
    }
}

/// Table name for attendance punches.
pub const ATTLOG: &str = "ATTLOG";

/// Parse every usable punch line in a batch body.
pub fn parse_punch_batch(body: &str) -> Vec<PunchLine> {
    body.lines().filter_map(parse_punch_line).collect()
}

/// Parse a single punch line.
pub fn parse_punch_line(line: &str) -> Option<PunchLine> {
    let line = line.trim_matches(|c| c == '\r' || c == '\n');
    if line.trim().is_empty() {
        return None;
    }

    let (user, raw_timestamp, rest): (&str, String, Vec<&str>) = if line.contains('\t') {
        let mut fields = line.split('\t').map(str::trim);
        let user = fields.next()?;
        let timestamp = fields.next()?.to_string();
        (user, timestamp, fields.collect())
    } else {
        let mut fields = line.split_whitespace();
        let user = fields.next()?;
        let date = fields.next()?;
        let timestamp = match fields.next() {
            Some(time) => format!("{} {}", date, time),
            None => date.to_string(),
        };
        (user, timestamp, fields.collect())
    };

    if user.is_empty() || raw_timestamp.is_empty() {
        return None;
    }

    let code = |idx: usize| -> i32 {
        rest.get(idx)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    };

    Some(PunchLine {
        device_user_id: user.to_string(),
        timestamp: parse_timestamp(&raw_timestamp),
        raw_timestamp,
        status: code(0),
        verify: VerifyMethod::from_code(code(1)),
        work_code: rest
            .get(2)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string),
    })
}

fn parse_acks(query: &Params, body: &str) -> Vec<AckParams> {
    let from_body: Vec<AckParams> = body
        .lines()
        .map(Params::parse)
        .filter_map(|line| {
            let id = line.non_empty("ID")?.to_string();
            let return_code = line
                .get("Return")
                .or_else(|| query.get("Return"))
                .unwrap_or_default()
                .to_string();
            Some(AckParams {
                id,
                return_code,
                cmd: line.non_empty("CMD").map(str::to_string),
            })
        })
        .collect();

    if !from_body.is_empty() {
        return from_body;
    }

    match query.non_empty("ID") {
        Some(id) => vec![AckParams {
            id: id.to_string(),
            return_code: query.get("Return").unwrap_or_default().to_string(),
            cmd: query.non_empty("CMD").map(str::to_string),
        }],
        None => Vec::new(),
    }
}

/// Plain acknowledgement body.
pub const OK: &str = "OK";

/// Protocol version advertised to devices.
pub const PUSH_PROTOCOL_VERSION: &str = "2.4.1";

/// Handshake reply body.
#[derive(Debug, Clone, PartialEq)]
pub struct HandshakeReply {
    /// Device serial number.
    pub serial_number: String,
    /// Current UTC time.
    pub server_time: chrono::DateTime<chrono::Utc>,
    /// Device's absolute UTC offset.
    pub timezone: TzOffset,
}

impl std::fmt::Display for HandshakeReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "GET OPTION FROM: {}", self.serial_number)?;
        writeln!(
            f,
            "ServerTime={}",
            crate::format_timestamp(self.server_time.naive_utc())
        )?;
        writeln!(f, "TimeZone={}", self.timezone)?;
        writeln!(f, "ATTLOGStamp=None")?;
        writeln!(f, "OPERLOGStamp=9999")?;
        writeln!(f, "ATTPHOTOStamp=None")?;
        writeln!(f, "ErrorDelay=30")?;
        writeln!(f, "Delay=10")?;
        writeln!(f, "TransTimes=00:00;14:05")?;
        writeln!(f, "TransInterval=1")?;
        writeln!(f, "TransFlag=TransData AttLog OpLog EnrollUser ChgUser")?;
        writeln!(f, "Realtime=1")?;
        writeln!(f, "Encrypt=None")?;
        writeln!(f, "ServerVer={}", PUSH_PROTOCOL_VERSION)?;
        write!(f, "PushProtVer={}", PUSH_PROTOCOL_VERSION)
    }
}

/// Render a poll reply for `(alias, payload)` pairs.
pub fn render_poll(commands: &[(u32, String)]) -> String {
    if commands.is_empty() {
        return OK.to_string();
    }

    commands
        .iter()
        .map(|(alias, payload)| format!("C:{}:{}", alias, payload))
        .collect::<Vec<_>>()
        .join("\n")
}
