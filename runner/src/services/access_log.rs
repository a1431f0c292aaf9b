//! Access log formatting and the default tracing-backed access logger
//!
//! Formats follow the Apache `mod_log_config` directives. Supported:
//!
//! | directive     | value                                         |
//! |---------------|-----------------------------------------------|
//! | `%a` `%h`     | client IP address                             |
//! | `%l` `%u`     | always `-`                                    |
//! | `%t`          | time the entry was written                    |
//! | `%r`          | request line                                  |
//! | `%m`          | method                                        |
//! | `%U`          | path                                          |
//! | `%q`          | query string with leading `?`, or empty       |
//! | `%H`          | protocol                                      |
//! | `%s` `%>s`    | status code                                   |
//! | `%b`          | body size, `-` when empty                     |
//! | `%B`          | body size                                     |
//! | `%D`          | microseconds since the request arrived        |
//! | `%T`          | seconds since the request arrived             |
//! | `%v`          | server name from the `Host` header            |
//! | `%p`          | port from the `Host` header                   |
//! | `%P`          | process id of the worker                      |
//! | `%{Name}i`    | request header                                |
//! | `%{Name}o`    | response header                               |
//! | `%%`          | literal `%`                                   |

use bytes::Bytes;
use chrono::Local;
use http::{HeaderMap, Response, StatusCode};

use shared::{process_info, ProcessRole};

use crate::traits::{AccessLogger, RawRequest};
use crate::types::StaticResourceResponse;

pub const FORMAT_COMMON: &str = "%h %l %u %t \"%r\" %>s %b";
pub const FORMAT_COMMON_VHOST: &str = "%v %h %l %u %t \"%r\" %>s %b";
pub const FORMAT_COMBINED: &str = "%h %l %u %t \"%r\" %>s %b \"%{Referer}i\" \"%{User-Agent}i\"";
pub const FORMAT_REFERER: &str = "%{Referer}i -> %U";
pub const FORMAT_AGENT: &str = "%{User-Agent}i";

/// Everything one access log line can refer to
pub struct AccessLogEntry<'a> {
    pub request: &'a dyn RawRequest,
    pub status: StatusCode,
    pub response_headers: &'a HeaderMap,
    pub body_size: u64,
}

impl<'a> AccessLogEntry<'a> {
    pub fn for_static(request: &'a dyn RawRequest, response: &'a StaticResourceResponse) -> Self {
        Self {
            request,
            status: response.status,
            response_headers: &response.headers,
            body_size: response.body_size(),
        }
    }

    pub fn for_response(request: &'a dyn RawRequest, response: &'a Response<Bytes>) -> Self {
        Self {
            request,
            status: response.status(),
            response_headers: response.headers(),
            body_size: response.body().len() as u64,
        }
    }

    fn client_ip(&self) -> String {
        self.request
            .remote_addr()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "-".to_string())
    }

    fn request_line(&self) -> String {
        let target = self
            .request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| self.request.uri().path().to_string());
        format!("{} {} {:?}", self.request.method(), target, self.request.version())
    }

    fn host_parts(&self) -> (String, String) {
        match self.request.header("host") {
            Some(host) => match host.rsplit_once(':') {
                Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => {
                    (name.to_string(), port.to_string())
                }
                _ => (host.to_string(), "-".to_string()),
            },
            None => ("-".to_string(), "-".to_string()),
        }
    }

    fn elapsed_micros(&self) -> Option<u128> {
        self.request.received_at().map(|at| at.elapsed().as_micros())
    }
}

/// Renders [`AccessLogEntry`] values with an Apache-style format string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessLogFormatter {
    format: String,
}

impl AccessLogFormatter {
    pub fn new(format: impl Into<String>) -> Self {
        Self { format: format.into() }
    }

    /// Resolve a named format (`common`, `combined`, ...) or use the
    /// argument as a literal template
    pub fn from_name(name: &str) -> Self {
        let format = match name {
            "common" => FORMAT_COMMON,
            "common-vhost" => FORMAT_COMMON_VHOST,
            "combined" => FORMAT_COMBINED,
            "referer" => FORMAT_REFERER,
            "agent" => FORMAT_AGENT,
            template => template,
        };
        Self::new(format)
    }

    pub fn format_string(&self) -> &str {
        &self.format
    }

    pub fn format(&self, entry: &AccessLogEntry<'_>) -> String {
        let mut out = String::with_capacity(self.format.len() + 64);
        let mut chars = self.format.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }

            // Final-status modifier, the only one supported
            if chars.peek() == Some(&'>') {
                chars.next();
            }

            let mut argument = None;
            if chars.peek() == Some(&'{') {
                chars.next();
                let mut name = String::new();
                for n in chars.by_ref() {
                    if n == '}' {
                        break;
                    }
                    name.push(n);
                }
                argument = Some(name);
            }

            match chars.next() {
                Some(directive) => out.push_str(&self.render(directive, argument.as_deref(), entry)),
                None => out.push('%'),
            }
        }

        out
    }

    fn render(&self, directive: char, argument: Option<&str>, entry: &AccessLogEntry<'_>) -> String {
        let request = entry.request;
        match (directive, argument) {
            ('i', Some(name)) => header_or_dash(request.headers(), name),
            ('o', Some(name)) => header_or_dash(entry.response_headers, name),
            ('a', _) | ('h', _) => entry.client_ip(),
            ('l', _) | ('u', _) => "-".to_string(),
            ('t', _) => Local::now().format("[%d/%b/%Y:%H:%M:%S %z]").to_string(),
            ('r', _) => entry.request_line(),
            ('m', _) => request.method().to_string(),
            ('U', _) => request.uri().path().to_string(),
            ('q', _) => request.uri().query().map(|q| format!("?{q}")).unwrap_or_default(),
            ('H', _) => format!("{:?}", request.version()),
            ('s', _) => entry.status.as_u16().to_string(),
            ('b', _) if entry.body_size == 0 => "-".to_string(),
            ('b', _) | ('B', _) => entry.body_size.to_string(),
            ('D', _) => entry
                .elapsed_micros()
                .map(|us| us.to_string())
                .unwrap_or_else(|| "-".to_string()),
            ('T', _) => entry
                .elapsed_micros()
                .map(|us| (us / 1_000_000).to_string())
                .unwrap_or_else(|| "-".to_string()),
            ('v', _) => entry.host_parts().0,
            ('p', _) => entry.host_parts().1,
            ('P', _) => std::process::id().to_string(),
            ('%', _) => "%".to_string(),
            (other, Some(name)) => format!("%{{{name}}}{other}"),
            (other, None) => format!("%{other}"),
        }
    }
}

impl Default for AccessLogFormatter {
    fn default() -> Self {
        Self::new(FORMAT_COMMON)
    }
}

fn header_or_dash(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| "-".to_string())
}

/// Replace `{key}` placeholders with values from the context
pub fn interpolate(message: &str, context: &[(&str, String)]) -> String {
    context.iter().fold(message.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{key}}}"), value)
    })
}

/// Access logger writing formatted lines through `tracing`
///
/// Access entries go to the `access_log` target, notices to the runner's
/// own target tagged with the current process role.
#[derive(Debug, Clone, Default)]
pub struct TracingAccessLogger {
    formatter: AccessLogFormatter,
}

impl TracingAccessLogger {
    pub fn new(formatter: AccessLogFormatter) -> Self {
        Self { formatter }
    }

    pub fn formatter(&self) -> &AccessLogFormatter {
        &self.formatter
    }

    fn write_entry(&self, entry: &AccessLogEntry<'_>) {
        let line = self.formatter.format(entry);
        if entry.status.is_server_error() {
            tracing::warn!(target: "access_log", "{}", line);
        } else {
            tracing::info!(target: "access_log", "{}", line);
        }
    }
}

impl AccessLogger for TracingAccessLogger {
    fn log_access_for_static_resource(&self, request: &dyn RawRequest, response: &StaticResourceResponse) {
        self.write_entry(&AccessLogEntry::for_static(request, response));
    }

    fn log_access_for_response(&self, request: &dyn RawRequest, response: &Response<Bytes>) {
        self.write_entry(&AccessLogEntry::for_response(request, response));
    }

    fn notice(&self, message: &str, context: &[(&str, String)]) {
        process_info!(ProcessRole::current(), "{}", interpolate(message, context));
    }
}
