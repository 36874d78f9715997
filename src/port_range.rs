use thiserror::Error;

use crate::MAX_VALID_PORT;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PortRangeParseError {
    #[error("invalid port range {0:?}")]
    Malformed(String),
    #[error("port must be smaller than 65536 but found {0}")]
    OutOfRange(u64),
    #[error("invalid port range {lo}-{hi}, start must not exceed end")]
    Inverted { lo: u16, hi: u16 },
}

/// Parses a reserved-port specification such as `"22,80,1000-2000"` into a
/// sorted, deduplicated list of port numbers. Items are single ports or
/// inclusive `N-M` ranges; whitespace around items is tolerated.
pub fn parse_port_ranges(spec: &str) -> Result<Vec<u16>, PortRangeParseError> {
    let mut ports = Vec::new();

    for item in spec.split(',') {
        let item = item.trim();
        match item.split_once('-') {
            None => ports.push(parse_port(item)?),
            Some((lo, hi)) => {
                let lo = parse_port(lo.trim())?;
                let hi = parse_port(hi.trim())?;
                if lo > hi {
                    return Err(PortRangeParseError::Inverted { lo, hi });
                }
                ports.extend(lo..=hi);
            }
        }
    }

    ports.sort_unstable();
    ports.dedup();
    Ok(ports)
}

/// Renders a sorted port list back into canonical range form, collapsing
/// consecutive runs into `N-M` items.
pub fn format_port_ranges(ports: &[u16]) -> String {
    let mut items = Vec::new();

    let mut i = 0;
    while i < ports.len() {
        let start = ports[i];
        let mut end = start;
        while i + 1 < ports.len() && u32::from(ports[i + 1]) == u32::from(end) + 1 {
            i += 1;
            end = ports[i];
        }
        if start == end {
            items.push(start.to_string());
        } else {
            items.push(format!("{start}-{end}"));
        }
        i += 1;
    }

    items.join(",")
}

fn parse_port(token: &str) -> Result<u16, PortRangeParseError> {
    let value: u64 = token
        .parse()
        .map_err(|_| PortRangeParseError::Malformed(token.to_string()))?;
    if value as usize >= MAX_VALID_PORT {
        return Err(PortRangeParseError::OutOfRange(value));
    }
    Ok(value as u16)
}
