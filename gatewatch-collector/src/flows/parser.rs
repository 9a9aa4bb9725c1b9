//! Connection-tracking line parser
//!
//! A conntrack line carries the original direction and the reply direction
//! as two runs of `key=value` tokens with nothing marking where one ends:
//!
//! ```text
//! ipv4 2 tcp 6 431999 ESTABLISHED src=192.168.1.21 dst=93.184.216.34 sport=40000 dport=443
//!   packets=10 bytes=1000 src=93.184.216.34 dst=192.168.29.2 sport=443 dport=40000
//!   packets=12 bytes=2000 [ASSURED] mark=0 use=2
//! ```
//!
//! The first `bytes=` closes direction 1; everything after it, up to the
//! second `bytes=`, is direction 2. Lines without byte accounting carry no
//! `bytes=` at all and are rejected.

use std::net::Ipv4Addr;

/// One direction of a tracked connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowTuple {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    /// Absent for protocols without ports (icmp)
    pub sport: Option<u16>,
    pub dport: Option<u16>,
    pub bytes: u64,
}

/// A parsed conntrack line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionRecord {
    pub forward: FlowTuple,
    pub reply: Option<FlowTuple>,
}

impl ConnectionRecord {
    /// Bytes of both directions together, saturating
    pub fn total_bytes(&self) -> u64 {
        self.forward.bytes.saturating_add(self.reply.map_or(0, |r| r.bytes))
    }
}

#[derive(Debug, Default)]
struct TupleFields<'a> {
    src: Option<&'a str>,
    dst: Option<&'a str>,
    sport: Option<&'a str>,
    dport: Option<&'a str>,
    bytes: Option<&'a str>,
}

impl<'a> TupleFields<'a> {
    fn set(&mut self, key: &str, value: &'a str) {
        let slot = match key {
            "src" => &mut self.src,
            "dst" => &mut self.dst,
            "sport" => &mut self.sport,
            "dport" => &mut self.dport,
            "bytes" => &mut self.bytes,
            _ => return,
        };
        if slot.is_none() {
            *slot = Some(value);
        }
    }

    fn finish(self) -> Option<FlowTuple> {
        Some(FlowTuple {
            src: self.src?.parse().ok()?,
            dst: self.dst?.parse().ok()?,
            sport: self.sport.and_then(|p| p.parse().ok()),
            dport: self.dport.and_then(|p| p.parse().ok()),
            bytes: self.bytes?.parse().ok()?,
        })
    }
}

/// Split a conntrack line into its directions.
///
/// `None` when the line has no `bytes=` token or direction 1 doesn't carry
/// IPv4 endpoints. A direction 2 that can't be parsed is dropped and
/// direction 1 is kept alone.
pub fn parse_flow_line(line: &str) -> Option<ConnectionRecord> {
    let mut directions = [TupleFields::default(), TupleFields::default()];
    let mut current = 0;

    for token in line.split_whitespace() {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        directions[current].set(key, value);
        if key == "bytes" {
            current += 1;
            if current == directions.len() {
                break;
            }
        }
    }

    if current == 0 {
        return None;
    }
    let [forward, reply] = directions;
    let forward = forward.finish()?;
    let reply = if current == 2 { reply.finish() } else { None };
    Some(ConnectionRecord { forward, reply })
}
