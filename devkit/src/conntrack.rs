/*!
Builder for `nf_conntrack` lines

Produces lines in the kernel's layout, accounting counters included, so
tests don't hand-write 200-character strings.
*/

use std::fmt;

#[derive(Debug, Clone)]
struct Direction {
    src: String,
    dst: String,
    ports: Option<(u16, u16)>,
    packets: u64,
    bytes: u64,
}

/// One tracked connection
#[derive(Debug, Clone)]
pub struct ConntrackLine {
    protocol: &'static str,
    forward: Direction,
    reply: Option<Direction>,
    accounting: bool,
}

impl ConntrackLine {
    /// TCP connection from `src:sport` to `dst:dport` with `bytes` sent
    pub fn tcp(src: &str, sport: u16, dst: &str, dport: u16, bytes: u64) -> Self {
        Self {
            protocol: "tcp",
            forward: Direction {
                src: src.to_string(),
                dst: dst.to_string(),
                ports: Some((sport, dport)),
                packets: bytes.div_ceil(1500).max(1),
                bytes,
            },
            reply: None,
            accounting: true,
        }
    }

    pub fn udp(src: &str, sport: u16, dst: &str, dport: u16, bytes: u64) -> Self {
        Self {
            protocol: "udp",
            ..Self::tcp(src, sport, dst, dport, bytes)
        }
    }

    /// Ping without ports
    pub fn icmp(src: &str, dst: &str, bytes: u64) -> Self {
        let mut line = Self::tcp(src, 0, dst, 0, bytes);
        line.protocol = "icmp";
        line.forward.ports = None;
        line
    }

    /// Reply direction, ports taken from the forward direction mirrored
    pub fn reply(mut self, src: &str, dst: &str, bytes: u64) -> Self {
        self.reply = Some(Direction {
            src: src.to_string(),
            dst: dst.to_string(),
            ports: self.forward.ports.map(|(sport, dport)| (dport, sport)),
            packets: bytes.div_ceil(1500).max(1),
            bytes,
        });
        self
    }

    /// Reply coming back on another port, as when the gateway remaps the source port
    pub fn reply_to_port(mut self, src: &str, dst: &str, dport: u16, bytes: u64) -> Self {
        self = self.reply(src, dst, bytes);
        if let Some(reply) = self.reply.as_mut() {
            reply.ports = reply.ports.map(|(sport, _)| (sport, dport));
        }
        self
    }

    /// Drop `packets=` and `bytes=`, as with `nf_conntrack_acct=0`
    pub fn without_accounting(mut self) -> Self {
        self.accounting = false;
        self
    }

    fn protocol_number(&self) -> u8 {
        match self.protocol {
            "tcp" => 6,
            "udp" => 17,
            _ => 1,
        }
    }

    fn write_direction(&self, f: &mut fmt::Formatter<'_>, d: &Direction) -> fmt::Result {
        write!(f, " src={} dst={}", d.src, d.dst)?;
        match d.ports {
            Some((sport, dport)) => write!(f, " sport={} dport={}", sport, dport)?,
            None => write!(f, " type=8 code=0 id=1")?,
        }
        if self.accounting {
            write!(f, " packets={} bytes={}", d.packets, d.bytes)?;
        }
        Ok(())
    }
}

impl fmt::Display for ConntrackLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ipv4     2 {:<8} {} 431999", self.protocol, self.protocol_number())?;
        if self.protocol == "tcp" {
            write!(f, " ESTABLISHED")?;
        }
        self.write_direction(f, &self.forward)?;
        match &self.reply {
            Some(reply) => {
                self.write_direction(f, reply)?;
                write!(f, " [ASSURED] mark=0 zone=0 use=2")
            }
            None => write!(f, " [UNREPLIED] mark=0 zone=0 use=1"),
        }
    }
}

/// Render a whole table, one line per connection
pub fn table(lines: &[ConntrackLine]) -> String {
    lines.iter().map(|line| format!("{}\n", line)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nat_line_layout() {
        let line = ConntrackLine::tcp("192.168.1.21", 40000, "93.184.216.34", 443, 1000)
            .reply("93.184.216.34", "192.168.29.2", 2000)
            .to_string();
        assert!(line.starts_with("ipv4     2 tcp      6 431999 ESTABLISHED src=192.168.1.21"));
        assert!(line.contains(
            "sport=40000 dport=443 packets=1 bytes=1000 src=93.184.216.34 dst=192.168.29.2 sport=443 dport=40000 packets=2 bytes=2000"
        ));
    }

    #[test]
    fn test_without_accounting_has_no_bytes() {
        let line = ConntrackLine::udp("192.168.1.5", 5353, "1.1.1.1", 53, 10)
            .reply("1.1.1.1", "192.168.29.2", 10)
            .without_accounting()
            .to_string();
        assert!(!line.contains("bytes="));
    }

    #[test]
    fn test_remapped_reply_port() {
        let line = ConntrackLine::tcp("192.168.1.21", 40000, "8.8.8.8", 443, 1)
            .reply_to_port("8.8.8.8", "192.168.29.2", 61000, 1)
            .to_string();
        assert!(line.contains("sport=443 dport=61000"));
    }
}
