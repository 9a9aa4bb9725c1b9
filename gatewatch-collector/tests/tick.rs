//! Full collection ticks against a fake kernel tree

use std::net::Ipv4Addr;

use gatewatch_collector::{Collector, CollectorConfig};
use gatewatch_devkit::conntrack::table;
use gatewatch_devkit::{init_test_tracing, ConntrackLine, FakeKernel, FakeProcess};

fn config_for(kernel: &FakeKernel) -> CollectorConfig {
    let mut config = CollectorConfig::default();
    config.sources.proc_root = kernel.proc_root();
    config.sources.sys_root = kernel.sys_root();
    config.sources.conntrack_path = kernel.conntrack_path();
    config.sources.reservations_path = kernel.reservations_dir();
    config.collector.snapshot_path = kernel.snapshot_path();
    config
}

fn lines_of<'a>(text: &'a str, family: &str) -> Vec<&'a str> {
    text.lines()
        .filter(|line| line.starts_with(&format!("{}{{", family)) || line.starts_with(&format!("{} ", family)))
        .collect()
}

/// Sample line of a device missing from the reservations
fn unknown_device(family: &str, ip: &str, bytes: u64) -> String {
    format!(
        "{family}{{cat=\"unknown\",hostname=\"unknown\",ip=\"{ip}\",os=\"unknown\",user=\"unknown\"}} {bytes}\n"
    )
}

#[tokio::test]
async fn test_tick_publishes_every_family() {
    init_test_tracing();
    let kernel = FakeKernel::router().unwrap();
    kernel
        .add_hwmon_sensor(0, 1, "42")
        .unwrap()
        .add_reservations(
            "lan.conf",
            &[
                "# office",
                "192.168.1.21 swathi-dell swathi work windows",
                "192.168.1.10 laptop alice home macos",
                "192.168.1.15 nas admin storage linux",
            ],
        )
        .unwrap()
        .write_conntrack(&[
            ConntrackLine::tcp("192.168.1.21", 40000, "93.184.216.34", 443, 1000)
                .reply("93.184.216.34", "192.168.29.2", 2000),
            ConntrackLine::tcp("192.168.1.10", 50000, "192.168.1.15", 445, 1048576)
                .reply("192.168.1.15", "192.168.1.10", 1048576),
        ])
        .unwrap();

    let collector = Collector::new(config_for(&kernel)).unwrap();
    let snapshot = collector.tick().await.unwrap();

    let text = std::fs::read_to_string(kernel.snapshot_path()).unwrap();
    assert_eq!(text, snapshot.to_text());
    assert!(text.starts_with("# gatewatch snapshot generated_at="));

    // CPU: two cores, aggregate row excluded, short row padded
    assert_eq!(lines_of(&text, "gatewatch_cpu_seconds_total").len(), 20);
    assert!(text.contains("gatewatch_cpu_seconds_total{core=\"0\",mode=\"user\"} 25\n"));
    assert!(text.contains("gatewatch_cpu_seconds_total{core=\"1\",mode=\"steal\"} 0\n"));

    // Memory
    assert!(text.contains("gatewatch_memory_total_bytes 536870912\n"));
    assert!(text.contains("gatewatch_memory_free_bytes 126418944\n"));
    assert!(text.contains("gatewatch_memory_used_bytes 295108608\n"));
    assert!(text.contains("gatewatch_swap_used_bytes 0\n"));

    // Temperature: millidegrees scaled, small values verbatim
    assert!(text.contains("gatewatch_temperature_celsius{sensor=\"hwmon_hwmon0_temp1\"} 42\n"));
    assert!(text.contains("gatewatch_temperature_celsius{sensor=\"thermal_thermal_zone0_temp\"} 45.2\n"));

    // Interfaces, loopback skipped
    assert!(text.contains("gatewatch_network_receive_bytes_total{interface=\"eth0\"} 9876543\n"));
    assert!(!text.contains("interface=\"lo\""));

    // NAT return: aggregates only
    assert!(text.contains(
        "gatewatch_device_tx_bytes{cat=\"work\",hostname=\"swathi-dell\",ip=\"192.168.1.21\",os=\"windows\",user=\"swathi\"} 1000\n"
    ));
    assert!(text.contains(
        "gatewatch_device_rx_bytes{cat=\"work\",hostname=\"swathi-dell\",ip=\"192.168.1.21\",os=\"windows\",user=\"swathi\"} 2000\n"
    ));
    assert!(lines_of(&text, "gatewatch_local_tx_bytes")
        .iter()
        .all(|line| !line.contains("ip=\"192.168.1.21\"")));

    // Local transfer: pair lines both ways
    assert!(text.contains(
        "gatewatch_local_tx_bytes{cat=\"home\",dst_hostname=\"nas\",dst_ip=\"192.168.1.15\",hostname=\"laptop\",ip=\"192.168.1.10\",os=\"macos\",user=\"alice\"} 1048576\n"
    ));
    assert!(text.contains(
        "gatewatch_local_rx_bytes{cat=\"storage\",hostname=\"nas\",ip=\"192.168.1.15\",os=\"linux\",src_hostname=\"laptop\",src_ip=\"192.168.1.10\",user=\"admin\"} 1048576\n"
    ));
    assert_eq!(lines_of(&text, "gatewatch_device_tx_bytes").len(), 3);
}

#[tokio::test]
async fn test_next_tick_replaces_snapshot() {
    init_test_tracing();
    let kernel = FakeKernel::router().unwrap();
    kernel
        .write_conntrack(&[ConntrackLine::udp("192.168.1.77", 5353, "192.168.1.1", 53, 60)])
        .unwrap();
    let collector = Collector::new(config_for(&kernel)).unwrap();

    let first = collector.tick().await.unwrap();
    assert!(first.to_text().contains("hostname=\"unknown\",ip=\"192.168.1.77\""));
    assert!(first.to_text().contains("dst_hostname=\"gateway-lan\",dst_ip=\"192.168.1.1\""));

    // Table emptied and meminfo gone: the families vanish instead of going stale
    kernel.write_conntrack(&[]).unwrap().remove("proc/meminfo").unwrap();
    collector.tick().await.unwrap();

    let text = std::fs::read_to_string(kernel.snapshot_path()).unwrap();
    assert!(!text.contains("192.168.1.77"));
    assert!(!text.contains("gatewatch_memory_total_bytes"));
    assert!(text.contains("gatewatch_cpu_seconds_total"));
}

#[tokio::test]
async fn test_custom_infrastructure_table() {
    init_test_tracing();
    let kernel = FakeKernel::new().unwrap();
    kernel
        .write_conntrack(&[ConntrackLine::tcp("10.10.0.50", 41000, "1.1.1.1", 443, 10)
            .reply("1.1.1.1", "100.64.3.9", 20)])
        .unwrap();

    let config = CollectorConfig {
        network: CollectorConfig::from_toml(
            r#"
            [network]
            lan_ranges = ["10.10.0.0/16"]

            [[network.infrastructure]]
            ip = "100.64.3.9"
            hostname = "cgnat"
            role = "wan_nat"
            "#,
        )
        .unwrap()
        .network,
        ..config_for(&kernel)
    };
    assert!(config.classifier().is_wan_nat(Ipv4Addr::new(100, 64, 3, 9)));

    let collector = Collector::new(config).unwrap();
    let text = collector.tick().await.unwrap().to_text();
    assert!(text.contains(&unknown_device("gatewatch_device_tx_bytes", "10.10.0.50", 10)));
    assert!(text.contains(&unknown_device("gatewatch_device_rx_bytes", "10.10.0.50", 20)));
    assert!(!text.contains("gatewatch_cpu_seconds_total"));
}

#[tokio::test]
async fn test_lines_without_accounting_are_skipped() {
    init_test_tracing();
    let kernel = FakeKernel::new().unwrap();
    kernel
        .write_conntrack(&[
            ConntrackLine::tcp("192.168.1.21", 40000, "93.184.216.34", 443, 1000)
                .reply("93.184.216.34", "192.168.29.2", 2000)
                .without_accounting(),
            ConntrackLine::udp("192.168.1.10", 5000, "192.168.1.15", 9000, 10).without_accounting(),
        ])
        .unwrap();

    let collector = Collector::new(config_for(&kernel)).unwrap();
    let text = collector.tick().await.unwrap().to_text();
    assert!(lines_of(&text, "gatewatch_device_tx_bytes").is_empty());
    assert!(lines_of(&text, "gatewatch_device_rx_bytes").is_empty());
    assert!(lines_of(&text, "gatewatch_local_tx_bytes").is_empty());
}

#[tokio::test]
async fn test_icmp_is_booked_per_direction() {
    init_test_tracing();
    let kernel = FakeKernel::new().unwrap();
    kernel
        .write_conntrack(&[
            // No ports, so never a NAT return: the reply to the WAN address is nobody's
            ConntrackLine::icmp("192.168.1.7", "9.9.9.9", 84).reply("9.9.9.9", "192.168.29.2", 84),
            ConntrackLine::icmp("192.168.1.7", "192.168.1.8", 98).reply("192.168.1.8", "192.168.1.7", 98),
        ])
        .unwrap();

    let collector = Collector::new(config_for(&kernel)).unwrap();
    let text = collector.tick().await.unwrap().to_text();
    assert!(text.contains(&unknown_device("gatewatch_device_tx_bytes", "192.168.1.7", 182)));
    assert!(text.contains(&unknown_device("gatewatch_device_rx_bytes", "192.168.1.7", 98)));
    assert!(text.contains(&unknown_device("gatewatch_device_tx_bytes", "192.168.1.8", 98)));
    assert!(!text.contains("ip=\"192.168.29.2\""));
    assert_eq!(lines_of(&text, "gatewatch_local_tx_bytes").len(), 2);
    assert_eq!(lines_of(&text, "gatewatch_local_rx_bytes").len(), 2);
}

#[tokio::test]
async fn test_remapped_port_is_not_a_nat_return() {
    init_test_tracing();
    let kernel = FakeKernel::new().unwrap();
    kernel
        .write_conntrack(&[ConntrackLine::tcp("192.168.1.21", 40000, "93.184.216.34", 443, 1000)
            .reply_to_port("93.184.216.34", "192.168.29.2", 61000, 2000)])
        .unwrap();

    let collector = Collector::new(config_for(&kernel)).unwrap();
    let text = collector.tick().await.unwrap().to_text();
    assert!(text.contains(&unknown_device("gatewatch_device_tx_bytes", "192.168.1.21", 1000)));
    assert!(text.contains(&unknown_device("gatewatch_device_rx_bytes", "192.168.1.21", 0)));
    assert_eq!(lines_of(&text, "gatewatch_device_tx_bytes").len(), 1);
}

#[tokio::test]
async fn test_invalid_utf8_line_keeps_the_rest_of_the_table() {
    init_test_tracing();
    let kernel = FakeKernel::new().unwrap();
    let mut raw = table(&[ConntrackLine::udp("192.168.1.10", 5353, "1.1.1.1", 53, 10)]).into_bytes();
    raw.extend_from_slice(b"ipv4     2 udp      17 30 src=192.168.1.11 dst=1.1.1.1 \xff\xfe bytes=20\n");
    raw.extend_from_slice(table(&[ConntrackLine::udp("192.168.1.12", 5353, "1.1.1.1", 53, 30)]).as_bytes());
    kernel.write_conntrack_raw(&raw).unwrap();

    let collector = Collector::new(config_for(&kernel)).unwrap();
    let text = collector.tick().await.unwrap().to_text();
    assert!(text.contains(&unknown_device("gatewatch_device_tx_bytes", "192.168.1.10", 10)));
    assert!(text.contains(&unknown_device("gatewatch_device_tx_bytes", "192.168.1.12", 30)));
    assert!(!text.contains("192.168.1.11"));
}

#[tokio::test]
async fn test_processes_aggregate_by_name() {
    init_test_tracing();
    let kernel = FakeKernel::router().unwrap();
    kernel
        .write_uptime("1000.00 1800.00\n")
        .unwrap()
        .add_process(&FakeProcess::new(812, "nginx").cpu(150, 50).started_at(2500).pages(2560, 256).io(4096, 8192))
        .unwrap()
        .add_process(&FakeProcess::new(813, "nginx").cpu(100, 0).started_at(3000).pages(2560, 128))
        .unwrap()
        .add_process(&FakeProcess::new(900, "dnsmasq").cpu(10, 10).started_at(500).pages(1000, 100))
        .unwrap();

    let collector = Collector::new(config_for(&kernel)).unwrap();
    let text = collector.tick().await.unwrap().to_text();

    assert_eq!(lines_of(&text, "gatewatch_process_cpu_seconds_total").len(), 2);
    assert!(text.contains("gatewatch_process_cpu_seconds_total{name=\"nginx\"} 3\n"));
    assert!(text.contains("gatewatch_process_cpu_seconds_total{name=\"dnsmasq\"} 0.2\n"));
    assert!(text.contains("gatewatch_process_resident_memory_bytes{name=\"nginx\"} 1572864\n"));
    assert!(text.contains("gatewatch_process_virtual_memory_bytes{name=\"nginx\"} 20971520\n"));
    // Oldest nginx started 25s after btime 1062191376
    assert!(text.contains("gatewatch_process_start_time_seconds{name=\"nginx\"} 1062191401\n"));
    assert!(text.contains("gatewatch_process_runtime_seconds{name=\"nginx\"} 975\n"));
    assert!(text.contains("gatewatch_process_runtime_seconds{name=\"dnsmasq\"} 995\n"));
    assert!(text.contains("gatewatch_process_disk_read_bytes_total{name=\"nginx\"} 4096\n"));
    assert!(text.contains("gatewatch_process_disk_write_bytes_total{name=\"dnsmasq\"} 0\n"));

    // Toggled off: the families go away
    let config = CollectorConfig {
        families: CollectorConfig::from_toml("[families]\nprocesses = false\n").unwrap().families,
        ..config_for(&kernel)
    };
    let text = Collector::new(config).unwrap().tick().await.unwrap().to_text();
    assert!(!text.contains("gatewatch_process_"));
    assert!(text.contains("gatewatch_cpu_seconds_total"));
}
