//! Control-plane operations against a scripted modem.

use mlink_modem::{
    ControlOp, ControlOutcome, DeviceSpec, ModemConfig, ModemError, ModemRegistry,
    PingError, PingRequest,
};
use mlink_sim::{PinEvent, RecordingPin, ScriptedTransport};

fn init_logging() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .with_test_writer()
            .try_init();
    });
}

fn fast_config() -> ModemConfig {
    init_logging();
    let mut cfg = ModemConfig::default();
    cfg.power_off_hold_ms = 1;
    cfg.power_on_settle_ms = 1;
    cfg.control_power_on_delay_ms = 1;
    cfg.boot_ready_window_ms = 200;
    cfg.cmd_timeout_ms = 200;
    cfg.sim_check_delay_ms = 1;
    cfg.sim_check_timeout_ms = 200;
    cfg.signal_check_delay_ms = 1;
    cfg.signal_check_timeout_ms = 200;
    cfg.info_timeout_ms = 200;
    cfg.dns_backoff_step_ms = 1;
    cfg.resolve_timeout_ms = 200;
    cfg.ping_timeout_ms = 200;
    cfg.netstat_timeout_ms = 200;
    cfg.link_poll_interval_ms = 60_000;
    cfg
}

/// Script for one clean bring-up pass; control exchanges append after it.
fn bring_up_script() -> ScriptedTransport {
    ScriptedTransport::new()
        .unsolicited(&["READY"])
        .expect("ATE0", &["OK"])
        .expect("ATI", &["ML307R-DL", "Revision: ML307R22V01", "OK"])
        .expect("AT+ICCID", &["+ICCID: 898602D9021700123456", "OK"])
        .expect("AT+CSQ", &["+CSQ: 18,99", "OK"])
        .expect("AT+GSN=1", &["+GSN: 866714058667254", "OK"])
        .expect("AT+CGPADDR=1", &["+CGPADDR: 1,\"10.188.32.7\"", "OK"])
        .expect("AT+MDNSCFG=\"priority\",0", &["OK"])
        .expect(
            "AT+MDNSCFG=\"ip\"",
            &["+MDNSCFG: \"ip\",\"183.230.126.224\",,\"\"", "OK"],
        )
}

fn ready_device(
    transport: ScriptedTransport,
) -> (ModemRegistry, std::sync::Arc<mlink_modem::ModemDevice>) {
    let registry = ModemRegistry::new();
    let device = registry
        .register(
            DeviceSpec {
                name: "ml0".to_string(),
                channel: "uart2".to_string(),
                power_pin: Some(Box::new(RecordingPin::new())),
                status_pin: None,
                recv_buf_capacity: 512,
            },
            Box::new(transport),
            fast_config(),
        )
        .expect("bring-up must succeed");
    (registry, device)
}

#[test]
fn ping_by_name_resolves_and_reports_reply_fields() {
    let transport = bring_up_script()
        .expect("AT+CGACT?", &["+CGACT: 1,1", "OK"])
        .expect(
            "AT+MDNSGIP=\"www.example.com\"",
            &["+MDNSGIP: \"www.example.com\",\"93.184.216.34\"", "OK"],
        )
        .expect(
            "AT+MPING=\"93.184.216.34\", 10, 1",
            &["+MPING: 0, 93.184.216.34, 32, 120, 54"],
        );
    let log = transport.sent_log();
    let (_registry, device) = ready_device(transport);

    let outcome = device
        .control(ControlOp::Ping(PingRequest::new("www.example.com", 10, 1)))
        .unwrap();
    let report = match outcome {
        ControlOutcome::Ping(report) => report,
        other => panic!("expected ping outcome, got {other:?}"),
    };
    assert_eq!(report.addr, "93.184.216.34".parse::<std::net::Ipv4Addr>().unwrap());
    assert_eq!(report.bytes, 32);
    assert_eq!(report.time_ms, 120);
    assert_eq!(report.ttl, 54);

    let sent = log.lock().unwrap();
    assert!(
        sent.iter().any(|c| c == "AT+MDNSGIP=\"www.example.com\""),
        "names must resolve through the modem DNS"
    );
    drop(sent);
    device.deinit();
}

#[test]
fn ping_code_two_is_dns_resolve_timeout() {
    let transport = bring_up_script().expect("AT+MPING=\"8.8.8.8\", 10, 1", &["+MPING: 2"]);
    let (_registry, device) = ready_device(transport);

    let err = device
        .control(ControlOp::Ping(PingRequest::new("8.8.8.8", 10, 1)))
        .unwrap_err();
    assert!(
        matches!(err, ModemError::Ping(PingError::DnsResolveTimeout)),
        "code 2 must map to the DNS-timeout kind, got {err}"
    );
    device.deinit();
}

#[test]
fn negative_ping_fields_are_malformed_not_wrapped() {
    let transport = bring_up_script().expect(
        "AT+MPING=\"8.8.8.8\", 10, 1",
        &["+MPING: 0, 8.8.8.8, -32, 120, 54"],
    );
    let (_registry, device) = ready_device(transport);

    let err = device
        .control(ControlOp::Ping(PingRequest::new("8.8.8.8", 10, 1)))
        .unwrap_err();
    assert!(
        matches!(err, ModemError::Parse { keyword: "+MPING:" }),
        "a negative byte count must parse-fail, got {err}"
    );
    device.deinit();
}

#[test]
fn failed_resolution_falls_back_to_the_bare_name() {
    let transport = bring_up_script()
        .expect("AT+CGACT?", &["+CGACT: 1,1", "OK"])
        .expect("AT+MDNSGIP=\"no.such.host\"", &["OK"])
        .expect("AT+MPING=\"no.such.host\", 10, 1", &["+MPING: 1"]);
    let (_registry, device) = ready_device(transport);

    let err = device
        .control(ControlOp::Ping(PingRequest::new("no.such.host", 10, 1)))
        .unwrap_err();
    assert!(matches!(err, ModemError::Ping(PingError::DnsResolveFailed)));
    device.deinit();
}

#[test]
fn netstat_lists_rows_and_skips_garbage() {
    let transport = bring_up_script().expect(
        "AT+MIPSTATE?",
        &[
            "+MIPSTATE: 0,\"TCP\",\"120.195.1.2\",8080,2",
            "+MIPSTATE: 1,\"UDP\",\"8.8.8.8\",53,1",
            "+MIPSTATE: mangled row",
            "OK",
        ],
    );
    let (_registry, device) = ready_device(transport);

    let outcome = device.control(ControlOp::Netstat).unwrap();
    let entries = match outcome {
        ControlOutcome::Netstat(entries) => entries,
        other => panic!("expected netstat outcome, got {other:?}"),
    };
    assert_eq!(entries.len(), 2, "malformed rows are skipped, not fatal");
    assert_eq!(entries[0].proto, "TCP");
    assert_eq!(entries[0].remote_addr, "120.195.1.2".parse::<std::net::Ipv4Addr>().unwrap());
    assert_eq!(entries[0].remote_port, 8080);
    assert!(entries[0].link_up);
    assert_eq!(entries[1].proto, "UDP");
    assert!(!entries[1].link_up);
    device.deinit();
}

#[test]
fn signal_query_returns_the_raw_pair() {
    let transport = bring_up_script().expect("AT+CSQ", &["+CSQ: 20,0", "OK"]);
    let (_registry, device) = ready_device(transport);

    let outcome = device.control(ControlOp::SignalQuery).unwrap();
    match outcome {
        ControlOutcome::Signal(q) => {
            assert_eq!((q.rssi, q.ber), (20, 0));
            assert!(!q.is_no_signal());
        }
        other => panic!("expected signal outcome, got {other:?}"),
    }
    device.deinit();
}

#[test]
fn unsupported_ops_answer_unsupported_not_failure() {
    let (_registry, device) = ready_device(bring_up_script());
    for op in [
        ControlOp::Reset,
        ControlOp::LowPower,
        ControlOp::Sleep,
        ControlOp::Wake,
        ControlOp::NetConnect,
        ControlOp::NetDisconnect,
        ControlOp::WifiConfig,
        ControlOp::Gps,
        ControlOp::FirmwareVersion,
    ] {
        let err = device.control(op).unwrap_err();
        assert!(matches!(err, ModemError::Unsupported(_)));
    }
    device.deinit();
}

#[test]
fn set_dns_server_writes_through_and_mirrors() {
    let transport = bring_up_script().expect("AT+MDNSCFG=\"114.114.114.114\"", &["OK"]);
    let (_registry, device) = ready_device(transport);

    device
        .set_dns_server(1, "114.114.114.114".parse().unwrap())
        .unwrap();
    assert_eq!(
        device.netif().snapshot().dns[1],
        Some("114.114.114.114".parse().unwrap())
    );

    // A rejected write must not touch the interface record.
    let err = device
        .set_dns_server(0, "10.0.0.1".parse().unwrap())
        .unwrap_err();
    assert!(matches!(err, ModemError::Channel(_)));
    assert_eq!(
        device.netif().snapshot().dns[0],
        Some("183.230.126.224".parse().unwrap()),
        "bring-up value stays on failure"
    );
    device.deinit();
}

#[test]
fn power_off_tears_the_device_down() {
    let transport = bring_up_script();
    let pin = RecordingPin::new();
    let events = pin.events();

    let registry = ModemRegistry::new();
    let device = registry
        .register(
            DeviceSpec {
                name: "ml0".to_string(),
                channel: "uart2".to_string(),
                power_pin: Some(Box::new(pin)),
                status_pin: None,
                recv_buf_capacity: 512,
            },
            Box::new(transport),
            fast_config(),
        )
        .unwrap();

    let outcome = device.control(ControlOp::PowerOff).unwrap();
    assert!(matches!(outcome, ControlOutcome::PoweredOff));
    assert!(!device.is_initialized());
    let s = device.netif().snapshot();
    assert!(!s.up && !s.link_up);
    assert_eq!(
        events.lock().unwrap().last(),
        Some(&PinEvent::High),
        "power key must end driven off"
    );
}

#[test]
fn ping_requires_an_initialized_device() {
    let transport = bring_up_script();
    let (_registry, device) = ready_device(transport);
    device.deinit();

    let err = device
        .control(ControlOp::Ping(PingRequest::new("8.8.8.8", 10, 1)))
        .unwrap_err();
    assert!(matches!(err, ModemError::NotInitialized(name) if name == "ml0"));
}
