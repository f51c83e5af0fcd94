mod common;

use std::net::Ipv4Addr;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use common::{spawn_mock_service, spawn_mock_service_with_delay};
use port_reach_rs::config::ProbeConfig;
use port_reach_rs::portlist::PortList;
use port_reach_rs::prober::Prober;
use port_reach_rs::scanner::{scan_ports, spawn_scan};
use port_reach_rs::types::{ProbeOutcome, Protocol, ScanPhase, ScanReport, Verdict};

fn assert_each_pair_once(list: &PortList, report: &ScanReport) {
    for (protocol, port) in list.ports().iter() {
        let open = report.open.contains(protocol, port);
        let closed = report.closed.contains(protocol, port);
        assert!(open ^ closed, "{protocol}/{port} open={open} closed={closed}");
    }
    assert_eq!(report.resolved(), list.len());
}

#[tokio::test]
async fn tcp_8080_open_udp_53_closed() {
    let svc = spawn_mock_service(|protocol, port| match (protocol, port) {
        ("tcp", 8080) => 200,
        _ => 404,
    })
    .await;
    let cfg = svc.scan_config();
    let prober = Prober::new(cfg.probe.clone());

    let mut list = PortList::new(128);
    list.insert(Protocol::Tcp, 8080).unwrap();
    list.insert(Protocol::Udp, 53).unwrap();

    let report = scan_ports(&list.snapshot(), Ipv4Addr::UNSPECIFIED, &cfg, &prober).await;
    assert_eq!(report.open.tcp, vec![8080]);
    assert!(report.open.udp.is_empty());
    assert!(report.closed.tcp.is_empty());
    assert_eq!(report.closed.udp, vec![53]);
    assert_eq!(svc.hits(), 2);
}

#[tokio::test]
async fn every_pair_resolves_exactly_once() {
    let svc = spawn_mock_service(|protocol, port| match protocol {
        "tcp" if port % 2 == 0 => 200,
        "udp" if port % 3 == 0 => 200,
        _ if port % 5 == 0 => 500,
        _ => 404,
    })
    .await;
    let cfg = svc.scan_config();
    let prober = Prober::new(cfg.probe.clone());

    let mut list = PortList::new(128);
    list.add_input(Protocol::Tcp, "41000-41063", 128).unwrap();
    list.add_input(Protocol::Udp, "41000-41063", 128).unwrap();
    assert_eq!(list.len(), 128);

    let report = scan_ports(&list, Ipv4Addr::LOCALHOST, &cfg, &prober).await;
    assert_each_pair_once(&list, &report);
    assert_eq!(svc.hits(), 128);
    assert!(report.open.tcp.iter().all(|p| p % 2 == 0));
    assert!(report.open.udp.iter().all(|p| p % 3 == 0));
    assert_eq!(report.open.tcp.len(), 32);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_after_launch_still_covers_launched_ports() {
    let svc = spawn_mock_service_with_delay(|_, _| 200, Duration::from_millis(300)).await;
    let cfg = svc.scan_config();
    let prober = Prober::new(cfg.probe.clone());

    let mut list = PortList::new(128);
    list.add_input(Protocol::Tcp, "42000-42019", 128).unwrap();
    list.add_input(Protocol::Udp, "42000-42019", 128).unwrap();

    let handle = spawn_scan(list.snapshot(), Ipv4Addr::LOCALHOST, cfg, prober);
    let mut phases = handle.progress().subscribe();
    let stopped_in = tokio::time::timeout(
        Duration::from_secs(5),
        phases.wait_for(|p| *p != ScanPhase::Launching),
    )
    .await
    .expect("launching finishes")
    .map(|p| *p)
    .unwrap();
    handle.stop();
    let progress = handle.progress().clone();
    let report = handle.finished().await.unwrap();

    // The delayed service keeps every request in flight when stop lands.
    assert_eq!(stopped_in, ScanPhase::AwaitingProbers);
    assert_eq!(progress.phase(), ScanPhase::Completed);
    let launched = progress.launched.load(Ordering::Relaxed) as usize;
    assert!(launched > 0);
    assert_eq!(launched, 40);
    assert_eq!(report.resolved(), launched);
    assert_eq!(progress.resolved.load(Ordering::Relaxed) as usize, launched);
    assert_each_pair_once(&list, &report);
    assert_eq!(report.open.len(), 40);
    assert_eq!(svc.hits(), 40);
}

#[tokio::test]
async fn phases_advance_to_completed() {
    let svc = spawn_mock_service(|_, _| 404).await;
    let cfg = svc.scan_config();
    let prober = Prober::new(cfg.probe.clone());

    let mut list = PortList::new(128);
    list.insert(Protocol::Tcp, 43000).unwrap();

    let handle = spawn_scan(list, Ipv4Addr::LOCALHOST, cfg, prober);
    let mut phases = handle.progress().subscribe();
    assert!(handle.phase().is_active());

    let watcher = tokio::spawn(async move {
        let mut seen = vec![*phases.borrow_and_update()];
        while phases.changed().await.is_ok() {
            let phase = *phases.borrow_and_update();
            seen.push(phase);
            if phase == ScanPhase::Completed {
                break;
            }
        }
        seen
    });

    let report = handle.finished().await.unwrap();
    assert_eq!(report.closed.tcp, vec![43000]);
    let seen = watcher.await.unwrap();
    assert_eq!(seen.last(), Some(&ScanPhase::Completed));
}

#[tokio::test]
async fn prober_maps_status_codes() {
    let svc = spawn_mock_service(|_, port| port).await;
    let prober = Prober::new(ProbeConfig::new(svc.addr.to_string(), "check"));

    let cases = [(200, Verdict::Open), (404, Verdict::Closed), (500, Verdict::Closed), (408, Verdict::Closed), (400, Verdict::Closed)];
    for (code, expected) in cases {
        let outcome = prober.probe(Protocol::Tcp, code).await;
        assert_eq!(
            outcome,
            ProbeOutcome { protocol: Protocol::Tcp, port: code, verdict: expected }
        );
    }
}

#[tokio::test]
async fn hung_service_times_out_as_closed() {
    let svc = spawn_mock_service_with_delay(|_, _| 200, Duration::from_secs(5)).await;
    let prober = Prober::new(
        ProbeConfig::new(svc.addr.to_string(), "check").with_timeout(Duration::from_millis(300)),
    );

    let start = Instant::now();
    let outcome = prober.probe(Protocol::Udp, 5000).await;
    assert_eq!(outcome.verdict, Verdict::Closed);
    assert!(start.elapsed() < Duration::from_secs(4));
}
