use port_reach_rs::error::ValidationError;
use port_reach_rs::portlist::PortList;
use port_reach_rs::ports::{expand_range, is_acceptable, parse_port, parse_ports_str, parse_range};
use port_reach_rs::types::{Protocol, ProtocolPorts};

#[test]
fn every_valid_port_is_accepted_and_bounds_rejected() {
    let empty = ProtocolPorts::default();
    for p in 1..=65535u32 {
        assert_eq!(parse_port(&p.to_string()), Ok(p as u16));
        assert!(is_acceptable("tcp", p, &empty));
        assert!(is_acceptable("udp", p, &empty));
    }
    for bad in [0u32, 65536] {
        assert!(parse_port(&bad.to_string()).is_err());
        assert!(!is_acceptable("tcp", bad, &empty));
        assert!(!is_acceptable("udp", bad, &empty));
    }
}

#[test]
fn range_22_80_yields_59_ascending_ports() {
    let (start, end) = parse_range("22-80").unwrap().unwrap();
    let ports = expand_range(start, end, 128).unwrap();
    assert_eq!(ports, (22..=80).collect::<Vec<u16>>());
    assert_eq!(ports.len(), 59);

    assert!(matches!(parse_range("80-22"), Err(ValidationError::InvalidRange(_))));
    assert!(matches!(parse_range("22-80-100"), Err(ValidationError::InvalidRange(_))));
}

#[test]
fn duplicate_only_within_protocol() {
    let mut list = PortList::new(128);
    list.insert(Protocol::Tcp, 443).unwrap();
    assert_eq!(
        list.insert(Protocol::Tcp, 443),
        Err(ValidationError::Duplicate { protocol: Protocol::Tcp, port: 443 })
    );
    assert!(list.insert(Protocol::Udp, 443).is_ok());
}

#[test]
fn capacity_exceeded_is_not_a_partial_insert() {
    let mut list = PortList::new(128);
    list.add_input(Protocol::Tcp, "1000-1099", 128).unwrap();
    list.add_input(Protocol::Udp, "2000-2027", 128).unwrap();
    assert_eq!(list.len(), 128);

    let before = list.snapshot();
    assert_eq!(
        list.insert(Protocol::Udp, 3000),
        Err(ValidationError::CapacityExceeded { max: 128 })
    );
    assert_eq!(
        list.add_input(Protocol::Tcp, "3000-3001", 128),
        Err(ValidationError::CapacityExceeded { max: 128 })
    );
    assert_eq!(list, before);
}

#[test]
fn ports_file_with_mixed_entries() {
    let input = r#"
        # game server
        udp 27015
        tcp 27015
        25565
        8000-8002   # dev servers
        8001        # duplicate is skipped
    "#;

    let mut list = PortList::new(128);
    parse_ports_str(input, &mut list, 128).expect("parse ok");
    assert_eq!(list.ports().tcp, vec![27015, 25565, 8000, 8001, 8002]);
    assert_eq!(list.ports().udp, vec![27015]);
}

#[test]
fn ports_file_rejects_unknown_protocol() {
    let mut list = PortList::new(128);
    assert!(parse_ports_str("sctp 80\n", &mut list, 128).is_err());
    assert!(list.is_empty());
}
