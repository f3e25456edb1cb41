//! End-to-end scenarios from the data model's testable-properties section:
//! CRC/framing, power-report resolution against a node table, enumeration
//! atomicity, node-table pagination, and the energy integrator's trapezoid
//! and gap-discard behaviors.

use tigotap::events::Event;
use tigotap::parser::Parser;

fn framed(address: u16, frame_type: u16, payload: &[u8]) -> Vec<u8> {
    let mut body = address.to_be_bytes().to_vec();
    body.extend_from_slice(&frame_type.to_be_bytes());
    body.extend_from_slice(payload);
    let crc = tigotap::crc::crc16_ccitt(&body);
    let mut stream = vec![0x7E, 0x07];
    stream.extend_from_slice(&body);
    stream.extend_from_slice(&crc.to_le_bytes());
    stream.extend_from_slice(&[0x7E, 0x08]);
    stream
}

fn install_node_table(parser: &mut Parser, gateway_id: u16, node_id: u16, long_addr: [u8; 8]) {
    parser.feed(&framed(gateway_id, 0x0B0F, &[0x26, 0, 0, 0x26, 0x01, 0x00, 0x00]));
    let mut entry = node_id.to_be_bytes().to_vec();
    entry.extend_from_slice(&long_addr);
    let mut resp_payload = vec![0x27u8, 0, 0, 0x27, 0x01, 0x01];
    resp_payload.extend_from_slice(&entry);
    parser.feed(&framed(gateway_id | 0x8000, 0x0B10, &resp_payload));

    parser.feed(&framed(gateway_id, 0x0B0F, &[0x26, 0, 0, 0x26, 0x02, 0x00, 0x00]));
    let resp_payload = [0x27u8, 0, 0, 0x27, 0x02, 0x00];
    parser.feed(&framed(gateway_id | 0x8000, 0x0B10, &resp_payload));
}

#[test]
fn s1_crc_and_framing_extracts_the_documented_frame() {
    let stream: Vec<u8> = vec![0x7E, 0x07, 0x12, 0x01, 0x0B, 0x00, 0x01, 0xFE, 0x83, 0x7E, 0x08];
    let mut parser = Parser::new();
    let events = parser.feed(&stream);
    assert!(events.is_empty());
    assert_eq!(parser.counters().frames_received, 1);
    assert_eq!(parser.counters().crc_errors, 0);
}

#[test]
fn s2_power_report_resolves_barcode_from_installed_node_table() {
    let mut parser = Parser::new();
    install_node_table(&mut parser, 1, 16, [0x04, 0xC0, 0x5B, 0x30, 0x00, 0x02, 0xBE, 0x16]);

    // RECEIVE_REQUEST seeds the packet-number/slot-capture state for gateway 1.
    parser.feed(&framed(1, 0x0148, &[0x00, 0x00, 0x00, 0x01]));

    // Header: status=0x00E0 (all aux fields absent, full packet number), packet_number=2,
    // slot=(epoch=1, slot=0). The four absent-aux-field bits still advance the header offset
    // past six unused bytes before the packet number is read.
    let status: u16 = 0x00E0;
    let mut resp = status.to_be_bytes().to_vec();
    resp.extend_from_slice(&[0, 0, 0, 0, 0, 0]);
    resp.extend_from_slice(&[0x00, 0x02]);
    resp.extend_from_slice(&0x4000u16.to_be_bytes());

    // PV header + the worked-example power-report payload (voltage_in=800, voltage_out=400,
    // current=500, temperature_raw=0x19B, duty=128, rssi=0x80).
    let power_report_payload = [0x32u8, 0x01, 0x90, 128, 0x1F, 0x41, 0x9B, 0, 0, 0, 0x40, 0x00, 0x80];
    let mut pv = vec![0x31u8, 0x00, 16, 0x00, 0x00, 0x01, power_report_payload.len() as u8];
    pv.extend_from_slice(&power_report_payload);
    resp.extend_from_slice(&pv);

    let events = parser.feed(&framed(1 | 0x8000, 0x0149, &resp));
    assert_eq!(events.len(), 1);
    let Event::PowerReport { event, .. } = &events[0] else {
        panic!("expected a PowerReport event, got {:?}", events[0]);
    };

    assert_eq!(event.voltage_in, 40.0);
    assert_eq!(event.voltage_out, 40.0);
    assert_eq!(event.current_in, 2.5);
    assert_eq!(event.current_out, 2.5);
    assert_eq!(event.power, 100.0);
    assert!((event.temperature - 41.1).abs() < 1e-9);
    assert!((event.dc_dc_duty_cycle - 0.501_960_8).abs() < 1e-6);
    assert_eq!(event.rssi, 0x80);
    assert!(event.barcode.as_deref().is_some_and(|b| b.starts_with("A-")));
}

#[test]
fn s3_enumeration_commits_exactly_once_on_end_response() {
    let mut parser = Parser::new();

    let mut events = Vec::new();
    events.extend(parser.feed(&framed(0x0000, 0x0014, &[0, 0, 0, 0, 0x00, 0x02])));
    let identify_payload = [0x04u8, 0xC0, 0, 0, 0, 0, 0, 0x01];
    events.extend(parser.feed(&framed(0x8002, 0x003B, &identify_payload)));
    events.extend(parser.feed(&framed(0x8002, 0x000B, b"2.1.0")));
    events.extend(parser.feed(&framed(0x8000, 0x0006, &[])));

    let infra_events: Vec<_> = events.iter().filter(|e| matches!(e, Event::Infrastructure { .. })).collect();
    assert_eq!(infra_events.len(), 1);

    let Event::Infrastructure { event, .. } = infra_events[0] else { unreachable!() };
    assert_eq!(event.snapshot.gateways.len(), 1);
    assert!(event.snapshot.gateways.contains_key(&2));
}

#[test]
fn s4_node_table_pagination_unions_pages_and_emits_one_event() {
    let mut parser = Parser::new();

    parser.feed(&framed(1, 0x0B0F, &[0x26, 0, 0, 0x26, 0x01, 0x00, 0x00]));
    let mut page_one = vec![0x27u8, 0, 0, 0x27, 0x01, 0x02];
    page_one.extend_from_slice(&[0x00, 0x10]);
    page_one.extend_from_slice(&[0x04, 0xC0, 0, 0, 0, 0, 0, 0x10]);
    page_one.extend_from_slice(&[0x00, 0x11]);
    page_one.extend_from_slice(&[0x04, 0xC0, 0, 0, 0, 0, 0, 0x11]);
    parser.feed(&framed(0x8001, 0x0B10, &page_one));

    parser.feed(&framed(1, 0x0B0F, &[0x26, 0, 0, 0x26, 0x02, 0x00, 0x00]));
    let mut page_two = vec![0x27u8, 0, 0, 0x27, 0x02, 0x01];
    page_two.extend_from_slice(&[0x00, 0x12]);
    page_two.extend_from_slice(&[0x04, 0xC0, 0, 0, 0, 0, 0, 0x12]);
    parser.feed(&framed(0x8001, 0x0B10, &page_two));

    parser.feed(&framed(1, 0x0B0F, &[0x26, 0, 0, 0x26, 0x03, 0x00, 0x00]));
    let events = parser.feed(&framed(0x8001, 0x0B10, &[0x27u8, 0, 0, 0x27, 0x03, 0x00]));

    assert_eq!(events.len(), 1);
    let snapshot = parser.infrastructure();
    assert_eq!(snapshot.nodes.len(), 3);
    assert!(snapshot.nodes.contains_key(&0x10));
    assert!(snapshot.nodes.contains_key(&0x11));
    assert!(snapshot.nodes.contains_key(&0x12));
}

#[test]
fn s5_energy_trapezoid_over_sixty_seconds() {
    use chrono::{TimeZone, Utc};
    use tigotap::energy::{EnergyAccumulator, EnergyThresholds, accumulate};

    let mut acc = EnergyAccumulator::default();
    let t0 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    let t1 = t0 + chrono::Duration::seconds(60);

    accumulate(&mut acc, 100.0, t0, EnergyThresholds::default());
    let update = accumulate(&mut acc, 100.0, t1, EnergyThresholds::default());

    assert!((update.increment_wh - 1.6667).abs() < 1e-3);
    assert!((acc.daily_wh - 1.6667).abs() < 1e-3);
    assert!((acc.total_wh - 1.6667).abs() < 1e-3);
}

#[test]
fn s6_gap_during_production_discards_without_crediting_energy() {
    use chrono::{TimeZone, Utc};
    use tigotap::energy::{EnergyAccumulator, EnergyThresholds, accumulate};

    let mut acc = EnergyAccumulator::default();
    let t0 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    let t1 = t0 + chrono::Duration::seconds(300);

    accumulate(&mut acc, 120.0, t0, EnergyThresholds::default());
    let update = accumulate(&mut acc, 130.0, t1, EnergyThresholds::default());

    assert_eq!(update.increment_wh, 0.0);
    assert!(update.discarded_gap_during_production);
    assert_eq!(acc.total_wh, 0.0);
}
