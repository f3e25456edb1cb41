use criterion::{Criterion, black_box, criterion_group, criterion_main};
use tigotap::Parser;
use tigotap::crc::crc16_ccitt;

fn framed(address: u16, frame_type: u16, payload: &[u8]) -> Vec<u8> {
    let mut body = address.to_be_bytes().to_vec();
    body.extend_from_slice(&frame_type.to_be_bytes());
    body.extend_from_slice(payload);
    let crc = crc16_ccitt(&body);
    let mut stream = vec![0x7E, 0x07];
    stream.extend_from_slice(&body);
    stream.extend_from_slice(&crc.to_le_bytes());
    stream.extend_from_slice(&[0x7E, 0x08]);
    stream
}

fn power_report_stream() -> Vec<u8> {
    let mut stream = Vec::new();
    stream.extend_from_slice(&framed(0x0001, 0x0148, &[0x00, 0x00, 0x00, 0x01]));

    let status: u16 = 0x00E0;
    let mut resp = status.to_be_bytes().to_vec();
    resp.extend_from_slice(&[0x00, 0x02]); // packet number
    resp.extend_from_slice(&[0x40, 0x00]); // slot counter

    let power_report_payload = [0x32u8, 0x01, 0x90, 128, 0x1F, 0x41, 0x9B, 0, 0, 0, 0x40, 0x00, 0x80];
    let mut pv_header = vec![0x31u8, 0x00, 0x10, 0x00, 0x00, 0x01, power_report_payload.len() as u8];
    pv_header.extend_from_slice(&power_report_payload);
    resp.extend_from_slice(&pv_header);

    stream.extend_from_slice(&framed(0x8001, 0x0149, &resp));
    stream
}

fn feed_throughput_benchmark(c: &mut Criterion) {
    let mut stream = Vec::new();
    for _ in 0..128 {
        stream.extend_from_slice(&power_report_stream());
    }

    c.bench_function("feed_128_power_reports", |b| {
        b.iter(|| {
            let mut parser = Parser::new();
            let events = parser.feed(black_box(&stream));
            black_box(events.len())
        });
    });
}

criterion_group!(benches, feed_throughput_benchmark);
criterion_main!(benches);
