use criterion::{Criterion, black_box, criterion_group, criterion_main};
use tigotap::frame::FrameExtractor;

fn build_frame(address: u16, frame_type: u16, payload: &[u8]) -> Vec<u8> {
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

fn frame_extraction_benchmark(c: &mut Criterion) {
    let frame = build_frame(0x1201, 0x0B00, &[0xAB; 32]);
    let mut stream = Vec::new();
    for _ in 0..256 {
        stream.extend_from_slice(&frame);
    }

    c.bench_function("frame_extraction_256_frames", |b| {
        b.iter(|| {
            let mut extractor = FrameExtractor::new();
            let mut count = 0usize;
            for &byte in black_box(&stream) {
                if extractor.push_byte(byte).is_some() {
                    count += 1;
                }
            }
            black_box(count)
        });
    });
}

criterion_group!(benches, frame_extraction_benchmark);
criterion_main!(benches);
