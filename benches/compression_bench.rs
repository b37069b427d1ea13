use criterion::{black_box, criterion_group, criterion_main, Criterion};
use paperback::block::Block;
use paperback::compression::{self, CompressionLevel};
use paperback::rs255;

fn bench_compression(c: &mut Criterion) {
    let data = vec![0u8; 1024 * 1024];
    c.bench_function("bzip2_fast_compress_1mb", |b| {
        b.iter(|| compression::compress(black_box(&data), CompressionLevel::Fast))
    });
    c.bench_function("bzip2_max_compress_1mb", |b| {
        b.iter(|| compression::compress(black_box(&data), CompressionLevel::Max))
    });
}

fn bench_rs255(c: &mut Criterion) {
    let payload = [0x5Cu8; 96];
    c.bench_function("rs255_encode_96b", |b| {
        b.iter(|| rs255::encode(black_box(&payload)))
    });

    let block = Block::new(0, [0x5Cu8; paperback::block::PAYLOAD_LEN]).encode();
    c.bench_function("block_decode_clean", |b| {
        b.iter(|| paperback::block::decode(black_box(&block), &[]))
    });
}

criterion_group!(benches, bench_compression, bench_rs255);
criterion_main!(benches);
