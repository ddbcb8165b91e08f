use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use sealstream_crypto::{open_chunk, seal_chunk, ChunkReader, ChunkWriter, Key, CHUNK_SIZE};

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

fn seal_stream(key: &Key, data: &[u8]) -> Vec<u8> {
    let mut writer = ChunkWriter::new(Vec::new(), key);
    writer.write_all(data).unwrap();
    writer.finish().unwrap()
}

#[divan::bench(args = [1024, 16384, CHUNK_SIZE])]
fn bench_seal_chunk(bencher: divan::Bencher, size: usize) {
    let key = Key::generate();
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| seal_chunk(divan::black_box(&key), divan::black_box(&data)).unwrap());
}

#[divan::bench(args = [1024, 16384, CHUNK_SIZE])]
fn bench_open_chunk(bencher: divan::Bencher, size: usize) {
    let key = Key::generate();
    let sealed = seal_chunk(&key, &make_data(size)).unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| open_chunk(divan::black_box(&key), divan::black_box(&sealed)).unwrap());
}

#[divan::bench(args = [65536, 1048576, 8388608])]
fn bench_stream_encrypt(bencher: divan::Bencher, size: usize) {
    let key = Key::generate();
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| seal_stream(divan::black_box(&key), divan::black_box(&data)));
}

#[divan::bench(args = [65536, 1048576, 8388608])]
fn bench_stream_decrypt(bencher: divan::Bencher, size: usize) {
    let key = Key::generate();
    let encrypted = seal_stream(&key, &make_data(size));
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            let mut out = Vec::with_capacity(size);
            ChunkReader::new(divan::black_box(encrypted.as_slice()), &key)
                .read_to_end(&mut out)
                .unwrap();
            out
        });
}

/// Random access: seek into the middle of a large stream and read 4 KiB.
#[divan::bench]
fn bench_seek_and_read(bencher: divan::Bencher) {
    let key = Key::generate();
    let encrypted = seal_stream(&key, &make_data(8 * 1024 * 1024));
    let mut reader = ChunkReader::new(Cursor::new(encrypted), &key);
    let mut buf = vec![0u8; 4096];
    bencher.bench_local(|| {
        reader.seek(SeekFrom::Start(divan::black_box(5_000_000))).unwrap();
        reader.read_exact(&mut buf).unwrap();
    });
}

fn main() {
    divan::main();
}
