use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::io::Cursor;
use vmsbackup::header::{AttributeTag, BLOCK_HEADER_LEN, RECORD_HEADER_LEN};
use vmsbackup::vbn::TextState;
use vmsbackup::{ExtractMode, ExtractOptions, MemorySink, SaveSetReader, StreamSource, VersionSelector};

const BLOCK_SIZE: usize = 8192;

fn sub_record(tag: AttributeTag, payload: &[u8]) -> Vec<u8> {
    let mut v = (payload.len() as u16).to_le_bytes().to_vec();
    v.extend_from_slice(&u16::from(tag).to_le_bytes());
    v.extend_from_slice(payload);
    v
}

/// One VAR file of `lines` 72-byte records, stored in 512-byte VBN records.
fn var_save_set(lines: usize) -> Vec<u8> {
    let mut stream = Vec::new();
    for i in 0..lines {
        let line = format!("{i:08} the quick brown fox jumps over the lazy dog, again and again");
        stream.extend_from_slice(&(line.len() as u16).to_le_bytes());
        stream.extend_from_slice(line.as_bytes());
        if stream.len() % 2 == 1 {
            stream.push(0);
        }
    }

    let size = stream.len() as u64;
    let mut recattr = [0u16; 16];
    recattr[0] = 2;
    recattr[4] = ((size / 512 + 1) >> 16) as u16;
    recattr[5] = (size / 512 + 1) as u16;
    recattr[6] = (size % 512) as u16;
    let recattr: Vec<u8> = recattr.iter().flat_map(|w| w.to_le_bytes()).collect();

    let mut file = vec![0x01, 0x01];
    file.extend(sub_record(AttributeTag::Filename, b"[BENCH]LINES.TXT;1"));
    file.extend(sub_record(AttributeTag::RecAttr, &recattr));

    let mut records = vec![(3u16, file)];
    records.extend(stream.chunks(512).map(|c| (4u16, c.to_vec())));

    let mut out = Vec::new();
    let mut block = Vec::new();
    for (rtype, payload) in records {
        let len = RECORD_HEADER_LEN + payload.len();
        if block.is_empty() || block.len() + len + RECORD_HEADER_LEN > BLOCK_SIZE {
            if !block.is_empty() {
                block.resize(BLOCK_SIZE, 0);
                out.extend_from_slice(&block);
            }
            block = vec![0u8; BLOCK_HEADER_LEN];
            block[0..2].copy_from_slice(&(BLOCK_HEADER_LEN as u16).to_le_bytes());
            block[40..44].copy_from_slice(&(BLOCK_SIZE as u32).to_le_bytes());
        }
        block.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        block.extend_from_slice(&rtype.to_le_bytes());
        block.extend_from_slice(&[0u8; RECORD_HEADER_LEN - 4]);
        block.extend_from_slice(&payload);
    }
    block.resize(BLOCK_SIZE, 0);
    out.extend_from_slice(&block);
    out
}

fn bench_var_extract(c: &mut Criterion) {
    let saveset = var_save_set(16 * 1024);

    for (label, mode) in [("var_extract_1mb_ascii", ExtractMode::Ascii), ("var_extract_1mb_binary", ExtractMode::Binary)] {
        c.bench_function(label, |b| {
            b.iter(|| {
                let source = StreamSource::new(Cursor::new(black_box(saveset.as_slice()))).unwrap();
                let opts = ExtractOptions { mode, version: VersionSelector::All, ..ExtractOptions::default() };
                let mut reader = SaveSetReader::new(source, MemorySink::new(), opts);
                reader.run().unwrap()
            })
        });
    }

    c.bench_function("var_extract_1mb_smart_two_pass", |b| {
        b.iter(|| {
            let source = StreamSource::new(Cursor::new(black_box(saveset.as_slice()))).unwrap();
            let mut reader = SaveSetReader::new(source, MemorySink::new(), ExtractOptions::default());
            reader.run().unwrap()
        })
    });
}

fn bench_normalize(c: &mut Criterion) {
    let text: Vec<u8> = b"line of text\r\n".iter().copied().cycle().take(1024 * 1024).collect();

    c.bench_function("normalize_crlf_1mb", |b| {
        b.iter(|| {
            let mut state = TextState::default();
            let mut out = Vec::with_capacity(text.len());
            state.normalize(black_box(&text), &mut out);
            out
        })
    });
}

criterion_group!(benches, bench_var_extract, bench_normalize);
criterion_main!(benches);
