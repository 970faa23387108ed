use std::io::Cursor;

use arbor_data::{DataSapling, DataTree, StringHash, StringTableBuilder};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_string_table(c: &mut Criterion) {
    let words: Vec<String> = (0..500).map(|i| format!("entry_{i}")).collect();

    let mut group = c.benchmark_group("String Table");

    group.bench_function("intern 500 fresh", |b| {
        b.iter(|| {
            let mut builder = StringTableBuilder::default();
            for word in &words {
                black_box(builder.add(word));
            }
        });
    });

    group.bench_function("intern 500 repeats", |b| {
        let mut builder = StringTableBuilder::default();
        for word in &words {
            builder.add(word);
        }
        b.iter(|| {
            for word in &words {
                black_box(builder.add(word));
            }
        });
    });

    group.finish();
}

fn bench_record_trees(c: &mut Criterion) {
    // 64 int fields on one node, read back by id
    let ids: Vec<StringHash> = (0..64)
        .map(|i| StringHash::from_text(&format!("field_{i}")))
        .collect();
    let mut sapling = DataSapling::new();
    for (i, &id) in ids.iter().enumerate() {
        sapling.set_int(id, i as i32);
    }
    let mut stream = Vec::new();
    sapling.write_to(&mut stream).unwrap();
    let tree = sapling.harvest();

    let mut group = c.benchmark_group("Record Trees");

    group.bench_function("read 64 int fields", |b| {
        b.iter(|| {
            let mut total = 0;
            for &id in &ids {
                total += tree.get_int(id);
            }
            black_box(total);
        });
    });

    group.bench_function("decode 64-field stream", |b| {
        b.iter(|| {
            let tree = DataTree::read_from(&mut Cursor::new(&stream)).unwrap();
            black_box(tree.branch_count());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_string_table, bench_record_trees);
criterion_main!(benches);
